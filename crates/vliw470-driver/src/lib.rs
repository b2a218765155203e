use vliw470_common::error::Result;
use vliw470_ir::VliwProgram;

/// Both output projections for a program: the baseline `loop` schedule and
/// the software-pipelined `loop.pip` schedule.
#[derive(Debug)]
pub struct Projections {
    pub loop_schedule: VliwProgram,
    pub loop_pip_schedule: VliwProgram,
}

/// Run the full pipeline — parse, analyze dependencies, schedule and
/// rename both ways — over an ordered list of instruction-text lines.
///
/// A program with no `loop` instruction has nothing to pipeline, so both
/// projections fall back to the same non-pipelined schedule.
pub fn compile(lines: &[String]) -> Result<Projections> {
    let mut program = vliw470_parser::parse::parse(lines)?;
    tracing::info!(target: "driver", operations = program.len(), has_loop = program.has_loop, "parsed program");

    vliw470_analysis::analyze(&mut program)?;
    tracing::debug!(target: "driver", "dependency analysis complete");

    let loop_schedule = vliw470_codegen::schedule_loop(&program)?;
    tracing::info!(target: "driver", bundles = loop_schedule.len(), "scheduled loop");

    let loop_pip_schedule = if program.has_loop {
        let pip = vliw470_codegen::schedule_loop_pip(&program)?;
        tracing::info!(
            target: "driver",
            bundles = pip.len(),
            ii = ?pip.ii,
            stages = ?pip.stage_count,
            "scheduled loop.pip"
        );
        pip
    } else {
        tracing::debug!(target: "driver", "program has no loop, loop.pip falls back to loop schedule");
        vliw470_codegen::schedule_loop(&program)?
    };

    Ok(Projections { loop_schedule, loop_pip_schedule })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn compiles_a_program_with_no_loop() {
        let projections = compile(&lines(&["mov x1, 10", "add x2, x1, x1"])).unwrap();
        assert_eq!(
            projections.loop_schedule.to_rows().len(),
            projections.loop_pip_schedule.to_rows().len()
        );
    }

    #[test]
    fn compiles_a_pipelined_loop() {
        let lines = lines(&["mov LC, 5", "mov x1, 0", "addi x1, x1, 1", "mulu x2, x1, x1", "loop 2"]);
        let projections = compile(&lines).unwrap();
        assert!(projections.loop_pip_schedule.ii.is_some());
        assert!(projections.loop_schedule.ii.is_none());
    }

    #[test]
    fn rejects_multiple_loop_instructions() {
        let lines = lines(&["mov LC, 5", "loop 0", "loop 0"]);
        assert!(compile(&lines).is_err());
    }
}
