use vliw470_common::error::Result;
use vliw470_parser::operation::DependencyKind;
use vliw470_parser::{Destination, Program};

/// Fill every operand's producer list and dependency kind in place.
///
/// Consumer in BB0: only local dependencies are possible — the nearest
/// earlier operation in BB0 with a matching destination, or none.
///
/// Consumer in BB1: local, then interloop (search BB1 after the consumer,
/// wrapping around the back-edge, then BB0 backward), then loop-invariant.
///
/// Consumer in BB2: local, then post-loop (nearest producer in BB1), then
/// loop-invariant.
pub fn analyze(program: &mut Program) -> Result<()> {
    let bb0 = program.bb0();
    let bb1 = program.bb1();
    let bb2 = program.bb2();

    for consumer in bb0.clone() {
        resolve_bb0_consumer(program, consumer);
    }
    for consumer in bb1.clone() {
        resolve_bb1_consumer(program, consumer, bb0.clone(), bb1.clone());
    }
    for consumer in bb2.clone() {
        resolve_bb2_consumer(program, consumer, bb0.clone(), bb1.clone(), bb2.clone());
    }

    tracing::debug!(
        target: "analysis",
        operations = program.len(),
        "dependency analysis complete"
    );

    Ok(())
}

/// Nearest earlier operation in `range` (searching backward from just
/// before `before`) whose destination is `reg_tag`.
fn nearest_earlier(
    program: &Program,
    range: std::ops::Range<usize>,
    before: usize,
    reg_tag: u32,
) -> Option<usize> {
    for idx in (range.start..before).rev() {
        if writes(program, idx, reg_tag) {
            return Some(idx);
        }
    }
    None
}

fn writes(program: &Program, idx: usize, reg_tag: u32) -> bool {
    matches!(
        program.operations[idx].destination,
        Some(Destination::Register(r)) if r == reg_tag
    )
}

fn resolve_bb0_consumer(program: &mut Program, consumer: usize) {
    let bb0 = program.bb0();
    for i in 0..program.operations[consumer].dependencies.len() {
        let reg_tag = program.operations[consumer].dependencies[i].reg_tag;
        let producer = nearest_earlier(program, bb0.clone(), consumer, reg_tag);
        let dep = &mut program.operations[consumer].dependencies[i];
        dep.kind = Some(DependencyKind::Local);
        dep.producers = producer.into_iter().collect();
    }
}

fn resolve_bb1_consumer(
    program: &mut Program,
    consumer: usize,
    bb0: std::ops::Range<usize>,
    bb1: std::ops::Range<usize>,
) {
    for i in 0..program.operations[consumer].dependencies.len() {
        let reg_tag = program.operations[consumer].dependencies[i].reg_tag;

        if let Some(producer) = nearest_earlier(program, bb1.clone(), consumer, reg_tag) {
            let dep = &mut program.operations[consumer].dependencies[i];
            dep.kind = Some(DependencyKind::Local);
            dep.producers = vec![producer];
            continue;
        }

        // Interloop: search BB1 strictly after the consumer, wrapping
        // around the back-edge (the wrap includes the consumer itself,
        // since a self-referencing op is its own next-iteration producer).
        let wrapped = (consumer + 1..bb1.end)
            .find(|&idx| writes(program, idx, reg_tag))
            .or_else(|| (bb1.start..=consumer).find(|&idx| writes(program, idx, reg_tag)));
        if let Some(bb1_producer) = wrapped {
            let mut producers = vec![bb1_producer];
            if let Some(bb0_producer) = nearest_earlier(program, bb0.clone(), bb0.end, reg_tag) {
                producers.push(bb0_producer);
            }
            let dep = &mut program.operations[consumer].dependencies[i];
            dep.kind = Some(DependencyKind::Interloop);
            dep.producers = producers;
            continue;
        }

        // Loop-invariant: nearest producer in BB0, else initial value.
        let producer = nearest_earlier(program, bb0.clone(), bb0.end, reg_tag);
        let dep = &mut program.operations[consumer].dependencies[i];
        dep.kind = Some(DependencyKind::LoopInvariant);
        dep.producers = producer.into_iter().collect();
    }
}

fn resolve_bb2_consumer(
    program: &mut Program,
    consumer: usize,
    bb0: std::ops::Range<usize>,
    bb1: std::ops::Range<usize>,
    bb2: std::ops::Range<usize>,
) {
    for i in 0..program.operations[consumer].dependencies.len() {
        let reg_tag = program.operations[consumer].dependencies[i].reg_tag;

        if let Some(producer) = nearest_earlier(program, bb2.clone(), consumer, reg_tag) {
            let dep = &mut program.operations[consumer].dependencies[i];
            dep.kind = Some(DependencyKind::Local);
            dep.producers = vec![producer];
            continue;
        }

        if let Some(producer) = nearest_earlier(program, bb1.clone(), bb1.end, reg_tag) {
            let dep = &mut program.operations[consumer].dependencies[i];
            dep.kind = Some(DependencyKind::PostLoop);
            dep.producers = vec![producer];
            continue;
        }

        let producer = nearest_earlier(program, bb0.clone(), bb0.end, reg_tag);
        let dep = &mut program.operations[consumer].dependencies[i];
        dep.kind = Some(DependencyKind::LoopInvariant);
        dep.producers = producer.into_iter().collect();
    }
}
