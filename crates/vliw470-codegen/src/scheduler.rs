use std::collections::{HashMap, HashSet};

use vliw470_common::error::{Error, Result};
use vliw470_ir::{Bundle, ScheduledOp, Slot};
use vliw470_parser::operation::DependencyKind;
use vliw470_parser::{Category, Operation, Program};
use vliw470_ir::VliwProgram;

/// Safety cap on the initiation-interval search. Past this the program is
/// declared unschedulable rather than searched forever.
pub const MAX_INITIATION_INTERVAL: u32 = 512;

/// `max(ceil(alu_count / 2), mul_count, mem_count)` over a set of
/// operations — the minimum cycles a modulo schedule needs to avoid
/// resource conflicts.
pub fn resource_lower_bound(operations: &[Operation]) -> u32 {
    let (mut alu, mut mul, mut mem) = (0u32, 0u32, 0u32);
    for op in operations {
        match op.category {
            Category::Alu => alu += 1,
            Category::Mul => mul += 1,
            Category::Mem => mem += 1,
        }
    }
    alu.div_ceil(2).max(mul).max(mem)
}

/// Schedule a fully-analyzed program into bundles: BB0 and BB2 by plain
/// list scheduling, BB1 either as a single widened `loop` body or as a
/// modulo-scheduled `loop.pip` body, selected by `pipelined`.
pub fn schedule(program: &Program, pipelined: bool) -> Result<VliwProgram> {
    let mut vliw = VliwProgram::new();

    schedule_list(program, program.bb0(), &mut vliw, 0)?;

    if !program.has_loop {
        return Ok(vliw);
    }

    if pipelined {
        schedule_bb1_pipelined(program, &mut vliw)?;
    } else {
        schedule_bb1_loop(program, &mut vliw)?;
    }

    let floor = vliw.bundles.len();
    schedule_list(program, program.bb2(), &mut vliw, floor)?;

    Ok(vliw)
}

/// `e' = max(e, max over dependencies of bundle(producer_last) +
/// latency(producer_last))`. Interloop dependencies are skipped when
/// `skip_interloop` is set, since during initial BB1 placement the
/// back-edge makes that constraint circular.
fn earliest_cycle(
    op: &Operation,
    operations: &[Operation],
    position: &HashMap<usize, usize>,
    skip_interloop: bool,
) -> u32 {
    let mut e = 0u32;
    for dep in &op.dependencies {
        if skip_interloop && dep.kind() == DependencyKind::Interloop {
            continue;
        }
        if let Some(producer) = dep.last_producer() {
            if let Some(&pos) = position.get(&producer) {
                e = e.max(pos as u32 + operations[producer].latency());
            }
        }
    }
    e
}

/// Shared placement primitive. Scans bundles forward from `earliest`,
/// extending the bundle list as needed, and takes the first allowed slot
/// not excluded by the reservation set (when scheduling in modulo mode).
fn place(
    bundles: &mut Vec<Bundle>,
    position: &mut HashMap<usize, usize>,
    mut reservation: Option<(u32, &mut HashSet<(u32, Slot)>)>,
    loop_start: usize,
    source_index: usize,
    text: String,
    category: Category,
    earliest: u32,
) -> Result<usize> {
    let mut cycle = earliest as usize;
    loop {
        while bundles.len() <= cycle {
            bundles.push(Bundle::empty());
        }
        let slots = vliw470_ir::allowed_slots(category);
        let chosen = slots.iter().copied().find(|&slot| {
            if !bundles[cycle].is_free(slot) {
                return false;
            }
            if let Some((ii, resv)) = reservation.as_ref() {
                let key = (((cycle - loop_start) as u32) % *ii, slot);
                if resv.contains(&key) {
                    return false;
                }
            }
            true
        });

        if let Some(slot) = chosen {
            *bundles[cycle].slot_mut(slot) = Some(ScheduledOp::new(source_index, text));
            position.insert(source_index, cycle);
            if let Some((ii, resv)) = reservation.as_mut() {
                resv.insert((((cycle - loop_start) as u32) % *ii, slot));
            }
            return Ok(cycle);
        }
        cycle += 1;
    }
}

fn schedule_list(
    program: &Program,
    range: std::ops::Range<usize>,
    vliw: &mut VliwProgram,
    floor: usize,
) -> Result<()> {
    for idx in range {
        let op = &program.operations[idx];
        let e = earliest_cycle(op, &program.operations, &vliw.position, false).max(floor as u32);
        place(
            &mut vliw.bundles,
            &mut vliw.position,
            None,
            0,
            idx,
            op.text.clone(),
            op.category,
            e,
        )?;
    }
    Ok(())
}

/// Interloop-required initiation interval: the widest gap demanded by any
/// BB1-to-BB1 interloop dependency, `position(producer) + latency -
/// position(consumer)`.
fn interloop_requirement(
    program: &Program,
    bb1: std::ops::Range<usize>,
    position: &HashMap<usize, usize>,
) -> Option<u32> {
    let mut required = None;
    for idx in bb1.clone() {
        let op = &program.operations[idx];
        for dep in &op.dependencies {
            if dep.kind() != DependencyKind::Interloop {
                continue;
            }
            let Some(producer) = dep.last_producer() else { continue };
            if !bb1.contains(&producer) {
                continue;
            }
            let lat = program.operations[producer].latency();
            let p_pos = position[&producer] as i64;
            let c_pos = position[&idx] as i64;
            // A producer that lands at or before the consumer's cycle
            // imposes no II constraint; only clamp away negative deltas,
            // since the producer can sit later in program order than its
            // interloop consumer yet still be scheduled earlier in time.
            let req = (p_pos + lat as i64 - c_pos).max(0) as u32;
            required = Some(required.map_or(req, |r: u32| r.max(req)));
        }
    }
    required
}

fn schedule_bb1_loop(program: &Program, vliw: &mut VliwProgram) -> Result<()> {
    let floor = vliw.bundles.len();
    let bb1 = program.bb1();

    let mut used = Vec::new();
    for idx in bb1.clone() {
        let op = &program.operations[idx];
        let e = earliest_cycle(op, &program.operations, &vliw.position, true).max(floor as u32);
        let cycle = place(
            &mut vliw.bundles,
            &mut vliw.position,
            None,
            0,
            idx,
            op.text.clone(),
            op.category,
            e,
        )?;
        used.push(cycle);
    }

    let start_loop = used.iter().copied().min().unwrap_or(floor);
    let body_len = vliw.bundles.len() - start_loop;
    let ii_req = interloop_requirement(program, bb1, &vliw.position).unwrap_or(body_len as u32);
    let target_len = body_len.max(ii_req as usize).max(1);

    while vliw.bundles.len() - start_loop < target_len {
        vliw.bundles.push(Bundle::empty());
    }

    let branch_bundle = vliw.bundles.len() - 1;
    if !vliw.bundles[branch_bundle].is_free(Slot::Branch) {
        return Err(Error::internal("branch slot already occupied while closing loop body"));
    }
    *vliw.bundles[branch_bundle].slot_mut(Slot::Branch) =
        Some(ScheduledOp::inserted(format!("loop {}", start_loop)));

    tracing::debug!(
        target: "scheduler",
        start_loop,
        end_loop = vliw.bundles.len(),
        "scheduled non-pipelined loop body"
    );

    vliw.start_loop = Some(start_loop);
    vliw.end_loop = Some(vliw.bundles.len());
    Ok(())
}

fn schedule_bb1_pipelined(program: &Program, vliw: &mut VliwProgram) -> Result<()> {
    let floor = vliw.bundles.len();
    let bb1_ops: Vec<usize> = program.bb1().collect();
    let ii_lb = resource_lower_bound(&program.operations[program.bb1()]).max(1);

    let mut ii = ii_lb;
    let (final_bundles, final_position) = loop {
        if ii > MAX_INITIATION_INTERVAL {
            return Err(Error::schedule(format!(
                "initiation interval search exceeded cap of {}",
                MAX_INITIATION_INTERVAL
            )));
        }

        let mut attempt_bundles = vliw.bundles.clone();
        let mut attempt_position = vliw.position.clone();
        let mut reservation: HashSet<(u32, Slot)> = HashSet::new();

        for &idx in &bb1_ops {
            let op = &program.operations[idx];
            let e = earliest_cycle(op, &program.operations, &attempt_position, true).max(floor as u32);
            place(
                &mut attempt_bundles,
                &mut attempt_position,
                Some((ii, &mut reservation)),
                floor,
                idx,
                op.text.clone(),
                op.category,
                e,
            )?;
        }

        let violated = bb1_ops.iter().any(|&idx| {
            program.operations[idx].dependencies.iter().any(|dep| {
                if dep.kind() != DependencyKind::Interloop {
                    return false;
                }
                let Some(producer) = dep.last_producer() else { return false };
                if !bb1_ops.contains(&producer) {
                    return false;
                }
                let lat = program.operations[producer].latency();
                let p_pos = attempt_position[&producer] as u32;
                let c_pos = attempt_position[&idx] as u32;
                p_pos + lat > c_pos + ii
            })
        });

        if violated {
            tracing::warn!(target: "scheduler", ii, "initiation interval rejected, retrying");
            ii += 1;
            continue;
        }

        break (attempt_bundles, attempt_position);
    };

    vliw.bundles = final_bundles;
    vliw.position = final_position;

    if vliw.bundles.len() == floor {
        for _ in 0..ii {
            vliw.bundles.push(Bundle::empty());
        }
    } else {
        let body_len = vliw.bundles.len() - floor;
        let padded = body_len.div_ceil(ii as usize) * (ii as usize);
        for _ in body_len..padded {
            vliw.bundles.push(Bundle::empty());
        }
    }

    let body_len = vliw.bundles.len() - floor;
    let stage_count = (body_len as u32) / ii;

    let branch_bundle = vliw.bundles.len() - 1;
    if !vliw.bundles[branch_bundle].is_free(Slot::Branch) {
        return Err(Error::internal("branch slot already occupied while closing pipelined body"));
    }
    *vliw.bundles[branch_bundle].slot_mut(Slot::Branch) =
        Some(ScheduledOp::inserted(format!("loop.pip {}", floor)));

    tracing::debug!(
        target: "scheduler",
        start_loop = floor,
        end_loop = vliw.bundles.len(),
        ii,
        stage_count,
        "found initiation interval"
    );

    vliw.start_loop = Some(floor);
    vliw.end_loop = Some(vliw.bundles.len());
    vliw.ii = Some(ii);
    vliw.stage_count = Some(stage_count);
    Ok(())
}
