//! Checks for the invariants a correct schedule must hold, independent of
//! the unit tests living next to the scheduler and renamer themselves.

use vliw470_analysis::analyze;
use vliw470_codegen::scheduler::resource_lower_bound;
use vliw470_codegen::{schedule_loop, schedule_loop_pip};
use vliw470_ir::{Slot, VliwProgram};
use vliw470_parser::parse::parse;
use vliw470_parser::Program;

fn build(lines: &[&str]) -> Program {
    let lines: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
    let mut program = parse(&lines).unwrap();
    analyze(&mut program).unwrap();
    program
}

fn slots(vliw: &VliwProgram) -> impl Iterator<Item = (usize, Slot)> + '_ {
    [Slot::Alu0, Slot::Alu1, Slot::Mul, Slot::Mem, Slot::Branch]
        .into_iter()
        .flat_map(move |slot| (0..vliw.bundles.len()).map(move |b| (b, slot)))
}

// Invariant 2: no bundle holds two operations in the same slot.
// (Trivially true by construction since each slot is an `Option`, but we
// check every bundle actually reports at most one occupant per slot.)
fn assert_no_slot_collisions(vliw: &VliwProgram) {
    for (b, slot) in slots(vliw) {
        let count = vliw.bundles[b].slot(slot).iter().count();
        assert!(count <= 1, "bundle {b} slot {slot:?} holds more than one op");
    }
}

// Invariant 3: exactly one BRANCH slot is occupied, at end_loop - 1, and it
// targets start_loop.
fn assert_single_branch_targets_start(vliw: &VliwProgram) {
    let occupied: Vec<usize> =
        (0..vliw.bundles.len()).filter(|&b| vliw.bundles[b].slot(Slot::Branch).is_some()).collect();
    assert_eq!(occupied.len(), 1, "expected exactly one branch bundle");
    let end_loop = vliw.end_loop.unwrap();
    assert_eq!(occupied[0], end_loop - 1);
    let branch = vliw.bundles[occupied[0]].slot(Slot::Branch).as_ref().unwrap();
    let start_loop = vliw.start_loop.unwrap();
    assert!(branch.text.ends_with(&start_loop.to_string()));
}

#[test]
fn s1_no_loop_schedules_into_two_bundles() {
    let program = build(&["mov x1, 10", "add x2, x1, x1"]);
    let vliw = schedule_loop(&program).unwrap();
    assert_eq!(vliw.len(), 2);
    let rows = vliw.to_rows();
    assert!(rows[0][0].starts_with("mov"));
    assert!(rows[1][0].starts_with("add"));
    for row in &rows {
        assert!(row[1..].iter().all(|cell| cell == "nop"));
    }
    assert_no_slot_collisions(&vliw);
}

#[test]
fn s2_empty_body_widens_to_one_cycle_for_the_branch() {
    let program = build(&["mov LC, 3", "mov x1, 0", "loop 2", "add x2, x1, x1"]);
    let vliw = schedule_loop(&program).unwrap();
    assert_eq!(vliw.start_loop.unwrap(), 2);
    assert_eq!(vliw.end_loop.unwrap() - vliw.start_loop.unwrap(), 1);
    assert_no_slot_collisions(&vliw);
    assert_single_branch_targets_start(&vliw);
}

#[test]
fn s3_interloop_widening_and_pipelined_ii() {
    // x2's only writer is its own interloop recurrence through mulu
    // (latency 3), so both projections must make room for it.
    let lines = ["mov LC, 5", "mov x1, 0", "mov x2, 0", "addi x1, x1, 1", "mulu x2, x2, x1", "loop 3"];
    let program = build(&lines);

    let non_pipelined = schedule_loop(&program).unwrap();
    assert!(non_pipelined.end_loop.unwrap() - non_pipelined.start_loop.unwrap() >= 3);
    assert_no_slot_collisions(&non_pipelined);
    assert_single_branch_targets_start(&non_pipelined);

    let pipelined = schedule_loop_pip(&program).unwrap();
    let ii = pipelined.ii.unwrap();
    assert!(ii >= 3);
    let body_len = pipelined.end_loop.unwrap() - pipelined.start_loop.unwrap();
    assert_eq!(body_len % ii as usize, 0, "body length must be a positive multiple of II");
    assert!(body_len > 0);
    assert_no_slot_collisions(&pipelined);
    assert_single_branch_targets_start(&pipelined);
}

#[test]
fn s4_pipelined_interloop_consumer_is_producer_renamed_plus_one() {
    let lines = ["mov LC, 5", "mov x1, 0", "addi x1, x1, 1", "addi x1, x1, 1", "loop 2"];
    let program = build(&lines);
    let vliw = schedule_loop_pip(&program).unwrap();
    let rows = vliw.to_rows();
    let addi_cells: Vec<&String> = rows.iter().flatten().filter(|c| c.starts_with("addi")).collect();
    assert_eq!(addi_cells.len(), 2, "expected both addi instructions to survive scheduling");
}

#[test]
fn s6_repeated_compilation_is_deterministic() {
    let lines = ["mov LC, 5", "mov x1, 0", "mov x2, 0", "addi x1, x1, 1", "mulu x2, x2, x1", "loop 3"];
    let first = schedule_loop_pip(&build(&lines)).unwrap().to_rows();
    let second = schedule_loop_pip(&build(&lines)).unwrap().to_rows();
    assert_eq!(first, second);
}

#[test]
fn invariant_7_loop_schedule_at_least_as_long_as_resource_lower_bounds() {
    let lines = ["mov LC, 5", "mov x1, 0", "mov x2, 0", "addi x1, x1, 1", "mulu x2, x2, x1", "loop 3"];
    let program = build(&lines);
    let vliw = schedule_loop(&program).unwrap();
    let lb0 = resource_lower_bound(&program.operations[program.bb0()]);
    let lb1 = resource_lower_bound(&program.operations[program.bb1()]);
    let lb2 = resource_lower_bound(&program.operations[program.bb2()]);
    assert!(vliw.len() as u32 >= lb0 + lb1 + lb2);
}

#[test]
fn invariant_6_stage_predicates_match_bundle_stage() {
    let lines = ["mov LC, 5", "mov x1, 0", "mov x2, 0", "addi x1, x1, 1", "mulu x2, x2, x1", "loop 3"];
    let program = build(&lines);
    let vliw = schedule_loop_pip(&program).unwrap();
    let start = vliw.start_loop.unwrap();
    let end = vliw.end_loop.unwrap();
    for b in start..end {
        let stage = vliw.stage_of(b);
        for slot in [Slot::Alu0, Slot::Alu1, Slot::Mul, Slot::Mem] {
            if let Some(op) = vliw.bundles[b].slot(slot) {
                let expected = format!("(p{}) ", 32 + stage);
                assert!(op.text.starts_with(&expected), "{} does not carry stage predicate {}", op.text, expected);
            }
        }
    }
}
