use std::collections::HashMap;

use vliw470_common::error::{Error, Result};
use vliw470_ir::{Bundle, ScheduledOp, Slot, VliwProgram};
use vliw470_parser::operation::DependencyKind;
use vliw470_parser::Program;

/// Monotone non-rotating name pool, starting at 1. Names above 31 overflow
/// the architectural register file.
struct NonRotatingPool {
    next: u32,
}

impl NonRotatingPool {
    fn new() -> Self {
        Self { next: 1 }
    }

    fn alloc(&mut self) -> Result<u32> {
        if self.next > 31 {
            return Err(Error::rename("non-rotating register pool exhausted"));
        }
        let name = self.next;
        self.next += 1;
        Ok(name)
    }
}

/// Rotating name pool, starting at 32, advancing by `stride = S + 1` per
/// allocation so each allocation reserves room for every in-flight stage
/// plus one.
struct RotatingPool {
    next: u32,
    stride: u32,
}

impl RotatingPool {
    fn new(stride: u32) -> Self {
        Self { next: 32, stride }
    }

    fn alloc(&mut self) -> Result<u32> {
        if self.next + self.stride > 96 {
            return Err(Error::rename("rotating register pool exhausted"));
        }
        let name = self.next;
        self.next += self.stride;
        Ok(name)
    }
}

/// Operations in the order their bundles occupy cycles, scanning slots
/// `[ALU0, ALU1, MUL, MEM, BRANCH]` within each bundle. Mirrors the order
/// the renamer is told to walk destinations in.
fn ops_in_bundle_order(vliw: &VliwProgram) -> Vec<usize> {
    let mut order = Vec::new();
    for bundle in &vliw.bundles {
        for slot in Slot::ALL {
            if let Some(op) = bundle.slot(slot) {
                if let Some(idx) = op.source_index {
                    order.push(idx);
                }
            }
        }
    }
    order
}

/// Walks `text` left to right, replacing each `x<digits>` register
/// reference in turn: the first occurrence is the destination (when
/// `dest` is set), the rest are operands drawn from `operands` in order.
/// A `0x...` hex literal is recognized and rendered back in decimal so it
/// is never mistaken for a register.
fn rewrite_text(text: &str, dest: Option<u32>, operands: &[u32]) -> String {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(text.len());
    let mut occurrence = 0usize;
    let mut i = 0usize;

    while i < n {
        if chars[i] == '0' && i + 1 < n && (chars[i + 1] == 'x' || chars[i + 1] == 'X') {
            let mut j = i + 2;
            while j < n && chars[j].is_ascii_hexdigit() {
                j += 1;
            }
            let digits: String = chars[i + 2..j].iter().collect();
            match u64::from_str_radix(&digits, 16) {
                Ok(value) => out.push_str(&value.to_string()),
                Err(_) => out.extend(&chars[i..j]),
            }
            i = j;
            continue;
        }

        if chars[i] == 'x' && i + 1 < n && chars[i + 1].is_ascii_digit() {
            let mut j = i + 1;
            while j < n && chars[j].is_ascii_digit() {
                j += 1;
            }
            let new_reg = if occurrence == 0 && dest.is_some() {
                dest.unwrap()
            } else {
                let operand_idx = if dest.is_some() { occurrence - 1 } else { occurrence };
                operands[operand_idx]
            };
            out.push('x');
            out.push_str(&new_reg.to_string());
            occurrence += 1;
            i = j;
            continue;
        }

        out.push(chars[i]);
        i += 1;
    }

    out
}

fn apply_rename(
    program: &Program,
    vliw: &mut VliwProgram,
    idx: usize,
    dest_names: &HashMap<usize, u32>,
    operand_names: &[u32],
) {
    let op = &program.operations[idx];
    let dest = if op.writes_register() { dest_names.get(&idx).copied() } else { None };
    let new_text = rewrite_text(&op.text, dest, operand_names);
    let bundle_idx = vliw.position[&idx];
    let bundle = &mut vliw.bundles[bundle_idx];
    for slot in Slot::ALL {
        if let Some(scheduled) = bundle.slot_mut(slot) {
            if scheduled.source_index == Some(idx) {
                scheduled.text = new_text;
                return;
            }
        }
    }
}

/// Insert an empty bundle at `index`, shifting every later bundle (and the
/// position map, and `start_loop`/`end_loop`) down by one.
fn insert_bundle_before(vliw: &mut VliwProgram, index: usize) {
    vliw.bundles.insert(index, Bundle::empty());
    for pos in vliw.position.values_mut() {
        if *pos >= index {
            *pos += 1;
        }
    }
    if let Some(start) = vliw.start_loop {
        if start >= index {
            vliw.start_loop = Some(start + 1);
        }
    }
    if let Some(end) = vliw.end_loop {
        if end >= index {
            vliw.end_loop = Some(end + 1);
        }
    }
}

/// Rewrite the branch bundle's text after `start_loop` moved, preserving
/// whichever of `loop`/`loop.pip` it already said.
fn retarget_branch(vliw: &mut VliwProgram) {
    let Some(end_loop) = vliw.end_loop else { return };
    let Some(start_loop) = vliw.start_loop else { return };
    let branch_bundle = &mut vliw.bundles[end_loop - 1];
    if let Some(branch) = branch_bundle.branch.as_mut() {
        let prefix = if branch.text.starts_with("loop.pip") { "loop.pip" } else { "loop" };
        branch.text = format!("{} {}", prefix, start_loop);
    }
}

/// Non-pipelined (`loop`) register renaming (spec §4.5.1).
pub fn rename_loop(program: &Program, vliw: &mut VliwProgram) -> Result<()> {
    let mut pool = NonRotatingPool::new();
    let mut dest_names: HashMap<usize, u32> = HashMap::new();

    for idx in ops_in_bundle_order(vliw) {
        if program.operations[idx].writes_register() {
            dest_names.insert(idx, pool.alloc()?);
        }
    }

    let mut operand_names: HashMap<(usize, usize), u32> = HashMap::new();
    let mut fixups: Vec<(u32, u32)> = Vec::new();

    for idx in 0..program.len() {
        let op = &program.operations[idx];
        for (di, dep) in op.dependencies.iter().enumerate() {
            let name = match dep.rewrite_producer() {
                None => pool.alloc()?,
                Some(producer) => dest_names[&producer],
            };
            operand_names.insert((idx, di), name);

            if dep.kind() == DependencyKind::Interloop && dep.producers.len() == 2 {
                let bb1_producer = dep.last_producer().unwrap();
                let bb1_renamed = dest_names[&bb1_producer];
                let bb0_renamed = name;
                fixups.push((bb0_renamed, bb1_renamed));
            }
        }
    }

    for idx in 0..program.len() {
        let operands: Vec<u32> = (0..program.operations[idx].dependencies.len())
            .map(|di| operand_names[&(idx, di)])
            .collect();
        apply_rename(program, vliw, idx, &dest_names, &operands);
    }

    fixups.sort_by_key(|&(bb0_renamed, _)| bb0_renamed);
    for (bb0_renamed, bb1_renamed) in fixups {
        let text = format!("mov x{}, x{}", bb0_renamed, bb1_renamed);
        // The fix-up must run every iteration, so it always lands in the
        // last bundle of the loop body (or a fresh one inserted there) —
        // `earliest_cycle` only ever matters when it is already past that
        // point, and the body can't be widened backward to meet it.
        let end_loop = vliw.end_loop.unwrap();
        let target = end_loop - 1;

        if vliw.bundles[target].is_free(Slot::Alu0) {
            *vliw.bundles[target].slot_mut(Slot::Alu0) = Some(ScheduledOp::inserted(text));
        } else if vliw.bundles[target].is_free(Slot::Alu1) {
            *vliw.bundles[target].slot_mut(Slot::Alu1) = Some(ScheduledOp::inserted(text));
        } else {
            insert_bundle_before(vliw, end_loop - 1);
            retarget_branch(vliw);
            *vliw.bundles[target].slot_mut(Slot::Alu0) = Some(ScheduledOp::inserted(text));
        }
    }

    Ok(())
}

/// Pipelined (`loop.pip`) register renaming (spec §4.5.2).
pub fn rename_loop_pip(program: &Program, vliw: &mut VliwProgram) -> Result<()> {
    let start_loop = vliw.start_loop.ok_or_else(|| Error::internal("no loop in program"))?;
    let ii = vliw.ii.ok_or_else(|| Error::internal("pipelined program has no initiation interval"))?;
    let stage_count = vliw.stage_count.ok_or_else(|| Error::internal("pipelined program has no stage count"))?;

    let mut non_rotating = NonRotatingPool::new();
    let mut rotating = RotatingPool::new(stage_count + 1);
    let mut dest_names: HashMap<usize, u32> = HashMap::new();

    // 1. Fresh rotating name for every BB1 destination.
    for idx in ops_in_bundle_order(vliw) {
        if program.bb1().contains(&idx) && program.operations[idx].writes_register() {
            dest_names.insert(idx, rotating.alloc()?);
        }
    }

    // 2. Loop-invariant producers consumed by BB1 or BB2 get a fresh non-rotating name.
    for idx in program.bb1().chain(program.bb2()) {
        for dep in &program.operations[idx].dependencies {
            if dep.kind() == DependencyKind::LoopInvariant {
                if let Some(producer) = dep.last_producer() {
                    dest_names.entry(producer).or_insert(non_rotating.alloc()?);
                }
            }
        }
    }

    // 3. Interloop BB0 antecedents get their matching BB1 producer's name, offset.
    for idx in program.bb1() {
        for dep in &program.operations[idx].dependencies {
            if dep.kind() != DependencyKind::Interloop {
                continue;
            }
            let Some(bb0_producer) = dep.earlier_producer() else { continue };
            if dest_names.contains_key(&bb0_producer) {
                continue;
            }
            let bb1_producer = dep.last_producer().unwrap();
            let bb1_name = dest_names[&bb1_producer];
            let stage_p = vliw.stage_of(vliw.position[&bb1_producer]) as i64;
            let computed = bb1_name as i64 + 1 - stage_p;
            let name = u32::try_from(computed)
                .map_err(|_| Error::internal("pipelined interloop offset underflowed"))?;
            dest_names.insert(bb0_producer, name);
        }
    }

    // 4. Remaining BB0 destinations and all BB2 destinations get a fresh non-rotating name.
    for idx in program.bb0() {
        if program.operations[idx].writes_register() {
            dest_names.entry(idx).or_insert(non_rotating.alloc()?);
        }
    }
    for idx in program.bb2() {
        if program.operations[idx].writes_register() {
            dest_names.entry(idx).or_insert(non_rotating.alloc()?);
        }
    }

    // 5. Rewrite every operand.
    let mut operand_names: HashMap<(usize, usize), u32> = HashMap::new();
    for idx in 0..program.len() {
        let op = &program.operations[idx];
        for (di, dep) in op.dependencies.iter().enumerate() {
            let name = match dep.last_producer() {
                None => non_rotating.alloc()?,
                Some(producer) => {
                    let producer_renamed = dest_names[&producer];
                    match dep.kind() {
                        DependencyKind::Local | DependencyKind::Interloop
                            if program.bb1().contains(&idx) =>
                        {
                            let stage_consumer = vliw.stage_of(vliw.position[&idx]) as i64;
                            let stage_producer = vliw.stage_of(vliw.position[&producer]) as i64;
                            let bump = if dep.kind() == DependencyKind::Interloop { 1 } else { 0 };
                            let computed = producer_renamed as i64 + (stage_consumer - stage_producer) + bump;
                            u32::try_from(computed)
                                .map_err(|_| Error::internal("pipelined body offset underflowed"))?
                        }
                        DependencyKind::PostLoop => {
                            let stage_producer = vliw.stage_of(vliw.position[&producer]);
                            producer_renamed + (stage_count - stage_producer)
                        }
                        DependencyKind::LoopInvariant => producer_renamed,
                        // Local dependency outside BB1 (BB0-local or BB2-local): no rotation applies.
                        _ => producer_renamed,
                    }
                }
            };
            operand_names.insert((idx, di), name);
        }
    }

    for idx in 0..program.len() {
        let operands: Vec<u32> = (0..program.operations[idx].dependencies.len())
            .map(|di| operand_names[&(idx, di)])
            .collect();
        apply_rename(program, vliw, idx, &dest_names, &operands);
    }

    // 6. Body compression.
    compress_body(vliw, start_loop, ii)?;

    // 7. Prologue: `mov p32, true` and `mov EC, S-1`.
    insert_prologue(vliw, stage_count)?;

    Ok(())
}

fn compress_body(vliw: &mut VliwProgram, start_loop: usize, ii: u32) -> Result<()> {
    let end_loop = vliw.end_loop.ok_or_else(|| Error::internal("no loop in program"))?;
    let body_len = end_loop - start_loop;
    let ii_usize = ii as usize;

    let mut compressed: Vec<Bundle> = (0..ii_usize).map(|_| Bundle::empty()).collect();
    let mut new_position: HashMap<usize, usize> = HashMap::new();

    for b in start_loop..end_loop {
        let p = (b - start_loop) % ii_usize;
        let stage = vliw.stage_of(b);
        for slot in Slot::ALL {
            if let Some(op) = vliw.bundles[b].slot(slot).clone() {
                if !compressed[p].is_free(slot) {
                    return Err(Error::internal("compressed bundle slot conflict"));
                }
                let text =
                    if slot == Slot::Branch { op.text.clone() } else { format!("(p{}) {}", 32 + stage, op.text) };
                if let Some(source_index) = op.source_index {
                    new_position.insert(source_index, start_loop + p);
                }
                *compressed[p].slot_mut(slot) = Some(ScheduledOp { source_index: op.source_index, text });
            }
        }
    }

    let bb2_bundles = vliw.bundles.split_off(end_loop);
    vliw.bundles.truncate(start_loop);
    vliw.bundles.extend(compressed);
    vliw.bundles.extend(bb2_bundles);

    let shrink = body_len - ii_usize;
    for (idx, pos) in new_position {
        vliw.position.insert(idx, pos);
    }
    for pos in vliw.position.values_mut() {
        if *pos >= end_loop {
            *pos -= shrink;
        }
    }

    vliw.end_loop = Some(start_loop + ii_usize);
    Ok(())
}

fn insert_prologue(vliw: &mut VliwProgram, stage_count: u32) -> Result<()> {
    let start_loop = vliw.start_loop.ok_or_else(|| Error::internal("no loop in program"))?;
    let mut pending = vec!["mov p32, true".to_string(), format!("mov EC, {}", stage_count.saturating_sub(1))];

    if start_loop > 0 {
        let prev = start_loop - 1;
        while let Some(text) = pending.first().cloned() {
            let slot = if vliw.bundles[prev].is_free(Slot::Alu0) {
                Slot::Alu0
            } else if vliw.bundles[prev].is_free(Slot::Alu1) {
                Slot::Alu1
            } else {
                break;
            };
            *vliw.bundles[prev].slot_mut(slot) = Some(ScheduledOp::inserted(text));
            pending.remove(0);
        }
    }

    if !pending.is_empty() {
        let fresh_index = vliw.start_loop.unwrap();
        insert_bundle_before(vliw, fresh_index);
        retarget_branch(vliw);
        for (offset, text) in pending.into_iter().enumerate() {
            let slot = if offset == 0 { Slot::Alu0 } else { Slot::Alu1 };
            *vliw.bundles[fresh_index].slot_mut(slot) = Some(ScheduledOp::inserted(text));
        }
    }

    Ok(())
}
