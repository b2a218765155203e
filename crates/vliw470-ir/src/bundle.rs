use vliw470_parser::Category;

/// One of the five execution-unit slots in a VLIW bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Alu0,
    Alu1,
    Mul,
    Mem,
    Branch,
}

impl Slot {
    pub const ALL: [Slot; 5] = [Slot::Alu0, Slot::Alu1, Slot::Mul, Slot::Mem, Slot::Branch];
}

/// Slots an operation of the given category may occupy.
///
/// BRANCH is never returned here: it is reserved for the scheduler's
/// closing `loop`/`loop.pip` instruction and for renamer-inserted
/// branch shifts.
pub fn allowed_slots(category: Category) -> &'static [Slot] {
    match category {
        Category::Alu => &[Slot::Alu0, Slot::Alu1],
        Category::Mul => &[Slot::Mul],
        Category::Mem => &[Slot::Mem],
    }
}

/// One operation placed into a bundle slot.
///
/// `source_index` is the index into the owning program's original
/// operation list; `None` for operations inserted by the renamer (fix-up
/// moves, prologue stage-predicate setup) that have no RISC-level source.
#[derive(Debug, Clone)]
pub struct ScheduledOp {
    pub source_index: Option<usize>,
    pub text: String,
}

impl ScheduledOp {
    pub fn new(source_index: usize, text: String) -> Self {
        Self { source_index: Some(source_index), text }
    }

    pub fn inserted(text: String) -> Self {
        Self { source_index: None, text }
    }
}

/// A single VLIW cycle: up to one operation per slot.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub alu0: Option<ScheduledOp>,
    pub alu1: Option<ScheduledOp>,
    pub mul: Option<ScheduledOp>,
    pub mem: Option<ScheduledOp>,
    pub branch: Option<ScheduledOp>,
}

impl Bundle {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.alu0.is_none()
            && self.alu1.is_none()
            && self.mul.is_none()
            && self.mem.is_none()
            && self.branch.is_none()
    }

    pub fn slot(&self, slot: Slot) -> &Option<ScheduledOp> {
        match slot {
            Slot::Alu0 => &self.alu0,
            Slot::Alu1 => &self.alu1,
            Slot::Mul => &self.mul,
            Slot::Mem => &self.mem,
            Slot::Branch => &self.branch,
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut Option<ScheduledOp> {
        match slot {
            Slot::Alu0 => &mut self.alu0,
            Slot::Alu1 => &mut self.alu1,
            Slot::Mul => &mut self.mul,
            Slot::Mem => &mut self.mem,
            Slot::Branch => &mut self.branch,
        }
    }

    pub fn is_free(&self, slot: Slot) -> bool {
        self.slot(slot).is_none()
    }

    /// Project this bundle to its output row: `[ALU0, ALU1, MUL, MEM, BRANCH]`,
    /// `nop` for empty slots.
    pub fn to_row(&self) -> [String; 5] {
        [
            render(&self.alu0),
            render(&self.alu1),
            render(&self.mul),
            render(&self.mem),
            render(&self.branch),
        ]
    }
}

fn render(slot: &Option<ScheduledOp>) -> String {
    match slot {
        Some(op) => op.text.clone(),
        None => "nop".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bundle_projects_to_all_nops() {
        let bundle = Bundle::empty();
        assert_eq!(bundle.to_row(), ["nop", "nop", "nop", "nop", "nop"]);
    }

    #[test]
    fn occupied_slots_project_their_text() {
        let mut bundle = Bundle::empty();
        *bundle.slot_mut(Slot::Alu0) = Some(ScheduledOp::new(0, "add x3, x1, x2".to_string()));
        let row = bundle.to_row();
        assert_eq!(row[0], "add x3, x1, x2");
        assert_eq!(row[1], "nop");
    }

    #[test]
    fn alu_allows_two_slots_mul_and_mem_allow_one() {
        assert_eq!(allowed_slots(Category::Alu), &[Slot::Alu0, Slot::Alu1]);
        assert_eq!(allowed_slots(Category::Mul), &[Slot::Mul]);
        assert_eq!(allowed_slots(Category::Mem), &[Slot::Mem]);
    }
}
