/// The execution-unit category an operation belongs to.
///
/// Determines latency and which bundle slots may hold the operation
/// (see `vliw470_ir::bundle::allowed_slots`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Alu,
    Mul,
    Mem,
}

impl Category {
    /// 3 cycles for multiply, 1 cycle for everything else.
    pub fn latency(self) -> u32 {
        match self {
            Category::Mul => 3,
            Category::Alu | Category::Mem => 1,
        }
    }
}

/// An operation's destination, if it writes one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// An ordinary register, e.g. `x3`.
    Register(u32),
    /// The loop counter or epilogue counter (`LC`/`EC`) — never renamed.
    Special,
}

/// One of the four dependency kinds a consumed register can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Local,
    Interloop,
    LoopInvariant,
    PostLoop,
}

/// A single operand's producer-chain, as written in the source text.
///
/// `kind` and `producers` start unset and are filled in by
/// `vliw470_analysis::dependency::analyze`. `producers` holds operation
/// indices into the owning `Program`, ordered body-producer-first for
/// interloop dependencies. An empty list after analysis means the operand
/// has no producer in the program and stands for an implicit initial value.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub reg_tag: u32,
    pub kind: Option<DependencyKind>,
    pub producers: Vec<usize>,
}

impl Dependency {
    pub fn new(reg_tag: u32) -> Self {
        Self { reg_tag, kind: None, producers: Vec::new() }
    }

    /// The body producer: the BB1 producer for interloop dependencies with
    /// two producers, or the sole producer otherwise. `None` for an initial
    /// value. Used by the scheduler (resource positions only ever concern
    /// BB1 occupancy) and by pipelined renaming's in-body rewrite rules.
    pub fn last_producer(&self) -> Option<usize> {
        self.producers.first().copied()
    }

    /// The earlier-listed producer, present only for a two-producer
    /// interloop dependency (the BB0 producer feeding the first iteration).
    pub fn earlier_producer(&self) -> Option<usize> {
        self.producers.get(1).copied()
    }

    /// The last entry of the producer list, as the non-pipelined renamer's
    /// operand-rewrite rule names it: for a two-producer interloop
    /// dependency this is the BB0 producer (the register a fix-up move
    /// refreshes every iteration), for every other dependency it is the
    /// sole producer.
    pub fn rewrite_producer(&self) -> Option<usize> {
        self.producers.last().copied()
    }

    pub fn kind(&self) -> DependencyKind {
        self.kind.expect("dependency analysis has not run yet")
    }
}

/// One decoded RISC operation, in program order.
///
/// `text` is the original textual form; the renamer rewrites it in place
/// once registers are assigned. `renamed_destination` starts unset and is
/// filled by the renamer: for the non-pipelined schedule it is the fresh
/// non-rotating name; for the pipelined schedule it is the rotating base
/// name (the register read at stage 0).
#[derive(Debug, Clone)]
pub struct Operation {
    pub text: String,
    pub category: Category,
    pub destination: Option<Destination>,
    pub dependencies: Vec<Dependency>,
    pub renamed_destination: Option<u32>,
}

impl Operation {
    pub fn new(
        text: String,
        category: Category,
        destination: Option<Destination>,
        dependencies: Vec<Dependency>,
    ) -> Self {
        Self {
            text,
            category,
            destination,
            dependencies,
            renamed_destination: None,
        }
    }

    pub fn latency(&self) -> u32 {
        self.category.latency()
    }

    /// `true` for operations whose destination is an ordinary register
    /// (as opposed to none, or the LC/EC special sentinel).
    pub fn writes_register(&self) -> bool {
        matches!(self.destination, Some(Destination::Register(_)))
    }
}
