pub mod operation;
pub mod parse;
pub mod program;

pub use operation::{Category, Dependency, DependencyKind, Destination, Operation};
pub use parse::parse;
pub use program::Program;
