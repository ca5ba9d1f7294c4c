pub mod queue;
pub mod store;

pub use queue::{Identifier, LinkageQueue};
pub use store::{PgThreadStore, StepRecord, ThreadStore};
