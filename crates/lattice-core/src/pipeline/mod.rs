pub mod config;
pub mod item;
pub mod types;

pub use item::process_item;
pub use types::{ItemOutcome, ItemReporter, ItemStage, NoOpReporter};
