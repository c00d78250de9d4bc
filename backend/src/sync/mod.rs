//! Sync progress tracking

mod coordinator;
mod stage;
mod summary;

pub use coordinator::*;
pub use stage::*;
pub use summary::*;
