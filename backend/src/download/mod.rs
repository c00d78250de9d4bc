//! Download progress tracking

mod item;
mod registry;

pub use item::*;
pub use registry::*;
