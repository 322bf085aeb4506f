//! Request deduplication and cancellation.
//!
//! - [`InFlightRegistry`]: at most one in-flight operation per [`QueryKey`]
//! - [`SupersedingSlot`]: single-slot consumers where the newest request wins

mod key;
mod registry;
mod supersede;

pub use key::QueryKey;
pub use registry::InFlightRegistry;
pub use supersede::{SlotSignal, SupersedingSlot};
