//! Typed info events pushed by the engine and the cell that holds the latest one.

mod cell;
mod kind;

pub use cell::EventCell;
pub use kind::{DecodeError, InfoKind};
