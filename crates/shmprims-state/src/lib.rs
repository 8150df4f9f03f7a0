//! Wait-free state snapshots between a realtime writer and its readers.
//!
//! A [`TripleBuffer`] lets a cyclic realtime task publish its latest state
//! (positions, pin values, status words) without ever waiting: the writer
//! commits into one of three slots and a reader snapshots the newest
//! complete commit. Intermediate commits are overwritten, never queued.
//!
//! The buffer is `repr(C)` and pointer-free, so [`SharedTripleBuffer`] can
//! place it in a shared segment and attach it from another process.

pub mod error;
pub mod flag;
pub mod triple;

pub use error::{Result, StateError};
pub use flag::{RoleFlag, NEW_DATA};
pub use triple::{SharedTripleBuffer, StateReader, StateWriter, TripleBuffer};
