//! Selection handoff between the browser and the agent
//!
//! The board owns the record lifecycle; the waiter is what the agent blocks on.

pub mod board;
pub mod waiter;

pub use board::{SelectionBoard, SelectionEvent, SubmitOutcome};
pub use waiter::{SelectionOutcome, SelectionReport, SelectionWaiter};
