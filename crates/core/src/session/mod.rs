//! Session state machine: pure transitions plus the mode controller on top.

mod controller;
mod state;

pub use controller::{ModeController, SessionAction, SessionEvent, SessionView, Transition};
pub use state::SessionState;
