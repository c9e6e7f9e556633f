mod host;
mod observer;

// Public API of the session subsystem.
pub use host::{ExitedSession, SessionHost};
pub use observer::{CardOutcome, NoopObserver, SessionObserver};
