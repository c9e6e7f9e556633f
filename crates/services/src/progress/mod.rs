//! Dual-target progress persistence: synchronous local cache, debounced remote.

mod debounce;
mod store;

pub use debounce::DebounceTimer;
pub use store::{DEFAULT_DEBOUNCE, LoadedProgress, ProgressSource, ProgressStore};
