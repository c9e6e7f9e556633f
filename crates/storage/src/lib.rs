#![forbid(unsafe_code)]

pub mod local;
pub mod repository;
pub mod sqlite;

pub use local::JsonFileCache;
pub use repository::{
    DeckPayload, DeckRepository, InMemoryRepository, ProgressCache, RemoteProgress, Storage,
    StorageError,
};
