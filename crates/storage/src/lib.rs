#![forbid(unsafe_code)]

pub mod beacon;
pub mod remote;
pub mod repository;
pub mod sqlite;

pub use beacon::{BeaconPayload, RecordingBeacon, RepositoryBeacon, UnloadBeacon};
pub use repository::{InMemoryRepository, Storage, StorageError, VideoProgressRepository};
