//! Object storage: raw messages are read from it, artifacts published to it.

pub mod fs_backend;
pub mod traits;

pub use fs_backend::FsBlobStore;
pub use traits::{BlobStore, LocalHandle};
