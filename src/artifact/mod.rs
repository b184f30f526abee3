//! Captured artifact storage

pub mod local;
pub mod storage;
pub mod traits;

pub use storage::SupabaseStorage;
pub use traits::{ArtifactStore, StoreError};
