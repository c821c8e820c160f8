//! Provider abstractions for object storage and inference
//!
//! External services are injected as trait objects so the pipeline and the
//! router can run against in-memory fakes as easily as real backends.

pub mod inference;
pub mod local;
pub mod memory;
pub mod object_store;
pub mod ollama;

#[cfg(feature = "gcp")]
pub mod gcs;

pub use inference::{InferenceProvider, SamplingConfig};
pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use object_store::ObjectStore;
pub use ollama::OllamaClient;
