//! Concrete implementations of the collaborator ports.

mod fs;
#[cfg(feature = "http")]
mod http;
mod memory;

pub use fs::FileSystemSink;
#[cfg(feature = "http")]
pub use http::HttpBackend;
pub use memory::MemoryStore;
