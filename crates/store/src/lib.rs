//! Two-tier artifact store and the protocol dispatcher that drives it.
//!
//! The store pairs an authoritative remote object backend with a
//! process-scoped local staging directory; the dispatcher reads request
//! records sequentially, fans each get/put out onto its own task, and funnels
//! every response through one exclusive writer so records never interleave on
//! the output stream.

pub mod backend;
pub mod http;
pub mod memory;
pub mod server;
pub mod store;

pub use backend::{Object, ObjectBackend, META_OUTPUT_ID, META_TIME};
pub use http::{AddressingStyle, HttpBackend, HttpBackendConfig};
pub use memory::MemoryBackend;
pub use server::{ResponseWriter, Server};
pub use store::{ArtifactHit, StatsSnapshot, Store};
