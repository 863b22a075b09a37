//! The remote object-store seam.
//!
//! Backends are constructed once at startup from configuration and handed to
//! the store as a pre-built handle; the store never sees addressing or
//! credential concerns.

use std::collections::HashMap;

use bytes::Bytes;
use remcache_core::Result;

/// Metadata key carrying the hex-encoded output identifier.
pub const META_OUTPUT_ID: &str = "outputid";

/// Metadata key carrying the RFC 3339 creation timestamp.
pub const META_TIME: &str = "time";

/// One remote object: raw artifact bytes plus string metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub body: Bytes,
    pub metadata: HashMap<String, String>,
}

impl Object {
    /// Builds an object carrying the metadata fields a put attaches.
    #[must_use]
    pub fn new(body: Bytes, output_id_hex: String, time: String) -> Self {
        let metadata = HashMap::from([
            (META_OUTPUT_ID.to_string(), output_id_hex),
            (META_TIME.to_string(), time),
        ]);
        Object { body, metadata }
    }
}

/// Authoritative content-addressed backend.
///
/// `get` returning `Ok(None)` is the well-defined absence signal; every
/// transport, auth, or permission failure is an error, kept strictly distinct
/// from absence.
#[async_trait::async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Object>>;

    /// Stores `object` under `key`, replacing any prior entry.
    async fn put(&self, key: &str, object: Object) -> Result<()>;
}
