//! Core wire-protocol types and errors for remcache.
//!
//! The protocol is newline-delimited JSON: one request record per line on the
//! input stream (optionally followed by a body continuation line), one
//! response record per line on the output stream. This crate owns the record
//! types, the line codec, and the error taxonomy shared by the store and the
//! binary; it performs no I/O beyond the async stream traits the codec takes.

pub mod errors;
pub mod protocol;

pub use errors::{Error, Result};
pub use protocol::{read_request, write_response, Command, Request, Response};
