//! PlusMinus static file server
//!
//! Serves a repository checkout over loopback HTTP so the smoke harness (or a
//! person with a browser) always sees the current files on disk.

pub mod server;
pub mod static_files;

pub use server::{ServerHandle, StaticServer};
pub use static_files::{content_type_for, resolve_request_path, StaticFileError, StaticFiles};
