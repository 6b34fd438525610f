//! Library entrypoint for fragnet.
//!
//! This re-exports the node, store, and protocol modules as a library
//! surface so the binary (and tests) can consume them via `use fragnet::...`.

pub mod catalog;
pub mod exchange;
pub mod fragmenter;
pub mod index;
pub mod networking;
pub mod node;
pub mod store;

pub use catalog::{FileCatalog, FileInfo};
pub use exchange::{FragmentRequest, FragmentResponse};
pub use fragmenter::{assemble, fragment_bytes, fragment_file, Fragment, FragmentError};
pub use node::{DownloadError, Node, NodeConfig, UploadError};
pub use store::FragmentStore;
