//! pixelgrade-store — Challenge and submission stores.
//!
//! Implements the store traits from `pixelgrade-core` in memory, on the local
//! filesystem, and against a remote HTTP queue service, and loads the
//! `pixelgrade.toml` configuration that selects between them.

pub mod config;
pub mod error;
pub mod fs;
pub mod http;
pub mod memory;

pub use config::{create_store, load_config, PixelgradeConfig, StoreConfig, StoreHandles};
pub use error::StoreError;
pub use fs::FsStore;
pub use http::HttpStore;
pub use memory::MemoryStore;
