//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the sync engine depends on but whose
//! implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteStore`] - Filer metadata, transfers, tags and locks
//! - [`IDeltaEngine`] - Binary signature/delta/patch computation

pub mod delta_engine;
pub mod remote_store;

pub use delta_engine::IDeltaEngine;
pub use remote_store::{DownloadParams, IRemoteStore};
