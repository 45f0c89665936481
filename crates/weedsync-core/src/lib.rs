//! WeedSync Core - Domain types and collaborator ports
//!
//! This crate contains the hexagonal core shared by the sync engine and its
//! adapters:
//! - **Domain types** - `RelativePath`, `ClientId`, `ContentDigest`, `LocalEntry`,
//!   `RemoteEntry`, `ListingDiff`
//! - **Port definitions** - Traits for adapters: `IRemoteStore`, `IDeltaEngine`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module is pure data with validation and no I/O.
//! Ports define the trait interfaces that adapter crates implement
//! (`weedsync-filer` for the store, `weedsync-sync::rdiff` for deltas).

pub mod config;
pub mod domain;
pub mod ports;
