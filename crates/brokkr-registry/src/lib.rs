//! # brokkr-registry
//!
//! The registry subsystem of the Brokkr mod package manager:
//! - `available` — per-identifier version index, most recent first
//! - `registry` — the persistent database of available, installed and
//!   autodetected modules plus the file-ownership index, with an explicit
//!   snapshot/rollback transaction handle
//! - `sanity` — the pure global-consistency checker
//! - `resolver` — the relationship resolver turning a request into an
//!   install plan
//! - `feed` — metadata-archive ingestion
//! - `scan` — drop-in mod autodetection

pub mod available;
pub mod feed;
pub mod registry;
pub mod resolver;
pub mod sanity;
pub mod scan;

pub use available::AvailableVersions;
pub use feed::FeedSummary;
pub use registry::{AutodetectedMod, GameGate, InstalledMod, Registry, Transaction};
pub use resolver::{ResolveOptions, Resolver, SelectionReason};
