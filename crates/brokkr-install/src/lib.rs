//! # brokkr-install
//!
//! The transactional installer side of Brokkr:
//! - `fsops` — a rollback-able filesystem transaction primitive
//! - `cache` — the local artifact cache downloads land in
//! - `download` — the concurrent downloader boundary
//! - `installer` — install/uninstall/upgrade orchestration over the
//!   registry and the filesystem, with all-or-nothing semantics

pub mod cache;
pub mod download;
pub mod fsops;
pub mod installer;

pub use cache::DownloadCache;
pub use download::{Downloader, HttpDownloader};
pub use fsops::FsTransaction;
pub use installer::ModInstaller;
