#![forbid(unsafe_code)]

//! `devloop` — local development orchestrator.
//!
//! Watches a source tree, rebuilds the target executable with an external
//! compiler toolchain, and relaunches the single headless debug-server
//! process against the fresh artifact. Change bursts are debounced into one
//! pipeline run, runs never overlap, and a failed build never tears down a
//! still-working debug session.

pub mod build;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod process;
pub mod watcher;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
