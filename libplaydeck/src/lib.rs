#![forbid(unsafe_code)]

//! # playdeck
//!
//! The execution core for playdeck. Encapsulates abstractions for things
//! like:
//!
//! - Resolving a host or host-group selection into concrete targets
//! - Validating an execution configuration into an immutable request
//! - Tracking one playbook run from configuration to a terminal status
//! - Ingesting, filtering, selecting, and exporting live execution logs
//!   - Filtering never drops entries; it only hides them from the view.

pub mod config;
pub mod inventory;
#[doc(hidden)]
pub mod ipc;
pub mod lifecycle;
pub mod log;
pub mod logs;
pub mod stream;
pub mod target;
