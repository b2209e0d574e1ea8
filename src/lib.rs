//! npm-accel - Accelerator for npm, the Node.js package manager
//!
//! Caches complete `node_modules` directories in tar archives keyed by a
//! fingerprint of the dependencies and the Node.js and installer versions,
//! so rebuilding an unchanged dependency tree is a single unpack.

pub mod accel;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod installer;
pub mod manifest;

pub use error::{AccelError, AccelResult};
