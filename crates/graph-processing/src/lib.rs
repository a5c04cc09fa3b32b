#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod edge;
pub mod engine;
pub mod error;
pub mod graph;
pub mod message;
pub mod registry;
pub mod value;
pub mod vertex;

pub use error::{Error, Result};
pub use registry::Registry;
