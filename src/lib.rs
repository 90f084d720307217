//! Reading, editing and writing GridLAB-D model (`.glm`) files.

#[cfg(feature = "api")]
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
/// Tokenizer, tree builder, indices and writer for model text.
pub mod glm;
pub mod io;
pub mod manager;
pub mod prep;

pub use error::{ItemId, ModelError, ParseError};
pub use manager::GlmManager;
