//! File outputs besides the model text itself.

pub mod export;
