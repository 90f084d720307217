//! GridLAB-D model text: tokenizer, tree builder, indices and writer.

pub mod entity;
pub mod index;
pub mod parser;
pub mod token;
pub mod writer;

pub use entity::{ClassDef, Clock, Directive, DirectiveKind, Entity, EntityKey, Model, Module, Object, Schedule};
pub use index::ModelMap;
pub use parser::{parse_file, parse_str};
pub use writer::render;
