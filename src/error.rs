//! Error taxonomy for parsing and managing GridLAB-D models.

use std::fmt;
use std::io;

use thiserror::Error as ThisError;

use crate::glm::entity::EntityKey;

///
/// ParseError
///
/// Structural errors raised while turning tokens into a model. Any of these
/// aborts the parse; no partial model is returned.
///
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum ParseError {
    /// A block opener (`... {`) that matches none of the known block shapes.
    #[error("malformed block declaration: `{tokens} {{`")]
    MalformedBlock { tokens: String },

    /// A top-level line that is neither a directive nor a one-line module.
    #[error("malformed top-level statement: `{tokens}`")]
    MalformedLine { tokens: String },

    /// Class bodies only support `<type> <name>;` members.
    #[error("malformed class member in class {class}: `{tokens}` (only simple properties are supported)")]
    MalformedClass { class: String, tokens: String },

    /// The same property key appeared twice in one entity.
    #[error("duplicate property `{property}` in {entity}")]
    DuplicateProperty { property: String, entity: String },

    /// A property key without any value tokens.
    #[error("property `{property}` has no value in {entity}")]
    MissingValue { property: String, entity: String },

    /// A closing brace with nothing open.
    #[error("unbalanced braces: `}}` with no open block")]
    UnbalancedBraces,

    /// The input ended while a block was still open.
    #[error("unexpected end of input: {open} block(s) left open")]
    UnclosedBlock { open: usize },

    /// Only objects may contain nested blocks.
    #[error("nested block `{tokens}` inside {entity}, which cannot hold children")]
    NestedInNonObject { tokens: String, entity: String },

    /// Clock, module, class and schedule blocks must sit at the top level.
    #[error("`{kind}` block must be declared at the top level")]
    MisplacedBlock { kind: String },

    /// A nested object needs its enclosing object's name to be hoisted.
    #[error("nested {child_type} object sits inside an unnamed {parent_type} object")]
    UnnamedEnclosing {
        parent_type: String,
        child_type: String,
    },
}

///
/// ItemId
///
/// Identifies one item of a model in error messages and lookups.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemId {
    Clock,
    Directive(String),
    Module(String),
    Class(String),
    Schedule(String),
    Object { type_name: String, name: String },
    ObjectType(String),
    Key(EntityKey),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clock => write!(f, "clock"),
            Self::Directive(keyword) => write!(f, "{keyword} directive"),
            Self::Module(name) => write!(f, "module {name}"),
            Self::Class(name) => write!(f, "class {name}"),
            Self::Schedule(name) => write!(f, "schedule {name}"),
            Self::Object { type_name, name } => write!(f, "{type_name} object {name}"),
            Self::ObjectType(type_name) => write!(f, "objects of type {type_name}"),
            Self::Key(key) => write!(f, "entity #{key}"),
        }
    }
}

///
/// ModelError
///
/// Everything the manager can report: parse failures, identity conflicts,
/// lookup failures and invalid requests.
///
#[derive(Debug, ThisError)]
pub enum ModelError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A uniqueness invariant would be violated.
    #[error("{0} already exists in the model")]
    ItemExists(ItemId),

    /// The requested item is not in the model.
    #[error("{0} does not exist in the model")]
    NotFound(ItemId),

    /// The request is well-formed but not supported for this item.
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl ModelError {
    /// Returns `true` for lookup failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` for identity conflicts.
    pub fn is_item_exists(&self) -> bool {
        matches!(self, Self::ItemExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_display_names_the_item() {
        let id = ItemId::Object {
            type_name: "meter".to_string(),
            name: "m1".to_string(),
        };
        assert_eq!(id.to_string(), "meter object m1");
        assert_eq!(ItemId::Key(-3).to_string(), "entity #-3");
    }

    #[test]
    fn model_error_wraps_parse_error() {
        let err = ModelError::from(ParseError::UnbalancedBraces);
        assert!(err.to_string().contains("unbalanced braces"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn exists_and_not_found_predicates() {
        assert!(ModelError::ItemExists(ItemId::Clock).is_item_exists());
        assert!(ModelError::NotFound(ItemId::Clock).is_not_found());
    }
}
