//! Tree builder: turns tokens into a flat [`Model`].
//!
//! Parsing runs in three passes over the same key space:
//!
//! 1. [`build_tree`] consumes the token stack and produces entities, with
//!    inline objects recorded as `children` of their enclosing object.
//! 2. [`migrate_legacy_syntax`] rewrites `type:id` objects into named objects.
//! 3. [`RawTree::finish`] hoists every nested object to the top level, adding
//!    a `parent` back-reference or, for embedded configuration slots, a
//!    property on the enclosing object that names the hoisted object.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::{ModelError, ParseError};
use crate::glm::entity::{
    ClassDef, Clock, Directive, DirectiveKind, Entity, EntityKey, Model, Module, Object,
    Properties, Schedule,
};
use crate::glm::token::{NEWLINE, tokenize, tokenize_file};

/// Mean replacement time (seconds) given to fuses that do not declare one.
pub const FUSE_MEAN_REPLACEMENT_TIME: &str = "3600.0";

/// Parses model text into an un-nested, migrated model.
///
/// # Errors
///
/// Returns a `ParseError` for any structural problem in the input.
///
/// # Examples
///
/// ```
/// use glm_manager::glm::parser::parse_str;
///
/// let model = parse_str("object meter { name \"m1\"; phases AB; }").unwrap();
/// let meter = model.get(0).and_then(|e| e.as_object()).unwrap();
/// assert_eq!(meter.type_name, "meter");
/// assert_eq!(meter.get("name"), Some("\"m1\""));
/// ```
pub fn parse_str(text: &str) -> Result<Model, ParseError> {
    parse_tokens(tokenize(text))
}

/// Reads and parses a model file.
///
/// # Errors
///
/// Returns `ModelError::Io` if the file cannot be read and
/// `ModelError::Parse` if its content is malformed.
pub fn parse_file(path: &Path) -> Result<Model, ModelError> {
    let tokens = tokenize_file(path)?;
    Ok(parse_tokens(tokens)?)
}

/// Runs all three passes over an existing token list.
///
/// # Errors
///
/// Returns a `ParseError` for any structural problem in the input.
pub fn parse_tokens(tokens: Vec<String>) -> Result<Model, ParseError> {
    let mut tree = build_tree(tokens)?;
    migrate_legacy_syntax(&mut tree.model);
    tree.finish()
}

/// Output of the first pass: a model whose objects may still hold children.
#[derive(Debug, Clone, Default)]
pub struct RawTree {
    pub model: Model,
    /// Embedded configuration objects, mapped to the property slot they
    /// were declared in (`configuration object line_configuration { ... }`).
    pub embedded: HashMap<EntityKey, String>,
}

impl RawTree {
    /// Hoists every nested object to the top level.
    ///
    /// Objects are visited in key order, so an enclosing object's name is
    /// settled (including synthesized ones) before its children are hoisted.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::UnnamedEnclosing` when a nested object sits in an
    /// object with no name to refer back to.
    pub fn finish(mut self) -> Result<Model, ParseError> {
        let keys: Vec<EntityKey> = self.model.keys().collect();
        for key in keys {
            let (parent_type, parent_name, children) = match self.model.get_mut(key) {
                Some(Entity::Object(o)) if !o.children.is_empty() => (
                    o.type_name.clone(),
                    o.name().map(str::to_string),
                    std::mem::take(&mut o.children),
                ),
                _ => continue,
            };

            for child_key in children {
                let Some(Entity::Object(child)) = self.model.get_mut(child_key) else {
                    continue;
                };
                let unnamed_enclosing = ParseError::UnnamedEnclosing {
                    parent_type: parent_type.clone(),
                    child_type: child.type_name.clone(),
                };

                match self.embedded.get(&child_key) {
                    Some(slot) => {
                        let child_name = match child.name() {
                            Some(name) => name.to_string(),
                            None => {
                                let enclosing =
                                    parent_name.as_deref().ok_or(unnamed_enclosing)?;
                                let name = suffixed_name(enclosing, &format!("_{slot}"));
                                child
                                    .properties
                                    .shift_insert(0, "name".to_string(), name.clone());
                                name
                            }
                        };
                        if let Some(parent) = self.model.get_mut(key) {
                            add_property(parent, slot.clone(), child_name)?;
                        }
                    }
                    None => {
                        let enclosing = parent_name.as_deref().ok_or(unnamed_enclosing)?;
                        child
                            .properties
                            .insert("parent".to_string(), enclosing.to_string());
                    }
                }
            }
        }
        Ok(self.model)
    }
}

/// Runs the first pass only, leaving nested objects in place.
///
/// # Errors
///
/// Returns a `ParseError` for any structural problem in the input.
pub fn build_tree(tokens: Vec<String>) -> Result<RawTree, ParseError> {
    TreeBuilder::new(tokens).build()
}

/// Rewrites legacy `object <type>:<id>` declarations.
///
/// A legacy object without a `name` is named after its identifier (colon
/// replaced by underscore) and its type loses the `:<id>` suffix. Any
/// property value that equals a legacy identifier is pointed at that
/// object's name. Remaining colons in a legacy object's values become
/// underscores. Fuses without a `mean_replacement_time` receive
/// [`FUSE_MEAN_REPLACEMENT_TIME`].
pub fn migrate_legacy_syntax(model: &mut Model) {
    let keys: Vec<EntityKey> = model.keys().collect();

    let mut renamed: HashMap<String, String> = HashMap::new();
    for (_, entity) in model.iter() {
        let Entity::Object(obj) = entity else {
            continue;
        };
        if obj.type_name.contains(':') {
            let name = obj
                .name()
                .map_or_else(|| obj.type_name.replace(':', "_"), str::to_string);
            renamed.insert(obj.type_name.clone(), name);
        }
    }

    for &key in &keys {
        let Some(Entity::Object(obj)) = model.get_mut(key) else {
            continue;
        };

        if let Some((base, _)) = obj.type_name.split_once(':') {
            let base = base.to_string();
            if !obj.properties.contains_key("name") {
                obj.properties
                    .shift_insert(0, "name".to_string(), obj.type_name.replace(':', "_"));
            }
            obj.type_name = base;
            for value in obj.properties.values_mut() {
                if let Some(new_name) = renamed.get(value.as_str()) {
                    *value = new_name.clone();
                } else if value.contains(':') {
                    *value = value.replace(':', "_");
                }
            }
        } else if !renamed.is_empty() {
            for value in obj.properties.values_mut() {
                if let Some(new_name) = renamed.get(value.as_str()) {
                    *value = new_name.clone();
                }
            }
        }

        if obj.type_name == "fuse" && !obj.properties.contains_key("mean_replacement_time") {
            debug!(fuse = ?obj.name(), "defaulting fuse mean_replacement_time");
            obj.properties.insert(
                "mean_replacement_time".to_string(),
                FUSE_MEAN_REPLACEMENT_TIME.to_string(),
            );
        }
    }
}

/// Appends `suffix` to an identifier, keeping a closing double quote last.
///
/// ```
/// use glm_manager::glm::parser::suffixed_name;
///
/// assert_eq!(suffixed_name("\"sub\"", "_meter"), "\"sub_meter\"");
/// assert_eq!(suffixed_name("sub", "_meter"), "sub_meter");
/// ```
pub fn suffixed_name(name: &str, suffix: &str) -> String {
    match name.strip_suffix('"') {
        Some(stem) if !stem.is_empty() => format!("{stem}{suffix}\""),
        _ => format!("{name}{suffix}"),
    }
}

/// How a token group ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Open,
    Close,
    Semicolon,
    Newline,
    Eof,
}

#[derive(Debug)]
struct Group {
    tokens: Vec<String>,
    end: End,
}

#[derive(Debug)]
enum Step {
    Group(Group),
    /// Tokens following a leading `shape` keyword up to the line break.
    Shape(Vec<String>),
}

struct TreeBuilder {
    /// Remaining tokens, last token first so `pop` yields document order.
    tokens: Vec<String>,
    model: Model,
    next_key: EntityKey,
    /// Keys of the blocks currently open, innermost last.
    stack: Vec<EntityKey>,
    embedded: HashMap<EntityKey, String>,
}

impl TreeBuilder {
    fn new(mut tokens: Vec<String>) -> Self {
        tokens.reverse();
        Self {
            tokens,
            model: Model::new(),
            next_key: 0,
            stack: Vec::new(),
            embedded: HashMap::new(),
        }
    }

    fn build(mut self) -> Result<RawTree, ParseError> {
        while let Some(step) = self.next_step() {
            match step {
                Step::Shape(tokens) => self.shape(tokens)?,
                Step::Group(group) => self.group(group)?,
            }
        }
        if !self.stack.is_empty() {
            return Err(ParseError::UnclosedBlock {
                open: self.stack.len(),
            });
        }
        Ok(RawTree {
            model: self.model,
            embedded: self.embedded,
        })
    }

    /// Pops tokens until a group terminator. Line breaks only end directive
    /// lines; everywhere else they are plain whitespace.
    fn next_step(&mut self) -> Option<Step> {
        let mut group: Vec<String> = Vec::new();
        loop {
            let Some(token) = self.tokens.pop() else {
                return (!group.is_empty()).then_some(Step::Group(Group {
                    tokens: group,
                    end: End::Eof,
                }));
            };
            let end = match token.as_str() {
                "{" => Some(End::Open),
                "}" => Some(End::Close),
                ";" => Some(End::Semicolon),
                NEWLINE => {
                    if group.first().is_some_and(|t| t.starts_with('#')) {
                        Some(End::Newline)
                    } else {
                        continue;
                    }
                }
                "shape" if group.is_empty() => return Some(Step::Shape(self.take_line())),
                _ => None,
            };
            match end {
                Some(end) => return Some(Step::Group(Group { tokens: group, end })),
                None => group.push(token),
            }
        }
    }

    fn take_line(&mut self) -> Vec<String> {
        let mut line = Vec::new();
        while let Some(token) = self.tokens.pop() {
            if token == NEWLINE {
                break;
            }
            line.push(token);
        }
        line
    }

    fn group(&mut self, group: Group) -> Result<(), ParseError> {
        if group.end == End::Open && group.tokens.first().is_some_and(|t| t == "schedule") {
            return self.schedule(group.tokens);
        }

        if let Some(class_key) = self.open_class() {
            let closes_or_blank =
                group.tokens.is_empty() && matches!(group.end, End::Close | End::Semicolon);
            if !closes_or_blank {
                return self.class_member(class_key, group);
            }
        }

        match group.end {
            End::Open => self.open_block(group.tokens),
            End::Close => self.close_block(group.tokens),
            End::Semicolon | End::Newline | End::Eof => {
                if group.tokens.is_empty() {
                    return Ok(());
                }
                match self.stack.last().copied() {
                    None => self.top_level_line(group.tokens),
                    Some(_) if group.end == End::Eof => Err(ParseError::UnclosedBlock {
                        open: self.stack.len(),
                    }),
                    Some(key) => self.property(key, group.tokens),
                }
            }
        }
    }

    fn alloc_key(&mut self) -> EntityKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    fn open_class(&self) -> Option<EntityKey> {
        let key = *self.stack.last()?;
        matches!(self.model.get(key), Some(Entity::Class(_))).then_some(key)
    }

    fn class_member(&mut self, class_key: EntityKey, group: Group) -> Result<(), ParseError> {
        let Some(Entity::Class(class)) = self.model.get_mut(class_key) else {
            return Ok(());
        };
        match (group.tokens.as_slice(), group.end) {
            ([var_type, var_name], End::Semicolon) => {
                class.variable_types.push(var_type.clone());
                class.variable_names.push(var_name.clone());
                Ok(())
            }
            _ => Err(ParseError::MalformedClass {
                class: class.name.clone(),
                tokens: render_group(&group),
            }),
        }
    }

    fn open_block(&mut self, tokens: Vec<String>) -> Result<(), ParseError> {
        let parent = self.stack.last().copied();
        let (entity, slot): (Entity, Option<String>) = match tokens.as_slice() {
            [kw] if kw == "clock" => {
                top_level_only(parent, "clock")?;
                (Clock::default().into(), None)
            }
            [kw, name] if kw == "module" => {
                top_level_only(parent, "module")?;
                (Module::new(name.as_str()).into(), None)
            }
            [kw, name] if kw == "class" => {
                top_level_only(parent, "class")?;
                (ClassDef::new(name.as_str()).into(), None)
            }
            [kw, type_name] if kw == "object" => (Object::new(type_name.as_str()).into(), None),
            [slot, kw, type_name] if kw == "object" && parent.is_some() => {
                (Object::new(type_name.as_str()).into(), Some(slot.clone()))
            }
            _ => {
                return Err(ParseError::MalformedBlock {
                    tokens: tokens.join(" "),
                });
            }
        };

        let key = self.next_key;
        if let Some(parent_key) = parent {
            match self.model.get_mut(parent_key) {
                Some(Entity::Object(enclosing)) => enclosing.children.push(key),
                Some(other) => {
                    return Err(ParseError::NestedInNonObject {
                        tokens: tokens.join(" "),
                        entity: other.describe(),
                    });
                }
                None => {}
            }
        }

        let key = self.alloc_key();
        self.model.insert(key, entity);
        if let Some(slot) = slot {
            self.embedded.insert(key, slot);
        }
        self.stack.push(key);
        Ok(())
    }

    fn close_block(&mut self, tokens: Vec<String>) -> Result<(), ParseError> {
        let key = self.stack.pop().ok_or(ParseError::UnbalancedBraces)?;
        if tokens.is_empty() {
            return Ok(());
        }
        self.property(key, tokens)
    }

    fn property(&mut self, key: EntityKey, tokens: Vec<String>) -> Result<(), ParseError> {
        let Some(entity) = self.model.get_mut(key) else {
            return Ok(());
        };
        let mut tokens = tokens.into_iter();
        let Some(name) = tokens.next() else {
            return Ok(());
        };
        let value = tokens.collect::<Vec<_>>().join(" ");
        // `#ifdef X` / `#endif` lines inside a body stay in place as
        // properties, the latter without a value.
        if value.is_empty() && !name.starts_with('#') {
            return Err(ParseError::MissingValue {
                property: name,
                entity: entity.describe(),
            });
        }
        add_property(entity, name, value)
    }

    fn shape(&mut self, mut tokens: Vec<String>) -> Result<(), ParseError> {
        let Some(&key) = self.stack.last() else {
            return Err(ParseError::MalformedLine {
                tokens: format!("shape {}", tokens.join(" ")),
            });
        };
        if tokens.last().is_some_and(|t| t == ";") {
            tokens.pop();
        }
        let mut line = vec!["shape".to_string()];
        line.extend(tokens);
        self.property(key, line)
    }

    fn top_level_line(&mut self, tokens: Vec<String>) -> Result<(), ParseError> {
        let entity: Entity = match tokens.as_slice() {
            [keyword, args @ ..] if keyword.starts_with('#') => {
                let kind = DirectiveKind::from_keyword(keyword);
                // Macro references split include paths without whitespace.
                let argument = if kind == DirectiveKind::Include {
                    args.concat()
                } else {
                    args.join(" ")
                };
                Directive::new(kind, argument).into()
            }
            [kw, name] if kw == "module" => Module::new(name.as_str()).into(),
            _ => {
                return Err(ParseError::MalformedLine {
                    tokens: tokens.join(" "),
                });
            }
        };
        let key = self.alloc_key();
        self.model.insert(key, entity);
        Ok(())
    }

    /// Consumes a schedule verbatim up to its matching closing brace.
    fn schedule(&mut self, tokens: Vec<String>) -> Result<(), ParseError> {
        let name = match tokens.as_slice() {
            [_, name] => name.clone(),
            _ => {
                return Err(ParseError::MalformedBlock {
                    tokens: tokens.join(" "),
                });
            }
        };
        if !self.stack.is_empty() {
            return Err(ParseError::MisplacedBlock {
                kind: "schedule".to_string(),
            });
        }

        let mut depth = 1usize;
        let mut body = Vec::new();
        loop {
            let token = self
                .tokens
                .pop()
                .ok_or(ParseError::UnclosedBlock { open: depth })?;
            match token.as_str() {
                "{" => depth += 1,
                "}" => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            body.push(token);
        }

        let key = self.alloc_key();
        self.model.insert(
            key,
            Schedule {
                name,
                cron_body: cron_body(&body),
            }
            .into(),
        );
        Ok(())
    }
}

fn top_level_only(parent: Option<EntityKey>, kind: &str) -> Result<(), ParseError> {
    match parent {
        Some(_) => Err(ParseError::MisplacedBlock {
            kind: kind.to_string(),
        }),
        None => Ok(()),
    }
}

/// Adds a property, rejecting duplicates.
pub(crate) fn add_property(
    entity: &mut Entity,
    key: String,
    value: String,
) -> Result<(), ParseError> {
    let duplicate = match entity {
        Entity::Object(o) => insert_unique(&mut o.properties, key.clone(), value),
        Entity::Module(m) => insert_unique(&mut m.properties, key.clone(), value),
        Entity::Clock(c) => {
            if c.has(&key) {
                true
            } else {
                match c.field_mut(&key) {
                    Some(slot) => *slot = Some(value),
                    None => {
                        c.extra.insert(key.clone(), value);
                    }
                }
                false
            }
        }
        Entity::Class(_) | Entity::Schedule(_) | Entity::Directive(_) => {
            return Err(ParseError::MalformedLine {
                tokens: format!("{key} {value}"),
            });
        }
    };
    if duplicate {
        return Err(ParseError::DuplicateProperty {
            property: key,
            entity: entity.describe(),
        });
    }
    Ok(())
}

fn insert_unique(properties: &mut Properties, key: String, value: String) -> bool {
    if properties.contains_key(&key) {
        return true;
    }
    properties.insert(key, value);
    false
}

/// Joins schedule tokens into lines: single spaces between tokens, `;`
/// attached to the preceding token, blank lines dropped.
fn cron_body(tokens: &[String]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();
    for token in tokens {
        if token == NEWLINE {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            continue;
        }
        if !line.is_empty() && token != ";" {
            line.push(' ');
        }
        line.push_str(token);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines.join("\n")
}

fn render_group(group: &Group) -> String {
    let terminator = match group.end {
        End::Open => " {",
        End::Close => " }",
        End::Semicolon => ";",
        End::Newline | End::Eof => "",
    };
    format!("{}{terminator}", group.tokens.join(" "))
}
