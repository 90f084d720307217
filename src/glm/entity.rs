//! Entity variants and the flat, integer-keyed model that holds them.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

/// Key of an entity in the flat model. Ascending key order is write order.
pub type EntityKey = i64;

/// Ordered property map (insertion order is preserved on write).
pub type Properties = IndexMap<String, String>;

/// Preprocessor directive keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind {
    Include,
    Set,
    Define,
    Ifdef,
    Ifndef,
    Else,
    Endif,
    /// Any other `#keyword`, kept as written.
    Other(String),
}

impl DirectiveKind {
    /// Maps a `#keyword` token to its kind.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "#include" => Self::Include,
            "#set" => Self::Set,
            "#define" => Self::Define,
            "#ifdef" => Self::Ifdef,
            "#ifndef" => Self::Ifndef,
            "#else" => Self::Else,
            "#endif" => Self::Endif,
            other => Self::Other(other.to_string()),
        }
    }

    /// The keyword as it appears in model text.
    pub fn keyword(&self) -> &str {
        match self {
            Self::Include => "#include",
            Self::Set => "#set",
            Self::Define => "#define",
            Self::Ifdef => "#ifdef",
            Self::Ifndef => "#ifndef",
            Self::Else => "#else",
            Self::Endif => "#endif",
            Self::Other(keyword) => keyword,
        }
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Single-line preprocessor statement such as `#set profiler=1;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub argument: String,
}

impl Directive {
    pub fn new(kind: DirectiveKind, argument: impl Into<String>) -> Self {
        Self {
            kind,
            argument: argument.into(),
        }
    }
}

/// `module <name> { ... }` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    pub properties: Properties,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// The singleton `clock` block.
///
/// The three well-known fields are kept apart from any other clock property
/// so the writer can emit them in the order the simulator expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Clock {
    pub starttime: Option<String>,
    pub stoptime: Option<String>,
    pub timezone: Option<String>,
    /// Remaining clock properties, in document order.
    pub extra: Properties,
}

impl Clock {
    /// Creates a clock with all three required fields set.
    pub fn new(
        starttime: impl Into<String>,
        stoptime: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Self {
        Self {
            starttime: Some(starttime.into()),
            stoptime: Some(stoptime.into()),
            timezone: Some(timezone.into()),
            extra: Properties::new(),
        }
    }

    /// Returns `true` when starttime, stoptime and timezone are all set.
    pub fn is_complete(&self) -> bool {
        self.starttime.is_some() && self.stoptime.is_some() && self.timezone.is_some()
    }

    /// Mutable slot for one of the well-known fields, if `key` names one.
    pub(crate) fn field_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        match key {
            "starttime" => Some(&mut self.starttime),
            "stoptime" => Some(&mut self.stoptime),
            "timezone" => Some(&mut self.timezone),
            _ => None,
        }
    }

    /// Whether `key` is already set, either as a field or an extra property.
    pub(crate) fn has(&self, key: &str) -> bool {
        match key {
            "starttime" => self.starttime.is_some(),
            "stoptime" => self.stoptime.is_some(),
            "timezone" => self.timezone.is_some(),
            other => self.extra.contains_key(other),
        }
    }
}

/// Runtime class with simple property members only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDef {
    pub name: String,
    /// Member types, parallel to `variable_names`.
    pub variable_types: Vec<String>,
    pub variable_names: Vec<String>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variable_types: Vec::new(),
            variable_names: Vec::new(),
        }
    }

    /// Appends a `<type> <name>;` member.
    pub fn with_member(mut self, var_type: impl Into<String>, var_name: impl Into<String>) -> Self {
        self.variable_types.push(var_type.into());
        self.variable_names.push(var_name.into());
        self
    }
}

/// `schedule <name> { ... }` block with its cron body kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub name: String,
    pub cron_body: String,
}

/// `object <type> { ... }` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Object {
    pub type_name: String,
    pub properties: Properties,
    /// Keys of objects declared inline in this object's body. Empty once a
    /// model has been un-nested.
    pub children: Vec<EntityKey>,
}

impl Object {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Properties::new(),
            children: Vec::new(),
        }
    }

    /// Builder-style property setter.
    ///
    /// # Examples
    ///
    /// ```
    /// use glm_manager::glm::entity::Object;
    ///
    /// let meter = Object::new("meter").with("name", "m1").with("phases", "AB");
    /// assert_eq!(meter.name(), Some("m1"));
    /// assert_eq!(meter.get("phases"), Some("AB"));
    /// ```
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The object's `name` property, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    /// The object's `parent` property, if it has one.
    pub fn parent(&self) -> Option<&str> {
        self.get("parent")
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// One parsed unit of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Directive(Directive),
    Module(Module),
    Clock(Clock),
    Class(ClassDef),
    Schedule(Schedule),
    Object(Object),
}

impl Entity {
    /// Short kind label used in logs and exports.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Directive(_) => "directive",
            Self::Module(_) => "module",
            Self::Clock(_) => "clock",
            Self::Class(_) => "class",
            Self::Schedule(_) => "schedule",
            Self::Object(_) => "object",
        }
    }

    /// Human-readable description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Directive(d) => format!("{} directive", d.kind),
            Self::Module(m) => format!("module {}", m.name),
            Self::Clock(_) => "clock".to_string(),
            Self::Class(c) => format!("class {}", c.name),
            Self::Schedule(s) => format!("schedule {}", s.name),
            Self::Object(o) => match o.name() {
                Some(name) => format!("{} object {name}", o.type_name),
                None => format!("unnamed {} object", o.type_name),
            },
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }
}

impl From<Object> for Entity {
    fn from(o: Object) -> Self {
        Self::Object(o)
    }
}

impl From<Module> for Entity {
    fn from(m: Module) -> Self {
        Self::Module(m)
    }
}

impl From<Clock> for Entity {
    fn from(c: Clock) -> Self {
        Self::Clock(c)
    }
}

impl From<ClassDef> for Entity {
    fn from(c: ClassDef) -> Self {
        Self::Class(c)
    }
}

impl From<Schedule> for Entity {
    fn from(s: Schedule) -> Self {
        Self::Schedule(s)
    }
}

impl From<Directive> for Entity {
    fn from(d: Directive) -> Self {
        Self::Directive(d)
    }
}

/// Flat, key-ordered map of every entity in a model.
///
/// Nested objects live in the same map as everything else; an entity is
/// nested when some object lists its key in `children`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    entities: BTreeMap<EntityKey, Entity>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(&key)
    }

    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(&key)
    }

    pub fn contains_key(&self, key: EntityKey) -> bool {
        self.entities.contains_key(&key)
    }

    /// Inserts an entity, returning whatever previously held the key.
    pub fn insert(&mut self, key: EntityKey, entity: Entity) -> Option<Entity> {
        self.entities.insert(key, entity)
    }

    pub fn remove(&mut self, key: EntityKey) -> Option<Entity> {
        self.entities.remove(&key)
    }

    /// Iterates entities in ascending key (write) order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> + '_ {
        self.entities.iter().map(|(k, e)| (*k, e))
    }

    pub fn keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.entities.keys().copied()
    }

    pub fn first_key(&self) -> Option<EntityKey> {
        self.entities.keys().next().copied()
    }

    pub fn last_key(&self) -> Option<EntityKey> {
        self.entities.keys().next_back().copied()
    }

    /// Keys listed as a child of some object.
    pub fn nested_keys(&self) -> HashSet<EntityKey> {
        self.entities
            .values()
            .filter_map(Entity::as_object)
            .flat_map(|o| o.children.iter().copied())
            .collect()
    }

    /// Iterates objects in write order.
    pub fn objects(&self) -> impl Iterator<Item = (EntityKey, &Object)> + '_ {
        self.iter()
            .filter_map(|(k, e)| e.as_object().map(|o| (k, o)))
    }
}
