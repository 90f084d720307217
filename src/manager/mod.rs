//! `GlmManager`: the query and mutation surface over a parsed model.
//!
//! The manager owns the flat [`Model`] and its [`ModelMap`] and keeps the two
//! in step: every successful mutation updates both, and every failed one
//! leaves both untouched.

pub mod helpers;

use std::collections::{HashSet, VecDeque};
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::{ItemId, ModelError};
use crate::glm::entity::{ClassDef, Clock, Entity, EntityKey, Model, Module, Object, Schedule};
use crate::glm::index::{ModelMap, NameIndex};
use crate::glm::{parser, writer};

/// Addresses one entity for `modify`, `remove` and `remove_fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Object { type_name: String, name: String },
    Module(String),
    Clock,
    Class(String),
    Schedule(String),
    /// Any entity by key, including directives and unnamed objects.
    Key(EntityKey),
}

impl Selector {
    pub fn object(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Object {
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    fn item_id(&self) -> ItemId {
        match self {
            Self::Object { type_name, name } => ItemId::Object {
                type_name: type_name.clone(),
                name: name.clone(),
            },
            Self::Module(name) => ItemId::Module(name.clone()),
            Self::Clock => ItemId::Clock,
            Self::Class(name) => ItemId::Class(name.clone()),
            Self::Schedule(name) => ItemId::Schedule(name.clone()),
            Self::Key(key) => ItemId::Key(*key),
        }
    }
}

/// Kind of item requested from [`GlmManager::list_by_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind<'a> {
    Clock,
    Module,
    Class,
    Schedule,
    /// Named objects of the given type.
    Object(&'a str),
    /// Objects of any type without a `name`.
    Unnamed,
}

/// Result of [`GlmManager::list_by_type`]. Named items are keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing<'a> {
    Clock(&'a Clock),
    Modules(IndexMap<&'a str, &'a Module>),
    Classes(IndexMap<&'a str, &'a ClassDef>),
    Schedules(IndexMap<&'a str, &'a Schedule>),
    Objects(IndexMap<&'a str, &'a Object>),
    Unnamed(Vec<&'a Object>),
}

impl Listing<'_> {
    pub fn len(&self) -> usize {
        match self {
            Self::Clock(_) => 1,
            Self::Modules(m) => m.len(),
            Self::Classes(c) => c.len(),
            Self::Schedules(s) => s.len(),
            Self::Objects(o) => o.len(),
            Self::Unnamed(u) => u.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owner of a model and its indices.
#[derive(Debug, Clone)]
pub struct GlmManager {
    model: Model,
    map: ModelMap,
    append_key: EntityKey,
    prepend_key: EntityKey,
}

impl GlmManager {
    /// Wraps a parsed model, building its indices.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ItemExists` if the model breaks a uniqueness
    /// invariant (two clocks, two objects of one type sharing a name, ...).
    pub fn new(model: Model) -> Result<Self, ModelError> {
        let map = ModelMap::build(&model)?;
        let append_key = model.last_key().map_or(0, |k| k + 1);
        let prepend_key = model.first_key().map_or(-1, |k| k - 1);
        info!(
            entities = model.len(),
            object_types = map.object_types().count(),
            "model mapped"
        );
        Ok(Self {
            model,
            map,
            append_key,
            prepend_key,
        })
    }

    /// Parses model text and maps it.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Parse` for malformed text and
    /// `ModelError::ItemExists` for identity conflicts.
    pub fn from_glm_str(text: &str) -> Result<Self, ModelError> {
        Self::new(parser::parse_str(text)?)
    }

    /// Reads, parses and maps a model file.
    ///
    /// # Errors
    ///
    /// As [`GlmManager::from_glm_str`], plus `ModelError::Io` when the file
    /// cannot be read.
    pub fn from_glm_file(path: &Path) -> Result<Self, ModelError> {
        let model = parser::parse_file(path)?;
        info!(path = %path.display(), "model parsed");
        Self::new(model)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn map(&self) -> &ModelMap {
        &self.map
    }

    /// Key the next appended entity will receive.
    pub fn append_key(&self) -> EntityKey {
        self.append_key
    }

    /// Key the next prepended entity will receive.
    pub fn prepend_key(&self) -> EntityKey {
        self.prepend_key
    }

    pub fn render(&self) -> String {
        writer::render(&self.model)
    }

    /// Writes the model to `path`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::Io` if the file cannot be written.
    pub fn write_model(&self, path: &Path) -> Result<(), ModelError> {
        writer::write_file(&self.model, path)?;
        info!(path = %path.display(), entities = self.model.len(), "model written");
        Ok(())
    }

    // ---- queries ---------------------------------------------------------

    /// Looks up a named object. Absence is not an error.
    pub fn find(&self, type_name: &str, name: &str) -> Option<&Entity> {
        let key = self.map.object_key(type_name, name)?;
        self.model.get(key)
    }

    pub fn find_object(&self, type_name: &str, name: &str) -> Option<&Object> {
        self.find(type_name, name).and_then(Entity::as_object)
    }

    pub fn find_module(&self, name: &str) -> Option<&Module> {
        match self.model.get(self.map.module_key(name)?)? {
            Entity::Module(m) => Some(m),
            _ => None,
        }
    }

    pub fn clock(&self) -> Option<&Clock> {
        match self.model.get(self.map.clock_key()?)? {
            Entity::Clock(c) => Some(c),
            _ => None,
        }
    }

    /// Resolves a selector to its entity key.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NotFound` if nothing matches.
    pub fn lookup(&self, selector: &Selector) -> Result<EntityKey, ModelError> {
        let key = match selector {
            Selector::Object { type_name, name } => self.map.object_key(type_name, name),
            Selector::Module(name) => self.map.module_key(name),
            Selector::Clock => self.map.clock_key(),
            Selector::Class(name) => self.map.class_key(name),
            Selector::Schedule(name) => self.map.schedule_key(name),
            Selector::Key(key) => self.model.contains_key(*key).then_some(*key),
        };
        key.ok_or_else(|| ModelError::NotFound(selector.item_id()))
    }

    /// Entity addressed by `selector`.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NotFound` if nothing matches.
    pub fn get(&self, selector: &Selector) -> Result<&Entity, ModelError> {
        let key = self.lookup(selector)?;
        self.model
            .get(key)
            .ok_or_else(|| ModelError::NotFound(selector.item_id()))
    }

    /// Lists every item of one kind.
    ///
    /// Returns `None` when the kind never appeared in this model and
    /// `Some` (possibly empty) once it has, even after every instance has
    /// been removed.
    pub fn list_by_type(&self, kind: ItemKind<'_>) -> Option<Listing<'_>> {
        match kind {
            ItemKind::Clock => self.clock().map(Listing::Clock),
            ItemKind::Module => self.map.modules().map(|index| {
                Listing::Modules(self.named(index, |e| match e {
                    Entity::Module(m) => Some(m),
                    _ => None,
                }))
            }),
            ItemKind::Class => self.map.classes().map(|index| {
                Listing::Classes(self.named(index, |e| match e {
                    Entity::Class(c) => Some(c),
                    _ => None,
                }))
            }),
            ItemKind::Schedule => self.map.schedules().map(|index| {
                Listing::Schedules(self.named(index, |e| match e {
                    Entity::Schedule(s) => Some(s),
                    _ => None,
                }))
            }),
            ItemKind::Object(type_name) => self
                .map
                .objects_of_type(type_name)
                .map(|index| Listing::Objects(self.named(index, Entity::as_object))),
            ItemKind::Unnamed => self.map.unnamed_objects().map(|keys| {
                Listing::Unnamed(
                    keys.iter()
                        .filter_map(|k| self.model.get(*k).and_then(Entity::as_object))
                        .collect(),
                )
            }),
        }
    }

    fn named<'a, T: 'a>(
        &'a self,
        index: &'a NameIndex,
        pick: impl Fn(&'a Entity) -> Option<&'a T>,
    ) -> IndexMap<&'a str, &'a T> {
        index
            .iter()
            .filter_map(|(name, key)| {
                let item = self.model.get(*key).and_then(&pick)?;
                Some((name.as_str(), item))
            })
            .collect()
    }

    /// Named objects of one type, or `None` if there are none.
    pub fn get_objects_by_type(&self, type_name: &str) -> Option<Vec<&Object>> {
        let objects: Vec<&Object> = self
            .map
            .objects_of_type(type_name)?
            .values()
            .filter_map(|k| self.model.get(*k).and_then(Entity::as_object))
            .collect();
        (!objects.is_empty()).then_some(objects)
    }

    pub fn module_present(&self, name: &str) -> bool {
        self.map.module_key(name).is_some()
    }

    /// Whether any object of this type has ever been mapped.
    pub fn object_type_present(&self, type_name: &str) -> bool {
        self.map.objects_of_type(type_name).is_some()
    }

    /// Number of objects per type (named and unnamed), in first-seen order.
    pub fn object_counts(&self) -> IndexMap<&str, usize> {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for (_, object) in self.model.objects() {
            *counts.entry(object.type_name.as_str()).or_default() += 1;
        }
        counts
    }

    // ---- mutation --------------------------------------------------------

    /// Adds a new entity.
    ///
    /// Objects are appended after every existing entity; everything else is
    /// prepended before them.
    ///
    /// # Errors
    ///
    /// - `ModelError::ItemExists` if the entity breaks a uniqueness invariant.
    /// - `ModelError::Invalid` for a clock missing one of starttime,
    ///   stoptime or timezone, or an object that still lists children.
    pub fn add(&mut self, entity: impl Into<Entity>) -> Result<EntityKey, ModelError> {
        let entity = entity.into();
        match &entity {
            Entity::Clock(clock) if !clock.is_complete() => {
                return Err(ModelError::Invalid(
                    "a new clock needs starttime, stoptime and timezone".to_string(),
                ));
            }
            Entity::Object(object) if !object.children.is_empty() => {
                return Err(ModelError::Invalid(format!(
                    "{} still has nested children; add them as separate objects",
                    entity.describe()
                )));
            }
            _ => {}
        }
        self.map.check_insert(&entity)?;

        let key = match entity {
            Entity::Object(_) => {
                let key = self.append_key;
                self.append_key += 1;
                key
            }
            _ => {
                let key = self.prepend_key;
                self.prepend_key -= 1;
                key
            }
        };
        self.map.insert(key, &entity)?;
        debug!(key, entity = %entity.describe(), "entity added");
        self.model.insert(key, entity);
        Ok(key)
    }

    /// Overwrites (or adds) fields on an existing entity.
    ///
    /// Identity never changes: an object `name` update must repeat the
    /// current name.
    ///
    /// # Errors
    ///
    /// - `ModelError::NotFound` if the selector matches nothing.
    /// - `ModelError::Invalid` for a rename attempt, or for classes and
    ///   directives, which cannot be modified. Nothing is changed on error.
    pub fn modify<I, K, V>(&mut self, selector: &Selector, updates: I) -> Result<(), ModelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let updates: Vec<(String, String)> = updates
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let key = self.lookup(selector)?;
        let Some(entity) = self.model.get_mut(key) else {
            return Err(ModelError::NotFound(selector.item_id()));
        };

        match entity {
            Entity::Object(object) => {
                let current = object.name().map(str::to_string);
                if let Some((_, new_name)) = updates
                    .iter()
                    .find(|(k, v)| k == "name" && current.as_deref() != Some(v.as_str()))
                {
                    return Err(ModelError::Invalid(format!(
                        "cannot rename {} object to {new_name}",
                        object.type_name
                    )));
                }
                object.properties.extend(updates);
            }
            Entity::Module(module) => module.properties.extend(updates),
            Entity::Clock(clock) => {
                for (k, v) in updates {
                    match clock.field_mut(&k) {
                        Some(slot) => *slot = Some(v),
                        None => {
                            clock.extra.insert(k, v);
                        }
                    }
                }
            }
            Entity::Schedule(schedule) => {
                if let Some((k, _)) = updates.iter().find(|(k, _)| k != "cron_body") {
                    return Err(ModelError::Invalid(format!(
                        "schedule {} has no field {k}",
                        schedule.name
                    )));
                }
                if let Some((_, body)) = updates.into_iter().next_back() {
                    schedule.cron_body = body;
                }
            }
            Entity::Class(_) | Entity::Directive(_) => {
                return Err(ModelError::Invalid(format!(
                    "{} cannot be modified",
                    entity.describe()
                )));
            }
        }
        debug!(key, "entity modified");
        Ok(())
    }

    /// Deletes an entity and its index entry. Dependents are left alone;
    /// see [`GlmManager::remove_with_dependents`].
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NotFound` if the selector matches nothing.
    pub fn remove(&mut self, selector: &Selector) -> Result<Entity, ModelError> {
        let key = self.lookup(selector)?;
        self.remove_key(key)
            .ok_or_else(|| ModelError::NotFound(selector.item_id()))
    }

    fn remove_key(&mut self, key: EntityKey) -> Option<Entity> {
        let entity = self.model.remove(key)?;
        self.map.remove(key, &entity);
        debug!(key, entity = %entity.describe(), "entity removed");
        Some(entity)
    }

    /// Removes a named object plus every object parented to it,
    /// transitively. Returns the removed entities, the named object first.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::NotFound` if the object does not exist.
    pub fn remove_with_dependents(
        &mut self,
        type_name: &str,
        name: &str,
    ) -> Result<Vec<Entity>, ModelError> {
        let root = self.lookup(&Selector::object(type_name, name))?;
        let mut queue = VecDeque::from([root]);
        let mut seen = HashSet::new();
        let mut doomed = Vec::new();

        while let Some(key) = queue.pop_front() {
            if !seen.insert(key) {
                continue;
            }
            doomed.push(key);
            let Some(parent_name) = self
                .model
                .get(key)
                .and_then(Entity::as_object)
                .and_then(Object::name)
            else {
                continue;
            };
            for (child_key, child) in self.model.objects() {
                if child.parent() == Some(parent_name) {
                    queue.push_back(child_key);
                }
            }
        }

        let removed: Vec<Entity> = doomed
            .into_iter()
            .filter_map(|key| self.remove_key(key))
            .collect();
        info!(%type_name, %name, removed = removed.len(), "object removed with dependents");
        Ok(removed)
    }

    /// Removes fields from an entity. Fields that are not set are skipped
    /// and logged.
    ///
    /// # Errors
    ///
    /// - `ModelError::NotFound` if the selector matches nothing.
    /// - `ModelError::Invalid` when asked to drop an object's `name`, or
    ///   for entities without removable fields.
    pub fn remove_fields(&mut self, selector: &Selector, fields: &[&str]) -> Result<(), ModelError> {
        let key = self.lookup(selector)?;
        let Some(entity) = self.model.get_mut(key) else {
            return Err(ModelError::NotFound(selector.item_id()));
        };

        let mut missing = Vec::new();
        match entity {
            Entity::Object(object) => {
                if fields.contains(&"name") && object.name().is_some() {
                    return Err(ModelError::Invalid(format!(
                        "cannot remove the name of a {} object",
                        object.type_name
                    )));
                }
                for field in fields {
                    if object.properties.shift_remove(*field).is_none() {
                        missing.push(*field);
                    }
                }
            }
            Entity::Module(module) => {
                for field in fields {
                    if module.properties.shift_remove(*field).is_none() {
                        missing.push(*field);
                    }
                }
            }
            Entity::Clock(clock) => {
                for field in fields {
                    let removed = match clock.field_mut(field) {
                        Some(slot) => slot.take().is_some(),
                        None => clock.extra.shift_remove(*field).is_some(),
                    };
                    if !removed {
                        missing.push(*field);
                    }
                }
            }
            Entity::Class(_) | Entity::Schedule(_) | Entity::Directive(_) => {
                return Err(ModelError::Invalid(format!(
                    "{} has no removable fields",
                    entity.describe()
                )));
            }
        }
        if !missing.is_empty() {
            debug!(key, ?missing, "fields not present, nothing to remove");
        }
        Ok(())
    }

    /// Runs `f` on every object of `type_name`, named or not, in write order.
    /// Returns how many objects were visited.
    ///
    /// `f` may change any property except the object's identity.
    ///
    /// # Errors
    ///
    /// - `ModelError::NotFound` when the model has no object of this type.
    /// - `ModelError::Invalid` if `f` changes an object's type or name; that
    ///   object's identity is restored and iteration stops.
    pub fn for_each_object_of_type<F>(&mut self, type_name: &str, mut f: F) -> Result<usize, ModelError>
    where
        F: FnMut(&mut Object),
    {
        let keys: Vec<EntityKey> = self
            .model
            .objects()
            .filter(|(_, o)| o.type_name == type_name)
            .map(|(k, _)| k)
            .collect();
        if keys.is_empty() {
            return Err(ModelError::NotFound(ItemId::ObjectType(type_name.to_string())));
        }

        for &key in &keys {
            let Some(object) = self.model.get_mut(key).and_then(Entity::as_object_mut) else {
                continue;
            };
            let name = object.name().map(str::to_string);
            f(object);

            if object.type_name != type_name || object.name() != name.as_deref() {
                object.type_name = type_name.to_string();
                match &name {
                    Some(name) => {
                        object.properties.insert("name".to_string(), name.clone());
                    }
                    None => {
                        object.properties.shift_remove("name");
                    }
                }
                return Err(ModelError::Invalid(format!(
                    "{type_name} object {} changed identity while iterating",
                    name.as_deref().unwrap_or("(unnamed)")
                )));
            }
        }
        Ok(keys.len())
    }
}
