//! Model Map: type-and-name lookup indices derived from a [`Model`].
//!
//! The map never owns entities and is never consulted when writing. It can
//! always be rebuilt from the model with [`ModelMap::build`]; the manager
//! instead keeps it current by calling [`ModelMap::insert`] and
//! [`ModelMap::remove`] alongside every model mutation.

use indexmap::IndexMap;

use crate::error::{ItemId, ModelError};
use crate::glm::entity::{Entity, EntityKey, Model};

/// Name to key lookup for one kind of item.
pub type NameIndex = IndexMap<String, EntityKey>;

/// Derived indices over a model.
///
/// Each index is `None` until the first item of its kind is mapped, and stays
/// `Some` (possibly empty) afterwards. Callers use this to tell "this kind never
/// appeared" apart from "every instance was removed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMap {
    objects: IndexMap<String, NameIndex>,
    unnamed: Option<Vec<EntityKey>>,
    modules: Option<NameIndex>,
    classes: Option<NameIndex>,
    schedules: Option<NameIndex>,
    clock: Option<EntityKey>,
}

impl ModelMap {
    /// Indexes every entity in `model`, descending into nested objects.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ItemExists` on a second clock or a duplicate
    /// object, module, class or schedule name.
    pub fn build(model: &Model) -> Result<Self, ModelError> {
        let mut map = Self::default();
        let nested = model.nested_keys();
        for (key, entity) in model.iter().filter(|(key, _)| !nested.contains(key)) {
            map.index_tree(model, key, entity)?;
        }
        Ok(map)
    }

    fn index_tree(
        &mut self,
        model: &Model,
        key: EntityKey,
        entity: &Entity,
    ) -> Result<(), ModelError> {
        self.insert(key, entity)?;
        if let Entity::Object(object) = entity {
            for &child in &object.children {
                if let Some(child_entity) = model.get(child) {
                    self.index_tree(model, child, child_entity)?;
                }
            }
        }
        Ok(())
    }

    /// Fails if mapping `entity` would break a uniqueness invariant.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ItemExists` naming the conflicting item.
    pub fn check_insert(&self, entity: &Entity) -> Result<(), ModelError> {
        let taken = match entity {
            Entity::Directive(_) => false,
            Entity::Clock(_) => self.clock.is_some(),
            Entity::Module(m) => contains(&self.modules, &m.name),
            Entity::Class(c) => contains(&self.classes, &c.name),
            Entity::Schedule(s) => contains(&self.schedules, &s.name),
            Entity::Object(o) => match o.name() {
                Some(name) => self
                    .objects
                    .get(&o.type_name)
                    .is_some_and(|names| names.contains_key(name)),
                None => false,
            },
        };
        if taken {
            return Err(ModelError::ItemExists(item_id(entity)));
        }
        Ok(())
    }

    /// Maps `entity` under `key`. Directives are not indexed.
    ///
    /// # Errors
    ///
    /// Returns `ModelError::ItemExists` if the item is already mapped.
    pub fn insert(&mut self, key: EntityKey, entity: &Entity) -> Result<(), ModelError> {
        self.check_insert(entity)?;
        match entity {
            Entity::Directive(_) => {}
            Entity::Clock(_) => self.clock = Some(key),
            Entity::Module(m) => {
                self.modules
                    .get_or_insert_with(NameIndex::new)
                    .insert(m.name.clone(), key);
            }
            Entity::Class(c) => {
                self.classes
                    .get_or_insert_with(NameIndex::new)
                    .insert(c.name.clone(), key);
            }
            Entity::Schedule(s) => {
                self.schedules
                    .get_or_insert_with(NameIndex::new)
                    .insert(s.name.clone(), key);
            }
            Entity::Object(o) => {
                let names = self.objects.entry(o.type_name.clone()).or_default();
                match o.name() {
                    Some(name) => {
                        names.insert(name.to_string(), key);
                    }
                    None => self.unnamed.get_or_insert_with(Vec::new).push(key),
                }
            }
        }
        Ok(())
    }

    /// Drops whatever index entry points at `key`.
    pub fn remove(&mut self, key: EntityKey, entity: &Entity) {
        match entity {
            Entity::Directive(_) => {}
            Entity::Clock(_) => {
                if self.clock == Some(key) {
                    self.clock = None;
                }
            }
            Entity::Module(m) => remove_named(&mut self.modules, &m.name, key),
            Entity::Class(c) => remove_named(&mut self.classes, &c.name, key),
            Entity::Schedule(s) => remove_named(&mut self.schedules, &s.name, key),
            Entity::Object(o) => match o.name() {
                Some(name) => {
                    if let Some(names) = self.objects.get_mut(&o.type_name) {
                        if names.get(name) == Some(&key) {
                            names.shift_remove(name);
                        }
                    }
                }
                None => {
                    if let Some(unnamed) = self.unnamed.as_mut() {
                        unnamed.retain(|k| *k != key);
                    }
                }
            },
        }
    }

    pub fn object_key(&self, type_name: &str, name: &str) -> Option<EntityKey> {
        self.objects.get(type_name)?.get(name).copied()
    }

    pub fn module_key(&self, name: &str) -> Option<EntityKey> {
        self.modules.as_ref()?.get(name).copied()
    }

    pub fn class_key(&self, name: &str) -> Option<EntityKey> {
        self.classes.as_ref()?.get(name).copied()
    }

    pub fn schedule_key(&self, name: &str) -> Option<EntityKey> {
        self.schedules.as_ref()?.get(name).copied()
    }

    pub fn clock_key(&self) -> Option<EntityKey> {
        self.clock
    }

    /// Named objects of one type; `None` if the type was never mapped.
    pub fn objects_of_type(&self, type_name: &str) -> Option<&NameIndex> {
        self.objects.get(type_name)
    }

    /// Every object type ever mapped, in first-seen order.
    pub fn object_types(&self) -> impl Iterator<Item = &str> + '_ {
        self.objects.keys().map(String::as_str)
    }

    pub fn unnamed_objects(&self) -> Option<&[EntityKey]> {
        self.unnamed.as_deref()
    }

    pub fn modules(&self) -> Option<&NameIndex> {
        self.modules.as_ref()
    }

    pub fn classes(&self) -> Option<&NameIndex> {
        self.classes.as_ref()
    }

    pub fn schedules(&self) -> Option<&NameIndex> {
        self.schedules.as_ref()
    }
}

fn contains(index: &Option<NameIndex>, name: &str) -> bool {
    index.as_ref().is_some_and(|names| names.contains_key(name))
}

fn remove_named(index: &mut Option<NameIndex>, name: &str, key: EntityKey) {
    if let Some(names) = index.as_mut() {
        if names.get(name) == Some(&key) {
            names.shift_remove(name);
        }
    }
}

/// Identity of an entity for error messages.
fn item_id(entity: &Entity) -> ItemId {
    match entity {
        Entity::Clock(_) => ItemId::Clock,
        Entity::Module(m) => ItemId::Module(m.name.clone()),
        Entity::Class(c) => ItemId::Class(c.name.clone()),
        Entity::Schedule(s) => ItemId::Schedule(s.name.clone()),
        Entity::Object(o) => match o.name() {
            Some(name) => ItemId::Object {
                type_name: o.type_name.clone(),
                name: name.to_string(),
            },
            None => ItemId::ObjectType(o.type_name.clone()),
        },
        Entity::Directive(d) => ItemId::Directive(d.kind.to_string()),
    }
}
