// SPDX-FileCopyrightText: 2025 Timothy Pogue
//
// SPDX-License-Identifier: ISC

//! An in-process object store with server-side apply field ownership.
//!
//! Each leaf field set by an apply is owned by the applying field manager.
//! Applying a different value to a field owned by another manager is a
//! conflict unless forced, in which case ownership moves to the applier.
//! Lists are atomic. Objects with finalizers are only marked as terminating
//! on delete. Used by tests and by hosts that want a dry local backend.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::identity::ResourceIdentity;
use crate::kind::KindDescriptor;
use crate::store::{ApplyParams, ObjectStore, StoreError};

/// Called on every get of an object with the 1-based count of gets so far,
/// before the document is returned
pub type GetHook = Box<dyn FnMut(usize, &mut Value) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Get,
    Apply,
    Delete,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub apply: usize,
    pub delete: usize,
}

type Key = (String, String, String);

struct StoredObject {
    document: Value,
    owners: BTreeMap<String, BTreeSet<String>>,
    gets: usize,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, StoredObject>,
    hooks: HashMap<Key, GetHook>,
    failures: Vec<(Call, StoreError)>,
    calls: CallCounts,
    revision: u64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `document` as if `manager` had applied it with force
    pub fn seed(&self, kind: &KindDescriptor, document: Value, manager: &str) -> Result<Value, StoreError> {
        let id = ResourceIdentity::new(
            document.pointer("/metadata/namespace").and_then(Value::as_str).unwrap_or_default(),
            document.pointer("/metadata/name").and_then(Value::as_str).unwrap_or_default(),
        );
        let params = ApplyParams { field_manager: manager.to_string(), force: true };
        self.lock().apply(kind, &id, &document, &params)
    }

    pub fn document(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Option<Value> {
        self.lock().objects.get(&key(kind, id)).map(|stored| stored.document.clone())
    }

    pub fn contains(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> bool {
        self.lock().objects.contains_key(&key(kind, id))
    }

    /// Field managers owning the field at a JSON pointer
    pub fn owners(&self, kind: &KindDescriptor, id: &ResourceIdentity, pointer: &str) -> BTreeSet<String> {
        self.lock()
            .objects
            .get(&key(kind, id))
            .and_then(|stored| stored.owners.get(pointer).cloned())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    pub fn on_get<F>(&self, kind: &KindDescriptor, id: &ResourceIdentity, hook: F)
    where
        F: FnMut(usize, &mut Value) + Send + 'static,
    {
        self.lock().hooks.insert(key(kind, id), Box::new(hook));
    }

    /// Make the next call of the given type fail with `error`
    pub fn fail_next(&self, call: Call, error: StoreError) {
        self.lock().failures.push((call, error));
    }
}

impl Inner {
    fn take_failure(&mut self, call: Call) -> Option<StoreError> {
        let position = self.failures.iter().position(|(failing, _)| *failing == call)?;
        Some(self.failures.remove(position).1)
    }

    fn get(&mut self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<Value, StoreError> {
        self.calls.get += 1;
        if let Some(error) = self.take_failure(Call::Get) {
            return Err(error);
        }

        let key = key(kind, id);
        let Inner { objects, hooks, .. } = self;
        let stored = objects.get_mut(&key).ok_or_else(|| not_found(kind, id))?;
        stored.gets += 1;
        if let Some(hook) = hooks.get_mut(&key) {
            hook(stored.gets, &mut stored.document);
        }
        Ok(stored.document.clone())
    }

    fn apply(
        &mut self,
        kind: &KindDescriptor,
        id: &ResourceIdentity,
        desired: &Value,
        params: &ApplyParams,
    ) -> Result<Value, StoreError> {
        let manager = params.field_manager.as_str();
        let fields = leaf_fields(desired);
        let key = key(kind, id);

        if let Some(existing) = self.objects.get(&key) {
            let conflicts: Vec<String> = fields
                .iter()
                .filter(|&(pointer, value)| {
                    let foreign = existing
                        .owners
                        .get(pointer)
                        .is_some_and(|owners| owners.iter().any(|owner| owner != manager));
                    foreign && existing.document.pointer(pointer) != Some(*value)
                })
                .map(|(pointer, _)| {
                    let owners: Vec<&str> = existing.owners[pointer].iter().map(String::as_str).collect();
                    format!("conflict with {:?}: {}", owners.join(", "), pointer)
                })
                .collect();
            if !conflicts.is_empty() && !params.force {
                return Err(StoreError::Conflict {
                    message: format!("Apply failed with {} conflict(s): {}", conflicts.len(), conflicts.join("; ")),
                });
            }
        }

        self.revision += 1;
        let revision = self.revision;
        let stored = self.objects.entry(key).or_insert_with(|| StoredObject {
            document: json!({
                "apiVersion": kind.api_version(),
                "kind": kind.kind,
                "metadata": {"uid": format!("00000000-0000-0000-0000-{:012}", revision)},
            }),
            owners: BTreeMap::new(),
            gets: 0,
        });

        // Fields this manager no longer sets are released and removed once
        // nobody owns them
        let released: Vec<String> = stored
            .owners
            .iter()
            .filter(|(pointer, owners)| owners.contains(manager) && !fields.contains_key(*pointer))
            .map(|(pointer, _)| pointer.clone())
            .collect();
        for pointer in released {
            if let Some(owners) = stored.owners.get_mut(&pointer) {
                owners.remove(manager);
                if owners.is_empty() {
                    stored.owners.remove(&pointer);
                    remove_pointer(&mut stored.document, &pointer);
                }
            }
        }

        for (pointer, value) in &fields {
            let changed = stored.document.pointer(pointer) != Some(*value);
            let owners = stored.owners.entry(pointer.clone()).or_default();
            // A forced change to a contested field takes sole ownership
            if changed && params.force {
                owners.clear();
            }
            owners.insert(manager.to_string());
        }

        let document = std::mem::take(&mut stored.document);
        stored.document = merge_json(document, desired.clone());
        let managed_fields = managed_fields(&stored.owners);
        if let Some(metadata) = stored.document.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.insert("name".to_string(), Value::String(id.name.clone()));
            if kind.is_namespaced() {
                metadata.insert("namespace".to_string(), Value::String(id.namespace.clone()));
            }
            metadata.insert("resourceVersion".to_string(), Value::String(revision.to_string()));
            metadata.insert("managedFields".to_string(), managed_fields);
        }

        Ok(stored.document.clone())
    }

    fn delete(&mut self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<(), StoreError> {
        self.calls.delete += 1;
        if let Some(error) = self.take_failure(Call::Delete) {
            return Err(error);
        }

        let key = key(kind, id);
        let stored = self.objects.get_mut(&key).ok_or_else(|| not_found(kind, id))?;
        let has_finalizers = stored
            .document
            .pointer("/metadata/finalizers")
            .and_then(Value::as_array)
            .is_some_and(|finalizers| !finalizers.is_empty());

        if has_finalizers {
            if let Some(metadata) = stored.document.get_mut("metadata").and_then(Value::as_object_mut) {
                metadata
                    .entry("deletionTimestamp")
                    .or_insert_with(|| Value::String("1970-01-01T00:00:00Z".to_string()));
            }
        } else {
            self.objects.remove(&key);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<Value, StoreError> {
        self.lock().get(kind, id)
    }

    async fn apply_patch(
        &self,
        kind: &KindDescriptor,
        id: &ResourceIdentity,
        desired: &Value,
        params: &ApplyParams,
    ) -> Result<Value, StoreError> {
        let mut inner = self.lock();
        inner.calls.apply += 1;
        if let Some(error) = inner.take_failure(Call::Apply) {
            return Err(error);
        }
        inner.apply(kind, id, desired, params)
    }

    async fn delete(&self, kind: &KindDescriptor, id: &ResourceIdentity) -> Result<(), StoreError> {
        self.lock().delete(kind, id)
    }
}

fn key(kind: &KindDescriptor, id: &ResourceIdentity) -> Key {
    (kind.to_string(), id.namespace.clone(), id.name.clone())
}

fn not_found(kind: &KindDescriptor, id: &ResourceIdentity) -> StoreError {
    StoreError::NotFound {
        message: format!("{}.{} {:?} not found", kind.plural, kind.group, id.name),
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// JSON pointers of every leaf an apply sets. Scalars, lists and empty
/// objects are leaves; type information and the object name are not fields.
fn leaf_fields(desired: &Value) -> BTreeMap<String, &Value> {
    fn walk<'a>(value: &'a Value, pointer: String, out: &mut BTreeMap<String, &'a Value>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    let child_pointer = format!("{}/{}", pointer, escape(key));
                    if matches!(child_pointer.as_str(), "/apiVersion" | "/kind" | "/metadata/name" | "/metadata/namespace") {
                        continue;
                    }
                    walk(child, child_pointer, out);
                }
            },
            _ => {
                out.insert(pointer, value);
            },
        }
    }

    let mut out = BTreeMap::new();
    if let Value::Object(_) = desired {
        walk(desired, String::new(), &mut out);
    }
    out
}

fn remove_pointer(document: &mut Value, pointer: &str) {
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return;
    };
    if let Some(Value::Object(map)) = document.pointer_mut(parent) {
        map.remove(&unescape(last));
    }
}

fn merge_json(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let base_value = base_map.remove(&key).unwrap_or(Value::Null);
                base_map.insert(key, merge_json(base_value, patch_value));
            }
            Value::Object(base_map)
        },
        (_, patch) => patch,
    }
}

fn managed_fields(owners: &BTreeMap<String, BTreeSet<String>>) -> Value {
    let mut by_manager: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();
    for (pointer, managers) in owners {
        for manager in managers {
            by_manager
                .entry(manager.as_str())
                .or_default()
                .insert(pointer.clone(), json!({}));
        }
    }
    Value::Array(
        by_manager
            .into_iter()
            .map(|(manager, fields)| json!({
                "manager": manager,
                "operation": "Apply",
                "fieldsType": "FieldsV1",
                "fieldsV1": fields,
            }))
            .collect(),
    )
}
