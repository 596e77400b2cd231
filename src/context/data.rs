//! Scoped key/value storage backing each view of a [`ConquerorContext`](super::ConquerorContext).

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Whether an entry stays inside the process or travels with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContextDataScope {
    /// Never leaves the current process.
    #[default]
    InProcess,
    /// Serialized at every transport hop.
    AcrossTransports,
}

/// A value stored in a context data view.
#[derive(Clone)]
pub enum ContextValue {
    /// Plain string value. The only kind that can cross a transport.
    Text(String),
    /// Arbitrary in-process object.
    Object(Arc<dyn Any + Send + Sync>),
}

impl ContextValue {
    /// The string value, if this is a text entry.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::Text(s) => Some(s.as_str()),
            ContextValue::Object(_) => None,
        }
    }
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            ContextValue::Object(_) => f.write_str("Object(..)"),
        }
    }
}

/// A snapshot of one entry, as returned by [`ContextData::entries`].
#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub key: String,
    pub value: ContextValue,
    pub scope: ContextDataScope,
}

type Entries = BTreeMap<String, (ContextValue, ContextDataScope)>;

#[derive(Default)]
struct State {
    entries: Entries,
    /// Keys written or removed since the view was seeded.
    changed: BTreeSet<String>,
}

/// One logical view of context data (downstream, upstream or bidirectional).
///
/// Entries are kept sorted by key so that encoding and iteration are
/// deterministic. The view remembers which keys were written or removed
/// through it, so a child context hands back only its own changes.
#[derive(Default)]
pub struct ContextData {
    state: Mutex<State>,
}

impl ContextData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a string value with the given scope, replacing any existing entry.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, scope: ContextDataScope) {
        self.state
            .lock()
            .write(key.into(), (ContextValue::Text(value.into()), scope));
    }

    /// Set an arbitrary object. Objects are always scoped [`ContextDataScope::InProcess`].
    pub fn set_object<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.state.lock().write(
            key.into(),
            (ContextValue::Object(Arc::new(value)), ContextDataScope::InProcess),
        );
    }

    /// Get a string value. Returns `None` for missing keys and object entries.
    pub fn get(&self, key: &str) -> Option<String> {
        self.state
            .lock()
            .entries
            .get(key)
            .and_then(|(value, _)| value.as_str().map(str::to_string))
    }

    /// Get a typed value.
    ///
    /// Text entries can be read back as `String`.
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.state.lock().entries.get(key).map(|(value, _)| value.clone())?;
        let any: Arc<dyn Any + Send + Sync> = match value {
            ContextValue::Object(obj) => obj,
            ContextValue::Text(s) => Arc::new(s),
        };
        any.downcast::<T>().ok()
    }

    /// The scope of an entry, if present.
    pub fn scope(&self, key: &str) -> Option<ContextDataScope> {
        self.state.lock().entries.get(key).map(|(_, scope)| *scope)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Remove an entry. Returns `true` if it was present.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        state.changed.insert(key.to_string());
        state.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        let keys: Vec<String> = state.entries.keys().cloned().collect();
        state.changed.extend(keys);
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Keys currently present, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    /// Keys written or removed through this view, in sorted order.
    pub fn changed_keys(&self) -> Vec<String> {
        self.state.lock().changed.iter().cloned().collect()
    }

    /// Snapshot of all entries, in key order.
    pub fn entries(&self) -> Vec<ContextEntry> {
        self.state
            .lock()
            .entries
            .iter()
            .map(|(key, (value, scope))| ContextEntry {
                key: key.clone(),
                value: value.clone(),
                scope: *scope,
            })
            .collect()
    }

    /// String entries that must be serialized at a transport hop.
    pub fn where_scope_is_across_transports(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, (_, scope))| *scope == ContextDataScope::AcrossTransports)
            .filter_map(|(key, (value, _))| value.as_str().map(|v| (key.clone(), v.to_string())))
            .collect()
    }

    /// Copy every entry of `other` into this view without recording changes.
    pub(crate) fn seed_from(&self, other: &ContextData) {
        let incoming = other.state.lock().entries.clone();
        self.state.lock().entries.extend(incoming);
    }

    /// Upsert every entry of `other` into this view (last writer wins).
    pub(crate) fn merge_from(&self, other: &ContextData) {
        let incoming = other.state.lock().entries.clone();
        let mut state = self.state.lock();
        for (key, entry) in incoming {
            state.write(key, entry);
        }
    }

    /// Replay the keys `other` wrote or removed onto this view.
    ///
    /// Entries `other` only inherited are left alone.
    pub(crate) fn apply_changes_from(&self, other: &ContextData) {
        let incoming: Vec<(String, Option<(ContextValue, ContextDataScope)>)> = {
            let other = other.state.lock();
            other
                .changed
                .iter()
                .map(|key| (key.clone(), other.entries.get(key).cloned()))
                .collect()
        };

        let mut state = self.state.lock();
        for (key, entry) in incoming {
            match entry {
                Some(entry) => state.write(key, entry),
                None => {
                    state.entries.remove(&key);
                    state.changed.insert(key);
                }
            }
        }
    }
}

impl State {
    fn write(&mut self, key: String, entry: (ContextValue, ContextDataScope)) {
        self.changed.insert(key.clone());
        self.entries.insert(key, entry);
    }
}

impl fmt::Debug for ContextData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.state
                    .lock()
                    .entries
                    .iter()
                    .map(|(key, (value, scope))| (key.clone(), (value.clone(), *scope))),
            )
            .finish()
    }
}
