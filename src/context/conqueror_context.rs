//! The per-operation context handle.
//!
//! A [`ConquerorContext`] is a cheap, cloneable handle to shared state for one
//! logical call tree. It carries three data views plus transient items:
//!
//! - `downstream`: flows from the caller into the operation
//! - `upstream`: flows from the operation back to the caller
//! - `bidirectional`: visible both ways
//! - items: process-local values, only readable while the context is active
//!
//! Nested operations run in a child created by [`ConquerorContext::create_child`].
//! The child sees the parent's downstream and bidirectional data; when it is
//! disposed its upstream and bidirectional data flow back into the parent.
//!
//! ## Example
//!
//! ```ignore
//! let root = ConquerorContext::new();
//! root.downstream().set("tenant", "acme", ContextDataScope::AcrossTransports);
//!
//! let child = root.create_child();
//! {
//!     let _scope = child.activate()?;
//!     assert_eq!(child.downstream().get("tenant").as_deref(), Some("acme"));
//!     child.upstream().set("handled-by", "orders", ContextDataScope::AcrossTransports);
//! } // scope dropped: child disposed and merged
//!
//! assert_eq!(root.upstream().get("handled-by").as_deref(), Some("orders"));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::data::ContextData;
use super::error::ContextError;

/// Generate a fresh identifier (32 lowercase hex characters).
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

struct ContextInner {
    id: String,
    trace_id: String,
    message_id: Mutex<Option<String>>,
    downstream: ContextData,
    upstream: ContextData,
    bidirectional: ContextData,
    items: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    active: AtomicBool,
    merged: AtomicBool,
    parent: Option<ConquerorContext>,
}

/// Shared context for one logical operation and its nested calls.
#[derive(Clone)]
pub struct ConquerorContext {
    inner: Arc<ContextInner>,
}

impl ConquerorContext {
    /// Create a new root context with a fresh trace id.
    pub fn new() -> Self {
        Self::with_trace_id(new_id())
    }

    /// Create a new root context that continues an existing trace.
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self::build(trace_id.into(), None)
    }

    fn build(trace_id: String, parent: Option<ConquerorContext>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: new_id(),
                trace_id,
                message_id: Mutex::new(None),
                downstream: ContextData::new(),
                upstream: ContextData::new(),
                bidirectional: ContextData::new(),
                items: Mutex::new(HashMap::new()),
                active: AtomicBool::new(false),
                merged: AtomicBool::new(false),
                parent,
            }),
        }
    }

    /// Unique id of this context instance.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Trace id shared by every context in the call tree.
    pub fn trace_id(&self) -> &str {
        &self.inner.trace_id
    }

    /// Id of the message currently being processed in this context.
    pub fn message_id(&self) -> Option<String> {
        self.inner.message_id.lock().clone()
    }

    pub fn set_message_id(&self, message_id: impl Into<String>) {
        *self.inner.message_id.lock() = Some(message_id.into());
    }

    /// Data flowing into the operation from its caller.
    pub fn downstream(&self) -> &ContextData {
        &self.inner.downstream
    }

    /// Data flowing back out of the operation to its caller.
    pub fn upstream(&self) -> &ContextData {
        &self.inner.upstream
    }

    /// Data visible in both directions.
    pub fn bidirectional(&self) -> &ContextData {
        &self.inner.bidirectional
    }

    /// The context this one was created from, if any.
    pub fn parent(&self) -> Option<&ConquerorContext> {
        self.inner.parent.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Returns `true` if both handles point at the same context.
    pub fn ptr_eq(&self, other: &ConquerorContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Mark this context active for the lifetime of the returned scope.
    ///
    /// Fails with [`ContextError::InvalidState`] if the context is already active.
    pub fn activate(&self) -> Result<ContextScope, ContextError> {
        if self.inner.active.swap(true, Ordering::SeqCst) {
            return Err(ContextError::InvalidState(format!(
                "context {} is already active",
                self.inner.id
            )));
        }
        Ok(ContextScope {
            context: self.clone(),
        })
    }

    /// Create a child context for a nested operation.
    ///
    /// The child's downstream view is seeded with the parent's downstream
    /// entries, then its bidirectional entries (which win on collision). The
    /// child's bidirectional view starts as a copy of the parent's.
    pub fn create_child(&self) -> ConquerorContext {
        let child = Self::build(self.inner.trace_id.clone(), Some(self.clone()));

        child.downstream().seed_from(self.downstream());
        child.downstream().seed_from(self.bidirectional());
        child.bidirectional().seed_from(self.bidirectional());
        child
    }

    /// Deactivate the context and, for children, merge data into the parent.
    ///
    /// Upstream entries are upserted into the parent's upstream view. Only
    /// the bidirectional keys the child itself set or removed are replayed
    /// onto the parent, so an untouched inherited entry never overwrites a
    /// sibling's newer write. The merge happens at most once per context.
    pub fn dispose(&self) {
        self.inner.active.store(false, Ordering::SeqCst);

        let Some(parent) = self.inner.parent.as_ref() else {
            return;
        };
        if self.inner.merged.swap(true, Ordering::SeqCst) {
            return;
        }

        parent.upstream().merge_from(self.upstream());
        parent.bidirectional().apply_changes_from(self.bidirectional());

        tracing::trace!(
            child = %self.inner.id,
            parent = %parent.inner.id,
            "merged child context into parent"
        );
    }

    // =========================================================================
    // Items (process-local, active contexts only)
    // =========================================================================

    fn ensure_active(&self, operation: &str) -> Result<(), ContextError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ContextError::InvalidState(format!(
                "cannot {} items of inactive context {}",
                operation, self.inner.id
            )))
        }
    }

    /// Store a process-local item.
    pub fn set_item<T: Any + Send + Sync>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), ContextError> {
        self.ensure_active("write")?;
        self.inner.items.lock().insert(key.into(), Arc::new(value));
        Ok(())
    }

    /// Read a process-local item.
    pub fn item<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>, ContextError> {
        self.ensure_active("read")?;
        let item = self.inner.items.lock().get(key).cloned();
        Ok(item.and_then(|value| value.downcast::<T>().ok()))
    }

    /// Remove a process-local item. Returns `true` if it was present.
    pub fn remove_item(&self, key: &str) -> Result<bool, ContextError> {
        self.ensure_active("remove")?;
        Ok(self.inner.items.lock().remove(key).is_some())
    }
}

impl Default for ConquerorContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConquerorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConquerorContext")
            .field("id", &self.inner.id)
            .field("trace_id", &self.inner.trace_id)
            .field("message_id", &self.message_id())
            .field("active", &self.is_active())
            .field("downstream", &self.inner.downstream)
            .field("upstream", &self.inner.upstream)
            .field("bidirectional", &self.inner.bidirectional)
            .finish()
    }
}

/// Guard returned by [`ConquerorContext::activate`]. Dropping it disposes the context.
#[must_use = "the context is disposed when the scope is dropped"]
pub struct ContextScope {
    context: ConquerorContext,
}

impl ContextScope {
    pub fn context(&self) -> &ConquerorContext {
        &self.context
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        self.context.dispose();
    }
}
