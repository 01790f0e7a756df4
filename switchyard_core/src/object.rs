//! Object instances.
//!
//! An instance is a class id plus a fixed array of field slots. The slot
//! layout is decided by the class definition and never changes for the
//! lifetime of the instance, which is what lets a field-get site cache a
//! slot index behind a class guard.
//!
//! An instance may carry its own meta-object, replacing the class default
//! for dispatch on that one receiver. The override's identity is mirrored
//! in an atomic so guards can check it with a single load.

use crate::class_id::ClassId;
use crate::meta::{MetaObject, MetaObjectId};
use crate::value::Value;
use arc_swap::ArcSwapOption;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Inline field capacity before spilling to the heap.
const INLINE_FIELDS: usize = 4;

/// Counter for instance ids.
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Wrapper giving the unsized meta-object a sized home inside `ArcSwapOption`.
struct MetaOverride(Arc<dyn MetaObject>);

/// A runtime object.
pub struct Instance {
    /// Unique id, used for identity display.
    id: u64,
    /// Class of this object.
    class_id: ClassId,
    /// Field slots in declaration order.
    fields: RwLock<SmallVec<[Value; INLINE_FIELDS]>>,
    /// Per-instance meta-object, if any.
    meta_override: ArcSwapOption<MetaOverride>,
    /// Raw identity of `meta_override`; 0 when absent.
    override_identity: AtomicU64,
}

impl Instance {
    /// Create an instance with `field_count` null fields.
    pub fn new(class_id: ClassId, field_count: usize) -> Self {
        Self::with_fields(class_id, std::iter::repeat(Value::Null).take(field_count))
    }

    /// Create an instance with the given initial field values.
    pub fn with_fields(class_id: ClassId, fields: impl IntoIterator<Item = Value>) -> Self {
        Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            class_id,
            fields: RwLock::new(fields.into_iter().collect()),
            meta_override: ArcSwapOption::empty(),
            override_identity: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn class_id(&self) -> ClassId {
        self.class_id
    }

    /// Number of field slots.
    pub fn field_count(&self) -> usize {
        self.fields.read().len()
    }

    /// Read a field slot.
    #[inline]
    pub fn field(&self, slot: usize) -> Option<Value> {
        self.fields.read().get(slot).cloned()
    }

    /// Write a field slot. Returns false if the slot does not exist.
    pub fn set_field(&self, slot: usize, value: Value) -> bool {
        match self.fields.write().get_mut(slot) {
            Some(field) => {
                *field = value;
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Meta-object Override
    // =========================================================================

    /// Identity of the meta-object governing this instance.
    #[inline]
    pub fn meta_identity(&self) -> MetaObjectId {
        match self.override_identity.load(Ordering::Acquire) {
            0 => MetaObjectId::for_class(self.class_id),
            raw => MetaObjectId::from_raw(raw),
        }
    }

    /// The per-instance meta-object, if one was installed.
    pub fn meta_override(&self) -> Option<Arc<dyn MetaObject>> {
        self.meta_override.load().as_ref().map(|o| Arc::clone(&o.0))
    }

    /// Install or clear the per-instance meta-object.
    pub fn set_meta_override(&self, meta: Option<Arc<dyn MetaObject>>) {
        match meta {
            Some(meta) => {
                let raw = meta.identity().raw();
                self.meta_override.store(Some(Arc::new(MetaOverride(meta))));
                self.override_identity.store(raw, Ordering::Release);
            }
            None => {
                self.override_identity.store(0, Ordering::Release);
                self.meta_override.store(None);
            }
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("class_id", &self.class_id)
            .field("fields", &*self.fields.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields() {
        let obj = Instance::new(ClassId(300), 2);
        assert_eq!(obj.field_count(), 2);
        assert_eq!(obj.field(0), Some(Value::Null));
        assert!(obj.set_field(1, Value::Int(7)));
        assert_eq!(obj.field(1), Some(Value::Int(7)));
        assert!(!obj.set_field(2, Value::Int(7)));
        assert_eq!(obj.field(2), None);
    }

    #[test]
    fn test_default_identity_follows_class() {
        let a = Instance::new(ClassId(300), 0);
        let b = Instance::new(ClassId(300), 0);
        assert_eq!(a.meta_identity(), b.meta_identity());
        assert_eq!(a.meta_identity(), MetaObjectId::for_class(ClassId(300)));
        assert!(a.meta_override().is_none());
    }

    #[test]
    fn test_instance_ids_unique() {
        let a = Instance::new(ClassId::OBJECT, 0);
        let b = Instance::new(ClassId::OBJECT, 0);
        assert_ne!(a.id(), b.id());
    }
}
