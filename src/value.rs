//! Type-tagged argument values and slot-value maps.
//!
//! Arguments cross the engine as [`OpValue`]s: a cheaply clonable shared
//! handle to an erased payload plus the [`TypeKey`] the matcher reasons
//! about. Implementations get their parameters back as a [`SlotValues`] map
//! (slot name → value) passed to the descriptor's factory — the explicit
//! slot-assignment contract that replaces any notion of reflective field
//! population.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::OpError;
use crate::types::TypeKey;

/// A shared, type-tagged runtime value.
///
/// Cloning is cheap (reference-counted), which is what lets the resolve loop
/// retry lower-ranked candidates against the same arguments after a
/// contingency rejection. Payloads that an in-place operation mutates carry
/// their own interior mutability; the engine never looks inside.
#[derive(Clone)]
pub struct OpValue {
    ty: TypeKey,
    data: Arc<dyn Any + Send + Sync>,
}

impl OpValue {
    /// Wrap a value, tagging it with its own concrete type.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            ty: TypeKey::of::<T>(),
            data: Arc::new(value),
        }
    }

    /// Wrap an already shared value without copying it.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            ty: TypeKey::of::<T>(),
            data: value,
        }
    }

    /// Wrap a value under an explicit type tag.
    ///
    /// Used where the tag is deliberately wider than the payload's concrete
    /// type — notably operation handles tagged with the capability they were
    /// resolved for. The registered hierarchy must make the payload
    /// retrievable by whoever declared the tag.
    pub fn tagged<T: Any + Send + Sync>(value: T, ty: TypeKey) -> Self {
        Self {
            ty,
            data: Arc::new(value),
        }
    }

    /// The type tag the matcher sees.
    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    /// Whether the payload is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.data.is::<T>()
    }

    /// Borrow the payload as a `T`, if that is its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Share the payload as an `Arc<T>`, if that is its concrete type.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    /// Borrow the payload as a `T`, reporting a typed slot error otherwise.
    ///
    /// Factory code uses this to turn a mis-typed slot into an [`OpError`]
    /// instead of a panic.
    pub fn expect_ref<T: Any>(&self, slot: &str) -> Result<&T, OpError> {
        self.downcast_ref::<T>().ok_or_else(|| OpError::SlotType {
            slot: slot.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            actual: self.ty.name().to_string(),
        })
    }
}

impl std::fmt::Debug for OpValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpValue").field("type", &self.ty.name()).finish()
    }
}

/// Ordered-by-caller map of slot name → bound value.
///
/// This is what a descriptor's factory receives: every populated slot under
/// its declared name. Outputs come back through the same shape.
#[derive(Debug, Clone, Default)]
pub struct SlotValues {
    values: HashMap<String, OpValue>,
}

impl SlotValues {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under `name`, replacing any previous binding.
    pub fn insert(&mut self, name: impl Into<String>, value: OpValue) {
        self.values.insert(name.into(), value);
    }

    /// The value bound under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&OpValue> {
        self.values.get(name)
    }

    /// Remove and return the value bound under `name`.
    pub fn take(&mut self, name: &str) -> Option<OpValue> {
        self.values.remove(name)
    }

    /// Whether a value is bound under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Borrow the payload of slot `name` as a `T`.
    ///
    /// Fails with [`OpError::MissingSlot`] when the slot is unbound and
    /// [`OpError::SlotType`] when the payload is not a `T`. The workhorse of
    /// factory implementations for required slots.
    pub fn required<T: Any>(&self, name: &str) -> Result<&T, OpError> {
        self.values
            .get(name)
            .ok_or_else(|| OpError::missing(name))?
            .expect_ref::<T>(name)
    }

    /// Share the payload of slot `name` as an `Arc<T>`, for implementations
    /// that keep the value beyond the factory call.
    pub fn required_arc<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, OpError> {
        let value = self.values.get(name).ok_or_else(|| OpError::missing(name))?;
        value.downcast_arc::<T>().ok_or_else(|| OpError::SlotType {
            slot: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            actual: value.type_key().name().to_string(),
        })
    }

    /// Borrow the payload of slot `name` as a `T`, or `None` when the slot
    /// is unbound or carries a different payload type.
    pub fn optional<T: Any>(&self, name: &str) -> Option<&T> {
        self.values.get(name).and_then(|v| v.downcast_ref::<T>())
    }

    /// Number of bound slots.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no slots are bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (slot name, value) pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OpValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_tags_concrete_type() {
        let v = OpValue::new(42i64);
        assert_eq!(v.type_key(), TypeKey::of::<i64>());
        assert!(v.is::<i64>());
        assert_eq!(v.downcast_ref::<i64>(), Some(&42));
        assert!(v.downcast_ref::<f64>().is_none());
    }

    #[test]
    fn test_value_clone_shares_payload() {
        let v = OpValue::new(vec![1.0f64, 2.0]);
        let w = v.clone();
        let a = v.downcast_arc::<Vec<f64>>().unwrap();
        let b = w.downcast_arc::<Vec<f64>>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_tagged_value_keeps_explicit_key() {
        struct Marker;
        let v = OpValue::tagged(7u32, TypeKey::of::<Marker>());
        assert_eq!(v.type_key(), TypeKey::of::<Marker>());
        // Payload is still retrievable by its concrete type.
        assert_eq!(v.downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn test_expect_ref_reports_slot() {
        let v = OpValue::new(1.5f64);
        let err = v.expect_ref::<i64>("radius").unwrap_err();
        assert!(err.to_string().contains("radius"));
    }

    #[test]
    fn test_slot_values_required_and_optional() {
        let mut values = SlotValues::new();
        values.insert("in", OpValue::new(vec![1.0f64]));
        assert!(values.contains("in"));
        assert_eq!(values.required::<Vec<f64>>("in").unwrap(), &vec![1.0]);
        assert!(values.required::<Vec<f64>>("out").is_err());
        assert!(values.optional::<Vec<f64>>("out").is_none());
    }
}
