//! Type conversion rules, consumed as an external oracle.
//!
//! The engine never inspects a rule's internals: it asks a
//! [`ConversionService`] whether a (source, target) pair is bridgeable and
//! applies whatever rule comes back. [`ConversionTable`] is the table-backed
//! implementation hosts and tests wire in.

use std::sync::Arc;

use thiserror::Error;

use crate::types::{TypeHierarchy, TypeKey};
use crate::value::OpValue;

/// Error raised when applying a conversion rule fails.
#[derive(Debug, Error)]
#[error("cannot convert {from} to {to}: {message}")]
pub struct ConversionError {
    /// Source type name.
    pub from: String,
    /// Target type name.
    pub to: String,
    /// What went wrong.
    pub message: String,
}

impl ConversionError {
    /// Create a conversion error for the given pair.
    pub fn new(from: TypeKey, to: TypeKey, message: impl Into<String>) -> Self {
        Self {
            from: from.name().to_string(),
            to: to.name().to_string(),
            message: message.into(),
        }
    }
}

/// The transformation function carried by a rule.
pub type ConvertFn = Arc<dyn Fn(&OpValue) -> Result<OpValue, ConversionError> + Send + Sync>;

/// Maps values of a source type to values of a target type.
#[derive(Clone)]
pub struct ConversionRule {
    source: TypeKey,
    target: TypeKey,
    priority: f64,
    apply: ConvertFn,
}

impl ConversionRule {
    /// A rule converting concrete `S` payloads into `T` payloads.
    pub fn new<S, T, F>(convert: F) -> Self
    where
        S: std::any::Any + Send + Sync,
        T: std::any::Any + Send + Sync,
        F: Fn(&S) -> T + Send + Sync + 'static,
    {
        let source = TypeKey::of::<S>();
        let target = TypeKey::of::<T>();
        Self {
            source,
            target,
            priority: 0.0,
            apply: Arc::new(move |value: &OpValue| {
                let payload = value
                    .downcast_ref::<S>()
                    .ok_or_else(|| {
                        ConversionError::new(value.type_key(), target, "payload type mismatch")
                    })?;
                Ok(OpValue::new(convert(payload)))
            }),
        }
    }

    /// A rule over an explicit (source, target) pair with an erased
    /// transformation, for sources that are themselves wider than one
    /// concrete payload type.
    pub fn from_fn(source: TypeKey, target: TypeKey, apply: ConvertFn) -> Self {
        Self {
            source,
            target,
            priority: 0.0,
            apply,
        }
    }

    /// Set the rule priority, used to break exact-specificity ties.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// The source type the rule accepts.
    pub fn source(&self) -> TypeKey {
        self.source
    }

    /// The target type the rule produces.
    pub fn target(&self) -> TypeKey {
        self.target
    }

    /// The rule priority.
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Transform a value.
    pub fn apply(&self, value: &OpValue) -> Result<OpValue, ConversionError> {
        (self.apply)(value)
    }
}

impl std::fmt::Debug for ConversionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionRule")
            .field("source", &self.source.name())
            .field("target", &self.target.name())
            .field("priority", &self.priority)
            .finish()
    }
}

/// External conversion collaborator consulted during compatibility checks.
pub trait ConversionService: Send + Sync {
    /// The best rule bridging `source` to `target`, or `None`. "Best" must
    /// be deterministic; among qualifying rules the most specific source
    /// (smallest subtype distance from `source`) is expected to win.
    fn find_rule(
        &self,
        source: TypeKey,
        target: TypeKey,
        types: &TypeHierarchy,
    ) -> Option<ConversionRule>;

    /// Apply a rule previously returned by [`find_rule`](Self::find_rule).
    fn apply(&self, rule: &ConversionRule, value: &OpValue) -> Result<OpValue, ConversionError> {
        rule.apply(value)
    }
}

/// Table-backed [`ConversionService`].
#[derive(Debug, Default)]
pub struct ConversionTable {
    rules: Vec<ConversionRule>,
}

impl ConversionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule.
    pub fn add(&mut self, rule: ConversionRule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    /// Number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ConversionService for ConversionTable {
    fn find_rule(
        &self,
        source: TypeKey,
        target: TypeKey,
        types: &TypeHierarchy,
    ) -> Option<ConversionRule> {
        // A rule qualifies when it accepts the argument's type and produces
        // something assignable to the declared target.
        let mut best: Option<(u32, f64, &ConversionRule)> = None;
        let mut tied = false;
        for rule in &self.rules {
            let Some(distance) = types.distance(source, rule.source()) else {
                continue;
            };
            if !types.assignable(rule.target(), target) {
                continue;
            }
            match &best {
                Some((best_distance, best_priority, _)) => {
                    if distance < *best_distance
                        || (distance == *best_distance && rule.priority() > *best_priority)
                    {
                        best = Some((distance, rule.priority(), rule));
                        tied = false;
                    } else if distance == *best_distance && rule.priority() == *best_priority {
                        tied = true;
                    }
                }
                None => best = Some((distance, rule.priority(), rule)),
            }
        }
        if tied {
            log::warn!(
                "conversion {} -> {} is ambiguous: equally specific rules at equal priority",
                source,
                target
            );
            return None;
        }
        best.map(|(_, _, rule)| rule.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_rule_round_trip() {
        let rule = ConversionRule::new::<i64, f64, _>(|v| *v as f64);
        assert_eq!(rule.source(), TypeKey::of::<i64>());
        assert_eq!(rule.target(), TypeKey::of::<f64>());
        let converted = rule.apply(&OpValue::new(4i64)).unwrap();
        assert_eq!(converted.downcast_ref::<f64>(), Some(&4.0));
    }

    #[test]
    fn test_rule_rejects_wrong_payload() {
        let rule = ConversionRule::new::<i64, f64, _>(|v| *v as f64);
        assert!(rule.apply(&OpValue::new("nope")).is_err());
    }

    #[test]
    fn test_find_rule_exact() {
        let mut table = ConversionTable::new();
        table.add(ConversionRule::new::<i64, f64, _>(|v| *v as f64));
        let types = TypeHierarchy::new();
        let rule = table
            .find_rule(TypeKey::of::<i64>(), TypeKey::of::<f64>(), &types)
            .unwrap();
        assert_eq!(rule.target(), TypeKey::of::<f64>());
        assert!(table
            .find_rule(TypeKey::of::<u8>(), TypeKey::of::<f64>(), &types)
            .is_none());
    }

    #[test]
    fn test_most_specific_source_wins() {
        struct Narrow(i64);
        struct Wide(i64);

        let mut types = TypeHierarchy::new();
        types.relate_types::<Narrow, Wide>();

        let mut table = ConversionTable::new();
        table.add(ConversionRule::new::<Wide, f64, _>(|v| v.0 as f64));
        table.add(ConversionRule::new::<Narrow, f64, _>(|v| v.0 as f64 + 0.5));

        let rule = table
            .find_rule(TypeKey::of::<Narrow>(), TypeKey::of::<f64>(), &types)
            .unwrap();
        // The Narrow rule is closer to the argument type than the Wide one.
        assert_eq!(rule.source(), TypeKey::of::<Narrow>());
    }

    #[test]
    fn test_equally_specific_rules_are_ambiguous() {
        let mut table = ConversionTable::new();
        table.add(ConversionRule::new::<i64, f64, _>(|v| *v as f64));
        table.add(ConversionRule::new::<i64, f64, _>(|v| (*v + 1) as f64));
        let types = TypeHierarchy::new();
        assert!(table
            .find_rule(TypeKey::of::<i64>(), TypeKey::of::<f64>(), &types)
            .is_none());
    }

    #[test]
    fn test_priority_breaks_specificity_tie() {
        let mut table = ConversionTable::new();
        table.add(ConversionRule::new::<i64, f64, _>(|v| *v as f64));
        table.add(ConversionRule::new::<i64, f64, _>(|v| (*v * 10) as f64).with_priority(10.0));
        let types = TypeHierarchy::new();
        let rule = table
            .find_rule(TypeKey::of::<i64>(), TypeKey::of::<f64>(), &types)
            .unwrap();
        assert_eq!(rule.priority(), 10.0);
        assert_eq!(
            rule.apply(&OpValue::new(3i64)).unwrap().downcast_ref::<f64>(),
            Some(&30.0)
        );
    }
}
