//! Type compatibility checking.
//!
//! Answers one question for the matcher: could a slot declared as one type
//! accept an argument of another, and if so, how. The check is purely a
//! function of the two type keys (plus the registered hierarchy and the
//! conversion oracle) — never of the values — so ranking cost stays
//! proportional to candidate count, not data size.

use crate::convert::{ConversionRule, ConversionService};
use crate::types::{TypeHierarchy, TypeKey};

/// Outcome of a compatibility check.
#[derive(Debug, Clone)]
pub enum Compatibility {
    /// The argument type is assignable to the declared type as-is.
    Exact,
    /// Assignable after applying the carried conversion rule.
    ViaConversion(ConversionRule),
    /// Not acceptable.
    Incompatible,
}

impl Compatibility {
    /// Whether the check found an exact match.
    pub fn is_exact(&self) -> bool {
        matches!(self, Compatibility::Exact)
    }

    /// Whether the check found no way to accept the argument.
    pub fn is_incompatible(&self) -> bool {
        matches!(self, Compatibility::Incompatible)
    }
}

/// Compatibility checker over a hierarchy and a conversion oracle.
pub struct TypeChecker<'a> {
    types: &'a TypeHierarchy,
    conversions: &'a dyn ConversionService,
}

impl<'a> TypeChecker<'a> {
    /// Create a checker borrowing the environment's collaborators.
    pub fn new(types: &'a TypeHierarchy, conversions: &'a dyn ConversionService) -> Self {
        Self { types, conversions }
    }

    /// How (and whether) a slot declared as `declared` accepts an argument
    /// whose runtime type is `argument`.
    pub fn can_accept(&self, declared: TypeKey, argument: TypeKey) -> Compatibility {
        if self.types.assignable(argument, declared) {
            return Compatibility::Exact;
        }
        match self.conversions.find_rule(argument, declared, self.types) {
            Some(rule) => Compatibility::ViaConversion(rule),
            None => Compatibility::Incompatible,
        }
    }

    /// The hierarchy this checker consults.
    pub fn types(&self) -> &TypeHierarchy {
        self.types
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConversionRule, ConversionTable};

    #[test]
    fn test_exact_on_identity() {
        let types = TypeHierarchy::new();
        let conversions = ConversionTable::new();
        let checker = TypeChecker::new(&types, &conversions);
        assert!(checker
            .can_accept(TypeKey::of::<f64>(), TypeKey::of::<f64>())
            .is_exact());
    }

    #[test]
    fn test_exact_on_registered_subtype() {
        struct Image;
        struct Mask;
        let mut types = TypeHierarchy::new();
        types.relate_types::<Mask, Image>();
        let conversions = ConversionTable::new();
        let checker = TypeChecker::new(&types, &conversions);
        assert!(checker
            .can_accept(TypeKey::of::<Image>(), TypeKey::of::<Mask>())
            .is_exact());
        assert!(checker
            .can_accept(TypeKey::of::<Mask>(), TypeKey::of::<Image>())
            .is_incompatible());
    }

    #[test]
    fn test_conversion_fallback() {
        let types = TypeHierarchy::new();
        let mut conversions = ConversionTable::new();
        conversions.add(ConversionRule::new::<i64, f64, _>(|v| *v as f64));
        let checker = TypeChecker::new(&types, &conversions);
        match checker.can_accept(TypeKey::of::<f64>(), TypeKey::of::<i64>()) {
            Compatibility::ViaConversion(rule) => {
                assert_eq!(rule.target(), TypeKey::of::<f64>());
            }
            other => panic!("expected conversion, got {other:?}"),
        }
    }

    #[test]
    fn test_incompatible_without_rule() {
        let types = TypeHierarchy::new();
        let conversions = ConversionTable::new();
        let checker = TypeChecker::new(&types, &conversions);
        assert!(checker
            .can_accept(TypeKey::of::<f64>(), TypeKey::of::<String>())
            .is_incompatible());
    }
}
