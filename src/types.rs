//! Runtime type tokens and the registered type hierarchy.
//!
//! The engine never interprets argument payloads; it reasons about them
//! through [`TypeKey`] tokens and the assignability relation registered in a
//! [`TypeHierarchy`]. Compatibility checking stays purely a function of
//! types — value-level vetoes belong to the contingency filter.

use std::any::TypeId;
use std::collections::{HashMap, HashSet, VecDeque};

/// An erased runtime type token: a `TypeId` plus the type's name.
///
/// Keys are produced with [`TypeKey::of`] and compare by `TypeId`, so two
/// keys for the same Rust type are always equal regardless of where they
/// were created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// The key for type `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The last path segment of the type name, for display.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl serde::Serialize for TypeKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

/// Registered subtype relation between type keys.
///
/// Hosts register edges with [`relate`](TypeHierarchy::relate) while wiring
/// up the environment; afterwards the hierarchy is read-only. It answers
/// three questions for the engine: is one type assignable to another, how
/// far apart are they (conversion-rule source specificity), and how derived
/// is a type (declared-type specificity when ranking capability matches).
#[derive(Debug, Default)]
pub struct TypeHierarchy {
    /// Direct supertypes per type.
    supers: HashMap<TypeId, Vec<TypeKey>>,
}

impl TypeHierarchy {
    /// Create an empty hierarchy: every type is only assignable to itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sub` as a direct subtype of `superty`.
    pub fn relate(&mut self, sub: TypeKey, superty: TypeKey) {
        let entry = self.supers.entry(sub.id()).or_default();
        if !entry.contains(&superty) {
            entry.push(superty);
        }
    }

    /// Convenience for [`relate`](Self::relate) over static types.
    pub fn relate_types<Sub: ?Sized + 'static, Super: ?Sized + 'static>(&mut self) {
        self.relate(TypeKey::of::<Sub>(), TypeKey::of::<Super>());
    }

    /// Whether a value of type `from` is acceptable where `to` is declared,
    /// without transformation.
    pub fn assignable(&self, from: TypeKey, to: TypeKey) -> bool {
        self.distance(from, to).is_some()
    }

    /// Number of subtype edges between `from` and `to` (`0` when equal),
    /// or `None` when `from` is not assignable to `to`.
    pub fn distance(&self, from: TypeKey, to: TypeKey) -> Option<u32> {
        if from == to {
            return Some(0);
        }
        let mut seen: HashSet<TypeId> = HashSet::new();
        let mut queue: VecDeque<(TypeKey, u32)> = VecDeque::new();
        queue.push_back((from, 0));
        seen.insert(from.id());
        while let Some((current, steps)) = queue.pop_front() {
            for superty in self.supers.get(&current.id()).into_iter().flatten() {
                if *superty == to {
                    return Some(steps + 1);
                }
                if seen.insert(superty.id()) {
                    queue.push_back((*superty, steps + 1));
                }
            }
        }
        None
    }

    /// Length of the longest registered chain above `ty`. More derived types
    /// have greater depth; a type with no registered supertypes has depth 0.
    pub fn depth(&self, ty: TypeKey) -> u32 {
        self.depth_guarded(ty, &mut HashSet::new())
    }

    fn depth_guarded(&self, ty: TypeKey, visiting: &mut HashSet<TypeId>) -> u32 {
        if !visiting.insert(ty.id()) {
            // Defective cyclic registration; report the chain so far.
            return 0;
        }
        let depth = self
            .supers
            .get(&ty.id())
            .into_iter()
            .flatten()
            .map(|s| 1 + self.depth_guarded(*s, visiting))
            .max()
            .unwrap_or(0);
        visiting.remove(&ty.id());
        depth
    }
}
