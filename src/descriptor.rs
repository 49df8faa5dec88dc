//! Operation descriptors: the static metadata and factory registered for
//! every algorithm implementation.
//!
//! A descriptor is created once at registry build time and never mutated.
//! Many descriptors may share a logical name or a capability type — that is
//! the overload set the matcher ranks over.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::OpError;
use crate::exec::Op;
use crate::types::TypeKey;
use crate::value::{OpValue, SlotValues};

/// Relative priorities for descriptors, used only to break ties among
/// otherwise equal matches. Higher wins.
pub mod priority {
    /// Priority of fallback implementations.
    pub const VERY_LOW: f64 = -1000.0;
    /// Priority of implementations that should lose to most others.
    pub const LOW: f64 = -100.0;
    /// Default priority.
    pub const NORMAL: f64 = 0.0;
    /// Priority of implementations that should win against most others.
    pub const HIGH: f64 = 100.0;
    /// Priority of specialized implementations that should win outright.
    pub const VERY_HIGH: f64 = 1000.0;
}

/// Whether a slot is consumed, produced, or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotDirection {
    /// Consumed from the arguments.
    Input,
    /// Produced by the operation.
    Output,
    /// Consumed and then produced, typically a pre-allocated buffer the
    /// operation fills or mutates in place.
    Both,
}

/// Execution styles a descriptor declares it supports.
///
/// These are orthogonal capabilities, not a hierarchy: an implementation may
/// declare several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStyle {
    /// Pure function: consumes inputs, produces fresh outputs.
    Function,
    /// In-place mutator: overwrites one of its arguments.
    Inplace,
    /// Pipeline stage: composable via `join`.
    Stage,
}

/// A named, typed parameter position on a descriptor.
#[derive(Clone)]
pub struct ParamSlot {
    name: String,
    ty: TypeKey,
    direction: SlotDirection,
    required: bool,
    default: Option<OpValue>,
}

impl ParamSlot {
    /// A required input slot.
    pub fn input(name: impl Into<String>, ty: TypeKey) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: SlotDirection::Input,
            required: true,
            default: None,
        }
    }

    /// An optional input slot.
    pub fn optional_input(name: impl Into<String>, ty: TypeKey) -> Self {
        Self {
            required: false,
            ..Self::input(name, ty)
        }
    }

    /// An output slot.
    pub fn output(name: impl Into<String>, ty: TypeKey) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: SlotDirection::Output,
            required: true,
            default: None,
        }
    }

    /// A slot that is consumed and produced, e.g. an in-place buffer.
    pub fn both(name: impl Into<String>, ty: TypeKey) -> Self {
        Self {
            name: name.into(),
            ty,
            direction: SlotDirection::Both,
            required: true,
            default: None,
        }
    }

    /// Attach a fixed default value, applied when no argument (and, for
    /// capability-typed slots, no sub-resolution) fills the slot.
    pub fn with_default(mut self, value: OpValue) -> Self {
        self.default = Some(value);
        self
    }

    /// The slot name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared type.
    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    /// The slot direction.
    pub fn direction(&self) -> SlotDirection {
        self.direction
    }

    /// Whether binding fails when nothing can fill this slot.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether the slot is consumed from the arguments.
    pub fn is_input(&self) -> bool {
        matches!(self.direction, SlotDirection::Input | SlotDirection::Both)
    }

    /// Whether the slot is produced by the operation.
    pub fn is_output(&self) -> bool {
        matches!(self.direction, SlotDirection::Output | SlotDirection::Both)
    }

    /// The fixed default value, if one was declared.
    pub fn default_value(&self) -> Option<&OpValue> {
        self.default.as_ref()
    }
}

impl std::fmt::Debug for ParamSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSlot")
            .field("name", &self.name)
            .field("type", &self.ty.name())
            .field("direction", &self.direction)
            .field("required", &self.required)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Factory producing a fresh instance from a populated slot map.
pub type OpFactory = Arc<dyn Fn(SlotValues) -> Result<Box<dyn Op>, OpError> + Send + Sync>;

/// Immutable record describing one registered algorithm implementation.
pub struct OpDescriptor {
    id: Uuid,
    name: Option<String>,
    capability: TypeKey,
    slots: Vec<ParamSlot>,
    priority: f64,
    styles: Vec<ExecStyle>,
    factory: OpFactory,
}

impl OpDescriptor {
    /// Start building a descriptor for the given capability type.
    pub fn builder(capability: TypeKey) -> OpDescriptorBuilder {
        OpDescriptorBuilder {
            name: None,
            capability,
            slots: Vec::new(),
            priority: priority::NORMAL,
            styles: Vec::new(),
            factory: None,
        }
    }

    /// Unique identity of this descriptor, stable for the registry lifetime.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The logical, possibly namespaced name ("stats.mean"), if declared.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The declared capability type.
    pub fn capability(&self) -> TypeKey {
        self.capability
    }

    /// All parameter slots, in declaration order.
    pub fn slots(&self) -> &[ParamSlot] {
        &self.slots
    }

    /// Tie-break priority; higher wins.
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Declared execution styles.
    pub fn styles(&self) -> &[ExecStyle] {
        &self.styles
    }

    /// Whether the descriptor declares the given style.
    pub fn has_style(&self, style: ExecStyle) -> bool {
        self.styles.contains(&style)
    }

    /// Input-direction slots with their declaration indexes.
    pub fn input_slots(&self) -> impl Iterator<Item = (usize, &ParamSlot)> {
        self.slots.iter().enumerate().filter(|(_, s)| s.is_input())
    }

    /// Output-direction slots with their declaration indexes.
    pub fn output_slots(&self) -> impl Iterator<Item = (usize, &ParamSlot)> {
        self.slots.iter().enumerate().filter(|(_, s)| s.is_output())
    }

    /// Whether the descriptor answers to `requested`: either its full name,
    /// or `requested` as an unqualified suffix of its namespaced name (a
    /// request for "mean" matches "stats.mean").
    pub fn matches_name(&self, requested: &str) -> bool {
        match &self.name {
            Some(name) => {
                name == requested || name.ends_with(&format!(".{requested}"))
            }
            None => false,
        }
    }

    /// Human-readable identity for logs and errors.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("<{}>", self.capability.short_name()),
        }
    }

    /// Create a fresh instance through the slot-assignment contract.
    pub fn instantiate(&self, values: SlotValues) -> Result<Box<dyn Op>, OpError> {
        (self.factory)(values)
    }
}

impl std::fmt::Debug for OpDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capability", &self.capability.name())
            .field("slots", &self.slots)
            .field("priority", &self.priority)
            .field("styles", &self.styles)
            .finish()
    }
}

impl std::fmt::Display for OpDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Builder for [`OpDescriptor`].
pub struct OpDescriptorBuilder {
    name: Option<String>,
    capability: TypeKey,
    slots: Vec<ParamSlot>,
    priority: f64,
    styles: Vec<ExecStyle>,
    factory: Option<OpFactory>,
}

impl OpDescriptorBuilder {
    /// Set the logical name, optionally namespaced with dots.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Append a parameter slot. Declaration order is binding order.
    pub fn slot(mut self, slot: ParamSlot) -> Self {
        self.slots.push(slot);
        self
    }

    /// Set the tie-break priority (see the [`priority`] constants).
    pub fn priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Declare an execution style.
    pub fn style(mut self, style: ExecStyle) -> Self {
        if !self.styles.contains(&style) {
            self.styles.push(style);
        }
        self
    }

    /// Set the instance factory.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(SlotValues) -> Result<Box<dyn Op>, OpError> + Send + Sync + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Finish the descriptor.
    ///
    /// # Panics
    ///
    /// Panics when no factory was set; a descriptor without a factory can
    /// never produce an instance.
    pub fn build(mut self) -> OpDescriptor {
        let factory = self.factory.expect("op descriptor requires a factory");
        if self.styles.is_empty() {
            self.styles.push(ExecStyle::Function);
        }
        OpDescriptor {
            id: Uuid::new_v4(),
            name: self.name,
            capability: self.capability,
            slots: self.slots,
            priority: self.priority,
            styles: self.styles,
            factory,
        }
    }
}
