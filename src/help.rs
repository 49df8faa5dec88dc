//! Introspection: structured signatures and textual help.
//!
//! `describe()` returns [`OpSignature`]s — serializable metadata front-ends
//! can render — and `help()` formats the same data (plus per-candidate
//! rejection reasons, when a resolution failed) as plain text.

use serde::Serialize;
use uuid::Uuid;

use crate::descriptor::{ExecStyle, OpDescriptor, SlotDirection};
use crate::errors::CandidateStatus;

/// Serializable description of one parameter slot.
#[derive(Debug, Clone, Serialize)]
pub struct SlotSignature {
    /// Slot name.
    pub name: String,
    /// Declared type name.
    pub type_name: String,
    /// Slot direction.
    pub direction: SlotDirection,
    /// Whether the slot must be satisfied.
    pub required: bool,
    /// Whether a fixed default value is declared.
    pub has_default: bool,
}

/// Serializable description of one registered descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct OpSignature {
    /// Descriptor identity.
    pub id: Uuid,
    /// Logical name, if declared.
    pub name: Option<String>,
    /// Capability type name.
    pub capability: String,
    /// Tie-break priority.
    pub priority: f64,
    /// Declared execution styles.
    pub styles: Vec<ExecStyle>,
    /// Input-direction slots, declaration order.
    pub inputs: Vec<SlotSignature>,
    /// Output-direction slots, declaration order.
    pub outputs: Vec<SlotSignature>,
}

impl From<&OpDescriptor> for OpSignature {
    fn from(descriptor: &OpDescriptor) -> Self {
        let slot_signature = |slot: &crate::descriptor::ParamSlot| SlotSignature {
            name: slot.name().to_string(),
            type_name: slot.type_key().short_name().to_string(),
            direction: slot.direction(),
            required: slot.is_required(),
            has_default: slot.default_value().is_some(),
        };
        Self {
            id: descriptor.id(),
            name: descriptor.name().map(str::to_string),
            capability: descriptor.capability().short_name().to_string(),
            priority: descriptor.priority(),
            styles: descriptor.styles().to_vec(),
            inputs: descriptor.input_slots().map(|(_, s)| slot_signature(s)).collect(),
            outputs: descriptor.output_slots().map(|(_, s)| slot_signature(s)).collect(),
        }
    }
}

impl std::fmt::Display for OpSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self.name.as_deref().unwrap_or(&self.capability);
        write!(f, "{name}(")?;
        for (i, slot) in self.inputs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if slot.required {
                write!(f, "{}: {}", slot.name, slot.type_name)?;
            } else {
                write!(f, "[{}: {}]", slot.name, slot.type_name)?;
            }
        }
        write!(f, ")")?;
        let outputs: Vec<&SlotSignature> = self.outputs.iter().collect();
        match outputs.len() {
            0 => {}
            1 => write!(f, " -> {}", outputs[0].type_name)?,
            _ => {
                write!(f, " -> (")?;
                for (i, slot) in outputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", slot.type_name)?;
                }
                write!(f, ")")?;
            }
        }
        if self.priority != 0.0 {
            write!(f, "  [priority {}]", self.priority)?;
        }
        Ok(())
    }
}

/// Render candidate signatures as a help text for `target`.
pub(crate) fn render_help(target: &str, signatures: &[OpSignature]) -> String {
    if signatures.is_empty() {
        return format!("No operations registered for '{target}'.");
    }
    let mut out = format!("Available '{target}' operations:\n");
    for signature in signatures {
        out.push_str(&format!("\t{signature}\n"));
    }
    out
}

/// Render per-candidate rejection reasons after a failed resolution.
pub(crate) fn render_rejections(target: &str, statuses: &[CandidateStatus]) -> String {
    let mut out = format!("No '{target}' candidate accepted the request:\n");
    for status in statuses {
        out.push_str(&format!("\t{status}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{OpDescriptor, ParamSlot};
    use crate::errors::OpError;
    use crate::exec::Op;
    use crate::types::TypeKey;
    use crate::value::SlotValues;

    struct Mean;
    struct Sum;

    struct NoopOp;

    impl Op for NoopOp {
        fn run(&mut self) -> Result<SlotValues, OpError> {
            Ok(SlotValues::new())
        }
    }

    fn mean_descriptor() -> OpDescriptor {
        OpDescriptor::builder(TypeKey::of::<Mean>())
            .name("stats.mean")
            .slot(ParamSlot::input("in", TypeKey::of::<Vec<f64>>()))
            .slot(ParamSlot::optional_input("sum", TypeKey::of::<Sum>()))
            .slot(ParamSlot::output("out", TypeKey::of::<f64>()))
            .factory(|_| Ok(Box::new(NoopOp) as Box<dyn Op>))
            .build()
    }

    #[test]
    fn test_signature_shape() {
        let descriptor = mean_descriptor();
        let signature = OpSignature::from(&descriptor);
        assert_eq!(signature.name.as_deref(), Some("stats.mean"));
        assert_eq!(signature.inputs.len(), 2);
        assert_eq!(signature.outputs.len(), 1);
        assert!(!signature.inputs[1].required);
    }

    #[test]
    fn test_signature_display() {
        let descriptor = mean_descriptor();
        let rendered = OpSignature::from(&descriptor).to_string();
        assert!(rendered.starts_with("stats.mean(in:"));
        assert!(rendered.contains("[sum: Sum]"));
        assert!(rendered.contains("-> f64"));
    }

    #[test]
    fn test_signature_serializes() {
        let descriptor = mean_descriptor();
        let json = serde_json::to_value(OpSignature::from(&descriptor)).unwrap();
        assert_eq!(json["name"], "stats.mean");
        assert_eq!(json["inputs"][0]["direction"], "input");
    }

    #[test]
    fn test_render_help_empty() {
        assert!(render_help("median", &[]).contains("No operations"));
    }
}
