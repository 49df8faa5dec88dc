//! Parameter binding: executing a candidate's binding plan.
//!
//! Direct assignments and conversions happen first so that operation-typed
//! slots can then be sub-resolved against the instance's already-bound
//! inputs as contextual arguments. Recursion is depth-bounded and keeps an
//! explicit stack of in-flight capability keys so a cycle of mutual
//! capability requirements fails closed instead of looping.

use crate::descriptor::ParamSlot;
use crate::env::OpEnvironment;
use crate::errors::ResolveError;
use crate::exec::{BoundOp, OpHandle};
use crate::matcher::{MatchCandidate, OpRequest, SlotAction};
use crate::types::TypeKey;
use crate::value::{OpValue, SlotValues};

/// Per-resolution recursion state, threaded through nested resolutions.
#[derive(Debug, Default)]
pub(crate) struct ResolveCtx {
    /// Current sub-resolution depth.
    pub depth: usize,
    /// Capability keys currently being resolved, outermost first.
    pub stack: Vec<TypeKey>,
}

impl ResolveCtx {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

/// Populate a fresh instance of the candidate from the supplied arguments,
/// per its binding plan. Never mutates the registry; on success the caller
/// exclusively owns the returned [`BoundOp`].
pub(crate) fn bind_candidate(
    env: &OpEnvironment,
    candidate: &MatchCandidate,
    args: &[OpValue],
    ctx: &mut ResolveCtx,
) -> Result<BoundOp, ResolveError> {
    let descriptor = candidate.descriptor();
    let slots = descriptor.slots();
    let mut values = SlotValues::new();
    let mut deferred: Vec<&ParamSlot> = Vec::new();

    for planned in &candidate.plan().slots {
        let slot = &slots[planned.slot];
        match &planned.action {
            SlotAction::Assign { arg } => {
                values.insert(slot.name(), args[*arg].clone());
            }
            SlotAction::Convert { arg, rule } => {
                let converted = env
                    .conversions()
                    .apply(rule, &args[*arg])
                    .map_err(|e| {
                        ResolveError::binding(descriptor.display_name(), slot.name(), e.to_string())
                    })?;
                values.insert(slot.name(), converted);
            }
            SlotAction::UseDefault => {
                if let Some(default) = slot.default_value() {
                    values.insert(slot.name(), default.clone());
                }
            }
            SlotAction::Resolve => deferred.push(slot),
            SlotAction::Skip => {}
        }
    }

    // Sub-resolve operation-typed slots against the inputs bound so far,
    // in declaration order.
    if !deferred.is_empty() {
        let contextual: Vec<OpValue> = slots
            .iter()
            .filter(|s| s.is_input())
            .filter_map(|s| values.get(s.name()).cloned())
            .collect();
        for slot in deferred {
            match resolve_sub_op(env, descriptor.display_name(), slot, &contextual, ctx) {
                Ok(handle) => {
                    values.insert(slot.name(), OpValue::tagged(handle, slot.type_key()));
                }
                Err(err) => {
                    if slot.is_required() {
                        return Err(err);
                    }
                    if let Some(default) = slot.default_value() {
                        values.insert(slot.name(), default.clone());
                    } else {
                        log::debug!(
                            "optional slot '{}' of '{}' left unbound: {err}",
                            slot.name(),
                            descriptor.display_name()
                        );
                    }
                }
            }
        }
    }

    let instance = descriptor.instantiate(values.clone()).map_err(|e| {
        ResolveError::Binding {
            candidate: descriptor.display_name(),
            slot: "<factory>".to_string(),
            reason: e.to_string(),
            source: None,
        }
    })?;
    Ok(BoundOp::new(descriptor.clone(), instance, values))
}

/// Recursively resolve one operation-typed slot as a capability request.
fn resolve_sub_op(
    env: &OpEnvironment,
    candidate_name: String,
    slot: &ParamSlot,
    contextual: &[OpValue],
    ctx: &mut ResolveCtx,
) -> Result<OpHandle, ResolveError> {
    let capability = slot.type_key();
    if ctx.stack.contains(&capability) {
        return Err(ResolveError::binding(
            candidate_name,
            slot.name(),
            format!("cyclic capability requirement on {capability}"),
        ));
    }
    if ctx.depth >= env.config().max_recursion_depth {
        return Err(ResolveError::binding(
            candidate_name,
            slot.name(),
            format!(
                "sub-resolution depth limit ({}) exceeded",
                env.config().max_recursion_depth
            ),
        ));
    }

    let mut request = OpRequest::by_capability(capability);
    for value in contextual {
        request = request.arg_value(value.clone());
    }

    ctx.stack.push(capability);
    ctx.depth += 1;
    let resolved = env.resolve_ctx(&request, ctx);
    ctx.depth -= 1;
    ctx.stack.pop();

    match resolved {
        Ok(bound) => {
            log::debug!(
                "sub-resolved slot '{}' of '{}' to '{}'",
                slot.name(),
                candidate_name,
                bound.descriptor().display_name()
            );
            Ok(OpHandle::new(bound))
        }
        Err(err) => Err(ResolveError::Binding {
            candidate: candidate_name,
            slot: slot.name().to_string(),
            reason: "sub-resolution failed".to_string(),
            source: Some(Box::new(err)),
        }),
    }
}
