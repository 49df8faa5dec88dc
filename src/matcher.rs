//! Candidate matching and ranking.
//!
//! Turns a loosely typed request (name or capability plus arguments) into a
//! deterministically ordered list of structurally compatible candidates,
//! each carrying a type-level binding plan the binder can execute. Ties at
//! the top of the ranking are a hard error, never an arbitrary pick: in an
//! open plugin registry, ambiguous resolution is a latent correctness bug.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use crate::compat::{Compatibility, TypeChecker};
use crate::convert::ConversionRule;
use crate::descriptor::OpDescriptor;
use crate::errors::CandidateStatus;
use crate::registry::OpRegistry;
use crate::types::{TypeHierarchy, TypeKey};
use crate::value::OpValue;

/// What a request asks for: a logical name or a capability type.
#[derive(Debug, Clone)]
pub enum RequestTarget {
    /// Resolve by (possibly namespaced) logical name.
    Name(String),
    /// Resolve by declared capability type.
    Capability(TypeKey),
}

impl std::fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestTarget::Name(name) => write!(f, "{name}"),
            RequestTarget::Capability(key) => write!(f, "{key}"),
        }
    }
}

/// One resolution request: target plus ordered arguments.
///
/// Immutable once built; construct a fresh request per call.
#[derive(Debug, Clone)]
pub struct OpRequest {
    target: RequestTarget,
    args: Vec<OpValue>,
}

impl OpRequest {
    /// Request an operation by logical name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            target: RequestTarget::Name(name.into()),
            args: Vec::new(),
        }
    }

    /// Request an operation by capability type key.
    pub fn by_capability(capability: TypeKey) -> Self {
        Self {
            target: RequestTarget::Capability(capability),
            args: Vec::new(),
        }
    }

    /// Request an operation by capability type.
    pub fn by_capability_of<C: ?Sized + 'static>() -> Self {
        Self::by_capability(TypeKey::of::<C>())
    }

    /// Append an argument, wrapping it as an [`OpValue`].
    pub fn arg<T: std::any::Any + Send + Sync>(self, value: T) -> Self {
        self.arg_value(OpValue::new(value))
    }

    /// Append an already wrapped argument.
    pub fn arg_value(mut self, value: OpValue) -> Self {
        self.args.push(value);
        self
    }

    /// The request target.
    pub fn target(&self) -> &RequestTarget {
        &self.target
    }

    /// The supplied arguments, in order.
    pub fn args(&self) -> &[OpValue] {
        &self.args
    }

    /// The argument type signature, used as a memoization key.
    pub(crate) fn type_signature(&self) -> Vec<TypeKey> {
        self.args.iter().map(OpValue::type_key).collect()
    }
}

/// How one slot of a candidate will be populated.
#[derive(Debug, Clone)]
pub enum SlotAction {
    /// Assign the argument at the given position directly.
    Assign {
        /// Index into the request's argument list.
        arg: usize,
    },
    /// Convert the argument at the given position, then assign.
    Convert {
        /// Index into the request's argument list.
        arg: usize,
        /// The rule to apply.
        rule: ConversionRule,
    },
    /// Fill by recursive resolution of the slot's capability type.
    Resolve,
    /// Assign the slot's declared default value.
    UseDefault,
    /// Leave the optional slot unbound.
    Skip,
}

/// A slot index paired with its planned action.
#[derive(Debug, Clone)]
pub struct PlannedSlot {
    /// Index into the descriptor's slot list.
    pub slot: usize,
    /// How the slot will be populated.
    pub action: SlotAction,
}

/// Type-level plan for binding one descriptor against one argument
/// signature. Contains no values, so it is reusable across calls with the
/// same signature (which is what the resolution cache stores).
#[derive(Debug, Clone, Default)]
pub struct BindingPlan {
    /// Planned actions for every input-direction slot, declaration order.
    pub slots: Vec<PlannedSlot>,
    /// Number of slots matched exactly (no conversion), the specificity
    /// score used for ranking.
    pub exact_matches: usize,
}

/// A descriptor provisionally matched against a request.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    descriptor: Arc<OpDescriptor>,
    plan: BindingPlan,
}

impl MatchCandidate {
    /// The matched descriptor.
    pub fn descriptor(&self) -> &Arc<OpDescriptor> {
        &self.descriptor
    }

    /// The binding plan.
    pub fn plan(&self) -> &BindingPlan {
        &self.plan
    }

    /// Ranking priority, taken from the descriptor.
    pub fn priority(&self) -> f64 {
        self.descriptor.priority()
    }

    /// Ranking specificity: count of exact slot matches.
    pub fn specificity(&self) -> usize {
        self.plan.exact_matches
    }
}

/// Phases a request moves through; logged for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPhase {
    /// Request received.
    Requested,
    /// Structurally compatible candidates collected.
    CandidatesCollected,
    /// Candidates ranked deterministically.
    Ranked,
    /// Binding the current best candidate.
    Binding,
    /// The bound candidate vetoed the concrete values; falling through.
    ContingentRejected,
    /// A candidate is bound and runnable.
    Bound,
    /// The bound instance is executing.
    Executing,
    /// Execution finished.
    Completed,
}

impl std::fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ResolutionPhase::Requested => "requested",
            ResolutionPhase::CandidatesCollected => "candidates-collected",
            ResolutionPhase::Ranked => "ranked",
            ResolutionPhase::Binding => "binding",
            ResolutionPhase::ContingentRejected => "contingent-rejected",
            ResolutionPhase::Bound => "bound",
            ResolutionPhase::Executing => "executing",
            ResolutionPhase::Completed => "completed",
        };
        write!(f, "{label}")
    }
}

/// Collects and ranks candidates for one request.
pub(crate) struct Matcher<'a> {
    registry: &'a OpRegistry,
    checker: TypeChecker<'a>,
}

impl<'a> Matcher<'a> {
    pub(crate) fn new(registry: &'a OpRegistry, checker: TypeChecker<'a>) -> Self {
        Self { registry, checker }
    }

    /// Collect every structurally compatible candidate, ranked, together
    /// with a rejection status per eliminated descriptor.
    pub(crate) fn candidates(
        &self,
        request: &OpRequest,
    ) -> (Vec<MatchCandidate>, Vec<CandidateStatus>) {
        let descriptors = match request.target() {
            RequestTarget::Name(name) => self.registry.find_by_name(name),
            RequestTarget::Capability(key) => {
                self.registry.find_by_capability(*key, self.checker.types())
            }
        };
        let mut candidates = Vec::new();
        let mut rejected = Vec::new();
        for descriptor in descriptors {
            match self.plan(&descriptor, request.args()) {
                Ok(plan) => candidates.push(MatchCandidate { descriptor, plan }),
                Err(reason) => {
                    log::debug!("eliminated '{}': {reason}", descriptor.display_name());
                    rejected.push(CandidateStatus::new(descriptor.display_name(), reason));
                }
            }
        }
        self.rank(&mut candidates, matches!(request.target(), RequestTarget::Capability(_)));
        (candidates, rejected)
    }

    /// Build the positional binding plan for one descriptor, or explain why
    /// it cannot accept the arguments.
    fn plan(&self, descriptor: &OpDescriptor, args: &[OpValue]) -> Result<BindingPlan, String> {
        let mut plan = BindingPlan::default();
        let mut next_arg = 0usize;
        for (index, slot) in descriptor.slots().iter().enumerate() {
            if !slot.is_input() {
                continue;
            }
            let op_typed = self
                .registry
                .is_capability(slot.type_key(), self.checker.types());
            // Try the next unconsumed argument first.
            if next_arg < args.len() {
                match self.checker.can_accept(slot.type_key(), args[next_arg].type_key()) {
                    Compatibility::Exact => {
                        plan.slots.push(PlannedSlot {
                            slot: index,
                            action: SlotAction::Assign { arg: next_arg },
                        });
                        plan.exact_matches += 1;
                        next_arg += 1;
                        continue;
                    }
                    Compatibility::ViaConversion(rule) => {
                        plan.slots.push(PlannedSlot {
                            slot: index,
                            action: SlotAction::Convert { arg: next_arg, rule },
                        });
                        next_arg += 1;
                        continue;
                    }
                    Compatibility::Incompatible => {
                        if slot.is_required() && !op_typed && slot.default_value().is_none() {
                            return Err(format!(
                                "slot '{}' expects {}, argument {} is {}",
                                slot.name(),
                                slot.type_key(),
                                next_arg,
                                args[next_arg].type_key()
                            ));
                        }
                        // Optional or engine-fillable: leave the argument
                        // for a later slot.
                    }
                }
            }
            // No argument feeds this slot.
            let action = if op_typed {
                SlotAction::Resolve
            } else if slot.default_value().is_some() {
                SlotAction::UseDefault
            } else if slot.is_required() {
                return Err(format!("no argument for required slot '{}'", slot.name()));
            } else {
                SlotAction::Skip
            };
            plan.slots.push(PlannedSlot { slot: index, action });
        }
        if next_arg < args.len() {
            return Err(format!(
                "{} argument(s) left unconsumed",
                args.len() - next_arg
            ));
        }
        Ok(plan)
    }

    /// Order candidates by descending priority, then descending specificity,
    /// then (capability requests) descending declared-type specificity. The
    /// trailing name/id keys only stabilize the order of *lower* ranks for
    /// deterministic contingency fallback — a full tie between neighbours is
    /// detected separately and surfaced as ambiguity.
    fn rank(&self, candidates: &mut [MatchCandidate], by_capability: bool) {
        let types = self.checker.types();
        candidates.sort_by(|a, b| {
            compare_rank(a, b, by_capability, types)
                .then_with(|| {
                    a.descriptor
                        .display_name()
                        .cmp(&b.descriptor.display_name())
                })
                .then_with(|| a.descriptor.id().cmp(&b.descriptor.id()))
        });
    }
}

/// Ranking comparison on the three ranking criteria only (no stabilizing
/// keys).
fn compare_rank(
    a: &MatchCandidate,
    b: &MatchCandidate,
    by_capability: bool,
    types: &TypeHierarchy,
) -> Ordering {
    b.priority()
        .partial_cmp(&a.priority())
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.specificity().cmp(&a.specificity()))
        .then_with(|| {
            if by_capability {
                types
                    .depth(b.descriptor.capability())
                    .cmp(&types.depth(a.descriptor.capability()))
            } else {
                Ordering::Equal
            }
        })
}

/// Whether two ranked candidates tie on every ranking criterion.
pub(crate) fn fully_tied(
    a: &MatchCandidate,
    b: &MatchCandidate,
    by_capability: bool,
    types: &TypeHierarchy,
) -> bool {
    compare_rank(a, b, by_capability, types) == Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{ConversionRule, ConversionTable};
    use crate::descriptor::{priority, ParamSlot};
    use crate::errors::OpError;
    use crate::exec::Op;
    use crate::value::SlotValues;

    struct Threshold;
    struct Sum;
    struct Mean;

    struct NoopOp;

    impl Op for NoopOp {
        fn run(&mut self) -> Result<SlotValues, OpError> {
            Ok(SlotValues::new())
        }
    }

    struct Image;

    fn noop_factory(_: SlotValues) -> Result<Box<dyn Op>, OpError> {
        Ok(Box::new(NoopOp))
    }

    fn threshold_scalar(prio: f64) -> OpDescriptor {
        OpDescriptor::builder(TypeKey::of::<Threshold>())
            .name("threshold")
            .priority(prio)
            .slot(ParamSlot::input("image", TypeKey::of::<Image>()))
            .slot(ParamSlot::input("level", TypeKey::of::<f64>()))
            .slot(ParamSlot::output("out", TypeKey::of::<Image>()))
            .factory(noop_factory)
            .build()
    }

    fn threshold_image() -> OpDescriptor {
        OpDescriptor::builder(TypeKey::of::<Threshold>())
            .name("threshold")
            .slot(ParamSlot::input("image", TypeKey::of::<Image>()))
            .slot(ParamSlot::input("levels", TypeKey::of::<Image>()))
            .slot(ParamSlot::output("out", TypeKey::of::<Image>()))
            .factory(noop_factory)
            .build()
    }

    fn fixture(
        descriptors: Vec<OpDescriptor>,
    ) -> (OpRegistry, TypeHierarchy, ConversionTable) {
        let mut builder = OpRegistry::builder();
        for d in descriptors {
            builder.register(d);
        }
        (builder.build(), TypeHierarchy::new(), ConversionTable::new())
    }

    #[test]
    fn test_overload_selected_by_argument_types() {
        let (registry, types, conversions) = fixture(vec![
            threshold_scalar(priority::NORMAL),
            threshold_image(),
        ]);
        let matcher = Matcher::new(&registry, TypeChecker::new(&types, &conversions));
        let request = OpRequest::by_name("threshold")
            .arg(Image)
            .arg(0.5f64);
        let (candidates, rejected) = matcher.candidates(&request);
        assert_eq!(candidates.len(), 1);
        assert_eq!(rejected.len(), 1);
        assert_eq!(candidates[0].descriptor().slots()[1].name(), "level");
    }

    #[test]
    fn test_priority_orders_candidates() {
        let (registry, types, conversions) = fixture(vec![
            threshold_scalar(priority::LOW),
            threshold_scalar(priority::HIGH),
        ]);
        let matcher = Matcher::new(&registry, TypeChecker::new(&types, &conversions));
        let request = OpRequest::by_name("threshold").arg(Image).arg(0.5f64);
        let (candidates, _) = matcher.candidates(&request);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].priority(), priority::HIGH);
    }

    #[test]
    fn test_exact_beats_conversion() {
        let scalar_f64 = threshold_scalar(priority::NORMAL);
        let scalar_i64 = OpDescriptor::builder(TypeKey::of::<Threshold>())
            .name("threshold")
            .slot(ParamSlot::input("image", TypeKey::of::<Image>()))
            .slot(ParamSlot::input("level", TypeKey::of::<i64>()))
            .slot(ParamSlot::output("out", TypeKey::of::<Image>()))
            .factory(noop_factory)
            .build();
        let (registry, types, mut conversions) = fixture(vec![scalar_f64, scalar_i64]);
        conversions.add(ConversionRule::new::<f64, i64, _>(|v| *v as i64));
        let matcher = Matcher::new(&registry, TypeChecker::new(&types, &conversions));
        let request = OpRequest::by_name("threshold").arg(Image).arg(0.5f64);
        let (candidates, _) = matcher.candidates(&request);
        assert_eq!(candidates.len(), 2);
        // The f64 overload matches both slots exactly; the i64 one needs a
        // conversion and must rank below.
        assert_eq!(candidates[0].specificity(), 2);
        assert_eq!(candidates[1].specificity(), 1);
    }

    #[test]
    fn test_unconsumed_arguments_eliminate() {
        let (registry, types, conversions) = fixture(vec![threshold_scalar(priority::NORMAL)]);
        let matcher = Matcher::new(&registry, TypeChecker::new(&types, &conversions));
        let request = OpRequest::by_name("threshold")
            .arg(Image)
            .arg(0.5f64)
            .arg(0.9f64);
        let (candidates, rejected) = matcher.candidates(&request);
        assert!(candidates.is_empty());
        assert!(rejected[0].reason.contains("unconsumed"));
    }

    #[test]
    fn test_op_typed_slot_planned_for_resolution() {
        let sum = OpDescriptor::builder(TypeKey::of::<Sum>())
            .name("stats.sum")
            .slot(ParamSlot::input("in", TypeKey::of::<Vec<f64>>()))
            .slot(ParamSlot::output("out", TypeKey::of::<f64>()))
            .factory(noop_factory)
            .build();
        let mean = OpDescriptor::builder(TypeKey::of::<Mean>())
            .name("stats.mean")
            .slot(ParamSlot::input("in", TypeKey::of::<Vec<f64>>()))
            .slot(ParamSlot::optional_input("sum", TypeKey::of::<Sum>()))
            .slot(ParamSlot::output("out", TypeKey::of::<f64>()))
            .factory(noop_factory)
            .build();
        let (registry, types, conversions) = fixture(vec![sum, mean]);
        let matcher = Matcher::new(&registry, TypeChecker::new(&types, &conversions));
        let request = OpRequest::by_name("mean").arg(vec![1.0f64, 2.0]);
        let (candidates, _) = matcher.candidates(&request);
        assert_eq!(candidates.len(), 1);
        let plan = candidates[0].plan();
        assert!(plan
            .slots
            .iter()
            .any(|p| matches!(p.action, SlotAction::Resolve)));
    }

    #[test]
    fn test_fully_tied_detection() {
        let (registry, types, conversions) = fixture(vec![
            threshold_scalar(priority::NORMAL),
            threshold_scalar(priority::NORMAL),
        ]);
        let matcher = Matcher::new(&registry, TypeChecker::new(&types, &conversions));
        let request = OpRequest::by_name("threshold").arg(Image).arg(0.5f64);
        let (candidates, _) = matcher.candidates(&request);
        assert_eq!(candidates.len(), 2);
        assert!(fully_tied(&candidates[0], &candidates[1], false, &types));
    }
}
