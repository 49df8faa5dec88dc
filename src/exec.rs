//! The execution contract and wrapper.
//!
//! Every algorithm, whatever its style (pure function, in-place mutator,
//! pipeline stage), is driven through one contract: the factory builds it
//! from a slot map, [`Op::conforms`] may veto the concrete values after
//! binding, and [`Op::run`] produces its outputs as another slot map. The
//! wrapper then packages outputs uniformly — zero declared outputs yield no
//! result, one yields the value verbatim, several yield an ordered sequence
//! in output-slot declaration order. In-place mutators need not re-emit
//! their argument: a consumed-and-produced slot falls back to its bound
//! value.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::convert::ConversionRule;
use crate::descriptor::{ExecStyle, OpDescriptor, SlotDirection};
use crate::errors::{OpError, ResolveError};
use crate::value::{OpValue, SlotValues};

/// One runnable algorithm instance.
///
/// Instances are created by a descriptor's factory from a populated slot
/// map and own whatever scratch state they need; they are never shared
/// between requests or threads by the engine.
pub trait Op: Send {
    /// Value-level applicability check, invoked once after binding. A
    /// `false` vetoes this instance and lets resolution fall through to the
    /// next ranked candidate.
    fn conforms(&self) -> bool {
        true
    }

    /// Execute, returning produced values keyed by output slot name.
    fn run(&mut self) -> Result<SlotValues, OpError>;
}

/// Uniformly packaged execution result.
#[derive(Debug, Clone)]
pub enum OpResult {
    /// The operation declares no outputs.
    None,
    /// Exactly one declared output, verbatim.
    Single(OpValue),
    /// Several declared outputs, in declaration order.
    Many(Vec<OpValue>),
}

impl OpResult {
    /// The single output value, if there is exactly one.
    pub fn single(&self) -> Option<&OpValue> {
        match self {
            OpResult::Single(value) => Some(value),
            _ => None,
        }
    }

    /// Consume into the single output value, if there is exactly one.
    pub fn into_single(self) -> Option<OpValue> {
        match self {
            OpResult::Single(value) => Some(value),
            _ => None,
        }
    }

    /// Consume into an ordered list of outputs (possibly empty).
    pub fn into_vec(self) -> Vec<OpValue> {
        match self {
            OpResult::None => Vec::new(),
            OpResult::Single(value) => vec![value],
            OpResult::Many(values) => values,
        }
    }
}

/// A descriptor instance with every required slot populated, ready to run.
///
/// Exclusively owned by the call that produced it; the registry keeps no
/// reference. Duplicate through the environment's independent-instance
/// mechanism for parallel use, never by sharing.
pub struct BoundOp {
    descriptor: Arc<OpDescriptor>,
    instance: Box<dyn Op>,
    bindings: SlotValues,
}

impl BoundOp {
    pub(crate) fn new(
        descriptor: Arc<OpDescriptor>,
        instance: Box<dyn Op>,
        bindings: SlotValues,
    ) -> Self {
        Self {
            descriptor,
            instance,
            bindings,
        }
    }

    /// The descriptor this instance was created from.
    pub fn descriptor(&self) -> &Arc<OpDescriptor> {
        &self.descriptor
    }

    /// The values bound into the instance's slots.
    pub fn bindings(&self) -> &SlotValues {
        &self.bindings
    }

    /// The instance's post-binding applicability check.
    pub fn conforms(&self) -> bool {
        self.instance.conforms()
    }

    /// Execute and package the result.
    pub fn run(&mut self) -> Result<OpResult, OpError> {
        let outputs = self.instance.run()?;
        package(&self.descriptor, &self.bindings, outputs)
    }
}

impl std::fmt::Debug for BoundOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundOp")
            .field("descriptor", &self.descriptor.display_name())
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

/// Package raw instance outputs per the descriptor's output declarations.
fn package(
    descriptor: &OpDescriptor,
    bindings: &SlotValues,
    outputs: SlotValues,
) -> Result<OpResult, OpError> {
    let mut packaged = Vec::new();
    for (_, slot) in descriptor.output_slots() {
        if let Some(value) = outputs.get(slot.name()) {
            packaged.push(value.clone());
        } else if slot.direction() == SlotDirection::Both {
            // In-place style: the mutated argument is the result.
            match bindings.get(slot.name()) {
                Some(value) => packaged.push(value.clone()),
                None => return Err(OpError::missing(slot.name())),
            }
        } else if slot.is_required() {
            return Err(OpError::missing(slot.name()));
        }
    }
    Ok(match packaged.len() {
        0 => OpResult::None,
        1 => OpResult::Single(packaged.remove(0)),
        _ => OpResult::Many(packaged),
    })
}

/// Shareable handle to a bound sub-operation.
///
/// This is what an operation-typed slot receives: the sub-operation, fully
/// bound against the host instance's inputs, runnable as many times as the
/// host needs.
#[derive(Clone)]
pub struct OpHandle {
    inner: Arc<Mutex<BoundOp>>,
}

impl OpHandle {
    /// Wrap a bound operation for use as an operation-typed argument. Tag
    /// the wrapping [`OpValue`] with the capability the slot declares.
    pub fn new(bound: BoundOp) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bound)),
        }
    }

    /// The descriptor of the underlying bound operation.
    pub fn descriptor(&self) -> Arc<OpDescriptor> {
        Arc::clone(self.inner.lock().descriptor())
    }

    /// Run the underlying bound operation.
    pub fn run(&self) -> Result<OpResult, OpError> {
        self.inner.lock().run()
    }

    pub(crate) fn bound(&self) -> parking_lot::MutexGuard<'_, BoundOp> {
        self.inner.lock()
    }
}

impl std::fmt::Debug for OpHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpHandle")
            .field("descriptor", &self.descriptor().display_name())
            .finish()
    }
}

/// Factory for pipeline intermediate buffers.
pub type BufferFactory = Arc<dyn Fn() -> OpValue + Send + Sync>;

/// Two bound stages composed so the first's output feeds the second's input.
///
/// Both stages are re-instantiated from their descriptors on every run, so a
/// composed pipeline duplicates cleanly for per-partition execution.
#[derive(Clone)]
struct JoinOp {
    first_descriptor: Arc<OpDescriptor>,
    first_bindings: SlotValues,
    first_out: String,
    second_descriptor: Arc<OpDescriptor>,
    second_bindings: SlotValues,
    pipe_slot: String,
    pipe_rule: Option<ConversionRule>,
    buffer: Option<BufferFactory>,
}

impl Op for JoinOp {
    fn run(&mut self) -> Result<SlotValues, OpError> {
        // First stage, optionally writing into a caller-supplied buffer.
        let mut first_bindings = self.first_bindings.clone();
        if let Some(factory) = &self.buffer {
            first_bindings.insert(self.first_out.clone(), factory());
        }
        let mut first = BoundOp::new(
            Arc::clone(&self.first_descriptor),
            self.first_descriptor.instantiate(first_bindings.clone())?,
            first_bindings,
        );
        let intermediate = first
            .run()?
            .into_single()
            .ok_or_else(|| OpError::failed("pipeline stage produced no single output"))?;

        let delivered = match &self.pipe_rule {
            Some(rule) => rule
                .apply(&intermediate)
                .map_err(|e| OpError::failed(e.to_string()))?,
            None => intermediate,
        };

        // Second stage, fed with the intermediate value.
        let mut second_bindings = self.second_bindings.clone();
        second_bindings.insert(self.pipe_slot.clone(), delivered);
        let mut instance = self.second_descriptor.instantiate(second_bindings.clone())?;
        if !instance.conforms() {
            return Err(OpError::failed(format!(
                "pipeline stage '{}' declined the intermediate value",
                self.second_descriptor.display_name()
            )));
        }
        let mut outputs = instance.run()?;
        // Normalize in-place second stages so the outer packaging sees the
        // mutated slot value.
        for (_, slot) in self.second_descriptor.output_slots() {
            if outputs.get(slot.name()).is_none() && slot.direction() == SlotDirection::Both {
                if let Some(value) = second_bindings.get(slot.name()) {
                    outputs.insert(slot.name(), value.clone());
                }
            }
        }
        Ok(outputs)
    }
}

/// Compose two bound instances into a pipeline. `pipe_slot`/`pipe_rule`
/// describe how the first stage's single output enters the second stage;
/// callers go through the environment, which computes them.
pub(crate) fn compose_join(
    first: BoundOp,
    second: BoundOp,
    pipe_slot: String,
    pipe_rule: Option<ConversionRule>,
    buffer: Option<BufferFactory>,
) -> Result<BoundOp, ResolveError> {
    let first_out = first
        .descriptor()
        .output_slots()
        .map(|(_, s)| s.name().to_string())
        .next()
        .ok_or_else(|| {
            ResolveError::binding(
                first.descriptor().display_name(),
                "out",
                "pipeline head declares no output slot",
            )
        })?;

    let mut builder = OpDescriptor::builder(second.descriptor().capability())
        .style(ExecStyle::Stage)
        .priority(second.descriptor().priority());
    for (_, slot) in second.descriptor().output_slots() {
        builder = builder.slot(slot.clone());
    }

    let template = JoinOp {
        first_descriptor: Arc::clone(first.descriptor()),
        first_bindings: first.bindings().clone(),
        first_out,
        second_descriptor: Arc::clone(second.descriptor()),
        second_bindings: second.bindings().clone(),
        pipe_slot,
        pipe_rule,
        buffer,
    };
    let descriptor = Arc::new(
        builder
            .factory(move |_values| Ok(Box::new(template.clone()) as Box<dyn Op>))
            .build(),
    );
    let instance = descriptor
        .instantiate(SlotValues::new())
        .map_err(ResolveError::Execution)?;
    Ok(BoundOp::new(descriptor, instance, SlotValues::new()))
}
