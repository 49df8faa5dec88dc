//! The operation environment: the engine's single entry point.
//!
//! An [`OpEnvironment`] owns the built registry, the type hierarchy, the
//! conversion service, and the resolution cache. It is an explicit object —
//! construct one, hold it, pass it around — with no ambient global state.
//! Every resolution is independent: concurrent callers share only the
//! immutable registry and the lock-protected cache.

use std::sync::Arc;

use crate::binder::{self, ResolveCtx};
use crate::cache::{CacheKey, ResolutionCache};
use crate::compat::TypeChecker;
use crate::config::EngineConfig;
use crate::convert::{ConversionService, ConversionTable};
use crate::errors::{CandidateStatus, ResolveError};
use crate::exec::{self, BoundOp, BufferFactory, OpHandle, OpResult};
use crate::help::{render_help, render_rejections, OpSignature};
use crate::matcher::{
    fully_tied, MatchCandidate, Matcher, OpRequest, RequestTarget, ResolutionPhase,
};
use crate::namespace::OpNamespace;
use crate::registry::OpRegistry;
use crate::types::{TypeHierarchy, TypeKey};
use crate::value::{OpValue, SlotValues};

/// Resolution and execution engine over one built registry.
pub struct OpEnvironment {
    registry: OpRegistry,
    types: TypeHierarchy,
    conversions: Box<dyn ConversionService>,
    cache: ResolutionCache,
    config: EngineConfig,
}

impl OpEnvironment {
    /// An environment with an empty type hierarchy, no conversions, and
    /// default configuration.
    pub fn new(registry: OpRegistry) -> Self {
        Self::builder(registry).build()
    }

    /// Start building an environment around a registry.
    pub fn builder(registry: OpRegistry) -> OpEnvironmentBuilder {
        OpEnvironmentBuilder {
            registry,
            types: TypeHierarchy::new(),
            conversions: None,
            config: EngineConfig::default(),
        }
    }

    /// The descriptor catalog.
    pub fn registry(&self) -> &OpRegistry {
        &self.registry
    }

    /// The registered type hierarchy.
    pub fn types(&self) -> &TypeHierarchy {
        &self.types
    }

    pub(crate) fn conversions(&self) -> &dyn ConversionService {
        self.conversions.as_ref()
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolve the request to a bound, runnable instance of the single best
    /// matching implementation.
    pub fn resolve(&self, request: &OpRequest) -> Result<BoundOp, ResolveError> {
        self.resolve_ctx(request, &mut ResolveCtx::new())
    }

    /// Resolve and execute in one step.
    pub fn run(&self, request: &OpRequest) -> Result<OpResult, ResolveError> {
        let mut bound = self.resolve(request)?;
        log::debug!(
            "[{}] '{}'",
            ResolutionPhase::Executing,
            bound.descriptor().display_name()
        );
        let result = bound.run()?;
        log::debug!(
            "[{}] '{}'",
            ResolutionPhase::Completed,
            bound.descriptor().display_name()
        );
        Ok(result)
    }

    /// Execute an already bound instance.
    pub fn run_bound(&self, bound: &mut BoundOp) -> Result<OpResult, ResolveError> {
        bound.run().map_err(ResolveError::Execution)
    }

    /// Sorted, deduplicated logical names of every registered operation.
    pub fn operations(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Structured signatures of every descriptor answering to `name`.
    pub fn describe(&self, name: &str) -> Vec<OpSignature> {
        let mut descriptors = self.registry.find_by_name(name);
        descriptors.sort_by(|a, b| {
            a.display_name()
                .cmp(&b.display_name())
                .then_with(|| a.id().cmp(&b.id()))
        });
        descriptors
            .iter()
            .map(|d| OpSignature::from(d.as_ref()))
            .collect()
    }

    /// Structured signatures of every descriptor providing `capability`.
    pub fn describe_capability(&self, capability: TypeKey) -> Vec<OpSignature> {
        let mut descriptors = self.registry.find_by_capability(capability, &self.types);
        descriptors.sort_by(|a, b| {
            a.display_name()
                .cmp(&b.display_name())
                .then_with(|| a.id().cmp(&b.id()))
        });
        descriptors
            .iter()
            .map(|d| OpSignature::from(d.as_ref()))
            .collect()
    }

    /// Textual listing of every registered operation name.
    pub fn help(&self) -> String {
        let names = self.operations();
        if names.is_empty() {
            return "No operations registered.".to_string();
        }
        let mut out = String::from("Registered operations:\n");
        for name in names {
            out.push_str(&format!("\t{name}\n"));
        }
        out
    }

    /// Textual signatures of every candidate answering to `name`.
    pub fn help_for(&self, name: &str) -> String {
        render_help(name, &self.describe(name))
    }

    /// Explain how the given request would match: surviving candidates in
    /// rank order plus a rejection reason per eliminated descriptor.
    pub fn explain(&self, request: &OpRequest) -> String {
        let checker = TypeChecker::new(&self.types, self.conversions.as_ref());
        let matcher = Matcher::new(&self.registry, checker);
        let (candidates, rejected) = matcher.candidates(request);
        let target = request.target().to_string();
        let mut out = String::new();
        if candidates.is_empty() {
            out.push_str(&format!("No matching candidates for '{target}'.\n"));
        } else {
            let signatures: Vec<OpSignature> = candidates
                .iter()
                .map(|c| OpSignature::from(c.descriptor().as_ref()))
                .collect();
            out.push_str(&render_help(&target, &signatures));
        }
        if !rejected.is_empty() {
            out.push_str(&render_rejections(&target, &rejected));
        }
        out
    }

    /// A gateway scoped to one namespace prefix.
    pub fn namespace(&self, prefix: impl Into<String>) -> OpNamespace<'_> {
        OpNamespace::new(self, prefix.into())
    }

    /// An independent duplicate of a bound instance, for per-partition
    /// parallel execution. Sub-operation handles are duplicated recursively;
    /// nothing is shared with the original beyond the argument values
    /// themselves.
    pub fn independent(&self, bound: &BoundOp) -> Result<BoundOp, ResolveError> {
        let mut values = SlotValues::new();
        for (name, value) in bound.bindings().iter() {
            if let Some(handle) = value.downcast_ref::<OpHandle>() {
                let duplicate = self.independent(&handle.bound())?;
                values.insert(
                    name,
                    OpValue::tagged(OpHandle::new(duplicate), value.type_key()),
                );
            } else {
                values.insert(name, value.clone());
            }
        }
        let instance = bound
            .descriptor()
            .instantiate(values.clone())
            .map_err(ResolveError::Execution)?;
        Ok(BoundOp::new(
            Arc::clone(bound.descriptor()),
            instance,
            values,
        ))
    }

    /// Compose two bound instances into a pipeline: the first's single
    /// output feeds the first compatible input slot of the second,
    /// converting if a rule is registered. An optional buffer factory
    /// supplies the intermediate value the head stage writes into; by
    /// default the head's own output (or bound buffer) is used.
    pub fn join(
        &self,
        first: BoundOp,
        second: BoundOp,
        buffer: Option<BufferFactory>,
    ) -> Result<BoundOp, ResolveError> {
        let mut outputs = first.descriptor().output_slots();
        let (_, head_out) = outputs.next().ok_or_else(|| {
            ResolveError::binding(
                first.descriptor().display_name(),
                "out",
                "pipeline head declares no output slot",
            )
        })?;
        if outputs.next().is_some() {
            return Err(ResolveError::binding(
                first.descriptor().display_name(),
                "out",
                "pipeline head declares more than one output slot",
            ));
        }
        let out_ty = head_out.type_key();
        drop(outputs);

        let checker = TypeChecker::new(&self.types, self.conversions.as_ref());
        let mut pipe = None;
        for (_, slot) in second.descriptor().input_slots() {
            match checker.can_accept(slot.type_key(), out_ty) {
                crate::compat::Compatibility::Exact => {
                    pipe = Some((slot.name().to_string(), None));
                    break;
                }
                crate::compat::Compatibility::ViaConversion(rule) => {
                    pipe = Some((slot.name().to_string(), Some(rule)));
                    break;
                }
                crate::compat::Compatibility::Incompatible => {}
            }
        }
        let (pipe_slot, pipe_rule) = pipe.ok_or_else(|| {
            ResolveError::binding(
                second.descriptor().display_name(),
                "in",
                format!("no input slot accepts pipeline value of type {out_ty}"),
            )
        })?;
        exec::compose_join(first, second, pipe_slot, pipe_rule, buffer)
    }

    /// The resolve loop, shared by public entry points and recursive
    /// sub-resolution. Walks the ranked candidates, binding each and letting
    /// its contingency check veto it, until one survives or the list is
    /// exhausted.
    pub(crate) fn resolve_ctx(
        &self,
        request: &OpRequest,
        ctx: &mut ResolveCtx,
    ) -> Result<BoundOp, ResolveError> {
        let target = request.target().to_string();
        log::debug!(
            "[{}] '{target}' with {} argument(s)",
            ResolutionPhase::Requested,
            request.args().len()
        );
        let by_capability = matches!(request.target(), RequestTarget::Capability(_));
        let (candidates, rejected) = self.ranked_candidates(request);
        log::debug!(
            "[{}] '{target}': {} candidate(s), {} eliminated",
            ResolutionPhase::CandidatesCollected,
            candidates.len(),
            rejected.len()
        );
        if candidates.is_empty() {
            return Err(ResolveError::NoCandidates {
                target,
                considered: rejected,
            });
        }
        log::debug!("[{}] '{target}'", ResolutionPhase::Ranked);

        let mut contingent_rejections = 0usize;
        for (index, candidate) in candidates.iter().enumerate() {
            if let Some(next) = candidates.get(index + 1) {
                if fully_tied(candidate, next, by_capability, &self.types) {
                    let tied: Vec<String> = candidates[index..]
                        .iter()
                        .take_while(|c| fully_tied(candidate, c, by_capability, &self.types))
                        .map(|c| c.descriptor().display_name())
                        .collect();
                    return Err(ResolveError::AmbiguousMatch { target, tied });
                }
            }
            log::debug!(
                "[{}] '{target}' -> '{}'",
                ResolutionPhase::Binding,
                candidate.descriptor().display_name()
            );
            let bound = binder::bind_candidate(self, candidate, request.args(), ctx)?;
            if bound.conforms() {
                log::debug!(
                    "[{}] '{target}' -> '{}'",
                    ResolutionPhase::Bound,
                    bound.descriptor().display_name()
                );
                return Ok(bound);
            }
            log::debug!(
                "[{}] '{target}': '{}' declined the values, trying next",
                ResolutionPhase::ContingentRejected,
                candidate.descriptor().display_name()
            );
            contingent_rejections += 1;
        }
        Err(ResolveError::ContingencyExhausted {
            target,
            rejected: contingent_rejections,
        })
    }

    /// Ranked candidates for the request, memoized per (target, argument
    /// type signature) when caching is enabled. Rejection statuses are only
    /// produced on a live scan; a cache hit implies a previously non-empty
    /// candidate list.
    fn ranked_candidates(
        &self,
        request: &OpRequest,
    ) -> (Arc<Vec<MatchCandidate>>, Vec<CandidateStatus>) {
        let key = self.config.cache_enabled.then(|| CacheKey::for_request(request));
        if let Some(key) = &key {
            if let Some(hit) = self.cache.get(key) {
                log::debug!("resolution cache hit for '{}'", request.target());
                return (hit, Vec::new());
            }
        }
        let checker = TypeChecker::new(&self.types, self.conversions.as_ref());
        let matcher = Matcher::new(&self.registry, checker);
        let (candidates, rejected) = matcher.candidates(request);
        let candidates = Arc::new(candidates);
        if let Some(key) = key {
            if !candidates.is_empty() {
                self.cache.put(key, Arc::clone(&candidates));
            }
        }
        (candidates, rejected)
    }
}

impl std::fmt::Debug for OpEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpEnvironment")
            .field("descriptors", &self.registry.len())
            .field("cache_entries", &self.cache.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`OpEnvironment`].
pub struct OpEnvironmentBuilder {
    registry: OpRegistry,
    types: TypeHierarchy,
    conversions: Option<Box<dyn ConversionService>>,
    config: EngineConfig,
}

impl OpEnvironmentBuilder {
    /// Use the given type hierarchy.
    pub fn types(mut self, types: TypeHierarchy) -> Self {
        self.types = types;
        self
    }

    /// Use the given conversion service.
    pub fn conversions(mut self, conversions: impl ConversionService + 'static) -> Self {
        self.conversions = Some(Box::new(conversions));
        self
    }

    /// Use the given configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Finish the environment.
    pub fn build(self) -> OpEnvironment {
        OpEnvironment {
            registry: self.registry,
            types: self.types,
            conversions: self
                .conversions
                .unwrap_or_else(|| Box::new(ConversionTable::new())),
            cache: ResolutionCache::new(),
            config: self.config,
        }
    }
}
