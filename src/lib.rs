//! # ndops
//!
//! Operation resolution and execution engine for extensible multidimensional
//! image processing.
//!
//! Algorithm implementations are registered once at startup as
//! [`OpDescriptor`]s — static metadata plus a factory — and callers then ask
//! for an operation by logical name or by capability type, together with a
//! list of runtime arguments. The engine locates every structurally
//! compatible implementation, ranks the candidates deterministically, binds
//! the winner's parameter slots (converting argument types and recursively
//! resolving operation-typed slots where needed), lets the bound instance
//! veto itself against the concrete values, and finally executes it behind a
//! single invocation contract regardless of whether the algorithm is a pure
//! function, an in-place mutator, or a pipeline stage.
//!
//! The engine is an explicit object: construct an [`OpEnvironment`] from a
//! built [`OpRegistry`], hold it, and pass it around. There is no global
//! state.

mod binder;
mod cache;

pub mod compat;
pub mod config;
pub mod convert;
pub mod descriptor;
pub mod env;
pub mod errors;
pub mod exec;
pub mod help;
pub mod matcher;
pub mod namespace;
pub mod registry;
pub mod types;
pub mod value;

pub use compat::Compatibility;
pub use config::EngineConfig;
pub use convert::{ConversionError, ConversionRule, ConversionService, ConversionTable};
pub use descriptor::{
    priority, ExecStyle, OpDescriptor, OpDescriptorBuilder, ParamSlot, SlotDirection,
};
pub use env::OpEnvironment;
pub use errors::{CandidateStatus, OpError, ResolveError};
pub use exec::{BoundOp, BufferFactory, Op, OpHandle, OpResult};
pub use help::{OpSignature, SlotSignature};
pub use matcher::{OpRequest, RequestTarget, ResolutionPhase};
pub use namespace::OpNamespace;
pub use registry::{OpRegistry, RegistryBuilder};
pub use types::{TypeHierarchy, TypeKey};
pub use value::{OpValue, SlotValues};

/// Library version.
pub const VERSION: &str = "0.1.0";
