//! Namespace gateways: prefix-scoped lookup sugar over the environment.
//!
//! A namespace is purely a naming convention ("stats.mean" lives in
//! "stats"); the gateway qualifies names before delegating to the matcher
//! and adds nothing else at runtime.

use crate::env::OpEnvironment;
use crate::errors::ResolveError;
use crate::exec::{BoundOp, OpResult};
use crate::matcher::OpRequest;
use crate::value::OpValue;

/// A view of one namespace prefix over an environment.
#[derive(Debug)]
pub struct OpNamespace<'a> {
    env: &'a OpEnvironment,
    prefix: String,
}

impl<'a> OpNamespace<'a> {
    pub(crate) fn new(env: &'a OpEnvironment, prefix: String) -> Self {
        Self { env, prefix }
    }

    /// The namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Qualify an operation name with this prefix.
    pub fn qualify(&self, op: &str) -> String {
        format!("{}.{op}", self.prefix)
    }

    /// A request for the qualified operation name.
    pub fn request(&self, op: &str) -> OpRequest {
        OpRequest::by_name(self.qualify(op))
    }

    /// Resolve the qualified operation against the given arguments.
    pub fn resolve(&self, op: &str, args: Vec<OpValue>) -> Result<BoundOp, ResolveError> {
        let mut request = self.request(op);
        for arg in args {
            request = request.arg_value(arg);
        }
        self.env.resolve(&request)
    }

    /// Resolve and execute the qualified operation.
    pub fn run(&self, op: &str, args: Vec<OpValue>) -> Result<OpResult, ResolveError> {
        let mut request = self.request(op);
        for arg in args {
            request = request.arg_value(arg);
        }
        self.env.run(&request)
    }

    /// Full names of every operation under this prefix.
    pub fn operations(&self) -> Vec<String> {
        let dotted = format!("{}.", self.prefix);
        self.env
            .operations()
            .into_iter()
            .filter(|name| name.starts_with(&dotted))
            .collect()
    }

    /// A gateway for a nested namespace.
    pub fn namespace(&self, child: &str) -> OpNamespace<'a> {
        OpNamespace {
            env: self.env,
            prefix: self.qualify(child),
        }
    }

    /// Textual listing of the operations under this prefix.
    pub fn help(&self) -> String {
        let names = self.operations();
        if names.is_empty() {
            return format!("No operations registered under '{}'.", self.prefix);
        }
        let mut out = format!("Operations under '{}':\n", self.prefix);
        for name in names {
            out.push_str(&format!("\t{name}\n"));
        }
        out
    }
}
