//! Descriptor-level rewrites that produce the optimized variant of a program.
//!
//! Passes rewrite a cloned [`ProgramDesc`] in place. A pass must leave every value that
//! the origin program exposes to callers (persistable variables and anything read outside
//! the rewritten block) computed identically.

mod passes;

use std::collections::HashSet;

use crate::desc::ProgramDesc;

pub use passes::{EliminateIdentityScale, FuseElementwiseAddRelu};

/// Statistics reported by an [`OptimizePass`] run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassResult {
    /// Whether the pass changed the program.
    pub changed: bool,
    /// Number of rewrites applied.
    pub rewrites_applied: usize,
    /// Operators removed from the program.
    pub erased_ops: usize,
}

impl PassResult {
    pub fn merge(self, other: PassResult) -> PassResult {
        PassResult {
            changed: self.changed || other.changed,
            rewrites_applied: self.rewrites_applied + other.rewrites_applied,
            erased_ops: self.erased_ops + other.erased_ops,
        }
    }
}

pub trait OptimizePass: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(&self, program: &mut ProgramDesc) -> PassResult;
}

/// The pass pipeline used when a loader is asked for an optimized variant.
pub fn default_passes() -> Vec<Box<dyn OptimizePass>> {
    vec![
        Box::new(EliminateIdentityScale),
        Box::new(FuseElementwiseAddRelu),
    ]
}

/// Runs [`default_passes`] over a copy of `program`.
pub fn optimize(program: &ProgramDesc) -> ProgramDesc {
    optimize_with(program, &default_passes())
}

pub fn optimize_with(program: &ProgramDesc, passes: &[Box<dyn OptimizePass>]) -> ProgramDesc {
    let mut optimized = program.clone();
    let mut total = PassResult::default();
    for pass in passes {
        let result = pass.run(&mut optimized);
        tracing::debug!(
            pass = pass.name(),
            rewrites = result.rewrites_applied,
            erased = result.erased_ops,
            "optimize pass finished"
        );
        total = total.merge(result);
    }
    tracing::info!(
        rewrites = total.rewrites_applied,
        erased = total.erased_ops,
        "program optimized"
    );
    optimized
}

/// Names that must survive a rewrite untouched: persistable variables of any block.
pub(crate) fn pinned_names(program: &ProgramDesc) -> HashSet<String> {
    program
        .blocks()
        .iter()
        .flat_map(|block| block.vars())
        .filter(|var| var.persistable)
        .map(|var| var.name.clone())
        .collect()
}

/// Number of times `name` is read by any op of any block.
pub(crate) fn read_count(program: &ProgramDesc, name: &str) -> usize {
    program
        .blocks()
        .iter()
        .flat_map(|block| block.ops())
        .flat_map(|op| op.input_arguments())
        .filter(|arg| *arg == name)
        .count()
}

/// Number of ops of any block that write `name`.
pub(crate) fn writer_count(program: &ProgramDesc, name: &str) -> usize {
    program
        .blocks()
        .iter()
        .flat_map(|block| block.ops())
        .filter(|op| op.output_arguments().any(|arg| arg == name))
        .count()
}
