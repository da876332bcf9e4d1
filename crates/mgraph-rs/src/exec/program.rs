use std::sync::Arc;

use crate::desc::ProgramDesc;
use crate::scope::Scope;

use super::config::ProgramVariant;

/// A loaded model: the origin descriptors, the optional optimized descriptors and the root
/// scope holding persisted parameters.
#[derive(Debug)]
pub struct Program {
    origin: Arc<ProgramDesc>,
    optimized: Option<Arc<ProgramDesc>>,
    scope: Scope<'static>,
}

impl Program {
    pub fn new(origin: ProgramDesc) -> Self {
        Program {
            origin: Arc::new(origin),
            optimized: None,
            scope: Scope::new(),
        }
    }

    pub fn with_optimized(mut self, optimized: ProgramDesc) -> Self {
        self.optimized = Some(Arc::new(optimized));
        self
    }

    pub fn with_scope(mut self, scope: Scope<'static>) -> Self {
        self.scope = scope;
        self
    }

    pub fn origin(&self) -> &Arc<ProgramDesc> {
        &self.origin
    }

    pub fn optimized(&self) -> Option<&Arc<ProgramDesc>> {
        self.optimized.as_ref()
    }

    pub fn scope(&self) -> &Scope<'static> {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope<'static> {
        &mut self.scope
    }

    /// Descriptors for `variant`. Asking for the optimized variant of a program that has
    /// none yields the origin descriptors.
    pub fn desc(&self, variant: ProgramVariant) -> &Arc<ProgramDesc> {
        self.resolve(variant).1
    }

    /// The variant actually served for `variant`, with its descriptors.
    pub fn resolve(&self, variant: ProgramVariant) -> (ProgramVariant, &Arc<ProgramDesc>) {
        match (variant, &self.optimized) {
            (ProgramVariant::Optimized, Some(optimized)) => (ProgramVariant::Optimized, optimized),
            (ProgramVariant::Optimized, None) => {
                tracing::warn!("optimized program requested but absent; using origin");
                (ProgramVariant::Origin, &self.origin)
            }
            (ProgramVariant::Origin, _) => (ProgramVariant::Origin, &self.origin),
        }
    }

    pub fn into_scope(self) -> Scope<'static> {
        self.scope
    }
}
