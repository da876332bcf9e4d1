//! Operator factory keyed by operator-type string.
//!
//! Operator crates contribute [`OperatorDef`] entries to the link-time [`OPERATOR_DEFS`]
//! slice. The builtin registry is assembled from that slice once, on first use, and is
//! read-only afterwards. Callers that need a different operator set (tests, embedders)
//! build their own [`OperatorRegistry`] explicitly before instantiating any graph.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::desc::{AttributeMap, OpDesc, VariableNameMap};
use crate::error::{Error, Result};
use crate::scope::Scope;

use super::operator::{Operator, OperatorBase};

/// Constructor for one concrete operator kind. It validates slots and attributes and may
/// perform static inference; it must not mutate the scope.
pub type BuildFn = fn(OperatorBase, &Scope<'_>) -> Result<Box<dyn Operator>>;

/// Link-time registration record. `module_path` names the defining module, which lets a
/// crate enumerate the operators it contributed.
#[derive(Clone, Copy)]
pub struct OperatorDef {
    pub op_type: &'static str,
    pub module_path: &'static str,
    pub build: BuildFn,
}

#[linkme::distributed_slice]
pub static OPERATOR_DEFS: [OperatorDef] = [..];

pub fn all_operator_defs() -> &'static [OperatorDef] {
    &OPERATOR_DEFS
}

#[derive(Clone, Default)]
pub struct OperatorRegistry {
    builders: HashMap<String, BuildFn>,
}

static BUILTIN_REGISTRY: OnceLock<Arc<OperatorRegistry>> = OnceLock::new();

impl OperatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every operator contributed to [`OPERATOR_DEFS`].
    pub fn builtin() -> Arc<OperatorRegistry> {
        let registry = BUILTIN_REGISTRY.get_or_init(|| {
            let mut registry = OperatorRegistry::new();
            for def in all_operator_defs() {
                if registry.contains(def.op_type) {
                    tracing::warn!(
                        op_type = def.op_type,
                        module = def.module_path,
                        "duplicate operator definition ignored"
                    );
                    continue;
                }
                registry.register(def.op_type, def.build);
            }
            tracing::debug!(count = registry.len(), "builtin operator registry assembled");
            Arc::new(registry)
        });
        Arc::clone(registry)
    }

    /// Adds or replaces the constructor for `op_type`.
    pub fn register(&mut self, op_type: impl Into<String>, build: BuildFn) -> &mut Self {
        self.builders.insert(op_type.into(), build);
        self
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.builders.contains_key(op_type)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Registered operator types, sorted.
    pub fn op_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Builds the operator registered for `op_type`.
    pub fn create(
        &self,
        op_type: &str,
        inputs: VariableNameMap,
        outputs: VariableNameMap,
        attrs: AttributeMap,
        scope: &Scope<'_>,
    ) -> Result<Box<dyn Operator>> {
        let build = self
            .builders
            .get(op_type)
            .ok_or_else(|| Error::UnknownOperatorType(op_type.to_string()))?;
        build(OperatorBase::new(op_type, inputs, outputs, attrs), scope)
    }

    pub fn create_from_desc(&self, desc: &OpDesc, scope: &Scope<'_>) -> Result<Box<dyn Operator>> {
        let build = self
            .builders
            .get(desc.op_type())
            .ok_or_else(|| Error::UnknownOperatorType(desc.op_type().to_string()))?;
        build(OperatorBase::from_desc(desc), scope)
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("op_types", &self.op_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop {
        base: OperatorBase,
    }

    impl Operator for Noop {
        fn base(&self) -> &OperatorBase {
            &self.base
        }

        fn run(&self, _scope: &mut Scope<'_>) -> Result<()> {
            Ok(())
        }
    }

    fn build_noop(base: OperatorBase, _scope: &Scope<'_>) -> Result<Box<dyn Operator>> {
        base.input("X")?;
        Ok(Box::new(Noop { base }))
    }

    #[test]
    fn unknown_type_is_rejected_without_touching_scope() {
        let registry = OperatorRegistry::new();
        let scope = Scope::new();
        let err = registry
            .create(
                "frobnicate",
                VariableNameMap::new(),
                VariableNameMap::new(),
                AttributeMap::new(),
                &scope,
            )
            .err()
            .expect("unregistered type must fail");
        assert!(matches!(err, Error::UnknownOperatorType(t) if t == "frobnicate"));
        assert!(scope.is_empty());
    }

    #[test]
    fn registered_builder_validates_slots() {
        let mut registry = OperatorRegistry::new();
        registry.register("noop", build_noop);
        let scope = Scope::new();

        let missing = OpDesc::new("noop");
        let err = registry.create_from_desc(&missing, &scope).err().unwrap();
        assert!(matches!(err, Error::MissingArgument { ref slot, .. } if slot == "X"));

        let ok = OpDesc::new("noop").with_input("X", ["a"]);
        let op = registry.create_from_desc(&ok, &scope).unwrap();
        assert_eq!(op.op_type(), "noop");
        assert_eq!(registry.op_types(), vec!["noop"]);
    }
}
