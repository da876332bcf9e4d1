//! The operator execution contract.

use crate::desc::{AttributeMap, FromAttribute, OpDesc, VariableNameMap};
use crate::error::{Error, Result};
use crate::scope::Scope;

/// Descriptor data every operator instance carries: its type, argument slots and attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorBase {
    op_type: String,
    inputs: VariableNameMap,
    outputs: VariableNameMap,
    attrs: AttributeMap,
}

impl OperatorBase {
    pub fn new(
        op_type: impl Into<String>,
        inputs: VariableNameMap,
        outputs: VariableNameMap,
        attrs: AttributeMap,
    ) -> Self {
        OperatorBase {
            op_type: op_type.into(),
            inputs,
            outputs,
            attrs,
        }
    }

    pub fn from_desc(desc: &OpDesc) -> Self {
        OperatorBase::new(
            desc.op_type(),
            desc.inputs().clone(),
            desc.outputs().clone(),
            desc.attr_map().clone(),
        )
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn inputs(&self) -> &VariableNameMap {
        &self.inputs
    }

    pub fn outputs(&self) -> &VariableNameMap {
        &self.outputs
    }

    pub fn attrs(&self) -> &AttributeMap {
        &self.attrs
    }

    /// All names bound to a required input slot. An absent or empty slot is
    /// [`Error::MissingArgument`].
    pub fn input_names(&self, slot: &str) -> Result<&[String]> {
        match self.inputs.get(slot) {
            Some(names) if !names.is_empty() => Ok(names),
            _ => Err(Error::missing_input(&self.op_type, slot)),
        }
    }

    pub fn output_names(&self, slot: &str) -> Result<&[String]> {
        match self.outputs.get(slot) {
            Some(names) if !names.is_empty() => Ok(names),
            _ => Err(Error::missing_output(&self.op_type, slot)),
        }
    }

    /// First name bound to a required input slot.
    pub fn input(&self, slot: &str) -> Result<&str> {
        Ok(self.input_names(slot)?[0].as_str())
    }

    /// First name bound to a required output slot.
    pub fn output(&self, slot: &str) -> Result<&str> {
        Ok(self.output_names(slot)?[0].as_str())
    }

    /// Required attribute of kind `T`.
    pub fn attr<T: FromAttribute>(&self, name: &str) -> Result<T> {
        let attr = self.attrs.get(name).ok_or_else(|| {
            Error::invalid_attribute(&self.op_type, name, "required attribute is absent")
        })?;
        T::from_attribute(attr).ok_or_else(|| {
            Error::invalid_attribute(
                &self.op_type,
                name,
                format!("expected {}, found {}", T::KIND, attr.kind()),
            )
        })
    }

    /// Optional attribute of kind `T`; absent yields `default`, a wrong kind is still an error.
    pub fn attr_or<T: FromAttribute>(&self, name: &str, default: T) -> Result<T> {
        if self.attrs.contains_key(name) {
            self.attr(name)
        } else {
            Ok(default)
        }
    }
}

/// Runtime unit of computation built from an [`OpDesc`].
///
/// `run` reads the operator's named inputs from the scope, computes purely from their
/// contents and the attributes, and writes the named outputs back into the same scope.
/// Running twice over unchanged inputs must produce identical outputs.
pub trait Operator: Send + Sync {
    fn base(&self) -> &OperatorBase;

    fn op_type(&self) -> &str {
        self.base().op_type()
    }

    /// One-time checks and inference that need the scope, performed before the first run.
    fn prepare(&mut self, _scope: &Scope<'_>) -> Result<()> {
        Ok(())
    }

    fn run(&self, scope: &mut Scope<'_>) -> Result<()>;
}

/// Lifecycle of an instantiated operator. There is no way back to `Constructed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    Constructed,
    Ready,
    Executed,
}

/// Operator instance owned by an executor plan, tracking its lifecycle state.
pub struct PreparedOp {
    op: Box<dyn Operator>,
    state: OperatorState,
}

impl PreparedOp {
    pub fn new(op: Box<dyn Operator>) -> Self {
        PreparedOp {
            op,
            state: OperatorState::Constructed,
        }
    }

    pub fn op_type(&self) -> &str {
        self.op.op_type()
    }

    pub fn base(&self) -> &OperatorBase {
        self.op.base()
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }

    /// Runs the operator's preparation hook and enters `Ready`.
    pub fn prepare(&mut self, scope: &Scope<'_>) -> Result<()> {
        if self.state == OperatorState::Constructed {
            self.op.prepare(scope)?;
            self.state = OperatorState::Ready;
        }
        Ok(())
    }

    pub fn run(&mut self, scope: &mut Scope<'_>) -> Result<()> {
        if self.state == OperatorState::Constructed {
            return Err(Error::InvalidOperatorState {
                op_type: self.op_type().to_string(),
                state: self.state,
            });
        }
        self.op.run(scope)?;
        self.state = OperatorState::Executed;
        Ok(())
    }
}

impl std::fmt::Debug for PreparedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedOp")
            .field("op_type", &self.op_type())
            .field("state", &self.state)
            .finish()
    }
}
