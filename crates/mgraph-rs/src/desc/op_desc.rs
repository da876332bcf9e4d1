use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::attr::{Attribute, AttributeMap};

/// Argument slot name to the ordered variable names bound to it.
pub type VariableNameMap = BTreeMap<String, Vec<String>>;

/// Declarative description of a single operator inside a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpDesc {
    #[serde(rename = "type")]
    op_type: String,
    #[serde(default)]
    inputs: VariableNameMap,
    #[serde(default)]
    outputs: VariableNameMap,
    #[serde(default)]
    attrs: AttributeMap,
}

impl OpDesc {
    pub fn new(op_type: impl Into<String>) -> Self {
        OpDesc {
            op_type: op_type.into(),
            inputs: VariableNameMap::new(),
            outputs: VariableNameMap::new(),
            attrs: AttributeMap::new(),
        }
    }

    /// Binds an input slot to variable names.
    pub fn with_input<I, S>(mut self, slot: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs
            .insert(slot.into(), names.into_iter().map(Into::into).collect());
        self
    }

    /// Binds an output slot to variable names.
    pub fn with_output<I, S>(mut self, slot: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs
            .insert(slot.into(), names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<Attribute>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    /// Variable names bound to input `slot`; empty when the slot is absent.
    pub fn input(&self, slot: &str) -> &[String] {
        self.inputs.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Variable names bound to output `slot`; empty when the slot is absent.
    pub fn output(&self, slot: &str) -> &[String] {
        self.outputs.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn inputs(&self) -> &VariableNameMap {
        &self.inputs
    }

    pub fn outputs(&self) -> &VariableNameMap {
        &self.outputs
    }

    pub fn attr_map(&self) -> &AttributeMap {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(name)
    }

    /// Every variable name read by this op, in slot order.
    pub fn input_arguments(&self) -> impl Iterator<Item = &str> {
        self.inputs.values().flatten().map(String::as_str)
    }

    /// Every variable name written by this op, in slot order.
    pub fn output_arguments(&self) -> impl Iterator<Item = &str> {
        self.outputs.values().flatten().map(String::as_str)
    }

    /// Renames every input reference of `from` to `to`.
    pub(crate) fn rename_input(&mut self, from: &str, to: &str) {
        for names in self.inputs.values_mut() {
            for name in names.iter_mut().filter(|n| n.as_str() == from) {
                *name = to.to_string();
            }
        }
    }
}
