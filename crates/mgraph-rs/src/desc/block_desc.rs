use serde::{Deserialize, Serialize};

use super::op_desc::OpDesc;
use super::program_desc::BlockId;
use crate::tensor::DType;

/// Declared variable of a block. Persistable variables are model parameters that the
/// loader reads from the params archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDesc {
    pub name: String,
    #[serde(default)]
    pub persistable: bool,
    #[serde(default)]
    pub dtype: Option<DType>,
    #[serde(default)]
    pub dims: Vec<i64>,
}

impl VarDesc {
    pub fn new(name: impl Into<String>) -> Self {
        VarDesc {
            name: name.into(),
            persistable: false,
            dtype: None,
            dims: Vec::new(),
        }
    }

    pub fn persistable(mut self) -> Self {
        self.persistable = true;
        self
    }
}

/// Basic unit of control flow: an ordered list of operators plus declared variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDesc {
    idx: BlockId,
    #[serde(default)]
    parent_idx: Option<BlockId>,
    #[serde(default)]
    vars: Vec<VarDesc>,
    #[serde(default)]
    ops: Vec<OpDesc>,
}

impl BlockDesc {
    pub fn new(idx: BlockId, parent_idx: Option<BlockId>) -> Self {
        BlockDesc {
            idx,
            parent_idx,
            vars: Vec::new(),
            ops: Vec::new(),
        }
    }

    pub fn with_ops(mut self, ops: Vec<OpDesc>) -> Self {
        self.ops = ops;
        self
    }

    pub fn with_vars(mut self, vars: Vec<VarDesc>) -> Self {
        self.vars = vars;
        self
    }

    pub fn idx(&self) -> BlockId {
        self.idx
    }

    pub fn parent_idx(&self) -> Option<BlockId> {
        self.parent_idx
    }

    /// Operators in declaration order, which is also execution order.
    pub fn ops(&self) -> &[OpDesc] {
        &self.ops
    }

    pub fn vars(&self) -> &[VarDesc] {
        &self.vars
    }

    pub fn var(&self, name: &str) -> Option<&VarDesc> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub(crate) fn ops_mut(&mut self) -> &mut Vec<OpDesc> {
        &mut self.ops
    }
}
