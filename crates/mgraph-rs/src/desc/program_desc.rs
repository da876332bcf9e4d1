use std::fmt;

use serde::{Deserialize, Serialize};

use super::attr::Attribute;
use super::block_desc::BlockDesc;
use crate::error::{Error, Result};

/// Index of a block inside its program. Block 0 is the main graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub usize);

impl BlockId {
    pub const MAIN: BlockId = BlockId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parsed model: ordered blocks addressed by [`BlockId`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgramDesc {
    blocks: Vec<BlockDesc>,
}

impl ProgramDesc {
    pub fn new(blocks: Vec<BlockDesc>) -> Self {
        ProgramDesc { blocks }
    }

    /// Parses a JSON-encoded program and checks its structure.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let program: ProgramDesc = serde_json::from_str(json)?;
        program.validate()?;
        Ok(program)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let program: ProgramDesc = serde_json::from_slice(bytes)?;
        program.validate()?;
        Ok(program)
    }

    pub fn blocks(&self) -> &[BlockDesc] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> Result<&BlockDesc> {
        self.blocks.get(id.0).ok_or(Error::UnknownBlock(id.0))
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn blocks_mut(&mut self) -> &mut [BlockDesc] {
        &mut self.blocks
    }

    /// Checks block numbering, parent links and block-reference attributes.
    pub fn validate(&self) -> Result<()> {
        let count = self.blocks.len();
        for (position, block) in self.blocks.iter().enumerate() {
            if block.idx().0 != position {
                return Err(Error::InvalidProgram(format!(
                    "block at position {position} declares index {}",
                    block.idx()
                )));
            }
            if let Some(parent) = block.parent_idx() {
                if parent.0 >= count || parent.0 == position {
                    return Err(Error::InvalidProgram(format!(
                        "block {position} has invalid parent {parent}"
                    )));
                }
            }
            for op in block.ops() {
                for (name, attr) in op.attr_map() {
                    if let Attribute::Block(target) = attr {
                        if target.0 >= count {
                            return Err(Error::InvalidProgram(format!(
                                "op '{}' in block {position} references missing block {target} via '{name}'",
                                op.op_type()
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
