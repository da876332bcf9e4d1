//! Error taxonomy shared by the descriptor layer, the operator factory and the executor.

use std::fmt;

use thiserror::Error;

use crate::tensor::DType;

/// Which side of an operator descriptor an argument slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Input,
    Output,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Input => f.write_str("input"),
            SlotKind::Output => f.write_str("output"),
        }
    }
}

/// Failures raised while building or running an operator graph.
///
/// Construction-time kinds (`UnknownOperatorType`, `MissingArgument`, `InvalidAttribute`)
/// are raised before any tensor of the block is touched. Run-time kinds abort the current
/// block. The executor wraps whatever escapes an operator in [`Error::Operator`] so callers
/// always learn the block, the position and the type of the failing operator.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown operator type '{0}'")]
    UnknownOperatorType(String),

    #[error("operator '{op_type}' is missing required {kind} slot '{slot}'")]
    MissingArgument {
        op_type: String,
        kind: SlotKind,
        slot: String,
    },

    #[error("operator '{op_type}' has invalid attribute '{name}': {reason}")]
    InvalidAttribute {
        op_type: String,
        name: String,
        reason: String,
    },

    #[error("variable '{0}' is read before it was fed or computed")]
    UninitializedVariable(String),

    #[error("shape mismatch: {lhs:?} vs {rhs:?} ({detail})")]
    ShapeMismatch {
        lhs: Vec<usize>,
        rhs: Vec<usize>,
        detail: String,
    },

    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch { expected: DType, got: DType },

    #[error("tensor has no allocated storage")]
    Unallocated,

    #[error("operator '{op_type}' cannot compute its output: {reason}")]
    Compute { op_type: String, reason: String },

    #[error("variable '{name}' holds {held}, requested {requested}")]
    VariableTypeMismatch {
        name: String,
        held: &'static str,
        requested: &'static str,
    },

    #[error("block {0} does not exist in program")]
    UnknownBlock(usize),

    #[error("operator '{op_type}' cannot run from state {state:?}")]
    InvalidOperatorState {
        op_type: String,
        state: crate::ops::OperatorState,
    },

    #[error("invalid program: {0}")]
    InvalidProgram(String),

    #[error("block {block}, op #{op_index} ('{op_type}'): {source}")]
    Operator {
        block: usize,
        op_index: usize,
        op_type: String,
        #[source]
        source: Box<Error>,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl Error {
    pub fn missing_input(op_type: impl Into<String>, slot: impl Into<String>) -> Self {
        Error::MissingArgument {
            op_type: op_type.into(),
            kind: SlotKind::Input,
            slot: slot.into(),
        }
    }

    pub fn missing_output(op_type: impl Into<String>, slot: impl Into<String>) -> Self {
        Error::MissingArgument {
            op_type: op_type.into(),
            kind: SlotKind::Output,
            slot: slot.into(),
        }
    }

    pub fn invalid_attribute(
        op_type: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidAttribute {
            op_type: op_type.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn shape_mismatch(lhs: &[usize], rhs: &[usize], detail: impl Into<String>) -> Self {
        Error::ShapeMismatch {
            lhs: lhs.to_vec(),
            rhs: rhs.to_vec(),
            detail: detail.into(),
        }
    }

    pub fn compute(op_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Compute {
            op_type: op_type.into(),
            reason: reason.into(),
        }
    }

    /// Attaches the failing operator's location to an error.
    pub fn at_operator(self, block: usize, op_index: usize, op_type: impl Into<String>) -> Self {
        Error::Operator {
            block,
            op_index,
            op_type: op_type.into(),
            source: Box::new(self),
        }
    }

    /// Strips [`Error::Operator`] wrappers and returns the underlying failure.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Operator { source, .. } = current {
            current = source;
        }
        current
    }

    /// Returns `(block, op_index, op_type)` when the error carries an operator location.
    pub fn location(&self) -> Option<(usize, usize, &str)> {
        match self {
            Error::Operator {
                block,
                op_index,
                op_type,
                ..
            } => Some((*block, *op_index, op_type.as_str())),
            _ => None,
        }
    }
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_unwraps_nested_operator_context() {
        let err = Error::UninitializedVariable("x".into())
            .at_operator(0, 3, "relu")
            .at_operator(1, 0, "conditional_block");
        assert!(matches!(err.root(), Error::UninitializedVariable(name) if name == "x"));
        assert_eq!(err.location(), Some((1, 0, "conditional_block")));
    }

    #[test]
    fn operator_context_is_rendered() {
        let err = Error::missing_input("elementwise_sub", "Y").at_operator(0, 2, "elementwise_sub");
        let rendered = err.to_string();
        assert!(rendered.contains("block 0, op #2"));
        assert!(rendered.contains("missing required input slot 'Y'"));
    }
}
