use crate::desc::{FromAttribute, OpDesc, ProgramDesc};

use super::{pinned_names, read_count, writer_count, OptimizePass, PassResult};

/// Folds `elementwise_add(X, Y) -> T; relu(T) -> Out` into
/// `fusion_elementwise_add_relu(X, Y) -> Out` when `T` is a private temporary.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuseElementwiseAddRelu;

impl FuseElementwiseAddRelu {
    const NAME: &'static str = "fuse_elementwise_add_relu";
    pub const FUSED_TYPE: &'static str = "fusion_elementwise_add_relu";
}

impl OptimizePass for FuseElementwiseAddRelu {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, program: &mut ProgramDesc) -> PassResult {
        let mut result = PassResult::default();
        while let Some((block, add_idx, relu_idx)) = find_add_relu(program) {
            let ops = program.blocks_mut()[block].ops_mut();
            let add = &ops[add_idx];
            let relu = &ops[relu_idx];
            tracing::trace!(
                block,
                add_idx,
                relu_idx,
                tmp = %relu.input("X")[0],
                "fusing elementwise_add + relu"
            );
            let fused = OpDesc::new(Self::FUSED_TYPE)
                .with_input("X", add.input("X").to_vec())
                .with_input("Y", add.input("Y").to_vec())
                .with_output("Out", relu.output("Out").to_vec());
            let fused = add
                .attr_map()
                .iter()
                .fold(fused, |op, (name, value)| op.with_attr(name.clone(), value.clone()));
            ops[relu_idx] = fused;
            ops.remove(add_idx);
            result.changed = true;
            result.rewrites_applied += 1;
            result.erased_ops += 1;
        }
        result
    }
}

fn single(names: &[String]) -> Option<&str> {
    match names {
        [name] => Some(name.as_str()),
        _ => None,
    }
}

fn find_add_relu(program: &ProgramDesc) -> Option<(usize, usize, usize)> {
    let pinned = pinned_names(program);
    for (block_idx, block) in program.blocks().iter().enumerate() {
        let ops = block.ops();
        for (add_idx, add) in ops.iter().enumerate() {
            if add.op_type() != "elementwise_add" {
                continue;
            }
            let (Some(x), Some(y), Some(tmp)) = (
                single(add.input("X")),
                single(add.input("Y")),
                single(add.output("Out")),
            ) else {
                continue;
            };
            if pinned.contains(tmp)
                || writer_count(program, tmp) != 1
                || read_count(program, tmp) != 1
            {
                continue;
            }
            let Some(relu_offset) = ops[add_idx + 1..]
                .iter()
                .position(|op| op.input_arguments().any(|arg| arg == tmp))
            else {
                continue;
            };
            let relu_idx = add_idx + 1 + relu_offset;
            let relu = &ops[relu_idx];
            if relu.op_type() != "relu" || single(relu.output("Out")).is_none() {
                continue;
            }
            let clobbered = ops[add_idx + 1..relu_idx]
                .iter()
                .flat_map(|op| op.output_arguments())
                .any(|arg| arg == x || arg == y);
            if clobbered {
                continue;
            }
            return Some((block_idx, add_idx, relu_idx));
        }
    }
    None
}

/// Removes `scale` ops that compute the identity (`scale == 1`, `bias == 0`) by pointing
/// their consumers at the op's input.
#[derive(Debug, Default, Clone, Copy)]
pub struct EliminateIdentityScale;

impl EliminateIdentityScale {
    const NAME: &'static str = "eliminate_identity_scale";
}

impl OptimizePass for EliminateIdentityScale {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn run(&self, program: &mut ProgramDesc) -> PassResult {
        let mut result = PassResult::default();
        while let Some((block, idx, input, output)) = find_identity_scale(program) {
            tracing::trace!(block, idx, %input, %output, "eliminating identity scale");
            let ops = program.blocks_mut()[block].ops_mut();
            ops.remove(idx);
            for consumer in ops[idx..].iter_mut() {
                consumer.rename_input(&output, &input);
            }
            result.changed = true;
            result.rewrites_applied += 1;
            result.erased_ops += 1;
        }
        result
    }
}

fn float_attr(op: &OpDesc, name: &str, default: f32) -> Option<f32> {
    match op.attr(name) {
        Some(attr) => f32::from_attribute(attr),
        None => Some(default),
    }
}

fn is_identity_scale(op: &OpDesc) -> bool {
    op.op_type() == "scale"
        && float_attr(op, "scale", 1.0) == Some(1.0)
        && float_attr(op, "bias", 0.0) == Some(0.0)
}

fn find_identity_scale(program: &ProgramDesc) -> Option<(usize, usize, String, String)> {
    let pinned = pinned_names(program);
    for (block_idx, block) in program.blocks().iter().enumerate() {
        let ops = block.ops();
        for (idx, op) in ops.iter().enumerate() {
            if !is_identity_scale(op) {
                continue;
            }
            let (Some(input), Some(output)) = (single(op.input("X")), single(op.output("Out")))
            else {
                continue;
            };
            if input == output || pinned.contains(output) || writer_count(program, output) != 1 {
                continue;
            }
            let later = &ops[idx + 1..];
            let local_reads = later
                .iter()
                .flat_map(|op| op.input_arguments())
                .filter(|arg| *arg == output)
                .count();
            // Every read must happen later in this block, and there must be at least one.
            if local_reads == 0 || local_reads != read_count(program, output) {
                continue;
            }
            let input_rewritten = later
                .iter()
                .flat_map(|op| op.output_arguments())
                .any(|arg| arg == input);
            if input_rewritten {
                continue;
            }
            return Some((block_idx, idx, input.to_string(), output.to_string()));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{Attribute, BlockDesc, BlockId, VarDesc};
    use crate::optimizer::optimize;

    fn binary(op_type: &str, x: &str, y: &str, out: &str) -> OpDesc {
        OpDesc::new(op_type)
            .with_input("X", [x])
            .with_input("Y", [y])
            .with_output("Out", [out])
    }

    fn unary(op_type: &str, x: &str, out: &str) -> OpDesc {
        OpDesc::new(op_type)
            .with_input("X", [x])
            .with_output("Out", [out])
    }

    fn main_block(ops: Vec<OpDesc>) -> ProgramDesc {
        ProgramDesc::new(vec![BlockDesc::new(BlockId::MAIN, None).with_ops(ops)])
    }

    #[test]
    fn fuses_private_add_relu_pair() {
        let mut program = main_block(vec![
            binary("elementwise_add", "a", "b", "t").with_attr("axis", 1i64),
            unary("sigmoid", "a", "s"),
            unary("relu", "t", "out"),
        ]);
        let result = FuseElementwiseAddRelu.run(&mut program);
        assert_eq!(result.rewrites_applied, 1);

        let ops = program.blocks()[0].ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].op_type(), "sigmoid");
        assert_eq!(ops[1].op_type(), FuseElementwiseAddRelu::FUSED_TYPE);
        assert_eq!(ops[1].input("X"), ["a"]);
        assert_eq!(ops[1].output("Out"), ["out"]);
        assert_eq!(ops[1].attr("axis"), Some(&Attribute::Int(1)));
    }

    #[test]
    fn keeps_add_whose_output_is_shared() {
        let mut program = main_block(vec![
            binary("elementwise_add", "a", "b", "t"),
            unary("relu", "t", "out"),
            unary("tanh", "t", "other"),
        ]);
        assert!(!FuseElementwiseAddRelu.run(&mut program).changed);

        let persisted = ProgramDesc::new(vec![BlockDesc::new(BlockId::MAIN, None)
            .with_vars(vec![VarDesc::new("t").persistable()])
            .with_ops(vec![
                binary("elementwise_add", "a", "b", "t"),
                unary("relu", "t", "out"),
            ])]);
        let mut rewritten = persisted.clone();
        assert!(!FuseElementwiseAddRelu.run(&mut rewritten).changed);
        assert_eq!(rewritten, persisted);
    }

    #[test]
    fn does_not_fuse_across_input_overwrite() {
        let mut program = main_block(vec![
            binary("elementwise_add", "a", "b", "t"),
            unary("sigmoid", "b", "a"),
            unary("relu", "t", "out"),
        ]);
        assert!(!FuseElementwiseAddRelu.run(&mut program).changed);
    }

    #[test]
    fn removes_identity_scale_and_rewires_consumers() {
        let mut program = main_block(vec![
            unary("scale", "x", "x_scaled")
                .with_attr("scale", 1.0f32)
                .with_attr("bias", 0.0f32),
            unary("relu", "x_scaled", "y"),
            unary("scale", "y", "z").with_attr("scale", 2.0f32),
        ]);
        let result = EliminateIdentityScale.run(&mut program);
        assert_eq!(result.erased_ops, 1);

        let ops = program.blocks()[0].ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].input("X"), ["x"]);
        assert_eq!(ops[1].op_type(), "scale");
    }

    #[test]
    fn keeps_identity_scale_whose_output_is_unread() {
        let program = main_block(vec![unary("scale", "x", "y")]);
        let mut rewritten = program.clone();
        assert!(!EliminateIdentityScale.run(&mut rewritten).changed);
        assert_eq!(rewritten, program);
    }

    #[test]
    fn default_pipeline_composes() {
        let program = main_block(vec![
            unary("scale", "x", "xs"),
            binary("elementwise_add", "xs", "b", "t"),
            unary("relu", "t", "out"),
        ]);
        let optimized = optimize(&program);
        let ops = optimized.blocks()[0].ops();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].op_type(), FuseElementwiseAddRelu::FUSED_TYPE);
        assert_eq!(ops[0].input("X"), ["x"]);
        // The origin program is left untouched.
        assert_eq!(program.blocks()[0].ops().len(), 3);
    }
}
