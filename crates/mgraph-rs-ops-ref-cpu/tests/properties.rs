use std::collections::BTreeMap;

use mgraph_rs::desc::{BlockDesc, BlockId, OpDesc, ProgramDesc, VarDesc};
use mgraph_rs::exec::{Executor, ExecutorConfig, ProgramVariant};
use mgraph_rs::io::Loader;
use mgraph_rs::tensor::{DType, Tensor};
use mgraph_rs_ops_ref_cpu::builtin_registry;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// `out = relu((scale(x, 1, 0) + bias)) * 0.5 - sigmoid(x)`, built so that both default
/// optimizer passes fire.
fn model() -> ProgramDesc {
    let op = |op_type: &str, inputs: &[(&str, &str)], out: &str| {
        inputs
            .iter()
            .fold(OpDesc::new(op_type), |op, (slot, name)| op.with_input(*slot, [*name]))
            .with_output("Out", [out])
    };
    ProgramDesc::new(vec![BlockDesc::new(BlockId::MAIN, None)
        .with_vars(vec![VarDesc {
            dtype: Some(DType::F32),
            ..VarDesc::new("bias").persistable()
        }])
        .with_ops(vec![
            op("scale", &[("X", "x")], "x_id"),
            op("elementwise_add", &[("X", "x_id"), ("Y", "bias")], "sum"),
            op("relu", &[("X", "sum")], "act"),
            op("scale", &[("X", "act")], "half").with_attr("scale", 0.5f32),
            op("sigmoid", &[("X", "x")], "gate"),
            op("elementwise_sub", &[("X", "half"), ("Y", "gate")], "out"),
        ])])
}

fn run_variant(variant: ProgramVariant, x: &Tensor, bias: &Tensor) -> Vec<f32> {
    let params = BTreeMap::from([("bias".to_string(), bias.clone())]);
    let program = Loader::new().build(model(), params).unwrap();
    let config = ExecutorConfig::default().with_variant(variant);
    let mut exec = Executor::with_registry(program, config, builtin_registry()).unwrap();
    exec.feed("x", x).unwrap();
    exec.run().unwrap();
    exec.fetch("out").unwrap().to_vec::<f32>().unwrap()
}

#[test]
fn optimized_variant_is_smaller() {
    let optimized = mgraph_rs::optimizer::optimize(&model());
    let types: Vec<&str> = optimized.blocks()[0]
        .ops()
        .iter()
        .map(|op| op.op_type())
        .collect();
    assert_eq!(
        types,
        vec![
            "fusion_elementwise_add_relu",
            "scale",
            "sigmoid",
            "elementwise_sub"
        ]
    );
}

proptest! {
    #[test]
    fn origin_and_optimized_agree(seed in any::<u64>(), rows in 1usize..4, cols in 1usize..6) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Tensor::rand_uniform([rows, cols], -3.0, 3.0, &mut rng);
        let bias = Tensor::rand_uniform([cols], -1.0, 1.0, &mut rng);

        let origin = run_variant(ProgramVariant::Origin, &x, &bias);
        let optimized = run_variant(ProgramVariant::Optimized, &x, &bias);
        prop_assert_eq!(origin.len(), rows * cols);
        prop_assert_eq!(origin, optimized);
    }

    #[test]
    fn rerunning_is_bit_identical(values in prop::collection::vec(-100.0f32..100.0, 1..32)) {
        let len = values.len();
        let desc = ProgramDesc::new(vec![BlockDesc::new(BlockId::MAIN, None).with_ops(vec![
            OpDesc::new("tanh").with_input("X", ["x"]).with_output("Out", ["t"]),
            OpDesc::new("elementwise_max")
                .with_input("X", ["t"])
                .with_input("Y", ["x"])
                .with_output("Out", ["out"]),
        ])]);
        let program = mgraph_rs::Program::new(desc);
        let mut exec =
            Executor::with_registry(program, ExecutorConfig::default(), builtin_registry())
                .unwrap();
        exec.feed("x", &Tensor::from_vec([len], values).unwrap()).unwrap();

        exec.run().unwrap();
        let first: Vec<u32> = exec.fetch("out").unwrap().to_vec::<f32>().unwrap()
            .iter().map(|v| v.to_bits()).collect();
        exec.run().unwrap();
        let second: Vec<u32> = exec.fetch("out").unwrap().to_vec::<f32>().unwrap()
            .iter().map(|v| v.to_bits()).collect();
        prop_assert_eq!(first, second);
    }
}
