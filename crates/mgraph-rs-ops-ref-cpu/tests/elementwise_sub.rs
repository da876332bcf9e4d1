use std::collections::BTreeMap;
use std::fs;

use anyhow::Result;
use mgraph_rs::exec::{Executor, ExecutorConfig, Instantiation, ProgramVariant};
use mgraph_rs::io::{self, TensorArchive};
use mgraph_rs::tensor::{DType, Tensor};
use mgraph_rs::BlockId;
use mgraph_rs_ops_ref_cpu::builtin_registry;

const MODEL: &str = r#"{
    "blocks": [{
        "idx": 0,
        "vars": [{"name": "fc_w", "persistable": true, "dtype": "f32", "dims": [1, 1, 6, 6]}],
        "ops": [
            {"type": "sigmoid", "inputs": {"X": ["image"]}, "outputs": {"Out": ["sigmoid_1.tmp_0"]}},
            {"type": "elementwise_mul", "inputs": {"X": ["image"], "Y": ["fc_w"]},
             "outputs": {"Out": ["tmp_0"]}, "attrs": {"axis": {"kind": "int", "value": -1}}},
            {"type": "elementwise_sub", "inputs": {"X": ["tmp_0"], "Y": ["sigmoid_1.tmp_0"]},
             "outputs": {"Out": ["tmp_1"]}, "attrs": {"axis": {"kind": "int", "value": -1}}},
            {"type": "relu", "inputs": {"X": ["tmp_1"]}, "outputs": {"Out": ["out"]}}
        ]
    }]
}"#;

fn write_model(dir: &std::path::Path) -> Result<(std::path::PathBuf, std::path::PathBuf)> {
    let model = dir.join("model.json");
    let params = dir.join("params.bin");
    fs::write(&model, MODEL)?;
    let weights = BTreeMap::from([("fc_w".to_string(), Tensor::ones([1, 1, 6, 6], DType::F32))]);
    TensorArchive::save(&params, &weights)?;
    Ok((model, params))
}

/// Replays every `elementwise_sub` of the model in isolation against fresh inputs.
#[test]
fn replayed_elementwise_sub_yields_half() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (model, params) = write_model(dir.path())?;
    let program = io::load(&model, &params)?;

    let config = ExecutorConfig::default().with_instantiation(Instantiation::Lazy);
    let mut exec = Executor::with_registry(program, config, builtin_registry())?;
    let selected = exec.select_ops(BlockId::MAIN, |op| op.op_type() == "elementwise_sub")?;
    assert_eq!(selected, 1);

    let (x_name, y_name, out_name) = {
        let op = exec
            .block_ops(BlockId::MAIN)
            .and_then(|mut ops| ops.next())
            .expect("selected op");
        let base = op.base();
        (
            base.input("X")?.to_string(),
            base.input("Y")?.to_string(),
            base.output("Out")?.to_string(),
        )
    };
    assert_eq!((x_name.as_str(), y_name.as_str()), ("tmp_0", "sigmoid_1.tmp_0"));

    let x1 = Tensor::ones([1, 1, 6, 6], DType::F32);
    let x2 = Tensor::full([1, 1, 6, 6], DType::F32, 0.5);
    exec.feed(&x_name, &x1)?;
    exec.feed(&y_name, &x2)?;
    exec.run()?;

    let y = exec.fetch(&out_name)?;
    assert_eq!(y.dims(), &[1, 1, 6, 6]);
    assert!(y.to_vec::<f32>()?.iter().all(|&v| v == 0.5));
    // The rest of the block was not selected and never ran.
    assert!(!exec.scope().contains("out"));
    Ok(())
}

#[test]
fn full_model_runs_in_both_variants() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (model, params) = write_model(dir.path())?;
    let image = Tensor::full([1, 1, 6, 6], DType::F32, 2.0);

    let mut results = Vec::new();
    for variant in [ProgramVariant::Origin, ProgramVariant::Optimized] {
        let program = io::load(&model, &params)?;
        let config = ExecutorConfig::default().with_variant(variant);
        let mut exec = Executor::with_registry(program, config, builtin_registry())?;
        exec.feed("image", &image)?;
        exec.run()?;
        results.push(exec.fetch("out")?.to_vec::<f32>()?);
    }
    let expected = 2.0 - 1.0 / (1.0 + (-2.0f64).exp());
    assert!(results[0].iter().all(|&v| (f64::from(v) - expected).abs() < 1e-6));
    assert_eq!(results[0], results[1]);
    Ok(())
}
