use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use anyhow::Result;
use mgraph_rs::error::Error;
use mgraph_rs::exec::{Executor, ExecutorConfig, ProgramVariant};
use mgraph_rs::io::{self, TensorArchive};
use mgraph_rs::ops::{Operator, OperatorBase, OperatorRegistry};
use mgraph_rs::scope::Scope;
use mgraph_rs::tensor::{DType, Tensor};

const MODEL: &str = r#"{
    "blocks": [{
        "idx": 0,
        "vars": [
            {"name": "w", "persistable": true, "dtype": "f32", "dims": [3]},
            {"name": "x"},
            {"name": "y"}
        ],
        "ops": [
            {"type": "assign", "inputs": {"X": ["w"]}, "outputs": {"Out": ["y"]}}
        ]
    }]
}"#;

/// Binds its output to the input's storage.
struct Assign {
    base: OperatorBase,
}

impl Operator for Assign {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn run(&self, scope: &mut Scope<'_>) -> mgraph_rs::Result<()> {
        let x = scope.tensor(self.base.input("X")?)?.clone();
        scope.share_tensor(self.base.output("Out")?, &x)
    }
}

fn build_assign(base: OperatorBase, _scope: &Scope<'_>) -> mgraph_rs::Result<Box<dyn Operator>> {
    base.input("X")?;
    base.output("Out")?;
    Ok(Box::new(Assign { base }))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn registry() -> Arc<OperatorRegistry> {
    let mut registry = OperatorRegistry::new();
    registry.register("assign", build_assign);
    Arc::new(registry)
}

#[test]
fn loads_model_and_params_from_disk() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let model_path = dir.path().join("model.json");
    let params_path = dir.path().join("params.bin");
    fs::write(&model_path, MODEL)?;
    let params = BTreeMap::from([(
        "w".to_string(),
        Tensor::from_vec([3], vec![0.25f32, 0.5, 0.75])?,
    )]);
    TensorArchive::save(&params_path, &params)?;

    let program = io::load(&model_path, &params_path)?;
    assert_eq!(program.origin().num_blocks(), 1);

    let config = ExecutorConfig::default().with_variant(ProgramVariant::Optimized);
    let mut exec = Executor::with_registry(program, config, registry())?;
    exec.run()?;
    let y = exec.fetch("y")?;
    assert_eq!(y.to_vec::<f32>()?, vec![0.25, 0.5, 0.75]);
    assert!(y.shares_storage_with(exec.scope().tensor("w")?));
    Ok(())
}

#[test]
fn missing_parameter_is_a_load_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model_path = dir.path().join("model.json");
    let params_path = dir.path().join("params.bin");
    fs::write(&model_path, MODEL)?;
    let params = BTreeMap::from([("other".to_string(), Tensor::ones([1], DType::F32))]);
    TensorArchive::save_v1(&params_path, &params)?;

    let err = io::load(&model_path, &params_path).unwrap_err();
    assert!(format!("{err:#}").contains("persistable variable 'w'"));
    Ok(())
}

#[test]
fn model_only_load_leaves_params_unbound() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let model_path = dir.path().join("model.json");
    fs::write(&model_path, MODEL)?;

    let program = io::load_model(&model_path)?;
    let mut exec = Executor::with_registry(program, ExecutorConfig::default(), registry())?;
    let err = exec.run().unwrap_err();
    assert!(matches!(err.root(), Error::UninitializedVariable(name) if name == "w"));

    exec.feed("w", &Tensor::ones([3], DType::F32))?;
    exec.run()?;
    assert_eq!(exec.fetch("y")?.to_vec::<f32>()?, vec![1.0; 3]);
    Ok(())
}

#[test]
fn malformed_model_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let model_path = dir.path().join("model.json");
    fs::write(
        &model_path,
        r#"{"blocks": [{"idx": 0, "ops": []}, {"idx": 1, "parent_idx": 7}]}"#,
    )?;
    let err = io::load_model(&model_path).unwrap_err();
    assert!(format!("{err:#}").contains("invalid parent"));
    Ok(())
}
