use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::desc::{ProgramDesc, VarDesc};
use crate::exec::Program;
use crate::optimizer;
use crate::scope::Scope;
use crate::tensor::Tensor;

use super::tensor_archive::TensorArchive;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderOptions {
    /// Also derive the optimized variant of the program.
    #[serde(default = "default_optimize")]
    pub optimize: bool,
}

fn default_optimize() -> bool {
    true
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            optimize: default_optimize(),
        }
    }
}

/// Turns model and parameter files into a [`Program`] with its own root scope.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    options: LoaderOptions,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: LoaderOptions) -> Self {
        Loader { options }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Loads the JSON program at `model` and the parameter archive at `params`.
    pub fn load(&self, model: impl AsRef<Path>, params: impl AsRef<Path>) -> Result<Program> {
        let desc = read_program(model.as_ref())?;
        let params_path = params.as_ref();
        let tensors = TensorArchive::load(params_path)
            .with_context(|| format!("failed to load parameters {}", params_path.display()))?;
        self.build(desc, tensors)
    }

    /// Loads a program that has no parameter file. Persistable variables, if any, must be
    /// fed before the program runs.
    pub fn load_model(&self, model: impl AsRef<Path>) -> Result<Program> {
        let desc = read_program(model.as_ref())?;
        let pending = persistable_vars(&desc).count();
        if pending > 0 {
            tracing::warn!(
                pending,
                "program declares persistable variables but no parameters were given"
            );
        }
        self.assemble(desc, Scope::new())
    }

    /// Builds a program from an in-memory descriptor and its parameter tensors.
    ///
    /// Every persistable variable of the main block must be present in `params`; extra
    /// tensors are ignored.
    pub fn build(
        &self,
        desc: ProgramDesc,
        mut params: BTreeMap<String, Tensor>,
    ) -> Result<Program> {
        desc.validate()?;
        let mut scope = Scope::new();
        let mut bound = 0usize;
        for var in persistable_vars(&desc) {
            let Some(tensor) = params.remove(&var.name) else {
                bail!("persistable variable '{}' missing from parameters", var.name);
            };
            check_declared(var, &tensor)?;
            scope.share_tensor(&var.name, &tensor)?;
            bound += 1;
        }
        if !params.is_empty() {
            tracing::debug!(
                unused = params.len(),
                "parameters without a persistable variable ignored"
            );
        }
        tracing::debug!(bound, "parameters bound");
        self.assemble(desc, scope)
    }

    fn assemble(&self, desc: ProgramDesc, scope: Scope<'static>) -> Result<Program> {
        let optimized = self.options.optimize.then(|| optimizer::optimize(&desc));
        let mut program = Program::new(desc).with_scope(scope);
        if let Some(optimized) = optimized {
            program = program.with_optimized(optimized);
        }
        tracing::info!(
            blocks = program.origin().num_blocks(),
            params = program.scope().len(),
            optimized = program.optimized().is_some(),
            "program loaded"
        );
        Ok(program)
    }
}

/// Loads `model` and `params` with default options.
pub fn load(model: impl AsRef<Path>, params: impl AsRef<Path>) -> Result<Program> {
    Loader::new().load(model, params)
}

/// Loads `model` alone with default options.
pub fn load_model(model: impl AsRef<Path>) -> Result<Program> {
    Loader::new().load_model(model)
}

fn read_program(path: &Path) -> Result<ProgramDesc> {
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read model {}", path.display()))?;
    ProgramDesc::from_json_slice(&bytes)
        .with_context(|| format!("failed to parse model {}", path.display()))
}

fn persistable_vars(desc: &ProgramDesc) -> impl Iterator<Item = &VarDesc> {
    desc.blocks()
        .first()
        .into_iter()
        .flat_map(|block| block.vars())
        .filter(|var| var.persistable)
}

/// Checks a parameter against its declaration. A negative declared dim matches any size.
fn check_declared(var: &VarDesc, tensor: &Tensor) -> Result<()> {
    if let Some(dtype) = var.dtype {
        ensure!(
            dtype == tensor.dtype(),
            "parameter '{}' declared as {:?} but stored as {:?}",
            var.name,
            dtype,
            tensor.dtype()
        );
    }
    if !var.dims.is_empty() {
        let matches = var.dims.len() == tensor.dims().len()
            && var
                .dims
                .iter()
                .zip(tensor.dims())
                .all(|(&declared, &actual)| declared < 0 || declared as usize == actual);
        ensure!(
            matches,
            "parameter '{}' declared with dims {:?} but stored with {:?}",
            var.name,
            var.dims,
            tensor.dims()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::desc::{BlockDesc, BlockId};
    use crate::exec::ProgramVariant;
    use crate::tensor::DType;

    fn desc_with_param(dims: Vec<i64>) -> ProgramDesc {
        ProgramDesc::new(vec![BlockDesc::new(BlockId::MAIN, None).with_vars(vec![
            VarDesc {
                dtype: Some(DType::F32),
                dims,
                ..VarDesc::new("w").persistable()
            },
            VarDesc::new("x"),
        ])])
    }

    #[test]
    fn binds_persistable_vars_into_root_scope() {
        let params = BTreeMap::from([
            ("w".to_string(), Tensor::ones([3], DType::F32)),
            ("stale".to_string(), Tensor::ones([1], DType::F32)),
        ]);
        let program = Loader::new().build(desc_with_param(vec![-1]), params).unwrap();
        assert_eq!(program.scope().local_var_names(), vec!["w"]);
        assert!(program.optimized().is_some());
    }

    #[test]
    fn missing_or_mismatched_params_fail() {
        let err = Loader::new()
            .build(desc_with_param(vec![3]), BTreeMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("'w' missing"));

        let params = BTreeMap::from([("w".to_string(), Tensor::ones([2], DType::F32))]);
        let err = Loader::new()
            .build(desc_with_param(vec![3]), params)
            .unwrap_err();
        assert!(err.to_string().contains("declared with dims"));
    }

    #[test]
    fn optimize_can_be_disabled() {
        let loader = Loader::with_options(LoaderOptions { optimize: false });
        let program = loader
            .build(
                desc_with_param(vec![]),
                BTreeMap::from([("w".to_string(), Tensor::ones([1], DType::F32))]),
            )
            .unwrap();
        assert!(program.optimized().is_none());
        assert!(Arc::ptr_eq(
            program.desc(ProgramVariant::Optimized),
            program.origin()
        ));
    }
}
