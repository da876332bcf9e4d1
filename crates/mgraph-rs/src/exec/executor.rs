//! Block runner.
//!
//! The executor owns the root scope of a loaded program and an arena of instantiated
//! operator lists indexed by [`BlockId`]. Running a block walks its list in declaration
//! order, sequentially, stopping at the first failure.

use std::sync::Arc;

use crate::desc::{BlockId, OpDesc, ProgramDesc};
use crate::error::{Error, Result};
use crate::ops::{OperatorRegistry, PreparedOp};
use crate::scope::Scope;
use crate::tensor::Tensor;

use super::config::{ExecutorConfig, Instantiation, ProgramVariant};
use super::program::Program;

/// Instantiated operators of one block, each tagged with its declaration index.
#[derive(Debug, Default)]
struct BlockPlan {
    ops: Vec<(usize, PreparedOp)>,
}

pub struct Executor {
    desc: Arc<ProgramDesc>,
    variant: ProgramVariant,
    registry: Arc<OperatorRegistry>,
    scope: Scope<'static>,
    plans: Vec<Option<BlockPlan>>,
}

impl Executor {
    /// Creates an executor over `program` using the builtin operator registry.
    /// `MGRAPH_OPTIMIZE` and `MGRAPH_LAZY` override `config` when set.
    pub fn new(program: Program, config: ExecutorConfig) -> Result<Self> {
        Self::with_registry(
            program,
            config.with_env_overrides(),
            OperatorRegistry::builtin(),
        )
    }

    /// Creates an executor with an explicit registry; `config` is used as given.
    pub fn with_registry(
        program: Program,
        config: ExecutorConfig,
        registry: Arc<OperatorRegistry>,
    ) -> Result<Self> {
        let (variant, desc) = program.resolve(config.variant);
        let desc = Arc::clone(desc);
        let block_count = desc.num_blocks();
        let mut executor = Executor {
            desc,
            variant,
            registry,
            scope: program.into_scope(),
            plans: (0..block_count).map(|_| None).collect(),
        };
        tracing::info!(
            variant = ?variant,
            blocks = block_count,
            instantiate = ?config.instantiate,
            "executor created"
        );
        if config.instantiate == Instantiation::Eager {
            for block in 0..block_count {
                executor.prepare_block(BlockId(block))?;
            }
        }
        Ok(executor)
    }

    pub fn program(&self) -> &ProgramDesc {
        &self.desc
    }

    pub fn variant(&self) -> ProgramVariant {
        self.variant
    }

    pub fn scope(&self) -> &Scope<'static> {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope<'static> {
        &mut self.scope
    }

    /// Binds `name` in the root scope to the storage of `tensor`; no data is copied.
    pub fn feed(&mut self, name: &str, tensor: &Tensor) -> Result<()> {
        tracing::trace!(name, dims = ?tensor.dims(), "feed");
        self.scope.share_tensor(name, tensor)
    }

    /// Returns a handle sharing the storage of the tensor variable `name`.
    pub fn fetch(&self, name: &str) -> Result<Tensor> {
        self.scope.tensor(name).cloned()
    }

    /// Runs the main block.
    pub fn run(&mut self) -> Result<()> {
        self.run_block(BlockId::MAIN)
    }

    /// Runs every operator of `block` once, in declaration order.
    ///
    /// The block is instantiated first if no plan is cached for it, so descriptor errors
    /// surface before any operator of the block executes. A failing operator aborts the
    /// block; outputs written by earlier operators stay in the scope.
    pub fn run_block(&mut self, block: BlockId) -> Result<()> {
        self.prepare_block(block)?;
        let plan = self.plans[block.0]
            .as_mut()
            .ok_or(Error::UnknownBlock(block.0))?;
        for (op_index, op) in plan.ops.iter_mut() {
            tracing::trace!(block = block.0, op_index = *op_index, op_type = op.op_type(), "run");
            if let Err(err) = op.run(&mut self.scope) {
                tracing::warn!(
                    block = block.0,
                    op_index = *op_index,
                    op_type = op.op_type(),
                    error = %err,
                    "operator failed"
                );
                return Err(err.at_operator(block.0, *op_index, op.op_type()));
            }
        }
        Ok(())
    }

    /// Instantiates every operator of `block` unless a plan is already cached.
    pub fn prepare_block(&mut self, block: BlockId) -> Result<()> {
        self.check_block(block)?;
        if self.plans[block.0].is_none() {
            let plan = self.instantiate(block, |_| true)?;
            self.plans[block.0] = Some(plan);
        }
        Ok(())
    }

    /// Replaces the plan of `block` with the operators whose descriptor satisfies
    /// `select`, preserving their relative order. Returns how many were selected.
    pub fn select_ops<F>(&mut self, block: BlockId, select: F) -> Result<usize>
    where
        F: Fn(&OpDesc) -> bool,
    {
        self.check_block(block)?;
        let plan = self.instantiate(block, select)?;
        let selected = plan.ops.len();
        self.plans[block.0] = Some(plan);
        Ok(selected)
    }

    /// Instantiated operators of `block`, if a plan has been built.
    pub fn block_ops(&self, block: BlockId) -> Option<impl Iterator<Item = &PreparedOp>> {
        self.plans
            .get(block.0)
            .and_then(Option::as_ref)
            .map(|plan| plan.ops.iter().map(|(_, op)| op))
    }

    fn check_block(&self, block: BlockId) -> Result<()> {
        if block.0 < self.plans.len() {
            Ok(())
        } else {
            Err(Error::UnknownBlock(block.0))
        }
    }

    fn instantiate<F>(&self, block: BlockId, select: F) -> Result<BlockPlan>
    where
        F: Fn(&OpDesc) -> bool,
    {
        let block_desc = self.desc.block(block)?;
        let mut plan = BlockPlan::default();
        for (op_index, op_desc) in block_desc.ops().iter().enumerate() {
            if !select(op_desc) {
                continue;
            }
            let op = self
                .registry
                .create_from_desc(op_desc, &self.scope)
                .map(PreparedOp::new)
                .and_then(|mut op| op.prepare(&self.scope).map(|()| op))
                .map_err(|err| err.at_operator(block.0, op_index, op_desc.op_type()))?;
            plan.ops.push((op_index, op));
        }
        tracing::debug!(block = block.0, ops = plan.ops.len(), "block instantiated");
        Ok(plan)
    }
}
