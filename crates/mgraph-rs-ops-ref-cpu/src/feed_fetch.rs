//! Column transfer between tensor-list variables and tensor variables.
//!
//! `feed` binds column `col` of the list variable `X` to the tensor variable `Out`;
//! `fetch` stores the tensor variable `X` into column `col` of the list variable `Out`,
//! growing the list as needed. Both alias storage instead of copying.

use mgraph_rs::error::{Error, Result};
use mgraph_rs::ops::{Operator, OperatorBase, OperatorDef};
use mgraph_rs::scope::Scope;
use mgraph_rs::tensor::{Tensor, TensorList};

use crate::read_input;

/// Largest accepted column index; `fetch` grows its list up to `col + 1` entries.
pub const MAX_COLUMN: usize = u16::MAX as usize;

fn column(base: &OperatorBase) -> Result<usize> {
    let col = base.attr::<i64>("col")?;
    match usize::try_from(col) {
        Ok(col) if col <= MAX_COLUMN => Ok(col),
        _ => Err(Error::invalid_attribute(
            base.op_type(),
            "col",
            format!("must be in 0..={MAX_COLUMN}, got {col}"),
        )),
    }
}

#[derive(Debug)]
pub struct FeedOp {
    base: OperatorBase,
    col: usize,
    x: String,
    out: String,
}

impl Operator for FeedOp {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn run(&self, scope: &mut Scope<'_>) -> Result<()> {
        let column = scope
            .find_var(&self.x)
            .ok_or_else(|| Error::UninitializedVariable(self.x.clone()))?
            .get::<TensorList>()?
            .get(self.col)
            .filter(|tensor| tensor.is_initialized())
            .cloned()
            .ok_or_else(|| Error::UninitializedVariable(format!("{}[{}]", self.x, self.col)))?;
        scope.share_tensor(&self.out, &column)
    }
}

fn build_feed(base: OperatorBase, _scope: &Scope<'_>) -> Result<Box<dyn Operator>> {
    let col = column(&base)?;
    let x = base.input("X")?.to_string();
    let out = base.output("Out")?.to_string();
    Ok(Box::new(FeedOp { base, col, x, out }))
}

#[derive(Debug)]
pub struct FetchOp {
    base: OperatorBase,
    col: usize,
    x: String,
    out: String,
}

impl Operator for FetchOp {
    fn base(&self) -> &OperatorBase {
        &self.base
    }

    fn run(&self, scope: &mut Scope<'_>) -> Result<()> {
        let tensor = read_input(scope, &self.x)?;
        let list = scope.var(&self.out).get_mutable::<TensorList>()?;
        if list.len() <= self.col {
            list.resize_with(self.col + 1, Tensor::empty);
        }
        list[self.col] = tensor;
        Ok(())
    }
}

fn build_fetch(base: OperatorBase, _scope: &Scope<'_>) -> Result<Box<dyn Operator>> {
    let col = column(&base)?;
    let x = base.input("X")?.to_string();
    let out = base.output("Out")?.to_string();
    Ok(Box::new(FetchOp { base, col, x, out }))
}

#[mgraph_rs::linkme::distributed_slice(mgraph_rs::ops::OPERATOR_DEFS)]
static FEED: OperatorDef = OperatorDef {
    op_type: "feed",
    module_path: module_path!(),
    build: build_feed,
};

#[mgraph_rs::linkme::distributed_slice(mgraph_rs::ops::OPERATOR_DEFS)]
static FETCH: OperatorDef = OperatorDef {
    op_type: "fetch",
    module_path: module_path!(),
    build: build_fetch,
};
