//! Variable namespaces.
//!
//! A [`Scope`] maps names to [`Variable`]s. Scopes form an explicit tree: a child borrows its
//! parent and falls back to it for reads, while creation always happens locally. Each
//! loaded program owns its own root scope; nothing here is global.

mod variable;

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::tensor::Tensor;

pub use variable::Variable;

#[derive(Debug, Default)]
pub struct Scope<'p> {
    vars: HashMap<String, Variable>,
    parent: Option<&'p Scope<'p>>,
}

impl Scope<'static> {
    /// Creates a root scope.
    pub fn new() -> Self {
        Scope {
            vars: HashMap::new(),
            parent: None,
        }
    }
}

impl<'p> Scope<'p> {
    /// Creates a child scope whose reads fall back to `self`.
    pub fn new_child(&self) -> Scope<'_> {
        Scope {
            vars: HashMap::new(),
            parent: Some(self),
        }
    }

    pub fn parent(&self) -> Option<&'p Scope<'p>> {
        self.parent
    }

    /// Returns the local variable called `name`, creating it when absent.
    ///
    /// A name always resolves to the same variable for the lifetime of the scope.
    pub fn var(&mut self, name: &str) -> &mut Variable {
        self.vars
            .entry(name.to_string())
            .or_insert_with(|| Variable::new(name))
    }

    /// Looks `name` up locally, then through the parent chain.
    pub fn find_var(&self, name: &str) -> Option<&Variable> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(var) = current.vars.get(name) {
                return Some(var);
            }
            scope = current.parent;
        }
        None
    }

    pub fn find_local_var(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_var(name).is_some()
    }

    /// Names of the variables created in this scope, sorted.
    pub fn local_var_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.vars.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Resolves `name` to a tensor with allocated storage, searching parents.
    pub fn tensor(&self, name: &str) -> Result<&Tensor> {
        let var = self
            .find_var(name)
            .ok_or_else(|| Error::UninitializedVariable(name.to_string()))?;
        let tensor = var.get::<Tensor>()?;
        if !tensor.is_initialized() {
            return Err(Error::UninitializedVariable(name.to_string()));
        }
        Ok(tensor)
    }

    /// Returns the local tensor variable `name`, creating an empty tensor when absent.
    pub fn tensor_mut(&mut self, name: &str) -> Result<&mut Tensor> {
        self.var(name).get_mutable::<Tensor>()
    }

    /// Binds `name` to `tensor` by sharing its storage.
    pub fn share_tensor(&mut self, name: &str, tensor: &Tensor) -> Result<()> {
        self.tensor_mut(name)?.share_data_with(tensor);
        Ok(())
    }
}
