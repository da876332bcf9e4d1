use std::any::{type_name, Any};
use std::fmt;

use crate::error::{Error, Result};

/// Named, type-erased holder living in a [`Scope`](super::Scope).
///
/// A variable starts empty and takes the type of the first value stored in it. Asking for
/// a different type afterwards is an [`Error::VariableTypeMismatch`], never a conversion.
pub struct Variable {
    name: String,
    holder: Option<Box<dyn Any + Send + Sync>>,
    type_name: &'static str,
}

impl Variable {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            holder: None,
            type_name: "<empty>",
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reports whether any value has been stored.
    pub fn is_initialized(&self) -> bool {
        self.holder.is_some()
    }

    /// Type name of the held value, or `"<empty>"`.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_type<T: Any>(&self) -> bool {
        self.holder.as_ref().is_some_and(|h| h.is::<T>())
    }

    /// Borrows the held value as `T`.
    pub fn get<T: Any>(&self) -> Result<&T> {
        let holder = self
            .holder
            .as_ref()
            .ok_or_else(|| Error::UninitializedVariable(self.name.clone()))?;
        holder
            .downcast_ref::<T>()
            .ok_or_else(|| self.type_mismatch::<T>())
    }

    /// Mutably borrows the held value as `T`, creating `T::default()` when empty.
    pub fn get_mutable<T: Any + Send + Sync + Default>(&mut self) -> Result<&mut T> {
        if self.holder.is_none() {
            self.holder = Some(Box::new(T::default()));
            self.type_name = type_name::<T>();
        }
        if !self.is_type::<T>() {
            return Err(self.type_mismatch::<T>());
        }
        let name = &self.name;
        self.holder
            .as_mut()
            .and_then(|h| h.downcast_mut::<T>())
            .ok_or_else(|| Error::UninitializedVariable(name.clone()))
    }

    /// Replaces the held value, whatever its previous type.
    pub fn set<T: Any + Send + Sync>(&mut self, value: T) {
        self.holder = Some(Box::new(value));
        self.type_name = type_name::<T>();
    }

    fn type_mismatch<T: Any>(&self) -> Error {
        Error::VariableTypeMismatch {
            name: self.name.clone(),
            held: self.type_name,
            requested: type_name::<T>(),
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("name", &self.name)
            .field("type", &self.type_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{Tensor, TensorList};

    #[test]
    fn get_mutable_creates_default_then_locks_type() {
        let mut var = Variable::new("feed");
        assert!(!var.is_initialized());
        var.get_mutable::<TensorList>().unwrap().push(Tensor::empty());
        assert!(var.is_type::<TensorList>());
        assert_eq!(var.get::<TensorList>().unwrap().len(), 1);

        let err = var.get_mutable::<Tensor>().unwrap_err();
        assert!(matches!(err, Error::VariableTypeMismatch { .. }));
    }

    #[test]
    fn get_on_empty_variable_is_uninitialized() {
        let var = Variable::new("x");
        assert!(matches!(
            var.get::<Tensor>(),
            Err(Error::UninitializedVariable(name)) if name == "x"
        ));
    }

    #[test]
    fn set_reassigns_payload_type() {
        let mut var = Variable::new("step");
        var.set(3i64);
        assert_eq!(*var.get::<i64>().unwrap(), 3);
        var.set(Tensor::empty());
        assert!(var.is_type::<Tensor>());
    }
}
