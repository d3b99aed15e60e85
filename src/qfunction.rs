//! Pointwise functions evaluated at quadrature points.
//!
//! A [`QFunction`] wraps a user closure together with the fields it reads and
//! writes. The closure receives the number of quadrature points `q`, one input
//! slice per declared input and one output slice per declared output; a field
//! of size `s` spans `s * q` scalars, component-major (`[c * q + i]`).
//!
//! The library never looks inside the closure. It only checks that the slices
//! it hands over match the declared fields.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::basis::EvalMode;
use crate::context::Context;
use crate::error::{FemError, Result};
use crate::memory::Scalar;

/// Signature of the user closure.
pub type QFunctionUser = dyn Fn(usize, &[&[Scalar]], &mut [&mut [Scalar]]) -> Result<()> + Send + Sync;

/// A named field of a [`QFunction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QFunctionField {
    /// Field name, for diagnostics.
    pub name: String,
    /// Scalars per quadrature point.
    pub size: usize,
    /// How the operator produces (input) or consumes (output) the field.
    pub mode: EvalMode,
}

/// A pointwise function with declared fields. Cloning shares the closure.
#[derive(Clone)]
pub struct QFunction {
    ctx: Context,
    user: Arc<QFunctionUser>,
    inputs: Vec<QFunctionField>,
    outputs: Vec<QFunctionField>,
}

impl QFunction {
    pub(crate) fn new<F>(ctx: &Context, user: F) -> Self
    where
        F: Fn(usize, &[&[Scalar]], &mut [&mut [Scalar]]) -> Result<()> + Send + Sync + 'static,
    {
        debug!("created qfunction");
        Self { ctx: ctx.clone(), user: Arc::new(user), inputs: Vec::new(), outputs: Vec::new() }
    }

    fn field(name: &str, size: usize, mode: EvalMode) -> Result<QFunctionField> {
        if size == 0 {
            return Err(FemError::invalid(format!("qfunction field '{name}' has size 0")));
        }
        Ok(QFunctionField { name: name.to_owned(), size, mode })
    }

    /// Declares the next input field.
    pub fn add_input(&mut self, name: &str, size: usize, mode: EvalMode) -> Result<()> {
        let field = self.ctx.check("QFunction::add_input", Self::field(name, size, mode))?;
        self.inputs.push(field);
        Ok(())
    }

    /// Declares the next output field.
    pub fn add_output(&mut self, name: &str, size: usize, mode: EvalMode) -> Result<()> {
        let field = self.ctx.check("QFunction::add_output", Self::field(name, size, mode))?;
        self.outputs.push(field);
        Ok(())
    }

    /// The context this qfunction was created in.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Declared inputs, in order.
    pub fn inputs(&self) -> &[QFunctionField] {
        &self.inputs
    }

    /// Declared outputs, in order.
    pub fn outputs(&self) -> &[QFunctionField] {
        &self.outputs
    }

    /// Evaluates the closure at `q` points.
    pub fn apply(&self, q: usize, inputs: &[&[Scalar]], outputs: &mut [&mut [Scalar]]) -> Result<()> {
        let result = self.call(q, inputs, outputs);
        self.ctx.check("QFunction::apply", result)
    }

    pub(crate) fn call(&self, q: usize, inputs: &[&[Scalar]], outputs: &mut [&mut [Scalar]]) -> Result<()> {
        FemError::check_len("qfunction input count", self.inputs.len(), inputs.len())?;
        FemError::check_len("qfunction output count", self.outputs.len(), outputs.len())?;
        for (field, data) in self.inputs.iter().zip(inputs) {
            FemError::check_len("qfunction input length", field.size * q, data.len())?;
        }
        for (field, data) in self.outputs.iter().zip(outputs.iter()) {
            FemError::check_len("qfunction output length", field.size * q, data.len())?;
        }
        (self.user)(q, inputs, outputs)
    }
}

impl fmt::Debug for QFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QFunction")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorHandler;

    fn scale() -> QFunction {
        let ctx = Context::init("/cpu/self").unwrap();
        ctx.set_error_handler(ErrorHandler::Return);
        let mut qf = ctx.q_function_interior(|q, inputs, outputs| {
            for i in 0..q {
                outputs[0][i] = 2.0 * inputs[0][i];
            }
            Ok(())
        });
        qf.add_input("u", 1, EvalMode::Interp).unwrap();
        qf.add_output("v", 1, EvalMode::Interp).unwrap();
        qf
    }

    #[test]
    fn apply_runs_the_closure() {
        let qf = scale();
        let mut out = [0.0; 3];
        qf.apply(3, &[&[1.0, 2.0, 3.0]], &mut [&mut out]).unwrap();
        assert_eq!(out, [2.0, 4.0, 6.0]);
    }

    #[test]
    fn arity_and_lengths_are_checked() {
        let qf = scale();
        let mut out = [0.0; 2];
        assert!(qf.apply(2, &[], &mut [&mut out]).is_err());
        assert!(qf.apply(3, &[&[1.0, 2.0, 3.0]], &mut [&mut out]).is_err());
    }

    #[test]
    fn closure_errors_propagate() {
        let ctx = Context::init("/cpu/self").unwrap();
        ctx.set_error_handler(ErrorHandler::Return);
        let qf = ctx.q_function_interior(|_, _, _| Err(FemError::qfunction("negative jacobian")));
        let err = qf.apply(1, &[], &mut []).unwrap_err();
        assert!(matches!(err, FemError::QFunction(_)));
    }

    #[test]
    fn zero_sized_fields_are_rejected() {
        let ctx = Context::init("/cpu/self").unwrap();
        ctx.set_error_handler(ErrorHandler::Return);
        let mut qf = ctx.q_function_interior(|_, _, _| Ok(()));
        assert!(qf.add_input("empty", 0, EvalMode::None).is_err());
        assert!(qf.inputs().is_empty());
    }
}
