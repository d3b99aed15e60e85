//! Matrix-free operators.
//!
//! An [`Operator`] composes one [`ElemRestriction`], one [`Basis`] and one
//! [`QFunction`]. Applying it runs:
//!
//! 1. restriction gather of the active input into the input E-vector
//! 2. basis evaluation of each input field at the quadrature points
//! 3. the qfunction over every quadrature point of the element
//! 4. basis transpose of each output field, summed per element
//! 5. restriction scatter-add of the output E-vector into the result
//!
//! Steps 2 to 4 are element-local and live in [`ElementKernel`], which every
//! backend's operator implementation shares. Backends differ only in how they
//! schedule elements.
//!
//! # Fields
//!
//! | mode | input source | size |
//! |---|---|---|
//! | `Interp` | active vector | `ncomp` |
//! | `Grad` | active vector | `ncomp * dim` |
//! | `Weight` | quadrature weights | `1` |
//! | `None` | quadrature data from [`Operator::set_qdata`] | any |
//!
//! Outputs are either all `Interp`/`Grad`, projected back and scattered into an
//! L-vector, or all `None`. An operator with `None` outputs writes quadrature
//! data instead: element after element, each block holding the output fields
//! in declaration order. That is exactly the layout [`Operator::set_qdata`]
//! expects, so a setup operator can feed the operator that uses its data.
//!
//! # Diagonal assembly
//!
//! [`Operator::linear_assemble_diagonal`] applies each element kernel to unit
//! vectors and scatter-adds the element diagonals. The qfunction must be linear
//! in its active inputs.

use std::sync::Arc;

use tracing::debug;

use crate::backend::OperatorImpl;
use crate::basis::{Basis, BasisScratch, EvalMode, TensorBasis};
use crate::context::Context;
use crate::error::{FemError, Result};
use crate::memory::{HostRead, Scalar};
use crate::qfunction::{QFunction, QFunctionField};
use crate::request::Request;
use crate::restriction::{ElemRestriction, TransposeMode};
use crate::vector::Vector;

/// The element-local part of an operator: basis, qfunction, basis transpose.
#[derive(Debug)]
pub struct ElementKernel {
    basis: Arc<TensorBasis>,
    qfunction: QFunction,
    nqpts: usize,
    input_block: usize,
    qdata_block: usize,
    output_block: usize,
    active: bool,
    passive_output: bool,
}

/// Per-thread buffers for [`ElementKernel::apply`].
#[derive(Debug)]
pub struct ElementWorkspace {
    scratch: BasisScratch,
    inputs: Vec<Vec<Scalar>>,
    outputs: Vec<Vec<Scalar>>,
    accum: Vec<Scalar>,
}

fn field_len(basis: &TensorBasis, field: &QFunctionField) -> usize {
    field.size * basis.num_qpts()
}

fn check_field(basis: &TensorBasis, field: &QFunctionField, output: bool) -> Result<()> {
    let expected = match field.mode {
        EvalMode::Interp => basis.ncomp(),
        EvalMode::Grad => basis.ncomp() * basis.dim(),
        EvalMode::Weight if !output => 1,
        EvalMode::None => return Ok(()),
        mode => {
            return Err(FemError::invalid(format!(
                "output field '{}' cannot use {mode:?}",
                field.name
            )));
        }
    };
    if field.size != expected {
        return Err(FemError::invalid(format!(
            "field '{}' in {:?} mode needs size {expected}, got {}",
            field.name, field.mode, field.size
        )));
    }
    Ok(())
}

impl ElementKernel {
    fn new(basis: Arc<TensorBasis>, qfunction: QFunction) -> Result<Self> {
        if qfunction.outputs().is_empty() {
            return Err(FemError::invalid("operator qfunction has no outputs"));
        }
        for field in qfunction.inputs() {
            check_field(&basis, field, false)?;
        }
        for field in qfunction.outputs() {
            check_field(&basis, field, true)?;
        }
        let nqpts = basis.num_qpts();
        let qdata_block = qfunction
            .inputs()
            .iter()
            .filter(|f| f.mode == EvalMode::None)
            .map(|f| f.size * nqpts)
            .sum();
        let active = qfunction.inputs().iter().any(|f| matches!(f.mode, EvalMode::Interp | EvalMode::Grad));
        let passive = qfunction.outputs().iter().filter(|f| f.mode == EvalMode::None).count();
        if passive != 0 && passive != qfunction.outputs().len() {
            return Err(FemError::invalid("operator outputs cannot mix quadrature data with Interp or Grad fields"));
        }
        let passive_output = passive > 0;
        let block = basis.ncomp() * basis.num_nodes();
        let output_block = if passive_output {
            qfunction.outputs().iter().map(|f| f.size * nqpts).sum()
        } else {
            block
        };
        Ok(Self {
            basis,
            qfunction,
            nqpts,
            input_block: if active { block } else { 0 },
            qdata_block,
            output_block,
            active,
            passive_output,
        })
    }

    /// Whether any input reads the active vector.
    pub fn has_active_input(&self) -> bool {
        self.active
    }

    /// Whether the outputs are quadrature data rather than L-vector fields.
    pub fn has_passive_output(&self) -> bool {
        self.passive_output
    }

    /// Input E-vector scalars per element (zero without an active input).
    pub fn input_block(&self) -> usize {
        self.input_block
    }

    /// Quadrature data scalars per element.
    pub fn qdata_block(&self) -> usize {
        self.qdata_block
    }

    /// Output scalars per element: an E-vector block, or the quadrature data
    /// block for passive outputs.
    pub fn output_block(&self) -> usize {
        self.output_block
    }

    /// Fresh buffers for one worker.
    pub fn workspace(&self) -> ElementWorkspace {
        let buffers = |fields: &[QFunctionField]| {
            fields.iter().map(|f| vec![0.0; field_len(&self.basis, f)]).collect()
        };
        ElementWorkspace {
            scratch: BasisScratch::new(&self.basis),
            inputs: buffers(self.qfunction.inputs()),
            outputs: buffers(self.qfunction.outputs()),
            accum: vec![0.0; self.output_block],
        }
    }

    /// Slices element `e` out of the input E-vector and the quadrature data.
    pub fn element_inputs<'a>(
        &self,
        e: usize,
        input: &'a [Scalar],
        qdata: &'a [Scalar],
    ) -> (&'a [Scalar], &'a [Scalar]) {
        (&input[e * self.input_block..(e + 1) * self.input_block], self.element_qdata(e, qdata))
    }

    /// Quadrature data of element `e`.
    pub fn element_qdata<'a>(&self, e: usize, qdata: &'a [Scalar]) -> &'a [Scalar] {
        &qdata[e * self.qdata_block..(e + 1) * self.qdata_block]
    }

    /// Runs steps 2 to 4 for one element, overwriting `output`.
    pub fn apply(
        &self,
        input: &[Scalar],
        qdata: &[Scalar],
        output: &mut [Scalar],
        ws: &mut ElementWorkspace,
    ) -> Result<()> {
        let ElementWorkspace { scratch, inputs, outputs, accum } = ws;
        let mut offset = 0;
        for (field, buf) in self.qfunction.inputs().iter().zip(inputs.iter_mut()) {
            match field.mode {
                EvalMode::None => {
                    let len = buf.len();
                    buf.copy_from_slice(&qdata[offset..offset + len]);
                    offset += len;
                }
                mode => {
                    self.basis.apply_element(TransposeMode::NoTranspose, mode, input, buf, scratch)?;
                }
            }
        }

        let ins: Vec<&[Scalar]> = inputs.iter().map(Vec::as_slice).collect();
        let mut outs: Vec<&mut [Scalar]> = outputs.iter_mut().map(Vec::as_mut_slice).collect();
        self.qfunction.call(self.nqpts, &ins, &mut outs)?;

        if self.passive_output {
            let mut offset = 0;
            for buf in outputs.iter() {
                output[offset..offset + buf.len()].copy_from_slice(buf);
                offset += buf.len();
            }
            return Ok(());
        }
        for (k, (field, buf)) in self.qfunction.outputs().iter().zip(outputs.iter()).enumerate() {
            if k == 0 {
                self.basis.apply_element(TransposeMode::Transpose, field.mode, buf, output, scratch)?;
            } else {
                self.basis.apply_element(TransposeMode::Transpose, field.mode, buf, accum, scratch)?;
                for (o, a) in output.iter_mut().zip(accum.iter()) {
                    *o += a;
                }
            }
        }
        Ok(())
    }

    /// Diagonal of the element matrix, one unit input vector per entry.
    pub fn diagonal(&self, qdata: &[Scalar], diag: &mut [Scalar], ws: &mut ElementWorkspace) -> Result<()> {
        let mut unit = vec![0.0; self.input_block];
        let mut column = vec![0.0; self.output_block];
        for (j, d) in diag.iter_mut().enumerate().take(self.input_block) {
            unit[j] = 1.0;
            self.apply(&unit, qdata, &mut column, ws)?;
            unit[j] = 0.0;
            *d = column[j];
        }
        Ok(())
    }
}

fn read_qdata<'a>(kernel: &ElementKernel, qdata: &'a mut Option<Vector>) -> Result<Option<HostRead<'a>>> {
    match qdata {
        Some(qdata) => qdata.imp_mut().host_read().map(Some),
        None if kernel.qdata_block > 0 => {
            Err(FemError::invalid("operator has passive inputs but no quadrature data"))
        }
        None => Ok(None),
    }
}

/// Everything an operator implementation works on.
#[derive(Debug)]
pub struct OperatorFields {
    restriction: ElemRestriction,
    basis: Basis,
    kernel: ElementKernel,
    qdata: Option<Vector>,
    evec_in: Option<Vector>,
    evec_out: Option<Vector>,
}

impl OperatorFields {
    /// The restriction.
    pub fn restriction(&self) -> &ElemRestriction {
        &self.restriction
    }

    /// The basis.
    pub fn basis(&self) -> &Basis {
        &self.basis
    }

    /// The element kernel.
    pub fn kernel(&self) -> &ElementKernel {
        &self.kernel
    }

    fn ensure_evec_out(&mut self) -> Result<()> {
        if self.evec_out.is_none() {
            let len = self.restriction.nelem() * self.kernel.output_block;
            self.evec_out = Some(self.restriction.context().vector(len)?);
            debug!(len, passive = self.kernel.passive_output, "allocated operator output E-vector");
        }
        Ok(())
    }

    /// Allocates the E-vectors on first use and gathers the active input.
    pub(crate) fn gather(&mut self, input: &mut Vector) -> Result<()> {
        self.ensure_evec_out()?;
        if !self.kernel.active {
            return Ok(());
        }
        if self.evec_in.is_none() {
            self.evec_in = Some(self.restriction.create_evector()?);
        }
        let evec_in = self
            .evec_in
            .as_mut()
            .ok_or_else(|| FemError::Runtime("operator E-vector missing".into()))?;
        self.restriction.apply_raw(TransposeMode::NoTranspose, input, evec_in)
    }

    /// Calls `f` with the kernel, the input E-vector, the quadrature data and
    /// the output E-vector, all on the host.
    pub(crate) fn with_element_data<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&ElementKernel, &[Scalar], &[Scalar], &mut [Scalar]) -> Result<()>,
    {
        let Self { kernel, qdata, evec_in, evec_out, .. } = self;
        let input = match evec_in {
            Some(evec) if kernel.active => Some(evec.imp_mut().host_read()?),
            _ => None,
        };
        let qdata = read_qdata(kernel, qdata)?;
        let evec_out = evec_out.as_mut().ok_or_else(|| FemError::Runtime("operator E-vector missing".into()))?;
        let mut output = evec_out.imp_mut().host_write()?;
        f(kernel, input.as_deref().unwrap_or(&[]), qdata.as_deref().unwrap_or(&[]), &mut output)
    }

    /// Calls `f` with the kernel, the quadrature data and the output
    /// E-vector, which receives the element diagonals.
    pub(crate) fn with_diagonal_data<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&ElementKernel, &[Scalar], &mut [Scalar]) -> Result<()>,
    {
        self.ensure_evec_out()?;
        let Self { kernel, qdata, evec_out, .. } = self;
        let qdata = read_qdata(kernel, qdata)?;
        let evec_out = evec_out.as_mut().ok_or_else(|| FemError::Runtime("operator E-vector missing".into()))?;
        let mut output = evec_out.imp_mut().host_write()?;
        f(kernel, qdata.as_deref().unwrap_or(&[]), &mut output)
    }

    /// Scatter-adds the output E-vector into `output`. Passive outputs are
    /// added entry by entry.
    pub(crate) fn scatter(&mut self, output: &mut Vector) -> Result<()> {
        let evec_out = self
            .evec_out
            .as_mut()
            .ok_or_else(|| FemError::Runtime("operator E-vector missing".into()))?;
        if self.kernel.passive_output {
            let src = evec_out.imp_mut().host_read()?;
            let mut dst = output.imp_mut().host_write()?;
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d += s;
            }
            return Ok(());
        }
        self.restriction.apply_raw(TransposeMode::Transpose, evec_out, output)
    }
}

/// A composed matrix-free operator.
#[derive(Debug)]
pub struct Operator {
    ctx: Context,
    fields: OperatorFields,
    imp: Box<dyn OperatorImpl>,
}

impl Operator {
    pub(crate) fn create(
        ctx: &Context,
        qfunction: &QFunction,
        restriction: &ElemRestriction,
        basis: &Basis,
    ) -> Result<Self> {
        let fields = Self::validate(ctx, qfunction, restriction, basis);
        let fields = ctx.check("Operator::create", fields)?;
        let imp = ctx.check("Operator::create", ctx.backend().create_operator())?;
        debug!(
            nelem = restriction.nelem(),
            inputs = qfunction.inputs().len(),
            outputs = qfunction.outputs().len(),
            "created operator"
        );
        Ok(Self { ctx: ctx.clone(), fields, imp })
    }

    fn validate(
        ctx: &Context,
        qfunction: &QFunction,
        restriction: &ElemRestriction,
        basis: &Basis,
    ) -> Result<OperatorFields> {
        let shared = [qfunction.context(), restriction.context(), basis.context()];
        if !shared.iter().all(|other| other.ptr_eq(ctx)) {
            return Err(FemError::invalid("operator fields were created in a different context"));
        }
        FemError::check_len("restriction elemsize vs basis nodes", basis.num_nodes(), restriction.elemsize())?;
        FemError::check_len("restriction ncomp vs basis ncomp", basis.ncomp(), restriction.ncomp())?;
        let kernel = ElementKernel::new(basis.shared_data(), qfunction.clone())?;
        Ok(OperatorFields {
            restriction: restriction.clone(),
            basis: basis.clone(),
            kernel,
            qdata: None,
            evec_in: None,
            evec_out: None,
        })
    }

    /// Fields and cached state.
    pub fn fields(&self) -> &OperatorFields {
        &self.fields
    }

    /// Installs quadrature data for the `None`-mode inputs, element after
    /// element, each block holding the fields in declaration order.
    pub fn set_qdata(&mut self, qdata: Vector) -> Result<()> {
        let expected = self.fields.restriction.nelem() * self.fields.kernel.qdata_block;
        let result = FemError::check_len("quadrature data length", expected, qdata.len());
        self.ctx.check("Operator::set_qdata", result)?;
        self.fields.qdata = Some(qdata);
        Ok(())
    }

    /// Takes back the quadrature data.
    pub fn take_qdata(&mut self) -> Option<Vector> {
        self.fields.qdata.take()
    }

    /// Computes `output = A(input)`.
    ///
    /// On failure `output` holds partial results.
    pub fn apply(&mut self, input: &mut Vector, output: &mut Vector, request: &mut Request) -> Result<()> {
        let result = self.apply_raw(input, output);
        self.ctx.check("Operator::apply", result)?;
        request.complete();
        Ok(())
    }

    /// Computes `output += A(input)`.
    pub fn apply_add(&mut self, input: &mut Vector, output: &mut Vector, request: &mut Request) -> Result<()> {
        let result = self.apply_add_raw(input, output);
        self.ctx.check("Operator::apply_add", result)?;
        request.complete();
        Ok(())
    }

    fn apply_raw(&mut self, input: &mut Vector, output: &mut Vector) -> Result<()> {
        output.imp_mut().set_value(0.0)?;
        self.apply_add_raw(input, output)
    }

    fn apply_add_raw(&mut self, input: &mut Vector, output: &mut Vector) -> Result<()> {
        let lsize = self.fields.restriction.lsize();
        if self.fields.kernel.active {
            FemError::check_len("operator input length", lsize, input.len())?;
        }
        FemError::check_len("operator output length", self.output_len(), output.len())?;
        self.imp.apply_add(&self.ctx, &mut self.fields, input, output)
    }

    /// Length `apply` expects of its output: the L-vector size, or the
    /// quadrature data size when the outputs are passive.
    pub fn output_len(&self) -> usize {
        let kernel = &self.fields.kernel;
        if kernel.passive_output {
            self.fields.restriction.nelem() * kernel.output_block
        } else {
            self.fields.restriction.lsize()
        }
    }

    /// Writes the diagonal of the assembled operator into `diag`.
    ///
    /// Needs an active input and `Interp`/`Grad` outputs, and a qfunction
    /// that is linear in the active input.
    pub fn linear_assemble_diagonal(&mut self, diag: &mut Vector, request: &mut Request) -> Result<()> {
        let result = self.assemble_diagonal_raw(diag);
        self.ctx.check("Operator::linear_assemble_diagonal", result)?;
        request.complete();
        Ok(())
    }

    fn assemble_diagonal_raw(&mut self, diag: &mut Vector) -> Result<()> {
        let kernel = &self.fields.kernel;
        if !kernel.active || kernel.passive_output {
            return Err(FemError::invalid(
                "diagonal assembly needs an active input and Interp or Grad outputs",
            ));
        }
        FemError::check_len("diagonal length", self.fields.restriction.lsize(), diag.len())?;
        diag.imp_mut().set_value(0.0)?;
        self.imp.linear_assemble_diagonal(&self.ctx, &mut self.fields, diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorHandler;
    use crate::restriction::IndexSource;

    fn setup() -> (Context, ElemRestriction, Basis) {
        let ctx = Context::init("/cpu/self").unwrap();
        ctx.set_error_handler(ErrorHandler::Return);
        let r = ctx.elem_restriction(2, 2, 1, 3, IndexSource::Copy(&[0, 1, 1, 2])).unwrap();
        let b = ctx
            .basis_tensor_h1(1, 1, 2, 2, &[1.0, 0.0, 0.0, 1.0], &[-0.5, 0.5, -0.5, 0.5], &[-1.0, 1.0], &[1.0, 1.0])
            .unwrap();
        (ctx, r, b)
    }

    fn identity_qf(ctx: &Context) -> QFunction {
        let mut qf = ctx.q_function_interior(|_, inputs, outputs| {
            outputs[0].copy_from_slice(inputs[0]);
            Ok(())
        });
        qf.add_input("u", 1, EvalMode::Interp).unwrap();
        qf.add_output("v", 1, EvalMode::Interp).unwrap();
        qf
    }

    #[test]
    fn identity_operator_assembles_multiplicity() {
        let (ctx, r, b) = setup();
        let mut op = ctx.operator(&identity_qf(&ctx), &r, &b).unwrap();
        let mut x = ctx.vector_from_slice(&[1.0, 2.0, 3.0]).unwrap();
        let mut y = ctx.vector(3).unwrap();
        let mut request = Request::Immediate;
        op.apply(&mut x, &mut y, &mut request).unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![1.0, 4.0, 3.0]);
        assert!(request.is_complete());

        op.apply_add(&mut x, &mut y, &mut request).unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![2.0, 8.0, 6.0]);
    }

    #[test]
    fn mismatched_fields_are_rejected() {
        let (ctx, r, b) = setup();
        let mut qf = ctx.q_function_interior(|_, _, _| Ok(()));
        qf.add_input("du", 1, EvalMode::Grad).unwrap();
        qf.add_output("v", 1, EvalMode::Interp).unwrap();
        assert!(ctx.operator(&qf, &r, &b).is_ok());

        let mut bad = ctx.q_function_interior(|_, _, _| Ok(()));
        bad.add_input("u", 2, EvalMode::Interp).unwrap();
        bad.add_output("v", 1, EvalMode::Interp).unwrap();
        assert!(ctx.operator(&bad, &r, &b).is_err());

        let mut weight_out = ctx.q_function_interior(|_, _, _| Ok(()));
        weight_out.add_output("w", 1, EvalMode::Weight).unwrap();
        assert!(ctx.operator(&weight_out, &r, &b).is_err());

        let none = ctx.q_function_interior(|_, _, _| Ok(()));
        assert!(ctx.operator(&none, &r, &b).is_err());
    }

    #[test]
    fn elemsize_must_match_basis_nodes() {
        let (ctx, _, b) = setup();
        let r = ctx.elem_restriction(1, 3, 1, 3, IndexSource::Copy(&[0, 1, 2])).unwrap();
        assert!(matches!(
            ctx.operator(&identity_qf(&ctx), &r, &b),
            Err(FemError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn passive_inputs_require_qdata() {
        let (ctx, r, b) = setup();
        let mut qf = ctx.q_function_interior(|_, inputs, outputs| {
            for (o, (u, w)) in outputs[0].iter_mut().zip(inputs[0].iter().zip(inputs[1])) {
                *o = u * w;
            }
            Ok(())
        });
        qf.add_input("u", 1, EvalMode::Interp).unwrap();
        qf.add_input("rho", 1, EvalMode::None).unwrap();
        qf.add_output("v", 1, EvalMode::Interp).unwrap();
        let mut op = ctx.operator(&qf, &r, &b).unwrap();
        let mut x = ctx.vector_from_slice(&[1.0, 1.0, 1.0]).unwrap();
        let mut y = ctx.vector(3).unwrap();
        assert!(op.apply(&mut x, &mut y, &mut Request::Immediate).is_err());

        assert!(op.set_qdata(ctx.vector(3).unwrap()).is_err());
        op.set_qdata(ctx.vector_from_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap()).unwrap();
        op.apply(&mut x, &mut y, &mut Request::Immediate).unwrap();
        assert_eq!(y.to_vec().unwrap(), vec![1.0, 5.0, 4.0]);
    }

    #[test]
    fn passive_and_active_outputs_cannot_mix() {
        let (ctx, r, b) = setup();
        let mut qf = ctx.q_function_interior(|_, _, _| Ok(()));
        qf.add_input("u", 1, EvalMode::Interp).unwrap();
        qf.add_output("v", 1, EvalMode::Interp).unwrap();
        qf.add_output("q", 1, EvalMode::None).unwrap();
        assert!(matches!(ctx.operator(&qf, &r, &b), Err(FemError::InvalidArgument(_))));
    }

    #[test]
    fn passive_outputs_write_quadrature_data() {
        let (ctx, r, b) = setup();
        let mut qf = ctx.q_function_interior(|_, inputs, outputs| {
            for (o, u) in outputs[0].iter_mut().zip(inputs[0]) {
                *o = 2.0 * u;
            }
            Ok(())
        });
        qf.add_input("u", 1, EvalMode::Interp).unwrap();
        qf.add_output("q", 1, EvalMode::None).unwrap();
        let mut op = ctx.operator(&qf, &r, &b).unwrap();
        assert!(op.fields().kernel().has_passive_output());
        assert_eq!(op.output_len(), 4);

        let mut x = ctx.vector_from_slice(&[1.0, 2.0, 3.0]).unwrap();
        let mut q = ctx.vector(4).unwrap();
        op.apply(&mut x, &mut q, &mut Request::Immediate).unwrap();
        assert_eq!(q.to_vec().unwrap(), vec![2.0, 4.0, 4.0, 6.0]);
        assert!(op.apply(&mut x, &mut ctx.vector(3).unwrap(), &mut Request::Immediate).is_err());

        let mut diag = ctx.vector(3).unwrap();
        assert!(op.linear_assemble_diagonal(&mut diag, &mut Request::Immediate).is_err());
    }

    #[test]
    fn identity_diagonal_counts_element_multiplicity() {
        let (ctx, r, b) = setup();
        let mut op = ctx.operator(&identity_qf(&ctx), &r, &b).unwrap();
        let mut diag = ctx.vector_from_slice(&[9.0, 9.0, 9.0]).unwrap();
        op.linear_assemble_diagonal(&mut diag, &mut Request::Immediate).unwrap();
        assert_eq!(diag.to_vec().unwrap(), vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn fields_from_another_context_are_rejected() {
        let (ctx, r, b) = setup();
        let other = Context::init("/cpu/self").unwrap();
        other.set_error_handler(ErrorHandler::Return);
        let qf = identity_qf(&other);
        assert!(matches!(ctx.operator(&qf, &r, &b), Err(FemError::InvalidArgument(_))));
        assert!(ctx.operator(&identity_qf(&ctx), &r, &b).is_ok());
    }
}
