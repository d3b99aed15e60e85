//! Tensor-product H1 bases.
//!
//! A basis in `dim` dimensions with `p` nodes and `q` quadrature points per
//! dimension is described entirely by 1-D data: a `q x p` interpolation matrix,
//! its derivative counterpart, and a 1-D quadrature rule. Evaluation applies the
//! 1-D matrix once per axis ([`tensor_contract`]), ping-ponging between two
//! scratch buffers, so the cost is `O(dim)` contractions instead of one dense
//! `q^dim x p^dim` product.
//!
//! # Element layouts
//!
//! | mode | nodal side | quadrature side |
//! |---|---|---|
//! | `Interp` | `ncomp * p^dim` | `ncomp * q^dim` |
//! | `Grad` | `ncomp * p^dim` | `dim * ncomp * q^dim` (one block per direction) |
//! | `Weight` | (none) | `q^dim` |
//!
//! Components are the slowest index within a block.

use std::sync::Arc;

use tracing::debug;

use crate::backend::{BasisImpl, ObjectKind};
use crate::context::Context;
use crate::error::{FemError, Result};
use crate::memory::Scalar;
use crate::ops::contract::tensor_contract;
use crate::quadrature::{Quadrature, gauss_lobatto, lagrange_matrices};
use crate::restriction::TransposeMode;
use crate::vector::Vector;

pub use crate::quadrature::QuadMode;

/// Largest supported spatial dimension.
pub const MAX_DIM: usize = 3;

/// What a basis application computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalMode {
    /// No basis action; data is used as is.
    None,
    /// Values at quadrature points.
    Interp,
    /// Reference-space gradients at quadrature points.
    Grad,
    /// Quadrature weights.
    Weight,
}

/// The numeric description of a tensor-product basis.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBasis {
    dim: usize,
    ncomp: usize,
    p1d: usize,
    q1d: usize,
    interp1d: Vec<Scalar>,
    grad1d: Vec<Scalar>,
    qref1d: Vec<Scalar>,
    qweight1d: Vec<Scalar>,
}

fn pow(base: usize, exp: usize) -> usize {
    (0..exp).fold(1, |acc, _| acc * base)
}

impl TensorBasis {
    /// Validates and stores 1-D basis data. Matrices are `q x p`, row-major.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dim: usize,
        ncomp: usize,
        p1d: usize,
        q1d: usize,
        interp1d: Vec<Scalar>,
        grad1d: Vec<Scalar>,
        qref1d: Vec<Scalar>,
        qweight1d: Vec<Scalar>,
    ) -> Result<Self> {
        if !(1..=MAX_DIM).contains(&dim) {
            return Err(FemError::invalid(format!("basis dimension {dim} not in 1..={MAX_DIM}")));
        }
        if ncomp == 0 || p1d == 0 || q1d == 0 {
            return Err(FemError::invalid("basis needs at least one component, node and point"));
        }
        FemError::check_len("interp1d length", q1d * p1d, interp1d.len())?;
        FemError::check_len("grad1d length", q1d * p1d, grad1d.len())?;
        FemError::check_len("qref1d length", q1d, qref1d.len())?;
        FemError::check_len("qweight1d length", q1d, qweight1d.len())?;
        Ok(Self { dim, ncomp, p1d, q1d, interp1d, grad1d, qref1d, qweight1d })
    }

    /// Spatial dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Components.
    pub fn ncomp(&self) -> usize {
        self.ncomp
    }

    /// Nodes per dimension.
    pub fn p1d(&self) -> usize {
        self.p1d
    }

    /// Quadrature points per dimension.
    pub fn q1d(&self) -> usize {
        self.q1d
    }

    /// 1-D interpolation matrix.
    pub fn interp1d(&self) -> &[Scalar] {
        &self.interp1d
    }

    /// 1-D derivative matrix.
    pub fn grad1d(&self) -> &[Scalar] {
        &self.grad1d
    }

    /// 1-D quadrature points.
    pub fn qref1d(&self) -> &[Scalar] {
        &self.qref1d
    }

    /// 1-D quadrature weights.
    pub fn qweight1d(&self) -> &[Scalar] {
        &self.qweight1d
    }

    /// Nodes per element.
    pub fn num_nodes(&self) -> usize {
        pow(self.p1d, self.dim)
    }

    /// Quadrature points per element.
    pub fn num_qpts(&self) -> usize {
        pow(self.q1d, self.dim)
    }

    /// Capacity of each scratch buffer.
    pub fn scratch_len(&self) -> usize {
        self.ncomp * pow(self.p1d.max(self.q1d), self.dim)
    }

    /// Per-element input and output lengths.
    pub fn elem_sizes(&self, tmode: TransposeMode, emode: EvalMode) -> Result<(usize, usize)> {
        let nodes = self.ncomp * self.num_nodes();
        let qpts = self.ncomp * self.num_qpts();
        let forward = match emode {
            EvalMode::Interp => (nodes, qpts),
            EvalMode::Grad => (nodes, self.dim * qpts),
            EvalMode::Weight => {
                if tmode == TransposeMode::Transpose {
                    return Err(FemError::unsupported(ObjectKind::Basis, "ApplyTransposeWeight"));
                }
                (0, self.num_qpts())
            }
            EvalMode::None => return Err(FemError::invalid("EvalMode::None has no basis action")),
        };
        Ok(match tmode {
            TransposeMode::NoTranspose => forward,
            TransposeMode::Transpose => (forward.1, forward.0),
        })
    }

    /// Applies one contraction per axis; `deriv` selects the axis that uses the
    /// derivative matrix. With `add` the last pass accumulates into `v`.
    fn passes(
        &self,
        tmode: TransposeMode,
        deriv: Option<usize>,
        add: bool,
        u: &[Scalar],
        v: &mut [Scalar],
        scratch: &mut BasisScratch,
    ) {
        let (p, q) = match tmode {
            TransposeMode::NoTranspose => (self.p1d, self.q1d),
            TransposeMode::Transpose => (self.q1d, self.p1d),
        };
        let dim = self.dim;
        let mut pre = self.ncomp * pow(p, dim - 1);
        let mut post = 1;
        let [t0, t1] = &mut scratch.buffers;
        for d in 0..dim {
            let t = if deriv == Some(d) { &self.grad1d } else { &self.interp1d };
            let last = d + 1 == dim;
            let add = add && last;
            match (d == 0, last) {
                (true, true) => tensor_contract(pre, p, post, q, t, tmode, add, u, v),
                (true, false) => tensor_contract(pre, p, post, q, t, tmode, add, u, &mut t1[..]),
                (false, true) => {
                    let src = if d % 2 == 0 { &t0[..] } else { &t1[..] };
                    tensor_contract(pre, p, post, q, t, tmode, add, src, v);
                }
                (false, false) => {
                    if d % 2 == 0 {
                        tensor_contract(pre, p, post, q, t, tmode, add, &t0[..], &mut t1[..]);
                    } else {
                        tensor_contract(pre, p, post, q, t, tmode, add, &t1[..], &mut t0[..]);
                    }
                }
            }
            pre /= p;
            post *= q;
        }
    }

    /// Applies the basis to a single element block.
    pub fn apply_element(
        &self,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &[Scalar],
        v: &mut [Scalar],
        scratch: &mut BasisScratch,
    ) -> Result<()> {
        let (ulen, vlen) = self.elem_sizes(tmode, emode)?;
        if emode != EvalMode::Weight {
            FemError::check_len("basis element input", ulen, u.len())?;
        }
        FemError::check_len("basis element output", vlen, v.len())?;
        FemError::check_len("basis scratch", self.scratch_len(), scratch.capacity())?;
        match emode {
            EvalMode::Interp => self.passes(tmode, None, false, u, v, scratch),
            EvalMode::Grad => {
                let block = self.ncomp * self.num_qpts();
                match tmode {
                    TransposeMode::NoTranspose => {
                        for (d, out) in v.chunks_mut(block).enumerate() {
                            self.passes(tmode, Some(d), false, u, out, scratch);
                        }
                    }
                    TransposeMode::Transpose => {
                        v.fill(0.0);
                        for (d, inp) in u.chunks(block).enumerate() {
                            self.passes(tmode, Some(d), true, inp, v, scratch);
                        }
                    }
                }
            }
            EvalMode::Weight => {
                for (idx, out) in v.iter_mut().enumerate() {
                    let mut rest = idx;
                    let mut w = 1.0;
                    for _ in 0..self.dim {
                        w *= self.qweight1d[rest % self.q1d];
                        rest /= self.q1d;
                    }
                    *out = w;
                }
            }
            EvalMode::None => unreachable!("rejected by elem_sizes"),
        }
        Ok(())
    }
}

/// Two work buffers sized for one basis, reused across elements.
#[derive(Debug, Clone)]
pub struct BasisScratch {
    buffers: [Vec<Scalar>; 2],
}

impl BasisScratch {
    /// Allocates scratch for `basis`.
    pub fn new(basis: &TensorBasis) -> Self {
        let len = basis.scratch_len();
        Self { buffers: [vec![0.0; len], vec![0.0; len]] }
    }

    /// Length of each buffer.
    pub fn capacity(&self) -> usize {
        self.buffers[0].len()
    }
}

#[derive(Debug)]
struct BasisInner {
    ctx: Context,
    data: Arc<TensorBasis>,
    imp: Box<dyn BasisImpl>,
}

/// A tensor-product basis. Cloning shares it.
#[derive(Debug, Clone)]
pub struct Basis {
    inner: Arc<BasisInner>,
}

impl Basis {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn tensor_h1(
        ctx: &Context,
        dim: usize,
        ncomp: usize,
        p: usize,
        q: usize,
        interp1d: &[Scalar],
        grad1d: &[Scalar],
        qref1d: &[Scalar],
        qweight1d: &[Scalar],
    ) -> Result<Self> {
        let data = TensorBasis::new(
            dim,
            ncomp,
            p,
            q,
            interp1d.to_vec(),
            grad1d.to_vec(),
            qref1d.to_vec(),
            qweight1d.to_vec(),
        );
        let data = ctx.check("Basis::tensor_h1", data)?;
        Self::from_data(ctx, data)
    }

    pub(crate) fn tensor_h1_lagrange(
        ctx: &Context,
        dim: usize,
        ncomp: usize,
        p: usize,
        q: usize,
        qmode: QuadMode,
    ) -> Result<Self> {
        let data = (|| {
            let nodes = gauss_lobatto(p)?.points;
            let rule = Quadrature::new(qmode, q)?;
            let (interp, grad) = lagrange_matrices(&nodes, &rule.points)?;
            TensorBasis::new(dim, ncomp, p, q, interp, grad, rule.points, rule.weights)
        })();
        let data = ctx.check("Basis::tensor_h1_lagrange", data)?;
        Self::from_data(ctx, data)
    }

    fn from_data(ctx: &Context, data: TensorBasis) -> Result<Self> {
        let data = Arc::new(data);
        let imp = ctx.check("Basis::create", ctx.backend().create_basis(Arc::clone(&data)))?;
        debug!(dim = data.dim, ncomp = data.ncomp, p = data.p1d, q = data.q1d, "created basis");
        Ok(Self { inner: Arc::new(BasisInner { ctx: ctx.clone(), data, imp }) })
    }

    /// The context this basis was created in.
    pub fn context(&self) -> &Context {
        &self.inner.ctx
    }

    /// The basis data.
    pub fn data(&self) -> &TensorBasis {
        &self.inner.data
    }

    pub(crate) fn shared_data(&self) -> Arc<TensorBasis> {
        Arc::clone(&self.inner.data)
    }

    /// Spatial dimension.
    pub fn dim(&self) -> usize {
        self.inner.data.dim
    }

    /// Components.
    pub fn ncomp(&self) -> usize {
        self.inner.data.ncomp
    }

    /// Nodes per element.
    pub fn num_nodes(&self) -> usize {
        self.inner.data.num_nodes()
    }

    /// Quadrature points per element.
    pub fn num_qpts(&self) -> usize {
        self.inner.data.num_qpts()
    }

    /// Applies the basis to `nelem` consecutive element blocks of `u`, writing `v`.
    ///
    /// `u` is not read for [`EvalMode::Weight`].
    pub fn apply(
        &self,
        nelem: usize,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &mut Vector,
        v: &mut Vector,
    ) -> Result<()> {
        let result = self.apply_raw(nelem, tmode, emode, u, v);
        self.inner.ctx.check("Basis::apply", result)
    }

    fn apply_raw(
        &self,
        nelem: usize,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &mut Vector,
        v: &mut Vector,
    ) -> Result<()> {
        let (ulen, vlen) = self.inner.data.elem_sizes(tmode, emode)?;
        FemError::check_len("basis output length", nelem * vlen, v.len())?;
        let mut out = v.imp_mut().host_write()?;
        if emode == EvalMode::Weight {
            return self.inner.imp.apply(nelem, tmode, emode, &[], &mut out);
        }
        FemError::check_len("basis input length", nelem * ulen, u.len())?;
        let inp = u.imp_mut().host_read()?;
        self.inner.imp.apply(nelem, tmode, emode, &inp, &mut out)
    }
}
