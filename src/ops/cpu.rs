//! Reference CPU backend (`/cpu/self/ref`).
//!
//! Straightforward serial kernels on host memory, meant as the ground truth
//! other backends are checked against:
//!
//! - vectors are host-only [`MirroredArray`]s
//! - restriction gather and scatter-add loop over elements in order
//! - bases apply [`TensorBasis::apply_element`] element by element
//! - operators run [`ElementKernel::apply`] element by element
//!
//! No threads are spawned.
//!
//! The gather/scatter and basis loops are shared with the device backends,
//! which run them on the host mirror of their vectors.

use std::sync::Arc;

use crate::backend::{
    Backend, BasisImpl, CapabilityTable, ElemRestrictionImpl, ObjectKind, OperatorImpl, VectorImpl,
};
use crate::basis::{BasisScratch, EvalMode, TensorBasis};
use crate::context::Context;
use crate::error::{FemError, Result};
use crate::memory::{MirroredArray, Scalar};
use crate::operator::OperatorFields;
use crate::restriction::{Indices, RestrictionLayout, TransposeMode};
use crate::vector::Vector;

/// Registry prefix of the reference backend.
pub const PREFIX: &str = "/cpu/self/ref";

/// Operations the host kernels in this module provide.
pub(crate) const HOST_CAPABILITIES: &[(ObjectKind, &str)] = &[
    (ObjectKind::Vector, "Create"),
    (ObjectKind::Vector, "SetArray"),
    (ObjectKind::Vector, "TakeArray"),
    (ObjectKind::Vector, "SetValue"),
    (ObjectKind::Vector, "GetArrayRead"),
    (ObjectKind::Vector, "GetArray"),
    (ObjectKind::Vector, "SyncArray"),
    (ObjectKind::Vector, "Norm"),
    (ObjectKind::Vector, "Reciprocal"),
    (ObjectKind::ElemRestriction, "Create"),
    (ObjectKind::ElemRestriction, "Apply"),
    (ObjectKind::Basis, "Create"),
    (ObjectKind::Basis, "Apply"),
    (ObjectKind::QFunction, "Apply"),
    (ObjectKind::Operator, "Create"),
    (ObjectKind::Operator, "Apply"),
    (ObjectKind::Operator, "LinearAssembleDiagonal"),
];

/// Gathers `u` (L-vector) into `v` (E-vector).
pub(crate) fn gather(layout: &RestrictionLayout, indices: &[usize], u: &[Scalar], v: &mut [Scalar]) {
    let RestrictionLayout { elemsize, ncomp, .. } = *layout;
    for (e, block) in v.chunks_mut(layout.elem_block()).enumerate() {
        gather_element(elemsize, ncomp, &indices[e * elemsize..(e + 1) * elemsize], u, block);
    }
}

/// Gathers one element's block.
pub(crate) fn gather_element(elemsize: usize, ncomp: usize, indices: &[usize], u: &[Scalar], block: &mut [Scalar]) {
    for c in 0..ncomp {
        for (i, &node) in indices.iter().enumerate() {
            block[c * elemsize + i] = u[node * ncomp + c];
        }
    }
}

/// Adds every E-vector entry of `u` into its L-vector slot in `v`.
pub(crate) fn scatter_add(layout: &RestrictionLayout, indices: &[usize], u: &[Scalar], v: &mut [Scalar]) {
    let RestrictionLayout { elemsize, ncomp, .. } = *layout;
    for (e, block) in u.chunks(layout.elem_block()).enumerate() {
        let nodes = &indices[e * elemsize..(e + 1) * elemsize];
        for c in 0..ncomp {
            for (i, &node) in nodes.iter().enumerate() {
                v[node * ncomp + c] += block[c * elemsize + i];
            }
        }
    }
}

/// Serial restriction over host data.
#[derive(Debug)]
pub(crate) struct RefRestriction {
    layout: RestrictionLayout,
    indices: Indices,
}

impl RefRestriction {
    pub(crate) fn new(layout: RestrictionLayout, indices: Indices) -> Self {
        Self { layout, indices }
    }
}

impl ElemRestrictionImpl for RefRestriction {
    fn apply(&self, tmode: TransposeMode, u: &mut dyn VectorImpl, v: &mut dyn VectorImpl) -> Result<()> {
        let src = u.host_read()?;
        let mut dst = v.host_write()?;
        match tmode {
            TransposeMode::NoTranspose => gather(&self.layout, &self.indices, &src, &mut dst),
            TransposeMode::Transpose => scatter_add(&self.layout, &self.indices, &src, &mut dst),
        }
        Ok(())
    }
}

/// Serial basis over host data.
#[derive(Debug)]
pub(crate) struct RefBasis {
    data: Arc<TensorBasis>,
}

impl RefBasis {
    pub(crate) fn new(data: Arc<TensorBasis>) -> Self {
        Self { data }
    }
}

impl BasisImpl for RefBasis {
    fn apply(
        &self,
        nelem: usize,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<()> {
        let (ulen, vlen) = self.data.elem_sizes(tmode, emode)?;
        let mut scratch = BasisScratch::new(&self.data);
        for (e, out) in v.chunks_mut(vlen).take(nelem).enumerate() {
            let inp = if emode == EvalMode::Weight { &[][..] } else { &u[e * ulen..(e + 1) * ulen] };
            self.data.apply_element(tmode, emode, inp, out, &mut scratch)?;
        }
        Ok(())
    }
}

/// Serial operator: restriction, element loop, scatter.
#[derive(Debug, Default)]
pub(crate) struct RefOperator;

impl OperatorImpl for RefOperator {
    fn apply_add(
        &mut self,
        _ctx: &Context,
        fields: &mut OperatorFields,
        input: &mut Vector,
        output: &mut Vector,
    ) -> Result<()> {
        fields.gather(input)?;
        fields.with_element_data(|kernel, u, qdata, v| {
            let mut ws = kernel.workspace();
            for (e, block) in v.chunks_mut(kernel.output_block()).enumerate() {
                let (ue, qe) = kernel.element_inputs(e, u, qdata);
                kernel.apply(ue, qe, block, &mut ws)?;
            }
            Ok(())
        })?;
        fields.scatter(output)
    }

    fn linear_assemble_diagonal(
        &mut self,
        _ctx: &Context,
        fields: &mut OperatorFields,
        diag: &mut Vector,
    ) -> Result<()> {
        fields.with_diagonal_data(|kernel, qdata, v| {
            let mut ws = kernel.workspace();
            for (e, block) in v.chunks_mut(kernel.output_block()).enumerate() {
                kernel.diagonal(kernel.element_qdata(e, qdata), block, &mut ws)?;
            }
            Ok(())
        })?;
        fields.scatter(diag)
    }
}

/// The reference backend.
#[derive(Debug)]
pub struct RefBackend {
    capabilities: CapabilityTable,
}

impl RefBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self { capabilities: CapabilityTable::from_entries(HOST_CAPABILITIES) }
    }
}

impl Default for RefBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for RefBackend {
    fn name(&self) -> &str {
        "ref"
    }

    fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    fn create_vector(&self, len: usize) -> Result<Box<dyn VectorImpl>> {
        Ok(Box::new(MirroredArray::new(self.name(), len, None)))
    }

    fn create_elem_restriction(
        &self,
        layout: RestrictionLayout,
        indices: Indices,
    ) -> Result<Box<dyn ElemRestrictionImpl>> {
        Ok(Box::new(RefRestriction::new(layout, indices)))
    }

    fn create_basis(&self, data: Arc<TensorBasis>) -> Result<Box<dyn BasisImpl>> {
        Ok(Box::new(RefBasis::new(data)))
    }

    fn create_operator(&self) -> Result<Box<dyn OperatorImpl>> {
        Ok(Box::new(RefOperator))
    }
}

/// Accepts `/cpu/self` and `/cpu/self/ref`.
pub fn init(resource: &str) -> Result<Box<dyn Backend>> {
    match resource {
        "/cpu/self" | PREFIX => Ok(Box::new(RefBackend::new())),
        _ => Err(FemError::InvalidResource { backend: "ref".to_owned(), resource: resource.to_owned() }),
    }
}
