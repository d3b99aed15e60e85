//! Multi-threaded CPU backend (`/cpu/self/opt`).
//!
//! Same storage and results as the reference backend, with element loops
//! spread over the `rayon` thread pool:
//!
//! - restriction gather writes disjoint element blocks in parallel; the
//!   scatter-add stays serial since neighbouring elements share nodes
//! - basis application runs one element per task
//! - the operator fuses basis, qfunction and basis transpose per element, so
//!   quadrature-point data never leaves the worker's workspace
//!
//! Each worker allocates its own scratch once (`try_for_each_init`), so no
//! buffer is shared between concurrently running elements.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::trace;

use crate::backend::{
    Backend, BasisImpl, CapabilityTable, ElemRestrictionImpl, OperatorImpl, VectorImpl,
};
use crate::basis::{BasisScratch, EvalMode, TensorBasis};
use crate::context::Context;
use crate::error::{FemError, Result};
use crate::memory::{MirroredArray, Scalar};
use crate::operator::OperatorFields;
use crate::restriction::{Indices, RestrictionLayout, TransposeMode};
use crate::vector::Vector;

use super::cpu::{HOST_CAPABILITIES, gather_element, scatter_add};

/// Registry prefix of the threaded backend.
pub const PREFIX: &str = "/cpu/self/opt";

#[derive(Debug)]
struct OptRestriction {
    layout: RestrictionLayout,
    indices: Indices,
}

impl ElemRestrictionImpl for OptRestriction {
    fn apply(&self, tmode: TransposeMode, u: &mut dyn VectorImpl, v: &mut dyn VectorImpl) -> Result<()> {
        let guard = u.host_read()?;
        let src: &[Scalar] = &guard;
        let mut dst = v.host_write()?;
        let RestrictionLayout { elemsize, ncomp, .. } = self.layout;
        let indices: &[usize] = &self.indices;
        match tmode {
            TransposeMode::NoTranspose => {
                dst.par_chunks_mut(self.layout.elem_block()).enumerate().for_each(|(e, block)| {
                    gather_element(elemsize, ncomp, &indices[e * elemsize..(e + 1) * elemsize], src, block);
                });
            }
            TransposeMode::Transpose => scatter_add(&self.layout, indices, src, &mut dst),
        }
        Ok(())
    }
}

#[derive(Debug)]
struct OptBasis {
    data: Arc<TensorBasis>,
}

impl BasisImpl for OptBasis {
    fn apply(
        &self,
        nelem: usize,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<()> {
        let (ulen, vlen) = self.data.elem_sizes(tmode, emode)?;
        let data = &*self.data;
        v[..nelem * vlen]
            .par_chunks_mut(vlen)
            .enumerate()
            .try_for_each_init(
                || BasisScratch::new(data),
                |scratch, (e, out)| {
                    let inp = if emode == EvalMode::Weight { &[][..] } else { &u[e * ulen..(e + 1) * ulen] };
                    data.apply_element(tmode, emode, inp, out, scratch)
                },
            )
    }
}

#[derive(Debug, Default)]
struct FusedOperator;

impl OperatorImpl for FusedOperator {
    fn apply_add(
        &mut self,
        ctx: &Context,
        fields: &mut OperatorFields,
        input: &mut Vector,
        output: &mut Vector,
    ) -> Result<()> {
        fields.gather(input)?;
        fields.with_element_data(|kernel, u, qdata, v| {
            trace!(backend = ctx.backend_name(), threads = rayon::current_num_threads(), "fused element loop");
            v.par_chunks_mut(kernel.output_block())
                .enumerate()
                .try_for_each_init(
                    || kernel.workspace(),
                    |ws, (e, block)| {
                        let (ue, qe) = kernel.element_inputs(e, u, qdata);
                        kernel.apply(ue, qe, block, ws)
                    },
                )
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
            v.par_chunks_mut(kernel.output_block())
                .enumerate()
                .try_for_each_init(
                    || kernel.workspace(),
                    |ws, (e, block)| kernel.diagonal(kernel.element_qdata(e, qdata), block, ws),
                )
        })?;
        fields.scatter(diag)
    }
}

/// The threaded CPU backend.
#[derive(Debug)]
pub struct OptBackend {
    capabilities: CapabilityTable,
}

impl OptBackend {
    /// Creates the backend.
    pub fn new() -> Self {
        Self { capabilities: CapabilityTable::from_entries(HOST_CAPABILITIES) }
    }
}

impl Default for OptBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for OptBackend {
    fn name(&self) -> &str {
        "opt"
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
        Ok(Box::new(OptRestriction { layout, indices }))
    }

    fn create_basis(&self, data: Arc<TensorBasis>) -> Result<Box<dyn BasisImpl>> {
        Ok(Box::new(OptBasis { data }))
    }

    fn create_operator(&self) -> Result<Box<dyn OperatorImpl>> {
        Ok(Box::new(FusedOperator))
    }
}

/// Accepts `/cpu/self/opt`.
pub fn init(resource: &str) -> Result<Box<dyn Backend>> {
    if resource != PREFIX {
        return Err(FemError::InvalidResource { backend: "opt".to_owned(), resource: resource.to_owned() });
    }
    Ok(Box::new(OptBackend::new()))
}
