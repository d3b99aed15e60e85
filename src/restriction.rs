//! Element restrictions: the map between global DOFs and element-local data.
//!
//! `NoTranspose` gathers global values into one contiguous block per element
//! (the E-vector). `Transpose` scatters element values back and **adds** them,
//! so a DOF shared by neighbouring elements receives every contribution.
//!
//! # Layouts
//!
//! - Global (L-vector): node-interlaced, component `c` of node `n` at `n * ncomp + c`.
//! - Element (E-vector): element `e` occupies `elemsize * ncomp` values,
//!   component-major, local node `i` of component `c` at
//!   `(e * ncomp + c) * elemsize + i`.
//!
//! With one component both reduce to `v[e * elemsize + i] = u[indices[e * elemsize + i]]`.

use std::ops::Deref;
use std::sync::Arc;

use tracing::debug;

use crate::backend::ElemRestrictionImpl;
use crate::context::Context;
use crate::error::{FemError, Result};
use crate::request::Request;
use crate::vector::Vector;

/// Direction of a restriction or basis application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransposeMode {
    /// Gather / interpolate.
    #[default]
    NoTranspose,
    /// Scatter-add / project.
    Transpose,
}

/// Where restriction indices come from, and who owns them afterwards.
#[derive(Debug)]
pub enum IndexSource<'a> {
    /// Copy the indices; the restriction owns the copy.
    Copy(&'a [usize]),
    /// Take ownership of the indices.
    Own(Vec<usize>),
    /// Share indices the caller keeps.
    Use(Arc<[usize]>),
}

/// Index storage held by a restriction.
#[derive(Debug, Clone)]
pub enum Indices {
    /// Owned by the restriction.
    Owned(Vec<usize>),
    /// Shared with the caller.
    Borrowed(Arc<[usize]>),
}

impl Indices {
    /// Whether the restriction owns its indices.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

impl Deref for Indices {
    type Target = [usize];

    fn deref(&self) -> &[usize] {
        match self {
            Self::Owned(indices) => indices.as_slice(),
            Self::Borrowed(indices) => &indices[..],
        }
    }
}

impl From<IndexSource<'_>> for Indices {
    fn from(source: IndexSource<'_>) -> Self {
        match source {
            IndexSource::Copy(indices) => Self::Owned(indices.to_vec()),
            IndexSource::Own(indices) => Self::Owned(indices),
            IndexSource::Use(indices) => Self::Borrowed(indices),
        }
    }
}

/// Sizes of a restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RestrictionLayout {
    /// Number of elements.
    pub nelem: usize,
    /// Nodes per element.
    pub elemsize: usize,
    /// Components per node.
    pub ncomp: usize,
    /// Length of the global vector.
    pub lsize: usize,
}

impl RestrictionLayout {
    /// Values per element in the E-vector.
    pub fn elem_block(&self) -> usize {
        self.elemsize * self.ncomp
    }

    /// Length of the E-vector.
    pub fn evec_len(&self) -> usize {
        self.nelem * self.elem_block()
    }

    /// Input and output lengths for `tmode`.
    pub fn shapes(&self, tmode: TransposeMode) -> (usize, usize) {
        match tmode {
            TransposeMode::NoTranspose => (self.lsize, self.evec_len()),
            TransposeMode::Transpose => (self.evec_len(), self.lsize),
        }
    }

    fn validate(&self, indices: &[usize]) -> Result<()> {
        if self.ncomp == 0 {
            return Err(FemError::invalid("restriction needs at least one component"));
        }
        let count = self
            .nelem
            .checked_mul(self.elemsize)
            .filter(|count| count.checked_mul(self.ncomp).is_some())
            .ok_or_else(|| {
                FemError::invalid(format!(
                    "restriction of {} elements of size {} with {} components is too large",
                    self.nelem, self.elemsize, self.ncomp
                ))
            })?;
        FemError::check_len("restriction index count", count, indices.len())?;
        for (position, &index) in indices.iter().enumerate() {
            let end = index.checked_add(1).and_then(|n| n.checked_mul(self.ncomp));
            if end.is_none_or(|end| end > self.lsize) {
                return Err(FemError::IndexOutOfRange { position, index, lsize: self.lsize });
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
struct RestrictionInner {
    ctx: Context,
    layout: RestrictionLayout,
    imp: Box<dyn ElemRestrictionImpl>,
}

/// An element restriction. Cloning shares it.
#[derive(Debug, Clone)]
pub struct ElemRestriction {
    inner: Arc<RestrictionInner>,
}

impl ElemRestriction {
    pub(crate) fn create(
        ctx: &Context,
        nelem: usize,
        elemsize: usize,
        ncomp: usize,
        lsize: usize,
        indices: IndexSource<'_>,
    ) -> Result<Self> {
        let layout = RestrictionLayout { nelem, elemsize, ncomp, lsize };
        let indices = Indices::from(indices);
        ctx.check("ElemRestriction::create", layout.validate(&indices))?;
        let imp = ctx.check(
            "ElemRestriction::create",
            ctx.backend().create_elem_restriction(layout, indices),
        )?;
        debug!(nelem, elemsize, ncomp, lsize, "created element restriction");
        Ok(Self { inner: Arc::new(RestrictionInner { ctx: ctx.clone(), layout, imp }) })
    }

    /// The context this restriction was created in.
    pub fn context(&self) -> &Context {
        &self.inner.ctx
    }

    /// Sizes of this restriction.
    pub fn layout(&self) -> RestrictionLayout {
        self.inner.layout
    }

    /// Number of elements.
    pub fn nelem(&self) -> usize {
        self.inner.layout.nelem
    }

    /// Nodes per element.
    pub fn elemsize(&self) -> usize {
        self.inner.layout.elemsize
    }

    /// Components per node.
    pub fn ncomp(&self) -> usize {
        self.inner.layout.ncomp
    }

    /// Global vector length.
    pub fn lsize(&self) -> usize {
        self.inner.layout.lsize
    }

    /// Creates a vector sized for the global side.
    pub fn create_lvector(&self) -> Result<Vector> {
        self.inner.ctx.vector(self.lsize())
    }

    /// Creates a vector sized for the element side.
    pub fn create_evector(&self) -> Result<Vector> {
        self.inner.ctx.vector(self.inner.layout.evec_len())
    }

    /// Gathers (`NoTranspose`) or scatter-adds (`Transpose`) `u` into `v`.
    ///
    /// The transpose accumulates into `v`; zero it first for a plain scatter.
    pub fn apply(
        &self,
        tmode: TransposeMode,
        u: &mut Vector,
        v: &mut Vector,
        request: &mut Request,
    ) -> Result<()> {
        let result = self.apply_raw(tmode, u, v);
        self.inner.ctx.check("ElemRestriction::apply", result)?;
        request.complete();
        Ok(())
    }

    pub(crate) fn apply_raw(&self, tmode: TransposeMode, u: &mut Vector, v: &mut Vector) -> Result<()> {
        let (ulen, vlen) = self.inner.layout.shapes(tmode);
        FemError::check_len("restriction input length", ulen, u.len())?;
        FemError::check_len("restriction output length", vlen, v.len())?;
        self.inner.imp.apply(tmode, u.imp_mut(), v.imp_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> RestrictionLayout {
        RestrictionLayout { nelem: 2, elemsize: 2, ncomp: 1, lsize: 3 }
    }

    #[test]
    fn shapes_follow_direction() {
        assert_eq!(layout().shapes(TransposeMode::NoTranspose), (3, 4));
        assert_eq!(layout().shapes(TransposeMode::Transpose), (4, 3));
    }

    #[test]
    fn validation_rejects_out_of_range_and_short_indices() {
        assert!(layout().validate(&[0, 1, 1, 2]).is_ok());
        assert!(matches!(
            layout().validate(&[0, 1, 1, 3]),
            Err(FemError::IndexOutOfRange { position: 3, index: 3, lsize: 3 })
        ));
        assert!(matches!(layout().validate(&[0, 1, 1]), Err(FemError::DimensionMismatch { .. })));
    }

    #[test]
    fn components_scale_the_global_range() {
        let two = RestrictionLayout { ncomp: 2, lsize: 6, ..layout() };
        assert!(two.validate(&[0, 1, 1, 2]).is_ok());
        let short = RestrictionLayout { lsize: 5, ..two };
        assert!(short.validate(&[0, 1, 1, 2]).is_err());
    }

    #[test]
    fn oversized_layouts_and_indices_are_errors() {
        let huge = RestrictionLayout { nelem: usize::MAX, ..layout() };
        assert!(matches!(huge.validate(&[]), Err(FemError::InvalidArgument(_))));
        let wide = RestrictionLayout { nelem: 1, elemsize: 1, ncomp: usize::MAX / 2 + 1, lsize: usize::MAX };
        assert!(wide.validate(&[1]).is_err());
        let single = RestrictionLayout { nelem: 1, elemsize: 1, ncomp: 1, lsize: 3 };
        assert!(matches!(
            single.validate(&[usize::MAX]),
            Err(FemError::IndexOutOfRange { position: 0, index: usize::MAX, lsize: 3 })
        ));
    }

    #[test]
    fn index_sources_track_ownership() {
        let shared: Arc<[usize]> = Arc::from(vec![0, 1]);
        assert!(!Indices::from(IndexSource::Use(shared)).is_owned());
        assert!(Indices::from(IndexSource::Copy(&[0, 1])).is_owned());
        assert_eq!(&*Indices::from(IndexSource::Own(vec![2, 3])), &[2, 3]);
    }
}
