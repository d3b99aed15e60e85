//! Backend interface.
//!
//! A backend is chosen once, when a [`Context`] is initialized for a resource.
//! From then on every object created through that context carries the
//! backend's implementation of its operations:
//!
//! - [`VectorImpl`] for [`Vector`](crate::vector::Vector)
//! - [`ElemRestrictionImpl`] for [`ElemRestriction`](crate::restriction::ElemRestriction)
//! - [`BasisImpl`] for [`Basis`](crate::basis::Basis)
//! - [`OperatorImpl`] for [`Operator`](crate::operator::Operator)
//!
//! Every operation has a default body that fails with
//! [`FemError::UnsupportedOperation`], so a backend only implements what it
//! actually supports and anything else reports failure instead of crashing.
//! The [`CapabilityTable`] a backend publishes lists the same operations as data
//! so callers can inspect them before trying.

use std::fmt;
use std::sync::Arc;

use crate::basis::{EvalMode, TensorBasis};
use crate::context::Context;
use crate::error::{FemError, Result};
use crate::memory::{
    ArrayHandle, CopyMode, DeviceArray, HostRead, HostWrite, MemType, NormType, Scalar, SyncState,
    TransferStats,
};
use crate::operator::OperatorFields;
use crate::restriction::{Indices, RestrictionLayout, TransposeMode};
use crate::vector::Vector;

/// Kinds of objects a backend provides implementations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// The context itself.
    Context,
    /// Numeric vectors.
    Vector,
    /// Element restrictions.
    ElemRestriction,
    /// Tensor-product bases.
    Basis,
    /// Pointwise functions.
    QFunction,
    /// Composed operators.
    Operator,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Context => "Context",
            Self::Vector => "Vector",
            Self::ElemRestriction => "ElemRestriction",
            Self::Basis => "Basis",
            Self::QFunction => "QFunction",
            Self::Operator => "Operator",
        };
        f.pad(name)
    }
}

/// The `(object kind, operation)` pairs a backend implements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityTable {
    entries: Vec<(ObjectKind, &'static str)>,
}

impl CapabilityTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from static data.
    pub fn from_entries(entries: &[(ObjectKind, &'static str)]) -> Self {
        let mut table = Self::new();
        for &(kind, op) in entries {
            table.set(kind, op);
        }
        table
    }

    /// Records that `kind::op` is implemented.
    pub fn set(&mut self, kind: ObjectKind, op: &'static str) {
        if !self.supports(kind, op) {
            self.entries.push((kind, op));
        }
    }

    /// Whether `kind::op` is implemented.
    pub fn supports(&self, kind: ObjectKind, op: &str) -> bool {
        self.entries.iter().any(|&(k, o)| k == kind && o == op)
    }

    /// Operations implemented for one object kind, in registration order.
    pub fn operations(&self, kind: ObjectKind) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().filter(move |(k, _)| *k == kind).map(|&(_, op)| op)
    }

    /// All entries.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectKind, &'static str)> + '_ {
        self.entries.iter().copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Backend side of a [`Vector`].
#[allow(unused_variables)]
pub trait VectorImpl: Send + fmt::Debug {
    /// Number of scalars.
    fn len(&self) -> usize;

    /// Whether the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Which sides currently hold valid data.
    fn sync_state(&self) -> SyncState;

    /// Whether the vector owns its buffer on `mem`.
    fn owns_array(&self, mem: MemType) -> bool;

    /// Installs an array; the handle's memory space selects the side.
    fn set_array(&mut self, mode: CopyMode, array: ArrayHandle) -> Result<()> {
        Err(FemError::unsupported(ObjectKind::Vector, "SetArray"))
    }

    /// Hands the buffer on `mem` to the caller.
    fn take_array(&mut self, mem: MemType) -> Result<ArrayHandle> {
        Err(FemError::unsupported(ObjectKind::Vector, "TakeArray"))
    }

    /// Fills every valid side with `value`.
    fn set_value(&mut self, value: Scalar) -> Result<()> {
        Err(FemError::unsupported(ObjectKind::Vector, "SetValue"))
    }

    /// Synchronized read access to the host side.
    fn host_read(&mut self) -> Result<HostRead<'_>> {
        Err(FemError::unsupported(ObjectKind::Vector, "GetArrayRead"))
    }

    /// Synchronized write access to the host side.
    fn host_write(&mut self) -> Result<HostWrite<'_>> {
        Err(FemError::unsupported(ObjectKind::Vector, "GetArray"))
    }

    /// Synchronized read access to the device side.
    fn device_read(&mut self) -> Result<DeviceArray> {
        Err(FemError::unsupported(ObjectKind::Vector, "GetArrayRead"))
    }

    /// Synchronized write access to the device side.
    fn device_write(&mut self) -> Result<DeviceArray> {
        Err(FemError::unsupported(ObjectKind::Vector, "GetArray"))
    }

    /// Makes `mem` current without handing out access.
    fn sync_array(&mut self, mem: MemType) -> Result<()> {
        Err(FemError::unsupported(ObjectKind::Vector, "SyncArray"))
    }

    /// Computes a norm.
    fn norm(&mut self, ty: NormType) -> Result<Scalar> {
        Err(FemError::unsupported(ObjectKind::Vector, "Norm"))
    }

    /// Inverts every entry that is not numerically zero.
    fn reciprocal(&mut self) -> Result<()> {
        Err(FemError::unsupported(ObjectKind::Vector, "Reciprocal"))
    }
}

/// Backend side of an [`ElemRestriction`](crate::restriction::ElemRestriction).
#[allow(unused_variables)]
pub trait ElemRestrictionImpl: Send + Sync + fmt::Debug {
    /// Gathers (`NoTranspose`) or scatter-adds (`Transpose`) `u` into `v`.
    fn apply(
        &self,
        tmode: TransposeMode,
        u: &mut dyn VectorImpl,
        v: &mut dyn VectorImpl,
    ) -> Result<()> {
        Err(FemError::unsupported(ObjectKind::ElemRestriction, "Apply"))
    }
}

/// Backend side of a [`Basis`](crate::basis::Basis).
#[allow(unused_variables)]
pub trait BasisImpl: Send + Sync + fmt::Debug {
    /// Applies the basis to `nelem` consecutive element blocks.
    fn apply(
        &self,
        nelem: usize,
        tmode: TransposeMode,
        emode: EvalMode,
        u: &[Scalar],
        v: &mut [Scalar],
    ) -> Result<()> {
        Err(FemError::unsupported(ObjectKind::Basis, "Apply"))
    }
}

/// Backend side of an [`Operator`](crate::operator::Operator).
#[allow(unused_variables)]
pub trait OperatorImpl: Send + fmt::Debug {
    /// Adds the operator's action on `input` to `output`.
    fn apply_add(
        &mut self,
        ctx: &Context,
        fields: &mut OperatorFields,
        input: &mut Vector,
        output: &mut Vector,
    ) -> Result<()> {
        Err(FemError::unsupported(ObjectKind::Operator, "Apply"))
    }

    /// Adds the diagonal of the assembled operator to `diag`.
    fn linear_assemble_diagonal(
        &mut self,
        ctx: &Context,
        fields: &mut OperatorFields,
        diag: &mut Vector,
    ) -> Result<()> {
        Err(FemError::unsupported(ObjectKind::Operator, "LinearAssembleDiagonal"))
    }
}

/// A compute backend.
///
/// Object constructors default to `UnsupportedOperation`.
#[allow(unused_variables)]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Operations this backend implements.
    fn capabilities(&self) -> &CapabilityTable;

    /// Side allocated when an empty vector is first written.
    fn preferred_mem_type(&self) -> MemType {
        MemType::Host
    }

    /// Host/device copy counts, for backends with device memory.
    fn transfer_stats(&self) -> Option<TransferStats> {
        None
    }

    /// Creates the storage of a vector with `len` scalars.
    fn create_vector(&self, len: usize) -> Result<Box<dyn VectorImpl>> {
        Err(FemError::unsupported(ObjectKind::Vector, "Create"))
    }

    /// Creates an element restriction over validated indices.
    fn create_elem_restriction(
        &self,
        layout: RestrictionLayout,
        indices: Indices,
    ) -> Result<Box<dyn ElemRestrictionImpl>> {
        Err(FemError::unsupported(ObjectKind::ElemRestriction, "Create"))
    }

    /// Creates the kernels of a tensor-product basis.
    fn create_basis(&self, data: Arc<TensorBasis>) -> Result<Box<dyn BasisImpl>> {
        Err(FemError::unsupported(ObjectKind::Basis, "Create"))
    }

    /// Creates the apply implementation of an operator.
    fn create_operator(&self) -> Result<Box<dyn OperatorImpl>> {
        Err(FemError::unsupported(ObjectKind::Operator, "Create"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_table_deduplicates_and_filters() {
        let mut table = CapabilityTable::from_entries(&[
            (ObjectKind::Vector, "SetArray"),
            (ObjectKind::Vector, "Norm"),
            (ObjectKind::Basis, "Apply"),
        ]);
        table.set(ObjectKind::Vector, "Norm");
        assert_eq!(table.len(), 3);
        assert!(table.supports(ObjectKind::Basis, "Apply"));
        assert!(!table.supports(ObjectKind::Operator, "Apply"));
        let ops: Vec<_> = table.operations(ObjectKind::Vector).collect();
        assert_eq!(ops, ["SetArray", "Norm"]);
    }

    #[derive(Debug)]
    struct Bare;

    impl BasisImpl for Bare {}

    #[test]
    fn missing_operations_report_unsupported() {
        let mut v = [0.0; 1];
        let err = Bare.apply(1, TransposeMode::NoTranspose, EvalMode::Interp, &[1.0], &mut v).unwrap_err();
        assert!(matches!(
            err,
            FemError::UnsupportedOperation { kind: ObjectKind::Basis, op: "Apply" }
        ));
        assert_eq!(err.to_string(), "backend does not implement Basis::Apply");
    }
}
