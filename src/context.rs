//! The library context.
//!
//! A [`Context`] binds one backend, resolved from a resource string, and the
//! error handler that decides what happens when an operation fails. All
//! vectors, restrictions, bases, qfunctions and operators are created through
//! a context and keep a handle to it for error reporting.
//!
//! # Example
//!
//! ```rust
//! use briny_fem::prelude::*;
//!
//! let ctx = Context::init("/cpu/self").unwrap();
//! ctx.set_error_handler(ErrorHandler::Return);
//! let mut x = ctx.vector_from_slice(&[1.0, 2.0, 3.0]).unwrap();
//! assert_eq!(x.norm(NormType::One).unwrap(), 6.0);
//! ```

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{error, info};

use crate::backend::{Backend, CapabilityTable, ObjectKind};
use crate::basis::{Basis, QuadMode};
use crate::error::{ErrorHandler, ErrorReport, FemError, Result};
use crate::memory::{MemType, Scalar, TransferStats};
use crate::operator::Operator;
use crate::qfunction::QFunction;
use crate::registry::{Registry, RegistryEntry, resolve_backend};
use crate::restriction::{ElemRestriction, IndexSource};
use crate::vector::Vector;

/// Environment variable read by [`Context::from_env`].
pub const RESOURCE_ENV: &str = "BRINY_FEM_RESOURCE";

/// Resource used by [`Context::from_env`] when the variable is unset.
pub const DEFAULT_RESOURCE: &str = "/cpu/self";

struct ContextInner {
    resource: String,
    backend: Box<dyn Backend>,
    handler: RwLock<ErrorHandler>,
}

/// A handle to an initialized backend. Cloning shares the context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Initializes a context for `resource` from the process-scoped registry.
    pub fn init(resource: &str) -> Result<Self> {
        let entry = resolve_backend(resource).inspect_err(|err| error!(%err, resource, "init failed"))?;
        Self::from_entry(&entry, resource)
    }

    /// Initializes a context for `resource` from an explicit registry.
    pub fn init_with(registry: &Registry, resource: &str) -> Result<Self> {
        let entry = registry.resolve(resource).inspect_err(|err| error!(%err, resource, "init failed"))?;
        Self::from_entry(entry, resource)
    }

    /// Initializes a context for the resource named by `BRINY_FEM_RESOURCE`,
    /// or `/cpu/self` when it is unset.
    pub fn from_env() -> Result<Self> {
        let resource = std::env::var(RESOURCE_ENV).unwrap_or_else(|_| DEFAULT_RESOURCE.to_owned());
        Self::init(&resource)
    }

    fn from_entry(entry: &RegistryEntry, resource: &str) -> Result<Self> {
        let backend = entry.init(resource).inspect_err(|err| error!(%err, resource, "backend init failed"))?;
        info!(resource, prefix = entry.prefix(), backend = backend.name(), "initialized context");
        Ok(Self {
            inner: Arc::new(ContextInner {
                resource: resource.to_owned(),
                backend,
                handler: RwLock::new(ErrorHandler::default()),
            }),
        })
    }

    /// The resource this context was initialized for.
    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    /// Name of the selected backend.
    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    /// Memory space a vector allocates when first written without an array.
    pub fn preferred_mem_type(&self) -> MemType {
        self.inner.backend.preferred_mem_type()
    }

    /// The backend's capability table.
    pub fn capabilities(&self) -> &CapabilityTable {
        self.inner.backend.capabilities()
    }

    /// Whether the backend implements `kind::op`.
    pub fn supports(&self, kind: ObjectKind, op: &str) -> bool {
        self.capabilities().supports(kind, op)
    }

    /// Host/device copy counts, for backends with device memory.
    pub fn transfer_stats(&self) -> Option<TransferStats> {
        self.inner.backend.transfer_stats()
    }

    /// Replaces the error handler.
    pub fn set_error_handler(&self, handler: ErrorHandler) {
        *self.inner.handler.write() = handler;
    }

    /// The current error handler.
    pub fn error_handler(&self) -> ErrorHandler {
        self.inner.handler.read().clone()
    }

    /// Whether two handles refer to the same context.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn backend(&self) -> &dyn Backend {
        &*self.inner.backend
    }

    /// Routes a failed result through the error handler.
    #[track_caller]
    pub(crate) fn check<T>(&self, function: &'static str, result: Result<T>) -> Result<T> {
        result.map_err(|err| self.report(function, err, Location::caller()))
    }

    fn report(&self, function: &str, err: FemError, location: &Location<'_>) -> FemError {
        let report = ErrorReport {
            file: location.file(),
            line: location.line(),
            function,
            code: err.code(),
            message: err.to_string(),
        };
        error!(code = report.code, "{report}");
        let handler = self.error_handler();
        match handler {
            ErrorHandler::Abort => {
                eprintln!("{report}");
                std::process::abort();
            }
            ErrorHandler::Return => err,
            ErrorHandler::Custom(callback) => {
                callback(self, &report);
                err
            }
        }
    }

    /// Creates a vector of `len` scalars with no data yet.
    pub fn vector(&self, len: usize) -> Result<Vector> {
        Vector::create(self, len)
    }

    /// Creates a vector holding a copy of `data`.
    pub fn vector_from_slice(&self, data: &[Scalar]) -> Result<Vector> {
        Vector::from_slice(self, data)
    }

    /// Creates an element restriction.
    ///
    /// `indices` holds `nelem * elemsize` node numbers; node `n` component `c`
    /// lives at `n * ncomp + c` in a global vector of length `lsize`.
    pub fn elem_restriction(
        &self,
        nelem: usize,
        elemsize: usize,
        ncomp: usize,
        lsize: usize,
        indices: IndexSource<'_>,
    ) -> Result<ElemRestriction> {
        ElemRestriction::create(self, nelem, elemsize, ncomp, lsize, indices)
    }

    /// Creates a tensor-product H1 basis from 1-D matrices.
    ///
    /// `interp1d` and `grad1d` are `q x p`, row-major.
    #[allow(clippy::too_many_arguments)]
    pub fn basis_tensor_h1(
        &self,
        dim: usize,
        ncomp: usize,
        p: usize,
        q: usize,
        interp1d: &[Scalar],
        grad1d: &[Scalar],
        qref1d: &[Scalar],
        qweight1d: &[Scalar],
    ) -> Result<Basis> {
        Basis::tensor_h1(self, dim, ncomp, p, q, interp1d, grad1d, qref1d, qweight1d)
    }

    /// Creates a Lagrange basis on Gauss-Lobatto nodes.
    pub fn basis_tensor_h1_lagrange(
        &self,
        dim: usize,
        ncomp: usize,
        p: usize,
        q: usize,
        qmode: QuadMode,
    ) -> Result<Basis> {
        Basis::tensor_h1_lagrange(self, dim, ncomp, p, q, qmode)
    }

    /// Wraps a pointwise function evaluated at quadrature points.
    pub fn q_function_interior<F>(&self, user: F) -> QFunction
    where
        F: Fn(usize, &[&[Scalar]], &mut [&mut [Scalar]]) -> Result<()> + Send + Sync + 'static,
    {
        QFunction::new(self, user)
    }

    /// Composes a restriction, a basis and a qfunction into an operator.
    pub fn operator(
        &self,
        qf: &QFunction,
        restriction: &ElemRestriction,
        basis: &Basis,
    ) -> Result<Operator> {
        Operator::create(self, qf, restriction, basis)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("resource", &self.inner.resource)
            .field("backend", &self.inner.backend.name())
            .field("handler", &*self.inner.handler.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn cpu_self_resolves_to_reference_backend() {
        let ctx = Context::init("/cpu/self").unwrap();
        assert_eq!(ctx.backend_name(), "ref");
        assert_eq!(ctx.resource(), "/cpu/self");
        assert_eq!(ctx.preferred_mem_type(), MemType::Host);
        assert!(ctx.supports(ObjectKind::Vector, "SetArray"));
    }

    #[test]
    fn custom_handler_sees_location_and_code() {
        let ctx = Context::init("/cpu/self/ref").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        ctx.set_error_handler(ErrorHandler::custom(move |_, report| {
            sink.lock().unwrap().push((report.function.to_owned(), report.code, report.line > 0));
        }));
        let err = ctx.check::<()>("Test::fail", Err(FemError::NoResource)).unwrap_err();
        assert!(matches!(err, FemError::NoResource));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("Test::fail".to_owned(), 1, true)]);
    }

    #[test]
    fn clones_share_the_handler() {
        let ctx = Context::init("/cpu/self").unwrap();
        let other = ctx.clone();
        other.set_error_handler(ErrorHandler::Return);
        assert!(matches!(ctx.error_handler(), ErrorHandler::Return));
        assert!(ctx.ptr_eq(&other));
    }
}
