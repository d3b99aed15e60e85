//! Error types and error routing.
//!
//! Every fallible call in the crate returns [`Result`]. Failures fall into four
//! categories ([`ErrorKind`]); what the user sees is decided by the
//! [`ErrorHandler`] installed on the [`Context`] the failing object belongs to.
//!
//! # Handlers
//!
//! - [`ErrorHandler::Abort`] (default): print `file:line in function(): message`
//!   to stderr and terminate the process.
//! - [`ErrorHandler::Return`]: hand the error back to the caller.
//! - [`ErrorHandler::Custom`]: run a user callback, then hand the error back.

use std::fmt;
use std::sync::Arc;

use crate::backend::ObjectKind;
use crate::context::Context;
use crate::memory::MemType;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, FemError>;

/// Errors raised by the registry, the context and every object created through it.
#[derive(Debug, thiserror::Error)]
pub enum FemError {
    /// The backend registry is at capacity.
    #[error("backend registry is full (capacity {capacity})")]
    RegistryFull {
        /// Maximum number of entries.
        capacity: usize,
    },

    /// No resource string was supplied.
    #[error("no resource provided")]
    NoResource,

    /// No registered prefix shares a leading substring with the resource.
    #[error("no suitable backend for resource: {0}")]
    NoBackendFound(String),

    /// The resolved backend refused the resource.
    #[error("{backend} backend cannot use resource: {resource}")]
    InvalidResource {
        /// Name of the backend that was resolved.
        backend: String,
        /// Requested resource.
        resource: String,
    },

    /// The backend has no storage in the requested memory space.
    #[error("{backend} backend does not support memory type {mem:?}")]
    UnsupportedMemType {
        /// Name of the backend.
        backend: String,
        /// Requested memory space.
        mem: MemType,
    },

    /// Two sizes that must agree do not.
    #[error("{what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being checked.
        what: &'static str,
        /// Required size.
        expected: usize,
        /// Provided size.
        actual: usize,
    },

    /// A restriction index points outside the global vector.
    #[error("restriction index {index} at position {position} exceeds global length {lsize}")]
    IndexOutOfRange {
        /// Position in the index array.
        position: usize,
        /// Offending index.
        index: usize,
        /// Global vector length.
        lsize: usize,
    },

    /// A construction parameter is invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A host or device allocation failed.
    #[error("failed to allocate {len} scalars on {mem:?}")]
    Allocation {
        /// Requested number of scalars.
        len: usize,
        /// Memory space.
        mem: MemType,
    },

    /// The backend has no implementation for the requested capability.
    #[error("backend does not implement {kind}::{op}")]
    UnsupportedOperation {
        /// Object kind.
        kind: ObjectKind,
        /// Operation name.
        op: &'static str,
    },

    /// A vector holds no buffer on the requested side.
    #[error("vector has no {0:?} array")]
    NoArray(MemType),

    /// A device copy or launch failed.
    #[error("device error: {0}")]
    Device(String),

    /// Generic runtime failure.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The user-supplied pointwise function failed.
    #[error("qfunction failed: {0}")]
    QFunction(String),
}

/// The four user-facing error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Bad or absent resource, unsupported memory type, full registry, bad sizes.
    Configuration = 1,
    /// Host or device allocation failure.
    Allocation = 2,
    /// Missing backend capability.
    UnsupportedOperation = 3,
    /// Copy or launch failure on a device, or a failing user function.
    Runtime = 4,
}

impl FemError {
    /// Builds an [`FemError::UnsupportedOperation`].
    pub fn unsupported(kind: ObjectKind, op: &'static str) -> Self {
        Self::UnsupportedOperation { kind, op }
    }

    /// Builds a [`FemError::QFunction`] from a message.
    pub fn qfunction(msg: impl Into<String>) -> Self {
        Self::QFunction(msg.into())
    }

    /// Builds a [`FemError::InvalidArgument`] from a message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Returns `Err(DimensionMismatch)` unless `actual == expected`.
    pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch { what, expected, actual })
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RegistryFull { .. }
            | Self::NoResource
            | Self::NoBackendFound(_)
            | Self::InvalidResource { .. }
            | Self::UnsupportedMemType { .. }
            | Self::DimensionMismatch { .. }
            | Self::IndexOutOfRange { .. }
            | Self::InvalidArgument(_) => ErrorKind::Configuration,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Self::NoArray(_) | Self::Device(_) | Self::Runtime(_) | Self::QFunction(_) => {
                ErrorKind::Runtime
            }
        }
    }

    /// Non-zero status code of this error's category.
    pub fn code(&self) -> i32 {
        self.kind() as i32
    }
}

/// Everything an error handler gets to see about one failure.
#[derive(Debug, Clone)]
pub struct ErrorReport<'a> {
    /// Source file of the failing call.
    pub file: &'a str,
    /// Source line of the failing call.
    pub line: u32,
    /// Public operation that failed, e.g. `Vector::set_array`.
    pub function: &'a str,
    /// Status code, see [`FemError::code`].
    pub code: i32,
    /// Formatted message.
    pub message: String,
}

impl fmt::Display for ErrorReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} in {}(): {}", self.file, self.line, self.function, self.message)
    }
}

/// User callback signature for [`ErrorHandler::Custom`].
pub type ErrorCallback = dyn Fn(&Context, &ErrorReport<'_>) + Send + Sync;

/// Policy applied to every failure reported through a [`Context`].
#[derive(Clone, Default)]
pub enum ErrorHandler {
    /// Print the diagnostic and abort the process.
    #[default]
    Abort,
    /// Return the error to the caller.
    Return,
    /// Invoke a callback, then return the error to the caller.
    Custom(Arc<ErrorCallback>),
}

impl ErrorHandler {
    /// Wraps a closure as a [`ErrorHandler::Custom`] handler.
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Context, &ErrorReport<'_>) + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("Abort"),
            Self::Return => f.write_str("Return"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
