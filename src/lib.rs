//! # `briny_fem`
//!
//! A device-abstracted engine for matrix-free finite and spectral element
//! operators. Given a global degree-of-freedom vector it computes the action of
//! a discretized weak form by looping over elements: values are gathered per
//! element, taken to quadrature points with tensor-product bases, handed to a
//! user-supplied pointwise function, and projected and summed back.
//!
//! The same operator description runs unmodified on every backend; the backend
//! is picked at runtime from a resource string such as `/cpu/self` or
//! `/gpu/wgpu`.
//!
//! ## Features
//!
//! - **Backends**: longest-prefix resolution of resource strings, per-object
//!   capability tables, graceful stand-ins for backends compiled out
//! - **Vectors**: host/device buffers kept consistent lazily, never copied
//!   speculatively
//! - **Restrictions**: index gather and additive scatter between global and
//!   element layouts
//! - **Bases**: tensor-product H1 bases evaluated one axis at a time
//! - **Operators**: restriction, basis, pointwise function and their transposes
//!   composed into one `apply`
//! - **Parallelism**: optional `rayon` element loops (`/cpu/self/opt`) and
//!   `wgpu` device memory
//!
//! ## Modules
//!
//! - [`context`]: backend selection and object construction
//! - [`registry`]: resource prefixes and backend initializers
//! - [`backend`]: the traits a backend implements
//! - [`memory`] and [`vector`]: storage and the consistency protocol
//! - [`restriction`], [`basis`], [`qfunction`], [`operator`]: the operator pipeline
//! - [`ops`]: built-in backends
//!
//! ## Example
//!
//! ```rust
//! use briny_fem::prelude::*;
//!
//! let ctx = Context::init("/cpu/self").unwrap();
//! let r = ctx.elem_restriction(2, 2, 1, 3, IndexSource::Copy(&[0, 1, 1, 2])).unwrap();
//! let b = ctx.basis_tensor_h1_lagrange(1, 1, 2, 2, QuadMode::GaussLobatto).unwrap();
//! let mut qf = ctx.q_function_interior(|_, inputs, outputs| {
//!     outputs[0].copy_from_slice(inputs[0]);
//!     Ok(())
//! });
//! qf.add_input("u", 1, EvalMode::Interp).unwrap();
//! qf.add_output("v", 1, EvalMode::Interp).unwrap();
//!
//! let mut op = ctx.operator(&qf, &r, &b).unwrap();
//! let mut x = ctx.vector_from_slice(&[1.0, 2.0, 3.0]).unwrap();
//! let mut y = ctx.vector(3).unwrap();
//! op.apply(&mut x, &mut y, &mut Request::Immediate).unwrap();
//! assert_eq!(y.to_vec().unwrap(), vec![1.0, 4.0, 3.0]);
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::many_single_char_names,
    clippy::cast_possible_truncation,
    clippy::similar_names,
    clippy::cast_precision_loss,
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::new_without_default
)]
#![deny(unsafe_code)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]

pub mod backend;
pub mod basis;
pub mod context;
pub mod error;
pub mod memory;
pub mod operator;
pub mod ops;
pub mod qfunction;
pub mod quadrature;
pub mod registry;
pub mod request;
pub mod restriction;
pub mod vector;

/// Commonly used types.
pub mod prelude {
    pub use crate::backend::ObjectKind;
    pub use crate::basis::{Basis, EvalMode, QuadMode};
    pub use crate::context::Context;
    pub use crate::error::{ErrorHandler, FemError, Result};
    pub use crate::memory::{
        ArrayHandle, CopyMode, DeviceArray, HostArray, MemType, NormType, Scalar, SyncState,
    };
    pub use crate::operator::Operator;
    pub use crate::qfunction::QFunction;
    pub use crate::request::Request;
    pub use crate::restriction::{ElemRestriction, IndexSource, TransposeMode};
    pub use crate::vector::Vector;
}
