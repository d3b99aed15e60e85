//! # Built-in Backends
//!
//! Concrete implementations of the [`Backend`](crate::backend::Backend) trait,
//! plus the contraction kernel they share.
//!
//! ## Submodules
//!
//! - [`contract`]: the one-axis tensor contraction behind every basis
//! - [`cpu`]: `/cpu/self/ref`, serial reference kernels (also `/cpu/self`)
//! - [`opt`]: `/cpu/self/opt`, element loops on the `rayon` pool
//! - [`device`]: backends over a device memory space; `/gpu/emulated`
//! - [`wgpu`] *(opt-in)*: `/gpu/wgpu`, vectors in WGPU storage buffers
//! - [`cuda`] *(planned)*: `/gpu/cuda`, currently routed to the WGPU device
//!
//! ## Registration
//!
//! [`BUILTIN_BACKENDS`] lists every built-in resource prefix in registration
//! order. Entries whose cargo feature is off are kept as
//! [`Builtin::Unavailable`]: the registry logs them and moves on, so a build
//! without GPU support degrades to the CPU backends instead of failing.
//!
//! ## Feature Flags
//!
//! - `wgpu`: enables the WGPU backend
//! - `cuda`: enables the CUDA placeholder (implies `wgpu`)

pub mod contract;
pub mod cpu;
pub mod device;
pub mod opt;
#[cfg(feature = "cuda")]
pub mod cuda;
#[cfg(feature = "wgpu")]
pub mod wgpu;

use crate::registry::BackendInit;

/// Whether a built-in backend is compiled in.
#[derive(Debug, Clone, Copy)]
pub enum Builtin {
    /// Compiled in, with its initializer.
    Available(BackendInit),
    /// Compiled out; `feature` enables it.
    Unavailable {
        /// Cargo feature providing the backend.
        feature: &'static str,
    },
}

/// One row of the built-in table.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinBackend {
    /// Resource prefix.
    pub prefix: &'static str,
    /// Initializer, or the feature that would provide it.
    pub kind: Builtin,
}

#[cfg(feature = "wgpu")]
const WGPU: Builtin = Builtin::Available(wgpu::init);
#[cfg(not(feature = "wgpu"))]
const WGPU: Builtin = Builtin::Unavailable { feature: "wgpu" };

#[cfg(feature = "cuda")]
const CUDA: Builtin = Builtin::Available(cuda::init);
#[cfg(not(feature = "cuda"))]
const CUDA: Builtin = Builtin::Unavailable { feature: "cuda" };

/// Built-in backends in registration order.
pub const BUILTIN_BACKENDS: &[BuiltinBackend] = &[
    BuiltinBackend { prefix: cpu::PREFIX, kind: Builtin::Available(cpu::init) },
    BuiltinBackend { prefix: opt::PREFIX, kind: Builtin::Available(opt::init) },
    BuiltinBackend { prefix: device::EMULATED_PREFIX, kind: Builtin::Available(device::init_emulated) },
    BuiltinBackend { prefix: "/gpu/wgpu", kind: WGPU },
    BuiltinBackend { prefix: "/gpu/cuda", kind: CUDA },
];
