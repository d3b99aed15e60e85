//! CUDA backend (`/gpu/cuda`).
//!
//! Placeholder: there is no native CUDA path yet. Initialization hands the
//! resource to the WGPU device memory, which runs on NVIDIA hardware through
//! Vulkan.

use tracing::warn;

use crate::backend::Backend;
use crate::error::{FemError, Result};

/// Registry prefix of the CUDA backend.
pub const PREFIX: &str = "/gpu/cuda";

/// Accepts `/gpu/cuda`.
pub fn init(resource: &str) -> Result<Box<dyn Backend>> {
    if resource != PREFIX {
        return Err(FemError::InvalidResource { backend: "cuda".to_owned(), resource: resource.to_owned() });
    }
    // TODO: native kernels via the `cust` crate
    warn!("cuda backend falls back to wgpu device memory");
    super::wgpu::backend("cuda")
}
