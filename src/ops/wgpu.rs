//! WebGPU device memory (`/gpu/wgpu`).
//!
//! Device arrays are `wgpu` storage buffers holding little-endian `f64`s.
//! Transfers use the usual WebGPU pattern:
//!
//! - upload: `Queue::write_buffer`
//! - download: copy into a `MAP_READ` staging buffer, map it, wait on the device
//! - device to device: `copy_buffer_to_buffer` inside one submission
//!
//! The adapter and device are requested once per process and shared by every
//! context on this backend. WGSL has no portable `f64`, so compute stays on the
//! host mirror ([`DeviceBackend`]); only storage and transfers live on the GPU.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, mpsc};

use lazy_static::lazy_static;
use tracing::{info, trace};

use crate::backend::Backend;
use crate::error::{FemError, Result};
use crate::memory::{DeviceArray, DeviceMemory, DeviceStorage, Scalar, TransferCounters};

use super::device::DeviceBackend;

/// Registry prefix of the WebGPU backend.
pub const PREFIX: &str = "/gpu/wgpu";

const SCALAR_BYTES: u64 = std::mem::size_of::<Scalar>() as u64;

/// The WGPU device and queue shared by all buffers.
#[derive(Debug)]
pub struct GpuContext {
    /// The GPU device.
    pub device: wgpu::Device,
    /// Its submission queue.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Selects the default adapter and creates a device and queue.
    ///
    /// Blocks on the async WGPU calls with `pollster`.
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .map_err(|e| FemError::Device(format!("adapter request failed: {e}")))?;
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("briny_fem"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|e| FemError::Device(format!("device request failed: {e}")))?;
        info!(adapter = ?adapter.get_info().name, "initialized wgpu device");
        Ok(Self { device, queue })
    }

    fn wait(&self) -> Result<()> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map(|_| ())
            .map_err(|e| FemError::Device(format!("device poll failed: {e}")))
    }
}

lazy_static! {
    static ref GPU_CONTEXT: std::result::Result<Arc<GpuContext>, String> =
        GpuContext::new().map(Arc::new).map_err(|e| e.to_string());
}

/// The process-wide GPU context, created on first use.
pub fn shared_context() -> Result<Arc<GpuContext>> {
    GPU_CONTEXT.as_ref().map(Arc::clone).map_err(|e| FemError::Device(e.clone()))
}

/// Storage buffers on a WGPU device.
#[derive(Debug)]
pub struct WgpuMemory {
    gpu: Arc<GpuContext>,
    counters: TransferCounters,
}

impl WgpuMemory {
    /// Allocates from `gpu`.
    pub fn new(gpu: Arc<GpuContext>) -> Self {
        Self { gpu, counters: TransferCounters::default() }
    }
}

impl DeviceMemory for WgpuMemory {
    fn allocate(&self, len: usize) -> Result<DeviceArray> {
        let size = (len as u64 * SCALAR_BYTES).max(SCALAR_BYTES);
        if size > self.gpu.device.limits().max_buffer_size {
            return Err(FemError::Allocation { len, mem: crate::memory::MemType::Device });
        }
        // wgpu zero-initializes new buffers
        let buffer = self.gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fem_vector"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        trace!(len, "allocated wgpu buffer");
        Ok(DeviceArray::new(WgpuStorage { gpu: Arc::clone(&self.gpu), buffer, len }))
    }

    fn counters(&self) -> &TransferCounters {
        &self.counters
    }
}

/// One storage buffer.
pub struct WgpuStorage {
    gpu: Arc<GpuContext>,
    buffer: wgpu::Buffer,
    len: usize,
}

impl WgpuStorage {
    fn bytes(&self) -> u64 {
        self.len as u64 * SCALAR_BYTES
    }
}

impl fmt::Debug for WgpuStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgpuStorage").field("len", &self.len).finish_non_exhaustive()
    }
}

impl DeviceStorage for WgpuStorage {
    fn len(&self) -> usize {
        self.len
    }

    fn upload(&self, src: &[Scalar]) -> Result<()> {
        if self.len == 0 {
            return Ok(());
        }
        self.gpu.queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(src));
        self.gpu.queue.submit(None);
        Ok(())
    }

    fn download(&self, dst: &mut [Scalar]) -> Result<()> {
        if self.len == 0 {
            return Ok(());
        }
        let device = &self.gpu.device;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging"),
            size: self.bytes(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("download") });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, self.bytes());
        self.gpu.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.gpu.wait()?;
        rx.recv()
            .map_err(|_| FemError::Device("staging map callback dropped".into()))?
            .map_err(|e| FemError::Device(format!("staging map failed: {e}")))?;

        let data = slice.get_mapped_range();
        for (out, bytes) in dst.iter_mut().zip(data.chunks_exact(SCALAR_BYTES as usize)) {
            *out = bytemuck::pod_read_unaligned(bytes);
        }
        drop(data);
        staging.unmap();
        Ok(())
    }

    fn fill(&self, value: Scalar) -> Result<()> {
        if value == 0.0 {
            let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("fill") });
            encoder.clear_buffer(&self.buffer, 0, None);
            self.gpu.queue.submit(Some(encoder.finish()));
            return Ok(());
        }
        self.upload(&vec![value; self.len])
    }

    fn copy_from(&self, src: &dyn DeviceStorage) -> Result<()> {
        let Some(src) = src.as_any().downcast_ref::<Self>() else {
            return Err(FemError::Device("cannot copy between different device memory spaces".into()));
        };
        if self.len == 0 {
            return Ok(());
        }
        let mut encoder = self.gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("copy") });
        encoder.copy_buffer_to_buffer(&src.buffer, 0, &self.buffer, 0, self.bytes());
        self.gpu.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Creates a device backend on the shared WGPU device.
pub(crate) fn backend(name: &'static str) -> Result<Box<dyn Backend>> {
    let gpu = shared_context()?;
    Ok(Box::new(DeviceBackend::new(name, Arc::new(WgpuMemory::new(gpu)))))
}

/// Accepts `/gpu/wgpu`.
pub fn init(resource: &str) -> Result<Box<dyn Backend>> {
    if resource != PREFIX {
        return Err(FemError::InvalidResource { backend: "wgpu".to_owned(), resource: resource.to_owned() });
    }
    backend("wgpu")
}
