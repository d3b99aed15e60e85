//! Host/device storage and the vector consistency protocol.
//!
//! A vector owns (or borrows) at most two physical buffers: a host array and a
//! device array. [`SyncState`] records which of them currently hold valid data.
//!
//! # Transitions
//!
//! - `set_array(Host | Device)` makes exactly that side valid.
//! - Read access to a side copies from the other side once if only the other
//!   side is valid, then both sides are valid.
//! - Write access to a side synchronizes the same way, then only that side is
//!   valid.
//! - `set_value` fills every valid side; on an empty vector it allocates the
//!   backend's preferred side.
//! - `take_array` hands a side's buffer to the caller and resets to `None`.
//!
//! Copies only ever happen on access, never ahead of time.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use tracing::trace;

use crate::backend::VectorImpl;
use crate::error::{FemError, Result};

/// Scalar type of all numeric data.
pub type Scalar = f64;

/// Read access to host data. Dropping the guard restores the array.
pub type HostRead<'a> = MappedRwLockReadGuard<'a, [Scalar]>;

/// Write access to host data. Dropping the guard restores the array.
pub type HostWrite<'a> = MappedRwLockWriteGuard<'a, [Scalar]>;

/// Memory space of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemType {
    /// Host (CPU) memory.
    #[default]
    Host,
    /// Accelerator memory.
    Device,
}

/// How `set_array` treats the array it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CopyMode {
    /// Allocate (or reuse an owned buffer) and copy the values.
    CopyValues,
    /// Take ownership of the array.
    OwnPointer,
    /// Borrow the array; the caller keeps ownership.
    UsePointer,
}

/// Which sides of a vector hold valid data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncState {
    /// Nothing has been written yet (or the data was taken).
    #[default]
    None,
    /// Only the host array is current.
    HostValid,
    /// Only the device array is current.
    DeviceValid,
    /// Both arrays hold the same data.
    BothValid,
}

impl SyncState {
    /// Whether the given side is current.
    pub fn is_valid(self, mem: MemType) -> bool {
        matches!(
            (self, mem),
            (Self::BothValid, _) | (Self::HostValid, MemType::Host) | (Self::DeviceValid, MemType::Device)
        )
    }

    fn only(mem: MemType) -> Self {
        match mem {
            MemType::Host => Self::HostValid,
            MemType::Device => Self::DeviceValid,
        }
    }
}

/// Vector norms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NormType {
    /// Sum of absolute values.
    One,
    /// Euclidean norm.
    Two,
    /// Largest absolute value.
    Max,
}

/// Allocates `len` zeroed scalars, reporting failure instead of aborting.
pub(crate) fn alloc_zeroed(len: usize, mem: MemType) -> Result<Vec<Scalar>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| FemError::Allocation { len, mem })?;
    data.resize(len, 0.0);
    Ok(data)
}

/// Computes a norm of host data.
pub(crate) fn norm_of(data: &[Scalar], ty: NormType) -> Scalar {
    match ty {
        NormType::One => data.iter().map(|x| x.abs()).sum(),
        NormType::Two => data.iter().map(|x| x * x).sum::<Scalar>().sqrt(),
        NormType::Max => data.iter().fold(0.0, |acc: Scalar, x| acc.max(x.abs())),
    }
}

/// Replaces every entry with `|x| > EPSILON` by its reciprocal.
pub(crate) fn reciprocal_in_place(data: &mut [Scalar]) {
    for x in data.iter_mut().filter(|x| x.abs() > Scalar::EPSILON) {
        *x = 1.0 / *x;
    }
}

/// A shared host array.
///
/// Cloning the handle shares the storage, which is how `UsePointer` keeps the
/// caller's array alive and visible after a vector writes into it.
#[derive(Clone, Default)]
pub struct HostArray(Arc<RwLock<Vec<Scalar>>>);

impl HostArray {
    /// Wraps owned data.
    pub fn from_vec(data: Vec<Scalar>) -> Self {
        Self(Arc::new(RwLock::new(data)))
    }

    /// Allocates `len` zeros.
    pub fn zeros(len: usize) -> Result<Self> {
        Ok(Self::from_vec(alloc_zeroed(len, MemType::Host)?))
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocking read access.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Scalar>> {
        self.0.read()
    }

    /// Blocking write access.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Scalar>> {
        self.0.write()
    }

    /// Copies the contents out.
    pub fn to_vec(&self) -> Vec<Scalar> {
        self.0.read().clone()
    }

    /// Whether both handles share one allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Read access that fails instead of blocking when the caller still holds a guard.
    pub(crate) fn try_view(&self) -> Result<HostRead<'_>> {
        self.0
            .try_read()
            .map(|guard| RwLockReadGuard::map(guard, Vec::as_slice))
            .ok_or_else(|| FemError::Runtime("host array is locked for writing elsewhere".into()))
    }

    /// Write access that fails instead of blocking when the caller still holds a guard.
    pub(crate) fn try_view_mut(&self) -> Result<HostWrite<'_>> {
        self.0
            .try_write()
            .map(|guard| RwLockWriteGuard::map(guard, Vec::as_mut_slice))
            .ok_or_else(|| FemError::Runtime("host array is borrowed elsewhere".into()))
    }
}

impl From<Vec<Scalar>> for HostArray {
    fn from(data: Vec<Scalar>) -> Self {
        Self::from_vec(data)
    }
}

impl fmt::Debug for HostArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Some(data) => f.debug_tuple("HostArray").field(&data.len()).finish(),
            None => f.write_str("HostArray(<locked>)"),
        }
    }
}

/// Storage living in an accelerator's memory space.
///
/// Implementations are internally synchronized: transfers go through `&self`.
pub trait DeviceStorage: Send + Sync + fmt::Debug {
    /// Number of scalars.
    fn len(&self) -> usize;

    /// Whether the storage is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Host to device copy of the whole array.
    fn upload(&self, src: &[Scalar]) -> Result<()>;

    /// Device to host copy of the whole array.
    fn download(&self, dst: &mut [Scalar]) -> Result<()>;

    /// Sets every entry to `value`.
    fn fill(&self, value: Scalar) -> Result<()>;

    /// Device to device copy of the whole array.
    fn copy_from(&self, src: &dyn DeviceStorage) -> Result<()> {
        let mut staging = alloc_zeroed(src.len(), MemType::Host)?;
        src.download(&mut staging)?;
        self.upload(&staging)
    }

    /// Replaces every entry with `|x| > EPSILON` by its reciprocal.
    fn reciprocal(&self) -> Result<()> {
        let mut staging = alloc_zeroed(self.len(), MemType::Host)?;
        self.download(&mut staging)?;
        reciprocal_in_place(&mut staging);
        self.upload(&staging)
    }

    /// Downcasting hook for backend-specific fast paths.
    fn as_any(&self) -> &dyn Any;
}

/// A shared handle to device storage.
#[derive(Clone, Debug)]
pub struct DeviceArray(Arc<dyn DeviceStorage>);

impl DeviceArray {
    /// Wraps backend storage.
    pub fn new(storage: impl DeviceStorage + 'static) -> Self {
        Self(Arc::new(storage))
    }

    /// The underlying storage.
    pub fn storage(&self) -> &dyn DeviceStorage {
        &*self.0
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Host to device copy.
    pub fn upload(&self, src: &[Scalar]) -> Result<()> {
        FemError::check_len("device upload", self.len(), src.len())?;
        self.0.upload(src)
    }

    /// Device to host copy.
    pub fn download(&self, dst: &mut [Scalar]) -> Result<()> {
        FemError::check_len("device download", self.len(), dst.len())?;
        self.0.download(dst)
    }

    /// Copies the contents to a new host vector.
    pub fn to_vec(&self) -> Result<Vec<Scalar>> {
        let mut out = alloc_zeroed(self.len(), MemType::Host)?;
        self.0.download(&mut out)?;
        Ok(out)
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

/// Counts of copies between memory spaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// Host to device copies.
    pub host_to_device: u64,
    /// Device to host copies.
    pub device_to_host: u64,
    /// Device to device copies.
    pub device_to_device: u64,
}

/// Atomic transfer counters owned by a [`DeviceMemory`].
#[derive(Debug, Default)]
pub struct TransferCounters {
    host_to_device: AtomicU64,
    device_to_host: AtomicU64,
    device_to_device: AtomicU64,
}

impl TransferCounters {
    pub(crate) fn record(&self, from: MemType, to: MemType) {
        let counter = match (from, to) {
            (MemType::Host, MemType::Device) => &self.host_to_device,
            (MemType::Device, MemType::Host) => &self.device_to_host,
            (MemType::Device, MemType::Device) => &self.device_to_device,
            (MemType::Host, MemType::Host) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counts.
    pub fn snapshot(&self) -> TransferStats {
        TransferStats {
            host_to_device: self.host_to_device.load(Ordering::Relaxed),
            device_to_host: self.device_to_host.load(Ordering::Relaxed),
            device_to_device: self.device_to_device.load(Ordering::Relaxed),
        }
    }
}

/// An accelerator memory space that can allocate [`DeviceArray`]s.
pub trait DeviceMemory: Send + Sync + fmt::Debug {
    /// Allocates `len` zeroed scalars.
    fn allocate(&self, len: usize) -> Result<DeviceArray>;

    /// Transfer counters for this memory space.
    fn counters(&self) -> &TransferCounters;
}

/// An array handle passed to or returned from a vector.
#[derive(Debug, Clone)]
pub enum ArrayHandle {
    /// Host array.
    Host(HostArray),
    /// Device array.
    Device(DeviceArray),
}

impl ArrayHandle {
    /// Memory space of the handle.
    pub fn mem_type(&self) -> MemType {
        match self {
            Self::Host(_) => MemType::Host,
            Self::Device(_) => MemType::Device,
        }
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        match self {
            Self::Host(array) => array.len(),
            Self::Device(array) => array.len(),
        }
    }

    /// Whether the array is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The host array, if this is one.
    pub fn into_host(self) -> Option<HostArray> {
        match self {
            Self::Host(array) => Some(array),
            Self::Device(_) => None,
        }
    }

    /// The device array, if this is one.
    pub fn into_device(self) -> Option<DeviceArray> {
        match self {
            Self::Device(array) => Some(array),
            Self::Host(_) => None,
        }
    }
}

impl From<HostArray> for ArrayHandle {
    fn from(array: HostArray) -> Self {
        Self::Host(array)
    }
}

impl From<DeviceArray> for ArrayHandle {
    fn from(array: DeviceArray) -> Self {
        Self::Device(array)
    }
}

impl From<Vec<Scalar>> for ArrayHandle {
    fn from(data: Vec<Scalar>) -> Self {
        Self::Host(HostArray::from_vec(data))
    }
}

/// Vector storage shared by the built-in backends.
///
/// Without a device memory space only the host side exists and device
/// requests fail with `UnsupportedMemType`.
#[derive(Debug)]
pub(crate) struct MirroredArray {
    backend: String,
    len: usize,
    host: Option<HostArray>,
    host_owned: bool,
    device: Option<DeviceArray>,
    device_owned: bool,
    state: SyncState,
    memory: Option<Arc<dyn DeviceMemory>>,
}

impl MirroredArray {
    pub(crate) fn new(backend: &str, len: usize, memory: Option<Arc<dyn DeviceMemory>>) -> Self {
        Self {
            backend: backend.to_owned(),
            len,
            host: None,
            host_owned: false,
            device: None,
            device_owned: false,
            state: SyncState::None,
            memory,
        }
    }

    fn memory(&self) -> Result<&Arc<dyn DeviceMemory>> {
        self.memory.as_ref().ok_or_else(|| FemError::UnsupportedMemType {
            backend: self.backend.clone(),
            mem: MemType::Device,
        })
    }

    fn host_array(&self) -> Result<&HostArray> {
        self.host.as_ref().ok_or(FemError::NoArray(MemType::Host))
    }

    fn device_array(&self) -> Result<&DeviceArray> {
        self.device.as_ref().ok_or(FemError::NoArray(MemType::Device))
    }

    fn ensure_host(&mut self) -> Result<()> {
        if self.host.is_none() {
            self.host = Some(HostArray::zeros(self.len)?);
            self.host_owned = true;
        }
        Ok(())
    }

    fn ensure_device(&mut self) -> Result<()> {
        if self.device.is_none() {
            let array = self.memory()?.allocate(self.len)?;
            self.device = Some(array);
            self.device_owned = true;
        }
        Ok(())
    }

    fn copy_device_to_host(&self) -> Result<()> {
        let host = self.host_array()?;
        let mut dst = host.try_view_mut()?;
        self.device_array()?.download(&mut dst)?;
        self.memory()?.counters().record(MemType::Device, MemType::Host);
        trace!(len = self.len, "device -> host");
        Ok(())
    }

    fn copy_host_to_device(&self) -> Result<()> {
        let src = self.host_array()?.try_view()?;
        self.device_array()?.upload(&src)?;
        self.memory()?.counters().record(MemType::Host, MemType::Device);
        trace!(len = self.len, "host -> device");
        Ok(())
    }

    /// Makes `mem` current, copying from the other side at most once.
    fn sync(&mut self, mem: MemType) -> Result<()> {
        match mem {
            MemType::Host => {
                self.ensure_host()?;
                match self.state {
                    SyncState::DeviceValid => {
                        self.copy_device_to_host()?;
                        self.state = SyncState::BothValid;
                    }
                    SyncState::None => self.state = SyncState::HostValid,
                    SyncState::HostValid | SyncState::BothValid => {}
                }
            }
            MemType::Device => {
                self.ensure_device()?;
                match self.state {
                    SyncState::HostValid => {
                        self.copy_host_to_device()?;
                        self.state = SyncState::BothValid;
                    }
                    SyncState::None => self.state = SyncState::DeviceValid,
                    SyncState::DeviceValid | SyncState::BothValid => {}
                }
            }
        }
        Ok(())
    }

    fn set_host(&mut self, mode: CopyMode, array: HostArray) -> Result<()> {
        match mode {
            CopyMode::CopyValues => {
                let reuse = self.host_owned && self.host.as_ref().is_some_and(|h| !h.ptr_eq(&array));
                if reuse {
                    let src = array.try_view()?;
                    self.host_array()?.try_view_mut()?.copy_from_slice(&src);
                } else if !self.host.as_ref().is_some_and(|h| h.ptr_eq(&array)) {
                    let mut data = alloc_zeroed(self.len, MemType::Host)?;
                    data.copy_from_slice(&array.try_view()?);
                    self.host = Some(HostArray::from_vec(data));
                    self.host_owned = true;
                }
            }
            CopyMode::OwnPointer => {
                self.host = Some(array);
                self.host_owned = true;
            }
            CopyMode::UsePointer => {
                self.host = Some(array);
                self.host_owned = false;
            }
        }
        self.state = SyncState::HostValid;
        Ok(())
    }

    fn set_device(&mut self, mode: CopyMode, array: DeviceArray) -> Result<()> {
        self.memory()?;
        match mode {
            CopyMode::CopyValues => {
                if !self.device_owned {
                    self.device = None;
                }
                self.ensure_device()?;
                let dst = self.device_array()?;
                if !dst.ptr_eq(&array) {
                    dst.storage().copy_from(array.storage())?;
                    self.memory()?.counters().record(MemType::Device, MemType::Device);
                }
            }
            CopyMode::OwnPointer => {
                self.device = Some(array);
                self.device_owned = true;
            }
            CopyMode::UsePointer => {
                self.device = Some(array);
                self.device_owned = false;
            }
        }
        self.state = SyncState::DeviceValid;
        Ok(())
    }
}

impl VectorImpl for MirroredArray {
    fn len(&self) -> usize {
        self.len
    }

    fn sync_state(&self) -> SyncState {
        self.state
    }

    fn owns_array(&self, mem: MemType) -> bool {
        match mem {
            MemType::Host => self.host.is_some() && self.host_owned,
            MemType::Device => self.device.is_some() && self.device_owned,
        }
    }

    fn set_array(&mut self, mode: CopyMode, array: ArrayHandle) -> Result<()> {
        FemError::check_len("array length", self.len, array.len())?;
        match array {
            ArrayHandle::Host(host) => self.set_host(mode, host),
            ArrayHandle::Device(device) => self.set_device(mode, device),
        }
    }

    fn take_array(&mut self, mem: MemType) -> Result<ArrayHandle> {
        if mem == MemType::Device {
            self.memory()?;
        }
        let present = match mem {
            MemType::Host => self.host.is_some(),
            MemType::Device => self.device.is_some(),
        };
        if !present {
            return Err(FemError::NoArray(mem));
        }
        self.sync(mem)?;
        let handle = match mem {
            MemType::Host => self.host.take().map(ArrayHandle::Host),
            MemType::Device => self.device.take().map(ArrayHandle::Device),
        };
        // the other side is released too, so the vector reads back as zeros
        self.host = None;
        self.host_owned = false;
        self.device = None;
        self.device_owned = false;
        self.state = SyncState::None;
        handle.ok_or(FemError::NoArray(mem))
    }

    fn set_value(&mut self, value: Scalar) -> Result<()> {
        if self.state == SyncState::None {
            let side = if self.memory.is_some() { MemType::Device } else { MemType::Host };
            match side {
                MemType::Host => self.ensure_host()?,
                MemType::Device => self.ensure_device()?,
            }
            self.state = SyncState::only(side);
        }
        if self.state.is_valid(MemType::Host) {
            self.host_array()?.try_view_mut()?.fill(value);
        }
        if self.state.is_valid(MemType::Device) {
            self.device_array()?.storage().fill(value)?;
        }
        Ok(())
    }

    fn host_read(&mut self) -> Result<HostRead<'_>> {
        self.sync(MemType::Host)?;
        self.host_array()?.try_view()
    }

    fn host_write(&mut self) -> Result<HostWrite<'_>> {
        self.sync(MemType::Host)?;
        self.state = SyncState::HostValid;
        self.host_array()?.try_view_mut()
    }

    fn device_read(&mut self) -> Result<DeviceArray> {
        self.sync(MemType::Device)?;
        self.device_array().cloned()
    }

    fn device_write(&mut self) -> Result<DeviceArray> {
        self.sync(MemType::Device)?;
        self.state = SyncState::DeviceValid;
        self.device_array().cloned()
    }

    fn sync_array(&mut self, mem: MemType) -> Result<()> {
        self.sync(mem)
    }

    fn norm(&mut self, ty: NormType) -> Result<Scalar> {
        let data = self.host_read()?;
        Ok(norm_of(&data, ty))
    }

    fn reciprocal(&mut self) -> Result<()> {
        if self.state.is_valid(MemType::Host) {
            reciprocal_in_place(&mut self.host_array()?.try_view_mut()?);
        }
        if self.state.is_valid(MemType::Device) {
            self.device_array()?.storage().reciprocal()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_only(len: usize) -> MirroredArray {
        MirroredArray::new("test", len, None)
    }

    #[test]
    fn copy_values_then_read_returns_same_data() {
        let mut v = host_only(3);
        v.set_array(CopyMode::CopyValues, vec![1.0, 2.0, 3.0].into()).unwrap();
        assert_eq!(v.sync_state(), SyncState::HostValid);
        assert_eq!(&*v.host_read().unwrap(), &[1.0, 2.0, 3.0]);
        assert!(v.owns_array(MemType::Host));
    }

    #[test]
    fn use_pointer_writes_are_visible_to_owner() {
        let shared = HostArray::from_vec(vec![0.0; 4]);
        let mut v = host_only(4);
        v.set_array(CopyMode::UsePointer, shared.clone().into()).unwrap();
        assert!(!v.owns_array(MemType::Host));
        v.set_value(2.5).unwrap();
        drop(v);
        assert_eq!(shared.to_vec(), vec![2.5; 4]);
    }

    #[test]
    fn device_requests_fail_without_device_memory() {
        let mut v = host_only(2);
        let err = v.device_read().unwrap_err();
        assert!(matches!(err, FemError::UnsupportedMemType { mem: MemType::Device, .. }));
    }

    #[test]
    fn set_value_on_empty_host_vector_allocates_host() {
        let mut v = host_only(3);
        v.set_value(4.0).unwrap();
        assert_eq!(v.sync_state(), SyncState::HostValid);
        assert_eq!(&*v.host_read().unwrap(), &[4.0; 3]);
    }

    #[test]
    fn reciprocal_on_empty_vector_is_a_no_op() {
        let mut v = host_only(3);
        v.reciprocal().unwrap();
        assert_eq!(v.sync_state(), SyncState::None);
    }

    #[test]
    fn reciprocal_skips_near_zero_entries() {
        let mut v = host_only(3);
        v.set_array(CopyMode::CopyValues, vec![2.0, 0.0, -4.0].into()).unwrap();
        v.reciprocal().unwrap();
        assert_eq!(&*v.host_read().unwrap(), &[0.5, 0.0, -0.25]);
    }

    #[test]
    fn take_array_resets_state_and_ownership() {
        let mut v = host_only(2);
        v.set_array(CopyMode::OwnPointer, vec![7.0, 8.0].into()).unwrap();
        let taken = v.take_array(MemType::Host).unwrap().into_host().unwrap();
        assert_eq!(taken.to_vec(), vec![7.0, 8.0]);
        assert_eq!(v.sync_state(), SyncState::None);
        assert!(!v.owns_array(MemType::Host));
        assert!(matches!(v.take_array(MemType::Host), Err(FemError::NoArray(MemType::Host))));
    }

    #[test]
    fn take_array_releases_the_other_side() {
        let memory: Arc<dyn DeviceMemory> = Arc::new(crate::ops::device::EmulatedMemory::default());
        let mut v = MirroredArray::new("test", 2, Some(memory));
        v.set_array(CopyMode::CopyValues, vec![1.0, 2.0].into()).unwrap();
        v.sync(MemType::Device).unwrap();
        v.take_array(MemType::Device).unwrap();
        assert!(!v.owns_array(MemType::Host));
        assert_eq!(&*v.host_read().unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn norms() {
        let data = [3.0, -4.0];
        assert_eq!(norm_of(&data, NormType::One), 7.0);
        assert_eq!(norm_of(&data, NormType::Two), 5.0);
        assert_eq!(norm_of(&data, NormType::Max), 4.0);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let mut v = host_only(2);
        let err = v.set_array(CopyMode::CopyValues, vec![1.0].into()).unwrap_err();
        assert!(matches!(err, FemError::DimensionMismatch { expected: 2, actual: 1, .. }));
    }
}
