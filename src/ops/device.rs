//! Accelerator-style backends.
//!
//! A [`DeviceBackend`] pairs the host kernels with a [`DeviceMemory`]. Its
//! vectors keep a device array next to the host array and prefer the device
//! side, so a freshly written vector lives on the device until something needs
//! it on the host. Compute kernels run on the host mirror; every copy they
//! trigger goes through the consistency protocol and is counted.
//!
//! `/gpu/emulated` backs the device side with plain host memory behind a lock.
//! It behaves like a discrete device (separate storage, explicit copies) and
//! needs no hardware, which makes the transfer rules testable anywhere.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::backend::{Backend, BasisImpl, CapabilityTable, ElemRestrictionImpl, OperatorImpl, VectorImpl};
use crate::basis::TensorBasis;
use crate::error::{FemError, Result};
use crate::memory::{
    DeviceArray, DeviceMemory, DeviceStorage, MemType, MirroredArray, Scalar, TransferCounters,
    TransferStats, alloc_zeroed, reciprocal_in_place,
};
use crate::restriction::{Indices, RestrictionLayout};

use super::cpu::{HOST_CAPABILITIES, RefBasis, RefOperator, RefRestriction};

/// Registry prefix of the emulated device backend.
pub const EMULATED_PREFIX: &str = "/gpu/emulated";

/// A backend whose vectors mirror data into a device memory space.
#[derive(Debug)]
pub struct DeviceBackend {
    name: &'static str,
    capabilities: CapabilityTable,
    memory: Arc<dyn DeviceMemory>,
}

impl DeviceBackend {
    /// Creates a backend over `memory`.
    pub fn new(name: &'static str, memory: Arc<dyn DeviceMemory>) -> Self {
        Self { name, capabilities: CapabilityTable::from_entries(HOST_CAPABILITIES), memory }
    }

    /// The device memory space.
    pub fn memory(&self) -> &Arc<dyn DeviceMemory> {
        &self.memory
    }
}

impl Backend for DeviceBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    fn preferred_mem_type(&self) -> MemType {
        MemType::Device
    }

    fn transfer_stats(&self) -> Option<TransferStats> {
        Some(self.memory.counters().snapshot())
    }

    fn create_vector(&self, len: usize) -> Result<Box<dyn VectorImpl>> {
        Ok(Box::new(MirroredArray::new(self.name, len, Some(Arc::clone(&self.memory)))))
    }

    fn create_elem_restriction(
        &self,
        layout: RestrictionLayout,
        indices: Indices,
    ) -> Result<Box<dyn ElemRestrictionImpl>> {
        Ok(Box::new(RefRestriction::new(layout, indices)))
    }

    fn create_basis(&self, data: Arc<TensorBasis>) -> Result<Box<dyn BasisImpl>> {
        Ok(Box::new(RefBasis::new(data)))
    }

    fn create_operator(&self) -> Result<Box<dyn OperatorImpl>> {
        Ok(Box::new(RefOperator))
    }
}

/// Host memory posing as a device memory space.
#[derive(Debug, Default)]
pub struct EmulatedMemory {
    counters: TransferCounters,
}

impl DeviceMemory for EmulatedMemory {
    fn allocate(&self, len: usize) -> Result<DeviceArray> {
        let data = alloc_zeroed(len, MemType::Device)?;
        Ok(DeviceArray::new(EmulatedStorage { data: Mutex::new(data) }))
    }

    fn counters(&self) -> &TransferCounters {
        &self.counters
    }
}

/// One emulated device allocation.
#[derive(Debug)]
pub struct EmulatedStorage {
    data: Mutex<Vec<Scalar>>,
}

impl DeviceStorage for EmulatedStorage {
    fn len(&self) -> usize {
        self.data.lock().len()
    }

    fn upload(&self, src: &[Scalar]) -> Result<()> {
        self.data.lock().copy_from_slice(src);
        Ok(())
    }

    fn download(&self, dst: &mut [Scalar]) -> Result<()> {
        dst.copy_from_slice(&self.data.lock());
        Ok(())
    }

    fn fill(&self, value: Scalar) -> Result<()> {
        self.data.lock().fill(value);
        Ok(())
    }

    fn copy_from(&self, src: &dyn DeviceStorage) -> Result<()> {
        let Some(src) = src.as_any().downcast_ref::<Self>() else {
            return Err(FemError::Device("cannot copy between different device memory spaces".into()));
        };
        if std::ptr::eq(self, src) {
            return Ok(());
        }
        let from = src.data.lock();
        self.data.lock().copy_from_slice(&from);
        Ok(())
    }

    fn reciprocal(&self) -> Result<()> {
        reciprocal_in_place(&mut self.data.lock());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Accepts `/gpu/emulated`.
pub fn init_emulated(resource: &str) -> Result<Box<dyn Backend>> {
    if resource != EMULATED_PREFIX {
        return Err(FemError::InvalidResource { backend: "emulated".to_owned(), resource: resource.to_owned() });
    }
    Ok(Box::new(DeviceBackend::new("emulated", Arc::new(EmulatedMemory::default()))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ArrayHandle, CopyMode, SyncState};

    #[test]
    fn device_preferred_vectors_copy_only_on_demand() {
        let backend = DeviceBackend::new("emulated", Arc::new(EmulatedMemory::default()));
        let mut v = backend.create_vector(4).unwrap();
        v.set_value(2.0).unwrap();
        assert_eq!(v.sync_state(), SyncState::DeviceValid);
        assert_eq!(backend.transfer_stats().unwrap(), TransferStats::default());

        assert_eq!(&*v.host_read().unwrap(), &[2.0; 4]);
        assert_eq!(v.sync_state(), SyncState::BothValid);
        assert_eq!(v.host_read().unwrap().len(), 4);
        let stats = backend.transfer_stats().unwrap();
        assert_eq!((stats.device_to_host, stats.host_to_device), (1, 0));
    }

    #[test]
    fn device_copy_values_counts_device_to_device() {
        let memory = Arc::new(EmulatedMemory::default());
        let backend = DeviceBackend::new("emulated", memory.clone());
        let src = memory.allocate(3).unwrap();
        src.upload(&[1.0, 2.0, 3.0]).unwrap();
        let mut v = backend.create_vector(3).unwrap();
        v.set_array(CopyMode::CopyValues, ArrayHandle::Device(src.clone())).unwrap();
        assert!(!v.device_read().unwrap().ptr_eq(&src));
        assert_eq!(backend.transfer_stats().unwrap().device_to_device, 1);
        assert_eq!(&*v.host_read().unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn device_reciprocal_skips_zeros() {
        let storage = EmulatedStorage { data: Mutex::new(vec![2.0, 0.0, -4.0]) };
        storage.reciprocal().unwrap();
        let mut out = [0.0; 3];
        storage.download(&mut out).unwrap();
        assert_eq!(out, [0.5, 0.0, -0.25]);
    }

    #[test]
    fn init_checks_the_resource() {
        assert_eq!(init_emulated(EMULATED_PREFIX).unwrap().preferred_mem_type(), MemType::Device);
        assert!(init_emulated("/gpu").is_err());
    }
}
