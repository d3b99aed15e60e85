//! Fixed-length numeric vectors.
//!
//! A [`Vector`] owns or borrows up to two buffers, one per memory space, and
//! keeps them consistent through the protocol described in [`crate::memory`].
//! Access guards returned by [`Vector::get_array_read`] and
//! [`Vector::get_array`] restore the array when dropped.

use tracing::debug;

use crate::backend::VectorImpl;
use crate::context::Context;
use crate::error::Result;
use crate::memory::{
    ArrayHandle, CopyMode, DeviceArray, HostRead, HostWrite, MemType, NormType, Scalar, SyncState,
};

/// Read access to one side of a vector.
#[derive(Debug)]
pub enum ArrayRead<'a> {
    /// Host data.
    Host(HostRead<'a>),
    /// Device data.
    Device(DeviceArray),
}

impl ArrayRead<'_> {
    /// Host data, if this is host access.
    pub fn as_host(&self) -> Option<&[Scalar]> {
        match self {
            Self::Host(data) => Some(&**data),
            Self::Device(_) => None,
        }
    }

    /// Device array, if this is device access.
    pub fn as_device(&self) -> Option<&DeviceArray> {
        match self {
            Self::Device(array) => Some(array),
            Self::Host(_) => None,
        }
    }
}

/// Write access to one side of a vector.
#[derive(Debug)]
pub enum ArrayWrite<'a> {
    /// Host data.
    Host(HostWrite<'a>),
    /// Device data.
    Device(DeviceArray),
}

impl ArrayWrite<'_> {
    /// Host data, if this is host access.
    pub fn as_host_mut(&mut self) -> Option<&mut [Scalar]> {
        match self {
            Self::Host(data) => Some(&mut **data),
            Self::Device(_) => None,
        }
    }

    /// Device array, if this is device access.
    pub fn as_device(&self) -> Option<&DeviceArray> {
        match self {
            Self::Device(array) => Some(array),
            Self::Host(_) => None,
        }
    }
}

/// A numeric vector created through a [`Context`].
#[derive(Debug)]
pub struct Vector {
    ctx: Context,
    imp: Box<dyn VectorImpl>,
}

impl Vector {
    pub(crate) fn create(ctx: &Context, len: usize) -> Result<Self> {
        let imp = ctx.check("Vector::create", ctx.backend().create_vector(len))?;
        debug!(len, backend = ctx.backend_name(), "created vector");
        Ok(Self { ctx: ctx.clone(), imp })
    }

    pub(crate) fn from_slice(ctx: &Context, data: &[Scalar]) -> Result<Self> {
        let mut vector = Self::create(ctx, data.len())?;
        vector.copy_from_slice(data)?;
        Ok(vector)
    }

    pub(crate) fn imp_mut(&mut self) -> &mut dyn VectorImpl {
        &mut *self.imp
    }

    /// The owning context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Number of scalars.
    pub fn len(&self) -> usize {
        self.imp.len()
    }

    /// Whether the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.imp.is_empty()
    }

    /// Which sides currently hold valid data.
    pub fn sync_state(&self) -> SyncState {
        self.imp.sync_state()
    }

    /// Whether the vector owns its buffer on `mem`.
    pub fn owns_array(&self, mem: MemType) -> bool {
        self.imp.owns_array(mem)
    }

    /// Installs an array on the side matching its memory space.
    ///
    /// # Example
    ///
    /// ```rust
    /// use briny_fem::prelude::*;
    ///
    /// let ctx = Context::init("/cpu/self").unwrap();
    /// let shared = HostArray::from_vec(vec![10.0, 11.0, 12.0]);
    /// let mut x = ctx.vector(3).unwrap();
    /// x.set_array(CopyMode::UsePointer, shared.clone()).unwrap();
    /// x.set_value(1.0).unwrap();
    /// assert_eq!(shared.to_vec(), vec![1.0; 3]);
    /// ```
    pub fn set_array(&mut self, mode: CopyMode, array: impl Into<ArrayHandle>) -> Result<()> {
        let result = self.imp.set_array(mode, array.into());
        self.ctx.check("Vector::set_array", result)
    }

    /// Copies `data` into host memory.
    ///
    /// The copy is handed over as the vector's own host buffer, so `data` is
    /// copied exactly once.
    pub fn copy_from_slice(&mut self, data: &[Scalar]) -> Result<()> {
        self.set_array(CopyMode::OwnPointer, data.to_vec())
    }

    /// Hands the buffer on `mem` back to the caller; the vector is left empty.
    pub fn take_array(&mut self, mem: MemType) -> Result<ArrayHandle> {
        let result = self.imp.take_array(mem);
        self.ctx.check("Vector::take_array", result)
    }

    /// Sets every entry to `value`.
    pub fn set_value(&mut self, value: Scalar) -> Result<()> {
        let result = self.imp.set_value(value);
        self.ctx.check("Vector::set_value", result)
    }

    /// Read access to `mem`, synchronizing first if needed.
    pub fn get_array_read(&mut self, mem: MemType) -> Result<ArrayRead<'_>> {
        let result = match mem {
            MemType::Host => self.imp.host_read().map(ArrayRead::Host),
            MemType::Device => self.imp.device_read().map(ArrayRead::Device),
        };
        self.ctx.check("Vector::get_array_read", result)
    }

    /// Write access to `mem`; the other side becomes stale.
    pub fn get_array(&mut self, mem: MemType) -> Result<ArrayWrite<'_>> {
        let result = match mem {
            MemType::Host => self.imp.host_write().map(ArrayWrite::Host),
            MemType::Device => self.imp.device_write().map(ArrayWrite::Device),
        };
        self.ctx.check("Vector::get_array", result)
    }

    /// Host read access.
    pub fn view(&mut self) -> Result<HostRead<'_>> {
        let result = self.imp.host_read();
        self.ctx.check("Vector::view", result)
    }

    /// Host write access.
    pub fn view_mut(&mut self) -> Result<HostWrite<'_>> {
        let result = self.imp.host_write();
        self.ctx.check("Vector::view_mut", result)
    }

    /// Copies the current contents to a new host vector.
    pub fn to_vec(&mut self) -> Result<Vec<Scalar>> {
        Ok(self.view()?.to_vec())
    }

    /// Makes `mem` current.
    pub fn sync_array(&mut self, mem: MemType) -> Result<()> {
        let result = self.imp.sync_array(mem);
        self.ctx.check("Vector::sync_array", result)
    }

    /// Computes a norm.
    pub fn norm(&mut self, ty: NormType) -> Result<Scalar> {
        let result = self.imp.norm(ty);
        self.ctx.check("Vector::norm", result)
    }

    /// Inverts every entry whose magnitude exceeds machine epsilon.
    pub fn reciprocal(&mut self) -> Result<()> {
        let result = self.imp.reciprocal();
        self.ctx.check("Vector::reciprocal", result)
    }

    /// Destroys the vector, releasing owned buffers. Arrays installed with
    /// [`CopyMode::UsePointer`] stay with their owner.
    pub fn destroy(self) {
        debug!(len = self.len(), "destroyed vector");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorHandler;
    use crate::memory::HostArray;

    fn ctx() -> Context {
        let ctx = Context::init("/cpu/self/ref").unwrap();
        ctx.set_error_handler(ErrorHandler::Return);
        ctx
    }

    #[test]
    fn use_pointer_values_read_back() {
        let ctx = ctx();
        let data: Vec<Scalar> = (0..10).map(|i| 10.0 + f64::from(i)).collect();
        let mut x = ctx.vector(10).unwrap();
        x.set_array(CopyMode::UsePointer, HostArray::from_vec(data.clone())).unwrap();
        let read = x.get_array_read(MemType::Host).unwrap();
        assert_eq!(read.as_host().unwrap(), data.as_slice());
    }

    #[test]
    fn copy_from_slice_installs_an_owned_copy() {
        let ctx = ctx();
        let shared = HostArray::from_vec(vec![1.0, 2.0]);
        let mut x = ctx.vector(2).unwrap();
        x.set_array(CopyMode::UsePointer, shared.clone()).unwrap();
        x.copy_from_slice(&[3.0, 4.0]).unwrap();
        assert!(x.owns_array(MemType::Host));
        assert_eq!(x.to_vec().unwrap(), vec![3.0, 4.0]);
        assert_eq!(shared.to_vec(), vec![1.0, 2.0]);
        assert!(x.copy_from_slice(&[1.0]).is_err());
    }

    #[test]
    fn device_access_fails_on_host_only_backend() {
        let ctx = ctx();
        let mut x = ctx.vector(2).unwrap();
        assert!(x.get_array(MemType::Device).is_err());
    }

    #[test]
    fn write_guard_changes_are_visible() {
        let ctx = ctx();
        let mut x = ctx.vector(3).unwrap();
        x.set_value(0.0).unwrap();
        {
            let mut w = x.get_array(MemType::Host).unwrap();
            w.as_host_mut().unwrap()[1] = 5.0;
        }
        assert_eq!(x.to_vec().unwrap(), vec![0.0, 5.0, 0.0]);
    }
}
