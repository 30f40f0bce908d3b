use std::mem::size_of;

use bytemuck::Pod;

use super::memory::NativeMemory;
use crate::error::{Error, Result};

#[derive(Debug)]
enum Slot {
    Buffer(NativeMemory),
    Int(Box<i32>),
    Float(Box<f32>),
}

/// Positional arguments handed to a native kernel function.
///
/// Buffers are addressed by argument position and element index; every
/// access is bounds checked so kernels never touch memory outside an
/// allocation.
#[derive(Debug, Default)]
pub struct NativeArgs {
    slots: Vec<Slot>,
}

impl NativeArgs {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn push_buffer(&mut self, memory: &NativeMemory) {
        self.slots.push(Slot::Buffer(memory.clone()));
    }

    pub(crate) fn push_int(&mut self, value: i32) {
        self.slots.push(Slot::Int(Box::new(value)));
    }

    pub(crate) fn push_float(&mut self, value: f32) {
        self.slots.push(Slot::Float(Box::new(value)));
    }

    fn slot(&self, position: usize) -> Result<&Slot> {
        self.slots.get(position).ok_or_else(|| {
            Error::invalid_argument(format!(
                "kernel argument {} requested but only {} were added",
                position,
                self.slots.len()
            ))
        })
    }

    pub fn int(&self, position: usize) -> Result<i32> {
        match self.slot(position)? {
            Slot::Int(v) => Ok(**v),
            other => Err(mismatch(position, "int", other)),
        }
    }

    pub fn float(&self, position: usize) -> Result<f32> {
        match self.slot(position)? {
            Slot::Float(v) => Ok(**v),
            other => Err(mismatch(position, "float", other)),
        }
    }

    pub fn buffer(&self, position: usize) -> Result<&NativeMemory> {
        match self.slot(position)? {
            Slot::Buffer(m) => Ok(m),
            other => Err(mismatch(position, "buffer", other)),
        }
    }

    /// Number of whole `T` elements in the buffer at `position`.
    pub fn elements<T: Pod>(&self, position: usize) -> Result<usize> {
        Ok(self.buffer(position)?.len() / size_of::<T>().max(1))
    }

    /// Reads element `index` of the buffer at `position`.
    pub fn load<T: Pod>(&self, position: usize, index: usize) -> Result<T> {
        let (memory, offset) = self.element(position, index, size_of::<T>())?;
        Ok(unsafe { memory.as_ptr().add(offset).cast::<T>().read_unaligned() })
    }

    /// Writes element `index` of the buffer at `position`.
    pub fn store<T: Pod>(&self, position: usize, index: usize, value: T) -> Result<()> {
        let (memory, offset) = self.element(position, index, size_of::<T>())?;
        unsafe { memory.as_ptr().add(offset).cast::<T>().write_unaligned(value) };
        Ok(())
    }

    fn element(&self, position: usize, index: usize, size: usize) -> Result<(&NativeMemory, usize)> {
        let memory = self.buffer(position)?;
        let offset = index
            .checked_mul(size)
            .ok_or_else(|| Error::invalid_argument(format!("element index {} overflows", index)))?;
        memory.check_range(offset, size)?;
        Ok((memory, offset))
    }
}

fn mismatch(position: usize, wanted: &str, found: &Slot) -> Error {
    let found = match found {
        Slot::Buffer(_) => "buffer",
        Slot::Int(_) => "int",
        Slot::Float(_) => "float",
    };
    Error::invalid_argument(format!(
        "kernel argument {} is a {}, expected {}",
        position, found, wanted
    ))
}
