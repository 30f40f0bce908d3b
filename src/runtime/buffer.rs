use crate::backend::Backend;
use crate::error::{Error, Result};

/// One device allocation, optionally filled from host memory at creation.
///
/// An empty buffer (fresh, freed, or initialized with zero bytes) holds no
/// memory and [`Buffer::get`] returns `None`.
#[derive(Debug)]
pub struct Buffer<B: Backend> {
    memory: Option<B::Memory>,
    context: Option<B::Context>,
    size: usize,
}

impl<B: Backend> Default for Buffer<B> {
    fn default() -> Self {
        Self {
            memory: None,
            context: None,
            size: 0,
        }
    }
}

impl<B: Backend> Buffer<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates `num_bytes` and, when `host_src` is given, copies its first
    /// `num_bytes` bytes to the device before returning. Any previous
    /// allocation is released first. Zero bytes is a no-op.
    pub fn init(
        &mut self,
        queue: &B::Queue,
        context: &B::Context,
        host_src: Option<&[u8]>,
        num_bytes: usize,
    ) -> Result<()> {
        if num_bytes == 0 {
            return Ok(());
        }
        if let Some(src) = host_src {
            if src.len() < num_bytes {
                return Err(Error::invalid_argument(format!(
                    "host source holds {} bytes, {} requested",
                    src.len(),
                    num_bytes
                )));
            }
        }

        self.free_mem()?;
        let memory = B::allocate(queue, context, num_bytes)?;
        if let Some(src) = host_src {
            if let Err(e) = B::upload(queue, context, &memory, &src[..num_bytes]) {
                if let Err(release) = B::free(context, memory) {
                    log::warn!("releasing buffer after failed upload: {}", release);
                }
                return Err(e);
            }
        }
        log::trace!("buffer of {} bytes allocated", num_bytes);

        self.memory = Some(memory);
        self.context = Some(*context);
        self.size = num_bytes;
        Ok(())
    }

    /// Blocking copy of the first `num_bytes` bytes into `host_dst`. Zero bytes is a no-op.
    pub fn download(
        &self,
        queue: &B::Queue,
        context: &B::Context,
        host_dst: &mut [u8],
        num_bytes: usize,
    ) -> Result<()> {
        if num_bytes == 0 {
            return Ok(());
        }
        let memory = self
            .memory
            .as_ref()
            .ok_or_else(|| Error::invalid_argument("download from an empty buffer"))?;
        if num_bytes > self.size {
            return Err(Error::invalid_argument(format!(
                "download of {} bytes from a {} byte buffer",
                num_bytes, self.size
            )));
        }
        if host_dst.len() < num_bytes {
            return Err(Error::invalid_argument(format!(
                "host destination holds {} bytes, {} requested",
                host_dst.len(),
                num_bytes
            )));
        }
        B::download(queue, context, memory, &mut host_dst[..num_bytes])
    }

    /// Releases the allocation, if any. Always leaves the buffer empty.
    pub fn free_mem(&mut self) -> Result<()> {
        self.size = 0;
        match (self.memory.take(), self.context.take()) {
            (Some(memory), Some(context)) => B::free(&context, memory),
            _ => Ok(()),
        }
    }

    pub fn get(&self) -> Option<&B::Memory> {
        self.memory.as_ref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_none()
    }
}

impl<B: Backend> Drop for Buffer<B> {
    fn drop(&mut self) {
        if let Err(e) = self.free_mem() {
            log::warn!("failed to release buffer: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::native::{NativeBackend, NativeContext, NativeQueue};
    use crate::ErrorKind;

    type NativeBuffer = Buffer<NativeBackend>;

    #[test]
    fn test_round_trip() {
        let src: Vec<u8> = (0..=255).collect();
        let mut buffer = NativeBuffer::new();
        buffer.init(&NativeQueue, &NativeContext(0), Some(&src), src.len()).unwrap();
        assert_eq!(buffer.size(), 256);

        let mut dst = vec![0u8; 256];
        buffer.download(&NativeQueue, &NativeContext(0), &mut dst, 256).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_uninitialized_allocation_is_zeroed() {
        let mut buffer = NativeBuffer::new();
        buffer.init(&NativeQueue, &NativeContext(0), None, 64).unwrap();
        let mut dst = vec![0xffu8; 64];
        buffer.download(&NativeQueue, &NativeContext(0), &mut dst, 64).unwrap();
        assert!(dst.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_reinit_replaces_allocation() {
        let mut buffer = NativeBuffer::new();
        buffer.init(&NativeQueue, &NativeContext(0), Some(&[1, 2, 3, 4]), 4).unwrap();
        buffer.init(&NativeQueue, &NativeContext(0), Some(&[9, 8]), 2).unwrap();
        assert_eq!(buffer.size(), 2);

        let mut dst = [0u8; 2];
        buffer.download(&NativeQueue, &NativeContext(0), &mut dst, 2).unwrap();
        assert_eq!(dst, [9, 8]);
    }

    #[test]
    fn test_download_is_bounds_checked() {
        let mut buffer = NativeBuffer::new();
        buffer.init(&NativeQueue, &NativeContext(0), None, 8).unwrap();

        let mut big = [0u8; 16];
        let err = buffer.download(&NativeQueue, &NativeContext(0), &mut big, 16).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let mut small = [0u8; 4];
        let err = buffer.download(&NativeQueue, &NativeContext(0), &mut small, 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_short_host_source_keeps_previous_allocation() {
        let mut buffer = NativeBuffer::new();
        buffer.init(&NativeQueue, &NativeContext(0), Some(&[7; 8]), 8).unwrap();
        assert!(buffer.init(&NativeQueue, &NativeContext(0), Some(&[1; 4]), 8).is_err());
        assert_eq!(buffer.size(), 8);
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut buffer = NativeBuffer::new();
        buffer.free_mem().unwrap();
        buffer.init(&NativeQueue, &NativeContext(0), None, 16).unwrap();
        buffer.free_mem().unwrap();
        buffer.free_mem().unwrap();
        assert!(buffer.get().is_none());
        assert_eq!(buffer.size(), 0);
    }
}
