use crate::backend::Backend;
use crate::error::Result;

/// In-order command channel of one device.
#[derive(Debug)]
pub struct Queue<B: Backend> {
    queue: Option<B::Queue>,
}

impl<B: Backend> Default for Queue<B> {
    fn default() -> Self {
        Self { queue: None }
    }
}

impl<B: Backend> Queue<B> {
    pub fn init(&mut self, device: &B::DeviceId, context: &B::Context) -> Result<()> {
        self.free_mem()?;
        self.queue = Some(B::create_queue(device, context)?);
        Ok(())
    }

    pub fn free_mem(&mut self) -> Result<()> {
        match self.queue.take() {
            Some(queue) => B::release_queue(queue),
            None => Ok(()),
        }
    }

    pub fn get(&self) -> Option<&B::Queue> {
        self.queue.as_ref()
    }
}

impl<B: Backend> Drop for Queue<B> {
    fn drop(&mut self) {
        if let Err(e) = self.free_mem() {
            log::warn!("failed to release queue: {}", e);
        }
    }
}
