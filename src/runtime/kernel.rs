use crate::backend::Backend;
use crate::error::Result;

/// A named entry point bound inside a device's program.
#[derive(Debug)]
pub struct Kernel<B: Backend> {
    kernel: Option<B::Kernel>,
    context: Option<B::Context>,
    name: String,
}

impl<B: Backend> Default for Kernel<B> {
    fn default() -> Self {
        Self {
            kernel: None,
            context: None,
            name: String::new(),
        }
    }
}

impl<B: Backend> Kernel<B> {
    /// Binds `name` inside `program`, releasing any previous binding first.
    pub fn init(&mut self, name: &str, context: &B::Context, program: &B::Program) -> Result<()> {
        self.free_mem()?;
        self.kernel = Some(B::bind(context, program, name)?);
        self.context = Some(*context);
        self.name = name.to_string();
        log::debug!("kernel `{}` bound", name);
        Ok(())
    }

    pub fn free_mem(&mut self) -> Result<()> {
        self.name.clear();
        match (self.kernel.take(), self.context.take()) {
            (Some(kernel), Some(context)) => B::unbind(&context, kernel),
            _ => Ok(()),
        }
    }

    pub fn get(&self) -> Option<&B::Kernel> {
        self.kernel.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<B: Backend> Drop for Kernel<B> {
    fn drop(&mut self) {
        if let Err(e) = self.free_mem() {
            log::warn!("failed to release kernel: {}", e);
        }
    }
}
