//! Backend-neutral device, buffer and launch lifecycle.

pub mod buffer;
pub mod device;
pub mod init;
pub mod kernel;
pub mod launch;
pub mod queue;

pub use buffer::Buffer;
pub use device::{BufferId, Device, DeviceBinding};
pub use init::{free, init, init_with_config};
pub use kernel::Kernel;
pub use launch::{round_up_global, KernelLaunch};
pub use queue::Queue;
