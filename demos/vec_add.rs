//! Element-wise addition on every device the active backend finds, one
//! thread per device.
//!
//! cargo run --example vec_add [--features opencl|cuda]

use std::thread;

use gpapi::{free, init, round_up_global, ActiveBackend, Backend, BackendKind, Device, KernelSource, VendorFilter};
use log::{Level, LevelFilter, Log, Metadata, Record};

const NUM_ELEMENTS: usize = 32 * 1024;
const LOCAL_SIZE: usize = 64;

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let label = match record.level() {
            Level::Error => "Error",
            Level::Warn => "Warning",
            _ => "Info",
        };
        println!("[{}] {}: {}", chrono::Local::now().format("%H:%M:%S"), label, record.args());
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

fn kernel_source() -> (&'static str, &'static str) {
    match ActiveBackend::KIND {
        BackendKind::Cuda => ("vec_add.cu", include_str!("kernels/vec_add.cu")),
        BackendKind::OpenCl => ("vec_add.cl", include_str!("kernels/vec_add.cl")),
        // native kernels are registered functions; the text is informational
        BackendKind::Native => ("vec_add.cl", include_str!("kernels/vec_add.cl")),
    }
}

fn vec_add(device: &mut Device<ActiveBackend>) -> gpapi::Result<()> {
    log::info!("kernel vecAdd for device {} launched", device.name());

    let a: Vec<i32> = (0..NUM_ELEMENTS as i32).collect();
    let b: Vec<i32> = (0..NUM_ELEMENTS as i32).map(|i| i * 2).collect();

    device.set_kernel("vecAdd")?;
    device.add_param_slice(&a)?;
    device.add_param_slice(&b)?;
    let c = device.add_param_output::<i32>(NUM_ELEMENTS)?;
    device.add_param_int(NUM_ELEMENTS as i32)?;

    device.launch_kernel(round_up_global(NUM_ELEMENTS, LOCAL_SIZE), LOCAL_SIZE)?;
    log::info!("enqueue from device {}", device.name());
    device.wait()?;
    log::info!("finish from device {}", device.name());

    let mut out = vec![0i32; NUM_ELEMENTS];
    device.download_slice(c, &mut out)?;

    let wrong = out.iter().enumerate().filter(|&(i, &v)| v != 3 * i as i32).count();
    if wrong == 0 {
        log::info!("results from device {}: all {} elements correct", device.name(), NUM_ELEMENTS);
    } else {
        log::error!("results from device {}: {} of {} elements wrong", device.name(), wrong, NUM_ELEMENTS);
    }
    Ok(())
}

fn main() -> gpapi::Result<()> {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(LevelFilter::Info))
        .map_err(|e| gpapi::Error::unavailable(e.to_string()))?;

    let (name, text) = kernel_source();
    let mut devices = init::<ActiveBackend>(&KernelSource::new(name, text), &VendorFilter::default())?;

    let handles: Vec<_> = devices
        .drain(..)
        .map(|mut device| {
            thread::spawn(move || {
                let result = vec_add(&mut device);
                (device, result)
            })
        })
        .collect();

    for handle in handles {
        match handle.join() {
            Ok((device, result)) => {
                if let Err(e) = result {
                    log::error!("device {} failed: {}", device.name(), e);
                }
                devices.push(device);
            }
            Err(_) => log::error!("device thread panicked"),
        }
    }

    free(&mut devices)
}
