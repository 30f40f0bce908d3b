use crate::backend::{Backend, DeviceRecord, KernelSource};
use crate::core::{Config, VendorFilter};
use crate::error::Result;

use super::device::{Device, DeviceBinding};

/// Enumerates devices admitted by `filter`, compiles `source` for each of
/// them with the default build flags and returns them ready for
/// [`Device::set_kernel`].
///
/// An empty result is logged as a warning and is not an error.
pub fn init<B: Backend>(source: &KernelSource<'_>, filter: &VendorFilter) -> Result<Vec<Device<B>>> {
    let config = Config {
        filter: *filter,
        ..Config::default()
    };
    init_with_config(source, &config)
}

pub fn init_with_config<B: Backend>(source: &KernelSource<'_>, config: &Config) -> Result<Vec<Device<B>>> {
    let records = B::enumerate(&config.filter)?;
    if records.is_empty() {
        log::warn!("no devices found");
        return Ok(Vec::new());
    }

    let programs = match B::compile(source, &config.build, &records) {
        Ok(programs) => programs,
        Err(e) => {
            release_contexts(records);
            return Err(e);
        }
    };

    let mut devices = Vec::with_capacity(records.len());
    let mut pending = records.into_iter().zip(programs);
    while let Some((record, program)) = pending.next() {
        match Device::new(DeviceBinding { record, program }) {
            Ok(device) => devices.push(device),
            Err(e) => {
                for (record, program) in pending {
                    if let Err(release) = B::release_program(&record.context, program) {
                        log::warn!("failed to release program of {}: {}", record.info.name, release);
                    }
                    release_contexts(vec![record]);
                }
                // already constructed devices release themselves on drop
                return Err(e);
            }
        }
    }

    log::info!("{} device(s) ready", devices.len());
    Ok(devices)
}

fn release_contexts<B: Backend>(records: Vec<DeviceRecord<B>>) {
    for record in records {
        if let Err(e) = B::release_context(record.context) {
            log::warn!("failed to release context of {}: {}", record.info.name, e);
        }
    }
}

/// Releases every device in `devices` and empties the list, so calling it
/// again is a no-op. Continues past individual failures and returns the first.
pub fn free<B: Backend>(devices: &mut Vec<Device<B>>) -> Result<()> {
    let mut first = Ok(());
    for device in devices.drain(..) {
        let name = device.name().to_string();
        if let Err(e) = device.release() {
            log::warn!("failed to release device {}: {}", name, e);
            if first.is_ok() {
                first = Err(e);
            }
        }
    }
    first
}
