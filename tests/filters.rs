use gpapi::{init, init_with_config, Config, DeviceClass, KernelSource, NativeBackend, Vendor, VendorFilter, VendorMask};

const SOURCE: KernelSource<'static> = KernelSource {
    name: "filter_tests",
    text: "",
};

#[test]
fn test_all_enabled_keeps_every_device() {
    let devices = init::<NativeBackend>(&SOURCE, &VendorFilter::default()).unwrap();
    assert_eq!(devices.len(), 1);

    let info = devices[0].info();
    assert_eq!(info.name, "NATIVE");
    assert_eq!(info.vendor, Vendor::Unknown);
    assert_eq!(info.class, DeviceClass::Unknown);
    assert_eq!(info.ordinal, 0);
    assert!(devices[0].max_threads_per_block() >= 1);
}

#[test]
fn test_disabled_vendor_yields_empty_set() {
    let mut filter = VendorFilter::default();
    filter.other.set_enabled(false);
    let devices = init::<NativeBackend>(&SOURCE, &filter).unwrap();
    assert!(devices.is_empty());

    let devices = init::<NativeBackend>(&SOURCE, &VendorFilter::none()).unwrap();
    assert!(devices.is_empty());
}

#[test]
fn test_ordinal_mask_on_unknown_class() {
    let mut filter = VendorFilter::none();
    filter.other.set_mask(0b1, DeviceClass::Unknown);
    assert_eq!(init::<NativeBackend>(&SOURCE, &filter).unwrap().len(), 1);

    filter.other.set_mask(0b10, DeviceClass::Unknown);
    assert!(init::<NativeBackend>(&SOURCE, &filter).unwrap().is_empty());
}

#[test]
fn test_config_from_json() {
    let config: Config = serde_json::from_str(
        r#"{
            "filter": { "other": { "cpu": 0, "gpu": 0, "accel": 0, "other": 0 } },
            "build": { "max_registers": 32 }
        }"#,
    )
    .unwrap();

    assert_eq!(config.filter.other, VendorMask::NONE);
    assert_eq!(config.filter.nvidia, VendorMask::ALL);
    assert_eq!(config.build.max_registers, 32);
    assert!(config.build.fast_math);

    let devices = init_with_config::<NativeBackend>(&SOURCE, &config).unwrap();
    assert!(devices.is_empty());
}
