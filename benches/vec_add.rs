use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gpapi::{free, init, round_up_global, KernelSource, NativeBackend, VendorFilter};

const LOCAL_SIZE: usize = 64;

fn bench_native_vec_add(c: &mut Criterion) {
    let source = KernelSource::new("vec_add", "");
    let mut group = c.benchmark_group("native_vec_add");

    for n in [256usize, 1024, 4096] {
        let a: Vec<i32> = (0..n as i32).collect();
        let b: Vec<i32> = (0..n as i32).map(|i| i * 2).collect();

        let mut devices = init::<NativeBackend>(&source, &VendorFilter::default()).unwrap();
        let device = &mut devices[0];
        device.set_kernel("vecAdd").unwrap();
        device.add_param_slice(&a).unwrap();
        device.add_param_slice(&b).unwrap();
        let out = device.add_param_output::<i32>(n).unwrap();
        device.add_param_int(n as i32).unwrap();

        // the native loop runs global * local invocations
        group.throughput(Throughput::Elements((round_up_global(n, LOCAL_SIZE) * LOCAL_SIZE) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |bencher, &n| {
            bencher.iter(|| {
                device.launch_kernel(round_up_global(n, LOCAL_SIZE), LOCAL_SIZE).unwrap();
                device.wait().unwrap();
            })
        });

        let mut result = vec![0i32; n];
        device.download_slice(out, &mut result).unwrap();
        assert_eq!(result[n - 1], 3 * (n as i32 - 1));
        free(&mut devices).unwrap();
    }

    group.finish();
}

criterion_group!(benches, bench_native_vec_add);
criterion_main!(benches);
