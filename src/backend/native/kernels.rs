//! Kernels available on the native backend without registration.

use super::{global_id, NativeArgs, NativeKernelFn};
use crate::error::Result;

pub const VEC_ADD: &str = "vecAdd";

pub(super) fn builtins() -> &'static [(&'static str, NativeKernelFn)] {
    &[(VEC_ADD, vec_add)]
}

/// `c[i] = a[i] + b[i]` for `i < n`, over `i32` elements.
///
/// Arguments: `a`, `b`, `c` buffers followed by the element count `n`.
pub fn vec_add(args: &NativeArgs) -> Result<()> {
    let i = global_id();
    let n = args.int(3)?;
    if n < 0 || i >= n as usize {
        return Ok(());
    }
    let a = args.load::<i32>(0, i)?;
    let b = args.load::<i32>(1, i)?;
    args.store::<i32>(2, i, a.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::native::NativeMemory;

    fn buffer_from(values: &[i32]) -> NativeMemory {
        let memory = NativeMemory::zeroed(values.len() * 4).unwrap();
        memory.write(bytemuck::cast_slice(values)).unwrap();
        memory
    }

    #[test]
    fn test_vec_add_ignores_padding_items() {
        let a = buffer_from(&[1, 2, 3]);
        let b = buffer_from(&[10, 20, 30]);
        let c = NativeMemory::zeroed(12).unwrap();

        let mut args = NativeArgs::default();
        args.push_buffer(&a);
        args.push_buffer(&b);
        args.push_buffer(&c);
        args.push_int(3);

        // work-item 5 lies past n and must not fault
        for i in [0usize, 1, 2, 5] {
            crate::backend::native::WORK_ITEM.with(|w| w.set(i));
            vec_add(&args).unwrap();
        }
        crate::backend::native::WORK_ITEM.with(|w| w.set(0));

        let mut out = [0i32; 3];
        c.read(bytemuck::cast_slice_mut(&mut out)).unwrap();
        assert_eq!(out, [11, 22, 33]);
    }
}
