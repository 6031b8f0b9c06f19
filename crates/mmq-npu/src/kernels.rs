// Vector-core kernels
//
// Every element-wise launch follows the same pipeline per block:
//
//   for each tile of at most `tiling_size` elements:
//     copy_in   global x, y  -> local x, y
//     compute   local x, y   -> local z
//     copy_out  local z      -> global z
//
// Blocks run concurrently, one per vector core (rayon stands in for the
// core array). A launch returns only after every block has finished.
//
// Vector cores add f32 and f16 natively. They have no bf16 ALU, so the bf16
// kernel widens both tiles into f32 scratch buffers, adds there, and rounds
// the sum back to bf16 (round-to-nearest-even).

use half::{bf16, f16};
use rayon::prelude::*;

use mmq_core::{BackendStorage, DType, Error, Result, Shape};

use crate::device::NpuStorage;
use crate::pool::PoolElem;
use crate::tiling::AddTiling;

/// Per-dtype tile computation.
trait TileKernel {
    type Elem: PoolElem;
    /// Core-local scratch beyond the three tile queues.
    type Scratch: Send;

    fn scratch(tiling_size: usize) -> Self::Scratch;

    fn compute(x: &[Self::Elem], y: &[Self::Elem], z: &mut [Self::Elem], scratch: &mut Self::Scratch);
}

struct AddF32;
struct AddF16;
struct AddBf16;

/// f32 staging buffers for the bf16 cast-compute-cast path.
struct CastBuffers {
    x: Vec<f32>,
    y: Vec<f32>,
}

impl TileKernel for AddF32 {
    type Elem = f32;
    type Scratch = ();

    fn scratch(_: usize) -> Self::Scratch {}

    fn compute(x: &[f32], y: &[f32], z: &mut [f32], _: &mut ()) {
        for ((z, &a), &b) in z.iter_mut().zip(x).zip(y) {
            *z = a + b;
        }
    }
}

impl TileKernel for AddF16 {
    type Elem = u16;
    type Scratch = ();

    fn scratch(_: usize) -> Self::Scratch {}

    fn compute(x: &[u16], y: &[u16], z: &mut [u16], _: &mut ()) {
        for ((z, &a), &b) in z.iter_mut().zip(x).zip(y) {
            *z = (f16::from_bits(a) + f16::from_bits(b)).to_bits();
        }
    }
}

impl TileKernel for AddBf16 {
    type Elem = u16;
    type Scratch = CastBuffers;

    fn scratch(tiling_size: usize) -> Self::Scratch {
        CastBuffers {
            x: vec![0.0; tiling_size],
            y: vec![0.0; tiling_size],
        }
    }

    fn compute(x: &[u16], y: &[u16], z: &mut [u16], scratch: &mut CastBuffers) {
        let n = z.len();
        let (xs, ys) = (&mut scratch.x[..n], &mut scratch.y[..n]);
        for (dst, &src) in xs.iter_mut().zip(x) {
            *dst = bf16::from_bits(src).to_f32();
        }
        for (dst, &src) in ys.iter_mut().zip(y) {
            *dst = bf16::from_bits(src).to_f32();
        }
        for (a, &b) in xs.iter_mut().zip(ys.iter()) {
            *a += b;
        }
        for (dst, &src) in z.iter_mut().zip(xs.iter()) {
            *dst = bf16::from_f32(src).to_bits();
        }
    }
}

/// Run one block: its slice of x and y is `x_blk`/`y_blk`, output `z_blk`.
fn run_block<K: TileKernel>(tiling_size: usize, x_blk: &[K::Elem], y_blk: &[K::Elem], z_blk: &mut [K::Elem]) {
    let mut local_x = vec![K::Elem::default(); tiling_size];
    let mut local_y = vec![K::Elem::default(); tiling_size];
    let mut local_z = vec![K::Elem::default(); tiling_size];
    let mut scratch = K::scratch(tiling_size);

    let len = z_blk.len();
    let mut start = 0;
    while start < len {
        let n = tiling_size.min(len - start);
        let end = start + n;

        local_x[..n].copy_from_slice(&x_blk[start..end]);
        local_y[..n].copy_from_slice(&y_blk[start..end]);

        K::compute(&local_x[..n], &local_y[..n], &mut local_z[..n], &mut scratch);

        z_blk[start..end].copy_from_slice(&local_z[..n]);
        start = end;
    }
}

/// Launch `K` over the whole buffer with the given partitioning.
fn launch<K: TileKernel>(tiling: &AddTiling, x: &[K::Elem], y: &[K::Elem], z: &mut [K::Elem]) -> Result<()> {
    if x.len() != tiling.numel() || y.len() != tiling.numel() || z.len() != tiling.numel() {
        return Err(Error::Internal(format!(
            "launch covers {} elements but buffers hold x={}, y={}, z={}",
            tiling.numel(),
            x.len(),
            y.len(),
            z.len()
        )));
    }

    let mut blocks: Vec<(usize, &mut [K::Elem])> = Vec::with_capacity(tiling.num_blocks);
    let mut rest: &mut [K::Elem] = z;
    for idx in 0..tiling.num_blocks {
        let (offset, len) = tiling.block_range(idx);
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
        blocks.push((offset, head));
        rest = tail;
    }

    blocks.into_par_iter().for_each(|(offset, z_blk)| {
        let end = offset + z_blk.len();
        run_block::<K>(tiling.tiling_size, &x[offset..end], &y[offset..end], z_blk);
    });
    Ok(())
}

fn element_count_mismatch(expected: usize, got: usize) -> Error {
    Error::ElementCountMismatch {
        shape: Shape::from(expected),
        expected,
        got,
    }
}

/// `out = x + y`, written into a preallocated buffer.
///
/// All three buffers must share dtype and device and hold the same number of
/// elements.
pub fn add_into(out: &mut NpuStorage, x: &NpuStorage, y: &NpuStorage) -> Result<()> {
    if x.dtype() != y.dtype() {
        return Err(Error::DTypeMismatch {
            expected: x.dtype(),
            got: y.dtype(),
        });
    }
    if out.dtype() != x.dtype() {
        return Err(Error::DTypeMismatch {
            expected: x.dtype(),
            got: out.dtype(),
        });
    }
    let dev = x.npu_device().clone();
    for other in [y.npu_device(), out.npu_device()] {
        if *other != dev {
            return Err(Error::DeviceMismatch {
                expected: dev.device(),
                got: other.device(),
            });
        }
    }
    if x.len() != y.len() {
        return Err(element_count_mismatch(x.len(), y.len()));
    }
    if x.len() != out.len() {
        return Err(element_count_mismatch(x.len(), out.len()));
    }
    dev.ensure_active()?;

    let numel = x.len();
    let tiling = AddTiling::compute(
        numel,
        x.dtype().size_in_bytes(),
        dev.num_vec_cores()?,
        dev.config().tiling_size,
    )?;
    tracing::trace!(
        ordinal = dev.ordinal(),
        dtype = %x.dtype(),
        numel,
        num_blocks = tiling.num_blocks,
        block_size = tiling.block_size,
        last_block_size = tiling.last_block_size,
        "launch add"
    );

    match (out, x, y) {
        (NpuStorage::F32(z), NpuStorage::F32(a), NpuStorage::F32(b)) => {
            launch::<AddF32>(&tiling, a.as_slice(), b.as_slice(), z.as_mut_slice())
        }
        (NpuStorage::F16(z), NpuStorage::F16(a), NpuStorage::F16(b)) => {
            launch::<AddF16>(&tiling, a.as_slice(), b.as_slice(), z.as_mut_slice())
        }
        (NpuStorage::BF16(z), NpuStorage::BF16(a), NpuStorage::BF16(b)) => {
            launch::<AddBf16>(&tiling, a.as_slice(), b.as_slice(), z.as_mut_slice())
        }
        _ => Err(Error::Internal("storage variants disagree with dtype".into())),
    }
}

/// `x + y` into a newly allocated buffer on the inputs' device.
pub fn add(x: &NpuStorage, y: &NpuStorage) -> Result<NpuStorage> {
    let mut out = NpuStorage::uninit(x.npu_device(), x.len(), x.dtype())?;
    add_into(&mut out, x, y)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NpuConfig;
    use crate::device::NpuDevice;
    use mmq_core::{BinaryOp, CpuStorage, RandomSource, SeededRandom};

    fn device(vec_cores: usize, tiling_size: usize) -> NpuDevice {
        NpuDevice::open(
            0,
            NpuConfig::default()
                .with_vec_cores(vec_cores)
                .with_tiling_size(tiling_size),
        )
        .unwrap()
    }

    fn check_against_host(dev: &NpuDevice, n: usize, dtype: DType, seed: u64) {
        let mut rng = SeededRandom::new(seed);
        let hx = rng.normal_storage(n, dtype);
        let hy = rng.normal_storage(n, dtype);
        let expected = hx.binary_op(BinaryOp::Add, &hy).unwrap();

        let x = NpuStorage::from_host(dev, &hx).unwrap();
        let y = NpuStorage::from_host(dev, &hy).unwrap();
        let z = add(&x, &y).unwrap();
        // Same rounding on both sides, so results are bit-identical.
        assert_eq!(z.to_host().unwrap(), expected, "n={n} dtype={dtype}");
    }

    #[test]
    fn test_add_matches_host_for_all_dtypes() {
        let dev = device(48, 512);
        for dtype in DType::ALL {
            for n in [1, 12, 511, 512, 513, 17082, 24624, 33840, 100_003] {
                check_against_host(&dev, n, dtype, n as u64);
            }
        }
    }

    #[test]
    fn test_add_with_few_cores_and_small_tiles() {
        // many tiles per block, oversized last block
        let dev = device(3, 16);
        for dtype in DType::ALL {
            check_against_host(&dev, 1025, dtype, 9);
        }
    }

    #[test]
    fn test_bf16_rounds_to_nearest_even() {
        let dev = device(4, 512);
        let hx = CpuStorage::from_f64_slice(&[256.0, 1.0], DType::BF16);
        let hy = CpuStorage::from_f64_slice(&[1.0, 2f64.powi(-8)], DType::BF16);
        let x = NpuStorage::from_host(&dev, &hx).unwrap();
        let y = NpuStorage::from_host(&dev, &hy).unwrap();
        let z = add(&x, &y).unwrap().to_host().unwrap();
        // 257 ties to 256; 1 + 2^-8 ties to 1
        assert_eq!(z.to_f64_vec(), vec![256.0, 1.0]);
    }

    #[test]
    fn test_add_into_checks() {
        let dev = device(4, 512);
        let x = NpuStorage::zeros(&dev, 8, DType::F32).unwrap();
        let y16 = NpuStorage::zeros(&dev, 8, DType::F16).unwrap();
        let y_short = NpuStorage::zeros(&dev, 4, DType::F32).unwrap();
        let mut out = NpuStorage::zeros(&dev, 8, DType::F32).unwrap();
        let mut out16 = NpuStorage::zeros(&dev, 8, DType::F16).unwrap();

        assert!(matches!(add_into(&mut out, &x, &y16), Err(Error::DTypeMismatch { .. })));
        assert!(matches!(add_into(&mut out16, &x, &x), Err(Error::DTypeMismatch { .. })));
        assert!(matches!(
            add_into(&mut out, &x, &y_short),
            Err(Error::ElementCountMismatch { .. })
        ));

        let other = device(4, 512);
        let foreign = NpuStorage::zeros(&other, 8, DType::F32).unwrap();
        assert!(matches!(
            add_into(&mut out, &x, &foreign),
            Err(Error::DeviceMismatch { .. })
        ));
    }

    #[test]
    fn test_add_into_overwrites_output() {
        let dev = device(2, 16);
        let hx = CpuStorage::from_f64_slice(&[1.0, 2.0, 3.0], DType::F16);
        let hy = CpuStorage::from_f64_slice(&[0.5, 0.5, 0.5], DType::F16);
        let x = NpuStorage::from_host(&dev, &hx).unwrap();
        let y = NpuStorage::from_host(&dev, &hy).unwrap();
        let mut out = NpuStorage::from_host(&dev, &CpuStorage::from_f64_slice(&[9.0; 3], DType::F16)).unwrap();
        add_into(&mut out, &x, &y).unwrap();
        assert_eq!(out.to_host().unwrap().to_f64_vec(), vec![1.5, 2.5, 3.5]);
    }
}
