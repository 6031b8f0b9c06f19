//! Work partitioning for element-wise kernels.
//!
//! An element-wise launch splits `numel` elements into `num_blocks` blocks,
//! one per vector core. Each block walks its range in tiles of at most
//! `tiling_size` elements: copy the tile into core-local buffers, compute,
//! copy the result back to global memory.
//!
//! There is no warp scheduler on the vector cores, so launching more blocks
//! than cores buys nothing; launching more blocks than tiles would leave
//! blocks idle. Hence at most `min(num_tilings, vec_cores)` blocks.
//!
//! Blocks are sized to an aligned even split. Rounding up to the alignment
//! can leave nothing for the trailing blocks, so the block count is then
//! reduced to `ceil(numel / block_size)`.

use mmq_core::{Error, Result};

/// Global-memory accesses are aligned to this many bytes.
pub const ALIGN_BYTES: usize = 32;

/// Integer ceiling division.
pub fn ceil_div(a: usize, b: usize) -> usize {
    a.div_ceil(b)
}

/// Launch parameters for an element-wise add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddTiling {
    /// Maximum elements per tile.
    pub tiling_size: usize,
    /// Elements handled by every block except the last.
    pub block_size: usize,
    /// Elements handled by the last block; absorbs the misalignment remainder.
    pub last_block_size: usize,
    /// Number of blocks launched.
    pub num_blocks: usize,
}

impl AddTiling {
    /// Partition `numel` elements of width `itemsize` bytes over `vec_cores` cores.
    pub fn compute(
        numel: usize,
        itemsize: usize,
        vec_cores: usize,
        tiling_size: usize,
    ) -> Result<Self> {
        if numel == 0 {
            return Err(Error::Internal("tiling requested for an empty buffer".into()));
        }
        if itemsize == 0 || ALIGN_BYTES % itemsize != 0 {
            return Err(Error::Internal(format!(
                "itemsize {itemsize} does not divide the {ALIGN_BYTES}-byte alignment"
            )));
        }
        if vec_cores == 0 || tiling_size == 0 {
            return Err(Error::Internal(format!(
                "degenerate launch: vec_cores={vec_cores}, tiling_size={tiling_size}"
            )));
        }

        let num_tilings = ceil_div(numel, tiling_size);
        let max_blocks = num_tilings.min(vec_cores);
        let align_elems = ALIGN_BYTES / itemsize;

        // Even split rounded up to the alignment, so every block but the last
        // starts on an aligned address.
        let block_size = ceil_div(numel / max_blocks, align_elems) * align_elems;
        let num_blocks = ceil_div(numel, block_size).min(max_blocks);

        let leading = (num_blocks - 1) * block_size;
        if numel <= leading {
            return Err(Error::Internal(format!(
                "last block size is not positive: numel={numel}, num_blocks={num_blocks}, block_size={block_size}"
            )));
        }

        Ok(AddTiling {
            tiling_size,
            block_size,
            last_block_size: numel - leading,
            num_blocks,
        })
    }

    /// Total elements covered by the launch.
    pub fn numel(&self) -> usize {
        (self.num_blocks - 1) * self.block_size + self.last_block_size
    }

    /// Element range `(offset, len)` of block `idx`.
    pub fn block_range(&self, idx: usize) -> (usize, usize) {
        let offset = idx * self.block_size;
        let len = if idx + 1 == self.num_blocks {
            self.last_block_size
        } else {
            self.block_size
        };
        (offset, len)
    }
}
