use bytemuck::{Pod, Zeroable};

/// Flash reads land directly in the caller's buffer, which must start on a
/// 32 byte boundary and cover whole 32 byte blocks.
pub const FLASH_ALIGN: usize = 32;

#[repr(C, align(32))]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Block([u8; FLASH_ALIGN]);

/// Zeroed byte buffer with flash alignment. `len` is the logical length;
/// the allocation is rounded up to a whole number of blocks.
pub struct AlignedBuf {
    blocks: Vec<Block>,
    len: usize,
}

impl AlignedBuf {
    /// Returns `None` instead of aborting when the allocation fails.
    pub fn try_zeroed(len: usize) -> Option<Self> {
        let count = len.div_ceil(FLASH_ALIGN);
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(count).ok()?;
        blocks.resize(count, Block::zeroed());
        Some(Self { blocks, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocated size, always a multiple of [`FLASH_ALIGN`].
    pub fn capacity(&self) -> usize {
        self.blocks.len() * FLASH_ALIGN
    }

    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice::<Block, u8>(&self.blocks)[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<Block, u8>(&mut self.blocks)[..self.len]
    }
}
