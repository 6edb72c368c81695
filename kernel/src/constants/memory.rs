pub const FRAME_SIZE: u64 = 4096;

/// Capacity of the normalized memory region table; further regions are dropped.
pub const MAX_MEMORY_REGIONS: usize = 64;

pub const BITS_PER_BITMAP_BYTE: u64 = 8;
pub const FULL_BITMAP_BYTE: u8 = 0xFF;
