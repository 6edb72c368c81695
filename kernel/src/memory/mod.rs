pub mod bitmap_frame_allocator;
pub mod frame_allocator;

use bitmap_frame_allocator::{FrameAllocatorError, FrameStats};
use frame_allocator::with_frame_allocator;

use crate::boot::multiboot::MemoryMap;

/// Initializes the global frame allocator from the boot memory map.
///
/// Physical memory is identity mapped at this stage, so the bitmap lives
/// directly at the physical placement the allocator chooses.
///
/// # Arguments
/// * `memory_map` - regions reported by the loader
/// * `reserved_end` - end of the kernel image and bootstrap data
pub fn init(memory_map: &MemoryMap, reserved_end: u64) -> Result<FrameStats, FrameAllocatorError> {
    with_frame_allocator(|allocator| {
        allocator.init(memory_map, reserved_end, |placement, len| unsafe {
            core::slice::from_raw_parts_mut(placement.as_u64() as *mut u8, len)
        })?;
        Ok(allocator.stats())
    })
}
