use spin::Mutex;
use x86_64::{instructions::interrupts::without_interrupts, PhysAddr};

use crate::memory::bitmap_frame_allocator::{BitmapFrameAllocator, FrameStats};

/// Global frame allocator so there is just one bitmap throughout the kernel.
/// Every access goes through [`with_frame_allocator`], which masks interrupts
/// for the duration of the lock.
pub static FRAME_ALLOCATOR: Mutex<BitmapFrameAllocator<'static>> =
    Mutex::new(BitmapFrameAllocator::new());

pub fn with_frame_allocator<F, R>(f: F) -> R
where
    F: FnOnce(&mut BitmapFrameAllocator<'static>) -> R,
{
    without_interrupts(|| f(&mut FRAME_ALLOCATOR.lock()))
}

/// Physical address of a fresh 4 KiB frame, or 0 when none is left or the
/// allocator is not ready. Frame 0 is never handed out, so 0 is unambiguous.
pub fn alloc_page() -> u64 {
    with_frame_allocator(|allocator| {
        allocator
            .allocate()
            .map_or(0, |frame| frame.start_address().as_u64())
    })
}

/// Returns a frame obtained from [`alloc_page`]; false if the address is
/// rejected (not ready, misaligned, out of range, already free).
pub fn free_page(addr: u64) -> bool {
    let Ok(addr) = PhysAddr::try_new(addr) else {
        return false;
    };
    with_frame_allocator(|allocator| match allocator.free(addr) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("free_page({:#x}) rejected: {}", addr.as_u64(), e);
            false
        }
    })
}

pub fn stats() -> FrameStats {
    with_frame_allocator(|allocator| allocator.stats())
}

pub fn is_ready() -> bool {
    with_frame_allocator(|allocator| allocator.is_ready())
}
