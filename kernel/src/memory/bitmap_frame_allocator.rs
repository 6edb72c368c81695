use crate::{
    boot::multiboot::MemoryMap,
    constants::memory::{BITS_PER_BITMAP_BYTE, FRAME_SIZE, FULL_BITMAP_BYTE},
};
use x86_64::{
    structures::paging::PhysFrame,
    PhysAddr,
};

fn align_up(value: u64, align: u64) -> u64 {
    (value + (align - 1)) & !(align - 1)
}

fn align_down(value: u64, align: u64) -> u64 {
    value & !(align - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAllocatorError {
    NoAvailableMemory,
    StorageTooSmall,
    NotReady,
    Misaligned,
    OutOfRange,
    DoubleFree,
}

impl core::fmt::Display for FrameAllocatorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameAllocatorError::NoAvailableMemory => write!(f, "No available memory regions"),
            FrameAllocatorError::StorageTooSmall => write!(f, "Bitmap storage is too small"),
            FrameAllocatorError::NotReady => write!(f, "Frame allocator is not initialized"),
            FrameAllocatorError::Misaligned => write!(f, "Address is not frame aligned"),
            FrameAllocatorError::OutOfRange => write!(f, "Frame is outside managed memory"),
            FrameAllocatorError::DoubleFree => write!(f, "Frame is already free"),
        }
    }
}

/// Point-in-time frame counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub total: u64,
    pub free: u64,
    pub used: u64,
}

/// One bit per 4 KiB frame from address 0 up to the end of the highest
/// available region; a set bit means the frame is used.
///
/// * `total_frames`: frames covered by the bitmap
/// * `free_frames`: running count of clear bits
/// * `scan_start`: first frame searched by [`allocate`](Self::allocate); everything
///   below it (low memory, kernel image, the bitmap itself) is never handed out
/// * `bitmap_phys`: physical placement of the bitmap storage
/// * `bitmap`: the storage, `None` until [`init`](Self::init) succeeds
pub struct BitmapFrameAllocator<'a> {
    total_frames: u64,
    free_frames: u64,
    scan_start: u64,
    bitmap_phys: u64,
    bitmap: Option<&'a mut [u8]>,
}

impl Default for BitmapFrameAllocator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> BitmapFrameAllocator<'a> {
    /// An allocator in the not-ready state; every operation fails until [`init`](Self::init).
    pub const fn new() -> Self {
        Self {
            total_frames: 0,
            free_frames: 0,
            scan_start: 0,
            bitmap_phys: 0,
            bitmap: None,
        }
    }

    /// Builds the bitmap from the boot memory map.
    ///
    /// # Arguments
    /// * `memory_map` - regions reported by the loader
    /// * `reserved_end` - end of the kernel image and bootstrap data
    /// * `storage` - maps the chosen physical placement and length to the
    ///   bytes backing the bitmap
    ///
    /// # Returns
    /// An error if there is no available memory or the storage is too small;
    /// the allocator then stays not ready
    pub fn init<F>(
        &mut self,
        memory_map: &MemoryMap,
        reserved_end: u64,
        storage: F,
    ) -> Result<(), FrameAllocatorError>
    where
        F: FnOnce(PhysAddr, usize) -> &'a mut [u8],
    {
        self.bitmap = None;
        self.free_frames = 0;

        let max_end = memory_map.highest_available_end();
        if max_end == 0 {
            return Err(FrameAllocatorError::NoAvailableMemory);
        }

        let total_frames = max_end.div_ceil(FRAME_SIZE);
        if total_frames == 0 {
            return Err(FrameAllocatorError::NoAvailableMemory);
        }
        let bitmap_bytes = total_frames.div_ceil(BITS_PER_BITMAP_BYTE);

        let bitmap_phys = Self::place_bitmap(memory_map, reserved_end, bitmap_bytes);
        let bitmap_end = bitmap_phys + align_up(bitmap_bytes, FRAME_SIZE);

        let bitmap = storage(PhysAddr::new(bitmap_phys), bitmap_bytes as usize);
        if (bitmap.len() as u64) < bitmap_bytes {
            return Err(FrameAllocatorError::StorageTooSmall);
        }
        let bitmap = &mut bitmap[..bitmap_bytes as usize];
        bitmap.fill(FULL_BITMAP_BYTE);

        self.total_frames = total_frames;
        self.bitmap_phys = bitmap_phys;
        self.bitmap = Some(bitmap);

        for region in memory_map.available() {
            self.free_region(region.base, region.end());
        }

        // low memory, the kernel image and the bitmap itself are never handed out
        self.reserve_region(0, bitmap_end);
        self.scan_start = bitmap_end / FRAME_SIZE;

        log::info!(
            "frame allocator: {} frames, {} free, bitmap at {:#x} ({} bytes), scanning from frame {}",
            self.total_frames,
            self.free_frames,
            self.bitmap_phys,
            bitmap_bytes,
            self.scan_start
        );

        Ok(())
    }

    /// First available region with room for the bitmap above `reserved_end`,
    /// otherwise the frame right after `reserved_end`.
    fn place_bitmap(memory_map: &MemoryMap, reserved_end: u64, bitmap_bytes: u64) -> u64 {
        for region in memory_map.available() {
            let end = region.end();
            if end <= region.base || end <= reserved_end {
                continue;
            }
            let start = align_up(region.base.max(reserved_end), FRAME_SIZE);
            if start.saturating_add(bitmap_bytes) <= end {
                return start;
            }
        }

        // Not validated against the memory map; the loader is trusted to leave
        // room behind the image.
        log::warn!("frame allocator: no region fits the bitmap, placing it after the kernel");
        align_up(reserved_end, FRAME_SIZE)
    }

    /// Mark whole frames inside [start, end) as free.
    fn free_region(&mut self, start: u64, end: u64) {
        if end <= start {
            return;
        }
        let first = align_up(start, FRAME_SIZE) / FRAME_SIZE;
        let last = (align_down(end, FRAME_SIZE) / FRAME_SIZE).min(self.total_frames);
        for frame_index in first..last {
            if self.is_bit_set(frame_index) {
                self.clear_bit(frame_index);
            }
        }
    }

    /// Mark every frame touching [start, end) as used.
    fn reserve_region(&mut self, start: u64, end: u64) {
        if end <= start {
            return;
        }
        let first = align_down(start, FRAME_SIZE) / FRAME_SIZE;
        let last = (align_up(end, FRAME_SIZE) / FRAME_SIZE).min(self.total_frames);
        for frame_index in first..last {
            if !self.is_bit_set(frame_index) {
                self.set_bit(frame_index);
            }
        }
    }

    /// set a particular bit (1), saturating the free counter at 0
    fn set_bit(&mut self, frame_index: u64) {
        if let Some(bitmap) = self.bitmap.as_deref_mut() {
            bitmap[(frame_index / 8) as usize] |= 1 << (frame_index % 8);
            self.free_frames = self.free_frames.saturating_sub(1);
        }
    }

    /// clear a particular bit (0)
    fn clear_bit(&mut self, frame_index: u64) {
        if let Some(bitmap) = self.bitmap.as_deref_mut() {
            bitmap[(frame_index / 8) as usize] &= !(1 << (frame_index % 8));
            self.free_frames += 1;
        }
    }

    /// true if the frame is used; frames outside the bitmap count as used
    fn is_bit_set(&self, frame_index: u64) -> bool {
        match self.bitmap.as_deref() {
            Some(bitmap) if frame_index < self.total_frames => {
                bitmap[(frame_index / 8) as usize] & (1 << (frame_index % 8)) != 0
            }
            _ => true,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.bitmap.is_some()
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn free_frames(&self) -> u64 {
        self.free_frames
    }

    pub fn used_frames(&self) -> u64 {
        self.total_frames - self.free_frames
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            total: self.total_frames,
            free: self.free_frames,
            used: self.used_frames(),
        }
    }

    /// First frame index eligible for allocation.
    pub fn scan_start(&self) -> u64 {
        self.scan_start
    }

    /// Physical [start, end) of the bitmap storage, rounded out to whole frames.
    pub fn bitmap_region(&self) -> (PhysAddr, PhysAddr) {
        let bytes = self.total_frames.div_ceil(BITS_PER_BITMAP_BYTE);
        (
            PhysAddr::new(self.bitmap_phys),
            PhysAddr::new(self.bitmap_phys + align_up(bytes, FRAME_SIZE)),
        )
    }

    /// Check if frame is used. input: PhysFrame, output: bool
    pub fn is_frame_used(&self, frame: PhysFrame) -> bool {
        self.is_bit_set(frame.start_address().as_u64() / FRAME_SIZE)
    }

    /// Hands out the lowest free frame at or above the scan start.
    ///
    /// The scan start never moves, so every call searches from the same place
    /// and frames below it are never returned, even after being freed.
    pub fn allocate(&mut self) -> Option<PhysFrame> {
        let bitmap = self.bitmap.as_deref()?;

        let mut frame_index = self.scan_start;
        while frame_index < self.total_frames {
            // skip whole bytes of used frames
            if frame_index % 8 == 0 && bitmap[(frame_index / 8) as usize] == FULL_BITMAP_BYTE {
                frame_index += 8;
                continue;
            }
            if !self.is_bit_set(frame_index) {
                self.set_bit(frame_index);
                let addr = PhysAddr::new(frame_index * FRAME_SIZE);
                return Some(PhysFrame::containing_address(addr));
            }
            frame_index += 1;
        }

        None
    }

    /// Returns a frame previously handed out by [`allocate`](Self::allocate).
    ///
    /// Misaligned addresses, frames outside the bitmap and frames that are
    /// already free are rejected without touching any state.
    pub fn free(&mut self, addr: PhysAddr) -> Result<(), FrameAllocatorError> {
        if !self.is_ready() {
            return Err(FrameAllocatorError::NotReady);
        }
        if addr.as_u64() % FRAME_SIZE != 0 {
            return Err(FrameAllocatorError::Misaligned);
        }
        let frame_index = addr.as_u64() / FRAME_SIZE;
        if frame_index >= self.total_frames {
            return Err(FrameAllocatorError::OutOfRange);
        }
        if !self.is_bit_set(frame_index) {
            return Err(FrameAllocatorError::DoubleFree);
        }

        self.clear_bit(frame_index);
        Ok(())
    }
}
