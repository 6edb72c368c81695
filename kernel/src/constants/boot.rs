//! Multiboot2 boot information layout.

/// Tag type that terminates the tag list.
pub const MULTIBOOT2_TAG_END: u32 = 0;
/// Tag type carrying the physical memory map.
pub const MULTIBOOT2_TAG_MEMORY_MAP: u32 = 6;

/// Fixed header in front of the first tag (total_size + reserved).
pub const INFO_HEADER_SIZE: usize = 8;
/// Smallest blob that can hold the header and an end tag.
pub const MIN_INFO_SIZE: usize = 16;
/// Every tag starts with `type: u32, size: u32`.
pub const TAG_HEADER_SIZE: usize = 8;
/// Memory map tag header: tag header + entry_size + entry_version.
pub const MEMORY_MAP_HEADER_SIZE: usize = 16;
/// base: u64, length: u64, type: u32, reserved: u32.
pub const MEMORY_MAP_ENTRY_MIN_SIZE: usize = 24;
/// Tags are padded to this boundary.
pub const TAG_ALIGN: usize = 8;
