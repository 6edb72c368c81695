//! Multiboot2 memory map ingestion
//!
//! - Walks the tagged boot information blob handed over by the loader
//! - Normalizes every memory map entry into a [`MemoryRegion`]
//! - Never trusts declared sizes: a record that would read past the blob ends the walk

use arrayvec::ArrayVec;

use crate::constants::{
    boot::{
        INFO_HEADER_SIZE, MEMORY_MAP_ENTRY_MIN_SIZE, MEMORY_MAP_HEADER_SIZE, MIN_INFO_SIZE,
        MULTIBOOT2_TAG_END, MULTIBOOT2_TAG_MEMORY_MAP, TAG_ALIGN, TAG_HEADER_SIZE,
    },
    memory::MAX_MEMORY_REGIONS,
};

/// Classification reported by the loader for a span of physical memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    Available,
    Reserved,
    AcpiReclaimable,
    AcpiNvs,
    Defective,
    Unknown(u32),
}

impl RegionKind {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => RegionKind::Available,
            2 => RegionKind::Reserved,
            3 => RegionKind::AcpiReclaimable,
            4 => RegionKind::AcpiNvs,
            5 => RegionKind::Defective,
            other => RegionKind::Unknown(other),
        }
    }
}

/// One normalized memory map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub length: u64,
    pub kind: RegionKind,
}

impl MemoryRegion {
    pub fn new(base: u64, length: u64, kind: RegionKind) -> Self {
        Self { base, length, kind }
    }

    /// Exclusive end address, clamped to the top of the address space.
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    pub fn is_available(&self) -> bool {
        self.kind == RegionKind::Available
    }
}

/// Bounded, ordered table of the regions reported at boot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryMap {
    regions: ArrayVec<MemoryRegion, MAX_MEMORY_REGIONS>,
}

impl MemoryMap {
    pub const fn new() -> Self {
        Self {
            regions: ArrayVec::new_const(),
        }
    }

    /// Appends a region; returns false (and drops it) once the table is full.
    pub fn push(&mut self, region: MemoryRegion) -> bool {
        self.regions.try_push(region).is_ok()
    }

    pub fn is_full(&self) -> bool {
        self.regions.is_full()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MemoryRegion> {
        self.regions.get(index)
    }

    pub fn regions(&self) -> impl Iterator<Item = &MemoryRegion> + '_ {
        self.regions.iter()
    }

    pub fn available(&self) -> impl Iterator<Item = &MemoryRegion> + '_ {
        self.regions.iter().filter(|r| r.is_available())
    }

    /// Highest end address among Available regions, 0 if there are none.
    pub fn highest_available_end(&self) -> u64 {
        self.available().map(MemoryRegion::end).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootInfoError {
    NullAddress,
    Truncated,
    NoMemoryMap,
}

impl core::fmt::Display for BootInfoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BootInfoError::NullAddress => write!(f, "Boot information address is null"),
            BootInfoError::Truncated => write!(f, "Boot information blob is too short"),
            BootInfoError::NoMemoryMap => write!(f, "No memory regions reported by the loader"),
        }
    }
}

fn read_u32(blob: &[u8], offset: usize) -> Option<u32> {
    let bytes = blob.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_u64(blob: &[u8], offset: usize) -> Option<u64> {
    let bytes = blob.get(offset..offset.checked_add(8)?)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

/// Parses a Multiboot2 information blob.
///
/// The walk stops at the end tag, at the declared total size, or at the first
/// tag whose size is malformed. Regions collected before an abort are kept.
///
/// # Returns
/// The collected regions, or an error if none could be collected
pub fn parse(blob: &[u8]) -> Result<MemoryMap, BootInfoError> {
    let total_size = read_u32(blob, 0).ok_or(BootInfoError::Truncated)? as usize;
    if total_size < MIN_INFO_SIZE {
        return Err(BootInfoError::Truncated);
    }
    let end = total_size.min(blob.len());

    let mut map = MemoryMap::new();
    let mut tag = INFO_HEADER_SIZE;

    while tag + TAG_HEADER_SIZE <= end {
        let (Some(tag_type), Some(tag_size)) = (read_u32(blob, tag), read_u32(blob, tag + 4))
        else {
            break;
        };
        let tag_size = tag_size as usize;

        if tag_type == MULTIBOOT2_TAG_END {
            break;
        }
        if tag_size < TAG_HEADER_SIZE || tag + tag_size > end {
            log::warn!(
                "multiboot: malformed tag type {} size {} at offset {:#x}",
                tag_type,
                tag_size,
                tag
            );
            break;
        }

        if tag_type == MULTIBOOT2_TAG_MEMORY_MAP && tag_size >= MEMORY_MAP_HEADER_SIZE {
            read_memory_map_tag(&blob[tag..tag + tag_size], &mut map);
        }

        tag = align_up(tag + tag_size, TAG_ALIGN);
    }

    if map.is_empty() {
        return Err(BootInfoError::NoMemoryMap);
    }
    Ok(map)
}

/// Collects the fixed-size entries of one memory map tag into `map`.
fn read_memory_map_tag(tag: &[u8], map: &mut MemoryMap) {
    let Some(entry_size) = read_u32(tag, 8).map(|s| s as usize) else {
        return;
    };
    if entry_size < MEMORY_MAP_ENTRY_MIN_SIZE {
        return;
    }

    let mut entry = MEMORY_MAP_HEADER_SIZE;
    while entry + entry_size <= tag.len() && !map.is_full() {
        let (Some(base), Some(length), Some(kind)) = (
            read_u64(tag, entry),
            read_u64(tag, entry + 8),
            read_u32(tag, entry + 16),
        ) else {
            return;
        };
        map.push(MemoryRegion::new(base, length, RegionKind::from_raw(kind)));
        entry += entry_size;
    }
}

/// Parses the blob the loader left at `addr`.
///
/// # Safety
/// `addr` must be 0 or point to an identity-mapped Multiboot2 information
/// structure whose `total_size` bytes are readable.
pub unsafe fn from_address(addr: u64) -> Result<MemoryMap, BootInfoError> {
    if addr == 0 {
        return Err(BootInfoError::NullAddress);
    }
    let total_size = core::ptr::read_unaligned(addr as *const u32) as usize;
    if total_size < MIN_INFO_SIZE {
        return Err(BootInfoError::Truncated);
    }
    let blob = core::slice::from_raw_parts(addr as *const u8, total_size);
    parse(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    /// Builds a boot information blob from (type, payload) tags.
    fn blob(tags: &[(u32, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0u8; 8];
        for (tag_type, payload) in tags {
            out.extend_from_slice(&tag_type.to_le_bytes());
            out.extend_from_slice(&((payload.len() + 8) as u32).to_le_bytes());
            out.extend_from_slice(payload);
            while out.len() % 8 != 0 {
                out.push(0);
            }
        }
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&8u32.to_le_bytes());
        let total = out.len() as u32;
        out[0..4].copy_from_slice(&total.to_le_bytes());
        out
    }

    fn mmap_payload(entries: &[(u64, u64, u32)]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&24u32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        for (base, length, kind) in entries {
            payload.extend_from_slice(&base.to_le_bytes());
            payload.extend_from_slice(&length.to_le_bytes());
            payload.extend_from_slice(&kind.to_le_bytes());
            payload.extend_from_slice(&0u32.to_le_bytes());
        }
        payload
    }

    #[test]
    fn test_parses_memory_map_tag() {
        let info = blob(&[
            (1, b"cmdline\0".to_vec()),
            (
                MULTIBOOT2_TAG_MEMORY_MAP,
                mmap_payload(&[(0, 0x9FC00, 1), (0xF0000, 0x10000, 2), (0x100000, 0x7EE0000, 1)]),
            ),
        ]);

        let map = parse(&info).expect("map should parse");
        assert_eq!(map.len(), 3);
        assert_eq!(
            map.get(1),
            Some(&MemoryRegion::new(0xF0000, 0x10000, RegionKind::Reserved))
        );
        assert_eq!(map.available().count(), 2);
        assert_eq!(map.highest_available_end(), 0x7FE0000);
    }

    #[test]
    fn test_rejects_short_blobs() {
        assert_eq!(parse(&[]), Err(BootInfoError::Truncated));
        assert_eq!(parse(&[8, 0, 0, 0, 0, 0, 0, 0]), Err(BootInfoError::Truncated));
    }

    #[test]
    fn test_blob_without_memory_map_fails() {
        let info = blob(&[(1, b"cmdline\0".to_vec())]);
        assert_eq!(parse(&info), Err(BootInfoError::NoMemoryMap));
    }

    #[test]
    fn test_overlong_tag_keeps_earlier_regions() {
        let mut info = blob(&[
            (MULTIBOOT2_TAG_MEMORY_MAP, mmap_payload(&[(0x100000, 0x100000, 1)])),
            (4, vec![0u8; 8]),
        ]);
        // second tag starts after the 8-byte header and the 40-byte mmap tag
        let second = 8 + 40;
        info[second + 4..second + 8].copy_from_slice(&0x1000u32.to_le_bytes());

        let map = parse(&info).expect("regions before the bad tag survive");
        assert_eq!(map.len(), 1);
        assert!(map.get(0).is_some_and(MemoryRegion::is_available));
    }

    #[test]
    fn test_tags_after_end_tag_are_ignored() {
        let mut info = blob(&[(
            MULTIBOOT2_TAG_MEMORY_MAP,
            mmap_payload(&[(0x100000, 0x100000, 1)]),
        )]);
        // a well-formed memory map tag behind the end tag, inside the declared size
        let trailing = mmap_payload(&[(0x4000_0000, 0x100000, 1)]);
        info.extend_from_slice(&MULTIBOOT2_TAG_MEMORY_MAP.to_le_bytes());
        info.extend_from_slice(&((trailing.len() + 8) as u32).to_le_bytes());
        info.extend_from_slice(&trailing);
        let total = info.len() as u32;
        info[0..4].copy_from_slice(&total.to_le_bytes());

        let map = parse(&info).expect("map should parse");
        assert_eq!(map.len(), 1);
        assert_eq!(map.highest_available_end(), 0x200000);
    }

    #[test]
    fn test_undersized_entries_are_ignored() {
        let mut payload = mmap_payload(&[(0x100000, 0x100000, 1)]);
        payload[0..4].copy_from_slice(&16u32.to_le_bytes());
        let info = blob(&[(MULTIBOOT2_TAG_MEMORY_MAP, payload)]);
        assert_eq!(parse(&info), Err(BootInfoError::NoMemoryMap));
    }

    #[test]
    fn test_extra_regions_are_dropped() {
        let entries: Vec<(u64, u64, u32)> = (0..80u64).map(|i| (i * 0x1000, 0x1000, 1)).collect();
        let info = blob(&[(MULTIBOOT2_TAG_MEMORY_MAP, mmap_payload(&entries))]);

        let map = parse(&info).expect("map should parse");
        assert_eq!(map.len(), MAX_MEMORY_REGIONS);
        assert_eq!(map.get(MAX_MEMORY_REGIONS - 1).map(|r| r.base), Some(63 * 0x1000));
    }

    #[test]
    fn test_unknown_kinds_are_preserved() {
        assert_eq!(RegionKind::from_raw(1), RegionKind::Available);
        assert_eq!(RegionKind::from_raw(20), RegionKind::Unknown(20));
    }

    #[test]
    fn test_from_address_reads_live_blob() {
        let info = blob(&[(MULTIBOOT2_TAG_MEMORY_MAP, mmap_payload(&[(0x100000, 0x1000, 1)]))]);
        let map = unsafe { from_address(info.as_ptr() as u64) }.expect("map should parse");
        assert_eq!(map.len(), 1);
        assert_eq!(unsafe { from_address(0) }.err(), Some(BootInfoError::NullAddress));
    }
}
