//! Boot information handed over by the loader.

pub mod multiboot;

use spin::Once;

use multiboot::{BootInfoError, MemoryMap};

/// Snapshot of the loader's memory map, taken once per boot.
static MEMORY_MAP: Once<MemoryMap> = Once::new();

/// Ingests the Multiboot2 memory map at `info_addr`.
///
/// Only the first call parses; later calls observe the same snapshot. A failed
/// ingestion is recorded as an empty map.
///
/// # Safety
/// See [`multiboot::from_address`].
pub unsafe fn init(info_addr: u64) -> Result<&'static MemoryMap, BootInfoError> {
    let mut outcome = Ok(());
    let map = MEMORY_MAP.call_once(|| match multiboot::from_address(info_addr) {
        Ok(map) => map,
        Err(e) => {
            outcome = Err(e);
            MemoryMap::new()
        }
    });
    outcome?;

    if map.is_empty() {
        return Err(BootInfoError::NoMemoryMap);
    }
    for region in map.regions() {
        log::debug!(
            "memory region {:#014x}..{:#014x} {:?}",
            region.base,
            region.end(),
            region.kind
        );
    }
    Ok(map)
}
