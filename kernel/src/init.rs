//! Boot sequence, from the first Rust instruction to the foreground loop.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::{
    boot, console_println,
    constants::idt::TIMER_FREQUENCY,
    debug_println,
    devices::{
        self,
        console::{with_console, CharSink},
    },
    interrupts::{self, idt, pic, syscalls},
    logging, memory,
    memory::frame_allocator::{alloc_page, free_page},
    scheduler,
};

/// Rounds each demo worker runs before it only yields.
const WORKER_ROUNDS: u32 = 3;

static PENDING_SCANCODE: AtomicBool = AtomicBool::new(false);
static LAST_SCANCODE: AtomicU8 = AtomicU8::new(0);

/// Brings the kernel up and runs the foreground loop.
///
/// # Arguments
/// * `multiboot_addr` - physical address of the Multiboot2 information blob
/// * `reserved_end` - end of the kernel image and bootstrap data
pub fn kernel_main(multiboot_addr: u64, reserved_end: u64) -> ! {
    if logging::init().is_err() {
        console_println!("Logger already installed");
    }
    interrupts::disable();
    with_console(|console| console.clear());
    console_println!("Booting keel...");

    idt::build_and_load();

    let written = syscalls::trigger_write(b"Hello from int 0x80\n");
    log::info!("Syscall self-test wrote {} bytes", written as i64);

    devices::set_keyboard_handler(record_scancode);
    pic::init(TIMER_FREQUENCY);

    init_memory(multiboot_addr, reserved_end);

    scheduler::init();
    for worker in [worker_a as scheduler::TaskEntry, worker_b] {
        if let Err(e) = scheduler::spawn(worker) {
            log::error!("Could not start worker: {}", e);
        }
    }

    interrupts::enable();
    log::info!("Boot complete, entering foreground loop");

    loop {
        scheduler::schedule();
        report_scancode();
        x86_64::instructions::hlt();
    }
}

fn init_memory(multiboot_addr: u64, reserved_end: u64) {
    let map = match unsafe { boot::init(multiboot_addr) } {
        Ok(map) => map,
        Err(e) => {
            log::error!("Memory map unavailable: {}", e);
            return;
        }
    };
    log::info!(
        "Memory map: {} regions, highest usable address {:#x}",
        map.len(),
        map.highest_available_end()
    );

    match memory::init(map, reserved_end) {
        Ok(stats) => log::info!(
            "Frame allocator ready: {} frames, {} free, {} used",
            stats.total,
            stats.free,
            stats.used
        ),
        Err(e) => log::error!("Frame allocator not ready: {}", e),
    }
}

fn record_scancode(scancode: u8) {
    LAST_SCANCODE.store(scancode, Ordering::Relaxed);
    PENDING_SCANCODE.store(true, Ordering::Release);
}

fn report_scancode() {
    if PENDING_SCANCODE.swap(false, Ordering::Acquire) {
        log::debug!("Scancode {:#04x}", LAST_SCANCODE.load(Ordering::Relaxed));
    }
}

/// Borrows a frame, reports it and yields, a few times over.
fn exercise_frames(name: &str) -> ! {
    for round in 0..WORKER_ROUNDS {
        let page = alloc_page();
        if page == 0 {
            log::warn!(
                "{} (task {}): no frame available",
                name,
                scheduler::current_task_id()
            );
        } else {
            debug_println!("{}: {:?}", name, memory::frame_allocator::stats());
            log::info!(
                "{} (task {}) round {} holds frame {:#x}",
                name,
                scheduler::current_task_id(),
                round,
                page
            );
            release_frame(name, page, free_page);
        }
        scheduler::schedule();
    }

    log::info!("{} done, {:?}", name, memory::frame_allocator::stats());
    loop {
        scheduler::schedule();
        x86_64::instructions::hlt();
    }
}

/// Hands `page` back through `free`, warning when it is refused.
fn release_frame(name: &str, page: u64, free: fn(u64) -> bool) -> bool {
    let returned = free(page);
    if !returned {
        log::warn!("{}: frame {:#x} was not returned", name, page);
    }
    returned
}

extern "C" fn worker_a() -> ! {
    exercise_frames("worker A")
}

extern "C" fn worker_b() -> ! {
    exercise_frames("worker B")
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicU64;

    static FREED: AtomicU64 = AtomicU64::new(0);

    fn accept(addr: u64) -> bool {
        FREED.store(addr, Ordering::SeqCst);
        true
    }

    fn refuse(_: u64) -> bool {
        false
    }

    #[test]
    fn test_release_frame_reports_refusal() {
        assert!(release_frame("worker", 0x200000, accept));
        assert_eq!(FREED.load(Ordering::SeqCst), 0x200000);
        assert!(!release_frame("worker", 0x200000, refuse));
    }
}
