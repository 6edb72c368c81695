//! Legacy 8259 PIC and 8253 PIT setup.

use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;

use crate::constants::{
    idt::{
        PIC_1_MASK, PIC_1_OFFSET, PIC_2_MASK, PIC_2_OFFSET, PIT_BASE_FREQUENCY,
        PIT_MODE_RATE_GENERATOR,
    },
    ports::{PIT_CHANNEL0_PORT, PIT_COMMAND_PORT},
};

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// Remaps both PICs above the CPU exceptions, leaves only the timer and the
/// keyboard unmasked and starts the timer at `timer_hz`.
pub fn init(timer_hz: u32) {
    unsafe {
        let mut pics = PICS.lock();
        pics.initialize();
        pics.write_masks(PIC_1_MASK, PIC_2_MASK);
    }
    init_timer(timer_hz);
    log::info!(
        "PIC remapped to {:#x}/{:#x}, timer at {} Hz",
        PIC_1_OFFSET,
        PIC_2_OFFSET,
        timer_hz
    );
}

/// Reload value for PIT channel 0, clamped to what the 16-bit counter holds.
pub fn pit_divisor(hz: u32) -> u16 {
    let divisor = PIT_BASE_FREQUENCY / hz.max(1);
    divisor.clamp(1, u16::MAX as u32) as u16
}

fn init_timer(hz: u32) {
    let divisor = pit_divisor(hz);
    let mut command: Port<u8> = Port::new(PIT_COMMAND_PORT);
    let mut channel0: Port<u8> = Port::new(PIT_CHANNEL0_PORT);
    unsafe {
        command.write(PIT_MODE_RATE_GENERATOR);
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }
}

/// Acknowledges `vector` so the PIC delivers the next interrupt.
pub fn end_of_interrupt(vector: u8) {
    unsafe { PICS.lock().notify_end_of_interrupt(vector) };
}

#[cfg(test)]
mod tests {
    use super::pit_divisor;

    #[test]
    fn test_pit_divisor() {
        assert_eq!(pit_divisor(100), 11931);
        assert_eq!(pit_divisor(1), u16::MAX);
        assert_eq!(pit_divisor(0), u16::MAX);
        assert_eq!(pit_divisor(2_000_000), 1);
    }
}
