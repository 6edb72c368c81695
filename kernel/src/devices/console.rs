//! Character output sink.
//!
//! The terminal that renders characters lives outside the kernel core; the
//! core only needs somewhere to put single characters. [`Console`] owns COM1
//! and mirrors every byte to the debug-console port so headless runs can
//! capture output with `-debugcon`. Log lines, the panic message and
//! `int 0x80` writes all go through the same [`CONSOLE`].

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;
use uart_16550::SerialPort;
use x86_64::instructions::{interrupts::without_interrupts, port::Port};

use crate::constants::ports::{DEBUGCON_PORT, SERIAL_PORT};

/// Where syscalls and the boot banner write characters.
pub trait CharSink {
    fn put_char(&mut self, c: char);

    fn clear(&mut self);

    fn backspace(&mut self);

    fn put_str(&mut self, s: &str) {
        for c in s.chars() {
            self.put_char(c);
        }
    }
}

/// Adapts any [`CharSink`] to `core::fmt::Write`.
pub struct SinkWriter<'a, S: CharSink + ?Sized>(pub &'a mut S);

impl<S: CharSink + ?Sized> fmt::Write for SinkWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.put_str(s);
        Ok(())
    }
}

pub struct Console {
    uart: SerialPort,
    debugcon: Port<u8>,
}

impl Console {
    /// Programs the UART and takes both ports.
    ///
    /// # Safety
    /// Nothing else may drive COM1 or port 0xE9.
    unsafe fn open() -> Self {
        let mut uart = SerialPort::new(SERIAL_PORT);
        uart.init();
        Self {
            uart,
            debugcon: Port::new(DEBUGCON_PORT),
        }
    }

    fn mirror(&mut self, byte: u8) {
        unsafe { self.debugcon.write(byte) };
    }
}

impl CharSink for Console {
    fn put_char(&mut self, c: char) {
        if c.is_ascii() {
            self.uart.send(c as u8);
            self.mirror(c as u8);
        } else {
            let mut utf8 = [0; 4];
            for &byte in c.encode_utf8(&mut utf8).as_bytes() {
                self.uart.send(byte);
            }
        }
    }

    fn clear(&mut self) {
        // ANSI: erase display, cursor home
        for byte in *b"\x1b[2J\x1b[H" {
            self.uart.send(byte);
        }
    }

    fn backspace(&mut self) {
        // uart_16550 expands backspace into "\x08 \x08"
        self.uart.send(0x08);
        for byte in [0x08, b' ', 0x08] {
            self.mirror(byte);
        }
    }
}

lazy_static! {
    /// The kernel console. COM1 is programmed on first access.
    pub static ref CONSOLE: Mutex<Console> = Mutex::new(unsafe { Console::open() });
}

/// Runs `f` against the global console with interrupts masked.
pub fn with_console<F, R>(f: F) -> R
where
    F: FnOnce(&mut Console) -> R,
{
    without_interrupts(|| f(&mut CONSOLE.lock()))
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    with_console(|console| {
        // A failed console write has nowhere else to be reported.
        let _ = SinkWriter(console).write_fmt(args);
    });
}

/// Prints formatted text to the kernel console.
///
/// # Examples
/// ```ignore
/// console_print!("{} frames free", free);
/// ```
#[macro_export]
macro_rules! console_print {
    ($($arg:tt)*) => {
        $crate::devices::console::_print(format_args!($($arg)*))
    };
}

/// Prints formatted text to the kernel console, followed by a newline.
#[macro_export]
macro_rules! console_println {
    () => ($crate::console_print!("\n"));
    ($($arg:tt)*) => ($crate::console_print!("{}\n", format_args!($($arg)*)));
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{CharSink, SinkWriter};
    use core::fmt::Write;
    use std::string::String;

    /// Records everything written to it.
    #[derive(Default)]
    pub(crate) struct Capture {
        pub(crate) text: String,
        pub(crate) clears: usize,
    }

    impl CharSink for Capture {
        fn put_char(&mut self, c: char) {
            self.text.push(c);
        }

        fn clear(&mut self) {
            self.text.clear();
            self.clears += 1;
        }

        fn backspace(&mut self) {
            self.text.pop();
        }
    }

    #[test]
    fn test_put_str_writes_every_char() {
        let mut sink = Capture::default();
        sink.put_str("ok\n");
        sink.backspace();
        assert_eq!(sink.text, "ok");
        sink.clear();
        assert_eq!(sink.text, "");
        assert_eq!(sink.clears, 1);
    }

    #[test]
    fn test_formatted_output_reaches_sink() {
        let mut sink = Capture::default();
        write!(SinkWriter(&mut sink), "[{:>6}] {:#x} é", 42, 0x1000).unwrap();
        assert_eq!(sink.text, "[    42] 0x1000 é");
    }
}
