use core::fmt::Write;

use spin::Mutex;

use crate::arch::x86::{inb, outb};

const COM1: u16 = 0x3F8;

const SERIAL_TEST_BYTE: u8 = 0xAE; // Arbitrary test byte for self-test

const SERIAL_DATA_OFFSET: u16 = 0;
const SERIAL_INTERRUPT_ENABLE_OFFSET: u16 = 1;
const SERIAL_FCR_OFFSET: u16 = 2; // FIFO Control Register
const SERIAL_LCR_OFFSET: u16 = 3; // Line Control Register
const SERIAL_MCR_OFFSET: u16 = 4; // Modem Control Register
const SERIAL_LSR_OFFSET: u16 = 5; // Line Status Register

// NOTE: while DLAB is set, offsets 0 and 1 address the baud rate divisor instead of the data and
// interrupt enable registers.
const SERIAL_LCR_DLAB: u8 = 0x80;
const SERIAL_BAUD_RATE_DIVISOR_LOW_OFFSET: u16 = 0;
const SERIAL_BAUD_RATE_DIVISOR_HIGH_OFFSET: u16 = 1;

const SERIAL_LCR_8N1: u8 = 0x03; // 8 bits, no parity, one stop bit
const SERIAL_FCR_FIFO_14B_THRESHOLD: u8 = 0xC7; // Enable FIFO, clear them, 14-byte threshold
const SERIAL_LOOPBACK_ENABLE: u8 = 0x1E; // RTS, OUT1, OUT2, LOOP
const SERIAL_LOOPBACK_DISABLE: u8 = 0x0F; // DTR, RTS, OUT1, OUT2

const SERIAL_LSR_TRANSMIT_MASK: u8 = 0x20; // transmit holding register empty

/// Kernel console. Lock it with interrupts disabled: the timer handler may log.
pub static SERIAL: Mutex<Serial> = Mutex::new(Serial::new(COM1));

pub fn init() -> bool {
    SERIAL.lock().init()
}

pub struct Serial {
    port: u16,
}

impl Serial {
    pub const fn new(port: u16) -> Self {
        Serial { port }
    }

    /// Program the UART for 115200 baud 8N1 with its own interrupts off, then run a loopback
    /// self-test. Returns whether the port echoed the test byte back.
    pub fn init(&self) -> bool {
        outb(self.port + SERIAL_INTERRUPT_ENABLE_OFFSET, 0x00);

        // divisor 1 -> 115200 baud
        outb(self.port + SERIAL_LCR_OFFSET, SERIAL_LCR_DLAB);
        outb(self.port + SERIAL_BAUD_RATE_DIVISOR_LOW_OFFSET, 0x01);
        outb(self.port + SERIAL_BAUD_RATE_DIVISOR_HIGH_OFFSET, 0x00);

        // also clears DLAB
        outb(self.port + SERIAL_LCR_OFFSET, SERIAL_LCR_8N1);
        outb(self.port + SERIAL_FCR_OFFSET, SERIAL_FCR_FIFO_14B_THRESHOLD);

        outb(self.port + SERIAL_MCR_OFFSET, SERIAL_LOOPBACK_ENABLE);
        outb(self.port + SERIAL_DATA_OFFSET, SERIAL_TEST_BYTE);
        let echoed = inb(self.port + SERIAL_DATA_OFFSET) == SERIAL_TEST_BYTE;

        outb(self.port + SERIAL_MCR_OFFSET, SERIAL_LOOPBACK_DISABLE);
        echoed
    }

    fn is_transmit_empty(&self) -> bool {
        (inb(self.port + SERIAL_LSR_OFFSET) & SERIAL_LSR_TRANSMIT_MASK) != 0
    }

    pub fn write_byte(&self, byte: u8) {
        while !self.is_transmit_empty() {}

        outb(self.port + SERIAL_DATA_OFFSET, byte);
    }

    pub fn write_string(&self, s: &str) {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }

            self.write_byte(byte);
        }
    }
}

impl Write for Serial {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

impl core::fmt::Debug for Serial {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Serial")
            .field("port", &format_args!("0x{:04X}", self.port))
            .finish()
    }
}
