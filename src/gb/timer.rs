use crate::gb::bus::InterruptRegister;
use crate::gb::constants::*;

bitflags! {
    /// Represents the timer control register (TAC) at 0xFF07.
    /// Bits 0..1 select the divider tap, bit 2 gates the timer.
    #[derive(Copy, Clone, PartialEq, Debug, Default)]
    pub struct TimerControl: u8 {
        const TAP_LOW  = 0b0000_0001;
        const TAP_HIGH = 0b0000_0010;
        const ENABLE   = 0b0000_0100;
    }
}

impl TimerControl {
    #[inline(always)]
    pub fn is_enabled(&self) -> bool {
        self.contains(TimerControl::ENABLE)
    }

    /// The bit of the internal divider this control selects. A falling edge
    /// on that bit increments TIMA, which yields the documented divider
    /// ratios of 1024, 16, 64 and 256 master cycles.
    #[inline]
    pub fn tap_index(&self) -> u16 {
        match self.bits() & 0b11 {
            0b00 => 9,
            0b01 => 3,
            0b10 => 5,
            _ => 7,
        }
    }
}

/// The programmable interval timer: DIV is the high byte of a free-running
/// 16-bit counter advancing once per master cycle; TIMA increments on every
/// falling edge of the TAC-selected counter bit and reloads from TMA (with
/// an interrupt) one cycle after overflowing.
#[derive(Clone, Default)]
pub struct Timer {
    pub divider: u16,
    pub counter: u8,
    pub modulo: u8,
    pub control: TimerControl,
    overflow_pending: bool,
    previous_tap: bool,
}

impl Timer {
    /// Advances the timer for the given number of master cycles.
    pub fn step(&mut self, int_reg: &mut InterruptRegister, cycles: u16) {
        for _ in 0..cycles {
            self.tick(int_reg);
        }
    }

    /// Advances the internal counter by one master cycle.
    fn tick(&mut self, int_reg: &mut InterruptRegister) {
        if self.overflow_pending {
            // The reload and the interrupt land one cycle after the
            // overflow. A TIMA write in between has cleared the flag.
            self.counter = self.modulo;
            self.overflow_pending = false;
            int_reg.insert(InterruptRegister::TIMER);
        }

        self.divider = self.divider.wrapping_add(1);
        let tap = self.tap_state();
        if self.previous_tap && !tap {
            self.increment_counter();
        }
        self.previous_tap = tap;
    }

    /// Current state of the selected tap bit, gated by the enable bit.
    #[inline]
    fn tap_state(&self) -> bool {
        self.control.is_enabled() && (self.divider >> self.control.tap_index()) & 1 != 0
    }

    fn increment_counter(&mut self) {
        let (counter, overflow) = self.counter.overflowing_add(1);
        self.counter = counter;
        self.overflow_pending = overflow;
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            // Any write resets the whole internal counter. Zeroing it can
            // produce a falling edge on the tap, which still counts.
            TIMER_DIVIDER => {
                let old_tap = self.tap_state();
                self.divider = 0;
                self.finish_register_write(old_tap);
            }
            TIMER_COUNTER => {
                self.overflow_pending = false;
                self.counter = value;
            }
            // A reload scheduled for the next cycle picks up the new value.
            TIMER_MODULO => self.modulo = value,
            // Changing the tap selection or the enable bit can also produce
            // a falling edge.
            TIMER_CTRL => {
                let old_tap = self.tap_state();
                self.control = TimerControl::from_bits_truncate(value);
                self.finish_register_write(old_tap);
            }
            _ => panic!("Attempt to write to unmapped timer register: {address:#06x}"),
        }
    }

    /// Applies the spurious falling edge a DIV or TAC write may cause.
    fn finish_register_write(&mut self, old_tap: bool) {
        let new_tap = self.tap_state();
        if old_tap && !new_tap {
            self.increment_counter();
        }
        self.previous_tap = new_tap;
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            TIMER_DIVIDER => (self.divider >> 8) as u8,
            TIMER_COUNTER => self.counter,
            TIMER_MODULO => self.modulo,
            // Undocumented bits should be 1
            TIMER_CTRL => self.control.bits() | 0b1111_1000,
            _ => panic!("Attempt to read from unmapped timer register: {address:#06x}"),
        }
    }
}
