use crate::gb::audio::AudioProcessor;
use crate::gb::cartridge::Cartridge;
use crate::gb::constants::*;
use crate::gb::joypad::{Button, Joypad};
use crate::gb::ppu::PPU;
use crate::gb::timer::Timer;
use crate::gb::{Bus, SubSystem};

bitflags! {
    /// Represents interrupt registers IE at 0xFFFF and IF at 0xFF0F
    #[derive(Copy, Clone, PartialEq, Debug, Default)]
    pub struct InterruptRegister: u8 {
        const VBLANK = 0b00000001; // V-Blank Interrupt
        const STAT   = 0b00000010; // LCD STAT Interrupt
        const TIMER  = 0b00000100; // Timer Overflow Interrupt
        const SERIAL = 0b00001000; // Serial Transfer Completion Interrupt
        const JOYPAD = 0b00010000; // Joypad Input Interrupt
    }
}

impl InterruptRegister {
    /// Returns the interrupt with the highest priority, the lowest set bit.
    #[inline]
    pub fn highest_prio(&self) -> Option<InterruptRegister> {
        self.iter_names().map(|(_, irq)| irq).next()
    }

    /// The handler address the CPU jumps to for this interrupt.
    pub fn vector(&self) -> u16 {
        match *self {
            InterruptRegister::VBLANK => 0x0040,
            InterruptRegister::STAT => 0x0048,
            InterruptRegister::TIMER => 0x0050,
            InterruptRegister::SERIAL => 0x0058,
            InterruptRegister::JOYPAD => 0x0060,
            _ => unreachable!("not a single interrupt source"),
        }
    }
}

/// Defines a global Bus, all processing units should access memory through
/// it. It owns every addressable subsystem and fans the CPU cycle counts
/// out to the clocked ones.
#[derive(Clone)]
pub struct MainBus {
    pub cartridge: Cartridge,
    timer: Timer,
    pub ppu: PPU,
    pub joypad: Joypad,
    apu: AudioProcessor,
    pub interrupt_enable: InterruptRegister,
    pub interrupt_flag: InterruptRegister,
    serial_data: u8,
    serial_ctrl: u8,
    wram: [u8; WRAM_SIZE],
    hram: [u8; HRAM_SIZE],
}

impl MainBus {
    pub fn with_cartridge(cartridge: Cartridge) -> Self {
        Self {
            cartridge,
            timer: Timer::default(),
            ppu: PPU::default(),
            joypad: Joypad::default(),
            apu: AudioProcessor::default(),
            interrupt_enable: InterruptRegister::default(),
            interrupt_flag: InterruptRegister::default(),
            serial_data: 0,
            serial_ctrl: 0,
            wram: [0u8; WRAM_SIZE],
            hram: [0u8; HRAM_SIZE],
        }
    }

    /// Advances the clocked subsystems by the master cycles the CPU just
    /// consumed. Interrupts they raise land in IF and become visible to the
    /// following instruction.
    pub fn step(&mut self, cycles: u16) {
        self.ppu.step(&mut self.interrupt_flag, cycles);
        self.timer.step(&mut self.interrupt_flag, cycles);
    }

    /// Updates the joypad latch and raises the joypad interrupt on a press.
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        if self.joypad.set_button(button, pressed) {
            self.interrupt_flag.insert(InterruptRegister::JOYPAD);
        }
    }

    /// OAM DMA: copies 160 bytes from `value << 8` into OAM, bypassing the
    /// PPU access gate.
    fn dma_transfer(&mut self, value: u8) {
        let source = u16::from(value) << 8;
        for offset in 0..OAM_SIZE as u16 {
            let byte = self.read(source.wrapping_add(offset));
            self.ppu.dma_write_oam(offset as u8, byte);
        }
    }

    /// Handles all writes to the I/O registers (0xFF00-0xFF7F)
    fn write_io(&mut self, address: u16, value: u8) {
        match address {
            JOYPAD => self.joypad.write(value),
            // Serial transfer is not emulated, the registers just hold
            // their values.
            SERIAL_TRANSFER_DATA => self.serial_data = value,
            SERIAL_TRANSFER_CTRL => self.serial_ctrl = value,
            TIMER_DIVIDER..=TIMER_CTRL => self.timer.write(address, value),
            INTERRUPT_FLAG => self.interrupt_flag = InterruptRegister::from_bits_truncate(value),
            AUDIO_REGISTERS_START..=AUDIO_REGISTERS_END => self.apu.write(address, value),
            PPU_DMA => {
                self.ppu.write(PPU_DMA, value);
                self.dma_transfer(value);
            }
            PPU_REGISTER_START..=PPU_REGISTER_END => self.ppu.write(address, value),
            // Undocumented or CGB-only registers; tolerated like hardware.
            _ => log::debug!("write to unmapped I/O register {address:#06x}"),
        }
    }

    /// Handles all reads from the I/O registers (0xFF00-0xFF7F)
    fn read_io(&mut self, address: u16) -> u8 {
        match address {
            JOYPAD => self.joypad.read(),
            SERIAL_TRANSFER_DATA => self.serial_data,
            // Undocumented bits should be 1
            SERIAL_TRANSFER_CTRL => self.serial_ctrl | 0b0111_1110,
            TIMER_DIVIDER..=TIMER_CTRL => self.timer.read(address),
            // Undocumented bits should be 1
            INTERRUPT_FLAG => self.interrupt_flag.bits() | 0b1110_0000,
            AUDIO_REGISTERS_START..=AUDIO_REGISTERS_END => self.apu.read(address),
            PPU_REGISTER_START..=PPU_REGISTER_END => self.ppu.read(address),
            _ => UNDEFINED_READ,
        }
    }
}

impl SubSystem for MainBus {
    fn write(&mut self, address: u16, value: u8) {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_HIGH_BANK_END => self.cartridge.write(address, value),
            VRAM_BEGIN..=VRAM_END => self.ppu.write(address, value),
            CRAM_BANK_BEGIN..=CRAM_BANK_END => self.cartridge.write(address, value),
            WRAM_BEGIN..=WRAM_END => self.wram[(address & 0x1FFF) as usize] = value,
            // Writes to Echo RAM, effectively mirroring to Working RAM
            ERAM_BEGIN..=ERAM_END => self.wram[(address & 0x1FFF) as usize] = value,
            OAM_BEGIN..=OAM_END => self.ppu.write(address, value),
            UNUSED_BEGIN..=UNUSED_END => {
                log::debug!("write to prohibited memory {address:#06x}");
            }
            IO_BEGIN..=IO_END => self.write_io(address, value),
            HRAM_BEGIN..=HRAM_END => self.hram[(address - HRAM_BEGIN) as usize] = value,
            INTERRUPT_ENABLE => self.interrupt_enable = InterruptRegister::from_bits_truncate(value),
        }
    }

    fn read(&mut self, address: u16) -> u8 {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_HIGH_BANK_END => self.cartridge.read(address),
            VRAM_BEGIN..=VRAM_END => self.ppu.read(address),
            CRAM_BANK_BEGIN..=CRAM_BANK_END => self.cartridge.read(address),
            WRAM_BEGIN..=WRAM_END => self.wram[(address & 0x1FFF) as usize],
            // Reads from Echo RAM, effectively mirroring to Working RAM
            ERAM_BEGIN..=ERAM_END => self.wram[(address & 0x1FFF) as usize],
            OAM_BEGIN..=OAM_END => self.ppu.read(address),
            UNUSED_BEGIN..=UNUSED_END => UNDEFINED_READ,
            IO_BEGIN..=IO_END => self.read_io(address),
            HRAM_BEGIN..=HRAM_END => self.hram[(address - HRAM_BEGIN) as usize],
            // Undocumented bits should be 1
            INTERRUPT_ENABLE => self.interrupt_enable.bits() | 0b1110_0000,
        }
    }
}

impl Bus for MainBus {
    #[inline(always)]
    fn has_irq(&self) -> bool {
        let enabled = self.interrupt_enable.bits() & 0b0001_1111;
        let flag = self.interrupt_flag.bits() & 0b0001_1111;
        enabled & flag != 0
    }

    #[inline(always)]
    fn set_ie(&mut self, r: InterruptRegister) {
        self.interrupt_enable = r;
    }

    #[inline(always)]
    fn get_ie(&self) -> InterruptRegister {
        self.interrupt_enable
    }

    #[inline(always)]
    fn set_if(&mut self, r: InterruptRegister) {
        self.interrupt_flag = r;
    }

    #[inline(always)]
    fn get_if(&self) -> InterruptRegister {
        self.interrupt_flag
    }
}
