use crate::gb::cartridge::controller::{BankController, check_ram_len};
use crate::gb::cartridge::{CartridgeConfig, RAM_BANK_SIZE, ROM_BANK_SIZE, bank_mask};
use crate::gb::constants::*;
use crate::gb::error::EmuResult;
use std::sync::Arc;

/// Before external RAM can be read or written it must be enabled by writing
/// to this address space. Any value with 0x0A in the lower 4 bits enables
/// the RAM attached to the MBC, any other value disables it.
const RAM_ENABLE_BEGIN: u16 = 0x0000;
const RAM_ENABLE_END: u16 = 0x1FFF;

/// This 5-bit register selects the ROM bank for the 0x4000-0x7FFF window.
/// Higher bits are discarded. If the register is set to 0x00 it behaves as
/// if it were set to 0x01; the multicart wiring only keeps 4 bits.
const ROM_BANK_NUMBER_BEGIN: u16 = 0x2000;
const ROM_BANK_NUMBER_END: u16 = 0x3FFF;

/// This 2-bit register selects a RAM bank (32 KiB RAM carts) or the upper
/// bits of the ROM bank number (1 MiB ROM or larger carts), depending on
/// the banking mode.
const RAM_BANK_NUMBER_BEGIN: u16 = 0x4000;
const RAM_BANK_NUMBER_END: u16 = 0x5FFF;

/// This 1-bit register selects between the two MBC1 banking modes,
/// controlling the behaviour of the secondary 2-bit register above.
const BANKING_MODE_SELECT_BEGIN: u16 = 0x6000;
const BANKING_MODE_SELECT_END: u16 = 0x7FFF;

/// In simple mode the secondary register extends the switchable window
/// only; in advanced mode it additionally selects the RAM bank and applies
/// its bits to the fixed 0x0000-0x3FFF window.
#[derive(Clone, Copy, PartialEq, Debug)]
enum BankingMode {
    Simple,
    Advanced,
}

/// MBC1 supports up to 2 MiB ROM with up to 32 KiB of banked RAM. Multicart
/// boards wire the secondary register four bits up instead of five, trading
/// addressable banks per game for a game-select.
#[derive(Clone)]
pub struct Mbc1 {
    config: CartridgeConfig,
    rom: Arc<[u8]>,
    ram: Vec<u8>,
    multicart: bool,
    low_rom_bank_offset: usize,
    high_rom_bank_offset: usize,
    ram_bank_offset: usize,
    has_ram_access: bool,
    /// Lower 5 bits of the ROM bank number, zero already translated to one.
    bank_low_bits: u8,
    /// RAM bank number or upper bits of the ROM bank number.
    bank_high_bits: u8,
    banking_mode: BankingMode,
}

impl Mbc1 {
    pub fn new(config: CartridgeConfig, rom: Arc<[u8]>, multicart: bool) -> Self {
        Self {
            ram: vec![0; config.ram_size()],
            multicart,
            low_rom_bank_offset: 0,
            high_rom_bank_offset: ROM_BANK_SIZE,
            ram_bank_offset: 0,
            has_ram_access: false,
            banking_mode: BankingMode::Simple,
            bank_low_bits: 0b0000_0001,
            bank_high_bits: 0b0000_0000,
            rom,
            config,
        }
    }

    /// Recomputes both window offsets from the two bank registers, the
    /// banking mode and the wiring.
    fn update_rom_offsets(&mut self) {
        let shift = match self.multicart {
            true => 4,
            false => 5,
        };
        let mask = bank_mask(self.config.rom_banks);

        let low_bank = match self.banking_mode {
            BankingMode::Simple => 0,
            BankingMode::Advanced => u16::from(self.bank_high_bits) << shift,
        } & mask;
        let high_bank =
            (u16::from(self.bank_high_bits) << shift | u16::from(self.bank_low_bits)) & mask;

        self.low_rom_bank_offset = ROM_BANK_SIZE * low_bank as usize;
        self.high_rom_bank_offset = ROM_BANK_SIZE * high_bank as usize;
    }

    /// RAM banking needs the full 32 KiB of RAM and the advanced mode,
    /// otherwise bank 0 stays mapped.
    fn update_ram_offset(&mut self) {
        self.ram_bank_offset =
            match self.config.ram_banks == 4 && self.banking_mode == BankingMode::Advanced {
                true => RAM_BANK_SIZE * self.bank_high_bits as usize,
                false => 0,
            };
    }
}

impl BankController for Mbc1 {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_LOW_BANK_END => {
                let offset = self.low_rom_bank_offset + address as usize;
                self.rom.get(offset).copied().unwrap_or(UNDEFINED_READ)
            }
            ROM_HIGH_BANK_BEGIN..=ROM_HIGH_BANK_END => {
                let offset = self.high_rom_bank_offset + (address - ROM_HIGH_BANK_BEGIN) as usize;
                self.rom.get(offset).copied().unwrap_or(UNDEFINED_READ)
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END if self.has_ram_access => {
                let offset = self.ram_bank_offset + (address - CRAM_BANK_BEGIN) as usize;
                self.ram.get(offset).copied().unwrap_or(UNDEFINED_READ)
            }
            _ => UNDEFINED_READ,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            RAM_ENABLE_BEGIN..=RAM_ENABLE_END => {
                self.has_ram_access = value & 0b1111 == 0b1010;
            }
            ROM_BANK_NUMBER_BEGIN..=ROM_BANK_NUMBER_END => {
                // The zero check happens on the 5-bit value, the multicart
                // wiring then drops bit 4.
                let mut bank = value & 0b0001_1111;
                if bank == 0 {
                    bank = 1;
                }
                if self.multicart {
                    bank &= 0b0000_1111;
                }
                self.bank_low_bits = bank;
                self.update_rom_offsets();
            }
            RAM_BANK_NUMBER_BEGIN..=RAM_BANK_NUMBER_END => {
                self.bank_high_bits = value & 0b11;
                self.update_rom_offsets();
                self.update_ram_offset();
            }
            BANKING_MODE_SELECT_BEGIN..=BANKING_MODE_SELECT_END => {
                self.banking_mode = match value & 0b1 {
                    0b0 => BankingMode::Simple,
                    _ => BankingMode::Advanced,
                };
                self.update_rom_offsets();
                self.update_ram_offset();
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END if self.has_ram_access => {
                let offset = self.ram_bank_offset + (address - CRAM_BANK_BEGIN) as usize;
                if offset < self.ram.len() {
                    self.ram[offset] = value;
                }
            }
            _ => {}
        }
    }

    fn save_ram(&self) -> Option<Vec<u8>> {
        match self.config.kind.has_battery() && !self.ram.is_empty() {
            true => Some(self.ram.clone()),
            false => None,
        }
    }

    fn load_ram(&mut self, data: &[u8]) -> EmuResult<()> {
        check_ram_len(data, self.ram.len())?;
        self.ram.copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::cartridge::CartridgeKind;

    fn config(rom_size: u8, ram_size: u8) -> CartridgeConfig {
        let kind = CartridgeKind::Mbc1 {
            multicart: false,
            battery: true,
        };
        CartridgeConfig::new(kind, rom_size, ram_size).unwrap()
    }

    /// One 16 KiB bank per index, each filled with its own bank number.
    fn numbered_rom(banks: u8) -> Arc<[u8]> {
        (0..banks).flat_map(|i| vec![i; ROM_BANK_SIZE]).collect()
    }

    #[test]
    fn test_ram_state() {
        let mut ctrl = Mbc1::new(config(0x03, 0x02), Arc::from(vec![0; ROM_BANK_SIZE * 16]), false);

        let addr = CRAM_BANK_BEGIN + 0x10;
        ctrl.write(addr, 0x42);
        assert_eq!(ctrl.read(addr), 0xFF, "RAM should be disabled");

        ctrl.write(RAM_ENABLE_BEGIN, 0x0A);
        assert_eq!(ctrl.read(addr), 0x00, "First write should have been ignored");

        ctrl.write(addr, 0x42);
        assert_eq!(ctrl.read(addr), 0x42, "RAM should be enabled");

        ctrl.write(RAM_ENABLE_BEGIN, 0xFF);
        assert_eq!(ctrl.read(addr), 0xFF, "RAM should be disabled");
    }

    #[test]
    fn test_rom_bank_zero_translation() {
        let mut ctrl = Mbc1::new(config(0x05, 0x02), numbered_rom(64), false);

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x00);
        assert_eq!(
            ctrl.read(ROM_HIGH_BANK_BEGIN),
            1,
            "bank 0 should map to bank 1"
        );

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x02);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 2);

        // Selecting bank 0x20 through the secondary register still goes
        // through the zero translation of the low register.
        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0b01);
        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x00);
        assert_eq!(
            ctrl.read(ROM_HIGH_BANK_BEGIN),
            0x21,
            "bank 0x20 should map to bank 0x21"
        );
    }

    #[test]
    fn test_rom_bank_masked_to_rom_size() {
        let mut ctrl = Mbc1::new(config(0x03, 0x02), numbered_rom(16), false);

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0b1111_1001);
        assert_eq!(
            ctrl.read(ROM_HIGH_BANK_BEGIN),
            9,
            "only five bits of the bank number should be used"
        );

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x1F);
        assert_eq!(
            ctrl.read(ROM_HIGH_BANK_BEGIN),
            0x0F,
            "the bank number should wrap at the ROM size"
        );
    }

    #[test]
    fn test_advanced_mode_applies_to_low_window() {
        let mut ctrl = Mbc1::new(config(0x05, 0x02), numbered_rom(64), false);

        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0b01);
        assert_eq!(
            ctrl.read(ROM_LOW_BANK_BEGIN),
            0,
            "simple mode should keep bank 0 in the low window"
        );

        ctrl.write(BANKING_MODE_SELECT_BEGIN, 0b1);
        assert_eq!(
            ctrl.read(ROM_LOW_BANK_BEGIN),
            0x20,
            "advanced mode should apply the secondary register"
        );
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 0x21);
    }

    #[test]
    fn test_ram_banking() {
        let mut ctrl = Mbc1::new(config(0x00, 0x03), numbered_rom(2), false);

        ctrl.write(BANKING_MODE_SELECT_BEGIN, 1);
        ctrl.write(RAM_ENABLE_BEGIN, 0x0A);

        for i in 0u8..4 {
            ctrl.write(RAM_BANK_NUMBER_BEGIN, i);
            assert_eq!(ctrl.read(CRAM_BANK_BEGIN), 0, "RAM should start zeroed");
            ctrl.write(CRAM_BANK_BEGIN, i + 1);
            assert_eq!(ctrl.read(CRAM_BANK_BEGIN), i + 1);
        }

        for i in 0u8..4 {
            ctrl.write(RAM_BANK_NUMBER_BEGIN, i);
            assert_eq!(
                ctrl.read(CRAM_BANK_BEGIN),
                i + 1,
                "bank contents should survive switching"
            );
        }
    }

    #[test]
    fn test_multicart_bank_arithmetic() {
        let kind = CartridgeKind::Mbc1 {
            multicart: true,
            battery: false,
        };
        let config = CartridgeConfig::new(kind, 0x05, 0x00).unwrap();
        let mut ctrl = Mbc1::new(config, numbered_rom(64), true);

        // The secondary register is shifted by four on multicart wiring.
        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0b01);
        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x02);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 0x12);

        // Bit 4 of the low register is not wired.
        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x13);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 0x13);

        ctrl.write(BANKING_MODE_SELECT_BEGIN, 1);
        assert_eq!(
            ctrl.read(ROM_LOW_BANK_BEGIN),
            0x10,
            "game slot base should land in the low window"
        );
    }

    #[test]
    fn test_save_and_load_ram() {
        let mut ctrl = Mbc1::new(config(0x00, 0x02), numbered_rom(2), false);
        ctrl.write(RAM_ENABLE_BEGIN, 0x0A);
        ctrl.write(CRAM_BANK_BEGIN + 7, 0x99);

        let saved = ctrl.save_ram().expect("battery-backed RAM should save");
        assert_eq!(saved.len(), RAM_BANK_SIZE);
        assert_eq!(saved[7], 0x99);

        let mut restored = Mbc1::new(config(0x00, 0x02), numbered_rom(2), false);
        restored.load_ram(&saved).unwrap();
        restored.write(RAM_ENABLE_BEGIN, 0x0A);
        assert_eq!(restored.read(CRAM_BANK_BEGIN + 7), 0x99);
    }
}
