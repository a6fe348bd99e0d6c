use crate::gb::cartridge::controller::{BankController, check_ram_len};
use crate::gb::cartridge::{CartridgeConfig, ROM_BANK_SIZE, bank_mask};
use crate::gb::constants::*;
use crate::gb::error::EmuResult;
use std::sync::Arc;

/// The whole 0x0000-0x3FFF range carries both control registers: bit 8 of
/// the address picks the register, not the value written.
const CONTROL_BEGIN: u16 = 0x0000;
const CONTROL_END: u16 = 0x3FFF;

/// Address bit that separates the RAM enable (clear) from the ROM bank
/// select (set).
const ROM_BANK_SELECT_BIT: u16 = 0x0100;

/// MBC2 has the RAM on the controller die itself: 512 half-byte cells. The
/// upper nibble of every cell is not driven and reads back as 0xF.
const BUILTIN_RAM_SIZE: usize = 512;

/// MBC2 supports up to 256 KiB ROM and carries its own 512x4-bit RAM,
/// optionally battery backed. Only the lower nibble of every RAM cell is
/// persisted.
#[derive(Clone)]
pub struct Mbc2 {
    config: CartridgeConfig,
    rom: Arc<[u8]>,
    ram: Vec<u8>,
    rom_bank_offset: usize,
    has_ram_access: bool,
}

impl Mbc2 {
    pub fn new(config: CartridgeConfig, rom: Arc<[u8]>) -> Self {
        Self {
            ram: vec![0; BUILTIN_RAM_SIZE],
            rom_bank_offset: ROM_BANK_SIZE,
            has_ram_access: false,
            rom,
            config,
        }
    }
}

impl BankController for Mbc2 {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_LOW_BANK_END => self
                .rom
                .get(address as usize)
                .copied()
                .unwrap_or(UNDEFINED_READ),
            ROM_HIGH_BANK_BEGIN..=ROM_HIGH_BANK_END => {
                let offset = self.rom_bank_offset + (address - ROM_HIGH_BANK_BEGIN) as usize;
                self.rom.get(offset).copied().unwrap_or(UNDEFINED_READ)
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END if self.has_ram_access => {
                // The 512 cells echo through the whole window; the upper
                // nibble is not driven on hardware.
                let cell = self.ram[(address & 0x01FF) as usize];
                0xF0 | (cell & 0x0F)
            }
            _ => UNDEFINED_READ,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            CONTROL_BEGIN..=CONTROL_END => match address & ROM_BANK_SELECT_BIT {
                0 => self.has_ram_access = value & 0b1111 == 0b1010,
                _ => {
                    let mut bank = u16::from(value & 0b1111);
                    if bank == 0 {
                        bank = 1;
                    }
                    bank &= bank_mask(self.config.rom_banks);
                    self.rom_bank_offset = ROM_BANK_SIZE * bank as usize;
                }
            },
            CRAM_BANK_BEGIN..=CRAM_BANK_END if self.has_ram_access => {
                self.ram[(address & 0x01FF) as usize] = value & 0x0F;
            }
            _ => {}
        }
    }

    fn save_ram(&self) -> Option<Vec<u8>> {
        match self.config.kind.has_battery() {
            true => Some(self.ram.iter().map(|cell| cell & 0x0F).collect()),
            false => None,
        }
    }

    fn load_ram(&mut self, data: &[u8]) -> EmuResult<()> {
        check_ram_len(data, BUILTIN_RAM_SIZE)?;
        for (cell, &saved) in self.ram.iter_mut().zip(data) {
            *cell = saved & 0x0F;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::cartridge::CartridgeKind;

    fn controller() -> Mbc2 {
        let kind = CartridgeKind::Mbc2 { battery: true };
        let config = CartridgeConfig::new(kind, 0x02, 0x00).unwrap();
        let rom = (0u8..8).flat_map(|i| vec![i; ROM_BANK_SIZE]).collect();
        Mbc2::new(config, rom)
    }

    #[test]
    fn test_address_bit_selects_register() {
        let mut ctrl = controller();

        // Bit 8 set: ROM bank select, RAM stays disabled.
        ctrl.write(0x0100, 0x0A);
        assert_eq!(ctrl.read(CRAM_BANK_BEGIN), 0xFF);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 0x0A & 0x07);

        // Bit 8 clear: RAM enable.
        ctrl.write(0x0000, 0x0A);
        ctrl.write(CRAM_BANK_BEGIN, 0x05);
        assert_eq!(ctrl.read(CRAM_BANK_BEGIN), 0xF5);
    }

    #[test]
    fn test_rom_bank_zero_translation() {
        let mut ctrl = controller();
        ctrl.write(0x0100, 0x00);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 1);
    }

    #[test]
    fn test_ram_echo_and_nibble_width() {
        let mut ctrl = controller();
        ctrl.write(0x0000, 0x0A);

        ctrl.write(CRAM_BANK_BEGIN + 3, 0xAB);
        assert_eq!(ctrl.read(CRAM_BANK_BEGIN + 3), 0xFB, "upper nibble floats");
        assert_eq!(
            ctrl.read(CRAM_BANK_BEGIN + 0x0200 + 3),
            0xFB,
            "cells echo every 512 bytes"
        );
    }

    #[test]
    fn test_save_keeps_lower_nibbles() {
        let mut ctrl = controller();
        ctrl.write(0x0000, 0x0A);
        ctrl.write(CRAM_BANK_BEGIN, 0x7C);

        let saved = ctrl.save_ram().unwrap();
        assert_eq!(saved.len(), BUILTIN_RAM_SIZE);
        assert_eq!(saved[0], 0x0C);

        let mut restored = controller();
        restored.load_ram(&saved).unwrap();
        restored.write(0x0000, 0x0A);
        assert_eq!(restored.read(CRAM_BANK_BEGIN), 0xFC);
    }
}
