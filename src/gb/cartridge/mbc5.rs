use crate::gb::cartridge::controller::{BankController, check_ram_len};
use crate::gb::cartridge::{CartridgeConfig, RAM_BANK_SIZE, ROM_BANK_SIZE, bank_mask};
use crate::gb::constants::*;
use crate::gb::error::EmuResult;
use std::sync::Arc;

/// Writing 0x0A enables reading and writing of external RAM, anything else
/// disables it.
const RAM_ENABLE_BEGIN: u16 = 0x0000;
const RAM_ENABLE_END: u16 = 0x1FFF;

/// The 8 least significant bits of the ROM bank number go here. Unlike the
/// earlier controllers, writing 0 does map bank 0.
const ROM_BANK_LOW_BITS_BEGIN: u16 = 0x2000;
const ROM_BANK_LOW_BITS_END: u16 = 0x2FFF;

/// The 9th bit of the ROM bank number goes here.
const ROM_BANK_HIGH_BIT_BEGIN: u16 = 0x3000;
const ROM_BANK_HIGH_BIT_END: u16 = 0x3FFF;

/// Selects the external RAM bank. On rumble boards bit 3 is wired to the
/// motor instead of the RAM address lines.
const RAM_BANK_NUMBER_BEGIN: u16 = 0x4000;
const RAM_BANK_NUMBER_END: u16 = 0x5FFF;

/// MBC5 is the 5th generation controller and can map up to 8 MiB of ROM
/// through its 9-bit bank number.
#[derive(Clone)]
pub struct Mbc5 {
    config: CartridgeConfig,
    rom: Arc<[u8]>,
    ram: Vec<u8>,
    has_rumble: bool,
    rom_bank_number: u16,
    ram_bank_number: u8,
    has_ram_access: bool,
    /// State of the rumble motor line, observable by the host.
    pub rumble_active: bool,
}

impl Mbc5 {
    pub fn new(config: CartridgeConfig, rom: Arc<[u8]>, has_rumble: bool) -> Self {
        Self {
            ram: vec![0; config.ram_size()],
            has_rumble,
            rom_bank_number: 1,
            ram_bank_number: 0,
            has_ram_access: false,
            rumble_active: false,
            config,
            rom,
        }
    }
}

impl BankController for Mbc5 {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_LOW_BANK_END => self
                .rom
                .get(address as usize)
                .copied()
                .unwrap_or(UNDEFINED_READ),
            ROM_HIGH_BANK_BEGIN..=ROM_HIGH_BANK_END => {
                let offset = self.rom_bank_number as usize * ROM_BANK_SIZE
                    + (address - ROM_HIGH_BANK_BEGIN) as usize;
                self.rom.get(offset).copied().unwrap_or(UNDEFINED_READ)
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END if self.has_ram_access => {
                let offset = self.ram_bank_number as usize * RAM_BANK_SIZE
                    + (address - CRAM_BANK_BEGIN) as usize;
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
            ROM_BANK_LOW_BITS_BEGIN..=ROM_BANK_LOW_BITS_END => {
                self.rom_bank_number = (self.rom_bank_number & 0x0100) | u16::from(value);
                self.rom_bank_number &= bank_mask(self.config.rom_banks);
            }
            ROM_BANK_HIGH_BIT_BEGIN..=ROM_BANK_HIGH_BIT_END => {
                self.rom_bank_number =
                    (self.rom_bank_number & 0x00FF) | (u16::from(value & 0b1) << 8);
                self.rom_bank_number &= bank_mask(self.config.rom_banks);
            }
            RAM_BANK_NUMBER_BEGIN..=RAM_BANK_NUMBER_END => match self.has_rumble {
                true => {
                    self.rumble_active = value & 0b1000 != 0;
                    self.ram_bank_number = value & 0b0111;
                }
                false => self.ram_bank_number = value & 0b1111,
            },
            CRAM_BANK_BEGIN..=CRAM_BANK_END if self.has_ram_access => {
                let offset = self.ram_bank_number as usize * RAM_BANK_SIZE
                    + (address - CRAM_BANK_BEGIN) as usize;
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

    fn controller(rumble: bool) -> Mbc5 {
        let kind = CartridgeKind::Mbc5 {
            rumble,
            battery: true,
        };
        let config = CartridgeConfig::new(kind, 0x07, 0x03).unwrap();
        let rom = (0u16..256)
            .flat_map(|i| vec![i as u8; ROM_BANK_SIZE])
            .collect();
        Mbc5::new(config, rom, rumble)
    }

    #[test]
    fn test_bank_zero_is_selectable() {
        let mut ctrl = controller(false);
        ctrl.write(ROM_BANK_LOW_BITS_BEGIN, 0x00);
        assert_eq!(
            ctrl.read(ROM_HIGH_BANK_BEGIN),
            0,
            "MBC5 maps bank 0 without translation"
        );
    }

    #[test]
    fn test_ninth_bank_bit() {
        let kind = CartridgeKind::Mbc5 {
            rumble: false,
            battery: false,
        };
        // 512 banks, the full 9-bit range.
        let config = CartridgeConfig::new(kind, 0x08, 0x00).unwrap();
        let rom = (0u16..512)
            .flat_map(|i| vec![(i & 0xFF) as u8; ROM_BANK_SIZE])
            .collect();
        let mut ctrl = Mbc5::new(config, rom, false);

        ctrl.write(ROM_BANK_LOW_BITS_BEGIN, 0x04);
        ctrl.write(ROM_BANK_HIGH_BIT_BEGIN, 0x01);
        assert_eq!(ctrl.rom_bank_number, 0x104);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 0x04);

        ctrl.write(ROM_BANK_HIGH_BIT_BEGIN, 0x00);
        assert_eq!(ctrl.rom_bank_number, 0x004);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 0x04);
    }

    #[test]
    fn test_rumble_diverts_ram_bank_bit() {
        let mut ctrl = controller(true);
        ctrl.write(RAM_ENABLE_BEGIN, 0x0A);

        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0b1010);
        assert!(ctrl.rumble_active, "bit 3 drives the motor");
        assert_eq!(ctrl.ram_bank_number, 0b0010);

        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0b0001);
        assert!(!ctrl.rumble_active);
        assert_eq!(ctrl.ram_bank_number, 0b0001);
    }

    #[test]
    fn test_ram_round_trip() {
        let mut ctrl = controller(false);
        ctrl.write(RAM_ENABLE_BEGIN, 0x0A);
        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0x02);
        ctrl.write(CRAM_BANK_BEGIN + 1, 0x5A);

        let saved = ctrl.save_ram().unwrap();
        let mut restored = controller(false);
        restored.load_ram(&saved).unwrap();
        restored.write(RAM_ENABLE_BEGIN, 0x0A);
        restored.write(RAM_BANK_NUMBER_BEGIN, 0x02);
        assert_eq!(restored.read(CRAM_BANK_BEGIN + 1), 0x5A);
    }
}
