use crate::gb::cartridge::controller::{BankController, check_ram_len};
use crate::gb::cartridge::CartridgeConfig;
use crate::gb::constants::*;
use crate::gb::error::EmuResult;
use std::sync::Arc;

/// Small games of not more than 32 KiB ROM do not require an MBC chip for
/// ROM banking. The ROM is directly mapped to memory at 0x0000-0x7FFF.
/// Optionally up to 8 KiB of RAM can be connected at 0xA000-0xBFFF.
#[derive(Clone)]
pub struct NoMbc {
    config: CartridgeConfig,
    rom: Arc<[u8]>,
    ram: Vec<u8>,
}

impl NoMbc {
    #[inline]
    pub fn new(config: CartridgeConfig, rom: Arc<[u8]>) -> Self {
        Self {
            ram: vec![0; config.ram_size()],
            rom,
            config,
        }
    }
}

impl BankController for NoMbc {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            ROM_LOW_BANK_BEGIN..=ROM_HIGH_BANK_END => self
                .rom
                .get(address as usize)
                .copied()
                .unwrap_or(UNDEFINED_READ),
            CRAM_BANK_BEGIN..=CRAM_BANK_END => self
                .ram
                .get((address - CRAM_BANK_BEGIN) as usize)
                .copied()
                .unwrap_or(UNDEFINED_READ),
            _ => UNDEFINED_READ,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        if let CRAM_BANK_BEGIN..=CRAM_BANK_END = address {
            let offset = (address - CRAM_BANK_BEGIN) as usize;
            if offset < self.ram.len() {
                self.ram[offset] = value;
            }
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
