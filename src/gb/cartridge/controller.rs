use crate::gb::cartridge::mbc1::Mbc1;
use crate::gb::cartridge::mbc2::Mbc2;
use crate::gb::cartridge::mbc3::Mbc3;
use crate::gb::cartridge::mbc5::Mbc5;
use crate::gb::cartridge::nombc::NoMbc;
use crate::gb::cartridge::{CartridgeConfig, CartridgeKind};
use crate::gb::error::{EmuError, EmuResult};
use dyn_clone::DynClone;
use std::sync::Arc;

/// This trait defines the interface for a bank controller: it maps the two
/// cartridge windows of the 16-bit bus into the backing ROM and RAM, absorbs
/// control-register writes, and owns battery-backed persistence.
pub trait BankController: DynClone + Send {
    fn read(&mut self, address: u16) -> u8;

    fn write(&mut self, address: u16, value: u8);

    /// Serialises the battery-backed RAM, `None` without a battery.
    fn save_ram(&self) -> Option<Vec<u8>>;

    /// Restores a blob produced by `save_ram`.
    fn load_ram(&mut self, data: &[u8]) -> EmuResult<()>;
}

dyn_clone::clone_trait_object!(BankController);

/// Creates a new `BankController` with the given ROM and `CartridgeConfig`.
pub fn new(config: CartridgeConfig, rom: Arc<[u8]>) -> Box<dyn BankController> {
    match config.kind {
        CartridgeKind::RomOnly { .. } => Box::new(NoMbc::new(config, rom)),
        CartridgeKind::Mbc1 { multicart, .. } => Box::new(Mbc1::new(config, rom, multicart)),
        CartridgeKind::Mbc2 { .. } => Box::new(Mbc2::new(config, rom)),
        CartridgeKind::Mbc3 { rtc, .. } => Box::new(Mbc3::new(config, rom, rtc)),
        CartridgeKind::Mbc5 { rumble, .. } => Box::new(Mbc5::new(config, rom, rumble)),
    }
}

/// Shared size check for incoming RAM images.
pub(super) fn check_ram_len(data: &[u8], expected: usize) -> EmuResult<()> {
    if data.len() != expected {
        return Err(EmuError::SaveData(format!(
            "RAM image of {} bytes does not match the expected {} bytes",
            data.len(),
            expected
        )));
    }
    Ok(())
}
