use crate::gb::SubSystem;
use crate::gb::cartridge::controller::BankController;
use crate::gb::error::{EmuError, EmuResult};
use std::path::Path;
use std::sync::Arc;
use std::{fmt, fs};

pub mod controller;
mod mbc1;
mod mbc2;
mod mbc3;
mod mbc5;
mod nombc;
#[cfg(test)]
pub mod tests;

/// This area of memory contains the cartridge title, NUL padded.
const CARTRIDGE_TITLE_BEGIN: u16 = 0x0134;
const CARTRIDGE_TITLE_END: u16 = 0x0143;

/// This address contains the cartridge type and what kind of hardware is
/// present, see `CartridgeKind::from_type_byte`.
const CARTRIDGE_TYPE: u16 = 0x0147;

/// This byte indicates how much ROM is present on the cartridge.
/// The ROM size is given by 32 KiB * (1 << value).
const CARTRIDGE_ROM_SIZE: u16 = 0x0148;

/// This byte indicates how much RAM is present on the cartridge.
const CARTRIDGE_RAM_SIZE: u16 = 0x0149;

/// Japan / overseas marker.
const CARTRIDGE_DESTINATION: u16 = 0x014A;
const CARTRIDGE_OLD_LICENSEE: u16 = 0x014B;
const CARTRIDGE_VERSION: u16 = 0x014C;

/// This byte contains an 8-bit checksum computed over the header bytes
/// 0x0134 - 0x014C.
const CARTRIDGE_HEADER_CHECKSUM: u16 = 0x014D;

/// These bytes contain a 16-bit (big-endian) checksum computed as the sum of
/// all bytes of the cartridge ROM except these two.
const CARTRIDGE_GLOBAL_CHECKSUM1: u16 = 0x014E;
const CARTRIDGE_GLOBAL_CHECKSUM2: u16 = 0x014F;

/// The boot logo bitmap, repeated in slot 1 of multi-game compilation carts.
const CARTRIDGE_LOGO_BEGIN: usize = 0x0104;

/// The 48-byte logo bitmap the boot ROM compares the header against.
const HEADER_LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00, 0x0D,
    0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD, 0xD9, 0x99,
    0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB, 0xB9, 0x33, 0x3E,
];

/// A header must fit before this offset.
const HEADER_SIZE: usize = 0x0150;

pub const ROM_BANK_SIZE: usize = 16384;
pub const RAM_BANK_SIZE: usize = 8192;

/// The bank controller family, selected from the cartridge-type byte.
/// Battery-backed variants persist their external RAM through
/// `save_ram`/`load_ram`.
#[derive(PartialEq, Copy, Clone, Debug)]
pub enum CartridgeKind {
    RomOnly { battery: bool },
    Mbc1 { multicart: bool, battery: bool },
    Mbc2 { battery: bool },
    Mbc3 { rtc: bool, battery: bool },
    Mbc5 { rumble: bool, battery: bool },
}

impl CartridgeKind {
    /// Decodes the cartridge-type byte at 0x0147. Multicart MBC1 boards are
    /// indistinguishable from the header alone and are detected separately.
    pub fn from_type_byte(value: u8) -> EmuResult<Self> {
        let kind = match value {
            0x00 | 0x08 => CartridgeKind::RomOnly { battery: false },
            0x09 => CartridgeKind::RomOnly { battery: true },
            0x01 | 0x02 => CartridgeKind::Mbc1 {
                multicart: false,
                battery: false,
            },
            0x03 => CartridgeKind::Mbc1 {
                multicart: false,
                battery: true,
            },
            0x05 => CartridgeKind::Mbc2 { battery: false },
            0x06 => CartridgeKind::Mbc2 { battery: true },
            0x0F | 0x10 => CartridgeKind::Mbc3 {
                rtc: true,
                battery: true,
            },
            0x11 | 0x12 => CartridgeKind::Mbc3 {
                rtc: false,
                battery: false,
            },
            0x13 => CartridgeKind::Mbc3 {
                rtc: false,
                battery: true,
            },
            0x19 | 0x1A => CartridgeKind::Mbc5 {
                rumble: false,
                battery: false,
            },
            0x1B => CartridgeKind::Mbc5 {
                rumble: false,
                battery: true,
            },
            0x1C | 0x1D => CartridgeKind::Mbc5 {
                rumble: true,
                battery: false,
            },
            0x1E => CartridgeKind::Mbc5 {
                rumble: true,
                battery: true,
            },
            _ => return Err(EmuError::UnsupportedCartridge(value)),
        };
        Ok(kind)
    }

    #[inline]
    pub const fn has_battery(&self) -> bool {
        match self {
            CartridgeKind::RomOnly { battery }
            | CartridgeKind::Mbc1 { battery, .. }
            | CartridgeKind::Mbc2 { battery }
            | CartridgeKind::Mbc3 { battery, .. }
            | CartridgeKind::Mbc5 { battery, .. } => *battery,
        }
    }
}

impl fmt::Display for CartridgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CartridgeKind::RomOnly { .. } => "ROM only",
            CartridgeKind::Mbc1 {
                multicart: true, ..
            } => "MBC1 multicart",
            CartridgeKind::Mbc1 { .. } => "MBC1",
            CartridgeKind::Mbc2 { .. } => "MBC2",
            CartridgeKind::Mbc3 { rtc: true, .. } => "MBC3+RTC",
            CartridgeKind::Mbc3 { .. } => "MBC3",
            CartridgeKind::Mbc5 { rumble: true, .. } => "MBC5+rumble",
            CartridgeKind::Mbc5 { .. } => "MBC5",
        };
        write!(f, "{name}")
    }
}

/// Contains the configuration of the cartridge: the controller kind and the
/// number of ROM and RAM banks derived from the header size codes.
#[derive(Copy, Clone, Debug)]
pub struct CartridgeConfig {
    pub kind: CartridgeKind,
    pub rom_banks: u16,
    pub ram_banks: u16,
}

impl CartridgeConfig {
    pub fn new(kind: CartridgeKind, rom_size: u8, ram_size: u8) -> EmuResult<Self> {
        let ram_banks = match ram_size {
            0x00 | 0x01 => 0,
            0x02 => 1,
            0x03 => 4,
            0x04 => 16,
            0x05 => 8,
            value => {
                return Err(EmuError::MalformedRom(format!(
                    "unsupported RAM size code {value:#04x}"
                )));
            }
        };

        // 32 KiB * (1 << value), expressed in 16 KiB banks.
        let rom_banks = match rom_size {
            0x00..=0x08 => 2u16 << rom_size,
            value => {
                return Err(EmuError::MalformedRom(format!(
                    "unsupported ROM size code {value:#04x}"
                )));
            }
        };

        Ok(Self {
            kind,
            rom_banks,
            ram_banks,
        })
    }

    #[inline(always)]
    pub const fn ram_size(&self) -> usize {
        self.ram_banks as usize * RAM_BANK_SIZE
    }
}

/// Contains the parsed cartridge header at ROM offset 0x100.
#[derive(Clone, Debug)]
pub struct CartridgeHeader {
    pub title: String,
    pub destination: u8,
    pub old_licensee: u8,
    pub version: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
    pub config: CartridgeConfig,
}

impl TryFrom<&[u8]> for CartridgeHeader {
    type Error = EmuError;

    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        if buf.len() < HEADER_SIZE {
            return Err(EmuError::MalformedRom(format!(
                "ROM of {} bytes is too small to contain a header",
                buf.len()
            )));
        }

        let mut kind = CartridgeKind::from_type_byte(buf[CARTRIDGE_TYPE as usize])?;
        if let CartridgeKind::Mbc1 { multicart, .. } = &mut kind {
            *multicart = is_multicart(buf);
        }

        let config = CartridgeConfig::new(
            kind,
            buf[CARTRIDGE_ROM_SIZE as usize],
            buf[CARTRIDGE_RAM_SIZE as usize],
        )?;
        Ok(Self {
            title: parse_title(buf),
            destination: buf[CARTRIDGE_DESTINATION as usize],
            old_licensee: buf[CARTRIDGE_OLD_LICENSEE as usize],
            version: buf[CARTRIDGE_VERSION as usize],
            header_checksum: buf[CARTRIDGE_HEADER_CHECKSUM as usize],
            global_checksum: u16::from(buf[CARTRIDGE_GLOBAL_CHECKSUM1 as usize]) << 8
                | u16::from(buf[CARTRIDGE_GLOBAL_CHECKSUM2 as usize]),
            config,
        })
    }
}

impl fmt::Display for CartridgeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.config.kind)
    }
}

/// Returns the cartridge title from the cartridge header.
fn parse_title(buf: &[u8]) -> String {
    let title = buf[CARTRIDGE_TITLE_BEGIN as usize..=CARTRIDGE_TITLE_END as usize]
        .iter()
        .take_while(|&&b| b != 0)
        .filter_map(|&b| b.is_ascii_graphic().then_some(char::from(b)))
        .collect::<String>();
    match title.is_empty() {
        true => "Unnamed".to_string(),
        false => title,
    }
}

/// MBC1 multi-game compilation carts repeat the boot logo at the start of
/// game slot 1 (0x40000). They use the alternate wiring with a 4-bit low
/// bank register.
fn is_multicart(buf: &[u8]) -> bool {
    const SLOT_SIZE: usize = 0x40000;
    if buf.len() != 0x100000 {
        return false;
    }
    let slot1 = SLOT_SIZE + CARTRIDGE_LOGO_BEGIN..SLOT_SIZE + CARTRIDGE_LOGO_BEGIN + 48;
    buf.get(slot1)
        .is_some_and(|mirror| mirror == HEADER_LOGO.as_slice())
}

/// Holds all relevant cartridge data: the parsed header and the bank
/// controller owning the ROM image and external RAM.
#[derive(Clone)]
pub struct Cartridge {
    pub header: CartridgeHeader,
    controller: Box<dyn BankController>,
}

impl Cartridge {
    /// Serialises the battery-backed external RAM, `None` for cartridges
    /// without battery. For MBC3 with RTC the blob carries the five clock
    /// registers and a host timestamp after the RAM image.
    #[inline]
    pub fn save_ram(&self) -> Option<Vec<u8>> {
        self.controller.save_ram()
    }

    /// Restores a previously saved external RAM blob.
    #[inline]
    pub fn load_ram(&mut self, data: &[u8]) -> EmuResult<()> {
        self.controller.load_ram(data)
    }
}

impl TryFrom<Arc<[u8]>> for Cartridge {
    type Error = EmuError;

    fn try_from(rom: Arc<[u8]>) -> Result<Self, Self::Error> {
        if rom.len() < HEADER_SIZE {
            return Err(EmuError::MalformedRom(format!(
                "ROM of {} bytes is too small to contain a header",
                rom.len()
            )));
        }
        if rom.len() % ROM_BANK_SIZE != 0 || rom.len() > 0x80_0000 {
            return Err(EmuError::MalformedRom(format!(
                "ROM size {} is not a multiple of 16 KiB up to 8 MiB",
                rom.len()
            )));
        }

        let header = CartridgeHeader::try_from(rom.as_ref())?;
        if let Err(msg) = verify_header_checksum(rom.as_ref(), header.header_checksum) {
            log::warn!("{msg}");
        }
        if let Err(msg) = verify_global_checksum(rom.as_ref(), header.global_checksum) {
            log::warn!("{msg}");
        }
        if rom.len() != header.config.rom_banks as usize * ROM_BANK_SIZE {
            log::warn!(
                "ROM size {} does not match the header size code ({} banks)",
                rom.len(),
                header.config.rom_banks
            );
        }

        let controller = controller::new(header.config, rom);
        Ok(Self { header, controller })
    }
}

impl TryFrom<&Path> for Cartridge {
    type Error = EmuError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let rom = fs::read(path)?;
        Cartridge::try_from(Arc::from(rom.into_boxed_slice()))
    }
}

impl fmt::Display for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}

impl SubSystem for Cartridge {
    #[inline]
    fn write(&mut self, address: u16, value: u8) {
        self.controller.write(address, value);
    }

    #[inline]
    fn read(&mut self, address: u16) -> u8 {
        self.controller.read(address)
    }
}

/// Validates the header checksum: the byte-decrement sum over 0x134-0x14C
/// must match the checksum byte at 0x14D.
fn verify_header_checksum(buf: &[u8], expected: u8) -> Result<(), String> {
    let mut checksum = 0u8;
    for &byte in &buf[0x0134..=0x014C] {
        checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
    }
    if checksum == expected {
        return Ok(());
    }
    Err(format!(
        "Header checksum mismatch! Expected: {checksum:#04x} Got: {expected:#04x}"
    ))
}

/// Validates the global checksum: the wrapping sum of every ROM byte except
/// the two checksum bytes themselves.
fn verify_global_checksum(buf: &[u8], expected: u16) -> Result<(), String> {
    let skip = [
        CARTRIDGE_GLOBAL_CHECKSUM1 as usize,
        CARTRIDGE_GLOBAL_CHECKSUM2 as usize,
    ];
    let calculated = buf
        .iter()
        .enumerate()
        .fold(0u16, |sum, (address, &byte)| match skip.contains(&address) {
            true => sum,
            false => sum.wrapping_add(u16::from(byte)),
        });
    if calculated == expected {
        return Ok(());
    }
    Err(format!(
        "Global checksum mismatch! Expected: {calculated:#06x} Got: {expected:#06x}"
    ))
}

/// Masks a ROM bank number to the addressable range of the cartridge.
#[inline]
const fn bank_mask(rom_banks: u16) -> u16 {
    let bits = u16::BITS - (rom_banks.saturating_sub(1)).leading_zeros();
    ((1u32 << bits) - 1) as u16
}
