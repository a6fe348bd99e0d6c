use crate::gb::cartridge::controller::{BankController, check_ram_len};
use crate::gb::cartridge::{CartridgeConfig, RAM_BANK_SIZE, ROM_BANK_SIZE, bank_mask};
use crate::gb::constants::*;
use crate::gb::error::EmuResult;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A value of 0x0A enables reading and writing of both the external RAM and
/// the RTC registers, anything else disables them.
const RAM_RTC_ENABLE_BEGIN: u16 = 0x0000;
const RAM_RTC_ENABLE_END: u16 = 0x1FFF;

/// The whole 7 bits of the ROM bank number are written here; writing zero
/// selects bank one.
const ROM_BANK_NUMBER_BEGIN: u16 = 0x2000;
const ROM_BANK_NUMBER_END: u16 = 0x3FFF;

/// Controls what is mapped at 0xA000-0xBFFF:
/// 0x00-0x07 a RAM bank, 0x08-0x0C an RTC register.
const RAM_BANK_NUMBER_BEGIN: u16 = 0x4000;
const RAM_BANK_NUMBER_END: u16 = 0x5FFF;

/// Writing 0x00 and then 0x01 here latches the current time into a shadow
/// register set, which is what reads observe.
const LATCH_CLOCK_DATA_BEGIN: u16 = 0x6000;
const LATCH_CLOCK_DATA_END: u16 = 0x7FFF;

/// Seconds trailer appended to battery saves: five RTC registers plus an
/// 8-byte little-endian host timestamp.
const RTC_TRAILER_LEN: usize = 5 + 8;

const SECONDS_PER_DAY: u64 = 86400;

bitflags! {
    /// Represents the RTC day-high register.
    #[derive(Copy, Clone, PartialEq, Debug, Default)]
    struct DayHigh: u8 {
        const DAY_MSB = 0b0000_0001;
        const HALT    = 0b0100_0000;
        const CARRY   = 0b1000_0000;
    }
}

/// The RTC register file. The day counter is 9 bits wide; overflowing it
/// sets the sticky carry bit in the day-high register.
#[derive(Copy, Clone, Default, Debug)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    day_low: u8,
    day_high: DayHigh,
}

impl RtcRegisters {
    fn to_counter(self) -> u64 {
        let days =
            u64::from(self.day_low) | (u64::from(self.day_high.contains(DayHigh::DAY_MSB)) << 8);
        days * SECONDS_PER_DAY
            + u64::from(self.hours) * 3600
            + u64::from(self.minutes) * 60
            + u64::from(self.seconds)
    }

    /// Advances the register file by a number of wall-clock seconds.
    fn advance(&mut self, elapsed: u64) {
        let total = self.to_counter() + elapsed;
        self.seconds = (total % 60) as u8;
        self.minutes = (total / 60 % 60) as u8;
        self.hours = (total / 3600 % 24) as u8;
        let days = total / SECONDS_PER_DAY;
        self.day_low = days as u8;
        self.day_high.set(DayHigh::DAY_MSB, days & 0x100 != 0);
        if days > 0x1FF {
            self.day_high.insert(DayHigh::CARRY);
        }
    }

    fn to_bytes(self) -> [u8; 5] {
        [
            self.seconds,
            self.minutes,
            self.hours,
            self.day_low,
            self.day_high.bits(),
        ]
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            seconds: bytes[0],
            minutes: bytes[1],
            hours: bytes[2],
            day_low: bytes[3],
            day_high: DayHigh::from_bits_truncate(bytes[4]),
        }
    }
}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
enum LatchState {
    #[default]
    Undefined,
    Pending,
    Latched,
}

/// The battery-buffered real-time clock. The live registers advance with
/// host wall-clock seconds while not halted; reads go through the latched
/// shadow set.
#[derive(Clone)]
struct RtcClock {
    regs: RtcRegisters,
    latched: RtcRegisters,
    latch: LatchState,
    /// Host Unix time at which `regs` was last brought up to date.
    last_sync: u64,
}

impl RtcClock {
    fn new() -> Self {
        Self {
            regs: RtcRegisters::default(),
            latched: RtcRegisters::default(),
            latch: LatchState::default(),
            last_sync: unix_now(),
        }
    }

    /// Folds the wall-clock time elapsed since the last sync into the live
    /// registers. While halted the clock stands still.
    fn catch_up(&mut self) {
        let now = unix_now();
        if !self.regs.day_high.contains(DayHigh::HALT) {
            self.regs.advance(now.saturating_sub(self.last_sync));
        }
        self.last_sync = now;
    }

    /// Live registers as they would read right now, without mutating.
    fn current(&self) -> RtcRegisters {
        let mut regs = self.regs;
        if !regs.day_high.contains(DayHigh::HALT) {
            regs.advance(unix_now().saturating_sub(self.last_sync));
        }
        regs
    }

    fn write_register(&mut self, selection: &RamBankSelection, value: u8) {
        self.catch_up();
        match selection {
            RamBankSelection::Seconds => self.regs.seconds = value & 0x3F,
            RamBankSelection::Minutes => self.regs.minutes = value & 0x3F,
            RamBankSelection::Hours => self.regs.hours = value & 0x1F,
            RamBankSelection::DayLow => self.regs.day_low = value,
            RamBankSelection::DayHigh => self.regs.day_high = DayHigh::from_bits_truncate(value),
            RamBankSelection::Bank(_) => unreachable!("not an RTC register"),
        }
    }

    fn read_register(&self, selection: &RamBankSelection) -> u8 {
        match selection {
            RamBankSelection::Seconds => self.latched.seconds,
            RamBankSelection::Minutes => self.latched.minutes,
            RamBankSelection::Hours => self.latched.hours,
            RamBankSelection::DayLow => self.latched.day_low,
            RamBankSelection::DayHigh => self.latched.day_high.bits(),
            RamBankSelection::Bank(_) => unreachable!("not an RTC register"),
        }
    }

    fn handle_latch_write(&mut self, value: u8) {
        self.latch = match value {
            0x00 => LatchState::Pending,
            0x01 if self.latch == LatchState::Pending => {
                self.catch_up();
                self.latched = self.regs;
                LatchState::Latched
            }
            _ => LatchState::Undefined,
        };
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Determines what is currently mapped into the external RAM window.
#[derive(Clone, PartialEq, Debug)]
enum RamBankSelection {
    Bank(u8),
    Seconds,
    Minutes,
    Hours,
    DayLow,
    DayHigh,
}

/// Besides addressing up to 2 MiB ROM (128 banks) and 32 KiB RAM (4 banks),
/// MBC3 optionally carries a battery-buffered real-time clock.
#[derive(Clone)]
pub struct Mbc3 {
    config: CartridgeConfig,
    rom: Arc<[u8]>,
    ram: Vec<u8>,
    rtc: Option<RtcClock>,
    rom_bank_offset: usize,
    selection: RamBankSelection,
    has_ram_rtc_access: bool,
}

impl Mbc3 {
    pub fn new(config: CartridgeConfig, rom: Arc<[u8]>, rtc: bool) -> Self {
        Self {
            ram: vec![0; config.ram_size()],
            rtc: rtc.then(RtcClock::new),
            rom_bank_offset: ROM_BANK_SIZE,
            selection: RamBankSelection::Bank(0),
            has_ram_rtc_access: false,
            rom,
            config,
        }
    }
}

impl BankController for Mbc3 {
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
            CRAM_BANK_BEGIN..=CRAM_BANK_END if self.has_ram_rtc_access => match self.selection {
                RamBankSelection::Bank(bank) => {
                    let offset =
                        bank as usize * RAM_BANK_SIZE + (address - CRAM_BANK_BEGIN) as usize;
                    self.ram.get(offset).copied().unwrap_or(UNDEFINED_READ)
                }
                ref register => match &self.rtc {
                    Some(clock) => clock.read_register(register),
                    None => UNDEFINED_READ,
                },
            },
            _ => UNDEFINED_READ,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            RAM_RTC_ENABLE_BEGIN..=RAM_RTC_ENABLE_END => {
                self.has_ram_rtc_access = value & 0b1111 == 0b1010;
            }
            ROM_BANK_NUMBER_BEGIN..=ROM_BANK_NUMBER_END => {
                let mut bank = u16::from(value & 0b0111_1111);
                if bank == 0 {
                    bank = 1;
                }
                bank &= bank_mask(self.config.rom_banks);
                self.rom_bank_offset = ROM_BANK_SIZE * bank as usize;
            }
            RAM_BANK_NUMBER_BEGIN..=RAM_BANK_NUMBER_END => {
                self.selection = match value {
                    0x00..=0x07 => RamBankSelection::Bank(value),
                    0x08 => RamBankSelection::Seconds,
                    0x09 => RamBankSelection::Minutes,
                    0x0A => RamBankSelection::Hours,
                    0x0B => RamBankSelection::DayLow,
                    0x0C => RamBankSelection::DayHigh,
                    _ => return,
                };
            }
            LATCH_CLOCK_DATA_BEGIN..=LATCH_CLOCK_DATA_END => {
                if let Some(clock) = &mut self.rtc {
                    clock.handle_latch_write(value);
                }
            }
            CRAM_BANK_BEGIN..=CRAM_BANK_END if self.has_ram_rtc_access => {
                match self.selection.clone() {
                    RamBankSelection::Bank(bank) => {
                        let offset =
                            bank as usize * RAM_BANK_SIZE + (address - CRAM_BANK_BEGIN) as usize;
                        if offset < self.ram.len() {
                            self.ram[offset] = value;
                        }
                    }
                    register => {
                        if let Some(clock) = &mut self.rtc {
                            clock.write_register(&register, value);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// The save image is the raw RAM; with an RTC the five clock registers
    /// and the current host timestamp follow so the clock can be replayed
    /// on load.
    fn save_ram(&self) -> Option<Vec<u8>> {
        if !self.config.kind.has_battery() {
            return None;
        }
        let mut data = self.ram.clone();
        if let Some(clock) = &self.rtc {
            data.extend_from_slice(&clock.current().to_bytes());
            data.extend_from_slice(&unix_now().to_le_bytes());
        }
        Some(data)
    }

    fn load_ram(&mut self, data: &[u8]) -> EmuResult<()> {
        match &mut self.rtc {
            None => {
                check_ram_len(data, self.ram.len())?;
                self.ram.copy_from_slice(data);
            }
            Some(clock) => {
                check_ram_len(data, self.ram.len() + RTC_TRAILER_LEN)?;
                let (ram, trailer) = data.split_at(self.ram.len());
                self.ram.copy_from_slice(ram);

                let mut timestamp = [0u8; 8];
                timestamp.copy_from_slice(&trailer[5..]);
                clock.regs = RtcRegisters::from_bytes(&trailer[..5]);
                clock.latched = clock.regs;
                clock.last_sync = u64::from_le_bytes(timestamp);
                // Replay the wall-clock time that passed since the save.
                clock.catch_up();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::cartridge::CartridgeKind;

    fn config(rtc: bool) -> CartridgeConfig {
        let kind = CartridgeKind::Mbc3 { rtc, battery: true };
        CartridgeConfig::new(kind, 0x03, 0x03).unwrap()
    }

    fn numbered_rom() -> Arc<[u8]> {
        (0u8..16).flat_map(|i| vec![i; ROM_BANK_SIZE]).collect()
    }

    #[test]
    fn test_ram_state() {
        let mut ctrl = Mbc3::new(config(false), numbered_rom(), false);

        let addr = CRAM_BANK_BEGIN + 0x10;
        ctrl.write(addr, 0x42);
        assert_eq!(ctrl.read(addr), 0xFF, "RAM should be disabled");

        ctrl.write(RAM_RTC_ENABLE_BEGIN, 0x0A);
        assert_eq!(ctrl.read(addr), 0x00, "First write should have been ignored");

        ctrl.write(addr, 0x42);
        assert_eq!(ctrl.read(addr), 0x42, "RAM should be enabled");

        ctrl.write(RAM_RTC_ENABLE_BEGIN, 0xFF);
        assert_eq!(ctrl.read(addr), 0xFF, "RAM should be disabled");
    }

    #[test]
    fn test_rom_bank_bits() {
        let mut ctrl = Mbc3::new(config(false), numbered_rom(), false);

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x00);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 1, "bank 0 maps to bank 1");

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0x05);
        assert_eq!(ctrl.read(ROM_HIGH_BANK_BEGIN), 5);

        ctrl.write(ROM_BANK_NUMBER_BEGIN, 0xFF);
        assert_eq!(
            ctrl.read(ROM_HIGH_BANK_BEGIN),
            0x0F,
            "only seven bits are wired, masked to the ROM size"
        );
    }

    #[test]
    fn test_ram_banking() {
        let mut ctrl = Mbc3::new(config(false), numbered_rom(), false);
        ctrl.write(RAM_RTC_ENABLE_BEGIN, 0x0A);

        for i in 0u8..4 {
            ctrl.write(RAM_BANK_NUMBER_BEGIN, i);
            assert_eq!(ctrl.read(CRAM_BANK_BEGIN), 0, "RAM should start zeroed");
            ctrl.write(CRAM_BANK_BEGIN, i + 1);
            assert_eq!(ctrl.read(CRAM_BANK_BEGIN), i + 1);
        }

        for i in 0u8..4 {
            ctrl.write(RAM_BANK_NUMBER_BEGIN, i);
            assert_eq!(ctrl.read(CRAM_BANK_BEGIN), i + 1);
        }
    }

    #[test]
    fn test_rtc_latch_shadows_reads() {
        let mut ctrl = Mbc3::new(config(true), numbered_rom(), true);
        ctrl.write(RAM_RTC_ENABLE_BEGIN, 0x0A);

        // Halt the clock through the day-high register, then set a time.
        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0x0C);
        ctrl.write(CRAM_BANK_BEGIN, DayHigh::HALT.bits());
        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0x08);
        ctrl.write(CRAM_BANK_BEGIN, 42);

        // The shadow set still holds the pre-write values.
        assert_eq!(ctrl.read(CRAM_BANK_BEGIN), 0);

        ctrl.write(LATCH_CLOCK_DATA_BEGIN, 0x00);
        ctrl.write(LATCH_CLOCK_DATA_BEGIN, 0x01);
        assert_eq!(ctrl.read(CRAM_BANK_BEGIN), 42);
    }

    #[test]
    fn test_rtc_save_trailer() {
        let mut ctrl = Mbc3::new(config(true), numbered_rom(), true);
        ctrl.write(RAM_RTC_ENABLE_BEGIN, 0x0A);
        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0x0C);
        ctrl.write(CRAM_BANK_BEGIN, DayHigh::HALT.bits());
        ctrl.write(RAM_BANK_NUMBER_BEGIN, 0x09);
        ctrl.write(CRAM_BANK_BEGIN, 58);

        let saved = ctrl.save_ram().unwrap();
        assert_eq!(saved.len(), 4 * RAM_BANK_SIZE + RTC_TRAILER_LEN);

        let mut restored = Mbc3::new(config(true), numbered_rom(), true);
        restored.load_ram(&saved).unwrap();
        restored.write(RAM_RTC_ENABLE_BEGIN, 0x0A);
        restored.write(LATCH_CLOCK_DATA_BEGIN, 0x00);
        restored.write(LATCH_CLOCK_DATA_BEGIN, 0x01);
        restored.write(RAM_BANK_NUMBER_BEGIN, 0x09);
        assert_eq!(
            restored.read(CRAM_BANK_BEGIN),
            58,
            "a halted clock should survive a save/load round-trip"
        );
    }

    #[test]
    fn test_day_counter_overflow_sets_carry() {
        let mut regs = RtcRegisters::default();
        regs.advance(513 * SECONDS_PER_DAY);
        assert!(regs.day_high.contains(DayHigh::CARRY));
        assert_eq!(regs.day_low, 1);
        assert!(!regs.day_high.contains(DayHigh::DAY_MSB));
    }
}
