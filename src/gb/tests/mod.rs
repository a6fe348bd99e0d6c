mod timer;

use crate::gb::bus::{InterruptRegister, MainBus};
use crate::gb::cartridge::Cartridge;
use crate::gb::cartridge::tests::{build_rom, finalize_checksums};
use crate::gb::constants::*;
use crate::gb::cpu::{CPU, ImeState};
use crate::gb::joypad::Button;
use crate::gb::{Emulator, SubSystem};
use std::sync::Arc;
use std::sync::mpsc;

fn bus_with_rom(rom: Vec<u8>) -> MainBus {
    let cartridge = Cartridge::try_from(Arc::from(rom.into_boxed_slice())).unwrap();
    MainBus::with_cartridge(cartridge)
}

/// A ROM whose entry point spins in `JP 0x0150` forever, 16 cycles a lap.
fn spinning_rom() -> Vec<u8> {
    let mut rom = build_rom(0x00, 0x00, 0x00);
    rom[0x100..0x103].copy_from_slice(&[0xC3, 0x50, 0x01]);
    rom[0x150..0x153].copy_from_slice(&[0xC3, 0x50, 0x01]);
    finalize_checksums(&mut rom);
    rom
}

/// Steps CPU and bus together until the predicate on the bus holds,
/// returning the master cycles consumed.
fn run_until(cpu: &mut CPU, bus: &mut MainBus, predicate: impl Fn(&MainBus) -> bool) -> u64 {
    let mut cycles = 0u64;
    while !predicate(bus) {
        let consumed = cpu.step(bus).unwrap();
        bus.step(consumed);
        cycles += u64::from(consumed);
        assert!(cycles < 2 * u64::from(CYCLES_PER_FRAME), "predicate never held");
    }
    cycles
}

#[test]
fn test_echo_ram_aliases_work_ram() {
    let mut bus = bus_with_rom(build_rom(0x00, 0x00, 0x00));

    bus.write(0xC123, 0x42);
    assert_eq!(bus.read(0xE123), 0x42);

    bus.write(0xFDFF, 0x99);
    assert_eq!(bus.read(0xDDFF), 0x99);
}

#[test]
fn test_prohibited_region() {
    let mut bus = bus_with_rom(build_rom(0x00, 0x00, 0x00));
    bus.write(0xFEA0, 0x42);
    assert_eq!(bus.read(0xFEA0), 0xFF);
    assert_eq!(bus.read(0xFEFF), 0xFF);
}

#[test]
fn test_interrupt_registers_undocumented_bits() {
    let mut bus = bus_with_rom(build_rom(0x00, 0x00, 0x00));

    bus.write(INTERRUPT_FLAG, 0x00);
    assert_eq!(bus.read(INTERRUPT_FLAG), 0xE0, "IF bits 5-7 read as 1");

    bus.write(INTERRUPT_ENABLE, 0xFF);
    assert_eq!(bus.read(INTERRUPT_ENABLE), 0xFF);
    assert_eq!(bus.interrupt_enable.bits(), 0x1F, "only 5 bits are stored");
}

#[test]
fn test_hram_round_trip() {
    let mut bus = bus_with_rom(build_rom(0x00, 0x00, 0x00));
    bus.write16(0xFF85, 0xBEEF);
    assert_eq!(bus.read16(0xFF85), 0xBEEF);
}

#[test]
fn test_oam_dma_copies_a_page_snapshot() {
    let mut bus = bus_with_rom(build_rom(0x00, 0x00, 0x00));
    // Park the panel so OAM can be read back.
    bus.write(PPU_LCDC, 0x11);

    for offset in 0..OAM_SIZE as u16 {
        bus.write(0xC000 + offset, offset as u8 ^ 0x5A);
    }
    bus.write(PPU_DMA, 0xC0);

    assert_eq!(bus.read(PPU_DMA), 0xC0, "the source page reads back");
    for offset in 0..OAM_SIZE as u16 {
        assert_eq!(bus.read(OAM_BEGIN + offset), offset as u8 ^ 0x5A);
    }
}

#[test]
fn test_vram_gated_during_pixel_transfer() {
    let mut bus = bus_with_rom(build_rom(0x00, 0x00, 0x00));
    bus.write(VRAM_BEGIN, 0x42);

    // 80 cycles of OAM scan put the PPU into the pixel transfer.
    bus.step(80);
    assert_eq!(bus.read(VRAM_BEGIN), 0xFF);
    bus.write(VRAM_BEGIN, 0x99);

    // By the end of the line the write must have been dropped.
    bus.step(456 - 80);
    assert_eq!(bus.read(VRAM_BEGIN), 0x42);
}

#[test]
fn test_sound_registers_are_stubs() {
    let mut bus = bus_with_rom(build_rom(0x00, 0x00, 0x00));
    bus.write(0xFF24, 0x77);
    assert_eq!(bus.read(0xFF24), 0x77);
    bus.write(0xFF11, 0x3F);
    assert_eq!(bus.read(0xFF11), 0x3F);
}

/// The end-to-end timer scenario: enable the /16 tap, preload TIMA with
/// 0xFE and HALT. The overflow lands 32 cycles later, the reload and the
/// interrupt one cycle after that.
#[test]
fn test_timer_interrupt_from_halt() {
    let mut bus = bus_with_rom(spinning_rom());
    let mut cpu = CPU::post_boot();
    cpu.ime = ImeState::Enabled;
    cpu.is_halted = true;

    bus.write(TIMER_CTRL, 0x05);
    bus.write(TIMER_DIVIDER, 0x00);
    bus.write(TIMER_COUNTER, 0xFE);
    bus.write(TIMER_MODULO, 0x00);
    bus.write(INTERRUPT_ENABLE, 0x04);

    bus.step(16);
    assert_eq!(bus.read(TIMER_COUNTER), 0xFF);

    bus.step(16);
    assert_eq!(bus.read(TIMER_COUNTER), 0x00, "overflowed at cycle 32");
    assert!(!bus.interrupt_flag.contains(InterruptRegister::TIMER));

    bus.step(1);
    assert_eq!(bus.read(TIMER_COUNTER), 0x00, "reloaded from TMA");
    assert!(bus.interrupt_flag.contains(InterruptRegister::TIMER));

    assert_eq!(cpu.step(&mut bus).unwrap(), 20);
    assert_eq!(cpu.r.pc, 0x0050, "vectored to the timer handler");
    assert!(!cpu.is_halted);
}

/// The VBlank handshake: the interrupt flag rises once per frame, 70224
/// cycles apart.
#[test]
fn test_vblank_cadence() {
    let mut bus = bus_with_rom(spinning_rom());
    let mut cpu = CPU::post_boot();

    let first = run_until(&mut cpu, &mut bus, |bus| {
        bus.interrupt_flag.contains(InterruptRegister::VBLANK)
    });
    assert_eq!(first, 144 * u64::from(CYCLES_PER_LINE));

    bus.interrupt_flag.remove(InterruptRegister::VBLANK);
    let second = run_until(&mut cpu, &mut bus, |bus| {
        bus.interrupt_flag.contains(InterruptRegister::VBLANK)
    });
    assert_eq!(second, u64::from(CYCLES_PER_FRAME));
}

/// MBC1 bank arithmetic observed through the bus, including the bank 0x20
/// translation.
#[test]
fn test_mbc1_bank_translation() {
    let mut rom = build_rom(0x01, 0x05, 0x00); // 1 MiB MBC1
    for bank in 0..64usize {
        rom[bank * 0x4000] = bank as u8;
    }
    finalize_checksums(&mut rom);
    let mut bus = bus_with_rom(rom);

    bus.write(0x2100, 0x00);
    assert_eq!(bus.read(0x4000), 1, "bank 0 maps to bank 1");

    bus.write(0x2100, 0x13);
    assert_eq!(bus.read(0x4000), 0x13);

    // Bank 0x20 through the secondary register maps to 0x21.
    bus.write(0x4000, 0x01);
    bus.write(0x2100, 0x00);
    assert_eq!(bus.read(0x4000), 0x21);
}

#[test]
fn test_stop_wakes_on_button_press() {
    let mut rom = build_rom(0x00, 0x00, 0x00);
    rom[0x100..0x103].copy_from_slice(&[0x10, 0x00, 0x3C]); // STOP; INC A
    finalize_checksums(&mut rom);
    let mut bus = bus_with_rom(rom);
    let mut cpu = CPU::post_boot();

    cpu.step(&mut bus).unwrap();
    assert!(cpu.is_stopped);

    cpu.step(&mut bus).unwrap();
    assert!(cpu.is_stopped, "still parked without input");

    bus.set_button(Button::Start, true);
    cpu.step(&mut bus).unwrap();
    assert!(!cpu.is_stopped);
    assert_eq!(cpu.r.a, 0x02, "the INC after STOP executed");
}

#[test]
fn test_emulator_host_api() {
    let (sender, _frames) = mpsc::channel();
    let (_input, receiver) = mpsc::channel();
    let mut emulator = Emulator::load_rom(sender, receiver, &spinning_rom()).unwrap();

    emulator.step_cycles(u64::from(CYCLES_PER_FRAME)).unwrap();
    assert_eq!(emulator.framebuffer().len(), 160 * 144);

    emulator.set_button(Button::A, true);
    assert!(
        emulator.save_ram().is_none(),
        "no battery on a plain ROM cartridge"
    );
}
