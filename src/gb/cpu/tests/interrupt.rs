use crate::gb::bus::InterruptRegister;
use crate::gb::cpu::tests::MockBus;
use crate::gb::cpu::{CPU, ImeState};
use crate::gb::{Bus, SubSystem};

#[test]
fn test_interrupt_dispatch() {
    let mut bus = MockBus::new(vec![]);
    bus.set_ie(InterruptRegister::VBLANK);
    bus.set_if(InterruptRegister::VBLANK);

    let mut cpu = CPU::default();
    cpu.ime = ImeState::Enabled;
    cpu.r.pc = 0x1234;
    cpu.r.sp = 0xFFFE;

    assert_eq!(cpu.step(&mut bus).unwrap(), 20);
    assert_eq!(cpu.r.pc, 0x0040);
    assert_eq!(cpu.r.sp, 0xFFFC);
    assert_eq!(bus.read16(0xFFFC), 0x1234);
    assert!(bus.get_if().is_empty(), "the flag bit was acknowledged");
    assert_eq!(cpu.ime, ImeState::Disabled);
}

#[test]
fn test_interrupt_priority() {
    let mut bus = MockBus::new(vec![]);
    bus.set_ie(InterruptRegister::all());
    bus.set_if(InterruptRegister::TIMER | InterruptRegister::JOYPAD);

    let mut cpu = CPU::default();
    cpu.ime = ImeState::Enabled;
    cpu.r.sp = 0xFFFE;

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.r.pc, 0x0050, "the timer outranks the joypad");
    assert_eq!(bus.get_if(), InterruptRegister::JOYPAD);
}

#[test]
fn test_no_dispatch_with_ime_disabled() {
    let mut bus = MockBus::new(vec![0x00]);
    bus.set_ie(InterruptRegister::VBLANK);
    bus.set_if(InterruptRegister::VBLANK);

    let mut cpu = CPU::default();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.r.pc, 1, "the NOP executed normally");
    assert_eq!(bus.get_if(), InterruptRegister::VBLANK);
}

#[test]
fn test_ei_takes_effect_after_next_instruction() {
    // EI; NOP; NOP with an interrupt already pending.
    let mut bus = MockBus::new(vec![0xFB, 0x00, 0x00]);
    bus.set_ie(InterruptRegister::VBLANK);
    bus.set_if(InterruptRegister::VBLANK);

    let mut cpu = CPU::default();
    cpu.r.sp = 0xFFFE;

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ime, ImeState::Pending);

    // The instruction after EI still runs with interrupts disabled.
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.r.pc, 2);
    assert_eq!(cpu.ime, ImeState::Enabled);

    assert_eq!(cpu.step(&mut bus).unwrap(), 20);
    assert_eq!(cpu.r.pc, 0x0040);
}

#[test]
fn test_di_cancels_pending_ei() {
    // EI; DI; NOP
    let mut bus = MockBus::new(vec![0xFB, 0xF3, 0x00]);
    bus.set_ie(InterruptRegister::VBLANK);
    bus.set_if(InterruptRegister::VBLANK);

    let mut cpu = CPU::default();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ime, ImeState::Disabled);

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.r.pc, 3, "no dispatch happened");
}

#[test]
fn test_reti_enables_immediately() {
    let mut bus = MockBus::new(vec![0xD9]); // RETI
    bus.set_ie(InterruptRegister::VBLANK);
    bus.set_if(InterruptRegister::VBLANK);

    let mut cpu = CPU::default();
    cpu.r.sp = 0xFFFC;
    bus.write16(0xFFFC, 0x1234);

    assert_eq!(cpu.step(&mut bus).unwrap(), 16);
    assert_eq!(cpu.r.pc, 0x1234);
    assert_eq!(cpu.ime, ImeState::Enabled);

    // The very next step dispatches.
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.r.pc, 0x0040);
}

#[test]
fn test_halt_wakes_on_enabled_interrupt() {
    let mut bus = MockBus::new(vec![0x76, 0x3C]); // HALT; INC A
    bus.set_ie(InterruptRegister::TIMER);

    let mut cpu = CPU::default();
    cpu.ime = ImeState::Enabled;
    cpu.r.sp = 0xFFFE;

    cpu.step(&mut bus).unwrap();
    assert!(cpu.is_halted);

    // Nothing pending: the CPU just burns cycles.
    assert_eq!(cpu.step(&mut bus).unwrap(), 4);
    assert_eq!(cpu.r.pc, 1);

    bus.set_if(InterruptRegister::TIMER);
    cpu.step(&mut bus).unwrap();
    assert!(!cpu.is_halted);
    assert_eq!(cpu.r.pc, 0x0050, "woke up and dispatched");
}

#[test]
fn test_halt_without_ime_resumes_without_dispatch() {
    let mut bus = MockBus::new(vec![0x76, 0x3C]); // HALT; INC A
    bus.set_ie(InterruptRegister::TIMER);

    let mut cpu = CPU::default();
    cpu.step(&mut bus).unwrap();
    assert!(cpu.is_halted);

    bus.set_if(InterruptRegister::TIMER);
    cpu.step(&mut bus).unwrap();
    assert!(!cpu.is_halted);
    assert_eq!(cpu.r.pc, 2, "resumed with the INC, no dispatch");
    assert_eq!(cpu.r.a, 1);
    assert_eq!(bus.get_if(), InterruptRegister::TIMER, "flag untouched");
}

#[test]
fn test_halt_bug_executes_opcode_twice() {
    // HALT with IME off and an interrupt already pending: the next opcode
    // is fetched without advancing PC, so INC A runs twice.
    let mut bus = MockBus::new(vec![0x76, 0x3C, 0x00]);
    bus.set_ie(InterruptRegister::TIMER);
    bus.set_if(InterruptRegister::TIMER);

    let mut cpu = CPU::default();
    cpu.step(&mut bus).unwrap();
    assert!(!cpu.is_halted, "the CPU does not sleep in the bug case");

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.r.a, 1);
    assert_eq!(cpu.r.pc, 1, "PC was not advanced for the bugged fetch");

    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.r.a, 2);
    assert_eq!(cpu.r.pc, 2);
}

#[test]
fn test_stop_resumes_on_joypad_interrupt() {
    let mut bus = MockBus::new(vec![0x10, 0x00, 0x3C]); // STOP; INC A
    let mut cpu = CPU::default();

    cpu.step(&mut bus).unwrap();
    assert!(cpu.is_stopped);
    assert_eq!(cpu.r.pc, 2, "STOP consumes its padding byte");

    assert_eq!(cpu.step(&mut bus).unwrap(), 4);
    assert_eq!(cpu.r.pc, 2, "stopped CPUs do not fetch");

    bus.set_if(InterruptRegister::JOYPAD);
    cpu.step(&mut bus).unwrap();
    assert!(!cpu.is_stopped);
    assert_eq!(cpu.r.a, 1, "a button press resumed execution");
}
