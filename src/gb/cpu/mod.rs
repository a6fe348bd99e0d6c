pub mod instruction;
pub mod registers;
#[cfg(test)]
mod tests;

use crate::gb::Bus;
use crate::gb::bus::InterruptRegister;
use crate::gb::constants::IRQ_DISPATCH_CYCLES;
use crate::gb::cpu::instruction::{AddrMode, Condition, Instruction, Mnemonic, Reg};
use crate::gb::cpu::registers::{FlagsRegister, Registers};
use crate::gb::error::{EmuError, EmuResult};

/// IME (Interrupt Master Enable) state. The EI instruction enables the
/// interrupt master only after the following instruction has completed,
/// which puts it on state `ImeState::Pending` first.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub enum ImeState {
    #[default]
    Disabled,
    Pending,
    Enabled,
}

/// Implements the CPU for the GB (DMG-01),
/// the CPU is LR35902 which is a subset of i8080 & Z80.
///
/// Opcodes are decoded through the two static descriptor tables in
/// [`instruction`]; `step` returns the number of master cycles consumed so
/// the driver can advance the PPU and timer in lockstep.
#[derive(Default)]
pub struct CPU {
    pub r: Registers,
    pub ime: ImeState,
    pub is_halted: bool,
    pub is_stopped: bool,
    halt_bug: bool,
}

impl CPU {
    /// Creates a CPU in the post-boot state, ready to execute the cartridge
    /// entry point at 0x0100.
    pub fn post_boot() -> Self {
        Self {
            r: Registers::post_boot(),
            ..Self::default()
        }
    }

    /// Makes one CPU step: dispatches a pending interrupt or executes the
    /// instruction at PC. Returns the number of master cycles consumed.
    pub fn step<T: Bus>(&mut self, bus: &mut T) -> EmuResult<u16> {
        if self.is_stopped {
            // STOP ends on a button press, observable as the joypad
            // interrupt flag going up.
            if bus.get_if().contains(InterruptRegister::JOYPAD) {
                self.is_stopped = false;
            } else {
                return Ok(4);
            }
        }

        let pending = bus.get_ie().bits() & bus.get_if().bits() & 0b0001_1111;
        if pending != 0 {
            self.is_halted = false;
            if self.ime == ImeState::Enabled {
                return Ok(self.dispatch_interrupt(bus));
            }
        }
        if self.is_halted {
            return Ok(4);
        }

        // EI arms the master enable for the instruction after the next one.
        let promote_ime = self.ime == ImeState::Pending;

        let fetch_pc = self.r.pc;
        let opcode = bus.read(self.r.pc);
        if self.halt_bug {
            // PC is not advanced, the following opcode executes twice.
            self.halt_bug = false;
        } else {
            self.r.pc = self.r.pc.wrapping_add(1);
        }

        let mut instruction = Instruction::decode(opcode);
        if instruction.mnemonic == Mnemonic::Cb {
            let prefixed = bus.read(self.r.pc);
            self.r.pc = self.r.pc.wrapping_add(1);
            instruction = Instruction::decode_prefixed(prefixed);
        }
        if instruction.mnemonic == Mnemonic::Err {
            return Err(EmuError::IllegalOpcode {
                opcode,
                pc: fetch_pc,
            });
        }

        let operand = self.fetch_operand(instruction, bus);
        let branched = self.execute(instruction, operand, bus);

        if promote_ime && self.ime == ImeState::Pending {
            self.ime = ImeState::Enabled;
        }

        let cycles = match branched {
            true => instruction.cycles,
            false => instruction.alt_cycles,
        };
        Ok(u16::from(cycles))
    }

    /// Acknowledges the highest-priority pending interrupt: clears its flag
    /// bit, disables the master enable, pushes PC and jumps to the vector.
    fn dispatch_interrupt<T: Bus>(&mut self, bus: &mut T) -> u16 {
        let pending =
            InterruptRegister::from_bits_truncate(bus.get_ie().bits() & bus.get_if().bits());
        let Some(irq) = pending.highest_prio() else {
            return 0;
        };
        bus.set_if(bus.get_if().difference(irq));
        self.ime = ImeState::Disabled;
        self.push(self.r.pc, bus);
        self.r.pc = irq.vector();
        IRQ_DISPATCH_CYCLES
    }

    /// Reads the operand bytes demanded by the addressing mode and advances
    /// PC past them. 8-bit operands land in the low byte.
    fn fetch_operand<T: Bus>(&mut self, instruction: &Instruction, bus: &mut T) -> u16 {
        match instruction.operand_len() {
            0 => 0,
            1 => {
                let value = bus.read(self.r.pc);
                self.r.pc = self.r.pc.wrapping_add(1);
                u16::from(value)
            }
            _ => {
                let value = bus.read16(self.r.pc);
                self.r.pc = self.r.pc.wrapping_add(2);
                value
            }
        }
    }

    /// Executes the given instruction. Returns whether a conditional branch
    /// was taken; unconditional instructions always report `true`.
    fn execute<T: Bus>(&mut self, instruction: &Instruction, operand: u16, bus: &mut T) -> bool {
        use Mnemonic::*;
        match instruction.mnemonic {
            Nop => {}
            Ld => self.handle_ld(instruction, operand, bus),
            Ldh => self.handle_ldh(instruction, operand, bus),
            Inc => self.handle_inc(instruction, bus),
            Dec => self.handle_dec(instruction, bus),
            Add => self.handle_add(instruction, operand, bus),
            Adc => {
                let value = self.read_source(instruction, operand, bus);
                self.handle_adc(value);
            }
            Sub => {
                let value = self.read_source(instruction, operand, bus);
                self.handle_sub(value);
            }
            Sbc => {
                let value = self.read_source(instruction, operand, bus);
                self.handle_sbc(value);
            }
            And => {
                let value = self.read_source(instruction, operand, bus);
                self.handle_and(value);
            }
            Xor => {
                let value = self.read_source(instruction, operand, bus);
                self.handle_xor(value);
            }
            Or => {
                let value = self.read_source(instruction, operand, bus);
                self.handle_or(value);
            }
            Cp => {
                let value = self.read_source(instruction, operand, bus);
                self.handle_cp(value);
            }
            Jp => return self.handle_jp(instruction, operand),
            Jr => return self.handle_jr(instruction, operand),
            Call => return self.handle_call(instruction, operand, bus),
            Ret => return self.handle_ret(instruction, bus),
            Reti => {
                self.ime = ImeState::Enabled;
                self.r.pc = self.pop(bus);
            }
            Push => {
                let value = self.read_reg16(instruction.reg1);
                self.push(value, bus);
            }
            Pop => {
                let value = self.pop(bus);
                self.write_reg16(instruction.reg1, value);
            }
            Rst => {
                self.push(self.r.pc, bus);
                self.r.pc = u16::from(instruction.param);
            }
            Halt => self.handle_halt(bus),
            Stop => self.is_stopped = true,
            Di => self.ime = ImeState::Disabled,
            Ei => self.ime = ImeState::Pending,
            Daa => self.handle_daa(),
            Cpl => self.handle_cpl(),
            Scf => {
                self.r
                    .f
                    .update(self.r.f.contains(FlagsRegister::ZERO), false, false, true);
            }
            Ccf => {
                let carry = self.r.f.contains(FlagsRegister::CARRY);
                self.r
                    .f
                    .update(self.r.f.contains(FlagsRegister::ZERO), false, false, !carry);
            }
            Rlca => self.r.a = self.rotate_left(self.r.a, false, false),
            Rla => self.r.a = self.rotate_left(self.r.a, true, false),
            Rrca => self.r.a = self.rotate_right(self.r.a, false, false),
            Rra => self.r.a = self.rotate_right(self.r.a, true, false),
            Rlc => self.rmw(instruction, bus, |cpu, v| cpu.rotate_left(v, false, true)),
            Rl => self.rmw(instruction, bus, |cpu, v| cpu.rotate_left(v, true, true)),
            Rrc => self.rmw(instruction, bus, |cpu, v| cpu.rotate_right(v, false, true)),
            Rr => self.rmw(instruction, bus, |cpu, v| cpu.rotate_right(v, true, true)),
            Sla => self.rmw(instruction, bus, CPU::shift_left),
            Sra => self.rmw(instruction, bus, |cpu, v| cpu.shift_right(v, true)),
            Srl => self.rmw(instruction, bus, |cpu, v| cpu.shift_right(v, false)),
            Swap => self.rmw(instruction, bus, CPU::swap_nibbles),
            Bit => self.handle_bit(instruction, bus),
            Res => {
                let bit = instruction.param;
                self.rmw(instruction, bus, |_, v| v & !(1 << bit));
            }
            Set => {
                let bit = instruction.param;
                self.rmw(instruction, bus, |_, v| v | (1 << bit));
            }
            // Both are resolved before execution.
            Cb | Err => unreachable!("not an executable instruction"),
        }
        true
    }

    /// Evaluates a branch condition against the flags register.
    #[inline]
    fn resolve_condition(&self, cond: Option<Condition>) -> bool {
        match cond {
            None => true,
            Some(Condition::NotZero) => !self.r.f.contains(FlagsRegister::ZERO),
            Some(Condition::Zero) => self.r.f.contains(FlagsRegister::ZERO),
            Some(Condition::NotCarry) => !self.r.f.contains(FlagsRegister::CARRY),
            Some(Condition::Carry) => self.r.f.contains(FlagsRegister::CARRY),
        }
    }

    /// Push a u16 value onto the stack
    #[inline]
    pub fn push<T: Bus>(&mut self, value: u16, bus: &mut T) {
        self.r.sp = self.r.sp.wrapping_sub(1);
        bus.write(self.r.sp, (value >> 8) as u8);
        self.r.sp = self.r.sp.wrapping_sub(1);
        bus.write(self.r.sp, value as u8);
    }

    /// Pop a u16 value from the stack
    #[inline]
    pub fn pop<T: Bus>(&mut self, bus: &mut T) -> u16 {
        let lsb = bus.read(self.r.sp) as u16;
        self.r.sp = self.r.sp.wrapping_add(1);
        let msb = bus.read(self.r.sp) as u16;
        self.r.sp = self.r.sp.wrapping_add(1);
        (msb << 8) | lsb
    }

    #[inline]
    fn read_reg8(&self, reg: Option<Reg>) -> u8 {
        match reg {
            Some(Reg::A) => self.r.a,
            Some(Reg::B) => self.r.b,
            Some(Reg::C) => self.r.c,
            Some(Reg::D) => self.r.d,
            Some(Reg::E) => self.r.e,
            Some(Reg::H) => self.r.h,
            Some(Reg::L) => self.r.l,
            _ => unreachable!("not an 8-bit register operand"),
        }
    }

    #[inline]
    fn write_reg8(&mut self, reg: Option<Reg>, value: u8) {
        match reg {
            Some(Reg::A) => self.r.a = value,
            Some(Reg::B) => self.r.b = value,
            Some(Reg::C) => self.r.c = value,
            Some(Reg::D) => self.r.d = value,
            Some(Reg::E) => self.r.e = value,
            Some(Reg::H) => self.r.h = value,
            Some(Reg::L) => self.r.l = value,
            _ => unreachable!("not an 8-bit register operand"),
        }
    }

    #[inline]
    fn read_reg16(&self, reg: Option<Reg>) -> u16 {
        match reg {
            Some(Reg::AF) => self.r.get_af(),
            Some(Reg::BC) => self.r.get_bc(),
            Some(Reg::DE) => self.r.get_de(),
            Some(Reg::HL) => self.r.get_hl(),
            Some(Reg::SP) => self.r.sp,
            _ => unreachable!("not a 16-bit register operand"),
        }
    }

    #[inline]
    fn write_reg16(&mut self, reg: Option<Reg>, value: u16) {
        match reg {
            Some(Reg::AF) => self.r.set_af(value),
            Some(Reg::BC) => self.r.set_bc(value),
            Some(Reg::DE) => self.r.set_de(value),
            Some(Reg::HL) => self.r.set_hl(value),
            Some(Reg::SP) => self.r.sp = value,
            _ => unreachable!("not a 16-bit register operand"),
        }
    }

    /// Resolves the byte source of an ALU instruction: reg2, an immediate,
    /// or the memory cell reg2 points to.
    fn read_source<T: Bus>(&self, instruction: &Instruction, operand: u16, bus: &mut T) -> u8 {
        match instruction.mode {
            AddrMode::RR => self.read_reg8(instruction.reg2),
            AddrMode::RD8 => operand as u8,
            AddrMode::RMr => bus.read(self.read_reg16(instruction.reg2)),
            _ => unreachable!("not a byte source mode"),
        }
    }

    /// Read-modify-write on the CB operand, a register or the cell at HL.
    fn rmw<T: Bus>(&mut self, instruction: &Instruction, bus: &mut T, f: impl Fn(&mut Self, u8) -> u8) {
        match instruction.mode {
            AddrMode::R => {
                let value = self.read_reg8(instruction.reg1);
                let result = f(self, value);
                self.write_reg8(instruction.reg1, result);
            }
            AddrMode::Mr => {
                let address = self.r.get_hl();
                let value = bus.read(address);
                let result = f(self, value);
                bus.write(address, result);
            }
            _ => unreachable!("not a read-modify-write mode"),
        }
    }

    /// Handles all LD variants.
    fn handle_ld<T: Bus>(&mut self, instruction: &Instruction, operand: u16, bus: &mut T) {
        match instruction.mode {
            AddrMode::RD16 => self.write_reg16(instruction.reg1, operand),
            AddrMode::RD8 => self.write_reg8(instruction.reg1, operand as u8),
            AddrMode::RR => match instruction.reg1 {
                // LD SP, HL is the only register-to-register word load.
                Some(Reg::SP) => self.r.sp = self.r.get_hl(),
                _ => {
                    let value = self.read_reg8(instruction.reg2);
                    self.write_reg8(instruction.reg1, value);
                }
            },
            AddrMode::RMr => {
                let value = bus.read(self.read_reg16(instruction.reg2));
                self.write_reg8(instruction.reg1, value);
            }
            AddrMode::MrR => {
                let address = self.read_reg16(instruction.reg1);
                bus.write(address, self.read_reg8(instruction.reg2));
            }
            AddrMode::MrD8 => bus.write(self.r.get_hl(), operand as u8),
            AddrMode::RHli => {
                let hl = self.r.get_hl();
                self.r.a = bus.read(hl);
                self.r.set_hl(hl.wrapping_add(1));
            }
            AddrMode::RHld => {
                let hl = self.r.get_hl();
                self.r.a = bus.read(hl);
                self.r.set_hl(hl.wrapping_sub(1));
            }
            AddrMode::HliR => {
                let hl = self.r.get_hl();
                bus.write(hl, self.r.a);
                self.r.set_hl(hl.wrapping_add(1));
            }
            AddrMode::HldR => {
                let hl = self.r.get_hl();
                bus.write(hl, self.r.a);
                self.r.set_hl(hl.wrapping_sub(1));
            }
            AddrMode::A16R => match instruction.reg2 {
                Some(Reg::SP) => bus.write16(operand, self.r.sp),
                _ => bus.write(operand, self.r.a),
            },
            AddrMode::RA16 => self.r.a = bus.read(operand),
            AddrMode::HlSpr => {
                let result = self.add_signed(self.r.sp, operand as u8);
                self.r.set_hl(result);
            }
            _ => unreachable!("not a load mode"),
        }
    }

    /// Handles the high-memory loads LDH (a8),A / LDH A,(a8) / LD (C),A / LD A,(C).
    fn handle_ldh<T: Bus>(&mut self, instruction: &Instruction, operand: u16, bus: &mut T) {
        match instruction.mode {
            AddrMode::A8R => bus.write(0xFF00 | operand, self.r.a),
            AddrMode::RA8 => self.r.a = bus.read(0xFF00 | operand),
            AddrMode::MrR => bus.write(0xFF00 | u16::from(self.r.c), self.r.a),
            AddrMode::RMr => self.r.a = bus.read(0xFF00 | u16::from(self.r.c)),
            _ => unreachable!("not a high-memory load mode"),
        }
    }

    /// Handles INC for registers, register pairs and the cell at HL.
    fn handle_inc<T: Bus>(&mut self, instruction: &Instruction, bus: &mut T) {
        match (instruction.mode, instruction.reg1) {
            (AddrMode::R, Some(reg)) if reg.is_pair() => {
                let value = self.read_reg16(instruction.reg1);
                self.write_reg16(instruction.reg1, value.wrapping_add(1));
            }
            (AddrMode::R, _) => {
                let value = self.read_reg8(instruction.reg1);
                let result = self.inc8(value);
                self.write_reg8(instruction.reg1, result);
            }
            (AddrMode::Mr, _) => {
                let address = self.r.get_hl();
                let value = bus.read(address);
                let result = self.inc8(value);
                bus.write(address, result);
            }
            _ => unreachable!("not an increment mode"),
        }
    }

    /// Handles DEC for registers, register pairs and the cell at HL.
    fn handle_dec<T: Bus>(&mut self, instruction: &Instruction, bus: &mut T) {
        match (instruction.mode, instruction.reg1) {
            (AddrMode::R, Some(reg)) if reg.is_pair() => {
                let value = self.read_reg16(instruction.reg1);
                self.write_reg16(instruction.reg1, value.wrapping_sub(1));
            }
            (AddrMode::R, _) => {
                let value = self.read_reg8(instruction.reg1);
                let result = self.dec8(value);
                self.write_reg8(instruction.reg1, result);
            }
            (AddrMode::Mr, _) => {
                let address = self.r.get_hl();
                let value = bus.read(address);
                let result = self.dec8(value);
                bus.write(address, result);
            }
            _ => unreachable!("not a decrement mode"),
        }
    }

    #[inline]
    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.r.f.set(FlagsRegister::ZERO, result == 0);
        self.r.f.remove(FlagsRegister::SUBTRACTION);
        self.r
            .f
            .set(FlagsRegister::HALF_CARRY, value & 0b1111 == 0b1111);
        result
    }

    #[inline]
    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.r.f.set(FlagsRegister::ZERO, result == 0);
        self.r.f.insert(FlagsRegister::SUBTRACTION);
        self.r.f.set(FlagsRegister::HALF_CARRY, value & 0b1111 == 0);
        result
    }

    /// Handles ADD A,n / ADD HL,rr / ADD SP,s8 depending on the target.
    fn handle_add<T: Bus>(&mut self, instruction: &Instruction, operand: u16, bus: &mut T) {
        match instruction.reg1 {
            Some(Reg::SP) => self.r.sp = self.add_signed(self.r.sp, operand as u8),
            Some(Reg::HL) => {
                let value = self.read_reg16(instruction.reg2);
                let hl = self.r.get_hl();
                let (result, overflow) = hl.overflowing_add(value);
                self.r.f.remove(FlagsRegister::SUBTRACTION);
                self.r
                    .f
                    .set(FlagsRegister::HALF_CARRY, (hl ^ value ^ result) & 0x1000 != 0);
                self.r.f.set(FlagsRegister::CARRY, overflow);
                self.r.set_hl(result);
            }
            _ => {
                let value = self.read_source(instruction, operand, bus);
                let (result, overflow) = self.r.a.overflowing_add(value);
                let half_carry = (self.r.a & 0b1111) + (value & 0b1111) > 0b1111;
                self.r.f.update(result == 0, false, half_carry, overflow);
                self.r.a = result;
            }
        }
    }

    /// Adds a signed 8-bit offset to a 16-bit value, with the flag rules
    /// shared by ADD SP,s8 and LD HL,SP+s8: half carry and carry come from
    /// the unsigned low byte addition, Z and N are always cleared.
    fn add_signed(&mut self, base: u16, offset: u8) -> u16 {
        let signed = i32::from(offset as i8);
        let result = (base as i32).wrapping_add(signed);
        let carry_bits = base as i32 ^ signed ^ result;
        self.r.f.update(
            false,
            false,
            carry_bits & 0b0001_0000 != 0,
            carry_bits & 0b1_0000_0000 != 0,
        );
        result as u16
    }

    fn handle_adc(&mut self, value: u8) {
        let carry = self.r.f.contains(FlagsRegister::CARRY) as u8;
        let half_carry = (self.r.a & 0b1111) + (value & 0b1111) + carry > 0b1111;
        let (result, overflow1) = self.r.a.overflowing_add(value);
        let (result, overflow2) = result.overflowing_add(carry);
        self.r
            .f
            .update(result == 0, false, half_carry, overflow1 | overflow2);
        self.r.a = result;
    }

    fn handle_sub(&mut self, value: u8) {
        let result = self.sub8(value, 0);
        self.r.a = result;
    }

    fn handle_sbc(&mut self, value: u8) {
        let carry = self.r.f.contains(FlagsRegister::CARRY) as u8;
        let result = self.sub8(value, carry);
        self.r.a = result;
    }

    /// Handles CP: SUB without committing the result.
    fn handle_cp(&mut self, value: u8) {
        self.sub8(value, 0);
    }

    #[inline]
    fn sub8(&mut self, value: u8, carry: u8) -> u8 {
        let a = u32::from(self.r.a);
        let result = a
            .wrapping_sub(u32::from(value))
            .wrapping_sub(u32::from(carry));
        let carry_bits = a ^ u32::from(value) ^ result;
        self.r.f.update(
            result as u8 == 0,
            true,
            carry_bits & 0b0001_0000 != 0,
            result & 0b1_0000_0000 != 0,
        );
        result as u8
    }

    #[inline]
    fn handle_and(&mut self, value: u8) {
        self.r.a &= value;
        self.r.f.update(self.r.a == 0, false, true, false);
    }

    #[inline]
    fn handle_xor(&mut self, value: u8) {
        self.r.a ^= value;
        self.r.f.update(self.r.a == 0, false, false, false);
    }

    #[inline]
    fn handle_or(&mut self, value: u8) {
        self.r.a |= value;
        self.r.f.update(self.r.a == 0, false, false, false);
    }

    fn handle_jp(&mut self, instruction: &Instruction, operand: u16) -> bool {
        if instruction.mode == AddrMode::R {
            self.r.pc = self.r.get_hl();
            return true;
        }
        if !self.resolve_condition(instruction.cond) {
            return false;
        }
        self.r.pc = operand;
        true
    }

    fn handle_jr(&mut self, instruction: &Instruction, operand: u16) -> bool {
        if !self.resolve_condition(instruction.cond) {
            return false;
        }
        // PC is already past the operand, the offset is relative to it.
        let offset = operand as u8 as i8;
        self.r.pc = self.r.pc.wrapping_add(offset as u16);
        true
    }

    fn handle_call<T: Bus>(&mut self, instruction: &Instruction, operand: u16, bus: &mut T) -> bool {
        if !self.resolve_condition(instruction.cond) {
            return false;
        }
        self.push(self.r.pc, bus);
        self.r.pc = operand;
        true
    }

    fn handle_ret<T: Bus>(&mut self, instruction: &Instruction, bus: &mut T) -> bool {
        if !self.resolve_condition(instruction.cond) {
            return false;
        }
        self.r.pc = self.pop(bus);
        true
    }

    /// Handles HALT, including the hardware quirk: entering HALT with the
    /// master enable off while an interrupt is already pending does not
    /// sleep, it corrupts the following fetch instead.
    fn handle_halt<T: Bus>(&mut self, bus: &mut T) {
        let pending = bus.get_ie().bits() & bus.get_if().bits() & 0b0001_1111;
        if self.ime == ImeState::Enabled || pending == 0 {
            self.is_halted = true;
        } else {
            self.halt_bug = true;
        }
    }

    /// Handles DAA: adjusts A to a valid BCD result after an addition or
    /// subtraction.
    fn handle_daa(&mut self) {
        if self.r.f.contains(FlagsRegister::SUBTRACTION) {
            if self.r.f.contains(FlagsRegister::CARRY) {
                self.r.a = self.r.a.wrapping_sub(0x60);
            }
            if self.r.f.contains(FlagsRegister::HALF_CARRY) {
                self.r.a = self.r.a.wrapping_sub(0x06);
            }
        } else {
            if self.r.f.contains(FlagsRegister::CARRY) || self.r.a > 0x99 {
                self.r.a = self.r.a.wrapping_add(0x60);
                self.r.f.insert(FlagsRegister::CARRY);
            }
            if self.r.f.contains(FlagsRegister::HALF_CARRY) || (self.r.a & 0b1111) > 0x09 {
                self.r.a = self.r.a.wrapping_add(0x06);
            }
        }
        self.r.f.set(FlagsRegister::ZERO, self.r.a == 0);
        self.r.f.remove(FlagsRegister::HALF_CARRY);
    }

    #[inline]
    fn handle_cpl(&mut self) {
        self.r.a = !self.r.a;
        self.r.f.insert(FlagsRegister::SUBTRACTION);
        self.r.f.insert(FlagsRegister::HALF_CARRY);
    }

    fn handle_bit<T: Bus>(&mut self, instruction: &Instruction, bus: &mut T) {
        let value = match instruction.mode {
            AddrMode::R => self.read_reg8(instruction.reg1),
            _ => bus.read(self.r.get_hl()),
        };
        self.r
            .f
            .set(FlagsRegister::ZERO, value & (1 << instruction.param) == 0);
        self.r.f.remove(FlagsRegister::SUBTRACTION);
        self.r.f.insert(FlagsRegister::HALF_CARRY);
    }

    /// Rotate left, either through the carry flag or circular. The CB-prefix
    /// variants set Z from the result, the accumulator ones always clear it.
    fn rotate_left(&mut self, value: u8, through_carry: bool, update_zero: bool) -> u8 {
        let carry = value & 0b1000_0000 != 0;
        let incoming = match through_carry {
            true => self.r.f.contains(FlagsRegister::CARRY) as u8,
            false => carry as u8,
        };
        let result = (value << 1) | incoming;
        self.r
            .f
            .update(update_zero && result == 0, false, false, carry);
        result
    }

    /// Rotate right, mirror of `rotate_left`.
    fn rotate_right(&mut self, value: u8, through_carry: bool, update_zero: bool) -> u8 {
        let carry = value & 0b0000_0001 != 0;
        let incoming = match through_carry {
            true => self.r.f.contains(FlagsRegister::CARRY) as u8,
            false => carry as u8,
        };
        let result = (value >> 1) | (incoming << 7);
        self.r
            .f
            .update(update_zero && result == 0, false, false, carry);
        result
    }

    fn shift_left(&mut self, value: u8) -> u8 {
        let carry = value & 0b1000_0000 != 0;
        let result = value << 1;
        self.r.f.update(result == 0, false, false, carry);
        result
    }

    /// Shift right, arithmetic (bit 7 kept) or logical (bit 7 cleared).
    fn shift_right(&mut self, value: u8, arithmetic: bool) -> u8 {
        let carry = value & 0b0000_0001 != 0;
        let result = match arithmetic {
            true => (value >> 1) | (value & 0b1000_0000),
            false => value >> 1,
        };
        self.r.f.update(result == 0, false, false, carry);
        result
    }

    fn swap_nibbles(&mut self, value: u8) -> u8 {
        let result = value.rotate_right(4);
        self.r.f.update(result == 0, false, false, false);
        result
    }
}
