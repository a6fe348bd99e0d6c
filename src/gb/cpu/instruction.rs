use std::fmt;

/// Operation selected by an opcode.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Mnemonic {
    Nop,
    Ld,
    Ldh,
    Inc,
    Dec,
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
    Jp,
    Jr,
    Call,
    Ret,
    Reti,
    Push,
    Pop,
    Rst,
    Halt,
    Stop,
    Di,
    Ei,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Rlca,
    Rrca,
    Rla,
    Rra,
    /// Prefix byte, the following byte selects an entry in the CB table.
    Cb,
    /// Unmapped opcode, executing it aborts the run.
    Err,
    // CB-prefixed operations
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
    Bit,
    Res,
    Set,
}

/// Operand fetch pattern of an instruction. The suffix tells how many bytes
/// follow the opcode: `D8`/`A8` one byte, `D16`/`A16` two bytes
/// (little-endian), everything else none.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AddrMode {
    /// No operands.
    Imp,
    /// Single register operand (reg1).
    R,
    /// Register to register (reg1 <- reg2).
    RR,
    /// Register from memory pointed to by reg2.
    RMr,
    /// Memory pointed to by reg1 from reg2.
    MrR,
    /// Memory pointed to by reg1.
    Mr,
    /// 8-bit immediate.
    D8,
    /// Register from 8-bit immediate.
    RD8,
    /// Memory pointed to by reg1 from 8-bit immediate.
    MrD8,
    /// Register from 16-bit immediate.
    RD16,
    /// 16-bit immediate target (JP/CALL).
    D16,
    /// Memory at 16-bit immediate address from register.
    A16R,
    /// Register from memory at 16-bit immediate address.
    RA16,
    /// High memory (0xFF00 + a8) from register.
    A8R,
    /// Register from high memory (0xFF00 + a8).
    RA8,
    /// Register from memory at HL, HL incremented afterwards.
    RHli,
    /// Register from memory at HL, HL decremented afterwards.
    RHld,
    /// Memory at HL from register, HL incremented afterwards.
    HliR,
    /// Memory at HL from register, HL decremented afterwards.
    HldR,
    /// HL from SP plus signed 8-bit immediate.
    HlSpr,
    /// Conditional with no operand bytes (RET cc).
    Cc,
    /// Conditional with an 8-bit offset (JR cc).
    CcD8,
    /// Conditional with a 16-bit address (JP cc / CALL cc).
    CcD16,
}

/// Register operand referenced by a descriptor.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Reg {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    AF,
    BC,
    DE,
    HL,
    SP,
}

impl Reg {
    /// Whether this operand names a 16-bit register pair.
    #[inline]
    pub const fn is_pair(self) -> bool {
        matches!(self, Reg::AF | Reg::BC | Reg::DE | Reg::HL | Reg::SP)
    }
}

/// Branch condition of a conditional jump, call or return.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
}

/// Immutable instruction descriptor. The two 256-entry tables below map
/// every opcode to one of these; the CPU fetches operand bytes according to
/// `mode` and executes according to `mnemonic`.
#[derive(Copy, Clone, Debug)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
    pub reg1: Option<Reg>,
    pub reg2: Option<Reg>,
    pub cond: Option<Condition>,
    /// RST target address or CB bit index.
    pub param: u8,
    /// Master cycles consumed (branch taken for conditionals).
    pub cycles: u8,
    /// Master cycles consumed when a conditional branch is not taken.
    pub alt_cycles: u8,
}

impl Instruction {
    /// Looks up the descriptor for a primary opcode.
    #[inline]
    pub fn decode(opcode: u8) -> &'static Instruction {
        &PRIMARY[opcode as usize]
    }

    /// Looks up the descriptor for a CB-prefixed opcode.
    #[inline]
    pub fn decode_prefixed(opcode: u8) -> &'static Instruction {
        &PREFIXED[opcode as usize]
    }

    /// Number of operand bytes following the opcode.
    pub const fn operand_len(&self) -> u16 {
        match self.mode {
            AddrMode::D8
            | AddrMode::RD8
            | AddrMode::MrD8
            | AddrMode::A8R
            | AddrMode::RA8
            | AddrMode::HlSpr
            | AddrMode::CcD8 => 1,
            AddrMode::RD16 | AddrMode::D16 | AddrMode::A16R | AddrMode::RA16 | AddrMode::CcD16 => 2,
            _ => 0,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.mnemonic)?;
        if let Some(cond) = self.cond {
            write!(f, " {cond:?}")?;
        }
        if let Some(reg) = self.reg1 {
            write!(f, " {reg:?}")?;
        }
        if let Some(reg) = self.reg2 {
            write!(f, ", {reg:?}")?;
        }
        Ok(())
    }
}

const N: Option<Reg> = None;

#[inline]
const fn r(reg: Reg) -> Option<Reg> {
    Some(reg)
}

/// Unconditional instruction.
const fn ins(
    mnemonic: Mnemonic,
    mode: AddrMode,
    reg1: Option<Reg>,
    reg2: Option<Reg>,
    cycles: u8,
) -> Instruction {
    Instruction {
        mnemonic,
        mode,
        reg1,
        reg2,
        cond: None,
        param: 0,
        cycles,
        alt_cycles: cycles,
    }
}

/// Conditional instruction with branch-taken and branch-not-taken timings.
const fn cnd(
    mnemonic: Mnemonic,
    mode: AddrMode,
    cond: Condition,
    cycles: u8,
    alt_cycles: u8,
) -> Instruction {
    Instruction {
        mnemonic,
        mode,
        reg1: None,
        reg2: None,
        cond: Some(cond),
        param: 0,
        cycles,
        alt_cycles,
    }
}

/// RST with its target vector.
const fn rst(target: u8) -> Instruction {
    Instruction {
        mnemonic: Mnemonic::Rst,
        mode: AddrMode::Imp,
        reg1: None,
        reg2: None,
        cond: None,
        param: target,
        cycles: 16,
        alt_cycles: 16,
    }
}

/// Unmapped opcode.
const fn err() -> Instruction {
    ins(Mnemonic::Err, AddrMode::Imp, N, N, 0)
}

/// The primary decode table. Indexed by opcode; cycle counts are master
/// cycles (4 per machine cycle).
#[rustfmt::skip]
pub static PRIMARY: [Instruction; 256] = {
    use AddrMode::*;
    use Condition::{Carry, NotCarry, NotZero, Zero};
    use Mnemonic::*;
    use Reg::*;
    [
        // 0x00
        ins(Nop, Imp, N, N, 4),
        ins(Ld, RD16, r(BC), N, 12),
        ins(Ld, MrR, r(BC), r(A), 8),
        ins(Inc, R, r(BC), N, 8),
        ins(Inc, R, r(B), N, 4),
        ins(Dec, R, r(B), N, 4),
        ins(Ld, RD8, r(B), N, 8),
        ins(Rlca, Imp, N, N, 4),
        ins(Ld, A16R, N, r(SP), 20),
        ins(Add, RR, r(HL), r(BC), 8),
        ins(Ld, RMr, r(A), r(BC), 8),
        ins(Dec, R, r(BC), N, 8),
        ins(Inc, R, r(C), N, 4),
        ins(Dec, R, r(C), N, 4),
        ins(Ld, RD8, r(C), N, 8),
        ins(Rrca, Imp, N, N, 4),
        // 0x10
        ins(Stop, D8, N, N, 4),
        ins(Ld, RD16, r(DE), N, 12),
        ins(Ld, MrR, r(DE), r(A), 8),
        ins(Inc, R, r(DE), N, 8),
        ins(Inc, R, r(D), N, 4),
        ins(Dec, R, r(D), N, 4),
        ins(Ld, RD8, r(D), N, 8),
        ins(Rla, Imp, N, N, 4),
        ins(Jr, D8, N, N, 12),
        ins(Add, RR, r(HL), r(DE), 8),
        ins(Ld, RMr, r(A), r(DE), 8),
        ins(Dec, R, r(DE), N, 8),
        ins(Inc, R, r(E), N, 4),
        ins(Dec, R, r(E), N, 4),
        ins(Ld, RD8, r(E), N, 8),
        ins(Rra, Imp, N, N, 4),
        // 0x20
        cnd(Jr, CcD8, NotZero, 12, 8),
        ins(Ld, RD16, r(HL), N, 12),
        ins(Ld, HliR, r(HL), r(A), 8),
        ins(Inc, R, r(HL), N, 8),
        ins(Inc, R, r(H), N, 4),
        ins(Dec, R, r(H), N, 4),
        ins(Ld, RD8, r(H), N, 8),
        ins(Daa, Imp, N, N, 4),
        cnd(Jr, CcD8, Zero, 12, 8),
        ins(Add, RR, r(HL), r(HL), 8),
        ins(Ld, RHli, r(A), r(HL), 8),
        ins(Dec, R, r(HL), N, 8),
        ins(Inc, R, r(L), N, 4),
        ins(Dec, R, r(L), N, 4),
        ins(Ld, RD8, r(L), N, 8),
        ins(Cpl, Imp, N, N, 4),
        // 0x30
        cnd(Jr, CcD8, NotCarry, 12, 8),
        ins(Ld, RD16, r(SP), N, 12),
        ins(Ld, HldR, r(HL), r(A), 8),
        ins(Inc, R, r(SP), N, 8),
        ins(Inc, Mr, r(HL), N, 12),
        ins(Dec, Mr, r(HL), N, 12),
        ins(Ld, MrD8, r(HL), N, 12),
        ins(Scf, Imp, N, N, 4),
        cnd(Jr, CcD8, Carry, 12, 8),
        ins(Add, RR, r(HL), r(SP), 8),
        ins(Ld, RHld, r(A), r(HL), 8),
        ins(Dec, R, r(SP), N, 8),
        ins(Inc, R, r(A), N, 4),
        ins(Dec, R, r(A), N, 4),
        ins(Ld, RD8, r(A), N, 8),
        ins(Ccf, Imp, N, N, 4),
        // 0x40
        ins(Ld, RR, r(B), r(B), 4),
        ins(Ld, RR, r(B), r(C), 4),
        ins(Ld, RR, r(B), r(D), 4),
        ins(Ld, RR, r(B), r(E), 4),
        ins(Ld, RR, r(B), r(H), 4),
        ins(Ld, RR, r(B), r(L), 4),
        ins(Ld, RMr, r(B), r(HL), 8),
        ins(Ld, RR, r(B), r(A), 4),
        ins(Ld, RR, r(C), r(B), 4),
        ins(Ld, RR, r(C), r(C), 4),
        ins(Ld, RR, r(C), r(D), 4),
        ins(Ld, RR, r(C), r(E), 4),
        ins(Ld, RR, r(C), r(H), 4),
        ins(Ld, RR, r(C), r(L), 4),
        ins(Ld, RMr, r(C), r(HL), 8),
        ins(Ld, RR, r(C), r(A), 4),
        // 0x50
        ins(Ld, RR, r(D), r(B), 4),
        ins(Ld, RR, r(D), r(C), 4),
        ins(Ld, RR, r(D), r(D), 4),
        ins(Ld, RR, r(D), r(E), 4),
        ins(Ld, RR, r(D), r(H), 4),
        ins(Ld, RR, r(D), r(L), 4),
        ins(Ld, RMr, r(D), r(HL), 8),
        ins(Ld, RR, r(D), r(A), 4),
        ins(Ld, RR, r(E), r(B), 4),
        ins(Ld, RR, r(E), r(C), 4),
        ins(Ld, RR, r(E), r(D), 4),
        ins(Ld, RR, r(E), r(E), 4),
        ins(Ld, RR, r(E), r(H), 4),
        ins(Ld, RR, r(E), r(L), 4),
        ins(Ld, RMr, r(E), r(HL), 8),
        ins(Ld, RR, r(E), r(A), 4),
        // 0x60
        ins(Ld, RR, r(H), r(B), 4),
        ins(Ld, RR, r(H), r(C), 4),
        ins(Ld, RR, r(H), r(D), 4),
        ins(Ld, RR, r(H), r(E), 4),
        ins(Ld, RR, r(H), r(H), 4),
        ins(Ld, RR, r(H), r(L), 4),
        ins(Ld, RMr, r(H), r(HL), 8),
        ins(Ld, RR, r(H), r(A), 4),
        ins(Ld, RR, r(L), r(B), 4),
        ins(Ld, RR, r(L), r(C), 4),
        ins(Ld, RR, r(L), r(D), 4),
        ins(Ld, RR, r(L), r(E), 4),
        ins(Ld, RR, r(L), r(H), 4),
        ins(Ld, RR, r(L), r(L), 4),
        ins(Ld, RMr, r(L), r(HL), 8),
        ins(Ld, RR, r(L), r(A), 4),
        // 0x70
        ins(Ld, MrR, r(HL), r(B), 8),
        ins(Ld, MrR, r(HL), r(C), 8),
        ins(Ld, MrR, r(HL), r(D), 8),
        ins(Ld, MrR, r(HL), r(E), 8),
        ins(Ld, MrR, r(HL), r(H), 8),
        ins(Ld, MrR, r(HL), r(L), 8),
        ins(Halt, Imp, N, N, 4),
        ins(Ld, MrR, r(HL), r(A), 8),
        ins(Ld, RR, r(A), r(B), 4),
        ins(Ld, RR, r(A), r(C), 4),
        ins(Ld, RR, r(A), r(D), 4),
        ins(Ld, RR, r(A), r(E), 4),
        ins(Ld, RR, r(A), r(H), 4),
        ins(Ld, RR, r(A), r(L), 4),
        ins(Ld, RMr, r(A), r(HL), 8),
        ins(Ld, RR, r(A), r(A), 4),
        // 0x80
        ins(Add, RR, r(A), r(B), 4),
        ins(Add, RR, r(A), r(C), 4),
        ins(Add, RR, r(A), r(D), 4),
        ins(Add, RR, r(A), r(E), 4),
        ins(Add, RR, r(A), r(H), 4),
        ins(Add, RR, r(A), r(L), 4),
        ins(Add, RMr, r(A), r(HL), 8),
        ins(Add, RR, r(A), r(A), 4),
        ins(Adc, RR, r(A), r(B), 4),
        ins(Adc, RR, r(A), r(C), 4),
        ins(Adc, RR, r(A), r(D), 4),
        ins(Adc, RR, r(A), r(E), 4),
        ins(Adc, RR, r(A), r(H), 4),
        ins(Adc, RR, r(A), r(L), 4),
        ins(Adc, RMr, r(A), r(HL), 8),
        ins(Adc, RR, r(A), r(A), 4),
        // 0x90
        ins(Sub, RR, r(A), r(B), 4),
        ins(Sub, RR, r(A), r(C), 4),
        ins(Sub, RR, r(A), r(D), 4),
        ins(Sub, RR, r(A), r(E), 4),
        ins(Sub, RR, r(A), r(H), 4),
        ins(Sub, RR, r(A), r(L), 4),
        ins(Sub, RMr, r(A), r(HL), 8),
        ins(Sub, RR, r(A), r(A), 4),
        ins(Sbc, RR, r(A), r(B), 4),
        ins(Sbc, RR, r(A), r(C), 4),
        ins(Sbc, RR, r(A), r(D), 4),
        ins(Sbc, RR, r(A), r(E), 4),
        ins(Sbc, RR, r(A), r(H), 4),
        ins(Sbc, RR, r(A), r(L), 4),
        ins(Sbc, RMr, r(A), r(HL), 8),
        ins(Sbc, RR, r(A), r(A), 4),
        // 0xA0
        ins(And, RR, r(A), r(B), 4),
        ins(And, RR, r(A), r(C), 4),
        ins(And, RR, r(A), r(D), 4),
        ins(And, RR, r(A), r(E), 4),
        ins(And, RR, r(A), r(H), 4),
        ins(And, RR, r(A), r(L), 4),
        ins(And, RMr, r(A), r(HL), 8),
        ins(And, RR, r(A), r(A), 4),
        ins(Xor, RR, r(A), r(B), 4),
        ins(Xor, RR, r(A), r(C), 4),
        ins(Xor, RR, r(A), r(D), 4),
        ins(Xor, RR, r(A), r(E), 4),
        ins(Xor, RR, r(A), r(H), 4),
        ins(Xor, RR, r(A), r(L), 4),
        ins(Xor, RMr, r(A), r(HL), 8),
        ins(Xor, RR, r(A), r(A), 4),
        // 0xB0
        ins(Or, RR, r(A), r(B), 4),
        ins(Or, RR, r(A), r(C), 4),
        ins(Or, RR, r(A), r(D), 4),
        ins(Or, RR, r(A), r(E), 4),
        ins(Or, RR, r(A), r(H), 4),
        ins(Or, RR, r(A), r(L), 4),
        ins(Or, RMr, r(A), r(HL), 8),
        ins(Or, RR, r(A), r(A), 4),
        ins(Cp, RR, r(A), r(B), 4),
        ins(Cp, RR, r(A), r(C), 4),
        ins(Cp, RR, r(A), r(D), 4),
        ins(Cp, RR, r(A), r(E), 4),
        ins(Cp, RR, r(A), r(H), 4),
        ins(Cp, RR, r(A), r(L), 4),
        ins(Cp, RMr, r(A), r(HL), 8),
        ins(Cp, RR, r(A), r(A), 4),
        // 0xC0
        cnd(Ret, Cc, NotZero, 20, 8),
        ins(Pop, R, r(BC), N, 12),
        cnd(Jp, CcD16, NotZero, 16, 12),
        ins(Jp, D16, N, N, 16),
        cnd(Call, CcD16, NotZero, 24, 12),
        ins(Push, R, r(BC), N, 16),
        ins(Add, RD8, r(A), N, 8),
        rst(0x00),
        cnd(Ret, Cc, Zero, 20, 8),
        ins(Ret, Imp, N, N, 16),
        cnd(Jp, CcD16, Zero, 16, 12),
        ins(Cb, D8, N, N, 4),
        cnd(Call, CcD16, Zero, 24, 12),
        ins(Call, D16, N, N, 24),
        ins(Adc, RD8, r(A), N, 8),
        rst(0x08),
        // 0xD0
        cnd(Ret, Cc, NotCarry, 20, 8),
        ins(Pop, R, r(DE), N, 12),
        cnd(Jp, CcD16, NotCarry, 16, 12),
        err(),
        cnd(Call, CcD16, NotCarry, 24, 12),
        ins(Push, R, r(DE), N, 16),
        ins(Sub, RD8, r(A), N, 8),
        rst(0x10),
        cnd(Ret, Cc, Carry, 20, 8),
        ins(Reti, Imp, N, N, 16),
        cnd(Jp, CcD16, Carry, 16, 12),
        err(),
        cnd(Call, CcD16, Carry, 24, 12),
        err(),
        ins(Sbc, RD8, r(A), N, 8),
        rst(0x18),
        // 0xE0
        ins(Ldh, A8R, N, r(A), 12),
        ins(Pop, R, r(HL), N, 12),
        ins(Ldh, MrR, r(C), r(A), 8),
        err(),
        err(),
        ins(Push, R, r(HL), N, 16),
        ins(And, RD8, r(A), N, 8),
        rst(0x20),
        ins(Add, RD8, r(SP), N, 16),
        ins(Jp, R, r(HL), N, 4),
        ins(Ld, A16R, N, r(A), 16),
        err(),
        err(),
        err(),
        ins(Xor, RD8, r(A), N, 8),
        rst(0x28),
        // 0xF0
        ins(Ldh, RA8, r(A), N, 12),
        ins(Pop, R, r(AF), N, 12),
        ins(Ldh, RMr, r(A), r(C), 8),
        ins(Di, Imp, N, N, 4),
        err(),
        ins(Push, R, r(AF), N, 16),
        ins(Or, RD8, r(A), N, 8),
        rst(0x30),
        ins(Ld, HlSpr, r(HL), r(SP), 12),
        ins(Ld, RR, r(SP), r(HL), 8),
        ins(Ld, RA16, r(A), N, 16),
        ins(Ei, Imp, N, N, 4),
        err(),
        err(),
        ins(Cp, RD8, r(A), N, 8),
        rst(0x38),
    ]
};

/// The CB-prefixed decode table. Its layout is a strict grid: the high five
/// bits select the operation (and bit index), the low three bits the
/// operand, so the table is built rather than spelled out.
pub static PREFIXED: [Instruction; 256] = build_prefixed();

const CB_OPERANDS: [Reg; 8] = [
    Reg::B,
    Reg::C,
    Reg::D,
    Reg::E,
    Reg::H,
    Reg::L,
    Reg::HL,
    Reg::A,
];

const fn build_prefixed() -> [Instruction; 256] {
    let mut table = [err(); 256];
    let mut opcode = 0;
    while opcode < 256 {
        let operand = CB_OPERANDS[opcode & 0x07];
        let on_memory = opcode & 0x07 == 0x06;
        let (mnemonic, param) = match opcode >> 3 {
            0x00 => (Mnemonic::Rlc, 0),
            0x01 => (Mnemonic::Rrc, 0),
            0x02 => (Mnemonic::Rl, 0),
            0x03 => (Mnemonic::Rr, 0),
            0x04 => (Mnemonic::Sla, 0),
            0x05 => (Mnemonic::Sra, 0),
            0x06 => (Mnemonic::Swap, 0),
            0x07 => (Mnemonic::Srl, 0),
            row @ 0x08..=0x0F => (Mnemonic::Bit, (row - 0x08) as u8),
            row @ 0x10..=0x17 => (Mnemonic::Res, (row - 0x10) as u8),
            row => (Mnemonic::Set, (row - 0x18) as u8),
        };
        // Register operands take 8 cycles, memory operands 16, except BIT
        // which never writes back.
        let cycles = match (on_memory, mnemonic) {
            (false, _) => 8,
            (true, Mnemonic::Bit) => 12,
            (true, _) => 16,
        };
        table[opcode] = Instruction {
            mnemonic,
            mode: if on_memory { AddrMode::Mr } else { AddrMode::R },
            reg1: Some(operand),
            reg2: None,
            cond: None,
            param,
            cycles,
            alt_cycles: cycles,
        };
        opcode += 1;
    }
    table
}
