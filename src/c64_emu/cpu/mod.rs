//! MOS 6510 instruction-level emulation for tune playback.
//!
//! One call to [`Cpu::tick`] executes one whole instruction against the
//! shared [`Memory`] and records its cycle cost. There is no bus, no
//! interrupt line and no decimal mode: a player routine only needs the
//! instructions it actually runs, and the scheduler drives timing from the
//! per-instruction cycle counts.
//!
//! Besides the registers the CPU exposes three side-channel values the
//! scheduler reads after each tick: the effective address, the address of
//! the last store (0 if the instruction stored nothing) and the cycle cost.

pub mod decode;

use super::memory::Memory;
use decode::{Kind, Mode, Op, Target, OPCODES};

// ── Status flag bits ──────────────────────────────────────────

pub const FLAG_C: u8 = 0x01;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_D: u8 = 0x08;
pub const FLAG_B: u8 = 0x10;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_N: u8 = 0x80;

const STACK_PAGE: u16 = 0x0100;
const IRQ_VECTOR: u16 = 0xFFFE;

// ── Tick result ───────────────────────────────────────────────

/// Outcome of one [`Cpu::tick`].
///
/// The two sentinels report a return instruction executed with an empty
/// stack: the routine the scheduler called has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStatus {
    Normal,
    RtiEmptyStack,
    RtsEmptyStack,
}

impl TickStatus {
    /// Numeric form: 0, $FE or $FF.
    pub fn code(self) -> u8 {
        match self {
            TickStatus::Normal => 0x00,
            TickStatus::RtiEmptyStack => 0xFE,
            TickStatus::RtsEmptyStack => 0xFF,
        }
    }

    #[inline]
    pub fn is_return(self) -> bool {
        self != TickStatus::Normal
    }
}

// ── Registers ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    /// Raw N V - B D I Z C byte.
    pub status: u8,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            pc: 0,
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFF,
            status: 0,
        }
    }
}

/// Named view over a status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    pub fn carry(self) -> bool {
        self.0 & FLAG_C != 0
    }
    pub fn zero(self) -> bool {
        self.0 & FLAG_Z != 0
    }
    pub fn interrupt_disable(self) -> bool {
        self.0 & FLAG_I != 0
    }
    pub fn decimal(self) -> bool {
        self.0 & FLAG_D != 0
    }
    pub fn overflow(self) -> bool {
        self.0 & FLAG_V != 0
    }
    pub fn negative(self) -> bool {
        self.0 & FLAG_N != 0
    }
}

// ── CPU ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Cpu {
    regs: Registers,
    ir: u8,
    addr: u16,
    store_addr: u16,
    cycles: u8,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            ir: 0,
            addr: 0,
            store_addr: 0,
            cycles: 0,
        }
    }

    /// Point the CPU at `pc` with `a` in the accumulator.
    /// X, Y and the status byte are cleared and the stack emptied.
    pub fn init(&mut self, pc: u16, a: u8) {
        self.regs.pc = pc;
        self.regs.a = a;
        self.regs.x = 0;
        self.regs.y = 0;
        self.regs.status = 0;
        self.regs.sp = 0xFF;
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn status_flags(&self) -> Status {
        Status(self.regs.status)
    }

    #[inline]
    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    #[inline]
    pub fn sp(&self) -> u8 {
        self.regs.sp
    }

    #[inline]
    pub fn set_sp(&mut self, sp: u8) {
        self.regs.sp = sp;
    }

    /// Opcode of the last instruction.
    pub fn ir(&self) -> u8 {
        self.ir
    }

    /// Effective address of the last instruction.
    #[inline]
    pub fn addr(&self) -> u16 {
        self.addr
    }

    /// Target of the last store instruction, 0 if it stored nothing.
    #[inline]
    pub fn store_addr(&self) -> u16 {
        self.store_addr
    }

    /// Cycle cost of the last instruction.
    #[inline]
    pub fn cycles(&self) -> u8 {
        self.cycles
    }

    /// Execute one instruction.
    pub fn tick(&mut self, mem: &mut Memory) -> TickStatus {
        self.ir = mem.read(self.regs.pc);
        self.store_addr = 0;

        let op = OPCODES[self.ir as usize];
        self.cycles = op.mode.cycles();
        self.resolve(op.mode, mem);

        let status = self.execute(op, mem);
        if status.is_return() {
            return status;
        }
        if op.is_rmw() {
            self.cycles += 2;
        }

        self.regs.pc = self.regs.pc.wrapping_add(1);
        TickStatus::Normal
    }

    // ── Addressing ────────────────────────────────────────────

    /// Next program byte; PC is left on it.
    #[inline]
    fn fetch(&mut self, mem: &Memory) -> u8 {
        self.regs.pc = self.regs.pc.wrapping_add(1);
        mem.read(self.regs.pc)
    }

    #[inline]
    fn fetch_word(&mut self, mem: &Memory) -> u16 {
        let lo = self.fetch(mem) as u16;
        let hi = self.fetch(mem) as u16;
        lo | (hi << 8)
    }

    fn resolve(&mut self, mode: Mode, mem: &Memory) {
        let x = self.regs.x as u16;
        let y = self.regs.y as u16;
        self.addr = match mode {
            Mode::Unchanged | Mode::Relative => return,
            Mode::Immediate => {
                self.regs.pc = self.regs.pc.wrapping_add(1);
                self.regs.pc
            }
            Mode::ZeroPage => self.fetch(mem) as u16,
            // Indexed zero page reaches into page 1 instead of wrapping.
            Mode::ZeroPageX => self.fetch(mem) as u16 + x,
            Mode::ZeroPageY => self.fetch(mem) as u16 + y,
            Mode::Absolute => self.fetch_word(mem),
            Mode::AbsoluteX => self.fetch_word(mem).wrapping_add(x),
            Mode::AbsoluteY => self.fetch_word(mem).wrapping_add(y),
            Mode::IndexedIndirect => {
                let ptr = self.fetch(mem) as u16 + x;
                mem.read(ptr) as u16 | ((mem.read(ptr + 1) as u16) << 8)
            }
            Mode::IndirectIndexed => {
                let ptr = self.fetch(mem) as u16;
                let base = mem.read(ptr) as u16 | ((mem.read(ptr + 1) as u16) << 8);
                base.wrapping_add(y)
            }
        };
    }

    // ── Flag helpers ──────────────────────────────────────────

    #[inline]
    fn set_nz(&mut self, value: u8) {
        self.regs.status &= !(FLAG_N | FLAG_Z);
        self.regs.status |= (value & FLAG_N) | (((value == 0) as u8) << 1);
    }

    fn compare(&mut self, reg: u8, m: u8) {
        let t = reg as i32 - m as i32;
        self.regs.status &= !(FLAG_N | FLAG_Z | FLAG_C);
        self.regs.status |=
            (((t & 0xFF) == 0) as u8) << 1 | (t & 0x80) as u8 | (t >= 0) as u8;
    }

    fn adc(&mut self, m: u8) {
        let t = self.regs.a;
        let sum = t as u16 + m as u16 + (self.regs.status & FLAG_C) as u16;
        let a = sum as u8;
        self.regs.status &= FLAG_B | FLAG_I;
        self.regs.status |= (sum & 0x80) as u8 | (sum > 0xFF) as u8;
        self.regs.status |= ((a == 0) as u8) << 1;
        if (t ^ m) & 0x80 == 0 && (t ^ a) & 0x80 != 0 {
            self.regs.status |= FLAG_V;
        }
        self.regs.a = a;
    }

    fn sbc(&mut self, m: u8) {
        let t = self.regs.a;
        let borrow = 1 - (self.regs.status & FLAG_C) as i32;
        let diff = t as i32 - (m as i32 + borrow);
        let a = (diff & 0xFF) as u8;
        self.regs.status &= FLAG_B | FLAG_I;
        self.regs.status |= (diff & 0x80) as u8 | (diff >= 0) as u8;
        self.regs.status |= ((a == 0) as u8) << 1;
        if (t ^ m) & 0x80 != 0 && (t ^ a) & 0x80 != 0 {
            self.regs.status |= FLAG_V;
        }
        self.regs.a = a;
    }

    /// ASL/ROL core; V is cleared along with N, Z and C.
    fn shift_left(&mut self, value: u8, carry_in: u8) -> u8 {
        let r = ((value as u16) << 1) | carry_in as u16;
        let out = r as u8;
        self.regs.status &= 0x3C;
        self.regs.status |= (r & 0x80) as u8 | (r > 0xFF) as u8 | (((out == 0) as u8) << 1);
        out
    }

    /// LSR/ROR core; V is cleared along with N, Z and C.
    fn shift_right(&mut self, value: u8, carry_in: u8) -> u8 {
        let out = (value >> 1) | (carry_in << 7);
        self.regs.status &= 0x3C;
        self.regs.status |= (out & 0x80) | (value & 0x01) | (((out == 0) as u8) << 1);
        out
    }

    fn shift(&mut self, target: Target, mem: &mut Memory, f: fn(&mut Self, u8) -> u8) {
        match target {
            Target::Accumulator => {
                let a = self.regs.a;
                self.regs.a = f(self, a);
            }
            Target::Memory => {
                let m = mem.read(self.addr);
                let r = f(self, m);
                mem.write(self.addr, r);
            }
        }
    }

    // ── Stack ─────────────────────────────────────────────────

    #[inline]
    fn push(&mut self, mem: &mut Memory, value: u8) {
        mem.write(STACK_PAGE + self.regs.sp as u16, value);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
    }

    #[inline]
    fn pull(&mut self, mem: &Memory) -> u8 {
        self.regs.sp = self.regs.sp.wrapping_add(1);
        mem.read(STACK_PAGE + self.regs.sp as u16)
    }

    /// Pull high then low byte; the target is stored minus one since the
    /// common tail of `tick` advances PC.
    fn pull_return(&mut self, mem: &Memory) {
        let hi = self.pull(mem) as u16;
        let lo = self.pull(mem) as u16;
        self.regs.pc = (lo | (hi << 8)).wrapping_sub(1);
    }

    // ── Execute ───────────────────────────────────────────────

    fn execute(&mut self, op: Op, mem: &mut Memory) -> TickStatus {
        let addr = self.addr;
        match op.kind {
            Kind::Ora => {
                self.regs.a |= mem.read(addr);
                self.set_nz(self.regs.a);
            }
            Kind::And => {
                self.regs.a &= mem.read(addr);
                self.set_nz(self.regs.a);
            }
            Kind::Eor => {
                self.regs.a ^= mem.read(addr);
                self.set_nz(self.regs.a);
            }
            Kind::Adc => self.adc(mem.read(addr)),
            Kind::Sbc => self.sbc(mem.read(addr)),
            Kind::Cmp => self.compare(self.regs.a, mem.read(addr)),
            Kind::Lda { also_x } => {
                self.regs.a = mem.read(addr);
                self.set_nz(self.regs.a);
                if also_x {
                    self.regs.x = self.regs.a;
                }
            }
            Kind::Sta { and_x } => {
                let mask = if and_x { self.regs.x } else { 0xFF };
                mem.write(addr, self.regs.a & mask);
                self.store_addr = addr;
            }

            Kind::Asl(t) => self.shift(t, mem, |cpu, v| cpu.shift_left(v, 0)),
            Kind::Rol(t) => self.shift(t, mem, |cpu, v| {
                let c = cpu.regs.status & FLAG_C;
                cpu.shift_left(v, c)
            }),
            Kind::Lsr(t) => self.shift(t, mem, |cpu, v| cpu.shift_right(v, 0)),
            Kind::Ror(t) => self.shift(t, mem, |cpu, v| {
                let c = cpu.regs.status & FLAG_C;
                cpu.shift_right(v, c)
            }),
            Kind::Dec => {
                let v = mem.read(addr).wrapping_sub(1);
                mem.write(addr, v);
                self.set_nz(v);
            }
            Kind::Inc => {
                let v = mem.read(addr).wrapping_add(1);
                mem.write(addr, v);
                self.set_nz(v);
            }
            Kind::Dex => {
                self.regs.x = self.regs.x.wrapping_sub(1);
                self.set_nz(self.regs.x);
            }
            Kind::Ldx => {
                self.regs.x = mem.read(addr);
                self.set_nz(self.regs.x);
            }
            Kind::Tax => {
                self.regs.x = self.regs.a;
                self.set_nz(self.regs.x);
            }
            Kind::Tsx => self.regs.x = self.regs.sp,
            Kind::Stx => {
                mem.write(addr, self.regs.x);
                self.store_addr = addr;
            }
            Kind::Txa => {
                self.regs.a = self.regs.x;
                self.set_nz(self.regs.a);
            }
            Kind::Txs => self.regs.sp = self.regs.x,
            Kind::Nop => {}

            Kind::Php => {
                self.push(mem, self.regs.status);
                self.cycles = 3;
            }
            Kind::Plp => {
                self.regs.status = self.pull(mem);
                self.cycles = 4;
            }
            Kind::Pha => {
                self.push(mem, self.regs.a);
                self.cycles = 3;
            }
            Kind::Pla => {
                self.regs.a = self.pull(mem);
                self.set_nz(self.regs.a);
                self.cycles = 4;
            }
            Kind::Dey => {
                self.regs.y = self.regs.y.wrapping_sub(1);
                self.set_nz(self.regs.y);
            }
            Kind::Iny => {
                self.regs.y = self.regs.y.wrapping_add(1);
                self.set_nz(self.regs.y);
            }
            Kind::Inx => {
                self.regs.x = self.regs.x.wrapping_add(1);
                self.set_nz(self.regs.x);
            }
            Kind::Tya => {
                self.regs.a = self.regs.y;
                self.set_nz(self.regs.a);
            }
            Kind::Tay => {
                self.regs.y = self.regs.a;
                self.set_nz(self.regs.y);
            }
            Kind::Flag { mask, set } => {
                if set {
                    self.regs.status |= mask;
                } else {
                    self.regs.status &= !mask;
                }
            }

            Kind::Branch { flag, when_set } => {
                let offset = self.fetch(mem) as i8;
                if (self.regs.status & flag != 0) == when_set {
                    self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
                    self.cycles = 3;
                }
            }
            Kind::Brk => {
                let pc = self.regs.pc;
                self.push(mem, pc as u8);
                self.push(mem, (pc >> 8) as u8);
                self.push(mem, self.regs.status);
                self.regs.pc = mem.read_word(IRQ_VECTOR).wrapping_sub(1);
                self.cycles = 7;
            }
            Kind::Jsr => {
                // Pushed low byte first; pull_return reads them back high first.
                let ret = self.regs.pc.wrapping_add(2);
                self.push(mem, ret as u8);
                self.push(mem, (ret >> 8) as u8);
                self.regs.pc = mem.read_word(addr).wrapping_sub(1);
                self.cycles = 6;
            }
            Kind::Rti => {
                if self.regs.sp == 0xFF {
                    return TickStatus::RtiEmptyStack;
                }
                self.regs.status = self.pull(mem);
                self.pull_return(mem);
                self.cycles = 6;
            }
            Kind::Rts => {
                if self.regs.sp == 0xFF {
                    return TickStatus::RtsEmptyStack;
                }
                self.pull_return(mem);
                self.cycles = 6;
            }
            Kind::Jmp => {
                self.regs.pc = addr.wrapping_sub(1);
                self.cycles = 3;
            }
            Kind::JmpIndirect => {
                self.regs.pc = mem.read_word(addr).wrapping_sub(1);
                self.cycles = 5;
            }
            Kind::Bit => {
                let m = mem.read(addr);
                self.regs.status &= !(FLAG_N | FLAG_V | FLAG_Z);
                self.regs.status |= (m & 0xC0) | ((((self.regs.a & m) == 0) as u8) << 1);
            }
            Kind::Ldy => {
                self.regs.y = mem.read(addr);
                self.set_nz(self.regs.y);
            }
            Kind::Sty => {
                mem.write(addr, self.regs.y);
                self.store_addr = addr;
            }
            Kind::Cpy => self.compare(self.regs.y, mem.read(addr)),
            Kind::Cpx => self.compare(self.regs.x, mem.read(addr)),
        }
        TickStatus::Normal
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
