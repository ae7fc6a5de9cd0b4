//! The processor and its instruction interpreter.
//!
//! [`Machine`] bundles the architectural state (program counter,
//! accumulators, flags, switch register), main memory, the installed device
//! table, and the interrupt arbiter. [`Machine::step`] fetches, decodes, and
//! executes exactly one instruction, then services a pending interrupt if
//! interrupts are on.
//!
//! Instruction words decode from the top bits:
//! - bit 0 set: arithmetic/logic (ALC), a one-word ALU+shift+skip bundle;
//! - bits 1,2 = `11`: an I/O transfer;
//! - anything else: a memory reference (JMP/JSR/ISZ/DSZ/LDA/STA).

use std::sync::Arc;

use super::device::{codes, priorities, rtc, stream, DeviceSet, IoFlag, IoOp, IoTest, Media};
use super::interrupt::IntrArbiter;
use super::mem::{Memory, ADDR_MASK, MEM_WORDS};
use super::{NovaErr, NovaFlags};

/// Architectural processor state.
#[derive(Debug, Default)]
pub(crate) struct CpuState {
    /// Program counter, always kept inside the 15-bit address space.
    pub(crate) pc: u16,
    /// The four accumulators.
    pub(crate) ac: [u16; 4],
    /// Carry flag.
    pub(crate) carry: bool,
    /// Interrupt On flag.
    pub(crate) ion: bool,
    /// Set by an ION start pulse; promoted to `ion` at the top of the next
    /// instruction, giving the hardware's one-instruction enable delay.
    pub(crate) ion_pending: bool,
    /// Console switch register, read by READS.
    pub(crate) sr: u16,
}

/// What a retired instruction asks of the execution loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cycle {
    /// Keep fetching.
    Run,
    /// A HALT retired; drop to the stopped console state.
    Halt,
}

/// The whole machine: processor state, memory, devices, interrupt bitsets.
/// Owned and mutated exclusively by the console supervisor thread.
pub(crate) struct Machine {
    pub(crate) cpu: CpuState,
    pub(crate) mem: Memory,
    pub(crate) devices: DeviceSet,
    pub(crate) arbiter: Arc<IntrArbiter>,
}

impl Machine {
    /// Builds a machine with the standard peripherals installed and all
    /// controllers Idle.
    pub(crate) fn new(flags: &NovaFlags) -> Self {
        let arbiter = Arc::new(IntrArbiter::new());
        let mut devices = DeviceSet::new();

        let install = [
            stream::spawn_reader(codes::TTI, priorities::TTI, flags.tty_rate, arbiter.clone()),
            stream::spawn_writer(codes::TTO, priorities::TTO, flags.tty_rate, arbiter.clone()),
            stream::spawn_reader(codes::PTR, priorities::PTR, flags.ptr_rate, arbiter.clone()),
            stream::spawn_writer(codes::PTP, priorities::PTP, flags.ptp_rate, arbiter.clone()),
            rtc::spawn(codes::RTC, priorities::RTC, flags.line_freq, arbiter.clone()),
        ];
        for dev in install {
            arbiter.register(dev.code, dev.priority);
            devices.install(dev);
        }

        Self {
            cpu: CpuState::default(),
            mem: Memory::new(),
            devices,
            arbiter,
        }
    }

    /// Executes one instruction and, if interrupts are on, services one
    /// pending interrupt at the instruction boundary.
    pub(crate) fn step(&mut self) -> Result<Cycle, NovaErr> {
        if self.cpu.ion_pending {
            self.cpu.ion = true;
            self.cpu.ion_pending = false;
        }

        let ir = self.mem.read(self.cpu.pc);
        self.cpu.pc = (self.cpu.pc + 1) & ADDR_MASK;

        let cycle = if ir & 0o100000 != 0 {
            self.alc(ir);
            Cycle::Run
        } else if ir & 0o060000 == 0o060000 {
            self.io(ir)?
        } else {
            self.mem_ref(ir)?;
            Cycle::Run
        };

        if cycle == Cycle::Halt {
            return Ok(Cycle::Halt);
        }

        if self.cpu.ion && self.arbiter.pending_enabled() {
            self.cpu.ion = false;
            self.mem.write(0, self.cpu.pc);
            self.cpu.pc = self.indirect(1)?;
            log::debug!("interrupt taken, handler at {:05o}", self.cpu.pc);
        }

        Ok(Cycle::Run)
    }

    /// IORST: every controller to Idle, interrupts off, all request and mask
    /// bits cleared.
    pub(crate) fn io_reset(&mut self) {
        self.cpu.ion = false;
        self.cpu.ion_pending = false;
        self.devices.reset_all();
        self.arbiter.clear_all();
    }

    /// Binds host media to an installed device, checking direction.
    pub(crate) fn attach(&self, code: u16, media: Media) -> Result<(), NovaErr> {
        use super::device::MediaKind;

        let code = code & 0o77;
        let dev = self
            .devices
            .get(code)
            .ok_or(NovaErr::DeviceNotFound(code))?;
        match (dev.kind, &media) {
            (MediaKind::Input, Media::Reader(_)) | (MediaKind::Output, Media::Writer(_)) => {
                dev.attach(media);
                Ok(())
            }
            _ => Err(NovaErr::WrongMedia(code)),
        }
    }

    fn skip(&mut self) {
        self.cpu.pc = (self.cpu.pc + 1) & ADDR_MASK;
    }

    /// Arithmetic/logic class. The computation runs in a 17-bit register:
    /// bit 16 is seeded from the selected carry source, the operation may
    /// carry into it, the shift rotates through it, and its final value is
    /// the new carry candidate.
    fn alc(&mut self, ir: u16) {
        let mut alu: u32 = match (ir & 0o000060) >> 4 {
            0 => u32::from(self.cpu.carry) << 16,
            1 => 0,                               // Z
            2 => 1 << 16,                         // O
            _ => u32::from(!self.cpu.carry) << 16, // C
        };

        let acs = self.cpu.ac[usize::from((ir & 0o060000) >> 13)];
        let acd_ix = usize::from((ir & 0o014000) >> 11);
        let acd = self.cpu.ac[acd_ix];

        alu += match (ir & 0o003400) >> 8 {
            0 => u32::from(!acs),                        // COM
            1 => u32::from(!acs) + 1,                    // NEG
            2 => u32::from(acs),                         // MOV
            3 => u32::from(acs) + 1,                     // INC
            4 => u32::from(acd) + u32::from(!acs),       // ADC
            5 => u32::from(acd) + u32::from(!acs) + 1,   // SUB
            6 => u32::from(acd) + u32::from(acs),        // ADD
            _ => u32::from(acd & acs),                   // AND
        };

        let (carry, result) = match (ir & 0o000300) >> 6 {
            0 => ((alu >> 16) & 1 != 0, alu as u16),
            1 => (
                (alu >> 15) & 1 != 0,
                (((alu & 0o077777) << 1) | ((alu >> 16) & 1)) as u16,
            ), // L
            2 => (alu & 1 != 0, (alu >> 1) as u16), // R
            _ => ((alu >> 16) & 1 != 0, (alu as u16).swap_bytes()), // S
        };

        let take = match ir & 0o000007 {
            0 => false,
            1 => true,              // SKP
            2 => !carry,            // SZC
            3 => carry,             // SNC
            4 => result == 0,       // SZR
            5 => result != 0,       // SNR
            6 => !carry || result == 0, // SEZ
            _ => carry && result != 0,  // SBN
        };
        if take {
            self.skip();
        }

        if ir & 0o000010 == 0 {
            self.cpu.ac[acd_ix] = result;
            self.cpu.carry = carry;
        }
    }

    /// Memory-reference class: effective-address computation, the indirect
    /// chain, then the JMP/JSR/ISZ/DSZ or LDA/STA dispatch.
    fn mem_ref(&mut self, ir: u16) -> Result<(), NovaErr> {
        let disp = ir & 0o000377;
        let sext = i16::from(disp as u8 as i8) as u16;

        let mut addr = match (ir & 0o001400) >> 8 {
            0 => disp,                                               // page zero
            1 => self.cpu.pc.wrapping_sub(1).wrapping_add(sext),     // PC relative
            2 => self.cpu.ac[2].wrapping_add(sext),                  // AC2 relative
            _ => self.cpu.ac[3].wrapping_add(sext),                  // AC3 relative
        };

        if ir & 0o002000 != 0 {
            addr = self.indirect(addr)?;
        }

        match ir & 0o060000 {
            0 => match (ir & 0o014000) >> 11 {
                0 => self.cpu.pc = addr & ADDR_MASK, // JMP
                1 => {
                    // JSR
                    self.cpu.ac[3] = self.cpu.pc;
                    self.cpu.pc = addr & ADDR_MASK;
                }
                2 => {
                    // ISZ
                    let v = self.mem.read(addr).wrapping_add(1);
                    self.mem.write(addr, v);
                    if v == 0 {
                        self.skip();
                    }
                }
                _ => {
                    // DSZ
                    let v = self.mem.read(addr).wrapping_sub(1);
                    self.mem.write(addr, v);
                    if v == 0 {
                        self.skip();
                    }
                }
            },
            0o020000 => {
                let acx = usize::from((ir & 0o014000) >> 11);
                self.cpu.ac[acx] = self.mem.read(addr); // LDA
            }
            _ => {
                let acx = usize::from((ir & 0o014000) >> 11);
                self.mem.write(addr, self.cpu.ac[acx]); // STA
            }
        }

        Ok(())
    }

    /// Resolves an indirect chain starting by dereferencing `addr`.
    ///
    /// Each hop through 0o20..0o27 pre-increments the cell and through
    /// 0o30..0o37 pre-decrements it, exactly once; whether the chain
    /// continues is decided by the top bit of the word as fetched. The chain
    /// is capped at one hop per memory word so a pointer cycle cannot hang
    /// the processor.
    fn indirect(&mut self, mut addr: u16) -> Result<u16, NovaErr> {
        for _ in 0..MEM_WORDS {
            let cell = addr & ADDR_MASK;
            let mut next = self.mem.read(cell);
            let more = next & 0o100000 != 0;
            if (0o20..0o30).contains(&cell) {
                next = next.wrapping_add(1);
                self.mem.write(cell, next);
            } else if (0o30..0o40).contains(&cell) {
                next = next.wrapping_sub(1);
                self.mem.write(cell, next);
            }
            addr = next;
            if !more {
                return Ok(addr);
            }
        }
        log::error!("indirect chain exceeded {MEM_WORDS} hops");
        Err(NovaErr::IndirectLoop(addr & ADDR_MASK))
    }

    /// I/O transfer class, split by device code between the two processor
    /// pseudo-devices and the installed controllers.
    fn io(&mut self, ir: u16) -> Result<Cycle, NovaErr> {
        let ac = usize::from((ir & 0o014000) >> 11);
        let op = IoOp::from_bits((ir & 0o003400) >> 8);
        let fbits = (ir & 0o000300) >> 6;
        let code = ir & 0o000077;

        match code {
            codes::CPU => Ok(self.io_cpu(ac, op, fbits)),
            codes::MDV => {
                self.io_mdv(ac, op, fbits);
                Ok(Cycle::Run)
            }
            _ => {
                self.io_dev(ac, op, fbits, code);
                Ok(Cycle::Run)
            }
        }
    }

    /// Device 0o77: the processor as a pseudo-device. READS, INTA, MSKO,
    /// IORST, HALT, and the interrupt-flag skips.
    fn io_cpu(&mut self, ac: usize, op: IoOp, fbits: u16) -> Cycle {
        let mut halt = false;

        match op {
            IoOp::Nio | IoOp::Doa => {}
            IoOp::Dia => self.cpu.ac[ac] = self.cpu.sr, // READS
            IoOp::Dib => self.cpu.ac[ac] = self.arbiter.first_enabled(), // INTA
            IoOp::Dob => self.arbiter.recompute_disabled(self.cpu.ac[ac]), // MSKO
            IoOp::Dic => self.io_reset(),               // IORST
            IoOp::Doc => halt = true,                   // HALT
            IoOp::Skp => match fbits {
                0 => {
                    // BN: interrupts on
                    if self.cpu.ion {
                        self.skip();
                    }
                }
                1 => {
                    // BZ: interrupts off
                    if !self.cpu.ion {
                        self.skip();
                    }
                }
                2 => {} // DN never skips
                _ => self.skip(), // DZ always skips
            },
        }

        if op != IoOp::Skp {
            match IoFlag::from_bits(fbits) {
                IoFlag::Start => {
                    // The enable takes effect one instruction later.
                    if !self.cpu.ion {
                        self.cpu.ion_pending = true;
                    }
                }
                IoFlag::Clear => {
                    self.cpu.ion = false;
                    self.cpu.ion_pending = false;
                }
                IoFlag::Pulse | IoFlag::None => {}
            }
        }

        if halt {
            Cycle::Halt
        } else {
            Cycle::Run
        }
    }

    /// Device 0o01: the multiply/divide unit. The unit is never busy and
    /// never done, so BZ and DZ skip and BN and DN fall through.
    fn io_mdv(&mut self, ac: usize, op: IoOp, fbits: u16) {
        match op {
            IoOp::Doc if ac == 2 => match fbits {
                1 => {
                    // DIV: 32-bit dividend AC0:AC1 over AC2. An overflowing
                    // quotient (including divide by zero) just sets carry.
                    if self.cpu.ac[0] >= self.cpu.ac[2] {
                        self.cpu.carry = true;
                    } else {
                        let dividend =
                            u32::from(self.cpu.ac[0]) << 16 | u32::from(self.cpu.ac[1]);
                        let divisor = u32::from(self.cpu.ac[2]);
                        self.cpu.ac[1] = (dividend / divisor) as u16;
                        self.cpu.ac[0] = (dividend % divisor) as u16;
                        self.cpu.carry = false;
                    }
                }
                3 => {
                    // MUL: AC1 * AC2 + AC0 into AC0:AC1.
                    let product = u32::from(self.cpu.ac[1]) * u32::from(self.cpu.ac[2])
                        + u32::from(self.cpu.ac[0]);
                    self.cpu.ac[0] = (product >> 16) as u16;
                    self.cpu.ac[1] = product as u16;
                }
                _ => {}
            },
            IoOp::Skp => {
                if fbits == 1 || fbits == 3 {
                    self.skip();
                }
            }
            _ => {}
        }
    }

    /// Dispatch to an installed controller, or the floating-bus behavior
    /// when no device answers at that code.
    fn io_dev(&mut self, ac: usize, op: IoOp, fbits: u16, code: u16) {
        let Some(dev) = self.devices.get(code) else {
            // Nothing drives the bus: busy and done both read as zero.
            if op == IoOp::Skp && (fbits == 1 || fbits == 3) {
                self.skip();
            }
            return;
        };

        match op {
            IoOp::Skp => {
                if dev.test(IoTest::from_bits(fbits)) {
                    self.skip();
                }
            }
            IoOp::Nio | IoOp::Dia | IoOp::Dib | IoOp::Dic => {
                self.cpu.ac[ac] = dev.read(op, IoFlag::from_bits(fbits));
            }
            IoOp::Doa | IoOp::Dob | IoOp::Doc => {
                dev.write(op, IoFlag::from_bits(fbits), self.cpu.ac[ac]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> Machine {
        Machine::new(&NovaFlags::default())
    }

    fn step_ok(m: &mut Machine) -> Cycle {
        m.step().expect("step should not fail")
    }

    #[test]
    fn mov_zero_carry_copies_and_clears_carry() {
        let mut m = machine();
        m.cpu.carry = true;
        m.cpu.ac[1] = 0o5;
        m.mem.write(0, 0o131020); // MOVZ 1,2
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[2], 0o5);
        assert!(!m.cpu.carry);
        assert_eq!(m.cpu.pc, 1);
    }

    #[test]
    fn add_overflow_sets_carry() {
        let mut m = machine();
        m.cpu.ac[0] = 0x8000;
        m.cpu.ac[1] = 0x8000;
        m.mem.write(0, 0o107000); // ADD 0,1
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[1], 0);
        assert!(m.cpu.carry);
    }

    #[test]
    fn no_load_preserves_destination_and_carry() {
        let mut m = machine();
        m.cpu.ac[0] = 9;
        m.cpu.ac[1] = 7;
        m.cpu.carry = true;
        m.mem.write(0, 0o106415); // SUB# 0,1,SNR
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[1], 7);
        assert!(m.cpu.carry, "discarded carry candidate was 0");
        assert_eq!(m.cpu.pc, 2, "nonzero difference should skip");
    }

    #[test]
    fn inc_wrap_skips_on_zero_result() {
        let mut m = machine();
        m.cpu.ac[1] = 0xFFFF;
        m.mem.write(0, 0o125404); // INC 1,1,SZR
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[1], 0);
        assert!(m.cpu.carry, "increment carries out of bit 0");
        assert_eq!(m.cpu.pc, 2);
    }

    #[test]
    fn movs_swaps_bytes() {
        let mut m = machine();
        m.cpu.ac[1] = 0x1234;
        m.mem.write(0, 0o125300); // MOVS 1,1
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[1], 0x3412);
    }

    #[test]
    fn rotate_left_goes_through_carry() {
        let mut m = machine();
        m.cpu.carry = true;
        m.cpu.ac[0] = 0x8001;
        m.mem.write(0, 0o101100); // MOVL 0,0
        step_ok(&mut m);
        // 17-bit rotate: bit 15 into carry, old carry into bit 0.
        assert_eq!(m.cpu.ac[0], 0x0003);
        assert!(m.cpu.carry);
    }

    #[test]
    fn rotate_right_goes_through_carry() {
        let mut m = machine();
        m.cpu.carry = true;
        m.cpu.ac[0] = 0x0001;
        m.mem.write(0, 0o101200); // MOVR 0,0
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[0], 0x8000);
        assert!(m.cpu.carry);
    }

    #[test]
    fn jsr_saves_return_address() {
        let mut m = machine();
        m.cpu.pc = 0o100;
        m.mem.write(0o100, 0o004077); // JSR 77 (page zero)
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 0o77);
        assert_eq!(m.cpu.ac[3], 0o101);
    }

    #[test]
    fn isz_skips_when_cell_wraps_to_zero() {
        let mut m = machine();
        m.mem.write(0o50, 0xFFFF);
        m.mem.write(0, 0o010050); // ISZ 50
        step_ok(&mut m);
        assert_eq!(m.mem.read(0o50), 0);
        assert_eq!(m.cpu.pc, 2);
    }

    #[test]
    fn dsz_counts_down() {
        let mut m = machine();
        m.mem.write(0o50, 2);
        m.mem.write(0, 0o014050); // DSZ 50
        m.mem.write(1, 0o014050); // DSZ 50
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 1, "nonzero result does not skip");
        step_ok(&mut m);
        assert_eq!(m.mem.read(0o50), 0);
        assert_eq!(m.cpu.pc, 3);
    }

    #[test]
    fn lda_ac2_relative_with_negative_displacement() {
        let mut m = machine();
        m.cpu.ac[2] = 0o1000;
        m.mem.write(0o777, 0o4242);
        m.mem.write(0, 0o025377); // LDA 1,-1,2
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[1], 0o4242);
    }

    #[test]
    fn page_zero_addressing_stays_in_page_zero() {
        let mut m = machine();
        m.cpu.pc = 0o2000;
        m.mem.write(0o377, 0o1111);
        m.mem.write(0o2000, 0o020377); // LDA 0,377
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[0], 0o1111);
    }

    #[test]
    fn auto_increment_cell_bumps_exactly_once_per_hop() {
        let mut m = machine();
        m.mem.write(0o20, 0o1000);
        m.mem.write(0o1001, 0o4242);
        m.mem.write(0, 0o022020); // LDA 0,@20
        step_ok(&mut m);
        assert_eq!(m.mem.read(0o20), 0o1001);
        assert_eq!(m.cpu.ac[0], 0o4242);
    }

    #[test]
    fn auto_decrement_cell_drops_exactly_once_per_hop() {
        let mut m = machine();
        m.mem.write(0o30, 0o1000);
        m.mem.write(0o777, 0o4242);
        m.mem.write(0, 0o022030); // LDA 0,@30
        step_ok(&mut m);
        assert_eq!(m.mem.read(0o30), 0o777);
        assert_eq!(m.cpu.ac[0], 0o4242);
    }

    #[test]
    fn indirect_cycle_is_detected() {
        let mut m = machine();
        m.mem.write(0o100, 0o100000 | 0o100); // @100 pointing at itself
        m.mem.write(0, 0o002100); // JMP @100
        assert!(matches!(m.step(), Err(NovaErr::IndirectLoop(_))));
    }

    #[test]
    fn pc_wraps_at_top_of_address_space() {
        let mut m = machine();
        m.cpu.pc = ADDR_MASK;
        m.mem.write(ADDR_MASK, 0o101000); // MOV 0,0
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 0);
    }

    #[test]
    fn reads_loads_switches() {
        let mut m = machine();
        m.cpu.sr = 0o1234;
        m.mem.write(0, 0o060477); // READS 0
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[0], 0o1234);
    }

    #[test]
    fn halt_stops_the_processor() {
        let mut m = machine();
        m.mem.write(0, 0o063077); // HALT
        assert_eq!(step_ok(&mut m), Cycle::Halt);
        assert_eq!(m.cpu.pc, 1);
    }

    #[test]
    fn ion_enable_has_one_instruction_delay() {
        let mut m = machine();
        m.arbiter.set(codes::TTI);
        m.mem.write(1, 0o200); // interrupt vector
        m.cpu.pc = 0o100;
        m.mem.write(0o100, 0o060177); // INTEN
        m.mem.write(0o101, 0o101000); // MOV 0,0

        step_ok(&mut m);
        assert!(!m.cpu.ion, "enable is pending, not yet on");
        assert_eq!(m.cpu.pc, 0o101, "no interrupt before the enable lands");

        step_ok(&mut m);
        assert!(!m.cpu.ion, "servicing the interrupt turned ION back off");
        assert_eq!(m.mem.read(0), 0o102, "return PC stored at location 0");
        assert_eq!(m.cpu.pc, 0o200, "vector chain from location 1");
    }

    #[test]
    fn intds_cancels_a_pending_enable() {
        let mut m = machine();
        m.cpu.pc = 0o100;
        m.mem.write(0o100, 0o060177); // INTEN
        m.mem.write(0o101, 0o060277); // INTDS
        m.mem.write(0o102, 0o101000); // MOV 0,0
        step_ok(&mut m);
        step_ok(&mut m);
        step_ok(&mut m);
        assert!(!m.cpu.ion);
        assert!(!m.cpu.ion_pending);
    }

    #[test]
    fn interrupt_vector_follows_indirect_chain() {
        let mut m = machine();
        m.arbiter.set(codes::RTC);
        m.cpu.ion = true;
        m.mem.write(1, 0o100000 | 0o20); // chain through auto-increment cell
        m.mem.write(0o20, 0o477);
        m.cpu.pc = 0o100;
        m.mem.write(0o100, 0o101000); // MOV 0,0
        step_ok(&mut m);
        assert_eq!(m.mem.read(0o20), 0o500, "auto-increment applies on the vector hop");
        assert_eq!(m.cpu.pc, 0o500);
    }

    #[test]
    fn cpu_skips_test_the_interrupt_flag() {
        let mut m = machine();
        m.cpu.ion = true;
        m.mem.write(0, 0o063477); // SKPBN CPU
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 2);

        m.cpu.pc = 0;
        m.cpu.ion = false;
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 1, "BN with interrupts off falls through");
    }

    #[test]
    fn absent_device_floats_the_bus() {
        let mut m = machine();
        m.mem.write(0, 0o063525); // SKPBZ 25 (no device 25)
        m.mem.write(2, 0o063625); // SKPDN 25
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 2, "BZ on absent device skips");
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 3, "DN on absent device does not skip");
    }

    #[test]
    fn mul_forms_unsigned_product_plus_addend() {
        let mut m = machine();
        m.cpu.ac[0] = 7;
        m.cpu.ac[1] = 3;
        m.cpu.ac[2] = 5;
        m.mem.write(0, 0o073301); // MUL
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[0], 0);
        assert_eq!(m.cpu.ac[1], 22);
    }

    #[test]
    fn div_produces_quotient_and_remainder() {
        let mut m = machine();
        m.cpu.ac[0] = 1;
        m.cpu.ac[1] = 2;
        m.cpu.ac[2] = 3;
        m.cpu.carry = true;
        m.mem.write(0, 0o073101); // DIV
        step_ok(&mut m);
        // (1 << 16 | 2) / 3 = 21846 r 0
        assert_eq!(m.cpu.ac[1], 21846);
        assert_eq!(m.cpu.ac[0], 0);
        assert!(!m.cpu.carry);
    }

    #[test]
    fn div_overflow_sets_carry_and_leaves_operands() {
        let mut m = machine();
        m.cpu.ac[0] = 5;
        m.cpu.ac[1] = 9;
        m.cpu.ac[2] = 5;
        m.mem.write(0, 0o073101); // DIV
        step_ok(&mut m);
        assert!(m.cpu.carry);
        assert_eq!(m.cpu.ac[0], 5);
        assert_eq!(m.cpu.ac[1], 9);
    }

    #[test]
    fn mul_then_div_recovers_multiplicand() {
        let mut m = machine();
        m.cpu.ac[0] = 0;
        m.cpu.ac[1] = 1234;
        m.cpu.ac[2] = 77;
        m.mem.write(0, 0o073301); // MUL
        m.mem.write(1, 0o073101); // DIV
        step_ok(&mut m);
        step_ok(&mut m);
        assert_eq!(m.cpu.ac[1], 1234);
        assert_eq!(m.cpu.ac[0], 0);
        assert!(!m.cpu.carry);
    }

    #[test]
    fn mdv_skips_as_never_busy_never_done() {
        let mut m = machine();
        m.mem.write(0, 0o063501); // SKPBZ MDV
        m.mem.write(2, 0o063601); // SKPDN MDV
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 2);
        step_ok(&mut m);
        assert_eq!(m.cpu.pc, 3);
    }
}
