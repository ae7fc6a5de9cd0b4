//! The machine and its front-panel console.
//!
//! This module is focused on owning and driving a complete Nova: processor,
//! memory, peripherals, and the console everything is operated through.
//!
//! This module consists of:
//! - [`Nova`]: the console handle, the only way to touch a machine.
//! - [`cpu`]: the processor state and instruction interpreter.
//! - [`mem`]: main memory.
//! - [`device`]: the peripheral controllers.
//! - [`interrupt`]: the interrupt arbiter.
//! - [`loader`]: bootstrap programs and memory-image decoding.
//!
//! # Ownership
//!
//! The machine state is owned by a supervisor thread spawned by
//! [`Nova::new`]. The supervisor alternates between two states: *stopped*,
//! where it blocks waiting for console requests, and *running*, where it
//! polls the console between instructions. Each console call sends one
//! request and blocks for the reply, so calls are serialized and always
//! observe the machine at an instruction boundary. Mutating calls made
//! while the processor runs are refused with [`NovaErr::Running`].

pub(crate) mod cpu;
pub mod device;
pub(crate) mod interrupt;
pub mod loader;
pub(crate) mod mem;

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

use crate::disasm;
use cpu::{Cycle, Machine};
pub use device::Media;
pub use mem::{ADDR_MASK, MEM_WORDS};

/// Errors surfaced by the console.
#[derive(Debug)]
pub enum NovaErr {
    /// A console operation that needs a stopped processor was attempted
    /// while it was running.
    Running,
    /// [`Nova::wait_for_halt`] gave up waiting.
    HaltTimeout,
    /// No device is installed at the requested code.
    DeviceNotFound(u16),
    /// The attached media does not match the device's direction.
    WrongMedia(u16),
    /// A memory image had an odd number of bytes.
    BadImage(usize),
    /// An indirect addressing chain failed to terminate; the processor has
    /// been stopped.
    IndirectLoop(u16),
}

impl std::fmt::Display for NovaErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NovaErr::Running => f.write_str("processor running"),
            NovaErr::HaltTimeout => f.write_str("timed out waiting for processor halt"),
            NovaErr::DeviceNotFound(code) => {
                write!(f, "{}: device not found", disasm::device_name(*code))
            }
            NovaErr::WrongMedia(code) => write!(
                f,
                "{}: media does not match device direction",
                disasm::device_name(*code)
            ),
            NovaErr::BadImage(len) => write!(f, "memory image has odd byte count ({len})"),
            NovaErr::IndirectLoop(addr) => write!(
                f,
                "indirect chain did not terminate (last address {addr:05o})"
            ),
        }
    }
}

impl std::error::Error for NovaErr {}

/// Configuration for [`Nova::new`].
///
/// These model the physical installation: the power-line frequency the
/// clock can tick at, and the character rates of the stream peripherals.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct NovaFlags {
    /// AC power-line frequency driving the real-time clock's slowest rate.
    /// Only 50 and 60 are meaningful; anything else is treated as 60.
    pub line_freq: u32,
    /// Teletype character rate, characters per second.
    pub tty_rate: f32,
    /// Paper-tape reader character rate.
    pub ptr_rate: f32,
    /// Paper-tape punch character rate.
    pub ptp_rate: f32,
}

impl Default for NovaFlags {
    /// The default flags.
    ///
    /// They are defined as follows:
    /// - `line_freq`: 60
    /// - `tty_rate`: 10.0 (a model 33 teletype)
    /// - `ptr_rate`: 400.0
    /// - `ptp_rate`: 63.3
    fn default() -> Self {
        Self {
            line_freq: 60,
            tty_rate: 10.0,
            ptr_rate: 400.0,
            ptp_rate: 63.3,
        }
    }
}

/// How [`Nova::trace`] decides when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceMode {
    /// Stop after the given number of instructions.
    Cycles,
    /// Stop once the processor reaches the given address.
    Addr,
}

/// A console request. One reply is sent for every request.
enum Request {
    Reset,
    Stop,
    Start(u16),
    Continue,
    InstStep,
    Deposit(u16, u16),
    DepositNext(u16),
    Examine(u16),
    ExamineNext,
    Switches(u16),
    LoadMemory(u16, Vec<u16>),
    ProgramLoad,
    Attach(u16, Media),
    State,
    Status,
}

enum Reply {
    /// The processor was (or now is) stopped when the request was served.
    Stopped { pc: u16, data: u16, halted: bool },
    /// The processor was (or now is) running.
    Running,
    /// A formatted state line.
    State(String),
    /// The request was served but failed.
    Failed(NovaErr),
}

struct ConMsg {
    req: Request,
    reply: Sender<Reply>,
}

/// The console handle for one emulated machine.
///
/// All methods mirror the physical front panel: RESET, STOP, START,
/// CONTINUE, INST STEP, DEPOSIT, EXAMINE, the data switches, and the
/// PROGRAM LOAD switch. Each call blocks until the processor acknowledges
/// it at an instruction boundary.
pub struct Nova {
    con: Sender<ConMsg>,
    halt: Receiver<u16>,
}

impl Nova {
    /// Creates a machine with the standard peripherals installed, all
    /// controllers Idle, and the processor stopped.
    pub fn new(flags: NovaFlags) -> Self {
        let (con_tx, con_rx) = bounded(0);
        let (halt_tx, halt_rx) = bounded(1);
        let sup = Supervisor {
            mach: Machine::new(&flags),
            con: con_rx,
            halt_tx,
            halt_rx: halt_rx.clone(),
        };
        std::thread::Builder::new()
            .name("nova-console".into())
            .spawn(move || sup.run())
            .expect("spawn console supervisor");
        Self {
            con: con_tx,
            halt: halt_rx,
        }
    }

    fn request(&self, req: Request) -> Reply {
        let (tx, rx) = bounded(1);
        self.con
            .send(ConMsg { req, reply: tx })
            .expect("console supervisor exited");
        rx.recv().expect("console supervisor exited")
    }

    /// RESET: the processor halts at the end of the current instruction;
    /// interrupts, the priority mask, and all device state are cleared.
    /// Returns the program counter.
    pub fn reset(&self) -> u16 {
        match self.request(Request::Reset) {
            Reply::Stopped { pc, .. } => pc,
            _ => unreachable!("RESET is honored in both console states"),
        }
    }

    /// STOP: the processor halts at the end of the current instruction.
    /// Returns the program counter.
    pub fn stop(&self) -> u16 {
        match self.request(Request::Stop) {
            Reply::Stopped { pc, .. } => pc,
            _ => unreachable!("STOP is honored in both console states"),
        }
    }

    /// START: loads `addr` into the program counter and begins execution.
    /// Has no effect if the processor is already running.
    pub fn start(&self, addr: u16) {
        self.request(Request::Start(addr));
    }

    /// CONTINUE: resumes execution from the current machine state.
    /// Has no effect if the processor is already running.
    pub fn resume(&self) {
        self.request(Request::Continue);
    }

    /// INST STEP: executes exactly one instruction. Returns the program
    /// counter and whether the instruction was a HALT.
    pub fn inst_step(&self) -> Result<(u16, bool), NovaErr> {
        match self.request(Request::InstStep) {
            Reply::Stopped { pc, halted, .. } => Ok((pc, halted)),
            Reply::Running => Err(NovaErr::Running),
            Reply::Failed(e) => Err(e),
            Reply::State(_) => unreachable!("INST STEP never acks with a state line"),
        }
    }

    /// DEPOSIT: loads `addr` into the program counter and stores `data` at
    /// that address.
    pub fn deposit(&self, addr: u16, data: u16) -> Result<(), NovaErr> {
        self.ack_stopped(Request::Deposit(addr, data))
    }

    /// DEPOSIT NEXT: increments the program counter and stores `data` at
    /// the new address.
    pub fn deposit_next(&self, data: u16) -> Result<(), NovaErr> {
        self.ack_stopped(Request::DepositNext(data))
    }

    /// EXAMINE: loads `addr` into the program counter and returns the
    /// memory word at that address.
    pub fn examine(&self, addr: u16) -> Result<u16, NovaErr> {
        match self.request(Request::Examine(addr)) {
            Reply::Stopped { data, .. } => Ok(data),
            Reply::Running => Err(NovaErr::Running),
            Reply::Failed(e) => Err(e),
            Reply::State(_) => unreachable!("EXAMINE never acks with a state line"),
        }
    }

    /// EXAMINE NEXT: increments the program counter and returns the memory
    /// word at the new address.
    pub fn examine_next(&self) -> Result<u16, NovaErr> {
        match self.request(Request::ExamineNext) {
            Reply::Stopped { data, .. } => Ok(data),
            Reply::Running => Err(NovaErr::Running),
            Reply::Failed(e) => Err(e),
            Reply::State(_) => unreachable!("EXAMINE NEXT never acks with a state line"),
        }
    }

    /// Loads the data switches. Works in either console state.
    pub fn switches(&self, data: u16) {
        self.request(Request::Switches(data));
    }

    /// Copies `words` into memory starting at `addr`.
    pub fn load_memory(&self, addr: u16, words: &[u16]) -> Result<(), NovaErr> {
        self.ack_stopped(Request::LoadMemory(addr, words.to_vec()))
    }

    /// Whether the processor is currently running.
    pub fn is_running(&self) -> bool {
        matches!(self.request(Request::Status), Reply::Running)
    }

    /// Returns the processor state as one line:
    /// `PC IR  AC0 AC1 AC2 AC3  C ION ; <disassembled IR>`,
    /// all numeric fields in octal. The state shown is the one the *next*
    /// instruction will execute from.
    pub fn state(&self) -> Result<String, NovaErr> {
        match self.request(Request::State) {
            Reply::State(line) => Ok(line),
            Reply::Running => Err(NovaErr::Running),
            Reply::Failed(e) => Err(e),
            Reply::Stopped { .. } => unreachable!("STATE acks with a state line"),
        }
    }

    /// Single-steps from `addr`, printing the machine state before every
    /// instruction, until a HALT retires or the mode's limit is reached:
    /// after `limit` instructions for [`TraceMode::Cycles`], or once the
    /// processor reaches address `limit` for [`TraceMode::Addr`]. Returns
    /// the final program counter.
    pub fn trace(&self, addr: u16, mode: TraceMode, limit: u64) -> Result<u16, NovaErr> {
        let mut remaining = limit;
        self.examine(addr)?; // load PC
        loop {
            let line = self.state()?;
            println!("{line}");
            let (pc, halted) = self.inst_step()?;
            if halted {
                return Ok(pc);
            }
            match mode {
                TraceMode::Cycles => {
                    remaining = remaining.saturating_sub(1);
                    if remaining == 0 {
                        return Ok(pc);
                    }
                }
                TraceMode::Addr => {
                    if u64::from(pc) == limit {
                        return Ok(pc);
                    }
                }
            }
        }
    }

    /// Blocks until the processor executes a HALT, returning the program
    /// counter after the halt. The halt notification is consumed; a second
    /// wait needs a second halt.
    pub fn wait_for_halt(&self, timeout: Duration) -> Result<u16, NovaErr> {
        self.halt
            .recv_timeout(timeout)
            .map_err(|_| NovaErr::HaltTimeout)
    }

    /// Binds host media to a stopped machine's device. Fails if the device
    /// does not exist, takes the other direction of media, or the
    /// processor is running.
    pub fn attach(&self, code: u16, media: Media) -> Result<(), NovaErr> {
        self.ack_stopped(Request::Attach(code, media))
    }

    /// PROGRAM LOAD: writes the bootstrap loader into locations 0..0o37
    /// and starts the processor at 0.
    pub fn program_load(&self) -> Result<(), NovaErr> {
        self.ack_stopped(Request::ProgramLoad)
    }

    fn ack_stopped(&self, req: Request) -> Result<(), NovaErr> {
        match self.request(req) {
            Reply::Stopped { .. } => Ok(()),
            Reply::Running => Err(NovaErr::Running),
            Reply::Failed(e) => Err(e),
            Reply::State(_) => unreachable!("mutating requests never ack with a state line"),
        }
    }
}

impl Default for Nova {
    fn default() -> Self {
        Self::new(NovaFlags::default())
    }
}

/// The supervisor owns the machine and serializes every console operation
/// with instruction execution.
struct Supervisor {
    mach: Machine,
    con: Receiver<ConMsg>,
    halt_tx: Sender<u16>,
    halt_rx: Receiver<u16>,
}

impl Supervisor {
    fn run(mut self) {
        loop {
            if !self.stopped() {
                return;
            }
            if !self.running() {
                return;
            }
        }
    }

    /// Stopped state: block on the console. Returns false when the console
    /// handle is gone, true to enter the running state.
    fn stopped(&mut self) -> bool {
        loop {
            let Ok(ConMsg { req, reply }) = self.con.recv() else {
                return false;
            };
            let (resp, start) = self.serve_stopped(req);
            let _ = reply.send(resp);
            if start {
                return true;
            }
        }
    }

    fn serve_stopped(&mut self, req: Request) -> (Reply, bool) {
        match req {
            Request::Reset => {
                self.reset();
                (self.ack(), false)
            }
            Request::Stop | Request::Status => (self.ack(), false),
            Request::Start(addr) => {
                self.drain_halt();
                self.mach.cpu.pc = addr & ADDR_MASK;
                log::debug!("start at {:05o}", self.mach.cpu.pc);
                (Reply::Running, true)
            }
            Request::Continue => {
                self.drain_halt();
                log::debug!("continue at {:05o}", self.mach.cpu.pc);
                (Reply::Running, true)
            }
            Request::ProgramLoad => {
                self.drain_halt();
                self.mach.mem.load(0, &loader::BOOTSTRAP_LOADER);
                self.mach.cpu.pc = 0;
                log::debug!("program load");
                (self.ack(), true)
            }
            Request::InstStep => match self.mach.step() {
                Ok(cycle) => (
                    Reply::Stopped {
                        pc: self.mach.cpu.pc,
                        data: 0,
                        halted: cycle == Cycle::Halt,
                    },
                    false,
                ),
                Err(e) => (Reply::Failed(e), false),
            },
            Request::Deposit(addr, data) => {
                self.mach.cpu.pc = addr & ADDR_MASK;
                self.mach.mem.write(self.mach.cpu.pc, data);
                (self.ack(), false)
            }
            Request::DepositNext(data) => {
                self.mach.cpu.pc = (self.mach.cpu.pc + 1) & ADDR_MASK;
                self.mach.mem.write(self.mach.cpu.pc, data);
                (self.ack(), false)
            }
            Request::Examine(addr) => {
                self.mach.cpu.pc = addr & ADDR_MASK;
                (self.examined(), false)
            }
            Request::ExamineNext => {
                self.mach.cpu.pc = (self.mach.cpu.pc + 1) & ADDR_MASK;
                (self.examined(), false)
            }
            Request::Switches(data) => {
                self.mach.cpu.sr = data;
                (self.ack(), false)
            }
            Request::LoadMemory(addr, words) => {
                self.mach.mem.load(addr, &words);
                (self.ack(), false)
            }
            Request::Attach(code, media) => match self.mach.attach(code, media) {
                Ok(()) => (self.ack(), false),
                Err(e) => (Reply::Failed(e), false),
            },
            Request::State => (Reply::State(self.state_line()), false),
        }
    }

    /// Running state: poll the console before each fetch. Returns false
    /// when the console handle is gone, true to drop back to stopped.
    fn running(&mut self) -> bool {
        loop {
            match self.con.try_recv() {
                Ok(ConMsg { req, reply }) => match req {
                    Request::Reset => {
                        self.reset();
                        let _ = reply.send(self.ack());
                        return true;
                    }
                    Request::Stop => {
                        log::debug!("stop at {:05o}", self.mach.cpu.pc);
                        let _ = reply.send(self.ack());
                        return true;
                    }
                    Request::Switches(data) => {
                        self.mach.cpu.sr = data;
                        let _ = reply.send(self.ack());
                    }
                    _ => {
                        let _ = reply.send(Reply::Running);
                    }
                },
                Err(TryRecvError::Empty) => match self.mach.step() {
                    Ok(Cycle::Run) => {}
                    Ok(Cycle::Halt) => {
                        let pc = self.mach.cpu.pc;
                        log::debug!("halt at {pc:05o}");
                        self.drain_halt();
                        let _ = self.halt_tx.try_send(pc);
                        return true;
                    }
                    Err(e) => {
                        log::error!("processor stopped: {e}");
                        return true;
                    }
                },
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Console RESET: IORST plus the carry flag.
    fn reset(&mut self) {
        self.mach.io_reset();
        self.mach.cpu.carry = false;
        log::debug!("reset at {:05o}", self.mach.cpu.pc);
    }

    /// Eats a stale halt notification so a previous run's halt cannot wake
    /// a waiter spuriously.
    fn drain_halt(&self) {
        while self.halt_rx.try_recv().is_ok() {}
    }

    fn ack(&self) -> Reply {
        Reply::Stopped {
            pc: self.mach.cpu.pc,
            data: 0,
            halted: false,
        }
    }

    fn examined(&self) -> Reply {
        Reply::Stopped {
            pc: self.mach.cpu.pc,
            data: self.mach.mem.read(self.mach.cpu.pc),
            halted: false,
        }
    }

    fn state_line(&self) -> String {
        let cpu = &self.mach.cpu;
        let ir = self.mach.mem.read(cpu.pc);
        format!(
            "{:05o} {:06o}  {:06o} {:06o} {:06o} {:06o}  {} {} ; {}",
            cpu.pc,
            ir,
            cpu.ac[0],
            cpu.ac[1],
            cpu.ac[2],
            cpu.ac[3],
            u8::from(cpu.carry),
            u8::from(cpu.ion),
            disasm::word(ir)
        )
    }
}
