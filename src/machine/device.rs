//! The device-controller framework.
//!
//! Each installed peripheral is a controller running on its own thread,
//! owning a Busy/Done state machine, a one-word data buffer, and a rate
//! timer. The processor talks to a controller through a [`DeviceHandle`]:
//! every I/O instruction becomes one message and one reply over a rendezvous
//! channel, so the processor and the device proceed in lockstep for each
//! operation.
//!
//! The controllers themselves live in the submodules:
//! - [`stream`]: byte-stream readers and writers (teletype, paper tape),
//! - [`rtc`]: the real-time clock.

pub(crate) mod rtc;
pub(crate) mod stream;

use std::io::{Read, Write};

use crossbeam_channel::Sender;

use super::interrupt::IntrArbiter;
use std::sync::Arc;

/// Device codes for the standard peripherals.
///
/// Codes are six bits; the two codes handled inside the processor itself
/// ([`CPU`] and [`MDV`]) are listed here as well because programs name them
/// in I/O instructions.
pub mod codes {
    /// Multiply/divide unit (a processor pseudo-device).
    pub const MDV: u16 = 0o01;
    /// Teletype input.
    pub const TTI: u16 = 0o10;
    /// Teletype output.
    pub const TTO: u16 = 0o11;
    /// Paper tape reader.
    pub const PTR: u16 = 0o12;
    /// Paper tape punch.
    pub const PTP: u16 = 0o13;
    /// Real-time clock.
    pub const RTC: u16 = 0o14;
    /// The processor itself (a pseudo-device).
    pub const CPU: u16 = 0o77;
}

/// Interrupt priorities of the standard peripherals.
pub(crate) mod priorities {
    pub(crate) const PTR: u16 = 11;
    pub(crate) const RTC: u16 = 13;
    pub(crate) const PTP: u16 = 13;
    pub(crate) const TTI: u16 = 14;
    pub(crate) const TTO: u16 = 15;
}

/// I/O transfer operation, from IR<5,6,7>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoOp {
    Nio,
    Dia,
    Doa,
    Dib,
    Dob,
    Dic,
    Doc,
    Skp,
}

impl IoOp {
    pub(crate) fn from_bits(bits: u16) -> Self {
        match bits & 7 {
            0 => IoOp::Nio,
            1 => IoOp::Dia,
            2 => IoOp::Doa,
            3 => IoOp::Dib,
            4 => IoOp::Dob,
            5 => IoOp::Dic,
            6 => IoOp::Doc,
            _ => IoOp::Skp,
        }
    }
}

/// Control flag pulse attached to a non-skip I/O operation, from IR<8,9>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoFlag {
    None,
    Start,
    Clear,
    Pulse,
}

impl IoFlag {
    pub(crate) fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => IoFlag::None,
            1 => IoFlag::Start,
            2 => IoFlag::Clear,
            _ => IoFlag::Pulse,
        }
    }
}

/// Skip condition of an I/O SKP operation, from IR<8,9>.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoTest {
    /// BN: skip if Busy.
    Busy,
    /// BZ: skip if not Busy.
    NotBusy,
    /// DN: skip if Done.
    Done,
    /// DZ: skip if not Done.
    NotDone,
}

impl IoTest {
    pub(crate) fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => IoTest::Busy,
            1 => IoTest::NotBusy,
            2 => IoTest::Done,
            _ => IoTest::NotDone,
        }
    }
}

/// Controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DevState {
    Idle,
    Busy,
    Done,
}

/// Host-side media that can be bound to a peripheral while the processor is
/// stopped.
///
/// Input devices accept a [`Media::reader`], output devices a
/// [`Media::writer`]; binding the wrong direction fails with
/// [`WrongMedia`](super::NovaErr::WrongMedia).
pub enum Media {
    /// A byte source for an input device.
    Reader(Box<dyn Read + Send>),
    /// A byte sink for an output device.
    Writer(Box<dyn Write + Send>),
}

impl Media {
    /// Wraps a byte source for attachment to an input device.
    pub fn reader(r: impl Read + Send + 'static) -> Self {
        Media::Reader(Box::new(r))
    }

    /// Wraps a byte sink for attachment to an output device.
    pub fn writer(w: impl Write + Send + 'static) -> Self {
        Media::Writer(Box::new(w))
    }
}

impl std::fmt::Debug for Media {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Media::Reader(_) => f.write_str("Media::Reader"),
            Media::Writer(_) => f.write_str("Media::Writer"),
        }
    }
}

/// Which direction of media a device accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MediaKind {
    Input,
    Output,
    /// No host media at all (the clock).
    None,
}

/// One message from the processor to a controller. Every message is answered.
pub(crate) enum Command {
    /// A data-transfer or no-transfer operation with its control flag.
    Io {
        op: IoOp,
        flag: IoFlag,
        data: u16,
        reply: Sender<u16>,
    },
    /// An SKP state test.
    Test { test: IoTest, reply: Sender<bool> },
    /// IORST.
    Reset { reply: Sender<()> },
    /// Bind host media. Only sent after the façade has checked direction.
    Attach { media: Media, reply: Sender<()> },
}

/// The processor's side of one controller: its identity plus the command
/// channel into the controller thread.
pub(crate) struct DeviceHandle {
    pub(crate) code: u16,
    pub(crate) priority: u16,
    pub(crate) kind: MediaKind,
    cmds: Sender<Command>,
}

impl DeviceHandle {
    pub(crate) fn new(code: u16, priority: u16, kind: MediaKind, cmds: Sender<Command>) -> Self {
        Self {
            code,
            priority,
            kind,
            cmds,
        }
    }

    /// Performs a data-in operation, returning the device's reply word.
    pub(crate) fn read(&self, op: IoOp, flag: IoFlag) -> u16 {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self
            .cmds
            .send(Command::Io {
                op,
                flag,
                data: 0,
                reply: tx,
            })
            .is_err()
        {
            log::warn!("device {:02o}: controller gone, read floats", self.code);
            return 0;
        }
        rx.recv().unwrap_or(0)
    }

    /// Performs a data-out operation.
    pub(crate) fn write(&self, op: IoOp, flag: IoFlag, data: u16) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self
            .cmds
            .send(Command::Io {
                op,
                flag,
                data,
                reply: tx,
            })
            .is_err()
        {
            log::warn!("device {:02o}: controller gone, write dropped", self.code);
            return;
        }
        let _ = rx.recv();
    }

    /// Evaluates an SKP condition against the controller's state.
    pub(crate) fn test(&self, test: IoTest) -> bool {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self.cmds.send(Command::Test { test, reply: tx }).is_err() {
            return false;
        }
        rx.recv().unwrap_or(false)
    }

    /// Resets the controller to Idle and clears its interrupt request.
    pub(crate) fn reset(&self) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self.cmds.send(Command::Reset { reply: tx }).is_ok() {
            let _ = rx.recv();
        }
    }

    /// Binds host media to the controller.
    pub(crate) fn attach(&self, media: Media) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        if self.cmds.send(Command::Attach { media, reply: tx }).is_ok() {
            let _ = rx.recv();
        }
    }
}

/// Shared controller behavior: the Busy/Done state machine, the buffer word,
/// and the coupling to the interrupt arbiter. The pending bit tracks the
/// Done state under the arbiter's lock, so the processor never observes one
/// without the other.
pub(crate) struct Controller {
    code: u16,
    state: DevState,
    pub(crate) data: u16,
    arbiter: Arc<IntrArbiter>,
}

impl Controller {
    pub(crate) fn new(code: u16, arbiter: Arc<IntrArbiter>) -> Self {
        Self {
            code,
            state: DevState::Idle,
            data: 0,
            arbiter,
        }
    }

    /// Clear flag or reset: back to Idle, no interrupt request.
    pub(crate) fn idle(&mut self) {
        self.arbiter.clear(self.code);
        self.state = DevState::Idle;
        log::trace!("device {:02o}: idle", self.code);
    }

    /// Start flag: the operation is in flight.
    pub(crate) fn busy(&mut self) {
        self.arbiter.clear(self.code);
        self.state = DevState::Busy;
        log::trace!("device {:02o}: busy", self.code);
    }

    /// Timer expiry: a Busy operation finishes and requests an interrupt.
    /// A stale tick against a non-Busy controller is ignored.
    pub(crate) fn complete(&mut self) {
        if self.state == DevState::Busy {
            self.state = DevState::Done;
            self.arbiter.set(self.code);
            log::trace!("device {:02o}: done", self.code);
        }
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.state == DevState::Busy
    }

    /// Applies the control flag of a non-SKP operation.
    pub(crate) fn apply(&mut self, flag: IoFlag) {
        match flag {
            IoFlag::Start => self.busy(),
            IoFlag::Clear => self.idle(),
            IoFlag::Pulse | IoFlag::None => {}
        }
    }

    /// Evaluates an SKP condition.
    pub(crate) fn test(&self, test: IoTest) -> bool {
        match test {
            IoTest::Busy => self.state == DevState::Busy,
            IoTest::NotBusy => self.state != DevState::Busy,
            IoTest::Done => self.state == DevState::Done,
            IoTest::NotDone => self.state != DevState::Done,
        }
    }
}

/// The installed-device table: one slot per six-bit device code. The fixed
/// layout gives INTA its ascending-code scan order for free.
pub(crate) struct DeviceSet {
    slots: [Option<DeviceHandle>; 64],
}

impl DeviceSet {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub(crate) fn install(&mut self, handle: DeviceHandle) {
        let code = usize::from(handle.code & 0o77);
        self.slots[code] = Some(handle);
    }

    pub(crate) fn get(&self, code: u16) -> Option<&DeviceHandle> {
        self.slots[usize::from(code & 0o77)].as_ref()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.slots.iter().flatten()
    }

    /// IORST: resets every installed controller.
    pub(crate) fn reset_all(&self) {
        for dev in self.iter() {
            dev.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn arbiter() -> Arc<IntrArbiter> {
        Arc::new(IntrArbiter::new())
    }

    fn wait_done(dev: &DeviceHandle) {
        for _ in 0..500 {
            if dev.test(IoTest::Done) {
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        panic!("device {:02o} never reached Done", dev.code);
    }

    #[test]
    fn reader_busy_done_cycle() {
        let arb = arbiter();
        arb.register(codes::TTI, priorities::TTI);
        let dev = stream::spawn_reader(codes::TTI, priorities::TTI, 1000.0, arb.clone());

        dev.attach(Media::reader(std::io::Cursor::new(b"hi".to_vec())));
        assert!(dev.test(IoTest::NotBusy));
        assert!(dev.test(IoTest::NotDone));

        dev.write(IoOp::Nio, IoFlag::Start, 0);
        wait_done(&dev);
        assert_eq!(dev.read(IoOp::Dia, IoFlag::None), u16::from(b'h'));
        assert!(arb.pending_enabled());

        // Reading with Start re-arms for the next frame.
        dev.write(IoOp::Nio, IoFlag::Start, 0);
        assert!(!arb.pending_enabled());
        wait_done(&dev);
        // NIO delivers the same latched word a DIA would.
        assert_eq!(dev.read(IoOp::Nio, IoFlag::None), u16::from(b'i'));
        assert_eq!(dev.read(IoOp::Dia, IoFlag::Clear), u16::from(b'i'));
        assert!(dev.test(IoTest::NotDone));
        assert!(!arb.pending_enabled());
    }

    #[test]
    fn reader_eof_keeps_last_word() {
        let arb = arbiter();
        arb.register(codes::PTR, priorities::PTR);
        let dev = stream::spawn_reader(codes::PTR, priorities::PTR, 1000.0, arb.clone());
        dev.attach(Media::reader(std::io::Cursor::new(b"x".to_vec())));

        dev.write(IoOp::Nio, IoFlag::Start, 0);
        wait_done(&dev);
        assert_eq!(dev.read(IoOp::Dia, IoFlag::None), u16::from(b'x'));

        // Stream exhausted: the frame still completes, the word is kept.
        dev.write(IoOp::Nio, IoFlag::Start, 0);
        wait_done(&dev);
        assert_eq!(dev.read(IoOp::Dia, IoFlag::None), u16::from(b'x'));
    }

    #[test]
    fn writer_emits_latched_byte() {
        let arb = arbiter();
        arb.register(codes::TTO, priorities::TTO);
        let dev = stream::spawn_writer(codes::TTO, priorities::TTO, 1000.0, arb.clone());

        let buf = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        dev.attach(Media::writer(stream::SharedSink::new(buf.clone())));

        dev.write(IoOp::Doa, IoFlag::Start, u16::from(b'A') | 0x4100);
        wait_done(&dev);
        assert_eq!(*buf.lock().unwrap(), b"A");
    }

    #[test]
    fn clear_cancels_pending_frame() {
        let arb = arbiter();
        arb.register(codes::TTI, priorities::TTI);
        let dev = stream::spawn_reader(codes::TTI, priorities::TTI, 100.0, arb.clone());
        dev.attach(Media::reader(std::io::Cursor::new(b"z".to_vec())));

        dev.write(IoOp::Nio, IoFlag::Start, 0);
        dev.write(IoOp::Nio, IoFlag::Clear, 0);
        assert!(dev.test(IoTest::NotBusy));

        // The cancelled frame must never complete.
        std::thread::sleep(Duration::from_millis(30));
        assert!(dev.test(IoTest::NotDone));
        assert!(!arb.pending_enabled());
    }

    #[test]
    fn rtc_ticks_when_started() {
        let arb = arbiter();
        arb.register(codes::RTC, priorities::RTC);
        let dev = rtc::spawn(codes::RTC, priorities::RTC, 60, arb.clone());

        // Select the 1 kHz rate, then start.
        dev.write(IoOp::Doa, IoFlag::Start, 3);
        wait_done(&dev);
        assert!(arb.pending_enabled());

        // Restarting clears Done and the next tick completes again.
        dev.write(IoOp::Nio, IoFlag::Start, 0);
        assert!(!arb.pending_enabled());
        wait_done(&dev);
    }
}
