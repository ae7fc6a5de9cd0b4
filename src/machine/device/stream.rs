//! Byte-stream peripherals: character-at-a-time readers and writers.
//!
//! The teletype input/output and the paper-tape reader/punch are all the
//! same machine: a controller with a one-word buffer and a timer that models
//! the device's character rate. Starting the device arms the timer for one
//! character frame; when the frame elapses the controller touches the host
//! stream (if any is attached), goes Done, and requests an interrupt.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crossbeam_channel::{after, bounded, never, select, Receiver};

use super::super::interrupt::IntrArbiter;
use super::{Command, Controller, DeviceHandle, IoFlag, IoOp, Media, MediaKind};
use std::sync::Arc;

/// Spawns an input controller (teletype keyboard, paper-tape reader) running
/// at `rate` characters per second.
pub(crate) fn spawn_reader(
    code: u16,
    priority: u16,
    rate: f32,
    arbiter: Arc<IntrArbiter>,
) -> DeviceHandle {
    let (tx, rx) = bounded(0);
    let period = Duration::from_secs_f32(1.0 / rate);
    let ctrl = Controller::new(code, arbiter);
    std::thread::Builder::new()
        .name(format!("nova-dev-{code:02o}"))
        .spawn(move || reader_loop(ctrl, rx, period))
        .expect("spawn device thread");
    DeviceHandle::new(code, priority, MediaKind::Input, tx)
}

/// Spawns an output controller (teletype printer, paper-tape punch) running
/// at `rate` characters per second.
pub(crate) fn spawn_writer(
    code: u16,
    priority: u16,
    rate: f32,
    arbiter: Arc<IntrArbiter>,
) -> DeviceHandle {
    let (tx, rx) = bounded(0);
    let period = Duration::from_secs_f32(1.0 / rate);
    let ctrl = Controller::new(code, arbiter);
    std::thread::Builder::new()
        .name(format!("nova-dev-{code:02o}"))
        .spawn(move || writer_loop(ctrl, rx, period))
        .expect("spawn device thread");
    DeviceHandle::new(code, priority, MediaKind::Output, tx)
}

fn reader_loop(mut ctrl: Controller, cmds: Receiver<Command>, period: Duration) {
    let mut stream: Option<Box<dyn Read + Send>> = None;
    let mut timer = never();
    loop {
        select! {
            recv(cmds) -> msg => {
                let Ok(cmd) = msg else { return };
                match cmd {
                    Command::Io { op, flag, data: _, reply } => {
                        // DIA and NIO hand back the word latched by the last
                        // frame, before the flag takes effect.
                        let out = match op {
                            IoOp::Dia | IoOp::Nio => ctrl.data,
                            _ => 0,
                        };
                        match flag {
                            IoFlag::Start => timer = after(period),
                            IoFlag::Clear => timer = never(),
                            _ => {}
                        }
                        ctrl.apply(flag);
                        let _ = reply.send(out);
                    }
                    Command::Test { test, reply } => {
                        let _ = reply.send(ctrl.test(test));
                    }
                    Command::Reset { reply } => {
                        timer = never();
                        ctrl.idle();
                        let _ = reply.send(());
                    }
                    Command::Attach { media, reply } => {
                        if let Media::Reader(r) = media {
                            stream = Some(r);
                        }
                        let _ = reply.send(());
                    }
                }
            }
            recv(timer) -> _ => {
                timer = never();
                if !ctrl.is_busy() {
                    continue;
                }
                if let Some(r) = stream.as_mut() {
                    let mut byte = [0u8; 1];
                    match r.read(&mut byte) {
                        Ok(0) => {} // EOF: last word stays latched
                        Ok(_) => ctrl.data = u16::from(byte[0]),
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => {
                            log::warn!("reader {:02o}: {e}; stopping device", ctrl.code);
                            stream = None;
                            ctrl.idle();
                            continue;
                        }
                    }
                }
                ctrl.complete();
            }
        }
    }
}

fn writer_loop(mut ctrl: Controller, cmds: Receiver<Command>, period: Duration) {
    let mut stream: Option<Box<dyn Write + Send>> = None;
    let mut timer = never();
    loop {
        select! {
            recv(cmds) -> msg => {
                let Ok(cmd) = msg else { return };
                match cmd {
                    Command::Io { op, flag, data, reply } => {
                        if op == IoOp::Doa {
                            ctrl.data = data;
                        }
                        match flag {
                            IoFlag::Start => timer = after(period),
                            IoFlag::Clear => timer = never(),
                            _ => {}
                        }
                        ctrl.apply(flag);
                        let _ = reply.send(0);
                    }
                    Command::Test { test, reply } => {
                        let _ = reply.send(ctrl.test(test));
                    }
                    Command::Reset { reply } => {
                        timer = never();
                        ctrl.idle();
                        let _ = reply.send(());
                    }
                    Command::Attach { media, reply } => {
                        if let Media::Writer(w) = media {
                            stream = Some(w);
                        }
                        let _ = reply.send(());
                    }
                }
            }
            recv(timer) -> _ => {
                timer = never();
                if !ctrl.is_busy() {
                    continue;
                }
                if let Some(w) = stream.as_mut() {
                    let byte = [ctrl.data as u8];
                    if let Err(e) = w.write_all(&byte).and_then(|()| w.flush()) {
                        log::warn!("writer {:02o}: {e}; stopping device", ctrl.code);
                        stream = None;
                        ctrl.idle();
                        continue;
                    }
                }
                ctrl.complete();
            }
        }
    }
}

/// A `Write` sink over a shared byte buffer, so tests can inspect what a
/// device emitted.
#[cfg(test)]
pub(crate) struct SharedSink {
    buf: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[cfg(test)]
impl SharedSink {
    pub(crate) fn new(buf: Arc<std::sync::Mutex<Vec<u8>>>) -> Self {
        Self { buf }
    }
}

#[cfg(test)]
impl Write for SharedSink {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
