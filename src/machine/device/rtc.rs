//! The real-time clock.
//!
//! The clock has no host media and no data buffer. A DOA selects one of four
//! tick rates from the low two bits of the accumulator: the AC power-line
//! frequency, 10 Hz, 100 Hz, or 1 kHz. Its ticker free-runs; while the
//! device is Busy each tick completes the frame and requests an interrupt,
//! so a program that restarts the clock from its interrupt handler sees a
//! steady pulse train.

use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Receiver};

use super::super::interrupt::IntrArbiter;
use super::{Command, Controller, DeviceHandle, IoOp, MediaKind};
use std::sync::Arc;

/// Spawns the clock controller. `line_freq` is the emulated power-line
/// frequency; anything other than 50 or 60 falls back to 60.
pub(crate) fn spawn(
    code: u16,
    priority: u16,
    line_freq: u32,
    arbiter: Arc<IntrArbiter>,
) -> DeviceHandle {
    let line = match line_freq {
        50 | 60 => line_freq,
        _ => 60,
    };
    let (tx, rx) = bounded(0);
    let ctrl = Controller::new(code, arbiter);
    std::thread::Builder::new()
        .name(format!("nova-dev-{code:02o}"))
        .spawn(move || rtc_loop(ctrl, rx, line))
        .expect("spawn device thread");
    DeviceHandle::new(code, priority, MediaKind::None, tx)
}

fn rtc_loop(mut ctrl: Controller, cmds: Receiver<Command>, line: u32) {
    let periods = [
        Duration::from_secs_f64(1.0 / f64::from(line)),
        Duration::from_millis(100),
        Duration::from_millis(10),
        Duration::from_millis(1),
    ];
    let mut ticker = tick(periods[0]);
    loop {
        select! {
            recv(cmds) -> msg => {
                let Ok(cmd) = msg else { return };
                match cmd {
                    Command::Io { op, flag, data, reply } => {
                        if op == IoOp::Doa {
                            ticker = tick(periods[usize::from(data & 3)]);
                        }
                        ctrl.apply(flag);
                        let _ = reply.send(0);
                    }
                    Command::Test { test, reply } => {
                        let _ = reply.send(ctrl.test(test));
                    }
                    Command::Reset { reply } => {
                        ticker = tick(periods[0]);
                        ctrl.idle();
                        let _ = reply.send(());
                    }
                    Command::Attach { media: _, reply } => {
                        // The clock takes no media; the console rejects this
                        // before it can be sent.
                        let _ = reply.send(());
                    }
                }
            }
            recv(ticker) -> _ => ctrl.complete(),
        }
    }
}
