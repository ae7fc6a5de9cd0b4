//! An emulator for the Data General Nova, a 16-bit minicomputer.
//!
//! The Nova has four 16-bit accumulators, a 15-bit program counter, a carry
//! flag, and a programmed-I/O bus with a 16-level priority interrupt mask.
//! This crate emulates the processor, its front-panel console, and a set of
//! character-at-a-time peripherals (teletype, paper tape, real-time clock).
//!
//! # Usage
//!
//! A machine is created with [`Nova::new`] and driven entirely through the
//! console surface, exactly like the physical front panel:
//!
//! ```
//! use nova_emu::{Nova, NovaFlags};
//! use std::time::Duration;
//!
//! let nova = Nova::new(NovaFlags::default());
//!
//! nova.deposit(0o400, 0o063077).unwrap(); // HALT
//! nova.start(0o400);
//!
//! let pc = nova.wait_for_halt(Duration::from_secs(1)).unwrap();
//! assert_eq!(pc, 0o401);
//! ```
//!
//! The processor runs on its own thread; console calls block until the
//! processor acknowledges them, so every call observes a machine that is
//! between instructions. See the [`machine`] module for the full console
//! surface, and [`disasm`] for the instruction-word disassembler used by
//! [`Nova::state`] and [`Nova::trace`].
#![warn(missing_docs)]

pub mod disasm;
pub mod machine;

pub use machine::{Media, Nova, NovaErr, NovaFlags, TraceMode};
