//! Nova instruction-word disassembler.
//!
//! [`word`] is a pure function from a 16-bit instruction word to its
//! assembly mnemonic, so it can be shared freely by the console's state
//! line, traces, and block dumps without any locking. [`block`] formats a
//! memory region one word per line.

use std::fmt::Write;

/// Arithmetic/logic operation mnemonics.
const AL_OP: [&str; 8] = ["COM", "NEG", "MOV", "INC", "ADC", "SUB", "ADD", "AND"];

/// Shift mnemonics.
const AL_SH: [&str; 4] = ["", "L", "R", "S"];

/// Carry-source mnemonics.
const AL_C: [&str; 4] = ["", "Z", "O", "C"];

/// Skip-condition mnemonics.
const AL_SKIP: [&str; 8] = ["", "SKP", "SZC", "SNC", "SZR", "SNR", "SEZ", "SBN"];

/// Memory reference without accumulator.
const MR0_OP: [&str; 4] = ["JMP", "JSR", "ISZ", "DSZ"];

/// I/O transfer operations.
const IO_OP: [&str; 8] = ["NIO", "DIA", "DOA", "DIB", "DOB", "DIC", "DOC", "SKP"];

/// I/O control-flag mnemonics.
const IO_F: [&str; 4] = ["", "S", "C", "P"];

/// I/O skip-condition mnemonics.
const IO_T: [&str; 4] = ["BN", "BZ", "DN", "DZ"];

/// Device-code mnemonics.
const IO_D: [&str; 64] = [
    "0", "MDV", "MMU", "MMU1", "4", "5", "MCAT", "MCAR", // 00-07
    "TTI", "TTO", "PTR", "PTP", "RTC", "PLT", "CDR", "LPT", // 10-17
    "DSK", "ADCV", "MTA", "DACV", "DCM", "25", "26", "27", // 20-27
    "QTY", "IBM1", "IBM2", "DKP", "CAS", "CRC", "IPB", "IVT", // 30-37
    "DPI", "DPO", "DIO", "DIOT", "MXM", "45", "MCAT1", "MCAR1", // 40-47
    "TTI1", "TTO1", "PTR1", "PTP1", "RTC1", "PLT1", "CDR1", "LPT1", // 50-57
    "DSK1", "ADCV1", "MTA1", "DACV1", "FPU1", "FPU2", "FPU", "67", // 60-67
    "QTY1", "71", "72", "DKP1", "FPU1", "FPU2", "FPU", "CPU", // 70-77
];

/// The mnemonic for a device code.
pub fn device_name(code: u16) -> &'static str {
    IO_D[usize::from(code & 0o77)]
}

/// Formats a signed 8-bit displacement in octal, optionally forcing a sign
/// for the `.+n` relative notation.
fn signed_octal(disp: i8, force_sign: bool) -> String {
    match (disp < 0, force_sign) {
        (true, _) => format!("-{:o}", -i16::from(disp)),
        (false, true) => format!("+{:o}", disp),
        (false, false) => format!("{:o}", disp),
    }
}

/// Disassembles one instruction word.
pub fn word(ir: u16) -> String {
    let mut operator = String::new();
    let mut operands = String::new();

    if ir & 0o100000 != 0 {
        // Arithmetic/logic
        let acs = (ir & 0o060000) >> 13;
        let acd = (ir & 0o014000) >> 11;
        let op = (ir & 0o003400) >> 8;
        let sh = (ir & 0o000300) >> 6;
        let c = (ir & 0o000060) >> 4;
        let skip = ir & 0o000007;

        operator.push_str(AL_OP[usize::from(op)]);
        operator.push_str(AL_C[usize::from(c)]);
        operator.push_str(AL_SH[usize::from(sh)]);
        if ir & 0o000010 != 0 {
            operator.push('#'); // no load
        }
        let _ = write!(operands, "{acs:o},{acd:o}");
        if skip != 0 {
            let _ = write!(operands, ",{}", AL_SKIP[usize::from(skip)]);
        }
    } else if ir & 0o060000 == 0o060000 {
        // I/O transfer
        let acc = (ir & 0o014000) >> 11;
        let op = (ir & 0o003400) >> 8;
        let f = (ir & 0o000300) >> 6;
        let device = ir & 0o000077;

        if device == 0o77 {
            // CPU pseudo-device; common abbreviations first.
            match ir {
                0o062677 => operator.push_str("IORST"),
                0o060177 => operator.push_str("INTEN"),
                0o060277 => operator.push_str("INTDS"),
                0o063077 => operator.push_str("HALT"),
                _ => {
                    if f == 0 {
                        match op {
                            1 => operator.push_str("READS"),
                            3 => operator.push_str("INTA"),
                            4 => operator.push_str("MSKO"),
                            _ => {}
                        }
                        if !operator.is_empty() {
                            let _ = write!(operands, "{acc:o}");
                        }
                    }
                }
            }
        } else if device == 0o01 {
            match ir {
                0o073301 => operator.push_str("MUL"),
                0o073101 => operator.push_str("DIV"),
                _ => {}
            }
        }

        if operator.is_empty() {
            // Not abbreviated; use the long format.
            operator.push_str(IO_OP[usize::from(op)]);
            if op == 7 {
                operator.push_str(IO_T[usize::from(f)]);
            } else {
                operator.push_str(IO_F[usize::from(f)]);
            }
            if op == 0 || op == 7 {
                // NIO and SKP take no accumulator.
                operands.push_str(device_name(device));
            } else {
                let _ = write!(operands, "{acc:o},{}", device_name(device));
            }
        }
    } else {
        // Memory reference
        if ir & 0o060000 == 0 {
            let op = (ir & 0o014000) >> 11;
            operator.push_str(MR0_OP[usize::from(op)]);
        } else {
            let acc = (ir & 0o014000) >> 11;
            operator.push_str(match (ir & 0o060000) >> 13 {
                1 => "LDA",
                _ => "STA",
            });
            let _ = write!(operands, "{acc:o},");
        }

        let index = (ir & 0o001400) >> 8;
        let disp = ir & 0o000377;

        if ir & 0o002000 != 0 {
            operands.push('@');
        }
        match index {
            0 => {
                let _ = write!(operands, "{disp:o}"); // page zero
            }
            1 => {
                let _ = write!(operands, ".{}", signed_octal(disp as u8 as i8, true));
            }
            2 => {
                let _ = write!(operands, "{},2", signed_octal(disp as u8 as i8, false));
            }
            _ => {
                let _ = write!(operands, "{},3", signed_octal(disp as u8 as i8, false));
            }
        }
    }

    format!("{operator:<8}{operands}")
}

/// Disassembles a block of words, one line per word, addresses starting at
/// `origin`.
pub fn block(words: &[u16], origin: u16) -> String {
    let mut out = String::new();
    for (i, &w) in words.iter().enumerate() {
        let addr = origin.wrapping_add(i as u16);
        let _ = writeln!(out, "{addr:05o} {w:06o}  {}", word(w));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_abbreviations() {
        assert_eq!(word(0o062677).trim_end(), "IORST");
        assert_eq!(word(0o063077).trim_end(), "HALT");
        assert_eq!(word(0o060177).trim_end(), "INTEN");
        assert_eq!(word(0o060277).trim_end(), "INTDS");
        assert_eq!(word(0o060477), "READS   0");
        assert_eq!(word(0o065477), "INTA    1");
        assert_eq!(word(0o062077), "MSKO    0");
    }

    #[test]
    fn mdv_abbreviations() {
        assert_eq!(word(0o073301).trim_end(), "MUL");
        assert_eq!(word(0o073101).trim_end(), "DIV");
    }

    #[test]
    fn io_long_forms() {
        assert_eq!(word(0o063610), "SKPDN   TTI");
        assert_eq!(word(0o060110), "NIOS    TTI");
        assert_eq!(word(0o064510), "DIAS    1,TTI");
        assert_eq!(word(0o065111), "DOAS    1,TTO");
    }

    #[test]
    fn memory_reference_forms() {
        assert_eq!(word(0o000777), "JMP     .-1");
        assert_eq!(word(0o004417), "JSR     .+17");
        assert_eq!(word(0o000401), "JMP     .+1");
        assert_eq!(word(0o010050), "ISZ     50");
        assert_eq!(word(0o022020), "LDA     0,@20");
        assert_eq!(word(0o050377), "STA     2,377");
        assert_eq!(word(0o025377), "LDA     1,-1,2");
        assert_eq!(word(0o001400), "JMP     0,3");
    }

    #[test]
    fn alc_forms() {
        assert_eq!(word(0o125404), "INC     1,1,SZR");
        assert_eq!(word(0o125300), "MOVS    1,1");
        assert_eq!(word(0o106415), "SUB#    0,1,SNR");
        assert_eq!(word(0o101102), "MOVL    0,0,SZC");
        assert_eq!(word(0o126420), "SUBZ    1,1");
    }

    #[test]
    fn block_prefixes_address_and_word() {
        let out = block(&[0o000401, 0o063077], 0o400);
        let mut lines = out.lines();
        assert_eq!(lines.next().unwrap(), "00400 000401  JMP     .+1");
        assert_eq!(lines.next().unwrap().trim_end(), "00401 063077  HALT");
    }
}
