//! Disassemble a Nova memory-image file to stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use nova_emu::disasm;
use nova_emu::machine::loader::decode_image;

#[derive(Parser)]
#[command(name = "novadis", about = "Disassemble a Nova memory image")]
struct Args {
    /// Memory-image file: 16-bit little-endian words, addresses implied by
    /// position.
    image: PathBuf,

    /// Octal load origin of the image.
    #[arg(short, long, default_value = "0", value_parser = parse_octal)]
    origin: u16,
}

fn parse_octal(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s, 8).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let bytes = match std::fs::read(&args.image) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("novadis: {}: {e}", args.image.display());
            return ExitCode::FAILURE;
        }
    };
    let words = match decode_image(&bytes) {
        Ok(words) => words,
        Err(e) => {
            eprintln!("novadis: {}: {e}", args.image.display());
            return ExitCode::FAILURE;
        }
    };

    print!("{}", disasm::block(&words, args.origin));
    ExitCode::SUCCESS
}
