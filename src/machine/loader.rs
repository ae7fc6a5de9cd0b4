//! Bootstrap programs and memory-image decoding.
//!
//! The two loader blobs are constant tables taken from the hardware
//! documentation: the 32-word bootstrap loader that PROGRAM LOAD writes to
//! low core, and the paper-tape binary loader that lives at the top of
//! memory and pulls absolute binary tapes in through the teletype or the
//! tape reader.

use super::device::codes;
use super::{Media, Nova, NovaErr};
use std::io::Read;

/// The PROGRAM LOAD bootstrap, written to locations 0..0o37.
pub(crate) const BOOTSTRAP_LOADER: [u16; 32] = [
    0o062677, // 00000: IORST
    0o060477, // 00001: READS   0
    0o024026, // 00002: LDA     1,26
    0o107400, // 00003: AND     0,1
    0o124000, // 00004: COM     1,1
    0o010014, // 00005: ISZ     14
    0o010030, // 00006: ISZ     30
    0o010032, // 00007: ISZ     32
    0o125404, // 00010: INC     1,1,SZR
    0o000005, // 00011: JMP     5
    0o030016, // 00012: LDA     2,16
    0o050377, // 00013: STA     2,377
    0o060077, // 00014: ; (NIOS 0) - 1
    0o101102, // 00015: MOVL    0,0,SZC
    0o000377, // 00016: JMP     377
    0o004030, // 00017: JSR     30
    0o101065, // 00020: MOVC    0,0,SNR
    0o000017, // 00021: JMP     17
    0o004027, // 00022: JSR     27
    0o046026, // 00023: STA     1,@26
    0o010100, // 00024: ISZ     100
    0o000022, // 00025: JMP     22
    0o000077, // 00026: JMP     77
    0o126420, // 00027: SUBZ    1,1
    0o063577, // 00030: ; (SKPDN 0) - 1
    0o000030, // 00031: JMP     30
    0o060477, // 00032: ; (DIAS 0,0) - 1
    0o107363, // 00033: ADDCS   0,1,SNC
    0o000030, // 00034: JMP     30
    0o125300, // 00035: MOVS    1,1
    0o001400, // 00036: JMP     0,3
    0o000000, // 00037: JMP     0
];

/// Load origin of the paper-tape binary loader.
const BINARY_LOADER_ORIGIN: u16 = 0o77635;

/// Start address of the paper-tape binary loader.
const BINARY_LOADER_START: u16 = 0o77777;

/// The paper-tape binary loader, resident at the top of memory.
pub(crate) const BINARY_LOADER: [u16; 99] = [
    0o177636, // 77635:
    0o054512, // 77636:  STA     3,.+112
    0o004407, // 77637:  JSR     .+7
    0o171300, // 77640:  MOVS    3,2
    0o004405, // 77641:  JSR     .+5
    0o173300, // 77642:  ADDS    3,2
    0o143000, // 77643:  ADD     2,0
    0o002504, // 77644:  JMP     @.+104
    0o000004, // 77645:
    0o054503, // 77646:  STA     3,.+103
    0o034503, // 77647:  LDA     3,.+103
    0o175103, // 77650:  MOVL    3,3,SNC
    0o000405, // 77651:  JMP     .+5
    0o063612, // 77652:  SKPDN   PTR
    0o000777, // 77653:  JMP     .-1
    0o074512, // 77654:  DIAS    3,PTR
    0o002474, // 77655:  JMP     @.+74
    0o063510, // 77656:  SKPBZ   TTI
    0o000777, // 77657:  JMP     .-1
    0o074510, // 77660:  DIAS    3,TTI
    0o002470, // 77661:  JMP     @.+70
    0o062677, // 77662:  IORST
    0o060477, // 77663:  READS   0
    0o040466, // 77664:  STA     0,.+66
    0o060110, // 77665:  NIOS    TTI
    0o060112, // 77666:  NIOS    PTR
    0o004757, // 77667:  JSR     .-21
    0o171305, // 77670:  MOVS    3,2,SNR
    0o000776, // 77671:  JMP     .-2
    0o004754, // 77672:  JSR     .-24
    0o173300, // 77673:  ADDS    3,2
    0o141000, // 77674:  MOV     2,0
    0o145000, // 77675:  MOV     2,1
    0o004740, // 77676:  JSR     .-40
    0o050477, // 77677:  STA     2,.+77
    0o004736, // 77700:  JSR     .-42
    0o125113, // 77701:  MOVL#   1,1,SNC
    0o000426, // 77702:  JMP     .+26
    0o044450, // 77703:  STA     1,.+50
    0o030445, // 77704:  LDA     2,.+45
    0o034740, // 77705:  LDA     3,.-40
    0o172400, // 77706:  SUB     3,2
    0o034467, // 77707:  LDA     3,.+67
    0o136400, // 77710:  SUB     1,3
    0o172023, // 77711:  ADCZ    3,2,SNC
    0o000414, // 77712:  JMP     .+14
    0o030441, // 77713:  LDA     2,.+41
    0o147033, // 77714:  ADDZ#   2,1,SNC
    0o010436, // 77715:  ISZ     .+36
    0o147022, // 77716:  ADDZ    2,1,SZC
    0o125113, // 77717:  MOVL#   1,1,SNC
    0o004716, // 77720:  JSR     .-62
    0o052455, // 77721:  STA     2,@.+55
    0o010454, // 77722:  ISZ     .+54
    0o010430, // 77723:  ISZ     .+30
    0o000773, // 77724:  JMP     .-5
    0o101004, // 77725:  MOV     0,0,SZR
    0o063077, // 77726:  HALT
    0o000740, // 77727:  JMP     .-40
    0o125224, // 77730:  MOVZR   1,1,SZR
    0o000411, // 77731:  JMP     .+11
    0o101004, // 77732:  MOV     0,0,SZR
    0o000773, // 77733:  JMP     .-5
    0o030442, // 77734:  LDA     2,.+42
    0o062677, // 77735:  IORST
    0o151113, // 77736:  MOVL#   2,2,SNC
    0o001000, // 77737:  JMP     0,2
    0o063077, // 77740:  HALT
    0o000777, // 77741:  JMP     .-1
    0o004704, // 77742:  JSR     .-74
    0o020404, // 77743:  LDA     0,.+4
    0o116404, // 77744:  SUB     0,3,SZR
    0o000775, // 77745:  JMP     .-3
    0o000721, // 77746:  JMP     .-57
    0o000377, // 77747:
    0o000000, // 77750:
    0o000000, // 77751:
    0o000000, // 77752:
    0o000000, // 77753:
    0o000020, // 77754:
    0o000000, // 77755:
    0o000000, // 77756:
    0o000000, // 77757:
    0o000000, // 77760:
    0o000000, // 77761:
    0o000000, // 77762:
    0o000000, // 77763:
    0o000000, // 77764:
    0o000000, // 77765:
    0o000000, // 77766:
    0o000000, // 77767:
    0o000000, // 77770:
    0o000000, // 77771:
    0o000000, // 77772:
    0o000000, // 77773:
    0o000000, // 77774:
    0o000000, // 77775:
    0o000000, // 77776:
    0o000663, // 77777:  JMP     .-115
];

/// Decodes a raw memory-image file: a sequence of 16-bit little-endian
/// words, addresses implied by position. Fails on an odd byte count.
pub fn decode_image(bytes: &[u8]) -> Result<Vec<u16>, NovaErr> {
    if bytes.len() % 2 != 0 {
        return Err(NovaErr::BadImage(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

impl Nova {
    /// Writes the paper-tape binary loader into the top of memory and
    /// returns its start address.
    pub fn load_binary_loader(&self) -> Result<u16, NovaErr> {
        self.load_memory(BINARY_LOADER_ORIGIN, &BINARY_LOADER)?;
        Ok(BINARY_LOADER_START)
    }

    /// Loads an absolute binary tape through the teletype or the paper-tape
    /// reader using the resident binary loader. The loaded program may halt
    /// or auto-start depending on its start block; callers should check
    /// [`Nova::is_running`] afterwards.
    pub fn load_absolute_binary(
        &self,
        dev: u16,
        media: impl Read + Send + 'static,
    ) -> Result<(), NovaErr> {
        match dev {
            codes::TTI => self.switches(0o000000),
            codes::PTR => self.switches(0o100000),
            _ => return Err(NovaErr::WrongMedia(dev)),
        }
        self.attach(dev, Media::reader(media))?;
        let start = self.load_binary_loader()?;
        self.start(start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_image_rejects_odd_lengths() {
        assert!(matches!(decode_image(&[1, 2, 3]), Err(NovaErr::BadImage(3))));
    }

    #[test]
    fn decode_image_reads_little_endian_words() {
        let words = decode_image(&[0x77, 0o0, 0x00, 0x80]).unwrap();
        assert_eq!(words, vec![0x0077, 0x8000]);
    }

    #[test]
    fn bootstrap_loader_is_one_page() {
        assert_eq!(BOOTSTRAP_LOADER.len(), 0o40);
        assert_eq!(BOOTSTRAP_LOADER[0], 0o062677); // IORST
        assert_eq!(BOOTSTRAP_LOADER[0o30], 0o063577);
    }

    #[test]
    fn binary_loader_reaches_top_of_memory() {
        assert_eq!(
            BINARY_LOADER_ORIGIN as usize + BINARY_LOADER.len() - 1,
            0o77777
        );
        assert_eq!(BINARY_LOADER[BINARY_LOADER.len() - 1], 0o000663);
    }
}
