use dsp56k::{Ins, U24};
use eyre_pretty::{Result, bail};

fn is_hex_text(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .all(|b| b.is_ascii_hexdigit() || b.is_ascii_whitespace())
}

fn hex_digit(byte: u8) -> u32 {
    match byte {
        b'0'..=b'9' => (byte - b'0') as u32,
        b'a'..=b'f' => (byte - b'a' + 10) as u32,
        _ => (byte - b'A' + 10) as u32,
    }
}

/// Reads program words from either ASCII hex (six digits per word, whitespace ignored) or raw
/// 3-byte words.
pub fn parse_words(bytes: &[u8], little_endian: bool) -> Result<Vec<U24>> {
    if !bytes.is_empty() && is_hex_text(bytes) {
        let digits = bytes
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect::<Vec<_>>();

        if digits.len() % 6 != 0 {
            bail!(
                "hex input has {} digits, which is not a multiple of six",
                digits.len()
            );
        }

        let words = digits
            .chunks_exact(6)
            .map(|chunk| {
                let value = chunk
                    .iter()
                    .fold(0, |acc, &digit| (acc << 4) | hex_digit(digit));
                U24::new(value)
            })
            .collect();

        return Ok(words);
    }

    if bytes.len() % 3 != 0 {
        bail!(
            "binary input has {} bytes, which is not a multiple of three",
            bytes.len()
        );
    }

    let words = bytes
        .chunks_exact(3)
        .map(|triplet| {
            let value = if little_endian {
                u32::from_le_bytes([triplet[0], triplet[1], triplet[2], 0])
            } else {
                u32::from_be_bytes([0, triplet[0], triplet[1], triplet[2]])
            };

            U24::new(value)
        })
        .collect();

    Ok(words)
}

/// One line per instruction, starting at address zero. Words that do not decode are emitted as
/// data.
pub fn disassemble(words: &[U24]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut index = 0;
    while let Some(&word) = words.get(index) {
        let ext = words.get(index + 1).copied().unwrap_or(U24::ZERO);
        match Ins::new(word, ext) {
            Ok(ins) if ins.len() == 2 => {
                lines.push(format!("{index:06X}  {word} {ext}  {ins}"));
                index += 2;
            }
            Ok(ins) => {
                lines.push(format!("{index:06X}  {word}         {ins}"));
                index += 1;
            }
            Err(e) => {
                lines.push(format!("{index:06X}  {word}         dc ${word} ; {e}"));
                index += 1;
            }
        }
    }

    lines
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hex_input() {
        let words = parse_words(b"000000 0c0040\n20 0013\n", false).unwrap();
        assert_eq!(
            words,
            vec![U24::new(0), U24::new(0x0C_0040), U24::new(0x20_0013)]
        );

        assert!(parse_words(b"00000", false).is_err());
    }

    #[test]
    fn binary_input() {
        let bytes = [0x0C, 0x00, 0x40, 0xFF, 0x00, 0x01];
        let words = parse_words(&bytes, false).unwrap();
        assert_eq!(words, vec![U24::new(0x0C_0040), U24::new(0xFF_0001)]);

        let words = parse_words(&bytes, true).unwrap();
        assert_eq!(words, vec![U24::new(0x40_000C), U24::new(0x01_00FF)]);

        assert!(parse_words(&bytes[..4], false).is_err());
    }

    #[test]
    fn one_line_per_instruction() {
        // nop, do #3,$3, clr a, illegal word
        let words = [0x00_0000, 0x06_0380, 0x00_0003, 0x20_0013, 0x20_0008].map(U24::new);
        let lines = disassemble(&words);

        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("nop"));
        assert!(lines[1].starts_with("000001  060380 000003"));
        assert!(lines[2].starts_with("000003"));
        assert!(lines[3].contains("dc $200008"));
    }
}
