//! Loader for the textual program image format.
//!
//! ```text
//! _DATA P 0000
//! 0C0040 000000
//! _DATA L 0010
//! 123456 654321
//! _SYMBOL P
//! start I 000000
//! _END 0000
//! ```
use crate::bounded::U24;
use crate::mem::Space;
use easyerr::Error;

/// Destination of a data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Space(Space),
    /// X:Y pairs at the same address.
    Long,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub target: Target,
    pub addr: u32,
    pub words: Vec<U24>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    pub sections: Vec<Section>,
    /// Start address given by the `_END` record.
    pub entry: Option<u32>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("line {line}: unknown record {record:?}")]
    Record { line: usize, record: String },
    #[error("line {line}: unknown memory space {space:?}")]
    Space { line: usize, space: String },
    #[error("line {line}: invalid address {text:?}")]
    Address { line: usize, text: String },
    #[error("line {line}: invalid word {text:?}")]
    Word { line: usize, text: String },
    #[error("line {line}: data outside of a data section")]
    Orphan { line: usize },
    #[error("line {line}: odd amount of words in a long section")]
    Pair { line: usize },
}

fn parse_hex(text: &str) -> Option<u32> {
    if text.is_empty() || text.len() > 6 {
        return None;
    }

    u32::from_str_radix(text, 16).ok()
}

enum State {
    Idle,
    Data,
    Symbols,
}

impl Image {
    pub fn parse(text: &str) -> Result<Self, LoadError> {
        let mut image = Image::default();
        let mut state = State::Idle;

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let mut tokens = raw.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };

            if let Some(record) = first.strip_prefix('_') {
                match record {
                    "DATA" => {
                        let space = tokens.next().unwrap_or_default();
                        let target = match space {
                            "P" => Target::Space(Space::P),
                            "X" => Target::Space(Space::X),
                            "Y" => Target::Space(Space::Y),
                            "L" => Target::Long,
                            _ => {
                                return Err(LoadError::Space {
                                    line,
                                    space: space.to_owned(),
                                });
                            }
                        };

                        let addr = tokens.next().unwrap_or_default();
                        let addr = parse_hex(addr).ok_or_else(|| LoadError::Address {
                            line,
                            text: addr.to_owned(),
                        })?;

                        image.sections.push(Section {
                            target,
                            addr,
                            words: Vec::new(),
                        });
                        state = State::Data;
                    }
                    "SYMBOL" => state = State::Symbols,
                    "END" => {
                        image.entry = tokens.next().and_then(parse_hex);
                        break;
                    }
                    _ => {
                        return Err(LoadError::Record {
                            line,
                            record: first.to_owned(),
                        });
                    }
                }

                continue;
            }

            match state {
                State::Symbols => (),
                State::Idle => return Err(LoadError::Orphan { line }),
                State::Data => {
                    let Some(section) = image.sections.last_mut() else {
                        return Err(LoadError::Orphan { line });
                    };

                    for token in std::iter::once(first).chain(tokens) {
                        let word = parse_hex(token).ok_or_else(|| LoadError::Word {
                            line,
                            text: token.to_owned(),
                        })?;

                        section.words.push(U24::new(word));
                    }

                    if section.target == Target::Long && section.words.len() % 2 != 0 {
                        return Err(LoadError::Pair { line });
                    }
                }
            }
        }

        Ok(image)
    }

    /// Calls `write` for every word in the image.
    pub fn for_each_word(&self, mut write: impl FnMut(Space, U24, U24)) {
        for section in &self.sections {
            match section.target {
                Target::Space(space) => {
                    for (offset, &word) in section.words.iter().enumerate() {
                        write(space, U24::new(section.addr + offset as u32), word);
                    }
                }
                Target::Long => {
                    for (offset, pair) in section.words.chunks_exact(2).enumerate() {
                        let addr = U24::new(section.addr + offset as u32);
                        write(Space::X, addr, pair[0]);
                        write(Space::Y, addr, pair[1]);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const IMAGE: &str = "\
_DATA P 0000
0C0040 000000
200013
_DATA L 0010
123456 654321
_SYMBOL P
start I 000000
_END 0040
_DATA P 0100
ignored
";

    #[test]
    fn parses_sections() {
        let image = Image::parse(IMAGE).unwrap();
        assert_eq!(image.entry, Some(0x40));
        assert_eq!(image.sections.len(), 2);
        assert_eq!(image.sections[0].words.len(), 3);

        let mut writes = Vec::new();
        image.for_each_word(|space, addr, word| writes.push((space, addr.value(), word.value())));
        assert_eq!(
            writes,
            vec![
                (Space::P, 0, 0x0C_0040),
                (Space::P, 1, 0),
                (Space::P, 2, 0x20_0013),
                (Space::X, 0x10, 0x12_3456),
                (Space::Y, 0x10, 0x65_4321),
            ]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            Image::parse("_DATA Q 0000"),
            Err(LoadError::Space { line: 1, .. })
        ));
        assert!(matches!(
            Image::parse("_DATA P 0000\nZZZZZZ"),
            Err(LoadError::Word { line: 2, .. })
        ));
        assert!(matches!(
            Image::parse("000000"),
            Err(LoadError::Orphan { line: 1 })
        ));
        assert!(matches!(
            Image::parse("_DATA L 0000\n000001"),
            Err(LoadError::Pair { line: 2 })
        ));
    }
}
