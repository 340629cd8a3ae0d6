//! Raw state dumps.
//!
//! The layout is the host's in-memory layout of [`Registers`] followed by [`ICache`]. It is not
//! versioned and not meant to be moved between builds.
use crate::icache::ICache;
use crate::regs::Registers;
use easyerr::Error;
use zerocopy::{FromBytes, IntoBytes};

pub const STATE_LEN: usize = size_of::<Registers>() + size_of::<ICache>();

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state has {found} bytes, expected {expected}")]
    Length { found: usize, expected: usize },
}

pub fn save(regs: &Registers, icache: &ICache) -> Vec<u8> {
    let mut out = Vec::with_capacity(STATE_LEN);
    out.extend_from_slice(regs.as_bytes());
    out.extend_from_slice(icache.as_bytes());
    out
}

pub fn load(bytes: &[u8]) -> Result<(Registers, ICache), PersistError> {
    if bytes.len() != STATE_LEN {
        return Err(PersistError::Length {
            found: bytes.len(),
            expected: STATE_LEN,
        });
    }

    let (regs, icache) = bytes.split_at(size_of::<Registers>());
    let mut regs = Registers::read_from_bytes(regs)
        .map_err(|_| PersistError::Length {
            found: bytes.len(),
            expected: STATE_LEN,
        })?;
    let icache =
        ICache::read_from_bytes(icache).map_err(|_| PersistError::Length {
            found: bytes.len(),
            expected: STATE_LEN,
        })?;

    regs.normalize();
    Ok((regs, icache))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bounded::{U24, U56};

    #[test]
    fn round_trip() {
        let mut regs = Registers::default();
        regs.a = U56::new(0xAA_ABCD_EF12_3456);
        regs.r[3] = U24::new(0x1234);
        regs.push(U24::new(0x40), U24::new(0xC0_0300));

        let mut icache = ICache::new();
        icache.fetch(0x200);
        icache.lock(0x200);

        let bytes = save(&regs, &icache);
        assert_eq!(bytes.len(), STATE_LEN);

        let (loaded_regs, loaded_icache) = load(&bytes).unwrap();
        assert_eq!(loaded_regs.as_bytes(), regs.as_bytes());
        assert!(loaded_icache.contains(0x200));
        assert!(loaded_icache.is_locked(0x200));
    }

    #[test]
    fn wrong_length() {
        assert!(matches!(
            load(&[0; 3]),
            Err(PersistError::Length { found: 3, .. })
        ));
    }
}
