// Decoder for the historical three-state on-medium format, kept for reading
// old media. Two status bits (11 FREE, 01 NEW, 00 READ, 10 reserved) and a
// 6-bit size field holding `data_len - 1` with data 1..=64. Not cross-readable
// with the current format; the engine never writes it.
use crate::core::error::{Error, ErrorKind};
use crate::core::medium::Medium;
use crate::core::recover::Cursors;
use crate::core::ring::Ring;

pub const LEGACY_MAX_DATA: usize = 64;

const STATUS_BITS: u8 = 0xc0;
const SIZE_BITS: u8 = 0x3f;
const FREE: u8 = 0xc0;
const NEW: u8 = 0x40;
const READ: u8 = 0x00;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LegacyStatus {
    /// Never pushed, or pushed and then popped.
    Free,
    /// Pushed, not yet read or popped.
    New,
    /// Pushed and read at least once, not popped.
    Read,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LegacyHeader {
    pub status: LegacyStatus,
    pub data_len: usize,
}

impl LegacyHeader {
    pub fn new(status: LegacyStatus, data_len: usize) -> Self {
        Self { status, data_len }
    }

    pub fn block_len(&self) -> usize {
        self.data_len + 1
    }

    pub fn encode(&self) -> u8 {
        debug_assert!((1..=LEGACY_MAX_DATA).contains(&self.data_len));
        let size_field = (self.data_len - 1) as u8 & SIZE_BITS;
        let status = match self.status {
            LegacyStatus::Free => FREE,
            LegacyStatus::New => NEW,
            LegacyStatus::Read => READ,
        };
        status | size_field
    }

    pub fn decode(byte: u8) -> Result<Self, Error> {
        let status = match byte & STATUS_BITS {
            FREE => LegacyStatus::Free,
            NEW => LegacyStatus::New,
            READ => LegacyStatus::Read,
            _ => {
                return Err(Error::new(ErrorKind::InvalidBlockStatus)
                    .with_message("reserved status bit pattern"));
            }
        };
        Ok(Self {
            status,
            data_len: (byte & SIZE_BITS) as usize + 1,
        })
    }
}

/// Cursor reconstruction for legacy media. The legacy format carries no
/// chain-closure or size validation; the walk trusts the size fields and
/// stops at the region end.
pub fn scan(medium: &dyn Medium, ring: Ring) -> Result<Cursors, Error> {
    let bottom = medium.read_byte(ring.bottom_cell()) as usize;
    if bottom >= ring.block_capacity() {
        return Err(Error::new(ErrorKind::InvalidBlockStatus)
            .with_message("bottom-block offset out of range")
            .with_offset(bottom));
    }

    let b0 = ring.abs(bottom);
    let header = read_header(medium, ring, b0)?;

    let mut cursors = Cursors {
        push: b0,
        pop: b0,
        read: b0,
    };
    let mut prev_status = header.status;
    let mut addr = b0 + header.block_len();

    while addr < ring.end() {
        let header = read_header(medium, ring, addr)?;

        match (prev_status, header.status) {
            (LegacyStatus::Free, LegacyStatus::New) => {
                cursors.pop = addr;
                cursors.read = addr;
            }
            (LegacyStatus::Free, LegacyStatus::Read) => {
                cursors.pop = addr;
            }
            (LegacyStatus::Read, LegacyStatus::New) => {
                cursors.read = addr;
            }
            (LegacyStatus::Read, LegacyStatus::Free) => {
                cursors.read = addr;
                cursors.push = addr;
            }
            (LegacyStatus::New, LegacyStatus::Free) => {
                cursors.push = addr;
            }
            (LegacyStatus::New, LegacyStatus::Read) => {
                // Reads always precede later pushes in chain order; a READ
                // block after a NEW run cannot occur in a well-formed chain.
                return Err(Error::new(ErrorKind::InvalidBlockStatusChange)
                    .with_offset(ring.rel(addr)));
            }
            _ => {}
        }
        prev_status = header.status;
        addr += header.block_len();
    }

    Ok(cursors)
}

fn read_header(medium: &dyn Medium, ring: Ring, addr: usize) -> Result<LegacyHeader, Error> {
    LegacyHeader::decode(medium.read_byte(addr)).map_err(|err| err.with_offset(ring.rel(addr)))
}
