// Block header codec for the current two-state on-medium format.
//
// One header byte per block: bit 7 is the status (1 = FREE, 0 = USED), bits
// 0-6 hold `payload_len - 1`. The all-zero byte never occurs in a well-formed
// chain and is treated as corruption wherever a header is decoded.
use crate::core::error::{Error, ErrorKind};

pub const HEADER_LEN: usize = 1;
pub const MAX_PAYLOAD: usize = 128;
pub const MIN_PAYLOAD: usize = 1;
pub const MIN_BLOCK_LEN: usize = HEADER_LEN + MIN_PAYLOAD;
pub const MAX_BLOCK_LEN: usize = HEADER_LEN + MAX_PAYLOAD;

// A USED header for a 1-byte payload would encode as the reserved zero byte,
// so records start at 2 bytes. FREE blocks may still carry a 1-byte payload
// (0x81), which keeps the 2-byte minimum block intact for splits.
pub const MIN_RECORD_LEN: usize = 2;

const STATUS_BIT: u8 = 0x80;
const SIZE_BITS: u8 = 0x7f;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BlockStatus {
    Free,
    Used,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub status: BlockStatus,
    pub payload_len: usize,
}

impl BlockHeader {
    pub fn free(payload_len: usize) -> Self {
        Self {
            status: BlockStatus::Free,
            payload_len,
        }
    }

    pub fn used(payload_len: usize) -> Self {
        Self {
            status: BlockStatus::Used,
            payload_len,
        }
    }

    /// Header byte plus payload.
    pub fn block_len(&self) -> usize {
        HEADER_LEN + self.payload_len
    }

    pub fn encode(&self) -> u8 {
        debug_assert!(
            (MIN_PAYLOAD..=MAX_PAYLOAD).contains(&self.payload_len),
            "payload length {} outside size-field range",
            self.payload_len
        );
        let size_field = (self.payload_len - 1) as u8 & SIZE_BITS;
        match self.status {
            BlockStatus::Free => STATUS_BIT | size_field,
            BlockStatus::Used => {
                debug_assert!(
                    self.payload_len >= MIN_RECORD_LEN,
                    "USED payload of 1 byte encodes as the reserved zero byte"
                );
                size_field
            }
        }
    }

    pub fn decode(byte: u8) -> Result<Self, Error> {
        if byte == 0 {
            return Err(Error::new(ErrorKind::InvalidBlockHeader).with_message("zero header byte"));
        }
        let status = if byte & STATUS_BIT != 0 {
            BlockStatus::Free
        } else {
            BlockStatus::Used
        };
        Ok(Self {
            status,
            payload_len: (byte & SIZE_BITS) as usize + 1,
        })
    }
}
