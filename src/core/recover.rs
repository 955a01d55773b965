// Cursor reconstruction from the persisted block chain.
//
// Status transitions in chain order are the only durable trace of which
// blocks are logically inside the queue. Walking the chain from the
// bottom-block offset and watching FREE<->USED edges rebuilds all three
// cursors without any persisted pointer, at the cost of an O(blocks) pass.
// No side effects; the scan only reads the medium.
use tracing::debug;

use crate::core::block::{BlockHeader, BlockStatus};
use crate::core::error::{Error, ErrorKind};
use crate::core::medium::Medium;
use crate::core::ring::Ring;

/// Absolute medium addresses of the three volatile cursors.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Cursors {
    pub push: usize,
    pub pop: usize,
    pub read: usize,
}

pub fn scan(medium: &dyn Medium, ring: Ring) -> Result<Cursors, Error> {
    let bottom = medium.read_byte(ring.bottom_cell()) as usize;
    if bottom >= ring.block_capacity() {
        return Err(Error::new(ErrorKind::InvalidBlockHeader)
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
    let mut accumulated = header.block_len();
    let mut addr = b0 + header.block_len();

    // The walk is linear: the last block's payload wraps through the span
    // before B0, so the chain from B0 to the region end covers every block.
    while addr < ring.end() {
        let header = read_header(medium, ring, addr)?;
        accumulated += header.block_len();

        match (prev_status, header.status) {
            (BlockStatus::Free, BlockStatus::Used) => {
                cursors.pop = addr;
                cursors.read = addr;
            }
            (BlockStatus::Used, BlockStatus::Free) => {
                cursors.push = addr;
            }
            _ => {}
        }
        prev_status = header.status;
        addr += header.block_len();
    }

    let wrapped = ring.start() + (addr - ring.end());
    if wrapped != b0 {
        return Err(Error::new(ErrorKind::UnclosedBlockList)
            .with_message("chain does not close on the bottommost block")
            .with_offset(ring.rel(cursors.push)));
    }
    if accumulated != ring.block_capacity() {
        return Err(Error::new(ErrorKind::WrongRbufferSize).with_message(format!(
            "chain spans {accumulated} bytes, region declares {}",
            ring.block_capacity()
        )));
    }

    debug!(
        push = ring.rel(cursors.push),
        pop = ring.rel(cursors.pop),
        read = ring.rel(cursors.read),
        "chain scan complete"
    );
    Ok(cursors)
}

fn read_header(medium: &dyn Medium, ring: Ring, addr: usize) -> Result<BlockHeader, Error> {
    BlockHeader::decode(medium.read_byte(addr)).map_err(|err| err.with_offset(ring.rel(addr)))
}
