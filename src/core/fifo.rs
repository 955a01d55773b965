// Queue engine: formats the region, recovers cursors, and moves records
// through the block chain. All addresses are absolute medium offsets; chain
// offsets appear only at the persistence boundary (bottom-block cell) and in
// diagnostics.
use tracing::{debug, trace};

use crate::core::block::{
    BlockHeader, BlockStatus, HEADER_LEN, MAX_BLOCK_LEN, MAX_PAYLOAD, MIN_BLOCK_LEN,
    MIN_RECORD_LEN,
};
use crate::core::clock::{Clock, SystemClock};
use crate::core::commit::CommitScheduler;
use crate::core::error::{Error, ErrorKind};
use crate::core::medium::Medium;
use crate::core::recover::{self, Cursors};
use crate::core::ring::Ring;

/// Smallest usable block capacity (`C - 1`): room for two minimum blocks.
const MIN_BLOCK_CAPACITY: usize = 4;

#[derive(Clone, Copy, Debug)]
pub struct FifoOptions {
    pub base_offset: usize,
    pub capacity: usize,
    pub commit_period_ms: u64,
}

impl FifoOptions {
    pub fn new(capacity: usize) -> Self {
        Self {
            base_offset: 0,
            capacity,
            commit_period_ms: 0,
        }
    }

    pub fn with_base_offset(mut self, base_offset: usize) -> Self {
        self.base_offset = base_offset;
        self
    }

    pub fn with_commit_period_ms(mut self, commit_period_ms: u64) -> Self {
        self.commit_period_ms = commit_period_ms;
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EngineState {
    /// Constructed but neither formatted nor recovered.
    NotStarted,
    Ready,
    /// A structural error latched; only `format` clears it.
    Poisoned(ErrorKind),
}

#[derive(Debug)]
pub struct Fifo<M: Medium> {
    medium: M,
    ring: Ring,
    scheduler: CommitScheduler,
    cursors: Cursors,
    state: EngineState,
    medium_begun: bool,
}

impl<M: Medium> Fifo<M> {
    pub fn new(medium: M, options: FifoOptions) -> Result<Self, Error> {
        Self::with_clock(medium, options, Box::new(SystemClock::new()))
    }

    pub fn with_clock(
        medium: M,
        options: FifoOptions,
        clock: Box<dyn Clock>,
    ) -> Result<Self, Error> {
        if options.capacity < 1 + MIN_BLOCK_CAPACITY {
            return Err(Error::new(ErrorKind::InvalidFifoBufferSize).with_message(format!(
                "capacity {} cannot hold the offset cell plus {MIN_BLOCK_CAPACITY} block bytes",
                options.capacity
            )));
        }
        if options.base_offset + options.capacity > medium.len() {
            return Err(Error::new(ErrorKind::InvalidFifoBufferSize).with_message(format!(
                "region [{}, {}) exceeds the {}-byte medium",
                options.base_offset,
                options.base_offset + options.capacity,
                medium.len()
            )));
        }

        let ring = Ring::new(options.base_offset, options.capacity);
        let start = ring.start();
        Ok(Self {
            medium,
            ring,
            scheduler: CommitScheduler::new(options.commit_period_ms, clock),
            cursors: Cursors {
                push: start,
                pop: start,
                read: start,
            },
            state: EngineState::NotStarted,
            medium_begun: false,
        })
    }

    /// Destroys any existing chain and reinitializes the region as one run of
    /// maximal free blocks plus a terminating remainder block.
    pub fn format(&mut self) -> Result<(), Error> {
        self.ensure_medium_begun()?;

        self.medium.write_byte(self.ring.bottom_cell(), 0);
        self.tile_free(self.ring.start(), self.ring.block_capacity());

        let start = self.ring.start();
        self.cursors = Cursors {
            push: start,
            pop: start,
            read: start,
        };
        self.state = EngineState::Ready;
        self.scheduler.note_mutation(&mut self.medium)?;
        debug!(capacity = self.ring.block_capacity(), "region formatted");
        Ok(())
    }

    /// Validates the persisted chain and reconstructs the cursors from it.
    pub fn begin(&mut self) -> Result<(), Error> {
        self.ensure_medium_begun()?;
        let result = recover::scan(&self.medium, self.ring);
        match result {
            Ok(cursors) => {
                self.cursors = cursors;
                self.state = EngineState::Ready;
                Ok(())
            }
            Err(err) => Err(self.latch(err)),
        }
    }

    /// Appends a record. Fails with `FifoFull` when the free run cannot cover
    /// it, `RecordSize` when the length is outside the header's range.
    pub fn push(&mut self, record: &[u8]) -> Result<(), Error> {
        self.gate()?;
        let len = record.len();
        if !(MIN_RECORD_LEN..=MAX_PAYLOAD).contains(&len) {
            return Err(Error::new(ErrorKind::RecordSize).with_message(format!(
                "record length {len} outside {MIN_RECORD_LEN}..={MAX_PAYLOAD}"
            )));
        }

        let push = self.cursors.push;
        let header = match self.read_header(push) {
            Ok(header) => header,
            Err(err) => return Err(self.latch(err)),
        };
        if header.status != BlockStatus::Free {
            let err = Error::new(ErrorKind::PushBlockNotFree)
                .with_message("block at the push cursor is not free")
                .with_offset(self.ring.rel(push));
            return Err(self.latch(err));
        }

        let needed = HEADER_LEN + len;
        let merged = match self.allocate(push, header.block_len(), needed) {
            Ok(merged) => merged,
            Err(err) => return Err(self.latch(err)),
        };

        if merged > needed {
            // First-fit forward coalescing can leave a remainder wider than
            // one header can describe; tile it like format does.
            self.tile_free(self.ring.wrap(push + needed), merged - needed);
        }

        self.write_payload(push, record);
        self.medium.write_byte(push, BlockHeader::used(len).encode());
        self.note_block_boundary(push, needed);
        self.cursors.push = self.ring.wrap(push + needed);

        trace!(
            offset = self.ring.rel(push),
            len,
            merged,
            "record pushed"
        );
        self.scheduler.note_mutation(&mut self.medium)
    }

    /// Removes the oldest record into `dst`, returning its length.
    pub fn pop(&mut self, dst: &mut [u8]) -> Result<usize, Error> {
        self.gate()?;
        if self.cursors.pop == self.cursors.push {
            return Err(Error::new(ErrorKind::FifoEmpty));
        }

        let pop = self.cursors.pop;
        let (len, next) = match self.read_data(pop, dst) {
            Ok(out) => out,
            Err(err) => return Err(self.latch(err)),
        };
        self.medium
            .write_byte(pop, BlockHeader::free(len).encode());

        // Peek progress never trails consumption.
        if self.cursors.read == pop {
            self.cursors.read = next;
        }
        self.cursors.pop = next;

        trace!(offset = self.ring.rel(pop), len, "record popped");
        self.scheduler.note_mutation(&mut self.medium)?;
        Ok(len)
    }

    /// Copies the record at the peek cursor into `dst` without consuming it,
    /// returning its length. Peeking is invisible at the storage level.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize, Error> {
        self.gate()?;
        if self.cursors.read == self.cursors.push {
            return Err(Error::new(ErrorKind::FifoEmpty));
        }

        let read = self.cursors.read;
        let (len, next) = match self.read_data(read, dst) {
            Ok(out) => out,
            Err(err) => return Err(self.latch(err)),
        };
        self.cursors.read = next;
        Ok(len)
    }

    /// Rewinds the peek cursor to the oldest record.
    pub fn restart_read(&mut self) {
        self.cursors.read = self.cursors.pop;
    }

    /// Commits pending writes immediately, bounding the batching window.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.scheduler.flush(&mut self.medium)
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.pop == self.cursors.push
    }

    pub fn capacity(&self) -> usize {
        self.ring.block_capacity()
    }

    /// Total payload bytes held by the live records.
    pub fn used_bytes(&self) -> Result<usize, Error> {
        self.gate()?;
        let mut total = 0;
        let mut addr = self.cursors.pop;
        while addr != self.cursors.push {
            let header = self.read_header(addr)?;
            total += header.payload_len;
            addr = self.ring.wrap(addr + header.block_len());
        }
        Ok(total)
    }

    /// Total payload bytes in the free run. Per-block header overhead means a
    /// record may not fit even when shorter than this.
    pub fn free_bytes(&self) -> Result<usize, Error> {
        self.gate()?;
        let mut total = 0;
        let mut addr = self.cursors.push;
        loop {
            let header = self.read_header(addr)?;
            if header.status != BlockStatus::Free {
                break;
            }
            total += header.payload_len;
            addr = self.ring.wrap(addr + header.block_len());
            if addr == self.cursors.push {
                break;
            }
        }
        Ok(total)
    }

    /// Renders the chain for troubleshooting, one block per line.
    pub fn dump(&self) -> Result<String, Error> {
        use std::fmt::Write as _;

        let bottom = self.medium.read_byte(self.ring.bottom_cell()) as usize;
        let mut out = format!(
            "bottom={bottom} push={} pop={} read={}\n",
            self.ring.rel(self.cursors.push),
            self.ring.rel(self.cursors.pop),
            self.ring.rel(self.cursors.read),
        );
        let mut addr = self.ring.abs(bottom.min(self.ring.block_capacity() - 1));
        while addr < self.ring.end() {
            let header = self.read_header(addr)?;
            let _ = writeln!(
                out,
                "block offset={} status={:?} payload_len={}",
                self.ring.rel(addr),
                header.status,
                header.payload_len
            );
            addr += header.block_len();
        }
        Ok(out)
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn into_medium(self) -> M {
        self.medium
    }

    fn gate(&self) -> Result<(), Error> {
        match self.state {
            EngineState::Ready => Ok(()),
            EngineState::NotStarted => Err(Error::new(ErrorKind::InvalidBlockHeader)
                .with_message("queue not recovered; call begin or format first")),
            EngineState::Poisoned(kind) => Err(Error::new(kind)
                .with_message("structural error latched; format the region to recover")),
        }
    }

    fn latch(&mut self, err: Error) -> Error {
        if err.is_fatal() {
            self.state = EngineState::Poisoned(err.kind());
        }
        err
    }

    fn ensure_medium_begun(&mut self) -> Result<(), Error> {
        if !self.medium_begun {
            self.medium.begin(self.ring.end())?;
            self.medium_begun = true;
        }
        Ok(())
    }

    /// First-fit forward coalescing: grows the free run at `push` until it
    /// covers `needed` bytes exactly or leaves a splittable remainder.
    fn allocate(&self, push: usize, first_block_len: usize, needed: usize) -> Result<usize, Error> {
        let mut merged = first_block_len;
        loop {
            if merged >= needed + MIN_BLOCK_LEN {
                return Ok(merged);
            }
            if merged == needed {
                // Exact fit keeps the tiling only when a distinct free block
                // follows to receive the push cursor.
                let next = self.ring.wrap(push + merged);
                if next == push {
                    return Err(Error::new(ErrorKind::FifoFull));
                }
                let header = self.read_header(next)?;
                if header.status != BlockStatus::Free {
                    return Err(Error::new(ErrorKind::FifoFull));
                }
                return Ok(merged);
            }

            let next = self.ring.wrap(push + merged);
            if next == push {
                return Err(Error::new(ErrorKind::FifoFull));
            }
            let header = self.read_header(next)?;
            if header.status != BlockStatus::Free {
                return Err(Error::new(ErrorKind::FifoFull));
            }
            merged += header.block_len();
        }
    }

    /// Lays `total` bytes of free blocks starting at `addr`: maximal blocks,
    /// then one terminal block absorbing the remainder. A would-be 1-byte
    /// remainder steals a byte from the preceding block.
    fn tile_free(&mut self, mut addr: usize, mut total: usize) {
        debug_assert!(total >= MIN_BLOCK_LEN);
        while total > MAX_BLOCK_LEN {
            let mut take = MAX_BLOCK_LEN;
            if total - take == 1 {
                take -= 1;
            }
            self.medium
                .write_byte(addr, BlockHeader::free(take - HEADER_LEN).encode());
            self.note_block_boundary(addr, take);
            addr = self.ring.wrap(addr + take);
            total -= take;
        }
        self.medium
            .write_byte(addr, BlockHeader::free(total - HEADER_LEN).encode());
        self.note_block_boundary(addr, total);
    }

    /// Re-persists the bottom-block offset when a freshly written block spans
    /// or touches the region end, so the scan entry point keeps naming the
    /// first block at or after the physical start.
    fn note_block_boundary(&mut self, addr: usize, block_len: usize) {
        if self.ring.spans_end(addr, block_len) {
            let next = self.ring.wrap(addr + block_len);
            self.medium
                .write_byte(self.ring.bottom_cell(), self.ring.rel(next) as u8);
        } else if addr + block_len == self.ring.end() {
            self.medium.write_byte(self.ring.bottom_cell(), 0);
        }
    }

    fn write_payload(&mut self, block: usize, record: &[u8]) {
        let data_start = block + HEADER_LEN;
        if self.ring.spans_end(data_start, record.len()) {
            let head_len = self.ring.end() - data_start;
            for (i, byte) in record[..head_len].iter().enumerate() {
                self.medium.write_byte(data_start + i, *byte);
            }
            for (i, byte) in record[head_len..].iter().enumerate() {
                self.medium.write_byte(self.ring.start() + i, *byte);
            }
        } else {
            for (i, byte) in record.iter().enumerate() {
                self.medium.write_byte(data_start + i, *byte);
            }
        }
    }

    /// Shared by pop and read: copies the payload at `block` into `dst` and
    /// yields `(payload_len, next_block)`. Leaves all state untouched when
    /// `dst` is too small.
    fn read_data(&self, block: usize, dst: &mut [u8]) -> Result<(usize, usize), Error> {
        let header = self.read_header(block)?;
        let len = header.payload_len;
        if dst.len() < len {
            return Err(Error::new(ErrorKind::DataBufferSmall).with_message(format!(
                "record is {len} bytes, buffer holds {}",
                dst.len()
            )));
        }

        let data_start = block + HEADER_LEN;
        if self.ring.spans_end(data_start, len) {
            let head_len = self.ring.end() - data_start;
            for (i, slot) in dst[..head_len].iter_mut().enumerate() {
                *slot = self.medium.read_byte(data_start + i);
            }
            for (i, slot) in dst[head_len..len].iter_mut().enumerate() {
                *slot = self.medium.read_byte(self.ring.start() + i);
            }
        } else {
            for (i, slot) in dst[..len].iter_mut().enumerate() {
                *slot = self.medium.read_byte(data_start + i);
            }
        }

        Ok((len, self.ring.wrap(block + header.block_len())))
    }

    fn read_header(&self, addr: usize) -> Result<BlockHeader, Error> {
        BlockHeader::decode(self.medium.read_byte(addr))
            .map_err(|err| err.with_offset(self.ring.rel(addr)))
    }
}
