// Address arithmetic over the fixed-capacity circular region.
//
// The region occupies `capacity` bytes of the medium starting at `base`. The
// first byte persists the bottom-block offset; block storage is the span
// `[start, end)` of `capacity - 1` bytes. All positions are absolute medium
// offsets; chain offsets relative to block storage convert through
// `rel`/`abs`.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Ring {
    base: usize,
    capacity: usize,
}

impl Ring {
    pub fn new(base: usize, capacity: usize) -> Self {
        debug_assert!(capacity >= 2, "region must hold the offset cell plus a block");
        Self { base, capacity }
    }

    /// Medium offset of the persisted bottom-block-offset cell.
    pub fn bottom_cell(&self) -> usize {
        self.base
    }

    /// First byte of block storage.
    pub fn start(&self) -> usize {
        self.base + 1
    }

    /// One past the last byte of block storage.
    pub fn end(&self) -> usize {
        self.base + self.capacity
    }

    /// Bytes available to the block chain.
    pub fn block_capacity(&self) -> usize {
        self.capacity - 1
    }

    /// Maps an address at or past `end` back into block storage.
    pub fn wrap(&self, addr: usize) -> usize {
        debug_assert!(addr < self.end() + self.block_capacity());
        if addr >= self.end() {
            self.start() + (addr - self.end())
        } else {
            addr
        }
    }

    /// True when a span of `len` bytes at `addr` crosses the region end.
    pub fn spans_end(&self, addr: usize, len: usize) -> bool {
        addr + len > self.end()
    }

    /// Chain offset of an absolute address.
    pub fn rel(&self, addr: usize) -> usize {
        debug_assert!(addr >= self.start() && addr < self.end());
        addr - self.start()
    }

    /// Absolute address of a chain offset.
    pub fn abs(&self, offset: usize) -> usize {
        debug_assert!(offset < self.block_capacity());
        self.start() + offset
    }
}
