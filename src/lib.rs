//! Purpose: Persistent FIFO queues of variable-size records over raw
//! byte-addressable storage (EEPROM, flash, or plain RAM).
//! Exports: `core` (block codec, media, recovery, queue engine, errors) and
//! re-exports of the types most callers need.
//! Invariants: The block chain plus one offset byte are the only durable
//! state; cursors are rebuilt from the chain at startup.
//! Invariants: Every operation returns a result code; non-test code never
//! panics on medium contents.
pub mod core;

pub use crate::core::clock::{Clock, FakeClock, SystemClock};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::fifo::{Fifo, FifoOptions};
pub use crate::core::medium::{Medium, MmapMedium, RamMedium};
