use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

/// Result codes for every queue operation. No operation panics or throws;
/// each failure maps to exactly one of these.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Pop/read on an empty (or fully peeked) queue. Steady-state, expected.
    FifoEmpty,
    /// Not enough free space for the record. Steady-state, expected.
    FifoFull,
    /// Region too small to hold at least one valid block.
    InvalidFifoBufferSize,
    /// A block header read back as zero or otherwise undecodable.
    InvalidBlockHeader,
    /// Caller buffer shorter than the stored record.
    DataBufferSmall,
    /// Record length outside the pushable range (2..=128).
    RecordSize,
    /// The block at the push cursor did not read FREE.
    PushBlockNotFree,
    /// The chain walk did not land back on the bottommost block.
    UnclosedBlockList,
    /// Accumulated block sizes disagree with the declared capacity.
    WrongRbufferSize,
    /// Legacy format only: reserved status bit pattern observed.
    InvalidBlockStatus,
    /// Legacy format only: NEW block followed a READ block in chain order.
    InvalidBlockStatusChange,
    /// Medium-level failure (open, map, lock, flush).
    Io,
}

impl ErrorKind {
    /// Structural-integrity codes poison the instance: the persisted chain is
    /// inconsistent and the engine refuses push/pop/read until re-formatted.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidBlockHeader
                | ErrorKind::PushBlockNotFree
                | ErrorKind::UnclosedBlockList
                | ErrorKind::WrongRbufferSize
                | ErrorKind::InvalidBlockStatus
                | ErrorKind::InvalidBlockStatusChange
        )
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    offset: Option<usize>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            offset: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(offset) = self.offset {
            write!(f, " (offset: {offset})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}
