// Core modules implementing the block chain, recovery, and error modeling.
pub mod block;
pub mod clock;
pub mod commit;
pub mod error;
pub mod fifo;
pub mod legacy;
pub mod medium;
pub mod recover;
pub mod ring;
