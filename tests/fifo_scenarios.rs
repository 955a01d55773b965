// End-to-end queue behavior over an in-memory medium: ordering, boundaries,
// wraparound, and cursor recovery from persisted bytes.
use std::collections::VecDeque;

use ferroq::{ErrorKind, Fifo, FifoOptions, RamMedium};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

fn formatted(capacity: usize) -> Fifo<RamMedium> {
    init_tracing();
    let mut fifo =
        Fifo::new(RamMedium::new(capacity), FifoOptions::new(capacity)).expect("construct");
    fifo.format().expect("format");
    fifo
}

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next_u64() % max as u64) as usize
    }
}

#[test]
fn example_scenario_in_a_20_byte_region() {
    let mut fifo = formatted(20);
    fifo.push(b"AB").expect("push AB");
    fifo.push(b"CDE").expect("push CDE");

    let mut buf = [0u8; 8];
    let len = fifo.pop(&mut buf).expect("pop AB");
    assert_eq!(&buf[..len], b"AB");
    let len = fifo.pop(&mut buf).expect("pop CDE");
    assert_eq!(&buf[..len], b"CDE");
    assert_eq!(
        fifo.pop(&mut buf).expect_err("drained").kind(),
        ErrorKind::FifoEmpty
    );
}

#[test]
fn records_come_back_in_push_order() {
    let mut fifo = formatted(256);
    let records: Vec<Vec<u8>> = (0u8..10)
        .map(|i| vec![i; 3 + i as usize])
        .collect();
    for record in &records {
        fifo.push(record).expect("push");
    }

    let mut buf = [0u8; 32];
    for record in &records {
        let len = fifo.pop(&mut buf).expect("pop");
        assert_eq!(&buf[..len], record.as_slice());
    }
    assert!(fifo.is_empty());
}

#[test]
fn full_queue_recovers_space_after_a_pop() {
    let mut fifo = formatted(64);
    let record = [0x42u8; 10];

    let mut accepted = 0;
    loop {
        match fifo.push(&record) {
            Ok(()) => accepted += 1,
            Err(err) => {
                assert_eq!(err.kind(), ErrorKind::FifoFull);
                break;
            }
        }
        assert!(accepted <= 6, "queue accepted more than its capacity");
    }
    assert_eq!(accepted, 5);

    let mut buf = [0u8; 16];
    fifo.pop(&mut buf).expect("pop");
    fifo.push(&record).expect("push after pop");
}

#[test]
fn empty_boundary_modifies_no_header() {
    let mut fifo = formatted(32);
    let before = fifo.medium().as_slice().to_vec();

    let mut buf = [0u8; 8];
    assert_eq!(
        fifo.pop(&mut buf).expect_err("pop").kind(),
        ErrorKind::FifoEmpty
    );
    assert_eq!(
        fifo.read(&mut buf).expect_err("read").kind(),
        ErrorKind::FifoEmpty
    );
    assert_eq!(fifo.medium().as_slice(), before.as_slice());
}

#[test]
fn undersized_buffer_modifies_no_header_or_cursor() {
    let mut fifo = formatted(32);
    fifo.push(b"abcdefgh").expect("push");
    let before = fifo.medium().as_slice().to_vec();

    let mut small = [0u8; 4];
    assert_eq!(
        fifo.pop(&mut small).expect_err("pop").kind(),
        ErrorKind::DataBufferSmall
    );
    assert_eq!(fifo.medium().as_slice(), before.as_slice());

    let mut buf = [0u8; 8];
    let len = fifo.pop(&mut buf).expect("pop still first record");
    assert_eq!(&buf[..len], b"abcdefgh");
}

#[test]
fn wrapped_record_round_trips_and_moves_the_bottom_offset() {
    let mut fifo = formatted(20);
    fifo.push(b"0123456789").expect("push filler");

    let mut buf = [0u8; 16];
    fifo.pop(&mut buf).expect("pop filler");

    // The next record starts near the region end and wraps through it.
    fifo.push(b"abcdefghijkl").expect("push wrapped");
    assert_eq!(
        fifo.medium().as_slice()[0],
        5,
        "bottom-block offset should name the first block past the wrap"
    );

    let len = fifo.pop(&mut buf).expect("pop wrapped");
    assert_eq!(&buf[..len], b"abcdefghijkl");
}

#[test]
fn recovery_reproduces_the_live_queue() {
    let mut fifo = formatted(20);
    fifo.push(b"0123456789").expect("push filler");
    let mut buf = [0u8; 16];
    fifo.pop(&mut buf).expect("pop filler");
    fifo.push(b"abcdefghijkl").expect("push wrapped");
    fifo.push(b"xy").expect("push second");

    let bytes = fifo.medium().as_slice().to_vec();
    let mut recovered =
        Fifo::new(RamMedium::from_bytes(bytes), FifoOptions::new(20)).expect("construct");
    recovered.begin().expect("begin");

    let len = recovered.pop(&mut buf).expect("pop wrapped");
    assert_eq!(&buf[..len], b"abcdefghijkl");
    let len = recovered.pop(&mut buf).expect("pop second");
    assert_eq!(&buf[..len], b"xy");
    assert!(recovered.is_empty());
}

#[test]
fn restart_read_rewinds_peeking_only() {
    let mut fifo = formatted(64);
    fifo.push(b"first").expect("push");
    fifo.push(b"second").expect("push");

    let mut buf = [0u8; 8];
    fifo.read(&mut buf).expect("peek first");
    fifo.read(&mut buf).expect("peek second");
    fifo.restart_read();

    let len = fifo.read(&mut buf).expect("peek first again");
    assert_eq!(&buf[..len], b"first");

    // Peeking left the stored queue untouched.
    let len = fifo.pop(&mut buf).expect("pop");
    assert_eq!(&buf[..len], b"first");
    let len = fifo.pop(&mut buf).expect("pop");
    assert_eq!(&buf[..len], b"second");
}

#[test]
fn prop_recovery_is_idempotent_across_random_workloads() {
    for seed in [3u64, 17, 71, 2026] {
        let mut rng = XorShift64::new(seed);
        let mut fifo = formatted(96);
        let mut expected: VecDeque<Vec<u8>> = VecDeque::new();
        let mut stamp = 0u8;
        let mut buf = [0u8; 32];

        for _ in 0..300 {
            if rng.next_range(3) < 2 {
                let len = 2 + rng.next_range(19);
                stamp = stamp.wrapping_add(1);
                let record = vec![stamp; len];
                match fifo.push(&record) {
                    Ok(()) => expected.push_back(record),
                    Err(err) => assert_eq!(err.kind(), ErrorKind::FifoFull, "seed {seed}"),
                }
            } else {
                match fifo.pop(&mut buf) {
                    Ok(len) => {
                        let record = expected.pop_front().expect("tracked record");
                        assert_eq!(&buf[..len], record.as_slice(), "seed {seed}");
                    }
                    Err(err) => {
                        assert_eq!(err.kind(), ErrorKind::FifoEmpty, "seed {seed}");
                        assert!(expected.is_empty(), "seed {seed}");
                    }
                }
            }
        }

        // Rebuilding from the persisted bytes must drain identically.
        let bytes = fifo.medium().as_slice().to_vec();
        let mut recovered =
            Fifo::new(RamMedium::from_bytes(bytes), FifoOptions::new(96)).expect("construct");
        recovered.begin().unwrap_or_else(|err| panic!("seed {seed}: begin failed: {err}"));
        assert_eq!(recovered.is_empty(), fifo.is_empty(), "seed {seed}");

        while let Some(record) = expected.pop_front() {
            let live = fifo.pop(&mut buf).expect("live pop");
            assert_eq!(&buf[..live], record.as_slice(), "seed {seed}");
            let mut again = [0u8; 32];
            let len = recovered.pop(&mut again).expect("recovered pop");
            assert_eq!(&again[..len], record.as_slice(), "seed {seed}");
        }
        assert!(recovered.is_empty(), "seed {seed}");
    }
}
