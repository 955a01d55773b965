// Time-batched commits: mutations are flushed to the medium at most once per
// period, trading durability latency for reduced wear. A crash inside the
// window rolls back the latest mutations on-medium; callers bound the window
// with `flush`.
use tracing::{debug, trace};

use crate::core::clock::Clock;
use crate::core::error::Error;
use crate::core::medium::Medium;

pub struct CommitScheduler {
    period_ms: u64,
    next_commit_ms: u64,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for CommitScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitScheduler")
            .field("period_ms", &self.period_ms)
            .field("next_commit_ms", &self.next_commit_ms)
            .finish_non_exhaustive()
    }
}

impl CommitScheduler {
    /// Period 0 disables batching: every mutation commits immediately.
    pub fn new(period_ms: u64, clock: Box<dyn Clock>) -> Self {
        let next_commit_ms = clock.now_ms() + period_ms;
        Self {
            period_ms,
            next_commit_ms,
            clock,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    /// Called after every mutating queue operation.
    pub fn note_mutation(&mut self, medium: &mut dyn Medium) -> Result<(), Error> {
        if self.period_ms == 0 {
            return medium.commit();
        }
        let now = self.clock.now_ms();
        if now < self.next_commit_ms {
            trace!(now_ms = now, due_ms = self.next_commit_ms, "commit deferred");
            return Ok(());
        }
        medium.commit()?;
        self.next_commit_ms = now + self.period_ms;
        debug!(now_ms = now, period_ms = self.period_ms, "batched commit flushed");
        Ok(())
    }

    /// Commits immediately and re-arms the period.
    pub fn flush(&mut self, medium: &mut dyn Medium) -> Result<(), Error> {
        medium.commit()?;
        self.next_commit_ms = self.clock.now_ms() + self.period_ms;
        debug!(period_ms = self.period_ms, "forced commit flushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::CommitScheduler;
    use crate::core::clock::FakeClock;
    use crate::core::error::Error;
    use crate::core::medium::Medium;
    use std::rc::Rc;

    struct CountingMedium {
        commits: usize,
    }

    impl CountingMedium {
        fn new() -> Self {
            Self { commits: 0 }
        }
    }

    impl Medium for CountingMedium {
        fn read_byte(&self, _offset: usize) -> u8 {
            0
        }

        fn write_byte(&mut self, _offset: usize, _value: u8) {}

        fn len(&self) -> usize {
            0
        }

        fn commit(&mut self) -> Result<(), Error> {
            self.commits += 1;
            Ok(())
        }
    }

    #[test]
    fn zero_period_commits_every_mutation() {
        let mut medium = CountingMedium::new();
        let mut scheduler = CommitScheduler::new(0, Box::new(FakeClock::new()));

        for _ in 0..3 {
            scheduler.note_mutation(&mut medium).expect("note");
        }
        assert_eq!(medium.commits, 3);
    }

    #[test]
    fn mutations_inside_the_window_are_deferred() {
        let clock = Rc::new(FakeClock::new());
        let mut medium = CountingMedium::new();
        let mut scheduler = CommitScheduler::new(100, Box::new(SharedClock(clock.clone())));

        scheduler.note_mutation(&mut medium).expect("note");
        clock.advance(99);
        scheduler.note_mutation(&mut medium).expect("note");
        assert_eq!(medium.commits, 0);

        clock.advance(1);
        scheduler.note_mutation(&mut medium).expect("note");
        assert_eq!(medium.commits, 1);

        // Window re-arms from the commit time.
        scheduler.note_mutation(&mut medium).expect("note");
        assert_eq!(medium.commits, 1);
        clock.advance(100);
        scheduler.note_mutation(&mut medium).expect("note");
        assert_eq!(medium.commits, 2);
    }

    #[test]
    fn flush_commits_and_rearms() {
        let clock = Rc::new(FakeClock::new());
        let mut medium = CountingMedium::new();
        let mut scheduler = CommitScheduler::new(100, Box::new(SharedClock(clock.clone())));

        scheduler.flush(&mut medium).expect("flush");
        assert_eq!(medium.commits, 1);

        clock.advance(99);
        scheduler.note_mutation(&mut medium).expect("note");
        assert_eq!(medium.commits, 1);
    }

    struct SharedClock(Rc<FakeClock>);

    impl crate::core::clock::Clock for SharedClock {
        fn now_ms(&self) -> u64 {
            self.0.now_ms()
        }
    }
}
