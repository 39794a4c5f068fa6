use rand::Rng;
use rand::rngs::StdRng;

use super::{Pattern, PatternCatalog};

pub const DEFAULT_ROTATION_SECS: f64 = 15.0;

/// Result of one scheduler step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTick {
    /// Active pattern after this tick.
    pub index: usize,
    /// The active pattern changed on this tick.
    pub switched: bool,
}

/// Read-only snapshot for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleInfo {
    pub pattern_count: usize,
    pub active_index: usize,
    pub last_switch: f64,
    pub interval: f64,
}

/// Timed random rotation through a catalog, never repeating the current pattern.
pub struct PatternScheduler<R: Rng = StdRng> {
    catalog: PatternCatalog,
    interval: f64,
    active_index: usize,
    last_switch: f64,
    rng: R,
}

impl<R: Rng> PatternScheduler<R> {
    /// Pick a random starting pattern; the first rotation is due at `start + interval`.
    pub fn new(catalog: PatternCatalog, interval: f64, start: f64, rng: R) -> Self {
        log::info!(
            "Pattern rotation: {} patterns every {interval:.1}s",
            catalog.len()
        );
        let mut scheduler = Self {
            catalog,
            interval,
            active_index: 0,
            last_switch: start,
            rng,
        };
        scheduler.restart(start);
        scheduler
    }

    /// Begin a fresh rotation at `start` with a new random pattern.
    pub fn restart(&mut self, start: f64) -> &Pattern {
        self.active_index = self.rng.gen_range(0..self.catalog.len());
        self.last_switch = start;
        log::info!(
            "Pattern rotation from {start:.2}s, starting with {}",
            self.active_pattern().name
        );
        self.active_pattern()
    }

    /// Called every tick with the current time (seconds).
    pub fn tick(&mut self, now: f64) -> ScheduleTick {
        if now - self.last_switch < self.interval {
            return ScheduleTick {
                index: self.active_index,
                switched: false,
            };
        }

        let n = self.catalog.len();
        let previous = self.active_index;
        if n > 1 {
            let mut next = self.rng.gen_range(0..n);
            while next == previous {
                next = self.rng.gen_range(0..n);
            }
            self.active_index = next;
        }
        self.last_switch = now;

        if self.active_index != previous {
            log::info!(
                "Pattern switch at {now:.2}s: {} -> {}",
                self.catalog.get(previous).map_or("?", |p| p.name.as_str()),
                self.active_pattern().name
            );
        }

        ScheduleTick {
            index: self.active_index,
            switched: self.active_index != previous,
        }
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn active_pattern(&self) -> &Pattern {
        // active_index < catalog.len() and the catalog is never empty
        &self.catalog.patterns[self.active_index]
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    pub fn info(&self) -> ScheduleInfo {
        ScheduleInfo {
            pattern_count: self.catalog.len(),
            active_index: self.active_index,
            last_switch: self.last_switch,
            interval: self.interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn catalog(n: usize) -> PatternCatalog {
        let ids: Vec<String> = (0..n).map(|i| format!("p{i}")).collect();
        PatternCatalog::from_ids(&ids).unwrap()
    }

    fn seeded(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn initial_index_in_range() {
        for seed in 0..50 {
            let sched = PatternScheduler::new(catalog(5), 15.0, 0.0, seeded(seed));
            assert!(sched.active_index() < 5);
        }
    }

    #[test]
    fn no_switch_before_interval() {
        let mut sched = PatternScheduler::new(catalog(5), 15.0, 0.0, seeded(1));
        let start = sched.active_index();
        let mut t = 0.0;
        while t < 14.99 {
            let tick = sched.tick(t);
            assert!(!tick.switched);
            assert_eq!(tick.index, start);
            t += 0.05;
        }
    }

    #[test]
    fn first_switch_at_first_tick_past_interval() {
        let mut sched = PatternScheduler::new(catalog(5), 15.0, 0.0, seeded(7));
        assert!(!sched.tick(14.95).switched);
        let tick = sched.tick(15.0);
        assert!(tick.switched);
        assert_eq!(sched.info().last_switch, 15.0);
        // Next one is measured from the switch
        assert!(!sched.tick(29.9).switched);
        assert!(sched.tick(30.0).switched);
    }

    #[test]
    fn consecutive_indices_never_repeat() {
        let mut sched = PatternScheduler::new(catalog(5), 15.0, 0.0, seeded(42));
        let mut prev = sched.active_index();
        for i in 1..=500 {
            let tick = sched.tick(f64::from(i) * 16.0);
            assert!(tick.switched);
            assert_ne!(tick.index, prev);
            prev = tick.index;
        }
    }

    #[test]
    fn selection_is_roughly_uniform() {
        let mut sched = PatternScheduler::new(catalog(5), 1.0, 0.0, seeded(3));
        let mut counts = [0usize; 5];
        for i in 1..=5000 {
            counts[sched.tick(f64::from(i) * 2.0).index] += 1;
        }
        for (i, &c) in counts.iter().enumerate() {
            assert!((800..=1200).contains(&c), "pattern {i} chosen {c} times");
        }
    }

    #[test]
    fn single_pattern_never_changes() {
        let mut sched = PatternScheduler::new(catalog(1), 15.0, 0.0, seeded(9));
        for i in 0..100 {
            let tick = sched.tick(f64::from(i) * 20.0);
            assert_eq!(tick.index, 0);
            assert!(!tick.switched);
        }
        assert_eq!(sched.info().last_switch, 99.0 * 20.0);
    }

    #[test]
    fn restart_resets_rotation_clock() {
        let mut sched = PatternScheduler::new(catalog(5), 15.0, 0.0, seeded(11));
        assert!(sched.tick(20.0).switched);
        let started = sched.restart(0.0).clone();
        assert_eq!(sched.info().last_switch, 0.0);
        assert_eq!(&started, sched.active_pattern());
        assert!(sched.active_index() < 5);
        assert!(!sched.tick(14.0).switched);
        assert!(sched.tick(15.0).switched);
    }

    #[test]
    fn info_snapshot() {
        let sched = PatternScheduler::new(PatternCatalog::default(), 15.0, 2.5, seeded(0));
        let info = sched.info();
        assert_eq!(info.pattern_count, 14);
        assert_eq!(info.active_index, sched.active_index());
        assert_eq!(info.last_switch, 2.5);
        assert_eq!(info.interval, 15.0);
        let expected = sched.catalog().get(info.active_index).unwrap();
        assert_eq!(sched.active_pattern(), expected);
    }
}
