//! Simulation clock
//!
//! A single external clock drives the whole front end. The host feeds
//! elapsed time into [`TickScheduler::advance`], which turns it into named
//! ticks; modules keep their own [`IntervalTimer`]s for slower sub-tasks and
//! reset them when powered off.
//!
//! ```text
//!   host dt ──► TickScheduler ──► Update{dt} ──► RfFrontEnd::update(dt)
//!                              └─► Sync ──────► persistence collaborator
//! ```

use crate::config::SimConfig;
use tracing::warn;

/// Shortest period a timer accepts (s)
pub const MIN_PERIOD_S: f64 = 1e-3;

/// Most Update ticks one `advance` call will emit; older backlog is dropped
pub const MAX_CATCH_UP_UPDATES: u32 = 10_000;

/// Named tick emitted by the scheduler
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    /// Physics recalculation covering `dt_s` seconds
    Update { dt_s: f64 },
    /// Persisted-state load/save boundary
    Sync,
}

/// Periodic timer that counts whole elapsed periods
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalTimer {
    period_s: f64,
    accumulated_s: f64,
}

impl IntervalTimer {
    /// Periods shorter than [`MIN_PERIOD_S`], or NaN, are raised to it;
    /// an infinite period never fires.
    pub fn new(period_s: f64) -> Self {
        let period_s = if period_s >= MIN_PERIOD_S {
            period_s
        } else {
            MIN_PERIOD_S
        };
        Self {
            period_s,
            accumulated_s: 0.0,
        }
    }

    /// Timer firing at `hz` times per second
    pub fn from_hz(hz: f64) -> Self {
        Self::new(1.0 / hz)
    }

    /// Advance by `dt_s`, returning how many periods elapsed
    pub fn tick(&mut self, dt_s: f64) -> u32 {
        if !dt_s.is_finite() || dt_s <= 0.0 {
            return 0;
        }
        self.accumulated_s += dt_s;
        let periods = (self.accumulated_s / self.period_s).floor();
        if periods < 1.0 {
            return 0;
        }
        self.accumulated_s = (self.accumulated_s - periods * self.period_s).max(0.0);
        periods.min(u32::MAX as f64) as u32
    }

    pub fn reset(&mut self) {
        self.accumulated_s = 0.0;
    }

    pub fn period_s(&self) -> f64 {
        self.period_s
    }

    /// Time accumulated toward the next firing
    pub fn pending_s(&self) -> f64 {
        self.accumulated_s
    }
}

/// Converts host wall-clock deltas into Update and Sync ticks
#[derive(Debug, Clone)]
pub struct TickScheduler {
    update: IntervalTimer,
    sync: IntervalTimer,
    elapsed_s: f64,
}

impl TickScheduler {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            update: IntervalTimer::new(config.update_period_s()),
            sync: IntervalTimer::new(config.sync_interval_s),
            elapsed_s: 0.0,
        }
    }

    /// Advance the clock, returning the ticks that fell due in order.
    ///
    /// Each Update tick carries exactly one update period, so physics
    /// advances in fixed steps regardless of host jitter.
    pub fn advance(&mut self, dt_s: f64) -> Vec<Tick> {
        if !dt_s.is_finite() || dt_s <= 0.0 {
            return Vec::new();
        }
        self.elapsed_s += dt_s;
        let period = self.update.period_s();
        let mut updates = self.update.tick(dt_s);
        if updates > MAX_CATCH_UP_UPDATES {
            warn!(
                due = updates,
                kept = MAX_CATCH_UP_UPDATES,
                "Dropping update backlog"
            );
            updates = MAX_CATCH_UP_UPDATES;
        }
        // Missed syncs coalesce into one
        let syncs = self.sync.tick(dt_s).min(1);
        let mut ticks: Vec<Tick> = (0..updates).map(|_| Tick::Update { dt_s: period }).collect();
        ticks.extend((0..syncs).map(|_| Tick::Sync));
        ticks
    }

    /// Total time fed into the scheduler
    pub fn elapsed_s(&self) -> f64 {
        self.elapsed_s
    }

    pub fn reset(&mut self) {
        self.update.reset();
        self.sync.reset();
        self.elapsed_s = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_timer_counts_periods() {
        let mut t = IntervalTimer::new(1.0);
        assert_eq!(t.tick(0.5), 0);
        assert_eq!(t.tick(0.5), 1);
        assert_eq!(t.tick(2.25), 2);
        assert!((t.pending_s() - 0.25).abs() < 1e-12);
        t.reset();
        assert_eq!(t.pending_s(), 0.0);
    }

    #[test]
    fn test_interval_timer_ignores_bad_dt() {
        let mut t = IntervalTimer::from_hz(0.2);
        assert_eq!(t.period_s(), 5.0);
        assert_eq!(t.tick(-1.0), 0);
        assert_eq!(t.tick(f64::NAN), 0);
        assert_eq!(t.pending_s(), 0.0);
    }

    #[test]
    fn test_interval_timer_large_step_is_counted_at_once() {
        let mut t = IntervalTimer::new(1.0);
        assert_eq!(t.tick(1e12), u32::MAX);
        assert!(t.pending_s() < 1.0);
    }

    #[test]
    fn test_interval_timer_floors_degenerate_periods() {
        assert_eq!(IntervalTimer::new(0.0).period_s(), MIN_PERIOD_S);
        assert_eq!(IntervalTimer::new(f64::NAN).period_s(), MIN_PERIOD_S);
        assert_eq!(IntervalTimer::new(-3.0).period_s(), MIN_PERIOD_S);
        assert_eq!(IntervalTimer::from_hz(0.0).tick(1e9), 0);
    }

    #[test]
    fn test_scheduler_caps_backlog() {
        let mut sched = TickScheduler::new(&SimConfig::default());
        let ticks = sched.advance(1e9);
        let updates = ticks
            .iter()
            .filter(|t| matches!(t, Tick::Update { .. }))
            .count();
        assert_eq!(updates, MAX_CATCH_UP_UPDATES as usize);
        assert_eq!(ticks.iter().filter(|t| **t == Tick::Sync).count(), 1);
    }

    #[test]
    fn test_scheduler_emits_update_and_sync() {
        let cfg = SimConfig {
            update_rate_hz: 2.0,
            sync_interval_s: 1.0,
            ..Default::default()
        };
        let mut sched = TickScheduler::new(&cfg);
        let ticks = sched.advance(1.0);
        let updates = ticks
            .iter()
            .filter(|t| matches!(t, Tick::Update { .. }))
            .count();
        assert_eq!(updates, 2);
        assert_eq!(ticks.last(), Some(&Tick::Sync));
        assert!(sched.advance(0.0).is_empty());
        assert_eq!(sched.elapsed_s(), 1.0);
    }
}
