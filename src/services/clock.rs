use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::config::{AppConfig, CadenceConfig};

/// One firing of the recurring timer, nominally every second.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub seq: u64,
}

/// Discrete recurring-timer intervals the clock switches between.
///
/// The interval set brackets one second: sub-second intervals claw back lag,
/// super-second intervals bleed off lead. `Faster`/`Slower` are only selected
/// when large-skew mode is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickInterval {
    NotSet,
    Normal,
    Fast,
    Slow,
    Faster,
    Slower,
}

impl TickInterval {
    fn duration(self, cadence: &CadenceConfig) -> Option<Duration> {
        let millis = match self {
            Self::NotSet => return None,
            Self::Normal => cadence.normal_ms,
            Self::Fast => cadence.fast_ms,
            Self::Slow => cadence.slow_ms,
            Self::Faster => cadence.faster_ms,
            Self::Slower => cadence.slower_ms,
        };
        Some(Duration::from_millis(millis))
    }
}

/// Self-calibrating once-per-second tick source.
///
/// The first tick is scheduled at the next cycle boundary; after that the
/// timer free-runs at the currently selected interval, and [`Clock::calibrate`]
/// re-selects the interval from the wall-clock error after every tick.
pub struct Clock {
    cadence: CadenceConfig,
    large_skew: bool,
    interval: watch::Sender<TickInterval>,
    task: Option<JoinHandle<()>>,
}

impl Clock {
    /// Align the first tick to the next cycle boundary and start streaming
    /// ticks. Also returns the whole seconds left until that boundary, which
    /// seeds the round countdown.
    pub fn start(config: &AppConfig) -> (Self, mpsc::Receiver<Tick>, u64) {
        let now = unix_millis(SystemTime::now());
        let (delay, initial_secs) =
            first_tick_delay(now, config.cycle_secs, config.cadence.init_offset_ms);

        let (interval_tx, interval_rx) = watch::channel(TickInterval::Normal);
        let (tick_tx, tick_rx) = mpsc::channel(32);
        let task = tokio::spawn(run_timer(
            delay,
            config.cadence.clone(),
            interval_rx,
            tick_tx,
        ));
        info!(
            delay_ms = delay.as_millis() as u64,
            initial_secs, "clock aligned to next cycle boundary"
        );

        let clock = Self {
            cadence: config.cadence.clone(),
            large_skew: config.large_skew,
            interval: interval_tx,
            task: Some(task),
        };
        (clock, tick_rx, initial_secs)
    }

    /// Re-select the recurring interval from the current wall-clock error.
    ///
    /// The running timer picks up the new interval before its next sleep,
    /// which replaces cancelling and reinstalling it.
    pub fn calibrate(&self, now: SystemTime) -> TickInterval {
        let err = boundary_error_ms(unix_millis(now));
        let next = select_interval(err, self.large_skew, &self.cadence);
        self.interval.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                debug!(err_ms = err, from = ?*current, to = ?next, "retuning tick interval");
                *current = next;
                true
            }
        });
        next
    }

    pub fn current_interval(&self) -> TickInterval {
        *self.interval.borrow()
    }

    /// Cancel the timer task; the tick stream ends and no further tick fires.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let _ = self.interval.send(TickInterval::NotSet);
    }
}

async fn run_timer(
    first_delay: Duration,
    cadence: CadenceConfig,
    interval: watch::Receiver<TickInterval>,
    ticks: mpsc::Sender<Tick>,
) {
    tokio::time::sleep(first_delay).await;
    let mut seq = 0u64;
    loop {
        seq += 1;
        if ticks.send(Tick { seq }).await.is_err() {
            break;
        }
        let Some(pause) = interval.borrow().duration(&cadence) else {
            break;
        };
        tokio::time::sleep(pause).await;
    }
}

pub(crate) fn unix_millis(now: SystemTime) -> u64 {
    now.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Delay until the next cycle boundary (adjusted by the early-fire offset),
/// and the whole seconds remaining until that boundary.
fn first_tick_delay(now_ms: u64, cycle_secs: u64, init_offset_ms: i64) -> (Duration, u64) {
    let cycle_ms = cycle_secs * 1000;
    let until = (cycle_ms - now_ms % cycle_ms) % cycle_ms;
    let delay = (until as i64 + init_offset_ms).max(0) as u64;
    (Duration::from_millis(delay), until / 1000)
}

/// Signed offset from the nearest whole second, in `[-500, 499]` ms.
///
/// Positive means the tick fired after the second mark (the timer is
/// running late), negative means before it.
fn boundary_error_ms(now_ms: u64) -> i64 {
    ((now_ms + 500) % 1000) as i64 - 500
}

fn select_interval(err_ms: i64, large_skew: bool, cadence: &CadenceConfig) -> TickInterval {
    if large_skew && err_ms > cadence.err_threshold_large_ms {
        TickInterval::Faster
    } else if large_skew && err_ms < -cadence.err_threshold_large_ms {
        TickInterval::Slower
    } else if err_ms > cadence.err_threshold_ms {
        TickInterval::Fast
    } else if err_ms < -cadence.err_threshold_ms {
        TickInterval::Slow
    } else {
        TickInterval::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_aligns_to_the_next_boundary() {
        // 100 seconds into a 180-second cycle: 80 seconds to go, fired 10ms early.
        let (delay, secs) = first_tick_delay(100_000, 180, -10);
        assert_eq!(delay, Duration::from_millis(79_990));
        assert_eq!(secs, 80);
    }

    #[test]
    fn first_tick_on_a_boundary_fires_immediately() {
        let (delay, secs) = first_tick_delay(360_000, 180, -10);
        assert_eq!(delay, Duration::ZERO);
        assert_eq!(secs, 0);
    }

    #[test]
    fn boundary_error_is_signed_and_wraps_at_half_a_second() {
        assert_eq!(boundary_error_ms(10_000), 0);
        assert_eq!(boundary_error_ms(10_020), 20);
        assert_eq!(boundary_error_ms(10_499), 499);
        assert_eq!(boundary_error_ms(10_500), -500);
        assert_eq!(boundary_error_ms(10_980), -20);
    }

    #[test]
    fn interval_selection_brackets_the_thresholds() {
        let cadence = CadenceConfig::default();
        assert_eq!(select_interval(0, false, &cadence), TickInterval::Normal);
        assert_eq!(select_interval(10, false, &cadence), TickInterval::Normal);
        assert_eq!(select_interval(11, false, &cadence), TickInterval::Fast);
        assert_eq!(select_interval(-10, false, &cadence), TickInterval::Normal);
        assert_eq!(select_interval(-11, false, &cadence), TickInterval::Slow);
    }

    #[test]
    fn large_skew_mode_unlocks_the_outer_intervals() {
        let cadence = CadenceConfig::default();
        assert_eq!(select_interval(26, true, &cadence), TickInterval::Faster);
        assert_eq!(select_interval(-26, true, &cadence), TickInterval::Slower);
        assert_eq!(select_interval(20, true, &cadence), TickInterval::Fast);
        assert_eq!(select_interval(-20, true, &cadence), TickInterval::Slow);
        assert_eq!(select_interval(26, false, &cadence), TickInterval::Fast);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_streams_ticks_until_stopped() {
        let config = AppConfig::default();
        let (mut clock, mut ticks, _initial_secs) = Clock::start(&config);

        let first = ticks.recv().await.expect("first tick");
        assert_eq!(first.seq, 1);
        let second = ticks.recv().await.expect("second tick");
        assert_eq!(second.seq, 2);

        clock.stop();
        assert_eq!(clock.current_interval(), TickInterval::NotSet);
        assert!(ticks.recv().await.is_none());
    }
}
