use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

#[derive(Debug)]
pub struct TickerHandle {
    generation: u64,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(mut self) {
        self.signal_stop();
    }

    fn signal_stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Calls `on_tick(generation, steps)` once per `period`.
///
/// `steps` is the number of whole periods elapsed since the previous call,
/// so a delayed runtime catches up instead of losing time. Must be called
/// from inside a tokio runtime.
pub fn spawn_ticker<F, Fut>(period: Duration, mut on_tick: F) -> TickerHandle
where
    F: FnMut(u64, u64) -> Fut + Send + 'static,
    Fut: Future<Output = TickControl> + Send + 'static,
{
    let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
    let period = period.max(Duration::from_millis(1));
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let started = Instant::now();
        let mut timer = interval_at(started + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut accounted: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                _ = timer.tick() => {
                    let due = (started.elapsed().as_nanos() / period.as_nanos()) as u64;
                    let steps = due.saturating_sub(accounted);
                    if steps == 0 {
                        continue;
                    }
                    accounted = due;
                    if on_tick(generation, steps).await == TickControl::Stop {
                        break;
                    }
                }
            }
        }
    });

    TickerHandle {
        generation,
        stop: Some(stop_tx),
        task,
    }
}
