use crate::poller::PollTask;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Drives one account's polls until `shutdown` flips to `true` or its sender
/// is dropped.
///
/// The first cycle starts immediately. Cycles are awaited inline, so one
/// account never has two in flight; a tick that falls due while a cycle is
/// still running is dropped rather than queued. A cycle that is running when
/// shutdown is requested is allowed to finish.
pub async fn run_account_loop<T: PollTask>(mut task: T, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(account = %task.account(), interval_secs = period.as_secs_f64(), "Polling loop started.");

    let mut busy_until: Option<Instant> = None;
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            scheduled = ticker.tick() => {
                if busy_until.is_some_and(|end| scheduled < end) {
                    tracing::debug!(account = %task.account(), "Previous cycle overran its slot; skipping this tick.");
                    continue;
                }
                task.run_cycle().await;
                busy_until = Some(Instant::now());
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::info!(account = %task.account(), "Polling loop stopped.");
}

/// Owns the per-account polling tasks and their shared shutdown signal.
pub struct Supervisor {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// Starts polling one account on its own task.
    pub fn spawn<T: PollTask + 'static>(&mut self, task: T, period: Duration) {
        let shutdown = self.shutdown_tx.subscribe();
        self.handles.push(tokio::spawn(run_account_loop(task, period, shutdown)));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for `signal`, then stops every loop and waits for them to finish.
    pub async fn run_until<F>(self, signal: F)
    where
        F: std::future::Future<Output = ()>,
    {
        signal.await;
        tracing::info!(accounts = self.handles.len(), "Shutdown requested, waiting for in-flight polls.");
        self.shutdown().await;
    }

    /// Stops issuing ticks and waits for every loop to exit.
    pub async fn shutdown(self) {
        // Receivers may all be gone already; that only means the loops have exited.
        let _ = self.shutdown_tx.send(true);

        for result in join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Polling task ended abnormally.");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::CycleOutcome;
    use async_trait::async_trait;
    use core_types::AccountId;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Sleeps for `work` on every cycle and records when each cycle started.
    struct SlowTask {
        account: AccountId,
        work: Duration,
        origin: Instant,
        starts: Arc<Mutex<Vec<u64>>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PollTask for SlowTask {
        fn account(&self) -> &AccountId {
            &self.account
        }

        async fn run_cycle(&mut self) -> CycleOutcome {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.starts.lock().unwrap().push(self.origin.elapsed().as_secs());
            tokio::time::sleep(self.work).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            CycleOutcome::Success { equity: Decimal::ZERO, position_count: 0 }
        }
    }

    fn slow_task(work: Duration) -> (SlowTask, Arc<Mutex<Vec<u64>>>, Arc<AtomicUsize>) {
        let starts = Arc::new(Mutex::new(Vec::new()));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let task = SlowTask {
            account: AccountId::parse("acc").unwrap(),
            work,
            origin: Instant::now(),
            starts: starts.clone(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: max_in_flight.clone(),
        };
        (task, starts, max_in_flight)
    }

    #[tokio::test(start_paused = true)]
    async fn first_cycle_is_immediate_then_every_period() {
        let (task, starts, _) = slow_task(Duration::from_secs(1));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_account_loop(task, Duration::from_secs(15), rx));

        tokio::time::sleep(Duration::from_secs(40)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(*starts.lock().unwrap(), vec![0, 15, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_cycles_skip_ticks_instead_of_overlapping() {
        let (task, starts, max_in_flight) = slow_task(Duration::from_secs(20));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_account_loop(task, Duration::from_secs(15), rx));

        tokio::time::sleep(Duration::from_secs(70)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        // Ticks at 15 and 45 fall inside running cycles and are dropped.
        assert_eq!(*starts.lock().unwrap(), vec![0, 30, 60]);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_lets_the_in_flight_cycle_finish() {
        let (task, starts, _) = slow_task(Duration::from_secs(10));
        let origin = Instant::now();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_account_loop(task, Duration::from_secs(15), rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(*starts.lock().unwrap(), vec![0]);
        assert_eq!(origin.elapsed().as_secs(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_sender_stops_the_loop() {
        let (task, starts, _) = slow_task(Duration::from_secs(1));
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_account_loop(task, Duration::from_secs(15), rx));

        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(tx);
        handle.await.unwrap();

        assert_eq!(starts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_stops_every_account() {
        let mut supervisor = Supervisor::new();
        let (a, starts_a, _) = slow_task(Duration::from_secs(1));
        let (b, starts_b, _) = slow_task(Duration::from_secs(1));
        supervisor.spawn(a, Duration::from_secs(10));
        supervisor.spawn(b, Duration::from_secs(25));
        assert_eq!(supervisor.len(), 2);

        supervisor
            .run_until(tokio::time::sleep(Duration::from_secs(35)))
            .await;

        assert_eq!(*starts_a.lock().unwrap(), vec![0, 10, 20, 30]);
        assert_eq!(*starts_b.lock().unwrap(), vec![0, 25]);
    }
}
