//! Two independent timers coordinated with the send/receive paths: a sender
//! that emits a keep-alive byte when nothing else has gone out, and a
//! monitor that notices when nothing has come in.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

/// Emits a single heartbeat byte under the transmit lock. Implemented by
/// [`crate::connection::Connection`]; kept as a trait so this module knows
/// nothing about sockets or the other two locks.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn send_heartbeat_byte(&self) -> std::io::Result<()>;
}

/// Notified when the monitor detects a liveness lapse.
#[async_trait]
pub trait HeartbeatMonitorSink: Send + Sync {
    async fn on_recv_timeout(&self);
}

/// Counters and timestamps shared between the two timer tasks and the
/// connection's send/receive paths. Reads/writes of the timestamps happen
/// under a small mutex each (not the three protocol locks): the heartbeat
/// sender only ever touches `last_write` opportunistically and the monitor
/// only ever reads `last_read`, so contention is negligible.
pub struct HeartbeatState {
    last_write: Mutex<Instant>,
    last_read: Mutex<Instant>,
    pub send_count: AtomicU64,
    pub recv_count: AtomicU64,
    pub hb_sent: AtomicBool,
    pub hb_received: AtomicBool,
    /// Set by the monitor task when a non-reliable connection's recv timer
    /// lapses; consumed by `Connection::receive` on the next call.
    pending_recv_failure: AtomicBool,
    /// Set by the sender task when `hbser` is configured and a heartbeat
    /// write fails; consumed by `Connection::transmit_frame` on the next call.
    pending_send_failure: Mutex<Option<String>>,
}

impl HeartbeatState {
    pub fn new() -> Arc<Self> {
        let now = Instant::now();
        Arc::new(HeartbeatState {
            last_write: Mutex::new(now),
            last_read: Mutex::new(now),
            send_count: AtomicU64::new(0),
            recv_count: AtomicU64::new(0),
            hb_sent: AtomicBool::new(true),
            hb_received: AtomicBool::new(true),
            pending_recv_failure: AtomicBool::new(false),
            pending_send_failure: Mutex::new(None),
        })
    }

    /// Call this every time a frame or heartbeat byte is written to the
    /// transport, from whichever side holds the transmit lock.
    pub async fn note_write(&self) {
        *self.last_write.lock().await = Instant::now();
    }

    /// Call this every time a byte is read from the transport, from
    /// whichever side holds the read lock.
    pub async fn note_read(&self) {
        *self.last_read.lock().await = Instant::now();
        self.recv_count.fetch_add(1, Ordering::Relaxed);
        self.hb_received.store(true, Ordering::Relaxed);
    }

    pub fn mark_recv_failure(&self) {
        self.pending_recv_failure.store(true, Ordering::SeqCst);
    }

    pub fn take_recv_failure(&self) -> bool {
        self.pending_recv_failure.swap(false, Ordering::SeqCst)
    }

    pub async fn mark_send_failure(&self, message: String) {
        *self.pending_send_failure.lock().await = Some(message);
    }

    pub async fn take_send_failure(&self) -> Option<String> {
        self.pending_send_failure.lock().await.take()
    }
}

/// Handles to the two running timer tasks. Dropping or calling
/// [`HeartbeatTasks::stop`] shuts both down; both must be stopped before the
/// transport is closed, before a reconnect attempt, and during graceful
/// disconnect.
pub struct HeartbeatTasks {
    shutdown_tx: watch::Sender<bool>,
    sender_task: Option<tokio::task::JoinHandle<()>>,
    monitor_task: Option<tokio::task::JoinHandle<()>>,
}

impl HeartbeatTasks {
    /// Start the sender and monitor tasks for negotiated intervals that are
    /// both 0 means "do nothing" for that side — pass 0 to skip a task.
    pub fn start(
        state: Arc<HeartbeatState>,
        send_interval_ms: u64,
        recv_interval_ms: u64,
        tolerance: f64,
        hbser: bool,
        sink: Arc<dyn HeartbeatSink>,
        monitor_sink: Arc<dyn HeartbeatMonitorSink>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sender_task = if send_interval_ms > 0 {
            Some(tokio::spawn(run_sender(
                state.clone(),
                send_interval_ms,
                hbser,
                sink,
                shutdown_rx.clone(),
            )))
        } else {
            None
        };

        let monitor_task = if recv_interval_ms > 0 {
            Some(tokio::spawn(run_monitor(
                state,
                recv_interval_ms,
                tolerance,
                monitor_sink,
                shutdown_rx,
            )))
        } else {
            None
        };

        HeartbeatTasks {
            shutdown_tx,
            sender_task,
            monitor_task,
        }
    }

    /// Stop both tasks and wait for them to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.sender_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.monitor_task.take() {
            let _ = task.await;
        }
    }
}

async fn run_sender(
    state: Arc<HeartbeatState>,
    interval_ms: u64,
    hbser: bool,
    sink: Arc<dyn HeartbeatSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
            }
            _ = ticker.tick() => {
                let since_write = state.last_write.lock().await.elapsed();
                if since_write < Duration::from_millis(interval_ms) {
                    // A real frame already went out this period; no keep-alive needed.
                    continue;
                }
                match sink.send_heartbeat_byte().await {
                    Ok(()) => {
                        state.note_write().await;
                        state.send_count.fetch_add(1, Ordering::Relaxed);
                        state.hb_sent.store(true, Ordering::Relaxed);
                    }
                    Err(e) => {
                        state.hb_sent.store(false, Ordering::Relaxed);
                        if hbser {
                            warn!(error = %e, "heartbeat send failed, hbser is set, stopping sender");
                            state.mark_send_failure(e.to_string()).await;
                            break;
                        }
                        debug!(error = %e, "heartbeat send failed, continuing per configuration");
                    }
                }
            }
        }
    }
}

async fn run_monitor(
    state: Arc<HeartbeatState>,
    interval_ms: u64,
    tolerance: f64,
    sink: Arc<dyn HeartbeatMonitorSink>,
    mut shutdown: watch::Receiver<bool>,
) {
    let threshold = Duration::from_millis((interval_ms as f64 * tolerance) as u64);
    let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() { break; }
            }
            _ = ticker.tick() => {
                let since_read = state.last_read.lock().await.elapsed();
                if since_read > threshold {
                    state.hb_received.store(false, Ordering::Relaxed);
                    warn!(?since_read, ?threshold, "heartbeat recv lapse detected");
                    sink.on_recv_timeout().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl HeartbeatSink for CountingSink {
        async fn send_heartbeat_byte(&self) -> std::io::Result<()> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    struct NoopMonitorSink;

    #[async_trait]
    impl HeartbeatMonitorSink for NoopMonitorSink {
        async fn on_recv_timeout(&self) {}
    }

    #[tokio::test(start_paused = true)]
    async fn sender_emits_heartbeat_when_idle() {
        let state = HeartbeatState::new();
        let sent = Arc::new(AtomicUsize::new(0));
        let sink = Arc::new(CountingSink(sent.clone()));
        let monitor_sink = Arc::new(NoopMonitorSink);

        let tasks = HeartbeatTasks::start(state.clone(), 100, 0, 2.0, false, sink, monitor_sink);
        tokio::time::advance(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        tasks.stop().await;

        assert!(sent.load(Ordering::Relaxed) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_fires_on_recv_timeout_scenario() {
        struct FlagSink(Arc<AtomicBool>);
        #[async_trait]
        impl HeartbeatMonitorSink for FlagSink {
            async fn on_recv_timeout(&self) {
                self.0.store(true, Ordering::Relaxed);
            }
        }

        let state = HeartbeatState::new();
        let fired = Arc::new(AtomicBool::new(false));
        let monitor_sink = Arc::new(FlagSink(fired.clone()));
        let sink = Arc::new(CountingSink(Arc::new(AtomicUsize::new(0))));

        let tasks = HeartbeatTasks::start(state, 0, 100, 2.0, false, sink, monitor_sink);
        tokio::time::advance(Duration::from_millis(250)).await;
        tokio::task::yield_now().await;
        tasks.stop().await;

        assert!(fired.load(Ordering::Relaxed));
    }

    #[tokio::test(start_paused = true)]
    async fn hbser_send_failure_is_recorded_as_pending() {
        struct FailingSink;
        #[async_trait]
        impl HeartbeatSink for FailingSink {
            async fn send_heartbeat_byte(&self) -> std::io::Result<()> {
                Err(std::io::Error::other("socket gone"))
            }
        }

        let state = HeartbeatState::new();
        let sink = Arc::new(FailingSink);
        let monitor_sink = Arc::new(NoopMonitorSink);

        let tasks = HeartbeatTasks::start(state.clone(), 100, 0, 2.0, true, sink, monitor_sink);
        tokio::time::advance(Duration::from_millis(150)).await;
        tokio::task::yield_now().await;
        tasks.stop().await;

        assert!(state.take_send_failure().await.is_some());
    }
}
