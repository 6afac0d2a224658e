use crate::convert::convert;
use crate::display_constants::{HEIGHT, WIDTH};
use crate::e_paper_display::EpdError;
use crate::panel_worker::FrameSink;
use crate::source::{ImageSource, SourceError};
use std::future::Future;
use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Panel(#[from] EpdError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Tick,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    pub current_image_id: Option<String>,
    /// last successful display or clear
    pub last_updated: Instant,
    pub clear_after: Duration,
}

impl ScheduleState {
    pub fn new(clear_after: Duration) -> Self {
        ScheduleState {
            current_image_id: None,
            last_updated: Instant::now(),
            clear_after,
        }
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_updated) >= self.clear_after
    }
}

/// Fetches `id`, converts it for the panel and shows it.
pub async fn show_image<S, P>(source: &S, sink: &P, id: &str) -> Result<(), RefreshError>
where
    S: ImageSource + ?Sized,
    P: FrameSink + ?Sized,
{
    let image = source.image(id).await?;
    let frame = convert(&image, WIDTH, HEIGHT);
    debug!("converted image {} into {} bytes", id, frame.len());
    sink.display(frame).await?;
    Ok(())
}

/// Retries the connectivity check up to `attempts` times, `backoff` apart.
/// Never blocks past that bound and gives up early once `shutdown` is
/// cancelled; returns whether a check succeeded.
pub async fn await_connectivity<S>(
    source: &S,
    attempts: u32,
    backoff: Duration,
    shutdown: &CancellationToken,
) -> bool
where
    S: ImageSource + ?Sized,
{
    for attempt in 1..=attempts {
        if source.check_connected().await {
            info!("Connected to image server");
            return true;
        }
        if attempt < attempts {
            warn!(
                "No connection to image server (attempt {}/{}), retrying in {:?}",
                attempt, attempts, backoff
            );
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, no longer waiting for a connection");
                    return false;
                }
                _ = tokio::time::sleep(backoff) => {},
            }
        }
    }
    warn!("No connection after {} attempts, starting anyway", attempts);
    false
}

pub struct Scheduler<S, P> {
    source: S,
    sink: P,
    state: ScheduleState,
}

impl<S: ImageSource, P: FrameSink> Scheduler<S, P> {
    pub fn new(source: S, sink: P, clear_after: Duration) -> Self {
        Scheduler {
            source,
            sink,
            state: ScheduleState::new(clear_after),
        }
    }

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    /// One pass of the watch loop: show the current image if it changed,
    /// then clear the panel if nothing has been shown for too long.
    pub async fn handle_tick(&mut self) {
        match self.source.current_id().await {
            Err(e) => warn!("Could not get current image id: {}", e),
            Ok(id) if self.state.current_image_id.as_deref() == Some(id.as_str()) => {
                debug!("Image {} is already on screen", id)
            }
            Ok(id) => {
                info!("New image {}", id);
                match show_image(&self.source, &self.sink, &id).await {
                    Ok(()) => {
                        info!("Displayed image {}", id);
                        self.state.current_image_id = Some(id);
                        self.state.last_updated = Instant::now();
                    }
                    Err(RefreshError::Source(e)) => warn!("Could not load image {}: {}", id, e),
                    Err(RefreshError::Panel(e)) => error!("Could not display image {}: {}", id, e),
                }
            }
        }
        self.clear_if_stale().await;
    }

    async fn clear_if_stale(&mut self) {
        let now = Instant::now();
        if !self.state.is_stale(now) {
            return;
        }
        info!(
            "No new image for {:?}, clearing screen",
            now.duration_since(self.state.last_updated)
        );
        if let Err(e) = self.sink.clear().await {
            error!("Could not clear screen: {}", e);
        }
        self.state.last_updated = now;
    }

    /// Handles events in order until `Shutdown` arrives or every sender is
    /// gone, then clears the panel once. Ticks that arrive after `shutdown`
    /// is cancelled are dropped.
    pub async fn run(mut self, mut events: mpsc::Receiver<SchedulerEvent>, shutdown: CancellationToken) {
        info!("Watching for new images");
        while let Some(event) = events.recv().await {
            match event {
                SchedulerEvent::Tick if shutdown.is_cancelled() => debug!("Ignoring tick, shutting down"),
                SchedulerEvent::Tick => self.handle_tick().await,
                SchedulerEvent::Shutdown => break,
            }
        }
        info!("Shutting down, clearing screen");
        if let Err(e) = self.sink.clear().await {
            error!("Could not clear screen on shutdown: {}", e);
        }
    }
}

/// Time from `since_epoch` to the next wall-clock multiple of `period`.
/// Always positive: on an exact boundary the next one is a full period away.
pub fn until_next_boundary(since_epoch: Duration, period: Duration) -> Duration {
    let period_ms = period.as_millis().max(1);
    let into_period = since_epoch.as_millis() % period_ms;
    Duration::from_millis((period_ms - into_period) as u64)
}

/// Sends one tick right away, then one on every wall-clock multiple of
/// `period` (so a ten minute period ticks at :00, :10, :20 ...).
pub fn spawn_ticker(
    events: mpsc::Sender<SchedulerEvent>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if events.send(SchedulerEvent::Tick).await.is_err() {
            return;
        }
        loop {
            let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
            let delay = until_next_boundary(since_epoch, period);
            debug!("Next tick in {:?}", delay);
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {},
            }
            if events.send(SchedulerEvent::Tick).await.is_err() {
                break;
            }
        }
    })
}

/// SIGTERM and SIGINT streams, registered up front so a failure surfaces
/// before the service starts.
pub struct ShutdownSignals {
    terminate: Signal,
    interrupt: Signal,
}

impl ShutdownSignals {
    pub fn register() -> io::Result<Self> {
        Ok(ShutdownSignals {
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    pub async fn recv(&mut self) {
        tokio::select! {
            _ = self.terminate.recv() => info!("Received SIGTERM"),
            _ = self.interrupt.recv() => info!("Received SIGINT"),
        }
    }
}

/// Waits for `received`, then cancels `shutdown` and sends `Shutdown`.
pub async fn forward_shutdown<F>(received: F, events: mpsc::Sender<SchedulerEvent>, shutdown: CancellationToken)
where
    F: Future<Output = ()>,
{
    received.await;
    shutdown.cancel();
    if events.send(SchedulerEvent::Shutdown).await.is_err() {
        debug!("Scheduler already stopped");
    }
}

pub fn spawn_signal_listener(
    mut signals: ShutdownSignals,
    events: mpsc::Sender<SchedulerEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move { forward_shutdown(signals.recv(), events, shutdown).await })
}
