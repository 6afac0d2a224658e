use crate::convert::Frame;
use crate::e_paper_display::interface::PanelInterface;
use crate::e_paper_display::{EpdError, Panel};
use async_trait::async_trait;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Anything that can put a frame on screen or blank it.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn display(&self, frame: Frame) -> Result<(), EpdError>;
    async fn clear(&self) -> Result<(), EpdError>;
}

enum Job {
    Display(Frame, oneshot::Sender<Result<(), EpdError>>),
    Clear(oneshot::Sender<Result<(), EpdError>>),
}

/// Front end of the panel worker thread. Each job is a whole
/// reset/initialize/refresh/sleep sequence; jobs run strictly one at a time.
#[derive(Debug, Clone)]
pub struct PanelHandle {
    jobs: mpsc::UnboundedSender<Job>,
}

impl PanelHandle {
    /// Moves `panel` onto its own thread. The thread exits once every
    /// handle is dropped.
    pub fn spawn<I>(panel: Panel<I>) -> Result<(PanelHandle, JoinHandle<()>), EpdError>
    where
        I: PanelInterface + Send + 'static,
    {
        let (jobs, receiver) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name("panel".to_string())
            .spawn(move || run_worker(panel, receiver))?;
        Ok((PanelHandle { jobs }, worker))
    }

    async fn submit<F>(&self, job: F) -> Result<(), EpdError>
    where
        F: FnOnce(oneshot::Sender<Result<(), EpdError>>) -> Job,
    {
        let (reply, response) = oneshot::channel();
        self.jobs.send(job(reply)).map_err(|_| EpdError::WorkerStopped)?;
        response.await.map_err(|_| EpdError::WorkerStopped)?
    }
}

#[async_trait]
impl FrameSink for PanelHandle {
    async fn display(&self, frame: Frame) -> Result<(), EpdError> {
        self.submit(|reply| Job::Display(frame, reply)).await
    }

    async fn clear(&self) -> Result<(), EpdError> {
        self.submit(Job::Clear).await
    }
}

fn run_worker<I: PanelInterface>(mut panel: Panel<I>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    info!("panel worker started (panel available: {})", panel.is_available());
    while let Some(job) = jobs.blocking_recv() {
        let (result, reply) = match job {
            Job::Display(frame, reply) => (panel.display_frame(&frame), reply),
            Job::Clear(reply) => (panel.clear_screen(), reply),
        };
        if reply.send(result).is_err() {
            debug!("panel job finished after its caller went away");
        }
    }
    info!("panel worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Tone;
    use crate::display_constants::{HEIGHT, WIDTH};
    use crate::e_paper_display::interface::SpidevInterface;

    #[tokio::test]
    async fn unavailable_panel_accepts_jobs() {
        let (handle, worker) = PanelHandle::spawn(Panel::<SpidevInterface>::Unavailable).unwrap();
        handle.display(Frame::filled(Tone::Light, WIDTH, HEIGHT)).await.unwrap();
        handle.clone().clear().await.unwrap();
        drop(handle);
        tokio::task::spawn_blocking(move || worker.join()).await.unwrap().unwrap();
    }
}
