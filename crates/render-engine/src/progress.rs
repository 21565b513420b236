//! Progress reporter: samples a job on a fixed cadence while it renders.
//!
//! Samples go through a bounded channel and are dropped when the listener
//! lags. When the job reaches a terminal state the reporter emits exactly
//! one final `1.0` event, waiting for channel space if needed, and exits.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::job::{ExportJob, ExportStatus};

/// One progress update in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub progress: f64,
}

/// Spawn the reporter for `job`, returning the listener side of the channel.
pub fn spawn_reporter(
    job: Arc<ExportJob>,
    interval: Duration,
    capacity: usize,
) -> (mpsc::Receiver<ProgressEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(report(job, tx, interval));
    (rx, handle)
}

async fn report(job: Arc<ExportJob>, tx: mpsc::Sender<ProgressEvent>, interval: Duration) {
    let mut status = job.subscribe();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut dropped = 0u64;

    loop {
        if status.borrow_and_update().is_terminal() {
            break;
        }

        tokio::select! {
            biased;
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if job.status() != ExportStatus::Rendering {
                    continue;
                }
                let progress = job.progress();
                // 1.0 is reserved for the terminal event.
                if progress >= 1.0 {
                    continue;
                }
                match tx.try_send(ProgressEvent { progress }) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => dropped += 1,
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(job = %job.id(), "Progress listener went away");
                        return;
                    }
                }
            }
        }
    }

    if dropped > 0 {
        tracing::debug!(job = %job.id(), dropped, "Dropped progress samples for a slow listener");
    }
    let _ = tx.send(ProgressEvent { progress: 1.0 }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use retime_common::error::RetimeError;
    use retime_media_model::request::OutputContainer;

    const TICK: Duration = Duration::from_millis(5);

    async fn drain(mut rx: mpsc::Receiver<ProgressEvent>) -> Vec<f64> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.progress);
        }
        events
    }

    #[tokio::test]
    async fn test_samples_while_rendering_then_final_event() {
        let job = Arc::new(ExportJob::new("/tmp/out.mp4", OutputContainer::Mp4));
        let (rx, handle) = spawn_reporter(job.clone(), TICK, 64);

        job.advance(ExportStatus::Preparing);
        job.advance(ExportStatus::Rendering);
        for step in 1..=5 {
            job.progress_cell().set(step as f64 * 0.1);
            tokio::time::sleep(TICK * 3).await;
        }
        job.finish(&Ok::<(), RetimeError>(()));
        handle.await.unwrap();

        let events = drain(rx).await;
        assert!(events.len() >= 2, "expected samples, got {events:?}");
        assert_eq!(events.last(), Some(&1.0));
        assert_eq!(events.iter().filter(|p| **p == 1.0).count(), 1);
        assert!(events.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_failure_in_preparing_still_emits_final_event() {
        let job = Arc::new(ExportJob::new("/tmp/out.mp4", OutputContainer::Mp4));
        let (rx, handle) = spawn_reporter(job.clone(), TICK, 4);

        job.advance(ExportStatus::Preparing);
        tokio::time::sleep(TICK * 4).await;
        job.finish(&Err::<(), _>(RetimeError::unsupported("no video")));
        handle.await.unwrap();

        assert_eq!(drain(rx).await, vec![1.0]);
    }

    #[tokio::test]
    async fn test_slow_listener_still_gets_final_event_last() {
        let job = Arc::new(ExportJob::new("/tmp/out.mp4", OutputContainer::Mp4));
        let (mut rx, handle) = spawn_reporter(job.clone(), Duration::from_millis(1), 1);

        job.advance(ExportStatus::Preparing);
        job.advance(ExportStatus::Rendering);
        job.progress_cell().set(0.5);
        tokio::time::sleep(Duration::from_millis(20)).await;
        job.cancel();
        job.finish(&Err::<(), _>(RetimeError::Cancelled));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.progress);
        }
        handle.await.unwrap();

        assert_eq!(events.last(), Some(&1.0));
        assert_eq!(events.iter().filter(|p| **p == 1.0).count(), 1);
        assert_eq!(job.status(), ExportStatus::Cancelled);
    }
}
