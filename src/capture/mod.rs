//! Periodic frame capture feeding the evaluator.
//!
//! A [`CaptureCycle`] opens its [`FrameSource`] once, then on every interval
//! tick grabs a frame, encodes it as PNG and evaluates it in the background.
//! Opening, grabbing and encoding run on the blocking pool.
//! Each request gets a sequence number and its own child cancellation token;
//! results arrive on a channel as [`EvaluationEvent`]s.

pub mod source;

pub use source::{FrameSource, ImageSequenceSource, StillFrameSource, encode_png};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::evaluation::Evaluator;

/// Grab and encode one frame off the async workers.
///
/// Hands the source back with the encoded frame, if one was ready.
async fn grab_png(
    mut source: Box<dyn FrameSource>,
) -> std::result::Result<(Box<dyn FrameSource>, Option<Result<Vec<u8>>>), tokio::task::JoinError> {
    tokio::task::spawn_blocking(move || {
        let png = source.grab().map(|frame| encode_png(&frame));
        (source, png)
    })
    .await
}

/// Evaluation text tagged with the sequence number of its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationEvent {
    pub seq: u64,
    pub text: String,
}

/// Monotonic request numbering shared by everything that produces trainer
/// lines in one session.
#[derive(Debug, Clone, Default)]
pub struct RequestSequence(Arc<AtomicU64>);

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next sequence number (the first is 1).
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The last number issued, 0 if none.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// A running capture loop.
pub struct CaptureCycle {
    cancel: CancellationToken,
    tracker: TaskTracker,
    issued: Arc<AtomicU64>,
}

impl CaptureCycle {
    /// Start capturing every `interval`; the first capture happens one full
    /// interval after start. Requests are numbered from `sequence`.
    pub fn start(
        mut source: Box<dyn FrameSource>,
        evaluator: Arc<dyn Evaluator>,
        interval: Duration,
        sequence: RequestSequence,
        events: mpsc::Sender<EvaluationEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let issued = Arc::new(AtomicU64::new(0));

        let loop_cancel = cancel.clone();
        let loop_tracker = tracker.clone();
        let loop_issued = Arc::clone(&issued);
        tracker.spawn(async move {
            let opened = tokio::task::spawn_blocking(move || {
                let result = source.open();
                (source, result)
            })
            .await;
            source = match opened {
                Ok((source, Ok(()))) => source,
                Ok((source, Err(e))) => {
                    error!(error = %e, "frame source unavailable, capturing blank video");
                    source
                }
                Err(e) => {
                    error!(error = %e, "frame source task failed");
                    return;
                }
            };

            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_ms = interval.as_millis() as u64, "capture cycle started");

            loop {
                tokio::select! {
                    _ = loop_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let grabbed = match grab_png(source).await {
                    Ok((returned, grabbed)) => {
                        source = returned;
                        grabbed
                    }
                    Err(e) => {
                        error!(error = %e, "frame capture task failed");
                        break;
                    }
                };
                let png = match grabbed {
                    Some(Ok(png)) => png,
                    Some(Err(e)) => {
                        warn!(error = %e, "frame dropped");
                        continue;
                    }
                    None => {
                        debug!("no frame ready, skipping tick");
                        continue;
                    }
                };

                let seq = sequence.next();
                loop_issued.fetch_add(1, Ordering::SeqCst);
                let token = loop_cancel.child_token();
                let evaluator = Arc::clone(&evaluator);
                let events = events.clone();
                loop_tracker.spawn(async move {
                    let result = tokio::select! {
                        _ = token.cancelled() => return,
                        result = evaluator.evaluate(png) => result,
                    };
                    match result {
                        Ok(text) => {
                            tokio::select! {
                                _ = token.cancelled() => {}
                                sent = events.send(EvaluationEvent { seq, text }) => {
                                    if sent.is_err() {
                                        debug!(seq, "evaluation receiver gone");
                                    }
                                }
                            }
                        }
                        Err(e) => warn!(seq, error = %e, "evaluation failed"),
                    }
                });
            }
            debug!("capture cycle stopped");
        });

        Self {
            cancel,
            tracker,
            issued,
        }
    }

    /// Cancel the interval and every in-flight request, then wait for them.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Requests this cycle has issued.
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }
}
