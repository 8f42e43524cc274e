//! Polling loop: capture → decode → compare → analyse → persist → notify.
//!
//! Iterations run strictly one after another on a fixed delay. Every
//! failure inside an iteration, including a panic, is logged with its phase
//! and the loop moves on; only the cancellation token ends [`Poller::run`].

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::analysis::Analyzer;
use crate::capture::CaptureSource;
use crate::config::GlobalConfig;
use crate::detector::{is_different, ImagePayload};
use crate::history::{HistoryRecord, HistoryStore, FIRST_CAPTURE_DESCRIPTION};
use crate::notify::Notifier;
use crate::{AppError, Result};

/// Tunables for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    /// Hamming distance that must be strictly exceeded to trigger analysis.
    pub threshold: u32,
    /// Hash grid side length.
    pub hash_size: u32,
    /// Delay between iterations.
    pub poll_interval: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            threshold: crate::detector::DEFAULT_THRESHOLD,
            hash_size: crate::detector::DEFAULT_HASH_SIZE,
            poll_interval: Duration::from_secs(30),
        }
    }
}

impl From<&GlobalConfig> for PollerSettings {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            threshold: config.detector.threshold,
            hash_size: config.detector.hash_size,
            poll_interval: config.poll_interval(),
        }
    }
}

/// How one iteration ended.
#[derive(Debug)]
pub enum IterationOutcome {
    /// A phase failed; the rest of the iteration was skipped.
    Skipped(AppError),
    /// The frame is perceptually identical to the last recorded one.
    Unchanged {
        /// Hamming distance to the previous fingerprint.
        distance: Option<u32>,
    },
    /// The analysis reported a hand in frame; nothing was persisted.
    HandDetected,
    /// A new record was appended to the history.
    Recorded {
        /// Whether the analysis reported a replaced item.
        item_changed: bool,
        /// Whether a change notification was delivered.
        notified: bool,
    },
    /// The iteration task panicked.
    Panicked(String),
}

/// Drives the capture/change-detection loop over injected collaborators.
pub struct Poller {
    capture: Arc<dyn CaptureSource>,
    analyzer: Arc<dyn Analyzer>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn HistoryStore>,
    settings: PollerSettings,
}

impl Poller {
    /// Assemble a poller.
    #[must_use]
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        analyzer: Arc<dyn Analyzer>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn HistoryStore>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            capture,
            analyzer,
            notifier,
            store,
            settings,
        }
    }

    /// Loop until `cancel` fires.
    ///
    /// An in-flight iteration is aborted on cancellation; dropping it still
    /// tears down any monitor process it owns.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut iteration: u64 = 0;
        loop {
            iteration += 1;
            let task = tokio::spawn(Arc::clone(&self).iterate(iteration));
            let abort = task.abort_handle();

            tokio::select! {
                joined = task => {
                    log_join(joined);
                }
                () = cancel.cancelled() => {
                    abort.abort();
                    info!(iteration, "poller cancelled mid-iteration");
                    break;
                }
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
        info!("poller stopped");
    }

    /// Run exactly one iteration in its own task, containing panics.
    pub async fn run_once(self: Arc<Self>) -> IterationOutcome {
        log_join(tokio::spawn(self.iterate(1)).await)
    }

    async fn iterate(self: Arc<Self>, iteration: u64) -> IterationOutcome {
        let span = info_span!("iteration", n = iteration);
        self.run_iteration().instrument(span).await
    }

    /// Run one iteration on the current task.
    pub async fn run_iteration(&self) -> IterationOutcome {
        match self.try_iteration().await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(phase = err.phase(), %err, "iteration skipped");
                IterationOutcome::Skipped(err)
            }
        }
    }

    async fn try_iteration(&self) -> Result<IterationOutcome> {
        info!("capturing image");
        let payload = self.capture.capture().await?;

        let hash_size = self.settings.hash_size;
        let image = tokio::task::spawn_blocking(move || ImagePayload::decode(payload, hash_size))
            .await
            .map_err(|err| AppError::Decode(format!("fingerprint worker failed: {err}")))??;

        let latest = self.store.latest()?;
        let previous = latest.as_ref().and_then(|record| record.fingerprint.as_ref());
        let distance = previous.and_then(|prev| image.fingerprint.distance(prev));
        if !is_different(&image.fingerprint, previous, self.settings.threshold) {
            info!(
                fingerprint = %image.fingerprint,
                distance,
                threshold = self.settings.threshold,
                "no significant change, skipping analysis"
            );
            return Ok(IterationOutcome::Unchanged { distance });
        }
        info!(fingerprint = %image.fingerprint, distance, "frame changed, analysing");

        let prior = latest
            .as_ref()
            .map_or(FIRST_CAPTURE_DESCRIPTION, |record| record.description.as_str());
        let verdict = self.analyzer.analyze(&image.base64, prior).await?;

        if verdict.is_hand() {
            info!("hand in frame, discarding capture");
            return Ok(IterationOutcome::HandDetected);
        }

        let item_changed = verdict.item_changed();
        self.store.append(HistoryRecord::new(
            image.fingerprint,
            verdict.description.clone(),
            verdict.is_the_same,
        ))?;
        info!(item_changed, "result saved");

        let notified = if item_changed {
            match self.notifier.notify(&verdict.description).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(phase = err.phase(), %err, "change notification failed");
                    false
                }
            }
        } else {
            false
        };

        Ok(IterationOutcome::Recorded {
            item_changed,
            notified,
        })
    }
}

fn log_join(
    joined: std::result::Result<IterationOutcome, tokio::task::JoinError>,
) -> IterationOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%err, "iteration task failed");
            IterationOutcome::Panicked(err.to_string())
        }
    }
}
