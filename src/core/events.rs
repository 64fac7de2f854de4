//! Outbound job snapshots
//!
//! Every emission carries a full copy of the job tree. Consumers replace their
//! view of a job id wholesale instead of applying diffs.
//!
//! ```no_run
//! use orbit_cloud::core::events::JobReporter;
//!
//! let (reporter, mut events) = JobReporter::channel();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         println!("{} {}%", event.job.name, event.job.progress.percentage);
//!     }
//! });
//! # drop(reporter);
//! ```

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::transfer::TransferJob;

/// Snapshot of one job at the moment it was emitted
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job: TransferJob,
}

/// Sending half of the job event channel
#[derive(Debug, Clone)]
pub struct JobReporter {
    sender: Arc<UnboundedSender<JobEvent>>,
}

impl JobReporter {
    pub fn channel() -> (Self, UnboundedReceiver<JobEvent>) {
        let (sender, receiver) = unbounded_channel();
        (
            Self {
                sender: Arc::new(sender),
            },
            receiver,
        )
    }

    /// Reporter whose events go nowhere
    pub fn disabled() -> Self {
        let (reporter, _) = Self::channel();
        reporter
    }

    /// Emit a snapshot of `job`
    pub fn emit(&self, job: &TransferJob) {
        // The receiver may be gone; transfers keep running regardless
        let _ = self.sender.send(JobEvent { job: job.clone() });
    }
}

impl Default for JobReporter {
    fn default() -> Self {
        Self::disabled()
    }
}
