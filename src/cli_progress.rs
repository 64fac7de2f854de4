/*!
 * CLI progress renderer for interactive terminal display
 *
 * Consumes job snapshots from a [`JobReporter`](crate::core::events::JobReporter)
 * channel and draws one indicatif bar per job.
 */

use crate::core::events::JobEvent;
use crate::core::path::format_file_size;
use crate::core::transfer::{JobKind, JobStatus, TransferJob};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use uuid::Uuid;

const BAR_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";

/// CLI progress renderer
pub struct CliProgressRenderer {
    multi: MultiProgress,
    bars: HashMap<Uuid, ProgressBar>,
    show_progress: bool,
}

impl CliProgressRenderer {
    pub fn new(show_progress: bool) -> Self {
        let multi = if show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        Self {
            multi,
            bars: HashMap::new(),
            show_progress,
        }
    }

    /// Render events until every sender is dropped
    pub async fn run(mut self, mut events: UnboundedReceiver<JobEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(&event.job);
        }
        for (_, bar) in self.bars.drain() {
            bar.abandon();
        }
    }

    /// Spawn the renderer on the tokio runtime
    pub fn spawn(self, events: UnboundedReceiver<JobEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    fn handle_event(&mut self, job: &TransferJob) {
        if !self.show_progress {
            return;
        }

        let multi = &self.multi;
        let bar = self.bars.entry(job.id).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(job.progress.total));
            if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        });

        bar.set_length(job.progress.total);
        bar.set_position(job.progress.loaded);

        if job.is_finished() {
            bar.finish_with_message(job_summary(job));
            self.bars.remove(&job.id);
        } else {
            bar.set_message(job_summary(job));
        }
    }
}

/// One-line description of a job's state
pub fn job_summary(job: &TransferJob) -> String {
    let verb = match job.kind {
        JobKind::Download => "Downloading",
        JobKind::Upload => "Uploading",
    };

    let icon = if job.is_folder_job() { "📁" } else { "📄" };

    let mut line = match job.status {
        JobStatus::Loading => format!("{} {} {}", icon, verb, job.name),
        JobStatus::Paused => format!("⏸ {} (paused)", job.name),
        JobStatus::Completed => format!(
            "✓ {} - {}",
            job.name,
            format_file_size(job.progress.total)
        ),
        JobStatus::Failed => format!(
            "✗ {} - {}",
            job.name,
            job.error.as_deref().unwrap_or("failed")
        ),
    };

    if !job.sub_jobs.is_empty() {
        let done = job
            .sub_jobs
            .iter()
            .filter(|s| s.status == JobStatus::Completed)
            .count();
        line.push_str(&format!(" ({}/{} files)", done, job.sub_jobs.len()));
    }
    if let Some(message) = &job.message {
        line.push_str(&format!(" [{}]", message));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ObjectRef;
    use crate::core::events::JobReporter;
    use crate::core::progress::Progress;
    use std::path::PathBuf;

    fn job(kind: JobKind) -> TransferJob {
        TransferJob::new(
            ObjectRef::from_key("c", "b", "photos/cat.png").with_size(2048),
            PathBuf::from("/tmp/cat.png"),
            kind,
        )
    }

    #[test]
    fn test_summary_for_each_status() {
        let mut j = job(JobKind::Download);
        assert_eq!(job_summary(&j), "📄 Downloading cat.png");

        j.status = JobStatus::Completed;
        j.progress = Progress::new(2048, 2048);
        assert_eq!(job_summary(&j), "✓ cat.png - 2 KB");

        j.status = JobStatus::Failed;
        j.error = Some("s3: timeout: slow".to_string());
        assert_eq!(job_summary(&j), "✗ cat.png - s3: timeout: slow");
    }

    #[test]
    fn test_summary_counts_sub_jobs() {
        let mut parent = job(JobKind::Upload);
        let mut done = job(JobKind::Upload);
        done.status = JobStatus::Completed;
        parent.sub_jobs = vec![done, job(JobKind::Upload)];
        assert_eq!(job_summary(&parent), "📁 Uploading cat.png (1/2 files)");
    }

    #[test]
    fn test_summary_marks_folder_before_enumeration() {
        let folder = TransferJob::new(
            ObjectRef::folder("c", "b", "photos"),
            PathBuf::from("/tmp/photos"),
            JobKind::Download,
        );
        assert!(folder.is_folder_job());
        assert!(!folder.is_finished());
        assert_eq!(job_summary(&folder), "📁 Downloading photos");
    }

    #[tokio::test]
    async fn test_renderer_drains_channel() {
        let (reporter, events) = JobReporter::channel();
        let handle = CliProgressRenderer::new(false).spawn(events);

        let mut j = job(JobKind::Download);
        reporter.emit(&j);
        j.status = JobStatus::Completed;
        reporter.emit(&j);
        drop(reporter);

        handle.await.unwrap();
    }
}
