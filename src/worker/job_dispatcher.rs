use crate::{
    client::Client,
    job::Job,
    worker::{JobHandler, PollMessage},
};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::Instrument;

/// Runs activated jobs with at most `concurrency` handlers in flight and
/// reports each finished job back to the poller.
pub(crate) async fn run(
    mut job_queue: mpsc::Receiver<Job>,
    poll_queue: mpsc::Sender<PollMessage>,
    concurrency: usize,
    handler: JobHandler,
    job_client: Client,
    worker: String,
) {
    let concurrent_jobs = Arc::new(Semaphore::new(concurrency));

    while let Some(job) = job_queue.recv().await {
        let Ok(job_slot) = concurrent_jobs.clone().acquire_owned().await else {
            // the semaphore is never closed
            return;
        };
        let task = JobTask {
            job,
            job_client: job_client.clone(),
            poll_queue: poll_queue.clone(),
            handler: handler.clone(),
            worker: worker.clone(),
        };

        let span = tracing::info_span!(
            "job",
            worker = %task.worker,
            job_type = %task.job.job_type(),
            job = task.job.key(),
        );
        tokio::spawn(
            async move {
                let key = task.job.key();
                tracing::trace!(?key, "dispatching job");
                task.handler.call(task.job_client, task.job).await;

                tracing::trace!(?key, "job handler finished");
                let _ = task.poll_queue.send(PollMessage::JobFinished).await;
                drop(job_slot);
            }
            .instrument(span),
        );
    }
}

struct JobTask {
    job: Job,
    job_client: Client,
    poll_queue: mpsc::Sender<PollMessage>,
    handler: JobHandler,
    worker: String,
}
