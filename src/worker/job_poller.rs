use crate::{client::Client, job::Job, proto};
use futures::stream::{BoxStream, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::{sync::mpsc, time::timeout};
use tracing::{error, trace, warn};

/// Events driving the poller.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PollMessage {
    /// The poll interval elapsed.
    Tick,
    /// Jobs are about to be handed to the dispatcher.
    Activated(u32),
    /// An activation request ended, successfully or not.
    ActivationDone,
    /// A handler returned.
    JobFinished,
}

/// Long-polls `ActivateJobs` whenever the jobs in flight drop to the
/// threshold, feeding activated jobs into the dispatcher queue.
pub(crate) struct JobPoller {
    pub(crate) client: Client,
    pub(crate) request: proto::ActivateJobsRequest,
    pub(crate) request_timeout: Duration,
    pub(crate) backlog: Backlog,
    pub(crate) job_queue: mpsc::Sender<Job>,
    pub(crate) poll_queue: mpsc::Sender<PollMessage>,
    pub(crate) messages: BoxStream<'static, PollMessage>,
}

impl fmt::Debug for JobPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobPoller")
            .field("job_type", &self.request.r#type)
            .field("backlog", &self.backlog)
            .finish()
    }
}

/// Bookkeeping of the jobs a worker holds.
///
/// `in_flight` is signed: a handler may report `JobFinished` before the
/// poller has seen the matching `Activated`.
#[derive(Debug)]
pub(crate) struct Backlog {
    capacity: i64,
    threshold: i64,
    in_flight: i64,
    fetching: bool,
}

impl Backlog {
    pub(crate) fn new(capacity: u32, threshold: u32) -> Self {
        Backlog {
            capacity: i64::from(capacity),
            threshold: i64::from(threshold),
            in_flight: 0,
            fetching: false,
        }
    }

    /// Apply `message`, returning how many jobs to request when an
    /// activation should start.
    fn update(&mut self, message: PollMessage) -> Option<u32> {
        match message {
            PollMessage::Activated(count) => self.in_flight += i64::from(count),
            PollMessage::JobFinished => self.in_flight -= 1,
            PollMessage::ActivationDone => self.fetching = false,
            PollMessage::Tick if !self.fetching && self.in_flight <= self.threshold => {
                let wanted = self.capacity - self.in_flight.max(0);
                if wanted > 0 {
                    self.fetching = true;
                    return Some(wanted as u32);
                }
            }
            PollMessage::Tick => {}
        }
        None
    }
}

impl JobPoller {
    /// Run until the message stream ends.
    pub(crate) async fn run(mut self) {
        while let Some(message) = self.messages.next().await {
            if let Some(wanted) = self.backlog.update(message) {
                self.spawn_activation(wanted);
            }
        }
    }

    fn spawn_activation(&self, wanted: u32) {
        let request = proto::ActivateJobsRequest {
            max_jobs_to_activate: wanted as i32,
            ..self.request.clone()
        };

        tokio::spawn(activate(
            self.client.clone(),
            request,
            self.request_timeout,
            self.job_queue.clone(),
            self.poll_queue.clone(),
        ));
    }
}

async fn activate(
    client: Client,
    request: proto::ActivateJobsRequest,
    request_timeout: Duration,
    job_queue: mpsc::Sender<Job>,
    poll_queue: mpsc::Sender<PollMessage>,
) {
    let worker = request.worker.clone();
    trace!(%worker, wanted = request.max_jobs_to_activate, "activating jobs");

    let mut activated = 0;
    match timeout(
        request_timeout,
        stream_jobs(client, request, &job_queue, &poll_queue, &mut activated),
    )
    .await
    {
        Ok(Ok(())) => trace!(%worker, activated, "activation finished"),
        Ok(Err(status)) => error!(%worker, %status, "failed to activate jobs"),
        Err(_) => warn!(%worker, activated, "job activation timed out"),
    }

    let _ = poll_queue.send(PollMessage::ActivationDone).await;
}

/// Hands every streamed job to the dispatcher. Each job is announced to the
/// poller first, so its `JobFinished` always queues behind its `Activated`.
async fn stream_jobs(
    mut client: Client,
    request: proto::ActivateJobsRequest,
    job_queue: &mpsc::Sender<Job>,
    poll_queue: &mpsc::Sender<PollMessage>,
    activated: &mut u32,
) -> Result<(), tonic::Status> {
    let mut stream = client
        .gateway_client
        .activate_jobs(tonic::Request::new(request))
        .await?
        .into_inner();

    while let Some(batch) = stream.message().await? {
        for job in batch.jobs {
            if poll_queue.send(PollMessage::Activated(1)).await.is_err() {
                // poller stopped
                return Ok(());
            }
            if job_queue.send(Job::new(job)).await.is_err() {
                // dispatcher stopped
                return Ok(());
            }
            *activated += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_requests_free_capacity() {
        let mut backlog = Backlog::new(10, 3);

        assert_eq!(backlog.update(PollMessage::Tick), Some(10));
        // one activation at a time
        assert_eq!(backlog.update(PollMessage::Tick), None);

        backlog.update(PollMessage::Activated(8));
        backlog.update(PollMessage::ActivationDone);
        assert_eq!(backlog.update(PollMessage::Tick), None);

        for _ in 0..5 {
            backlog.update(PollMessage::JobFinished);
        }
        assert_eq!(backlog.update(PollMessage::Tick), Some(7));
    }

    #[test]
    fn early_finish_is_not_lost() {
        let mut backlog = Backlog::new(2, 0);

        assert_eq!(backlog.update(PollMessage::Tick), Some(2));
        backlog.update(PollMessage::JobFinished);
        backlog.update(PollMessage::Activated(1));
        backlog.update(PollMessage::ActivationDone);

        assert_eq!(backlog.update(PollMessage::Tick), Some(2));
    }

    #[test]
    fn polling_resumes_after_many_early_finishes() {
        let mut backlog = Backlog::new(32, 9);
        assert_eq!(backlog.update(PollMessage::Tick), Some(32));

        for _ in 0..32 {
            backlog.update(PollMessage::JobFinished);
        }
        for _ in 0..32 {
            backlog.update(PollMessage::Activated(1));
        }
        backlog.update(PollMessage::ActivationDone);

        assert_eq!(backlog.update(PollMessage::Tick), Some(32));
    }
}
