use crate::client::Client;
use crate::error::{Error, Result};
use crate::job::Job;
use crate::proto;
use crate::worker::{job_dispatcher, Backlog, JobPoller, PollMessage};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::{sync::mpsc, time::interval};
use tokio_stream::{
    wrappers::{IntervalStream, ReceiverStream},
    StreamExt,
};

/// How long an activated job stays locked to this worker.
const JOB_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const MAX_JOBS_ACTIVE: u32 = 32;
const CONCURRENCY: u32 = 4;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Share of `max_jobs_active` below which new jobs are requested.
const POLL_THRESHOLD: f32 = 0.3;
/// Long polling time the gateway is asked for.
const ACTIVATION_LONG_POLL: Duration = Duration::from_secs(10);
/// Grace on top of the long polling time before an activation is given up.
const ACTIVATION_GRACE: Duration = Duration::from_secs(10);

type BoxedHandler = dyn Fn(Client, Job) -> BoxFuture<'static, ()> + Send + Sync;

#[derive(Clone)]
pub(crate) struct JobHandler(Arc<BoxedHandler>);

impl JobHandler {
    pub(crate) fn call(&self, client: Client, job: Job) -> BoxFuture<'static, ()> {
        (self.0)(client, job)
    }
}

impl fmt::Debug for JobHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JobHandler")
    }
}

/// A job worker for one job type, started with [`JobWorkerBuilder::run`].
#[derive(Debug)]
pub struct JobWorkerBuilder {
    client: Client,
    handler: Option<JobHandler>,
    concurrency: u32,
    poll_interval: Duration,
    request: proto::ActivateJobsRequest,
    activation_timeout: Duration,
}

impl JobWorkerBuilder {
    /// A worker with no job type and no handler yet.
    pub fn new(client: Client) -> Self {
        JobWorkerBuilder {
            client,
            handler: None,
            concurrency: CONCURRENCY,
            poll_interval: POLL_INTERVAL,
            request: proto::ActivateJobsRequest {
                r#type: String::new(),
                worker: String::from("default"),
                timeout: millis(JOB_TIMEOUT),
                max_jobs_to_activate: MAX_JOBS_ACTIVE as i32,
                fetch_variable: Vec::new(),
                request_timeout: millis(ACTIVATION_LONG_POLL),
            },
            activation_timeout: ACTIVATION_LONG_POLL + ACTIVATION_GRACE,
        }
    }

    /// The job type to activate, e.g. `get-time`.
    pub fn with_job_type<T: Into<String>>(mut self, job_type: T) -> Self {
        self.request.r#type = job_type.into();
        self
    }

    /// The name the broker records as owner of activated jobs.
    pub fn with_worker_name<T: Into<String>>(mut self, worker: T) -> Self {
        self.request.worker = worker.into();
        self
    }

    /// How long an activated job is locked to this worker before the broker
    /// hands it out again.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = millis(timeout);
        self
    }

    /// How long the gateway may hold an activation request open while
    /// waiting for jobs.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request.request_timeout = millis(request_timeout);
        self.activation_timeout = request_timeout + ACTIVATION_GRACE;
        self
    }

    /// Upper bound on jobs held by the worker at once.
    pub fn with_max_jobs_active(mut self, max_jobs_active: u32) -> Self {
        self.request.max_jobs_to_activate = i32::try_from(max_jobs_active).unwrap_or(i32::MAX);
        self
    }

    /// Upper bound on handlers running at once.
    pub fn with_concurrency(self, concurrency: u32) -> Self {
        JobWorkerBuilder {
            concurrency,
            ..self
        }
    }

    /// How often the worker checks whether to activate more jobs.
    pub fn with_poll_interval(self, poll_interval: Duration) -> Self {
        JobWorkerBuilder {
            poll_interval,
            ..self
        }
    }

    /// The function run for every activated job.
    ///
    /// The handler owns the job from activation on and reports the outcome
    /// through the client it is given, e.g. with [`Client::complete_job`].
    /// That client defaults to the key of the handled job.
    pub fn with_handler<T, R>(self, handler: T) -> Self
    where
        T: Fn(Client, Job) -> R + Send + Sync + 'static,
        R: Future<Output = ()> + Send + 'static,
    {
        let handler: Arc<BoxedHandler> = Arc::new(
            move |mut client: Client, job: Job| -> BoxFuture<'static, ()> {
                client.current_job_key = Some(job.key());
                Box::pin(handler(client, job))
            },
        );

        JobWorkerBuilder {
            handler: Some(JobHandler(handler)),
            ..self
        }
    }

    /// Only fetch the named variables with each job; all visible variables
    /// are fetched when empty.
    pub fn with_fetch_variables(mut self, fetch_variables: Vec<String>) -> Self {
        self.request.fetch_variable = fetch_variables;
        self
    }

    /// Run the worker. It never stops on its own, drop or abort the future
    /// to stop it.
    pub async fn run(self) -> Result<()> {
        let Some(handler) = self.handler.filter(|_| !self.request.r#type.is_empty()) else {
            return Err(Error::InvalidParameters(
                "`job_type` and `handler` must be set",
            ));
        };
        if self.concurrency == 0 || self.request.max_jobs_to_activate <= 0 {
            return Err(Error::InvalidParameters(
                "`concurrency` and `max_jobs_active` must be positive",
            ));
        }

        let capacity = self.request.max_jobs_to_activate as u32;
        let (job_queue, job_queue_rx) = mpsc::channel(capacity as usize);
        let (poll_queue, poll_queue_rx) = mpsc::channel(32);
        let ticks = IntervalStream::new(interval(self.poll_interval)).map(|_| PollMessage::Tick);
        let worker = self.request.worker.clone();
        tracing::debug!(%worker, job_type = %self.request.r#type, "starting job worker");

        let poller = JobPoller {
            client: self.client.clone(),
            request_timeout: self.activation_timeout,
            backlog: Backlog::new(capacity, (capacity as f32 * POLL_THRESHOLD).floor() as u32),
            job_queue,
            poll_queue: poll_queue.clone(),
            messages: Box::pin(futures::stream::select(
                ReceiverStream::new(poll_queue_rx),
                ticks,
            )),
            request: self.request,
        };

        futures::join!(
            poller.run(),
            job_dispatcher::run(
                job_queue_rx,
                poll_queue,
                self.concurrency as usize,
                handler,
                self.client,
                worker,
            )
        );

        Ok(())
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
