//! Job handlers for the job types of the `test-process` definition.
//!
//! A handler completes its job at most once. Failures are logged and the job
//! is left to time out on the broker.

use crate::greeting::{compose_greeting, GreetingError};
use crate::time_api::{Time, TimeApi, TimeApiError};
use crate::{Client, Job};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Job type served by [`handle_get_time`].
pub const GET_TIME: &str = "get-time";
/// Job type served by [`handle_make_greeting`].
pub const MAKE_GREETING: &str = "make-greeting";

/// Variables the `get-time` job completes with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GetTimeCompleteVariables {
    /// The time reported by the time API
    pub time: Time,
}

/// Why a job was abandoned.
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    /// The time API could not be queried.
    #[error(transparent)]
    TimeApi(#[from] TimeApiError),
    /// The greeting inputs are unusable.
    #[error(transparent)]
    Greeting(#[from] GreetingError),
    /// The completion could not be encoded or sent.
    #[error("could not complete job: {0}")]
    Complete(#[from] crate::Error),
}

/// Complete a `get-time` job with the current time.
pub async fn handle_get_time(client: Client, job: Job, time_api: TimeApi) {
    report(&job, get_time(&client, &job, &time_api).await);
}

/// Complete a `make-greeting` job with the composed greeting.
pub async fn handle_make_greeting(client: Client, job: Job) {
    report(&job, make_greeting(&client, &job).await);
}

async fn get_time(client: &Client, job: &Job, time_api: &TimeApi) -> Result<(), JobError> {
    let time = time_api.fetch().await?;
    debug!(time = %time.time, "fetched time");

    client
        .complete_job()
        .with_job_key(job.key())
        .with_variables_from(&GetTimeCompleteVariables { time })?
        .send()
        .await?;
    Ok(())
}

async fn make_greeting(client: &Client, job: &Job) -> Result<(), JobError> {
    let result = compose_greeting(job.variables_str(), job.custom_headers())?;
    info!(say = %result.say, "composed greeting");

    client
        .complete_job()
        .with_job_key(job.key())
        .with_variables_from(&result)?
        .send()
        .await?;
    Ok(())
}

fn report(job: &Job, result: Result<(), JobError>) {
    match result {
        Ok(()) => debug!(job = job.key(), job_type = job.job_type(), "job completed"),
        Err(err @ JobError::Complete(_)) => {
            error!(job = job.key(), job_type = job.job_type(), error = %err, "abandoning job")
        }
        Err(err) => {
            warn!(job = job.key(), job_type = job.job_type(), error = %err, "abandoning job")
        }
    }
}
