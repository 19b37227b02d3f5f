use crate::{client::Client, proto, Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace};

/// An activated Zeebe job that is ready to be worked on by a worker.
#[derive(Clone, Debug)]
pub struct Job(proto::ActivatedJob);

impl Job {
    pub(crate) fn new(proto: proto::ActivatedJob) -> Self {
        Job(proto)
    }

    /// Unique key of the job, used to complete it.
    pub fn key(&self) -> i64 {
        self.0.key
    }

    /// The job type the worker activated, e.g. `make-greeting`.
    pub fn job_type(&self) -> &str {
        &self.0.r#type
    }

    /// Key of the process instance the job belongs to.
    pub fn process_instance_key(&self) -> i64 {
        self.0.process_instance_key
    }

    /// BPMN process id of the job's process definition.
    pub fn bpmn_process_id(&self) -> &str {
        &self.0.bpmn_process_id
    }

    /// Retries left before the broker raises an incident.
    pub fn retries(&self) -> i32 {
        self.0.retries
    }

    /// Custom headers of the service task as JSON text.
    pub fn custom_headers(&self) -> &str {
        &self.0.custom_headers
    }

    /// Custom headers of the service task as a typed value.
    pub fn custom_headers_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(json_or_empty(&self.0.custom_headers))?)
    }

    /// Variables visible to the task at activation, as JSON text.
    pub fn variables_str(&self) -> &str {
        &self.0.variables
    }

    /// Variables visible to the task at activation, an empty object if unreadable.
    pub fn variables(&self) -> serde_json::Value {
        serde_json::from_str(&self.0.variables).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Variables visible to the task at activation as a typed value.
    pub fn variables_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(json_or_empty(&self.0.variables))?)
    }
}

/// The gateway sends an empty string rather than `{}` for empty documents.
fn json_or_empty(document: &str) -> &str {
    if document.trim().is_empty() {
        "{}"
    } else {
        document
    }
}

/// Reports a job as done, handing its variables to the process.
#[derive(Debug)]
pub struct CompleteJobBuilder {
    client: Client,
    job_key: Option<i64>,
    variables: Option<serde_json::Value>,
}

impl CompleteJobBuilder {
    /// A completion with no job key and no variables.
    pub fn new(client: Client) -> Self {
        CompleteJobBuilder {
            client,
            job_key: None,
            variables: None,
        }
    }

    /// Set the unique job identifier, as obtained from [`Job::key`].
    ///
    /// Inside a job handler the key of the job being handled is used when this
    /// is not set.
    pub fn with_job_key(self, job_key: i64) -> Self {
        CompleteJobBuilder {
            job_key: Some(job_key),
            ..self
        }
    }

    /// Variables merged into the task scope, a JSON object.
    pub fn with_variables<T: Into<serde_json::Value>>(self, variables: T) -> Self {
        CompleteJobBuilder {
            variables: Some(variables.into()),
            ..self
        }
    }

    /// Set the variables from any serializable payload.
    ///
    /// Fails when the payload cannot be represented as JSON.
    pub fn with_variables_from<T: Serialize>(self, variables: &T) -> Result<Self> {
        Ok(self.with_variables(serde_json::to_value(variables)?))
    }

    /// Send the completion.
    #[tracing::instrument(skip(self), name = "complete_job", err)]
    pub async fn send(mut self) -> Result<CompleteJobResponse> {
        let job_key = self
            .job_key
            .or(self.client.current_job_key)
            .ok_or(Error::InvalidParameters("`job_key` must be set"))?;
        let req = proto::CompleteJobRequest {
            job_key,
            variables: self
                .variables
                .map_or(String::new(), |vars| vars.to_string()),
        };

        debug!(job_key = req.job_key, "completing job:");
        trace!(?req, "request:");
        let res = self
            .client
            .gateway_client
            .complete_job(tonic::Request::new(req))
            .await?;

        Ok(CompleteJobResponse(res.into_inner()))
    }
}

/// Acknowledgment of a completion.
#[derive(Debug)]
pub struct CompleteJobResponse(proto::CompleteJobResponse);
