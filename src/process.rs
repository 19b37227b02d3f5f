use crate::{proto, Client, Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::{debug, trace};

/// Version number the gateway reads as "latest".
const LATEST_VERSION: i32 = -1;

/// Deploys one or more resources to Zeebe.
///
/// Note that this is an atomic call, i.e. either all resources are deployed,
/// or none of them are.
#[derive(Debug)]
pub struct DeployResourceBuilder {
    client: Client,
    resource_files: Vec<String>,
    resources: Vec<proto::Resource>,
}

impl DeployResourceBuilder {
    /// Create a new deploy resource builder.
    pub fn new(client: Client) -> Self {
        DeployResourceBuilder {
            client,
            resource_files: Vec::new(),
            resources: Vec::new(),
        }
    }

    /// Add a resource file to upload, read from disk when the request is sent.
    pub fn with_resource_file<T: Into<String>>(mut self, resource_file: T) -> Self {
        self.resource_files.push(resource_file.into());
        self
    }

    /// Add an in-memory resource, e.g. `("order-process.bpmn", bytes)`.
    pub fn with_resource<N: Into<String>, C: Into<Vec<u8>>>(mut self, name: N, content: C) -> Self {
        self.resources.push(proto::Resource {
            name: name.into(),
            content: content.into(),
        });
        self
    }

    /// Submit the resources to the Zeebe brokers.
    #[tracing::instrument(skip(self), name = "deploy_resource", err)]
    pub async fn send(mut self) -> Result<DeployResourceResponse> {
        trace!(files = ?self.resource_files, "reading files");
        for path in self.resource_files.iter() {
            let content = tokio::fs::read(path).await.map_err(|e| Error::FileIo {
                resource_file: path.clone(),
                source: e,
            })?;
            self.resources.push(proto::Resource {
                name: resource_name(path),
                content,
            });
        }

        if self.resources.is_empty() {
            return Err(Error::InvalidParameters(
                "at least one resource must be set",
            ));
        }

        let names: Vec<_> = self.resources.iter().map(|r| r.name.as_str()).collect();
        debug!(resources = ?names, "sending request");

        let res = self
            .client
            .gateway_client
            .deploy_resource(tonic::Request::new(proto::DeployResourceRequest {
                resources: self.resources,
                tenant_id: String::new(),
            }))
            .await?;
        Ok(DeployResourceResponse(res.into_inner()))
    }
}

/// The gateway expects the bare file name, its extension selects the parser.
fn resource_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Deployed resources data.
#[derive(Debug)]
pub struct DeployResourceResponse(proto::DeployResourceResponse);

impl DeployResourceResponse {
    /// the unique key identifying the deployment
    pub fn key(&self) -> i64 {
        self.0.key
    }

    /// the processes contained in the deployment
    pub fn processes(&self) -> impl Iterator<Item = ProcessMetadata<'_>> {
        self.0
            .deployments
            .iter()
            .filter_map(|deployment| match &deployment.metadata {
                Some(proto::deployment::Metadata::Process(process)) => {
                    Some(ProcessMetadata(process))
                }
                None => None,
            })
    }
}

/// Metadata information about a process.
#[derive(Debug)]
pub struct ProcessMetadata<'a>(&'a proto::ProcessMetadata);

impl<'a> ProcessMetadata<'a> {
    /// the bpmn process ID, as parsed during deployment; together with the version
    /// forms a unique identifier for a specific process definition
    pub fn bpmn_process_id(&self) -> &'a str {
        let process = self.0;
        &process.bpmn_process_id
    }

    /// the assigned process version
    pub fn version(&self) -> i32 {
        self.0.version
    }

    /// the assigned key, which acts as a unique identifier for this process
    pub fn process_definition_key(&self) -> i64 {
        self.0.process_definition_key
    }

    /// the resource name from which this process was parsed
    pub fn resource_name(&self) -> &'a str {
        let process = self.0;
        &process.resource_name
    }
}

/// Starts an instance of a deployed process and waits for it to complete.
///
/// The definition is picked either by its key, as returned by
/// [`DeployResourceResponse`], or by BPMN process id and version.
#[derive(Debug)]
pub struct CreateProcessInstanceWithResultBuilder {
    client: Client,
    instance: proto::CreateProcessInstanceRequest,
    variables: Option<serde_json::Value>,
    /// in ms, zero leaves the wait to the gateway's default
    request_timeout: u64,
    fetch_variables: Vec<String>,
}

impl CreateProcessInstanceWithResultBuilder {
    /// Start from the latest version of no process in particular.
    pub fn new(client: Client) -> Self {
        CreateProcessInstanceWithResultBuilder {
            client,
            instance: proto::CreateProcessInstanceRequest {
                version: LATEST_VERSION,
                ..Default::default()
            },
            variables: None,
            request_timeout: 0,
            fetch_variables: Vec::new(),
        }
    }

    /// Pick the definition by its unique key.
    pub fn with_process_definition_key(mut self, key: i64) -> Self {
        self.instance.process_definition_key = key;
        self
    }

    /// Pick the definition by BPMN process id, e.g. `test-process`.
    pub fn with_bpmn_process_id<T: Into<String>>(mut self, bpmn_process_id: T) -> Self {
        self.instance.bpmn_process_id = bpmn_process_id.into();
        self
    }

    /// Pin a version of the BPMN process id.
    pub fn with_version(mut self, version: i32) -> Self {
        self.instance.version = version;
        self
    }

    /// Use whatever version was deployed last, the default.
    pub fn with_latest_version(self) -> Self {
        self.with_version(LATEST_VERSION)
    }

    /// The root scope variables the instance starts with, a JSON object.
    pub fn with_variables<T: Into<serde_json::Value>>(self, variables: T) -> Self {
        CreateProcessInstanceWithResultBuilder {
            variables: Some(variables.into()),
            ..self
        }
    }

    /// Like [`with_variables`](Self::with_variables) for any serializable value.
    pub fn with_variables_from<T: Serialize>(self, variables: &T) -> Result<Self> {
        Ok(self.with_variables(serde_json::to_value(variables)?))
    }

    /// Return only the named variables with the result.
    pub fn with_fetch_variables(self, fetch_variables: Vec<String>) -> Self {
        CreateProcessInstanceWithResultBuilder {
            fetch_variables,
            ..self
        }
    }

    /// How long (in ms) the gateway waits for the instance to complete.
    pub fn with_request_timeout(self, request_timeout: u64) -> Self {
        CreateProcessInstanceWithResultBuilder {
            request_timeout,
            ..self
        }
    }

    /// Start the instance and wait for its result.
    #[tracing::instrument(skip(self), name = "create_process_instance_with_result", err)]
    pub async fn send(mut self) -> Result<CreateProcessInstanceWithResultResponse> {
        if self.instance.process_definition_key == 0 && self.instance.bpmn_process_id.is_empty() {
            return Err(Error::InvalidParameters(
                "`process_definition_key` or `bpmn_process_id` must be set",
            ));
        }
        self.instance.variables = self
            .variables
            .map_or_else(String::new, |variables| variables.to_string());
        let req = proto::CreateProcessInstanceWithResultRequest {
            request: Some(self.instance),
            request_timeout: i64::try_from(self.request_timeout).unwrap_or(i64::MAX),
            fetch_variables: self.fetch_variables,
        };

        debug!(?req, "starting process instance");
        let res = self
            .client
            .gateway_client
            .create_process_instance_with_result(tonic::Request::new(req))
            .await?;

        Ok(CreateProcessInstanceWithResultResponse(res.into_inner()))
    }
}

/// The outcome of a completed process instance.
#[derive(Debug)]
pub struct CreateProcessInstanceWithResultResponse(proto::CreateProcessInstanceWithResultResponse);

impl CreateProcessInstanceWithResultResponse {
    /// Key of the definition the instance ran.
    pub fn process_definition_key(&self) -> i64 {
        self.0.process_definition_key
    }

    /// BPMN process id of the definition the instance ran.
    pub fn bpmn_process_id(&self) -> &str {
        &self.0.bpmn_process_id
    }

    /// Version of the definition the instance ran.
    pub fn version(&self) -> i32 {
        self.0.version
    }

    /// Key of the finished instance.
    pub fn process_instance_key(&self) -> i64 {
        self.0.process_instance_key
    }

    /// Root scope variables at completion as JSON text.
    pub fn variables_str(&self) -> &str {
        &self.0.variables
    }

    /// Root scope variables at completion, an empty object if unreadable.
    pub fn variables(&self) -> serde_json::Value {
        serde_json::from_str(&self.0.variables).unwrap_or_else(|_| serde_json::json!({}))
    }

    /// Root scope variables at completion as a typed value.
    pub fn variables_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.0.variables)?)
    }
}
