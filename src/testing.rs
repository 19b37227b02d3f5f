//! In-process stand-ins for the Zeebe gateway and the time API.

use crate::{
    job::Job,
    proto::{
        self,
        gateway_server::{Gateway, GatewayServer},
    },
    Client, ClientConfig,
};
use futures::Stream;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{transport::Server, Request, Response, Status};

/// A command received by the mock gateway.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    Topology,
    DeployResource(Vec<String>),
    ActivateJobs(String),
    CompleteJob {
        job_key: i64,
        variables: Value,
    },
    CreateProcessInstanceWithResult {
        bpmn_process_id: String,
        version: i32,
        variables: Value,
        request_timeout: i64,
    },
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    activations: Vec<proto::ActivateJobsRequest>,
    creations: Vec<proto::CreateProcessInstanceWithResultRequest>,
    jobs: VecDeque<proto::ActivatedJob>,
    result_variables: Option<Value>,
    create_error: Option<tonic::Code>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct MockGateway {
    state: Arc<Mutex<State>>,
}

impl MockGateway {
    pub(crate) fn new() -> Self {
        MockGateway::default()
    }

    /// Variables returned when a process instance is created with result.
    pub(crate) fn with_result_variables(self, variables: Value) -> Self {
        self.state.lock().unwrap().result_variables = Some(variables);
        self
    }

    /// Reject process instance creation with the given status code.
    pub(crate) fn with_create_error(self, code: tonic::Code) -> Self {
        self.state.lock().unwrap().create_error = Some(code);
        self
    }

    /// Queue a job to be handed out by `ActivateJobs`.
    pub(crate) fn push_job(&self, job: proto::ActivatedJob) {
        self.state.lock().unwrap().jobs.push_back(job);
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Every `ActivateJobs` request as received.
    pub(crate) fn activations(&self) -> Vec<proto::ActivateJobsRequest> {
        self.state.lock().unwrap().activations.clone()
    }

    /// Every `CreateProcessInstanceWithResult` request as received.
    pub(crate) fn creations(&self) -> Vec<proto::CreateProcessInstanceWithResultRequest> {
        self.state.lock().unwrap().creations.clone()
    }

    pub(crate) fn completions(&self) -> Vec<(i64, Value)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CompleteJob { job_key, variables } => Some((job_key, variables)),
                _ => None,
            })
            .collect()
    }

    /// Wait until the recorded calls satisfy `predicate`, panicking after 5s.
    pub(crate) async fn wait_for<F: Fn(&[Call]) -> bool>(&self, predicate: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !predicate(&self.calls()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("mock gateway never received the expected calls");
    }

    /// Serve the mock on a random local port and connect a client to it.
    pub(crate) async fn serve(self) -> Client {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(
            Server::builder()
                .add_service(GatewayServer::new(self))
                .serve_with_incoming(TcpListenerStream::new(listener)),
        );

        Client::from_config(ClientConfig::with_endpoint(format!("http://{}", address))).unwrap()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

fn parse_variables(variables: &str) -> Value {
    if variables.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(variables).unwrap()
    }
}

type ActivateJobsStream =
    Pin<Box<dyn Stream<Item = Result<proto::ActivateJobsResponse, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl Gateway for MockGateway {
    type ActivateJobsStream = ActivateJobsStream;

    async fn activate_jobs(
        &self,
        request: Request<proto::ActivateJobsRequest>,
    ) -> Result<Response<Self::ActivateJobsStream>, Status> {
        let request = request.into_inner();
        self.record(Call::ActivateJobs(request.r#type.clone()));

        let jobs = {
            let mut state = self.state.lock().unwrap();
            state.activations.push(request.clone());
            let max = request.max_jobs_to_activate.max(0) as usize;
            let (matching, rest): (VecDeque<_>, VecDeque<_>) = state
                .jobs
                .drain(..)
                .partition(|job| job.r#type == request.r#type);
            state.jobs = rest;

            let mut matching = matching;
            let take = max.min(matching.len());
            let activated: Vec<_> = matching
                .drain(..take)
                .map(|job| proto::ActivatedJob {
                    worker: request.worker.clone(),
                    ..job
                })
                .collect();
            state.jobs.extend(matching);
            activated
        };

        let responses = if jobs.is_empty() {
            Vec::new()
        } else {
            vec![Ok(proto::ActivateJobsResponse { jobs })]
        };
        Ok(Response::new(Box::pin(tokio_stream::iter(responses))))
    }

    async fn complete_job(
        &self,
        request: Request<proto::CompleteJobRequest>,
    ) -> Result<Response<proto::CompleteJobResponse>, Status> {
        let request = request.into_inner();
        self.record(Call::CompleteJob {
            job_key: request.job_key,
            variables: parse_variables(&request.variables),
        });
        Ok(Response::new(proto::CompleteJobResponse {}))
    }

    async fn create_process_instance_with_result(
        &self,
        request: Request<proto::CreateProcessInstanceWithResultRequest>,
    ) -> Result<Response<proto::CreateProcessInstanceWithResultResponse>, Status> {
        let request = request.into_inner();
        self.state.lock().unwrap().creations.push(request.clone());
        let create = request.request.unwrap_or_default();
        self.record(Call::CreateProcessInstanceWithResult {
            bpmn_process_id: create.bpmn_process_id.clone(),
            version: create.version,
            variables: parse_variables(&create.variables),
            request_timeout: request.request_timeout,
        });

        let state = self.state.lock().unwrap();
        if let Some(code) = state.create_error {
            return Err(Status::new(code, "rejected by mock gateway"));
        }
        Ok(Response::new(proto::CreateProcessInstanceWithResultResponse {
            process_definition_key: 1,
            bpmn_process_id: create.bpmn_process_id,
            version: 1,
            process_instance_key: 100,
            variables: state
                .result_variables
                .clone()
                .unwrap_or_else(|| json!({}))
                .to_string(),
        }))
    }

    async fn deploy_resource(
        &self,
        request: Request<proto::DeployResourceRequest>,
    ) -> Result<Response<proto::DeployResourceResponse>, Status> {
        let request = request.into_inner();
        let names = request
            .resources
            .iter()
            .map(|resource| resource.name.clone())
            .collect();
        self.record(Call::DeployResource(names));

        let deployments = request
            .resources
            .into_iter()
            .enumerate()
            .map(|(index, resource)| proto::Deployment {
                metadata: Some(proto::deployment::Metadata::Process(
                    proto::ProcessMetadata {
                        bpmn_process_id: resource
                            .name
                            .trim_end_matches(".bpmn")
                            .to_string(),
                        version: 1,
                        process_definition_key: index as i64 + 1,
                        resource_name: resource.name,
                        tenant_id: String::new(),
                    },
                )),
            })
            .collect();

        Ok(Response::new(proto::DeployResourceResponse {
            key: 1,
            deployments,
            tenant_id: String::new(),
        }))
    }

    async fn topology(
        &self,
        _request: Request<proto::TopologyRequest>,
    ) -> Result<Response<proto::TopologyResponse>, Status> {
        self.record(Call::Topology);
        Ok(Response::new(proto::TopologyResponse {
            brokers: vec![proto::BrokerInfo {
                node_id: 0,
                host: "localhost".to_string(),
                port: 26501,
                partitions: vec![proto::Partition {
                    partition_id: 1,
                    role: proto::partition::PartitionBrokerRole::Leader as i32,
                    health: proto::partition::PartitionBrokerHealth::Healthy as i32,
                }],
                version: "8.5.0".to_string(),
            }],
            cluster_size: 1,
            partitions_count: 1,
            replication_factor: 1,
            gateway_version: "8.5.0".to_string(),
        }))
    }
}

/// An activated job as the gateway would send it.
pub(crate) fn activated(
    key: i64,
    job_type: &str,
    variables: Value,
    headers: Value,
) -> proto::ActivatedJob {
    proto::ActivatedJob {
        key,
        r#type: job_type.to_string(),
        process_instance_key: 100,
        bpmn_process_id: "test-process".to_string(),
        retries: 3,
        custom_headers: headers.to_string(),
        variables: variables.to_string(),
        ..Default::default()
    }
}

pub(crate) fn activated_job(key: i64, job_type: &str, variables: Value, headers: Value) -> Job {
    Job::new(activated(key, job_type, variables, headers))
}

/// The process definition shipped with the service.
pub(crate) fn process_file() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/test-process.bpmn").to_string()
}

/// Serve `body` as the time API response, returning the URL to query.
pub(crate) async fn serve_time_api(body: &'static str) -> String {
    let app = axum::Router::new().route("/time", axum::routing::get(move || async move { body }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    format!("http://{}/time", address)
}

/// A URL nothing listens on.
pub(crate) async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    format!("http://{}/time", address)
}
