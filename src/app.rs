//! Service bootstrap: topology, deployment, workers and the HTTP listener.

use crate::api::{self, AppState};
use crate::config::{Config, ConfigError};
use crate::handlers::{handle_get_time, handle_make_greeting, GET_TIME, MAKE_GREETING};
use crate::process::DeployResourceResponse;
use crate::time_api::{TimeApi, TimeApiError};
use crate::topology::TopologyResponse;
use crate::worker::JobWorkerBuilder;
use crate::Client;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// A failure that prevents the service from running.
#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    /// The configuration is incomplete or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No client could be set up for the gateway.
    #[error("could not connect to the gateway: {0}")]
    Connect(#[source] crate::Error),
    /// The cluster topology could not be queried.
    #[error("could not query the cluster topology: {0}")]
    Topology(#[source] crate::Error),
    /// The process definition could not be deployed.
    #[error("could not deploy {file}: {source}")]
    Deploy {
        /// The resource file
        file: String,
        /// Underlying client error
        #[source]
        source: crate::Error,
    },
    /// The time API client could not be built.
    #[error(transparent)]
    TimeApi(#[from] TimeApiError),
    /// The HTTP listener failed.
    #[error("http server failed: {0}")]
    Http(#[from] std::io::Error),
}

/// A prepared service: workers running, router ready to be served.
#[derive(Debug)]
pub struct Service {
    /// The HTTP routes
    pub router: Router,
    /// The running job workers; dropping the set stops them
    pub workers: JoinSet<()>,
}

/// Query the cluster topology and log every broker and partition.
pub async fn log_topology(client: &Client) -> crate::Result<TopologyResponse> {
    let topology = client.topology().send().await?;

    info!(
        cluster_size = topology.cluster_size(),
        partitions = topology.partitions_count(),
        gateway_version = topology.gateway_version(),
        "connected to cluster"
    );
    for broker in topology.brokers() {
        info!(host = broker.host(), port = broker.port(), "broker");
        for partition in broker.partitions() {
            info!(
                partition = partition.partition_id(),
                role = %partition.role(),
                "partition"
            );
        }
    }

    Ok(topology)
}

/// Deploy the process definition file and log the acknowledgment.
pub async fn deploy(client: &Client, process_file: &str) -> crate::Result<DeployResourceResponse> {
    let response = client
        .deploy_resource()
        .with_resource_file(process_file)
        .send()
        .await?;

    for process in response.processes() {
        info!(
            deployment = response.key(),
            bpmn_process_id = process.bpmn_process_id(),
            version = process.version(),
            process_definition_key = process.process_definition_key(),
            resource = process.resource_name(),
            "deployed process"
        );
    }

    Ok(response)
}

/// Spawn one job worker per job type of the process.
pub fn spawn_workers(client: &Client, time_api: TimeApi) -> JoinSet<()> {
    let mut workers = JoinSet::new();

    let get_time = client
        .job_worker()
        .with_job_type(GET_TIME)
        .with_worker_name("get-time-worker")
        .with_handler(move |client, job| handle_get_time(client, job, time_api.clone()));
    workers.spawn(run_worker(get_time, GET_TIME));

    let make_greeting = client
        .job_worker()
        .with_job_type(MAKE_GREETING)
        .with_worker_name("make-greeting-worker")
        .with_handler(handle_make_greeting);
    workers.spawn(run_worker(make_greeting, MAKE_GREETING));

    workers
}

async fn run_worker(worker: JobWorkerBuilder, job_type: &'static str) {
    info!(job_type, "opening job worker");
    if let Err(err) = worker.run().await {
        error!(job_type, error = %err, "job worker stopped");
    }
}

/// Run every startup step against an existing client.
///
/// Deployment happens before any worker is opened.
pub async fn prepare(client: &Client, config: &Config) -> Result<Service, StartupError> {
    log_topology(client)
        .await
        .map_err(StartupError::Topology)?;
    deploy(client, &config.process_file)
        .await
        .map_err(|source| StartupError::Deploy {
            file: config.process_file.clone(),
            source,
        })?;

    let time_api =
        TimeApi::with_timeout(config.time_api_url.clone(), config.time_api_timeout)?;
    let workers = spawn_workers(client, time_api);
    let router = api::router(AppState::new(
        client.clone(),
        config.start_concurrency,
        config.start_request_timeout,
    ));

    Ok(Service { router, workers })
}

/// Connect to the gateway and prepare the service.
pub async fn start(config: &Config) -> Result<Service, StartupError> {
    let client = Client::from_config(config.client_config()).map_err(StartupError::Connect)?;
    if config.oauth.is_some() {
        info!("waiting for the first access token");
    }
    client
        .auth_initialized()
        .await
        .map_err(StartupError::Connect)?;

    prepare(&client, config).await
}

/// Start the service and serve HTTP until ctrl-c.
pub async fn run(config: Config) -> Result<(), StartupError> {
    let Service {
        router,
        mut workers,
    } = start(&config).await?;

    let listener = TcpListener::bind(config.http_address).await?;
    info!(address = %listener.local_addr()?, "listening for http requests");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    workers.shutdown().await;
    info!("service stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutting down"),
        Err(err) => warn!(error = %err, "could not listen for ctrl-c, shutting down"),
    }
}
