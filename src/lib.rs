//! A demo service for the [Zeebe] workflow engine.
//!
//! On startup the service logs the cluster topology, deploys
//! `test-process.bpmn` and opens two job workers:
//!
//! * `get-time` completes its job with the current time, fetched from a
//!   remote time API.
//! * `make-greeting` completes its job with `say`, the `greeting` custom
//!   header followed by the `name` variable.
//!
//! Every request to `/start` runs one `test-process` instance with
//! `{"name": "Josh Wulf"}` to completion and answers with its `say` variable.
//!
//! The gateway is reached through a small gRPC client in the shape of the
//! Zeebe Rust client:
//!
//! ```no_run
//! use serde_json::json;
//! use zeebe_greeter::{Client, ClientConfig, Job};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::from_config(ClientConfig::with_endpoint("http://localhost:26500"))?;
//!
//!     client
//!         .deploy_resource()
//!         .with_resource_file("test-process.bpmn")
//!         .send()
//!         .await?;
//!
//!     let result = client
//!         .create_process_instance_with_result()
//!         .with_bpmn_process_id("test-process")
//!         .with_latest_version()
//!         .with_variables(json!({"name": "Josh Wulf"}))
//!         .send()
//!         .await?;
//!     println!("{}", result.variables()["say"]);
//!
//!     client
//!         .job_worker()
//!         .with_job_type("make-greeting")
//!         .with_handler(handle_job)
//!         .run()
//!         .await?;
//!
//!     Ok(())
//! }
//!
//! async fn handle_job(client: Client, job: Job) {
//!     let _ = client
//!         .complete_job()
//!         .with_job_key(job.key())
//!         .with_variables(json!({"say": "Hello"}))
//!         .send()
//!         .await;
//! }
//! ```
//!
//! [Zeebe]: https://zeebe.io
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true
)]

pub mod api;
pub mod app;
pub(crate) mod client;
pub mod config;
pub(crate) mod error;
pub mod greeting;
pub mod handlers;
pub(crate) mod job;
pub(crate) mod oauth;
pub(crate) mod process;
pub mod time_api;
pub(crate) mod topology;
pub(crate) mod worker;

#[cfg(test)]
mod testing;

#[allow(clippy::all, missing_docs, missing_debug_implementations)]
pub(crate) mod proto {
    tonic::include_proto!("gateway_protocol");
}

pub use client::{Client, ClientConfig};
pub use config::Config;
pub use error::{Error, Result};
pub use job::{CompleteJobBuilder, CompleteJobResponse, Job};
pub use oauth::OAuthConfig;
pub use process::{
    CreateProcessInstanceWithResultBuilder, CreateProcessInstanceWithResultResponse,
    DeployResourceBuilder, DeployResourceResponse, ProcessMetadata,
};
pub use topology::{BrokerInfo, Partition, PartitionRole, TopologyBuilder, TopologyResponse};
pub use worker::JobWorkerBuilder;
