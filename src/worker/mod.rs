//! Job workers: a poller activating jobs and a dispatcher running handlers.

mod builder;
mod job_dispatcher;
mod job_poller;

pub use builder::JobWorkerBuilder;
pub(crate) use builder::JobHandler;
pub(crate) use job_poller::{Backlog, JobPoller, PollMessage};
