// src/dag/mod.rs

//! Job graph construction and scheduling.
//!
//! - [`graph`] is the job arena with mirrored dependency/dependent edges.
//! - [`resolver`] turns requested targets into jobs and edges.
//! - [`needrun`] decides which jobs must run and records why.
//! - [`priority`] and [`readiness`] maintain priorities and the ready frontier.
//! - [`dynamic`] rewrites jobs whose outputs are only known after they ran.
//! - [`lifecycle`] deletes jobs and removes or protects artifacts.
//! - [`scheduler`] owns all of the above for one engine instance.

pub mod artifact;
pub mod dynamic;
pub mod graph;
pub mod job;
pub mod lifecycle;
pub mod matcher;
pub mod needrun;
pub mod priority;
pub mod readiness;
pub mod reason;
pub mod resolver;
pub mod scheduler;
pub mod state;

pub use artifact::{ArtifactFlags, ArtifactRef};
pub use graph::{Direction, Edges, JobGraph};
pub use job::{HIGHEST_PRIORITY, Job, JobId, JobKey, JobSpec};
pub use matcher::JobMatcher;
pub use reason::Reason;
pub use resolver::Target;
pub use scheduler::{Scheduler, SchedulerOptions};
pub use state::RunState;
