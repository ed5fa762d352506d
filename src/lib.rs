//! Core library for the quayside latent build slave.
//!
//! The crate exposes an engine abstraction over a container daemon, a docker
//! implementation built on `bollard`, and the lifecycle controller that
//! provisions one container per substantiation (resolve or build image →
//! create → start) and tears it down again (stop → wait → remove).

pub mod build_log;
pub mod config;
pub mod docker;
pub mod dockerfile;
pub mod engine;
pub mod error;
pub mod image;
pub mod instance;
pub mod mounts;
pub mod slave;
pub mod test_support;

pub use build_log::BuildLogRecord;
pub use config::{ConfigError, ConfigReport, SchedulerHints, SlaveConfig};
pub use docker::{ClientParams, DockerEngine, DockerEngineError, TlsFiles};
pub use engine::{ContainerCreated, ContainerRequest, Engine, ImageSummary, RemoveOptions};
pub use error::SlaveError;
pub use instance::{AttemptToken, ImageReference, InstanceId, InstanceRecord};
pub use mounts::{Mount, MountError, MountSpec};
pub use slave::{BuildRequest, LatentSlave, Phase, SlaveSettings};
