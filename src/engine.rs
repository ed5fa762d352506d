//! Engine abstraction for the container daemon that hosts latent slaves.
//!
//! Every operation returns a boxed future so callers can hold the engine
//! behind a trait object or a generic parameter interchangeably, and so the
//! lifecycle controller can move calls onto a spawned task.

use std::future::Future;
use std::pin::Pin;

use futures_util::Stream;

use crate::build_log::BuildLogRecord;
use crate::mounts::MountSpec;

/// Summary of an image known to the engine.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImageSummary {
    /// Repository tags attached to the image (for example `busybox:latest`).
    pub tags: Vec<String>,
}

/// Parameters required to create a container.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContainerRequest {
    /// Image reference the container is created from.
    pub image: String,
    /// Command to run; empty means the image default.
    pub command: Vec<String>,
    /// Container name, unique per start attempt.
    pub name: String,
    /// Volume set and bind table applied to the container.
    pub mounts: MountSpec,
}

/// Result of a create call.
///
/// Engines occasionally answer a create with an empty body; the identifier is
/// therefore optional and the caller decides how to treat its absence.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContainerCreated {
    /// Identifier assigned by the engine.
    pub id: Option<String>,
    /// Warnings returned alongside the identifier.
    pub warnings: Vec<String>,
}

/// Options for removing a container.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RemoveOptions {
    /// Also remove anonymous volumes attached to the container.
    pub volumes: bool,
    /// Kill the container first when it is still running.
    pub force: bool,
}

/// Future returned by engine operations.
pub type EngineFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Lazy sequence of build records streamed back by the engine.
pub type BuildLogStream<'a, E> = Pin<Box<dyn Stream<Item = Result<BuildLogRecord, E>> + Send + 'a>>;

/// Operations the provisioner needs from a container engine.
///
/// Implementations must not cache connections between calls; every method
/// is expected to reach the engine afresh.
pub trait Engine: Send + Sync {
    /// Engine specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Human readable engine location used in error messages.
    fn host(&self) -> &str;

    /// Lists the images present on the engine.
    fn list_images(&self) -> EngineFuture<'_, Vec<ImageSummary>, Self::Error>;

    /// Builds `tag` from a dockerfile held in memory.
    fn build_image<'a>(
        &'a self,
        dockerfile: &'a [u8],
        tag: &'a str,
    ) -> BuildLogStream<'a, Self::Error>;

    /// Creates a container without starting it.
    fn create_container<'a>(
        &'a self,
        request: &'a ContainerRequest,
    ) -> EngineFuture<'a, ContainerCreated, Self::Error>;

    /// Starts a previously created container.
    fn start_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error>;

    /// Asks the engine to stop a running container.
    fn stop_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error>;

    /// Blocks until the container has exited.
    fn wait_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error>;

    /// Removes a container.
    fn remove_container<'a>(
        &'a self,
        id: &'a str,
        options: RemoveOptions,
    ) -> EngineFuture<'a, (), Self::Error>;

    /// Removes an image by reference.
    fn remove_image<'a>(&'a self, image: &'a str) -> EngineFuture<'a, (), Self::Error>;
}
