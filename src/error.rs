//! Errors surfaced by the slave lifecycle.

use thiserror::Error;

use crate::instance::InstanceId;

/// Errors raised while starting or stopping a latent slave.
///
/// Every variant except [`SlaveError::AlreadyActive`] and
/// [`SlaveError::NoRuntime`] is reported through the future returned by
/// `start` or `stop`; those two are returned synchronously because no work
/// was dispatched.
#[derive(Debug, Error)]
pub enum SlaveError<EngineError>
where
    EngineError: std::error::Error + 'static,
{
    /// Raised when `start` is called while an instance is attached or a
    /// start is already in flight.
    #[error("slave {slave} already has an active instance")]
    AlreadyActive {
        /// Slave name.
        slave: String,
    },
    /// Raised when no usable image exists after resolution and any build.
    #[error("image \"{image}\" not found on docker host {host}")]
    ImageNotFound {
        /// Image name that was looked up.
        image: String,
        /// Engine the lookup ran against.
        host: String,
    },
    /// Raised when the engine answers a create request without an identifier.
    #[error("slave {slave}: failed to create the container from image {image}")]
    InstantiationFailed {
        /// Slave name.
        slave: String,
        /// Image the container was to be created from.
        image: String,
    },
    /// Raised when an engine call fails.
    #[error(
        "slave {slave}: {action} failed for image {image}{}: {source}",
        container_note(.instance.as_ref())
    )]
    Engine {
        /// Engine operation that failed.
        action: &'static str,
        /// Slave name.
        slave: String,
        /// Image involved in the operation.
        image: String,
        /// Container involved in the operation, when one exists.
        instance: Option<InstanceId>,
        /// Engine specific error.
        #[source]
        source: EngineError,
    },
    /// Raised when `start` or `stop` is called outside a tokio runtime.
    #[error("slave {slave}: no async runtime available to dispatch {action}")]
    NoRuntime {
        /// Slave name.
        slave: String,
        /// Operation that could not be dispatched.
        action: &'static str,
    },
    /// Raised when the dispatched task panics or is cancelled.
    #[error("slave {slave}: {action} task did not complete: {message}")]
    Task {
        /// Slave name.
        slave: String,
        /// Operation whose task failed.
        action: &'static str,
        /// Join error reported by the runtime.
        message: String,
    },
}

fn container_note(instance: Option<&InstanceId>) -> String {
    instance.map_or_else(String::new, |id| format!(" (container {}...)", id.short()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn engine_error_names_slave_image_and_short_id() {
        let err: SlaveError<io::Error> = SlaveError::Engine {
            action: "stop container",
            slave: String::from("worker"),
            image: String::from("busybox"),
            instance: Some(InstanceId::new("deadbeefcafe")),
            source: io::Error::other("connection refused"),
        };

        assert_eq!(
            err.to_string(),
            "slave worker: stop container failed for image busybox (container deadbe...): connection refused"
        );
    }

    #[test]
    fn engine_error_without_instance_omits_container() {
        let err: SlaveError<io::Error> = SlaveError::Engine {
            action: "list images",
            slave: String::from("worker"),
            image: String::from("busybox"),
            instance: None,
            source: io::Error::other("boom"),
        };

        assert_eq!(
            err.to_string(),
            "slave worker: list images failed for image busybox: boom"
        );
    }
}
