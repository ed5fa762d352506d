//! Docker engine implementation of [`Engine`] built on `bollard`.

mod client;
mod context;
mod error;

use std::collections::HashMap;
use std::pin::pin;

use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{BuildImageOptions, ListImagesOptions, RemoveImageOptions};
use bollard::models::HostConfig;
use futures_util::{StreamExt, stream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

pub use client::{
    ClientParams, DEFAULT_DOCKER_HOST, DEFAULT_TIMEOUT, TlsFiles, parse_api_version,
};
pub use context::DOCKERFILE_NAME;
pub use error::DockerEngineError;

use crate::build_log::BuildLogRecord;
use crate::engine::{
    BuildLogStream, ContainerCreated, ContainerRequest, Engine, EngineFuture, ImageSummary,
    RemoveOptions,
};

/// Status the engine answers with when a container is already stopped.
const NOT_MODIFIED: u16 = 304;

/// Build records buffered between the engine and a slow consumer.
const BUILD_LOG_BUFFER: usize = 64;

/// Engine backed by a docker daemon.
///
/// The engine holds connection parameters only. Each operation dials the
/// daemon afresh so a restarted daemon or a rotated socket is picked up on
/// the next call.
#[derive(Clone, Debug)]
pub struct DockerEngine {
    params: ClientParams,
}

impl DockerEngine {
    /// Creates an engine after checking the parameters can produce a client
    /// version.
    ///
    /// # Errors
    ///
    /// Returns [`DockerEngineError::InvalidApiVersion`] when the pinned API
    /// version is malformed.
    pub fn new(params: ClientParams) -> Result<Self, DockerEngineError> {
        params.client_version()?;
        Ok(Self { params })
    }

    /// Returns the connection parameters.
    #[must_use]
    pub const fn params(&self) -> &ClientParams {
        &self.params
    }
}

fn container_config(request: &ContainerRequest) -> Config<String> {
    let volumes: HashMap<String, HashMap<(), ()>> = request
        .mounts
        .volumes()
        .map(|volume| (volume.to_owned(), HashMap::new()))
        .collect();
    let binds = request.mounts.binds();
    Config {
        image: Some(request.image.clone()),
        cmd: (!request.command.is_empty()).then(|| request.command.clone()),
        volumes: (!volumes.is_empty()).then_some(volumes),
        host_config: Some(HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_record(
    item: Result<bollard::models::BuildInfo, BollardError>,
) -> Result<BuildLogRecord, DockerEngineError> {
    match item {
        Ok(info) => Ok(BuildLogRecord {
            stream: info.stream,
            error: info.error,
        }),
        Err(BollardError::DockerStreamError { error }) => Ok(BuildLogRecord::error(error)),
        // Undecodable output is shown to the user rather than ending the build.
        Err(err @ BollardError::JsonDataError { .. }) => {
            Ok(BuildLogRecord::error(err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

impl Engine for DockerEngine {
    type Error = DockerEngineError;

    fn host(&self) -> &str {
        &self.params.endpoint
    }

    fn list_images(&self) -> EngineFuture<'_, Vec<ImageSummary>, Self::Error> {
        Box::pin(async move {
            let docker = self.params.connect()?;
            let images = docker
                .list_images(Some(ListImagesOptions::<String>::default()))
                .await?;
            Ok(images
                .into_iter()
                .map(|image| ImageSummary {
                    tags: image.repo_tags,
                })
                .collect())
        })
    }

    fn build_image<'a>(
        &'a self,
        dockerfile: &'a [u8],
        tag: &'a str,
    ) -> BuildLogStream<'a, Self::Error> {
        let prepared = self.params.connect().and_then(|client| {
            context::dockerfile_context(dockerfile).map(|archive| (client, archive))
        });
        let (docker, archive) = match prepared {
            Ok(ready) => ready,
            Err(err) => return Box::pin(stream::once(async move { Err(err) })),
        };
        let Ok(runtime) = Handle::try_current() else {
            return Box::pin(stream::once(async {
                Err(DockerEngineError::Engine {
                    message: String::from("no tokio runtime available to drive the build"),
                })
            }));
        };
        let options = BuildImageOptions {
            dockerfile: DOCKERFILE_NAME.to_owned(),
            t: tag.to_owned(),
            rm: true,
            ..Default::default()
        };

        // The client's build stream borrows the client, so both live on a
        // task that forwards records as they arrive.
        let (sender, receiver) = mpsc::channel(BUILD_LOG_BUFFER);
        runtime.spawn(async move {
            let mut records = pin!(docker.build_image(options, None, Some(archive)));
            while let Some(item) = records.next().await {
                if sender.send(build_record(item)).await.is_err() {
                    break;
                }
            }
        });
        Box::pin(stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|record| (record, rx))
        }))
    }

    fn create_container<'a>(
        &'a self,
        request: &'a ContainerRequest,
    ) -> EngineFuture<'a, ContainerCreated, Self::Error> {
        Box::pin(async move {
            let docker = self.params.connect()?;
            let options = CreateContainerOptions {
                name: request.name.clone(),
                platform: None,
            };
            let created = docker
                .create_container(Some(options), container_config(request))
                .await?;
            Ok(ContainerCreated {
                id: Some(created.id).filter(|id| !id.is_empty()),
                warnings: created.warnings,
            })
        })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let docker = self.params.connect()?;
            docker
                .start_container(id, None::<StartContainerOptions<String>>)
                .await?;
            Ok(())
        })
    }

    fn stop_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let docker = self.params.connect()?;
            match docker
                .stop_container(id, None::<StopContainerOptions>)
                .await
            {
                Ok(())
                | Err(BollardError::DockerResponseServerError {
                    status_code: NOT_MODIFIED,
                    ..
                }) => Ok(()),
                Err(err) => Err(err.into()),
            }
        })
    }

    fn wait_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let docker = self.params.connect()?;
            let mut responses =
                pin!(docker.wait_container(id, None::<WaitContainerOptions<String>>));
            while let Some(response) = responses.next().await {
                match response {
                    // A non-zero exit is still an exit.
                    Ok(_) | Err(BollardError::DockerContainerWaitError { .. }) => {}
                    Err(err) => return Err(err.into()),
                }
            }
            Ok(())
        })
    }

    fn remove_container<'a>(
        &'a self,
        id: &'a str,
        options: RemoveOptions,
    ) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let docker = self.params.connect()?;
            let remove = RemoveContainerOptions {
                v: options.volumes,
                force: options.force,
                ..Default::default()
            };
            docker.remove_container(id, Some(remove)).await?;
            Ok(())
        })
    }

    fn remove_image<'a>(&'a self, image: &'a str) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let docker = self.params.connect()?;
            docker
                .remove_image(image, None::<RemoveImageOptions>, None)
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mounts::MountSpec;

    fn request(command: &[&str], volumes: &[&str]) -> ContainerRequest {
        ContainerRequest {
            image: String::from("busybox"),
            command: command.iter().map(|part| (*part).to_owned()).collect(),
            name: String::from("worker_tok"),
            mounts: MountSpec::parse(volumes.iter().copied()).spec,
        }
    }

    #[test]
    fn config_carries_volumes_and_binds() {
        let config = container_config(&request(&["sh"], &["/cache:/var/cache:ro"]));

        assert_eq!(config.image.as_deref(), Some("busybox"));
        assert_eq!(config.cmd, Some(vec![String::from("sh")]));
        let volumes = config.volumes.expect("volume set");
        assert!(volumes.contains_key("/cache"), "volumes: {volumes:?}");
        let binds = config
            .host_config
            .and_then(|host| host.binds)
            .expect("bind table");
        assert_eq!(binds, ["/cache:/var/cache:ro"]);
    }

    #[test]
    fn empty_command_and_mounts_use_image_defaults() {
        let config = container_config(&request(&[], &[]));

        assert_eq!(config.cmd, None);
        assert_eq!(config.volumes, None);
        assert_eq!(config.host_config.and_then(|host| host.binds), None);
    }

    #[test]
    fn stream_errors_become_error_records() {
        let record = build_record(Err(BollardError::DockerStreamError {
            error: String::from("no such base image"),
        }))
        .expect("stream error is a record");

        assert_eq!(record.lines(), ["ERROR: no such base image"]);
    }

    #[test]
    fn undecodable_output_becomes_error_record() {
        let record = build_record(Err(BollardError::JsonDataError {
            message: String::from("{\"stream\":"),
            column: 10,
        }))
        .expect("json error is a record");

        let lines = record.lines();
        assert_eq!(lines.len(), 1, "lines: {lines:?}");
        assert!(
            lines.first().is_some_and(|line| line.starts_with("ERROR: ")),
            "lines: {lines:?}"
        );
    }

    #[tokio::test]
    async fn build_with_unusable_client_yields_single_error() {
        let engine = DockerEngine {
            params: ClientParams {
                api_version: Some(String::from("x")),
                ..ClientParams::new(DEFAULT_DOCKER_HOST)
            },
        };

        let items: Vec<_> = engine
            .build_image(b"FROM scratch\n", "quayside-tok")
            .collect()
            .await;

        assert!(
            matches!(
                items.as_slice(),
                [Err(DockerEngineError::InvalidApiVersion(version))] if version == "x"
            ),
            "items: {items:?}"
        );
    }

    #[tokio::test]
    async fn build_against_unreachable_daemon_ends_with_error() {
        let engine = DockerEngine::new(ClientParams::new("unix:///nonexistent/quayside.sock"))
            .expect("engine should build");

        let items: Vec<_> = engine
            .build_image(b"FROM scratch\n", "quayside-tok")
            .collect()
            .await;

        assert!(
            matches!(items.last(), Some(Err(DockerEngineError::Engine { .. }))),
            "items: {items:?}"
        );
    }

    #[test]
    fn engine_reports_configured_endpoint() {
        let engine = DockerEngine::new(ClientParams::new("tcp://10.0.0.5:2376"))
            .expect("engine should build");
        assert_eq!(engine.host(), "tcp://10.0.0.5:2376");
    }

    #[test]
    fn engine_rejects_malformed_api_version() {
        let params = ClientParams {
            api_version: Some(String::from("1.x")),
            ..ClientParams::new(DEFAULT_DOCKER_HOST)
        };
        let err = DockerEngine::new(params).expect_err("version should be rejected");
        assert_eq!(err, DockerEngineError::InvalidApiVersion(String::from("1.x")));
    }
}
