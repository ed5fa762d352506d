//! Test support utilities shared across unit and integration tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::stream;
use thiserror::Error;

use crate::build_log::BuildLogRecord;
use crate::engine::{
    BuildLogStream, ContainerCreated, ContainerRequest, Engine, EngineFuture, ImageSummary,
    RemoveOptions,
};

/// Identifier returned by [`RecordingEngine`] for created containers.
pub const SCRIPTED_CONTAINER_ID: &str = "c0ffee0123456789";

/// Host reported by [`RecordingEngine`].
pub const SCRIPTED_HOST: &str = "scripted://engine";

/// Engine operations that can be scripted to fail.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Operation {
    /// `list_images`.
    ListImages,
    /// `build_image`; the stream yields a transport error after any
    /// scripted records.
    Build,
    /// `create_container`.
    Create,
    /// `start_container`.
    Start,
    /// `stop_container`.
    Stop,
    /// `wait_container`.
    Wait,
    /// `remove_container`.
    RemoveContainer,
    /// `remove_image`.
    RemoveImage,
}

/// A call recorded by [`RecordingEngine`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EngineCall {
    /// Images were listed.
    ListImages,
    /// A build was requested.
    Build {
        /// Dockerfile text submitted as the build context.
        dockerfile: String,
        /// Tag the build was requested under.
        tag: String,
    },
    /// A container was created.
    Create(ContainerRequest),
    /// A container was started.
    Start(String),
    /// A container was stopped.
    Stop(String),
    /// The caller waited for a container to exit.
    Wait(String),
    /// A container was removed.
    RemoveContainer {
        /// Container identifier.
        id: String,
        /// Removal options passed by the caller.
        options: RemoveOptions,
    },
    /// An image was removed.
    RemoveImage(String),
}

/// Error returned by scripted failures.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted {operation:?} failure")]
pub struct ScriptedEngineError {
    /// Operation that was scripted to fail.
    pub operation: Operation,
}

#[derive(Debug)]
struct State {
    images: Vec<ImageSummary>,
    build_output: Vec<BuildLogRecord>,
    build_produces_image: bool,
    create_id: Option<String>,
    failures: BTreeSet<Operation>,
    calls: Vec<EngineCall>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            images: Vec::new(),
            build_output: Vec::new(),
            build_produces_image: true,
            create_id: Some(SCRIPTED_CONTAINER_ID.to_owned()),
            failures: BTreeSet::new(),
            calls: Vec::new(),
        }
    }
}

/// In-memory engine that records every call in order.
///
/// Builds succeed by default and register the built tag so a follow-up
/// listing finds it. Clones share state, so a test can keep one handle for
/// assertions while the slave owns another.
#[derive(Clone, Debug, Default)]
pub struct RecordingEngine {
    state: Arc<Mutex<State>>,
}

impl RecordingEngine {
    /// Creates an engine with no images.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an image carrying `tags`.
    #[must_use]
    pub fn with_image<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state().images.push(ImageSummary {
            tags: tags.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Queues records streamed back by every build.
    #[must_use]
    pub fn with_build_output(self, records: Vec<BuildLogRecord>) -> Self {
        self.state().build_output = records;
        self
    }

    /// Makes builds complete without registering an image.
    #[must_use]
    pub fn with_broken_build(self) -> Self {
        self.state().build_produces_image = false;
        self
    }

    /// Makes container creation answer without an identifier.
    #[must_use]
    pub fn with_anonymous_create(self) -> Self {
        self.state().create_id = None;
        self
    }

    /// Makes `operation` fail on every call.
    #[must_use]
    pub fn failing(self, operation: Operation) -> Self {
        self.state().failures.insert(operation);
        self
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.state().calls.clone()
    }

    /// Counts recorded calls matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(*call)).count()
    }

    fn record(&self, call: EngineCall, operation: Operation) -> Result<(), ScriptedEngineError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.failures.contains(&operation) {
            return Err(ScriptedEngineError { operation });
        }
        Ok(())
    }
}

fn registered_tag(tag: &str) -> String {
    if tag.contains(':') {
        tag.to_owned()
    } else {
        format!("{tag}:latest")
    }
}

impl Engine for RecordingEngine {
    type Error = ScriptedEngineError;

    fn host(&self) -> &str {
        SCRIPTED_HOST
    }

    fn list_images(&self) -> EngineFuture<'_, Vec<ImageSummary>, Self::Error> {
        Box::pin(async move {
            self.record(EngineCall::ListImages, Operation::ListImages)?;
            Ok(self.state().images.clone())
        })
    }

    fn build_image<'a>(
        &'a self,
        dockerfile: &'a [u8],
        tag: &'a str,
    ) -> BuildLogStream<'a, Self::Error> {
        let call = EngineCall::Build {
            dockerfile: String::from_utf8_lossy(dockerfile).into_owned(),
            tag: tag.to_owned(),
        };
        let outcome = self.record(call, Operation::Build);
        let mut state = self.state();
        let mut items: Vec<Result<BuildLogRecord, ScriptedEngineError>> =
            state.build_output.iter().cloned().map(Ok).collect();
        match outcome {
            Ok(()) if state.build_produces_image => state.images.push(ImageSummary {
                tags: vec![registered_tag(tag)],
            }),
            Ok(()) => {}
            Err(err) => items.push(Err(err)),
        }
        Box::pin(stream::iter(items))
    }

    fn create_container<'a>(
        &'a self,
        request: &'a ContainerRequest,
    ) -> EngineFuture<'a, ContainerCreated, Self::Error> {
        Box::pin(async move {
            self.record(EngineCall::Create(request.clone()), Operation::Create)?;
            Ok(ContainerCreated {
                id: self.state().create_id.clone(),
                warnings: Vec::new(),
            })
        })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move { self.record(EngineCall::Start(id.to_owned()), Operation::Start) })
    }

    fn stop_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move { self.record(EngineCall::Stop(id.to_owned()), Operation::Stop) })
    }

    fn wait_container<'a>(&'a self, id: &'a str) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move { self.record(EngineCall::Wait(id.to_owned()), Operation::Wait) })
    }

    fn remove_container<'a>(
        &'a self,
        id: &'a str,
        options: RemoveOptions,
    ) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(
                EngineCall::RemoveContainer {
                    id: id.to_owned(),
                    options,
                },
                Operation::RemoveContainer,
            )
        })
    }

    fn remove_image<'a>(&'a self, image: &'a str) -> EngineFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.record(EngineCall::RemoveImage(image.to_owned()), Operation::RemoveImage)
        })
    }
}
