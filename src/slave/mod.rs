//! Lifecycle controller for a docker backed latent slave.
//!
//! A slave owns at most one container at a time. `start` resolves (and if
//! needed builds) the image, then creates and starts the container; `stop`
//! tears it down again. Both dispatch their engine work onto a tokio task and
//! hand back a future, so the scheduler driving the slave never waits on the
//! engine inline.
//!
//! Callers must serialise `start` and `stop` for a given slave. The only
//! guard the controller provides is the phase check at the top of `start`.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::engine::{ContainerRequest, Engine, RemoveOptions};
use crate::error::SlaveError;
use crate::image::{ImagePlan, resolve_image};
use crate::instance::{AttemptToken, ImageReference, InstanceId, InstanceRecord};
use crate::mounts::MountSpec;

/// Future returned by [`LatentSlave::start`] and [`LatentSlave::stop`].
pub type SlaveFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, SlaveError<E>>> + Send>>;

/// Validated settings the controller reads when provisioning.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SlaveSettings {
    /// Unique slave name; prefixes container and synthesized image names.
    pub name: String,
    /// Image fixed by configuration.
    pub image: Option<String>,
    /// Dockerfile text used when the image is missing.
    pub dockerfile: Option<String>,
    /// Command run in the container; empty uses the image default.
    pub command: Vec<String>,
    /// Volumes and binds applied to the container.
    pub mounts: MountSpec,
}

/// The build that triggered a start, used for log context only.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BuildRequest {
    /// Builder the build belongs to.
    pub builder: String,
    /// Build number, when the scheduler has assigned one.
    pub number: Option<u64>,
}

/// Where a slave is in its lifecycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    /// No container is attached.
    Idle,
    /// A start has been dispatched and has not finished.
    Starting,
    /// A container is attached.
    Running(InstanceRecord),
}

/// A latent slave backed by containers on a single engine.
#[derive(Debug)]
pub struct LatentSlave<E> {
    settings: Arc<SlaveSettings>,
    engine: Arc<E>,
    phase: Arc<Mutex<Phase>>,
}

impl<E> LatentSlave<E>
where
    E: Engine + 'static,
{
    /// Creates an idle slave.
    #[must_use]
    pub fn new(settings: SlaveSettings, engine: E) -> Self {
        Self {
            settings: Arc::new(settings),
            engine: Arc::new(engine),
            phase: Arc::new(Mutex::new(Phase::Idle)),
        }
    }

    /// Returns the slave name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Returns the settings the slave provisions with.
    #[must_use]
    pub fn settings(&self) -> &SlaveSettings {
        &self.settings
    }

    /// Returns a snapshot of the current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        lock(&self.phase).clone()
    }

    /// Returns the attached instance, if any.
    #[must_use]
    pub fn instance(&self) -> Option<InstanceRecord> {
        match &*lock(&self.phase) {
            Phase::Running(record) => Some(record.clone()),
            Phase::Idle | Phase::Starting => None,
        }
    }

    /// Dispatches provisioning of a new container.
    ///
    /// The returned future resolves to the attached instance. Whatever the
    /// outcome, the slave is back in [`Phase::Idle`] or in
    /// [`Phase::Running`] once the dispatched work finishes.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::AlreadyActive`] immediately when the slave is not
    /// idle, and [`SlaveError::NoRuntime`] when called outside a tokio
    /// runtime. Provisioning failures are reported through the future.
    pub fn start(
        &self,
        build: &BuildRequest,
    ) -> Result<SlaveFuture<InstanceRecord, E::Error>, SlaveError<E::Error>> {
        let runtime = {
            let mut phase = lock(&self.phase);
            if *phase != Phase::Idle {
                return Err(SlaveError::AlreadyActive {
                    slave: self.settings.name.clone(),
                });
            }
            let handle = Handle::try_current().map_err(|_| self.no_runtime("start"))?;
            *phase = Phase::Starting;
            handle
        };

        info!(
            slave = %self.settings.name,
            builder = %build.builder,
            build = ?build.number,
            "substantiating latent slave"
        );
        let pending = PendingStart {
            phase: Arc::clone(&self.phase),
            settled: false,
        };
        let settings = Arc::clone(&self.settings);
        let engine = Arc::clone(&self.engine);
        let task = runtime.spawn(async move {
            let token = AttemptToken::generate();
            let outcome = provision(&settings, engine.as_ref(), &token).await;
            if let Ok(record) = &outcome {
                pending.settle(Phase::Running(record.clone()));
            }
            outcome
        });
        Ok(joined(task, self.settings.name.clone(), "start"))
    }

    /// Dispatches teardown of the attached container.
    ///
    /// The instance record is cleared before any engine call is made, so a
    /// second `stop` is a no-op. With `fast` set the controller does not wait
    /// for the container to exit before removing it.
    ///
    /// # Errors
    ///
    /// Returns [`SlaveError::NoRuntime`] when called outside a tokio runtime
    /// with an instance attached. Teardown failures are reported through the
    /// future, except image removal failures which are only logged.
    pub fn stop(&self, fast: bool) -> Result<SlaveFuture<(), E::Error>, SlaveError<E::Error>> {
        let mut phase = lock(&self.phase);
        let record = match &*phase {
            Phase::Running(record) => record.clone(),
            Phase::Starting => {
                warn!(
                    slave = %self.settings.name,
                    "stop requested while a start is in flight; nothing to stop yet"
                );
                return Ok(completed());
            }
            Phase::Idle => return Ok(completed()),
        };
        let runtime = Handle::try_current().map_err(|_| self.no_runtime("stop"))?;
        *phase = Phase::Idle;
        drop(phase);

        let slave = self.settings.name.clone();
        let engine = Arc::clone(&self.engine);
        let task =
            runtime.spawn(async move { teardown(&slave, engine.as_ref(), &record, fast).await });
        Ok(joined(task, self.settings.name.clone(), "stop"))
    }

    fn no_runtime(&self, action: &'static str) -> SlaveError<E::Error> {
        SlaveError::NoRuntime {
            slave: self.settings.name.clone(),
            action,
        }
    }
}

/// Returns the slave to idle unless the start settled; this also covers a
/// provisioning task that panics or is cancelled.
struct PendingStart {
    phase: Arc<Mutex<Phase>>,
    settled: bool,
}

impl PendingStart {
    fn settle(mut self, next: Phase) {
        *lock(&self.phase) = next;
        self.settled = true;
    }
}

impl Drop for PendingStart {
    fn drop(&mut self) {
        if !self.settled {
            *lock(&self.phase) = Phase::Idle;
        }
    }
}

async fn provision<E: Engine>(
    settings: &SlaveSettings,
    engine: &E,
    token: &AttemptToken,
) -> Result<InstanceRecord, SlaveError<E::Error>> {
    let plan = ImagePlan {
        slave: &settings.name,
        fixed: settings.image.as_deref(),
        dockerfile: settings.dockerfile.as_deref(),
        synthesized: token.image_name(&settings.name),
    };
    let image = resolve_image(engine, &plan).await?;

    let request = ContainerRequest {
        image: image.name().to_owned(),
        command: settings.command.clone(),
        name: token.container_name(&settings.name),
        mounts: settings.mounts.clone(),
    };
    let created = engine
        .create_container(&request)
        .await
        .map_err(|source| engine_error("create container", settings, &image, None, source))?;
    for warning in &created.warnings {
        warn!(slave = %settings.name, %warning, "engine warning on container create");
    }
    let Some(id) = created
        .id
        .filter(|id| !id.is_empty())
        .map(InstanceId::new)
    else {
        warn!(slave = %settings.name, image = image.name(), "failed to create the container");
        return Err(SlaveError::InstantiationFailed {
            slave: settings.name.clone(),
            image: image.name().to_owned(),
        });
    };
    info!(slave = %settings.name, container = id.short(), "container created");

    if let Err(source) = engine.start_container(id.as_str()).await {
        discard_unstarted(settings, engine, &id).await;
        return Err(engine_error("start container", settings, &image, Some(id), source));
    }
    info!(
        slave = %settings.name,
        container = id.short(),
        image = image.name(),
        "container started"
    );

    Ok(InstanceRecord { id, image })
}

async fn discard_unstarted<E: Engine>(settings: &SlaveSettings, engine: &E, id: &InstanceId) {
    let options = RemoveOptions {
        volumes: true,
        force: true,
    };
    if let Err(err) = engine.remove_container(id.as_str(), options).await {
        warn!(
            slave = %settings.name,
            container = id.short(),
            error = %err,
            "failed to remove container that did not start"
        );
    }
}

async fn teardown<E: Engine>(
    slave: &str,
    engine: &E,
    record: &InstanceRecord,
    fast: bool,
) -> Result<(), SlaveError<E::Error>> {
    let id = record.id.as_str();
    let container_error = |action: &'static str, source: E::Error| SlaveError::Engine {
        action,
        slave: slave.to_owned(),
        image: record.image.name().to_owned(),
        instance: Some(record.id.clone()),
        source,
    };

    info!(slave, container = record.id.short(), "stopping container");
    engine
        .stop_container(id)
        .await
        .map_err(|source| container_error("stop container", source))?;
    if !fast {
        engine
            .wait_container(id)
            .await
            .map_err(|source| container_error("wait for container", source))?;
    }
    let options = RemoveOptions {
        volumes: true,
        force: true,
    };
    engine
        .remove_container(id, options)
        .await
        .map_err(|source| container_error("remove container", source))?;
    info!(slave, container = record.id.short(), "container removed");

    if let ImageReference::Synthesized(image) = &record.image
        && let Err(err) = engine.remove_image(image).await
    {
        warn!(slave, image = %image, error = %err, "error while removing the image");
    }
    Ok(())
}

fn engine_error<E: std::error::Error + 'static>(
    action: &'static str,
    settings: &SlaveSettings,
    image: &ImageReference,
    instance: Option<InstanceId>,
    source: E,
) -> SlaveError<E> {
    SlaveError::Engine {
        action,
        slave: settings.name.clone(),
        image: image.name().to_owned(),
        instance,
        source,
    }
}

fn joined<T, E>(
    task: tokio::task::JoinHandle<Result<T, SlaveError<E>>>,
    slave: String,
    action: &'static str,
) -> SlaveFuture<T, E>
where
    T: Send + 'static,
    E: std::error::Error + Send + 'static,
{
    Box::pin(async move {
        task.await.map_err(|err| SlaveError::Task {
            slave,
            action,
            message: err.to_string(),
        })?
    })
}

fn completed<E>() -> SlaveFuture<(), E>
where
    E: std::error::Error + Send + 'static,
{
    Box::pin(async { Ok(()) })
}

fn lock(phase: &Mutex<Phase>) -> MutexGuard<'_, Phase> {
    phase.lock().unwrap_or_else(PoisonError::into_inner)
}
