//! Image resolution: find a usable image or build one from a dockerfile.

use futures_util::StreamExt;
use tracing::{info, warn};

use crate::engine::{BuildLogStream, Engine};
use crate::error::SlaveError;
use crate::instance::ImageReference;

const BUILD_LOG_TARGET: &str = "quayside::build";

/// Inputs for resolving the image of one start attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImagePlan<'a> {
    /// Slave name, used in error messages.
    pub slave: &'a str,
    /// Image fixed by configuration.
    pub fixed: Option<&'a str>,
    /// Dockerfile text used when the image must be built.
    pub dockerfile: Option<&'a str>,
    /// Name to build under when no fixed image is configured.
    pub synthesized: String,
}

/// Returns `true` when an engine tag satisfies the requested image name.
///
/// A name carrying a tag separator must match a tag exactly; any name also
/// matches tags of the same repository (`name:<anything>`).
#[must_use]
pub fn tag_matches(name: &str, tag: &str) -> bool {
    (name.contains(':') && tag == name)
        || tag
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with(':'))
}

/// Checks whether `name` is present on the engine.
///
/// # Errors
///
/// Returns the engine error when listing images fails.
pub async fn image_exists<E: Engine>(engine: &E, name: &str) -> Result<bool, E::Error> {
    let images = engine.list_images().await?;
    Ok(images
        .iter()
        .flat_map(|image| image.tags.iter())
        .any(|tag| tag_matches(name, tag)))
}

/// Resolves the image for a start attempt, building it when required.
///
/// # Errors
///
/// Returns [`SlaveError::ImageNotFound`] when the image is still absent after
/// any build, or [`SlaveError::Engine`] when an image listing fails.
pub async fn resolve_image<E: Engine>(
    engine: &E,
    plan: &ImagePlan<'_>,
) -> Result<ImageReference, SlaveError<E::Error>> {
    let (target, found) = match plan.fixed {
        Some(name) => {
            let found = image_exists(engine, name)
                .await
                .map_err(|source| engine_error(plan, name, source))?;
            (ImageReference::Fixed(name.to_owned()), found)
        }
        None => (ImageReference::Synthesized(plan.synthesized.clone()), false),
    };

    if found {
        return Ok(target);
    }

    if let Some(dockerfile) = plan.dockerfile {
        info!(
            slave = plan.slave,
            image = target.name(),
            "image not found, building it from scratch"
        );
        let stream = engine.build_image(dockerfile.as_bytes(), target.name());
        drain_build_log(stream, log_build_line).await;
    }

    let present = image_exists(engine, target.name())
        .await
        .map_err(|source| engine_error(plan, target.name(), source))?;
    if !present {
        warn!(slave = plan.slave, image = target.name(), "image not found");
        return Err(SlaveError::ImageNotFound {
            image: target.name().to_owned(),
            host: engine.host().to_owned(),
        });
    }
    Ok(target)
}

/// Consumes a build stream, handing each decoded line to `emit` as it
/// arrives together with a flag marking error lines.
///
/// Error records do not stop consumption; a transport failure ends the
/// stream early and is reported as a warning.
pub async fn drain_build_log<E, F>(mut stream: BuildLogStream<'_, E>, mut emit: F)
where
    E: std::error::Error,
    F: FnMut(&str, bool),
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => {
                let is_error = record.is_error();
                for line in record.lines() {
                    emit(&line, is_error);
                }
            }
            Err(err) => {
                warn!(target: BUILD_LOG_TARGET, error = %err, "build output interrupted");
                break;
            }
        }
    }
}

fn log_build_line(line: &str, is_error: bool) {
    if is_error {
        warn!(target: BUILD_LOG_TARGET, "{line}");
    } else {
        info!(target: BUILD_LOG_TARGET, "{line}");
    }
}

fn engine_error<E: std::error::Error + 'static>(
    plan: &ImagePlan<'_>,
    image: &str,
    source: E,
) -> SlaveError<E> {
    SlaveError::Engine {
        action: "list images",
        slave: plan.slave.to_owned(),
        image: image.to_owned(),
        instance: None,
        source,
    }
}

#[cfg(test)]
mod tests;
