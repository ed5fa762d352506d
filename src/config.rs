//! Configuration loading via `ortho-config`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::docker::{ClientParams, DEFAULT_DOCKER_HOST, TlsFiles, parse_api_version};
use crate::dockerfile::{DockerfileError, resolve_dockerfile};
use crate::mounts::{MountError, MountSpec};
use crate::slave::SlaveSettings;

/// Latent slave configuration derived from environment variables,
/// configuration files, and defaults.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "QUAYSIDE",
    discovery(
        app_name = "quayside",
        env_var = "QUAYSIDE_CONFIG_PATH",
        config_file_name = "quayside.toml",
        dotfile_name = ".quayside.toml",
        project_file_name = "quayside.toml"
    )
)]
pub struct SlaveConfig {
    /// Unique slave name. Prefixes container and synthesized image names.
    pub name: String,
    /// Password the slave authenticates to the master with.
    pub password: Option<String>,
    /// Engine endpoint. Defaults to the local docker socket.
    #[ortho_config(default = DEFAULT_DOCKER_HOST.to_owned())]
    pub docker_host: String,
    /// Image to run. Built from the dockerfile under this name when missing.
    pub image: Option<String>,
    /// Command run in the container; empty uses the image default.
    #[serde(default)]
    pub command: Vec<String>,
    /// Maximum number of concurrent builds on the slave.
    pub max_builds: Option<u32>,
    /// Addresses notified when the slave goes missing.
    #[serde(default)]
    pub notify_on_missing: Vec<String>,
    /// Seconds before a missing slave triggers a notification.
    #[ortho_config(default = 1200)]
    pub missing_timeout_secs: u64,
    /// Seconds an idle slave waits for another build before it is stopped.
    #[ortho_config(default = 0)]
    pub build_wait_timeout_secs: u64,
    /// Slave properties as `key=value` pairs.
    #[serde(default)]
    pub properties: Vec<String>,
    /// Locks held by builds on this slave.
    #[serde(default)]
    pub locks: Vec<String>,
    /// Volume definitions, `volume:bind[:ro]`.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Inline dockerfile used when the image is missing.
    pub dockerfile: Option<String>,
    /// Path of a dockerfile read when no inline text is configured.
    pub dockerfile_path: Option<String>,
    /// Engine API version to negotiate (`MAJOR.MINOR`).
    pub api_version: Option<String>,
    /// TLS client key for remote engines.
    pub tls_key: Option<String>,
    /// TLS client certificate for remote engines.
    pub tls_cert: Option<String>,
    /// TLS certificate authority for remote engines.
    pub tls_ca: Option<String>,
    /// Per-request engine timeout in seconds.
    #[ortho_config(default = 600)]
    pub engine_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

/// Outcome of validating a [`SlaveConfig`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigReport {
    /// Mounts built from the valid volume definitions.
    pub mounts: MountSpec,
    /// Every problem found, in field order.
    pub errors: Vec<ConfigError>,
}

impl ConfigReport {
    /// Returns `true` when any error other than a skipped volume was found.
    #[must_use]
    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(ConfigError::is_fatal)
    }
}

/// Scheduler-facing settings carried for the build master.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SchedulerHints {
    /// Maximum number of concurrent builds.
    pub max_builds: Option<u32>,
    /// Addresses notified when the slave goes missing.
    pub notify_on_missing: Vec<String>,
    /// Delay before a missing slave triggers a notification.
    pub missing_timeout: Duration,
    /// Idle period before the slave is stopped.
    pub build_wait_timeout: Duration,
    /// Slave properties.
    pub properties: BTreeMap<String, String>,
    /// Locks held by builds on this slave.
    pub locks: Vec<String>,
}

impl SlaveConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("quayside")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to quayside.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Checks every field and collects all problems instead of stopping at
    /// the first one. Malformed volume definitions are reported and left out
    /// of the returned mounts.
    #[must_use]
    pub fn validate(&self) -> ConfigReport {
        let mut errors = Vec::new();
        let required = [
            (
                self.name.as_str(),
                FieldMetadata {
                    description: "slave name",
                    env_var: "QUAYSIDE_NAME",
                    toml_key: "name",
                },
            ),
            (
                self.docker_host.as_str(),
                FieldMetadata {
                    description: "docker host",
                    env_var: "QUAYSIDE_DOCKER_HOST",
                    toml_key: "docker_host",
                },
            ),
        ];
        for (value, metadata) in &required {
            if let Err(err) = Self::require_field(value, metadata) {
                errors.push(err);
            }
        }

        match self.dockerfile_text() {
            Ok(None) if self.fixed_image().is_none() => errors.push(ConfigError::MissingImage),
            Ok(_) => {}
            Err(err) => errors.push(err),
        }
        if let Err(err) = self.tls_files() {
            errors.push(err);
        }
        if let Err(err) = self.checked_api_version() {
            errors.push(err);
        }
        if let Err(err) = self.property_map() {
            errors.push(err);
        }

        let parsed = MountSpec::parse(&self.volumes);
        errors.extend(parsed.errors.into_iter().map(ConfigError::Volume));
        ConfigReport {
            mounts: parsed.spec,
            errors,
        }
    }

    /// Builds the settings the lifecycle controller provisions with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Dockerfile`] when the dockerfile cannot be
    /// resolved and [`ConfigError::MissingImage`] when neither an image nor a
    /// dockerfile is configured.
    pub fn settings(&self) -> Result<SlaveSettings, ConfigError> {
        let dockerfile = self.dockerfile_text()?;
        let image = self.fixed_image().map(ToOwned::to_owned);
        if image.is_none() && dockerfile.is_none() {
            return Err(ConfigError::MissingImage);
        }
        Ok(SlaveSettings {
            name: self.name.clone(),
            image,
            dockerfile,
            command: self.command.clone(),
            mounts: MountSpec::parse(&self.volumes).spec,
        })
    }

    /// Builds the engine connection parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PartialTls`] or
    /// [`ConfigError::InvalidApiVersion`] when the engine settings are
    /// inconsistent.
    pub fn client_params(&self) -> Result<ClientParams, ConfigError> {
        self.checked_api_version()?;
        Ok(ClientParams {
            endpoint: self.docker_host.clone(),
            api_version: self.api_version.clone(),
            tls: self.tls_files()?,
            timeout: Duration::from_secs(self.engine_timeout_secs),
        })
    }

    /// Returns the scheduler-facing settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Property`] when a property is not `key=value`.
    pub fn scheduler_hints(&self) -> Result<SchedulerHints, ConfigError> {
        Ok(SchedulerHints {
            max_builds: self.max_builds,
            notify_on_missing: self.notify_on_missing.clone(),
            missing_timeout: Duration::from_secs(self.missing_timeout_secs),
            build_wait_timeout: Duration::from_secs(self.build_wait_timeout_secs),
            properties: self.property_map()?,
            locks: self.locks.clone(),
        })
    }

    fn fixed_image(&self) -> Option<&str> {
        self.image.as_deref().filter(|image| !image.trim().is_empty())
    }

    fn dockerfile_text(&self) -> Result<Option<String>, ConfigError> {
        resolve_dockerfile(self.dockerfile.as_deref(), self.dockerfile_path.as_deref())
            .map_err(ConfigError::Dockerfile)
    }

    fn checked_api_version(&self) -> Result<(), ConfigError> {
        self.api_version.as_deref().map_or(Ok(()), |version| {
            parse_api_version(version)
                .map(drop)
                .map_err(|_| ConfigError::InvalidApiVersion(version.to_owned()))
        })
    }

    fn tls_files(&self) -> Result<Option<TlsFiles>, ConfigError> {
        match (&self.tls_key, &self.tls_cert, &self.tls_ca) {
            (Some(key), Some(cert), Some(ca)) => Ok(Some(TlsFiles {
                key: Utf8PathBuf::from(key),
                cert: Utf8PathBuf::from(cert),
                ca: Utf8PathBuf::from(ca),
            })),
            (None, None, None) => Ok(None),
            _ => Err(ConfigError::PartialTls),
        }
    }

    fn property_map(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        self.properties
            .iter()
            .map(|entry| {
                entry
                    .split_once('=')
                    .filter(|(key, _)| !key.trim().is_empty())
                    .map(|(key, value)| (key.trim().to_owned(), value.trim().to_owned()))
                    .ok_or_else(|| ConfigError::Property(entry.clone()))
            })
            .collect()
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Neither an image nor a dockerfile is configured.
    #[error(
        "no image to run: set QUAYSIDE_IMAGE, QUAYSIDE_DOCKERFILE or \
         QUAYSIDE_DOCKERFILE_PATH, or add image, dockerfile or dockerfile_path to quayside.toml"
    )]
    MissingImage,
    /// A volume definition was malformed and skipped.
    #[error(transparent)]
    Volume(MountError),
    /// Only part of the TLS file triple is configured.
    #[error("tls_key, tls_cert and tls_ca must be configured together")]
    PartialTls,
    /// The pinned API version is not `MAJOR.MINOR`.
    #[error("invalid api_version `{0}`; expected MAJOR.MINOR")]
    InvalidApiVersion(String),
    /// A property is not of the form `key=value`.
    #[error("invalid property `{0}`; expected key=value")]
    Property(String),
    /// The dockerfile could not be resolved.
    #[error("dockerfile error: {0}")]
    Dockerfile(#[from] DockerfileError),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl ConfigError {
    /// Returns `false` for problems that only cause a value to be skipped.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Volume(_))
    }
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
