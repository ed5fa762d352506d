//! Connection parameters and client construction for the docker engine.

use std::time::Duration;

use bollard::{API_DEFAULT_VERSION, ClientVersion, Docker};
use camino::{Utf8Path, Utf8PathBuf};

use super::error::DockerEngineError;

/// Engine endpoint used when none is configured.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Request timeout applied when none is configured. Builds stream through a
/// single request, so this bounds the longest build as well.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Client certificate material for a TLS endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TlsFiles {
    /// Private key in PEM form.
    pub key: Utf8PathBuf,
    /// Client certificate in PEM form.
    pub cert: Utf8PathBuf,
    /// Certificate authority bundle used to verify the engine.
    pub ca: Utf8PathBuf,
}

/// Everything needed to dial the engine. A fresh client is built from these
/// parameters for every operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientParams {
    /// Engine endpoint, for example `unix:///var/run/docker.sock` or
    /// `tcp://10.0.0.5:2376`.
    pub endpoint: String,
    /// API version pinned by configuration (`MAJOR.MINOR`).
    pub api_version: Option<String>,
    /// TLS material; when present the endpoint is dialled over TLS.
    pub tls: Option<TlsFiles>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientParams {
    /// Creates parameters for `endpoint` with the library defaults.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_version: None,
            tls: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Resolves the client version to negotiate.
    ///
    /// # Errors
    ///
    /// Returns [`DockerEngineError::InvalidApiVersion`] when the pinned
    /// version is malformed.
    pub fn client_version(&self) -> Result<ClientVersion, DockerEngineError> {
        self.api_version
            .as_deref()
            .map_or_else(|| Ok(default_version()), parse_api_version)
    }

    /// Builds a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`DockerEngineError::InvalidApiVersion`] for a malformed
    /// version and [`DockerEngineError::Connect`] when the client library
    /// rejects the endpoint or the TLS material.
    pub fn connect(&self) -> Result<Docker, DockerEngineError> {
        let version = self.client_version()?;
        let timeout = self.timeout.as_secs();
        let connected = match (transport(&self.endpoint), &self.tls) {
            (Transport::Unix(path), _) => Docker::connect_with_unix(path, timeout, &version),
            (Transport::Http(addr), Some(tls)) => Docker::connect_with_ssl(
                addr,
                tls.key.as_std_path(),
                tls.cert.as_std_path(),
                tls.ca.as_std_path(),
                timeout,
                &version,
            ),
            (Transport::Http(addr), None) => Docker::connect_with_http(addr, timeout, &version),
        };
        connected.map_err(|err| DockerEngineError::Connect {
            endpoint: self.endpoint.clone(),
            message: err.to_string(),
        })
    }
}

const fn default_version() -> ClientVersion {
    ClientVersion {
        major_version: API_DEFAULT_VERSION.major_version,
        minor_version: API_DEFAULT_VERSION.minor_version,
    }
}

/// How an endpoint is reached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Transport<'a> {
    /// Local unix socket at the given path.
    Unix(&'a str),
    /// HTTP (or HTTPS when TLS is configured) at the given address.
    Http(&'a str),
}

pub(crate) fn transport(endpoint: &str) -> Transport<'_> {
    if let Some(path) = endpoint.strip_prefix("unix://") {
        return Transport::Unix(path);
    }
    if Utf8Path::new(endpoint).is_absolute() {
        return Transport::Unix(endpoint);
    }
    Transport::Http(endpoint)
}

/// Parses a `MAJOR.MINOR` API version.
///
/// # Errors
///
/// Returns [`DockerEngineError::InvalidApiVersion`] when either component is
/// missing or not a number.
pub fn parse_api_version(value: &str) -> Result<ClientVersion, DockerEngineError> {
    let invalid = || DockerEngineError::InvalidApiVersion(value.to_owned());
    let trimmed = value.trim().trim_start_matches('v');
    let (major, minor) = trimmed.split_once('.').ok_or_else(invalid)?;
    let major_version = major.parse::<usize>().map_err(|_| invalid())?;
    let minor_version = minor.parse::<usize>().map_err(|_| invalid())?;
    Ok(ClientVersion {
        major_version,
        minor_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1.41", 1, 41)]
    #[case("v1.24", 1, 24)]
    #[case(" 1.43 ", 1, 43)]
    fn parses_api_versions(#[case] value: &str, #[case] major: usize, #[case] minor: usize) {
        let version = parse_api_version(value).expect("version should parse");
        assert_eq!(version.major_version, major);
        assert_eq!(version.minor_version, minor);
    }

    #[rstest]
    #[case("1")]
    #[case("one.two")]
    #[case("1.")]
    #[case("")]
    fn rejects_malformed_api_versions(#[case] value: &str) {
        let err = parse_api_version(value).expect_err("version should be rejected");
        assert_eq!(err, DockerEngineError::InvalidApiVersion(value.to_owned()));
    }

    #[rstest]
    #[case("unix:///var/run/docker.sock", Transport::Unix("/var/run/docker.sock"))]
    #[case("/run/user/1000/docker.sock", Transport::Unix("/run/user/1000/docker.sock"))]
    #[case("tcp://10.0.0.5:2376", Transport::Http("tcp://10.0.0.5:2376"))]
    #[case("http://localhost:2375", Transport::Http("http://localhost:2375"))]
    fn selects_transport_from_scheme(#[case] endpoint: &str, #[case] expected: Transport<'static>) {
        assert_eq!(transport(endpoint), expected);
    }

    #[test]
    fn defaults_to_library_api_version() {
        let version = ClientParams::new(DEFAULT_DOCKER_HOST)
            .client_version()
            .expect("default version");
        assert_eq!(version.major_version, API_DEFAULT_VERSION.major_version);
        assert_eq!(version.minor_version, API_DEFAULT_VERSION.minor_version);
    }

    #[test]
    fn malformed_version_fails_before_dialling() {
        let params = ClientParams {
            api_version: Some(String::from("latest")),
            ..ClientParams::new("tcp://127.0.0.1:1")
        };
        let err = params.connect().expect_err("connect should fail");
        assert!(matches!(err, DockerEngineError::InvalidApiVersion(_)));
    }
}
