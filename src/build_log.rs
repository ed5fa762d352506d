//! Decoding of the engine's streamed build output.
//!
//! The engine answers a build request with a sequence of JSON objects. Each
//! object may carry several logical lines in its `stream` field, or an `error`
//! field when a build step fails.

use serde::Deserialize;

const ERROR_PREFIX: &str = "ERROR: ";

/// One structured record from the build output.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct BuildLogRecord {
    /// Progress text, possibly spanning several lines.
    #[serde(default)]
    pub stream: Option<String>,
    /// Error reported by the engine for this step.
    #[serde(default)]
    pub error: Option<String>,
}

impl BuildLogRecord {
    /// Creates a progress record.
    #[must_use]
    pub fn stream(text: impl Into<String>) -> Self {
        Self {
            stream: Some(text.into()),
            error: None,
        }
    }

    /// Creates an error record.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            stream: None,
            error: Some(text.into()),
        }
    }

    /// Returns `true` when the record reports an error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Splits the record into its non-empty lines.
    ///
    /// An error takes precedence over any stream text and is prefixed with
    /// `ERROR: `.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let content = match (&self.error, &self.stream) {
            (Some(error), _) => format!("{ERROR_PREFIX}{error}"),
            (None, Some(stream)) => stream.clone(),
            (None, None) => String::new(),
        };
        content
            .split('\n')
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

/// Decodes one raw JSON record into plain log lines.
///
/// # Errors
///
/// Returns the JSON error when `raw` is not a JSON object.
pub fn decode(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    let record: BuildLogRecord = serde_json::from_str(raw)?;
    Ok(record.lines())
}
