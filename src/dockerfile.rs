//! Dockerfile text resolution.
//!
//! A dockerfile can be configured inline or as a path on disk. Inline text
//! wins when both are present, so a path kept for documentation purposes
//! never shadows an override supplied through the environment.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

/// Errors raised while resolving dockerfile text.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DockerfileError {
    /// Raised when the inline dockerfile is empty or whitespace.
    #[error("dockerfile must not be empty")]
    InlineEmpty,
    /// Raised when the dockerfile path is blank.
    #[error("dockerfile path must not be empty")]
    PathEmpty,
    /// Raised when the dockerfile cannot be read.
    #[error("failed to read dockerfile {path}: {message}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying io error.
        message: String,
    },
    /// Raised when the file holds only whitespace.
    #[error("dockerfile {path} is empty")]
    FileEmpty {
        /// Path that was read.
        path: String,
    },
}

/// Resolves the dockerfile text from inline content or a file path.
///
/// # Errors
///
/// Returns [`DockerfileError`] when the selected source is blank or the file
/// cannot be read.
pub fn resolve_dockerfile(
    inline: Option<&str>,
    file: Option<&str>,
) -> Result<Option<String>, DockerfileError> {
    if let Some(text) = inline {
        if text.trim().is_empty() {
            return Err(DockerfileError::InlineEmpty);
        }
        return Ok(Some(text.to_owned()));
    }

    let Some(path) = file else {
        return Ok(None);
    };
    if path.trim().is_empty() {
        return Err(DockerfileError::PathEmpty);
    }

    let expanded = expand_tilde(path);
    let content = read_to_string_ambient(&expanded).map_err(|message| DockerfileError::Read {
        path: expanded.clone(),
        message,
    })?;
    if content.trim().is_empty() {
        return Err(DockerfileError::FileEmpty { path: expanded });
    }
    Ok(Some(content))
}

/// Expands a leading `~/` against `HOME`, leaving other paths untouched.
///
/// # Examples
///
/// ```
/// # use quayside::dockerfile::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/ci/Dockerfile"), format!("{home}/ci/Dockerfile"));
/// assert_eq!(expand_tilde("/srv/ci/Dockerfile"), "/srv/ci/Dockerfile");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
