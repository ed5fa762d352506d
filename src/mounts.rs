//! Volume mount parsing for slave containers.
//!
//! Mount strings take the form `volume:bind[:ro]`. The first `:` separates
//! the two paths; a trailing `:ro` marks the mount read-only. Parsing never
//! aborts on a bad entry: malformed strings are reported and skipped so the
//! rest of the table is still usable.

use thiserror::Error;

const READ_ONLY_SUFFIX: &str = ":ro";

/// A single parsed mount.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Mount {
    /// Path named before the first `:`; also declared as a container volume.
    pub volume: String,
    /// Path the volume is bound to.
    pub bind: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl Mount {
    /// Renders the mount in the engine's `source:target[:ro]` bind syntax.
    #[must_use]
    pub fn bind_string(&self) -> String {
        if self.read_only {
            format!("{}:{}{READ_ONLY_SUFFIX}", self.volume, self.bind)
        } else {
            format!("{}:{}", self.volume, self.bind)
        }
    }
}

/// Raised when a mount string cannot be split into two non-empty paths.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("invalid volume definition for docker `{0}`; skipping")]
pub struct MountError(pub String);

/// Ordered mount table derived from configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MountSpec {
    mounts: Vec<Mount>,
}

/// Outcome of parsing a batch of mount strings.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParsedMounts {
    /// Mounts built from the valid entries.
    pub spec: MountSpec,
    /// One error per rejected entry, in input order.
    pub errors: Vec<MountError>,
}

impl MountSpec {
    /// Parses mount strings, collecting an error for each malformed entry.
    ///
    /// A later entry naming the same volume replaces the earlier one in place.
    #[must_use]
    pub fn parse<I, S>(entries: I) -> ParsedMounts
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parsed = ParsedMounts::default();
        for entry in entries {
            match parse_entry(entry.as_ref()) {
                Ok(mount) => parsed.spec.insert(mount),
                Err(err) => parsed.errors.push(err),
            }
        }
        parsed
    }

    fn insert(&mut self, mount: Mount) {
        if let Some(existing) = self
            .mounts
            .iter_mut()
            .find(|existing| existing.volume == mount.volume)
        {
            *existing = mount;
        } else {
            self.mounts.push(mount);
        }
    }

    /// Returns the parsed mounts in insertion order.
    #[must_use]
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    /// Returns the volume paths declared at container creation.
    pub fn volumes(&self) -> impl Iterator<Item = &str> {
        self.mounts.iter().map(|mount| mount.volume.as_str())
    }

    /// Returns the bind table rendered for the engine.
    #[must_use]
    pub fn binds(&self) -> Vec<String> {
        self.mounts.iter().map(Mount::bind_string).collect()
    }

    /// Returns `true` when no mounts are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

fn parse_entry(entry: &str) -> Result<Mount, MountError> {
    let invalid = || MountError(entry.to_owned());
    let (volume, remainder) = entry.split_once(':').ok_or_else(invalid)?;
    let (bind, read_only) = remainder
        .strip_suffix(READ_ONLY_SUFFIX)
        .map_or((remainder, false), |path| (path, true));
    if volume.is_empty() || bind.is_empty() {
        return Err(invalid());
    }
    Ok(Mount {
        volume: volume.to_owned(),
        bind: bind.to_owned(),
        read_only,
    })
}
