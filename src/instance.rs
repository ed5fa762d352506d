//! Identity types for provisioned containers and their images.

use std::fmt;

use uuid::Uuid;

const SHORT_ID_LEN: usize = 6;

/// Engine identifier of a running slave container.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wraps an engine identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the full identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the leading characters used in log and error messages.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0
            .char_indices()
            .nth(SHORT_ID_LEN)
            .map_or(self.0.as_str(), |(end, _)| self.0.get(..end).unwrap_or(&self.0))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for InstanceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Image a slave container runs from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageReference {
    /// Image named in configuration. Never removed by the provisioner.
    Fixed(String),
    /// Image built for a single start attempt and removed on stop.
    Synthesized(String),
}

impl ImageReference {
    /// Returns the image name as passed to the engine.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Fixed(name) | Self::Synthesized(name) => name,
        }
    }

    /// Returns `true` for images built by the provisioner.
    #[must_use]
    pub const fn is_synthesized(&self) -> bool {
        matches!(self, Self::Synthesized(_))
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The live container attached to a slave.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRecord {
    /// Engine identifier of the container.
    pub id: InstanceId,
    /// Image the container was created from.
    pub image: ImageReference,
}

/// Token unique to one start attempt, used to name containers and images.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttemptToken(String);

impl AttemptToken {
    /// Generates a fresh token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    #[cfg(test)]
    pub(crate) fn from_value(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Container name for `slave` in this attempt.
    #[must_use]
    pub fn container_name(&self, slave: &str) -> String {
        format!("{slave}_{}", self.0)
    }

    /// Image name synthesized for `slave` in this attempt.
    #[must_use]
    pub fn image_name(&self, slave: &str) -> String {
        format!("{slave}_{}_image", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_truncates_long_identifiers() {
        let id = InstanceId::new("0123456789abcdef");
        assert_eq!(id.short(), "012345");
    }

    #[test]
    fn short_keeps_brief_identifiers() {
        assert_eq!(InstanceId::new("abc").short(), "abc");
    }

    #[test]
    fn attempt_names_embed_slave_and_token() {
        let token = AttemptToken::from_value("t0k");
        assert_eq!(token.container_name("worker"), "worker_t0k");
        assert_eq!(token.image_name("worker"), "worker_t0k_image");
    }

    #[test]
    fn generated_tokens_differ() {
        assert_ne!(AttemptToken::generate(), AttemptToken::generate());
    }

    #[test]
    fn only_synthesized_images_are_flagged() {
        assert!(ImageReference::Synthesized(String::from("x")).is_synthesized());
        assert!(!ImageReference::Fixed(String::from("x")).is_synthesized());
    }
}
