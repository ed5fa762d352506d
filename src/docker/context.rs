//! In-memory build context for single-file builds.

use bytes::Bytes;

use super::error::DockerEngineError;

/// Name of the dockerfile inside the build context.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Wraps `dockerfile` in a tar archive holding a single [`DOCKERFILE_NAME`]
/// entry, which is what the engine build endpoint expects.
pub(crate) fn dockerfile_context(dockerfile: &[u8]) -> Result<Bytes, DockerEngineError> {
    let size = u64::try_from(dockerfile.len()).map_err(|err| DockerEngineError::Context {
        message: err.to_string(),
    })?;
    let mut header = tar::Header::new_gnu();
    header.set_size(size);
    header.set_mode(0o644);

    let mut archive = tar::Builder::new(Vec::new());
    archive.append_data(&mut header, DOCKERFILE_NAME, dockerfile)?;
    let bytes = archive.into_inner()?;
    Ok(Bytes::from(bytes))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn context_holds_only_the_dockerfile() {
        let context = dockerfile_context(b"FROM scratch\n").expect("context should build");

        let mut archive = tar::Archive::new(context.as_ref());
        let mut entries = archive.entries().expect("archive should list");
        let mut entry = entries
            .next()
            .expect("one entry")
            .expect("entry should read");
        assert_eq!(
            entry.path().expect("entry path").to_str(),
            Some(DOCKERFILE_NAME)
        );
        let mut body = String::new();
        entry.read_to_string(&mut body).expect("entry body");
        assert_eq!(body, "FROM scratch\n");
        drop(entry);
        assert!(entries.next().is_none());
    }

    #[test]
    fn empty_dockerfile_still_produces_an_entry() {
        let context = dockerfile_context(b"").expect("context should build");

        let mut archive = tar::Archive::new(context.as_ref());
        let count = archive.entries().expect("archive should list").count();
        assert_eq!(count, 1);
    }
}
