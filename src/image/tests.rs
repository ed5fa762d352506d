//! Tests for image matching, resolution and build-log consumption.

use futures_util::stream;
use rstest::rstest;

use super::*;
use crate::build_log::BuildLogRecord;
use crate::test_support::{
    EngineCall, Operation, RecordingEngine, SCRIPTED_HOST, ScriptedEngineError,
};

fn plan<'a>(fixed: Option<&'a str>, dockerfile: Option<&'a str>) -> ImagePlan<'a> {
    ImagePlan {
        slave: "worker",
        fixed,
        dockerfile,
        synthesized: String::from("worker_tok_image"),
    }
}

fn is_build(call: &EngineCall) -> bool {
    matches!(call, EngineCall::Build { .. })
}

#[rstest]
#[case("repo:tag", "repo:tag", true)]
#[case("repo:tag", "repo:other", false)]
#[case("repo", "repo:latest", true)]
#[case("repo", "repo:1.0", true)]
#[case("repo", "repository:latest", false)]
#[case("repo", "repo", false)]
#[case("localhost:5000/repo", "localhost:5000/repo:v1", true)]
fn matches_tags(#[case] name: &str, #[case] tag: &str, #[case] expected: bool) {
    assert_eq!(tag_matches(name, tag), expected);
}

#[tokio::test]
async fn existing_fixed_image_skips_build() {
    let engine = RecordingEngine::new().with_image(["busybox:latest"]);

    let image = resolve_image(&engine, &plan(Some("busybox"), Some("FROM scratch")))
        .await
        .expect("image should resolve");

    assert_eq!(image, ImageReference::Fixed(String::from("busybox")));
    assert_eq!(engine.calls(), [EngineCall::ListImages]);
}

#[tokio::test]
async fn missing_fixed_image_is_built_under_its_own_name() {
    let engine = RecordingEngine::new();

    let image = resolve_image(&engine, &plan(Some("custom:1"), Some("FROM scratch")))
        .await
        .expect("built image should resolve");

    assert_eq!(image, ImageReference::Fixed(String::from("custom:1")));
    assert_eq!(
        engine.calls(),
        [
            EngineCall::ListImages,
            EngineCall::Build {
                dockerfile: String::from("FROM scratch"),
                tag: String::from("custom:1"),
            },
            EngineCall::ListImages,
        ]
    );
}

#[tokio::test]
async fn synthesized_image_is_built_without_initial_lookup() {
    let engine = RecordingEngine::new();

    let image = resolve_image(&engine, &plan(None, Some("FROM scratch")))
        .await
        .expect("synthesized image should resolve");

    assert_eq!(
        image,
        ImageReference::Synthesized(String::from("worker_tok_image"))
    );
    assert_eq!(engine.count(is_build), 1);
    assert_eq!(
        engine.calls().first(),
        Some(&EngineCall::Build {
            dockerfile: String::from("FROM scratch"),
            tag: String::from("worker_tok_image"),
        })
    );
}

#[tokio::test]
async fn missing_fixed_image_without_dockerfile_is_not_found() {
    let engine = RecordingEngine::new().with_image(["other:latest"]);

    let err = resolve_image(&engine, &plan(Some("busybox"), None))
        .await
        .expect_err("image should be missing");

    assert!(matches!(
        err,
        SlaveError::ImageNotFound { ref image, ref host }
            if image == "busybox" && host == SCRIPTED_HOST
    ));
    assert_eq!(engine.count(is_build), 0);
}

#[tokio::test]
async fn build_that_produces_nothing_is_not_found() {
    let engine = RecordingEngine::new()
        .with_broken_build()
        .with_build_output(vec![BuildLogRecord::error("step failed")]);

    let err = resolve_image(&engine, &plan(None, Some("FROM nowhere")))
        .await
        .expect_err("broken build should not resolve");

    assert!(matches!(
        err,
        SlaveError::ImageNotFound { ref image, .. } if image == "worker_tok_image"
    ));
}

#[tokio::test]
async fn build_transport_failure_defers_to_existence_check() {
    let engine = RecordingEngine::new()
        .with_broken_build()
        .failing(Operation::Build);

    let err = resolve_image(&engine, &plan(None, Some("FROM scratch")))
        .await
        .expect_err("interrupted build should not resolve");

    assert!(matches!(err, SlaveError::ImageNotFound { .. }));
}

#[tokio::test]
async fn listing_failure_surfaces_as_engine_error() {
    let engine = RecordingEngine::new().failing(Operation::ListImages);

    let err = resolve_image(&engine, &plan(Some("busybox"), None))
        .await
        .expect_err("listing failure should surface");

    assert!(matches!(
        err,
        SlaveError::Engine {
            action: "list images",
            source: ScriptedEngineError {
                operation: Operation::ListImages
            },
            ..
        }
    ));
}

#[tokio::test]
async fn drain_emits_lines_in_order_and_survives_error_records() {
    let records: Vec<Result<BuildLogRecord, ScriptedEngineError>> = vec![
        Ok(BuildLogRecord::stream("Step 1/2\nStep 2/2\n")),
        Ok(BuildLogRecord::error("bad step")),
        Ok(BuildLogRecord::stream("Successfully built\n")),
    ];
    let mut seen = Vec::new();

    drain_build_log(Box::pin(stream::iter(records)), |line, is_error| {
        seen.push((line.to_owned(), is_error));
    })
    .await;

    assert_eq!(
        seen,
        [
            (String::from("Step 1/2"), false),
            (String::from("Step 2/2"), false),
            (String::from("ERROR: bad step"), true),
            (String::from("Successfully built"), false),
        ]
    );
}

#[tokio::test]
async fn drain_stops_at_transport_error() {
    let records: Vec<Result<BuildLogRecord, ScriptedEngineError>> = vec![
        Ok(BuildLogRecord::stream("first\n")),
        Err(ScriptedEngineError {
            operation: Operation::Build,
        }),
        Ok(BuildLogRecord::stream("never\n")),
    ];
    let mut seen = Vec::new();

    drain_build_log(Box::pin(stream::iter(records)), |line, _| {
        seen.push(line.to_owned());
    })
    .await;

    assert_eq!(seen, ["first"]);
}
