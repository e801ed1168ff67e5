//! End-to-end pipeline runs against scripted collaborators.
//!
//! Run with: `cargo test -p comic-core --test pipeline_scenarios`

use comic_core::testing::{
    extraction_json, script_json, MockImageGenerator, MockMediaFetcher, MockServices,
    MockSpeechToText, RecordingSink, ScriptedTextGenerator,
};
use comic_core::{
    AudienceBand, CancellationToken, ComicError, ErrorClass, GenerationRequest, JobError,
    Pipeline, PipelineConfig, ProgressEvent, ProgressSink, RenderFailurePolicy, ServiceError,
    Stage,
};
use comic_core::progress::FnSink;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

const VIDEO: &str = "https://www.youtube.com/watch?v=photosynthesis";

fn config() -> PipelineConfig {
    PipelineConfig::new()
        .with_retry_base_delay(Duration::ZERO)
        .with_call_timeout(Duration::from_secs(5))
}

fn pipeline(mocks: &MockServices, config: PipelineConfig) -> Pipeline {
    Pipeline::new(mocks.services(), config)
}

fn photosynthesis(band: AudienceBand, pages: u8) -> GenerationRequest {
    GenerationRequest::topic("Photosynthesis", band, pages).unwrap()
}

fn indices(result: &comic_core::ComicResult) -> Vec<usize> {
    result.panels.iter().map(|p| p.descriptor.index).collect()
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test]
async fn test_topic_kid_one_page() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(4, 1)),
        MockImageGenerator::new(),
    );
    let sink = RecordingSink::new();

    let result = pipeline(&mocks, config())
        .run(&photosynthesis(AudienceBand::Kid, 1), &sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(indices(&result), vec![0, 1, 2, 3]);
    assert!(result.panels.iter().all(|p| p.render_attempts == 1));
    assert!(!result.is_partial());
    assert_eq!(result.title, "Leafy's Sunny Lunch");

    let prompts = mocks.text.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].prompt.contains("Photosynthesis"));

    assert_eq!(
        sink.stages(),
        vec![
            Stage::Normalizing,
            Stage::Planning,
            Stage::Rendering,
            Stage::Assembling,
            Stage::Done
        ]
    );
}

#[tokio::test]
async fn test_video_transcription_failure_aborts_at_normalizing() {
    let mocks = MockServices::new(ScriptedTextGenerator::new(), MockImageGenerator::new())
        .with_speech(MockSpeechToText::failing(ServiceError::process(
            "whisper exited with status 1",
        )));
    let request = GenerationRequest::video(VIDEO, AudienceBand::Kid, 1).unwrap();

    let err = pipeline(&mocks, config())
        .run(&request, &RecordingSink::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Normalizing);
    assert!(matches!(err.error, ComicError::Transcription { .. }));
    assert_eq!(err.class(), ErrorClass::ServiceUnavailable);
    assert_eq!(mocks.text.call_count(), 0);
    assert!(mocks.images.calls().is_empty());
}

#[tokio::test]
async fn test_short_script_aborts_before_rendering() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(3, 1)),
        MockImageGenerator::new(),
    );

    let err = pipeline(&mocks, config())
        .run(
            &photosynthesis(AudienceBand::Kid, 1),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Planning);
    assert!(matches!(err.error, ComicError::ScriptGeneration { .. }));
    assert!(mocks.images.calls().is_empty());
}

#[tokio::test]
async fn test_render_succeeds_on_third_attempt() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(4, 1)),
        MockImageGenerator::new().fail_first(1, 2),
    );

    let result = pipeline(&mocks, config())
        .run(
            &photosynthesis(AudienceBand::Kid, 1),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let attempts: Vec<u32> = result.panels.iter().map(|p| p.render_attempts).collect();
    assert_eq!(attempts, vec![1, 3, 1, 1]);
    assert_eq!(mocks.images.attempts(2), 1);
}

// =============================================================================
// INVARIANTS
// =============================================================================

#[tokio::test]
async fn test_panel_count_for_every_band_and_length() {
    for band in AudienceBand::ALL {
        let per_page = comic_core::audience::resolve(band).panels_per_page;
        for pages in 1..=5u8 {
            let expected = usize::from(pages) * per_page;
            let mocks = MockServices::new(
                ScriptedTextGenerator::new().respond(script_json(expected, pages)),
                MockImageGenerator::new(),
            );

            let result = pipeline(&mocks, config())
                .run(&photosynthesis(band, pages), &RecordingSink::new(), &CancellationToken::new())
                .await
                .unwrap();

            assert_eq!(indices(&result), (0..expected).collect::<Vec<_>>(), "{band} x {pages}");
        }
    }
}

#[tokio::test]
async fn test_topic_never_touches_media() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(2, 1)),
        MockImageGenerator::new(),
    );

    pipeline(&mocks, config())
        .run(
            &photosynthesis(AudienceBand::Toddler, 1),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(mocks.media.call_count(), 0);
    assert_eq!(mocks.speech.call_count(), 0);
}

#[tokio::test]
async fn test_context_payload_holds_previous_panels() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(6, 1)),
        MockImageGenerator::new(),
    );

    pipeline(&mocks, config().with_context_window(2))
        .run(
            &photosynthesis(AudienceBand::Teen, 1),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    for call in mocks.images.calls() {
        let k = call.panel;
        let expected: Vec<usize> = (k.saturating_sub(2)..k).collect();
        assert_eq!(call.reference_panels, expected, "panel {k}");
    }
}

// =============================================================================
// VIDEO SOURCES
// =============================================================================

#[tokio::test]
async fn test_video_source_end_to_end() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new()
            .respond(extraction_json(
                "Plants make food from light.",
                &["chlorophyll", "glucose"],
            ))
            .respond(script_json(4, 1)),
        MockImageGenerator::new(),
    );
    let sink = RecordingSink::new();
    let request = GenerationRequest::video(VIDEO, AudienceBand::Kid, 1).unwrap();

    let result = pipeline(&mocks, config())
        .run(&request, &sink, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.len(), 4);

    let prompts = mocks.text.prompts();
    assert!(prompts[0].prompt.contains("Plants turn sunlight"));
    assert!(prompts[1].prompt.contains("Plants make food from light."));
    assert!(prompts[1].prompt.contains("- chlorophyll"));

    let messages = sink.messages();
    let position = |m: &str| messages.iter().position(|x| x == m).unwrap();
    assert!(position("fetching media") < position("transcribing"));
    assert!(position("transcribing") < position("extracting concepts"));

    let scratch = mocks.media.scratch_dirs();
    assert_eq!(scratch.len(), 1);
    assert!(!scratch[0].exists());
}

#[tokio::test]
async fn test_media_fetch_failure_is_input_error() {
    let mocks = MockServices::new(ScriptedTextGenerator::new(), MockImageGenerator::new())
        .with_media(MockMediaFetcher::failing(ServiceError::process(
            "yt-dlp exited with exit status: 1: ERROR: Video unavailable",
        )));
    let request = GenerationRequest::video(VIDEO, AudienceBand::Teen, 1).unwrap();

    let err = pipeline(&mocks, config())
        .run(&request, &RecordingSink::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Normalizing);
    assert!(matches!(err.error, ComicError::MediaFetch { ref reference, .. } if reference == VIDEO));
    assert_eq!(err.class(), ErrorClass::FixInput);
    assert!(!mocks.media.scratch_dirs()[0].exists());
    assert_eq!(mocks.speech.call_count(), 0);
}

#[tokio::test]
async fn test_media_fetch_timeout_is_retryable() {
    let mocks = MockServices::new(ScriptedTextGenerator::new(), MockImageGenerator::new())
        .with_media(MockMediaFetcher::failing(ServiceError::timeout(
            Duration::from_secs(180),
        )));
    let request = GenerationRequest::video(VIDEO, AudienceBand::Kid, 1).unwrap();

    let err = pipeline(&mocks, config())
        .run(&request, &RecordingSink::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err.error, ComicError::MediaFetch { .. }));
    assert_eq!(err.class(), ErrorClass::RetryLater);
}

#[tokio::test]
async fn test_missing_helper_binary_is_service_unavailable() {
    let mocks = MockServices::new(ScriptedTextGenerator::new(), MockImageGenerator::new())
        .with_media(MockMediaFetcher::failing(ServiceError::config(
            "failed to run yt-dlp: No such file or directory",
        )));
    let request = GenerationRequest::video(VIDEO, AudienceBand::Kid, 1).unwrap();

    let err = pipeline(&mocks, config())
        .run(&request, &RecordingSink::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err.error, ComicError::MediaFetch { .. }));
    assert_eq!(err.class(), ErrorClass::ServiceUnavailable);
}

#[tokio::test]
async fn test_malformed_extraction_is_service_error() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond("Sorry, I can't summarize that."),
        MockImageGenerator::new(),
    );
    let request = GenerationRequest::video(VIDEO, AudienceBand::Kid, 1).unwrap();

    let err = pipeline(&mocks, config())
        .run(&request, &RecordingSink::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Normalizing);
    assert!(matches!(err.error, ComicError::GenerationService(_)));
}

#[tokio::test]
async fn test_script_service_failure() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().fail(ServiceError::api("status 429: quota exceeded")),
        MockImageGenerator::new(),
    );

    let err = pipeline(&mocks, config())
        .run(
            &photosynthesis(AudienceBand::Kid, 1),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Planning);
    assert_eq!(err.class(), ErrorClass::ServiceUnavailable);
}

// =============================================================================
// RENDER FAILURE POLICY
// =============================================================================

#[tokio::test]
async fn test_exhausted_render_aborts_by_default() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(4, 1)),
        MockImageGenerator::new().fail_first(2, 10),
    );
    let sink = RecordingSink::new();

    let err = pipeline(&mocks, config())
        .run(&photosynthesis(AudienceBand::Kid, 1), &sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Rendering);
    assert!(matches!(err.error, ComicError::Render { panel: 2, attempts: 3, .. }));
    assert_eq!(mocks.images.attempts(3), 0);
    assert_eq!(sink.events().last().map(|e| e.stage), Some(Stage::Aborted));
}

#[tokio::test]
async fn test_skip_mode_returns_partial_result() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(4, 1)),
        MockImageGenerator::new().fail_first(2, 10),
    );
    let config = config().with_render_failure_policy(RenderFailurePolicy::SkipPanel);

    let result = pipeline(&mocks, config)
        .run(
            &photosynthesis(AudienceBand::Kid, 1),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(result.is_partial());
    assert_eq!(result.skipped_panels, vec![2]);
    assert_eq!(indices(&result), vec![0, 1, 3]);

    let last = mocks.images.calls().pop().unwrap();
    assert_eq!(last.panel, 3);
    assert_eq!(last.reference_panels, vec![0, 1]);
}

#[tokio::test]
async fn test_skip_mode_with_nothing_rendered_aborts() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(2, 1)),
        MockImageGenerator::new().fail_first(0, 10).fail_first(1, 10),
    );
    let config = config()
        .with_render_failure_policy(RenderFailurePolicy::SkipPanel)
        .with_max_render_retries(0);

    let err = pipeline(&mocks, config)
        .run(
            &photosynthesis(AudienceBand::Toddler, 1),
            &RecordingSink::new(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err.error, ComicError::Render { panel: 1, attempts: 1, .. }));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_failed_attempt() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(2, 1)),
        MockImageGenerator::new().hang_first(0, 1),
    );
    let sink = RecordingSink::new();
    let config = config().with_call_timeout(Duration::from_secs(30));

    let result = pipeline(&mocks, config)
        .run(&photosynthesis(AudienceBand::Toddler, 1), &sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.panels[0].render_attempts, 2);
    assert!(sink.has_message("rendering panel 1 of 2, attempt 2"));
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// A sink that records events and cancels once `trigger` is emitted.
fn cancelling_sink(
    trigger: &'static str,
    token: &CancellationToken,
) -> (Arc<RecordingSink>, impl ProgressSink) {
    let recorder = Arc::new(RecordingSink::new());
    let events = recorder.clone();
    let token = token.clone();
    let sink = FnSink(move |event: &ProgressEvent| {
        events.emit(event.clone());
        if event.message == trigger {
            token.cancel();
        }
    });
    (recorder, sink)
}

#[tokio::test]
async fn test_cancel_during_video_releases_media() {
    let mocks = MockServices::new(ScriptedTextGenerator::new(), MockImageGenerator::new());
    let token = CancellationToken::new();
    let (recorder, sink) = cancelling_sink("fetching media", &token);
    let request = GenerationRequest::video(VIDEO, AudienceBand::Kid, 1).unwrap();

    let err = pipeline(&mocks, config())
        .run(&request, &sink, &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.reason(), "cancelled");
    assert_eq!(err.stage, Stage::Normalizing);
    assert_eq!(mocks.speech.call_count(), 0);

    let scratch = mocks.media.scratch_dirs();
    assert_eq!(scratch.len(), 1);
    assert!(!scratch[0].exists());
    assert!(recorder.has_message("aborted: cancelled"));
}

#[tokio::test]
async fn test_cancel_between_panels() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(4, 1)),
        MockImageGenerator::new(),
    );
    let token = CancellationToken::new();
    let (recorder, sink) = cancelling_sink("rendering panel 2 of 4", &token);

    let err = pipeline(&mocks, config())
        .run(&photosynthesis(AudienceBand::Kid, 1), &sink, &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.stage, Stage::Rendering);
    // The panel in flight finishes; the next one never starts.
    assert_eq!(mocks.images.attempts(1), 1);
    assert_eq!(mocks.images.attempts(2), 0);
    assert_eq!(recorder.events().last().map(|e| e.stage), Some(Stage::Aborted));
}

#[tokio::test]
async fn test_cancel_during_retries_is_not_a_skip() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(4, 1)),
        MockImageGenerator::new().fail_first(1, 10),
    );
    let token = CancellationToken::new();
    let (recorder, sink) = cancelling_sink("rendering panel 2 of 4, attempt 1", &token);
    let config = config()
        .with_max_render_retries(5)
        .with_render_failure_policy(RenderFailurePolicy::SkipPanel);

    let err = pipeline(&mocks, config)
        .run(&photosynthesis(AudienceBand::Kid, 1), &sink, &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.stage, Stage::Rendering);
    assert_eq!(mocks.images.attempts(1), 1);
    assert_eq!(mocks.images.attempts(2), 0);
    assert!(!recorder.has_message("skipping panel 2 of 4"));
}

// =============================================================================
// JOBS
// =============================================================================

#[tokio::test]
async fn test_job_streams_events_until_done() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(4, 1)),
        MockImageGenerator::new(),
    );
    let job = comic_core::job::spawn(
        Arc::new(pipeline(&mocks, config())),
        photosynthesis(AudienceBand::Kid, 1),
    );

    let (events, _cancel, handle) = job.into_parts();
    let events: Vec<ProgressEvent> = events.collect().await;
    let result = handle.await.unwrap().unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(events.first().map(|e| e.stage), Some(Stage::Normalizing));
    assert_eq!(events.last().map(|e| e.stage), Some(Stage::Done));
    assert!(events.iter().any(|e| e.panel_index == Some(3)));
}

#[tokio::test]
async fn test_job_cancel() {
    let mocks = MockServices::new(
        ScriptedTextGenerator::new().respond(script_json(4, 1)),
        MockImageGenerator::new(),
    );
    let job = comic_core::job::spawn(
        Arc::new(pipeline(&mocks, config())),
        photosynthesis(AudienceBand::Kid, 1),
    );
    job.cancel();

    match job.wait().await {
        Err(JobError::Pipeline(err)) => assert!(err.is_cancelled()),
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(mocks.text.call_count(), 0);
}
