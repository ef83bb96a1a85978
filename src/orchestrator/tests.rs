use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::audio::{AudioPayload, WAV_MIME};
use crate::collaborators::{Emotion, HistoryEntry};
use crate::persistence::SessionStore;
use crate::test_support::{narration, recording, Harness};

const OWNER: &str = "device-1";

fn request(mode: ResponseMode) -> TurnRequest {
    TurnRequest {
        owner_id: OWNER.into(),
        audio: Some(recording()),
        language: "en-US".into(),
        response_mode: mode,
        history: Vec::new(),
    }
}

fn fused_config() -> TurnConfig {
    TurnConfig {
        emotion_strategy: EmotionStrategy::RespondWithEmotion,
        ..TurnConfig::default()
    }
}

fn short_timeout_config() -> TurnConfig {
    TurnConfig {
        collaborator_timeout: Duration::from_millis(50),
        ..TurnConfig::default()
    }
}

fn expect_completed(outcome: TurnOutcome) -> CompletedTurn {
    match outcome {
        TurnOutcome::Completed(completed) => completed,
        TurnOutcome::Silent => panic!("expected a completed turn"),
    }
}

#[tokio::test]
async fn voice_turn_populates_every_field_and_is_written_once() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let outcome = orchestrator
        .process_turn(request(ResponseMode::Voice))
        .await
        .expect("turn completes");
    let completed = expect_completed(outcome);
    let turn = &completed.turn;
    assert!(turn.id.is_local());
    assert_eq!(turn.owner, OWNER);
    assert_eq!(turn.user_text, "I had a rough day");
    assert_eq!(turn.emotion, Emotion::Sadness);
    assert_eq!(turn.reply_text, "Arre beta, come sit with me.");
    assert_eq!(
        turn.reply_audio_ref.as_deref(),
        Some(narration().as_data_uri().as_str())
    );
    assert!(completed.narration_error.is_none());

    orchestrator.flush_writes().await;
    assert_eq!(harness.store.write_attempts(), 1);
    let stored = harness.store.list(OWNER).await.expect("list");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].transcript, turn.user_text);
    assert_eq!(stored[0].emotion, Emotion::Sadness);
    assert_eq!(stored[0].reply_text, turn.reply_text);
    assert_eq!(stored[0].reply_audio_ref, turn.reply_audio_ref);
}

#[tokio::test]
async fn detected_emotion_is_handed_to_the_responder() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(TurnConfig::default());
    assert_eq!(orchestrator.strategy(), EmotionStrategy::DetectThenRespond);

    orchestrator
        .process_turn(request(ResponseMode::Text))
        .await
        .expect("turn completes");
    let sent = harness.responder.last_request().expect("responder called");
    assert_eq!(sent.emotion, Some(Emotion::Sadness));
    assert_eq!(sent.transcript, "I had a rough day");
    assert_eq!(harness.emotion.script.calls(), 1);
    assert_eq!(harness.responder.fused.calls(), 0);
}

#[tokio::test]
async fn fused_strategy_gets_emotion_and_reply_in_one_call() {
    let harness = Harness::new();
    harness
        .responder
        .fused
        .push(Ok((Emotion::Joy, "  So happy for you!  ".into())));
    let orchestrator = harness.orchestrator(fused_config());
    assert_eq!(orchestrator.strategy(), EmotionStrategy::RespondWithEmotion);

    let completed = expect_completed(
        orchestrator
            .process_turn(request(ResponseMode::Text))
            .await
            .expect("turn completes"),
    );
    assert_eq!(completed.turn.emotion, Emotion::Joy);
    assert_eq!(completed.turn.reply_text, "So happy for you!");
    assert_eq!(harness.emotion.script.calls(), 0);
    assert_eq!(harness.responder.replies.calls(), 0);
    assert_eq!(
        harness.responder.last_request().expect("responder called").emotion,
        None
    );
}

#[tokio::test]
async fn completed_turns_always_carry_emotion_and_reply() {
    for strategy in [
        EmotionStrategy::DetectThenRespond,
        EmotionStrategy::RespondWithEmotion,
    ] {
        for transcript in ["ok", "I miss my grandmother", "  work was fine  "] {
            let harness = Harness::new();
            harness.transcriber.script.push(Ok(transcript.into()));
            let orchestrator = harness.orchestrator(TurnConfig {
                emotion_strategy: strategy,
                ..TurnConfig::default()
            });
            let completed = expect_completed(
                orchestrator
                    .process_turn(request(ResponseMode::Text))
                    .await
                    .expect("turn completes"),
            );
            assert_eq!(completed.turn.user_text, transcript.trim());
            assert!(!completed.turn.emotion.as_str().is_empty());
            assert!(!completed.turn.emotion.is_pending());
            assert!(!completed.turn.reply_text.is_empty());
        }
    }
}

#[tokio::test]
async fn silent_transcripts_stop_the_pipeline_without_a_write() {
    for transcript in ["", "   ", "\n\t"] {
        let harness = Harness::new();
        harness.transcriber.script.push(Ok(transcript.into()));
        let orchestrator = harness.orchestrator(TurnConfig::default());

        let outcome = orchestrator
            .process_turn(request(ResponseMode::Voice))
            .await
            .expect("silence is not an error");
        assert!(outcome.is_silent());

        orchestrator.flush_writes().await;
        assert_eq!(harness.store.write_attempts(), 0);
        assert_eq!(harness.collaborator_calls(), 1);
    }
}

#[tokio::test]
async fn transcription_failure_is_fatal() {
    let harness = Harness::new();
    harness.transcriber.script.push(Err("stt 503".into()));
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let err = orchestrator
        .process_turn(request(ResponseMode::Voice))
        .await
        .expect_err("turn fails");
    assert!(matches!(err, TurnError::TranscriptionFailed(ref message) if message.contains("stt 503")));
    assert!(!err.is_recoverable());
    assert_eq!(harness.collaborator_calls(), 1);
    orchestrator.flush_writes().await;
    assert_eq!(harness.store.write_attempts(), 0);
}

#[tokio::test]
async fn emotion_failure_is_fatal() {
    let harness = Harness::new();
    harness.emotion.script.push(Err("classifier down".into()));
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let err = orchestrator
        .process_turn(request(ResponseMode::Voice))
        .await
        .expect_err("turn fails");
    assert!(matches!(err, TurnError::EmotionDetectionFailed(_)));
    assert_eq!(harness.responder.replies.calls(), 0);
    orchestrator.flush_writes().await;
    assert_eq!(harness.store.write_attempts(), 0);
}

#[tokio::test]
async fn response_failure_is_fatal_and_skips_narration() {
    let harness = Harness::new();
    harness.responder.replies.push(Err("model overloaded".into()));
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let err = orchestrator
        .process_turn(request(ResponseMode::Voice))
        .await
        .expect_err("turn fails");
    assert!(matches!(err, TurnError::ResponseGenerationFailed(_)));
    assert_eq!(harness.narrator.script.calls(), 0);
    orchestrator.flush_writes().await;
    assert_eq!(harness.store.write_attempts(), 0);
}

#[tokio::test]
async fn blank_reply_counts_as_a_response_failure() {
    let harness = Harness::new();
    harness.responder.replies.push(Ok("   ".into()));
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let err = orchestrator
        .process_turn(request(ResponseMode::Text))
        .await
        .expect_err("turn fails");
    assert!(matches!(err, TurnError::ResponseGenerationFailed(_)));
}

#[tokio::test]
async fn fused_reply_without_a_label_fails_emotion_detection() {
    let harness = Harness::new();
    harness
        .responder
        .fused
        .push(Ok((Emotion::Pending, "hello".into())));
    let orchestrator = harness.orchestrator(fused_config());

    let err = orchestrator
        .process_turn(request(ResponseMode::Text))
        .await
        .expect_err("turn fails");
    assert!(matches!(err, TurnError::EmotionDetectionFailed(_)));
}

#[tokio::test]
async fn fused_reply_with_a_blank_label_fails_emotion_detection() {
    let harness = Harness::new();
    harness
        .responder
        .fused
        .push(Ok((Emotion::Other(String::new()), "hello".into())));
    let orchestrator = harness.orchestrator(fused_config());

    let err = orchestrator
        .process_turn(request(ResponseMode::Text))
        .await
        .expect_err("turn fails");
    assert!(matches!(err, TurnError::EmotionDetectionFailed(_)));
    orchestrator.flush_writes().await;
    assert_eq!(harness.store.write_attempts(), 0);
}

#[tokio::test]
async fn narration_failure_still_delivers_and_writes_the_text_turn() {
    let harness = Harness::new();
    harness.narrator.script.push(Err("tts quota".into()));
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let completed = expect_completed(
        orchestrator
            .process_turn(request(ResponseMode::Voice))
            .await
            .expect("turn completes"),
    );
    assert!(completed.turn.reply_audio_ref.is_none());
    assert!(!completed.turn.reply_text.is_empty());
    let soft = completed.narration_error.expect("soft error present");
    assert!(soft.is_recoverable());

    orchestrator.flush_writes().await;
    let stored = harness.store.list(OWNER).await.expect("list");
    assert_eq!(stored.len(), 1);
    assert!(stored[0].reply_audio_ref.is_none());
}

#[tokio::test]
async fn empty_narration_audio_is_a_soft_failure() {
    let harness = Harness::new();
    harness
        .narrator
        .script
        .push(Ok(AudioPayload::new(WAV_MIME, Vec::<u8>::new())));
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let completed = expect_completed(
        orchestrator
            .process_turn(request(ResponseMode::Voice))
            .await
            .expect("turn completes"),
    );
    assert!(completed.turn.reply_audio_ref.is_none());
    assert!(matches!(
        completed.narration_error,
        Some(TurnError::NarrationFailed(_))
    ));
}

#[tokio::test]
async fn text_mode_skips_narration() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let completed = expect_completed(
        orchestrator
            .process_turn(request(ResponseMode::Text))
            .await
            .expect("turn completes"),
    );
    assert!(completed.turn.reply_audio_ref.is_none());
    assert!(completed.narration_error.is_none());
    assert_eq!(harness.narrator.script.calls(), 0);
}

#[tokio::test]
async fn voice_mode_without_a_narrator_degrades_to_text() {
    let harness = Harness::new();
    let store: Arc<dyn SessionStore> = harness.store.clone();
    let orchestrator = TurnOrchestrator::with_components(
        TurnConfig::default(),
        harness.transcriber.clone(),
        harness.emotion.clone(),
        harness.responder.clone(),
        None,
        store,
    );

    let completed = expect_completed(
        orchestrator
            .process_turn(request(ResponseMode::Voice))
            .await
            .expect("turn completes"),
    );
    assert!(completed.turn.reply_audio_ref.is_none());
    assert!(matches!(
        completed.narration_error,
        Some(TurnError::NarrationFailed(_))
    ));
    orchestrator.flush_writes().await;
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn slow_narration_times_out_softly() {
    let harness = Harness::new();
    harness.narrator.script.set_delay(Duration::from_millis(300));
    let orchestrator = harness.orchestrator(short_timeout_config());

    let completed = expect_completed(
        orchestrator
            .process_turn(request(ResponseMode::Voice))
            .await
            .expect("turn completes"),
    );
    assert!(completed.turn.reply_audio_ref.is_none());
    assert!(matches!(
        completed.narration_error,
        Some(TurnError::NarrationFailed(ref message)) if message.contains("timed out")
    ));
}

#[tokio::test]
async fn slow_transcription_times_out_as_a_transcription_failure() {
    let harness = Harness::new();
    harness.transcriber.script.set_delay(Duration::from_millis(300));
    let orchestrator = harness.orchestrator(short_timeout_config());

    let err = orchestrator
        .process_turn(request(ResponseMode::Voice))
        .await
        .expect_err("turn fails");
    assert!(matches!(err, TurnError::TranscriptionFailed(ref message) if message.contains("timed out")));
    assert_eq!(harness.emotion.script.calls(), 0);
}

#[tokio::test]
async fn input_errors_are_rejected_before_any_call() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let mut anonymous = request(ResponseMode::Voice);
    anonymous.owner_id = "   ".into();
    assert_eq!(
        orchestrator.process_turn(anonymous).await.err(),
        Some(TurnError::MissingIdentity)
    );

    let mut no_audio = request(ResponseMode::Voice);
    no_audio.audio = None;
    assert_eq!(
        orchestrator.process_turn(no_audio).await.err(),
        Some(TurnError::MissingAudio)
    );

    let mut empty_audio = request(ResponseMode::Voice);
    empty_audio.audio = Some(AudioPayload::new(WAV_MIME, Vec::<u8>::new()));
    let err = orchestrator
        .process_turn(empty_audio)
        .await
        .expect_err("empty audio rejected");
    assert!(err.is_input_error());

    assert_eq!(harness.collaborator_calls(), 0);
}

#[tokio::test]
async fn blank_language_falls_back_to_the_default() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(TurnConfig {
        default_language: "hi-IN".into(),
        ..TurnConfig::default()
    });

    let mut blank = request(ResponseMode::Text);
    blank.language = " ".into();
    orchestrator.process_turn(blank).await.expect("turn completes");
    orchestrator
        .process_turn(request(ResponseMode::Text))
        .await
        .expect("turn completes");

    let languages = harness
        .transcriber
        .languages
        .lock()
        .expect("languages lock")
        .clone();
    assert_eq!(languages, vec!["hi-IN".to_string(), "en-US".to_string()]);
    assert_eq!(
        harness.responder.last_request().expect("responder called").language,
        "en-US"
    );
}

#[tokio::test]
async fn history_sent_to_the_responder_drops_empty_entries() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let mut with_history = request(ResponseMode::Text);
    with_history.history = vec![
        HistoryEntry::user("I slept badly"),
        HistoryEntry::model("Rest today, beta."),
        HistoryEntry::user(""),
        HistoryEntry::model("  "),
        HistoryEntry::user("Better now"),
    ];
    orchestrator
        .process_turn(with_history)
        .await
        .expect("turn completes");

    let sent = harness.responder.last_request().expect("responder called");
    assert_eq!(
        sent.formatted_history,
        "user: I slept badly\nmodel: Rest today, beta.\nuser: Better now"
    );
}

#[tokio::test]
async fn failed_background_write_never_reaches_the_caller() {
    let harness = Harness::new();
    harness.store.set_fail_writes(true);
    let orchestrator = harness.orchestrator(TurnConfig::default());

    let completed = expect_completed(
        orchestrator
            .process_turn(request(ResponseMode::Voice))
            .await
            .expect("turn completes despite the store"),
    );
    assert!(!completed.turn.reply_text.is_empty());

    orchestrator.flush_writes().await;
    assert_eq!(harness.store.write_attempts(), 1);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn every_turn_is_an_independent_write() {
    let harness = Harness::new();
    let orchestrator = harness.orchestrator(TurnConfig::default());

    for _ in 0..3 {
        orchestrator
            .process_turn(request(ResponseMode::Text))
            .await
            .expect("turn completes");
    }
    orchestrator.flush_writes().await;
    assert_eq!(harness.store.write_attempts(), 3);
    assert_eq!(harness.store.len(), 3);
}
