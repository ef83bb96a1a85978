use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

pub(crate) const TARGET: &str = "telemetry::turn";
pub(crate) const EVENT_STEP: &str = "turn_step";
pub(crate) const EVENT_COMPLETED: &str = "turn_completed";
pub(crate) const EVENT_SILENT: &str = "turn_silent";
pub(crate) const EVENT_FAILED: &str = "turn_failed";
pub(crate) const EVENT_NARRATION_DEGRADED: &str = "turn_narration_degraded";
pub(crate) const EVENT_PERSIST_FAILED: &str = "turn_persist_failed";
pub(crate) const EVENT_SUMMARY: &str = "conversation_summary";

#[derive(Debug, Serialize)]
pub struct TurnStepEvent<'a> {
    pub owner: &'a str,
    pub step: &'static str,
    pub latency_ms: u64,
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct TurnCompletedEvent<'a> {
    pub owner: &'a str,
    pub emotion: &'a str,
    pub strategy: &'static str,
    pub narrated: bool,
    pub narration_degraded: bool,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct TurnFailedEvent<'a> {
    pub owner: &'a str,
    pub code: &'static str,
    pub error: &'a str,
}

pub fn record_turn_step(owner: &str, step: &'static str, latency: Duration, ok: bool) {
    let event = TurnStepEvent {
        owner,
        step,
        latency_ms: duration_to_ms(latency),
        ok,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_STEP,
            owner = event.owner,
            step = event.step,
            latency_ms = event.latency_ms,
            ok = event.ok,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_STEP,
            %err,
            "failed to encode turn step event"
        ),
    }
}

pub fn record_turn_completed(
    owner: &str,
    emotion: &str,
    strategy: &'static str,
    narrated: bool,
    narration_degraded: bool,
    latency: Duration,
) {
    let event = TurnCompletedEvent {
        owner,
        emotion,
        strategy,
        narrated,
        narration_degraded,
        latency_ms: duration_to_ms(latency),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_COMPLETED,
            owner = event.owner,
            emotion = event.emotion,
            strategy = event.strategy,
            narrated = event.narrated,
            narration_degraded = event.narration_degraded,
            latency_ms = event.latency_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_COMPLETED,
            %err,
            "failed to encode turn completion event"
        ),
    }
}

pub fn record_turn_silent(owner: &str, latency: Duration) {
    info!(
        target: TARGET,
        event = EVENT_SILENT,
        owner,
        latency_ms = duration_to_ms(latency),
        "no speech detected in recording"
    );
}

pub fn record_turn_failed(owner: &str, code: &'static str, error: &str) {
    let event = TurnFailedEvent { owner, code, error };

    match serde_json::to_string(&event) {
        Ok(payload) => warn!(
            target: TARGET,
            event = EVENT_FAILED,
            owner = event.owner,
            code = event.code,
            error = event.error,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_FAILED,
            %err,
            "failed to encode turn failure event"
        ),
    }
}

pub fn record_narration_degraded(owner: &str, error: &str) {
    warn!(
        target: TARGET,
        event = EVENT_NARRATION_DEGRADED,
        owner,
        error,
        "narration failed, delivering text-only turn"
    );
}

pub fn record_persist_failed(owner: &str, error: &str) {
    warn!(
        target: TARGET,
        event = EVENT_PERSIST_FAILED,
        owner,
        error,
        "background turn write failed"
    );
}

pub fn record_summary_generated(entries: usize, latency: Duration) {
    info!(
        target: TARGET,
        event = EVENT_SUMMARY,
        entries,
        latency_ms = duration_to_ms(latency),
        "conversation summary generated"
    );
}

fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_clamps_to_u64() {
        let duration = Duration::new(u64::MAX, 0);
        assert_eq!(duration_to_ms(duration), u64::MAX);
    }

    #[test]
    fn completed_event_serializes_all_fields() {
        let event = TurnCompletedEvent {
            owner: "device-1",
            emotion: "sadness",
            strategy: "detect_then_respond",
            narrated: true,
            narration_degraded: false,
            latency_ms: 42,
        };
        let value: serde_json::Value =
            serde_json::to_value(&event).expect("event serializes");
        assert_eq!(value["owner"], "device-1");
        assert_eq!(value["strategy"], "detect_then_respond");
        assert_eq!(value["latency_ms"], 42);
    }
}
