//! Simple data models for the device telemetry session.
//!
//! Everything the device puts on the shared topic is JSON in one of three
//! shapes. [`WireMessage`] is the tagged union over those shapes; the
//! discriminant is inferred from which fields are present.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---

/// Command asking the device to republish its current poll rate.
pub const GET_POLL_RATE: &str = "getPollRate:";

/// Prefix of the command changing the device poll rate; the argument is in
/// milliseconds.
pub const SET_POLL_RATE_PREFIX: &str = "setPollRate:";

/// One telemetry reading as published by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    // ---
    /// Device clock in milliseconds.
    pub time: i64,
    pub temperature: f32,
    pub humidity: f32,
}

/// Tells subscribers to drop what they have collected so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResetSignal {
    // ---
    pub reset: bool,
}

/// Current sampling cadence reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PollRateReport {
    // ---
    #[serde(rename = "pollRate")]
    pub poll_rate_millis: i64,
}

/// A decoded message from the telemetry topic.
///
/// Variants are matched in declaration order and the first shape that
/// decodes wins, so a payload carrying both sample fields and `reset` is a
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Sample(TelemetrySample),
    Reset(ResetSignal),
    PollRate(PollRateReport),
}

impl WireMessage {
    // ---
    /// Decode a raw topic payload. Returns `None` for anything that is not
    /// a UTF-8 JSON object matching one of the three shapes.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        // ---
        let text = std::str::from_utf8(payload).ok()?;

        // Shapes are keyed; positional arrays never match
        let value: Value = serde_json::from_str(text).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

impl TelemetrySample {
    // ---
    /// Device time truncated to whole seconds.
    pub fn time_secs(&self) -> i64 {
        self.time / 1000
    }
}

impl PollRateReport {
    // ---
    /// Reported cadence in whole seconds, truncated toward zero. Sub-second
    /// rates become 0, which the session treats as unknown.
    pub fn poll_rate_secs(&self) -> i64 {
        self.poll_rate_millis / 1000
    }
}

/// Build the command that asks the device to poll every `seconds`.
pub fn set_poll_rate_command(seconds: u32) -> String {
    // ---
    format!("{}{}", SET_POLL_RATE_PREFIX, u64::from(seconds) * 1000)
}
