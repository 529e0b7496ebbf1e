//! LED strip controller backend
//!
//! Talks to addressable LED controllers that expose the WLED-style
//! JSON HTTP API. Values map to segment brightness: zero turns the
//! segment off, anything else turns it on at the clamped brightness.
//!
//! The controller's segment list is fetched once per connection and
//! cached, so a target pointing at a segment the controller does not
//! have is skipped instead of posted blindly every tick.

use crate::device::DeviceBackend;
use crate::error::{OutrigError, Result};
use crate::types::{DeviceTarget, Value};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ControllerState {
    #[serde(default)]
    seg: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
struct Segment {
    #[serde(default)]
    id: u32,
}

/// Clamp a value into the controller's 0-255 brightness range
pub(crate) fn brightness_for(value: &Value) -> u8 {
    let n = value.as_number().round();
    if n.is_nan() {
        return 0;
    }
    n.clamp(0.0, 255.0) as u8
}

/// The JSON state body for one segment update
pub(crate) fn segment_body(segment: u32, brightness: u8) -> serde_json::Value {
    if brightness == 0 {
        json!({ "seg": [{ "id": segment, "on": false }] })
    } else {
        json!({ "seg": [{ "id": segment, "on": true, "bri": brightness }] })
    }
}

/// One LED controller connection
pub struct LedBackend {
    host: String,
    client: reqwest::blocking::Client,
    /// Segment ids reported by the controller, fetched on first use
    segments: Option<Vec<u32>>,
}

impl LedBackend {
    /// Create a backend for a controller host
    pub fn new(host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            host: host.into(),
            client,
            segments: None,
        })
    }

    fn state_url(&self) -> String {
        format!("http://{}/json/state", self.host)
    }

    /// Fetch and cache the controller's segment list
    fn known_segments(&mut self) -> Result<&[u32]> {
        if self.segments.is_none() {
            let state: ControllerState = self
                .client
                .get(self.state_url())
                .send()?
                .error_for_status()?
                .json()?;
            let ids: Vec<u32> = state.seg.iter().map(|s| s.id).collect();
            tracing::debug!("LED controller {} reports segments {:?}", self.host, ids);
            self.segments = Some(ids);
        }
        Ok(self.segments.as_deref().unwrap_or(&[]))
    }
}

impl DeviceBackend for LedBackend {
    fn apply(&mut self, value: &Value, target: &DeviceTarget, _display: &str) -> Result<()> {
        let DeviceTarget::LedSegment { segment, .. } = target else {
            return Err(OutrigError::Device(format!(
                "LED backend for {} received a non-LED target",
                self.host
            )));
        };

        if !self.known_segments()?.contains(segment) {
            tracing::trace!(
                "Controller {} has no segment {}, skipping",
                self.host,
                segment
            );
            return Ok(());
        }

        let brightness = brightness_for(value);
        let body = segment_body(*segment, brightness);
        self.client
            .post(self.state_url())
            .json(&body)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}
