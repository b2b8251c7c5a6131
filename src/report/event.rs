use serde::{Deserialize, Serialize};

/// Identifies the client, session and page an event came from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Header {
    pub client_id: String,
    pub session_id: String,
    pub sequence: i64,
    pub url: String,
    /// Client clock, milliseconds since the epoch
    pub timestamp: i64,
}

/// Playback buffering interval, in milliseconds relative to page load
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BufferTime {
    pub start: f64,
    pub duration: f64,
    /// Media position in seconds when the interval began
    pub position: f64,
    pub ready_state: i32,
}

/// Subset of a `PerformanceResourceTiming` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResourceTime {
    pub name: String,
    pub initiator_type: String,
    pub start_time: f64,
    pub duration: f64,
    pub fetch_start: f64,
    pub response_end: f64,
    pub transfer_size: i64,
    pub encoded_body_size: i64,
    pub decoded_body_size: i64,
    pub next_hop_protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferEvent {
    #[serde(flatten)]
    pub header: Header,
    #[serde(flatten)]
    pub timing: BufferTime,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    #[serde(flatten)]
    pub header: Header,
    #[serde(flatten)]
    pub timing: ResourceTime,
}

/// Request body of `POST /api/v1/report`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientReport {
    pub play: Vec<BufferEvent>,
    pub stalled: Vec<BufferEvent>,
    pub waiting: Vec<BufferEvent>,
    pub resource: Vec<ResourceEvent>,
}

impl ClientReport {
    pub fn event_count(&self) -> usize {
        self.play.len() + self.stalled.len() + self.waiting.len() + self.resource.len()
    }
}
