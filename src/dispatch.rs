//! Actuator dispatch.
//!
//! One dispatch is one synchronous HTTP POST to the sorter's `/sort` endpoint
//! carrying `{"data":{"grupo":"<signal>"}}`. There are no retries: a failed
//! dispatch is reported to the caller and the loop moves on. The request is
//! bounded by an explicit timeout so a stalled actuator cannot stall the
//! perception loop indefinitely.

use rand::RngCore;
use serde::Serialize;
use std::time::Duration;

/// Wire body of a sort command. Field names are the actuator's contract.
#[derive(Serialize)]
struct SortCommand<'a> {
    data: SortGroup<'a>,
}

#[derive(Serialize)]
struct SortGroup<'a> {
    grupo: &'a str,
}

/// Serialize the actuator payload for `signal`.
pub fn encode_command(signal: &str) -> String {
    // Two borrowed string fields; serialization cannot fail.
    serde_json::to_string(&SortCommand {
        data: SortGroup { grupo: signal },
    })
    .expect("sort command serializes")
}

/// Outcome classification for a failed dispatch.
#[derive(Debug)]
pub enum DispatchError {
    /// The HTTP exchange never completed: unreachable host, refused
    /// connection, or timeout.
    Transport(String),
    /// The actuator answered with a non-success status.
    Rejected { status: u16 },
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Transport(msg) => write!(f, "transport failure: {}", msg),
            DispatchError::Rejected { status } => {
                write!(f, "actuator rejected dispatch with http {}", status)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// The seam between the control loop and the actuator.
///
/// Callers must filter empty signals before dispatching; an empty signal is
/// "explicitly no action" and never reaches the wire.
pub trait Dispatcher {
    fn dispatch(&mut self, signal: &str) -> Result<(), DispatchError>;
}

/// Blocking HTTP dispatcher.
pub struct HttpDispatcher {
    agent: ureq::Agent,
    endpoint: String,
    /// Fixed correlation ID; when unset a fresh ID is generated per request.
    request_id: Option<String>,
}

impl HttpDispatcher {
    pub fn new(endpoint: &str, request_id: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            endpoint: endpoint.to_string(),
            request_id,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Dispatcher for HttpDispatcher {
    fn dispatch(&mut self, signal: &str) -> Result<(), DispatchError> {
        let body = encode_command(signal);
        let request_id = match &self.request_id {
            Some(id) => id.clone(),
            None => generate_request_id(),
        };

        let result = self
            .agent
            .post(&self.endpoint)
            .set("X-Request-ID", &request_id)
            .set("Content-Type", "application/json")
            .send_string(&body);

        match result {
            Ok(response) => {
                log::debug!(
                    "actuator accepted signal {:?} (http {}, request {})",
                    signal,
                    response.status(),
                    request_id
                );
                Ok(())
            }
            Err(ureq::Error::Status(status, _)) => Err(DispatchError::Rejected { status }),
            Err(ureq::Error::Transport(transport)) => {
                Err(DispatchError::Transport(transport.to_string()))
            }
        }
    }
}

/// Dispatcher for bench bring-up: logs each would-be request, touches nothing.
#[derive(Debug, Default)]
pub struct DryRunDispatcher {
    dispatched: u64,
}

impl DryRunDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

impl Dispatcher for DryRunDispatcher {
    fn dispatch(&mut self, signal: &str) -> Result<(), DispatchError> {
        self.dispatched += 1;
        log::info!(
            "dry-run: would dispatch {} to actuator",
            encode_command(signal)
        );
        Ok(())
    }
}

fn generate_request_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
