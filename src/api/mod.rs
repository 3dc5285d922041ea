//! Transport-neutral request/response surface.
//!
//! The HTTP framework is an external collaborator: it adapts its own request
//! type into [`ApiRequest`], hands it to the runtime, and maps the returned
//! [`ApiResponse`] (JSON or a streaming channel) back onto the wire.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::access::ResolvedRole;
use crate::sessions::SessionHandle;

/// Registered API operation names.
pub mod names {
    pub const CHAT_STREAM: &str = "chat_stream";
    pub const CLEAR_CONTEXT: &str = "clear_context";
    pub const GET_LOAD: &str = "get_load";
    pub const GET_PROMPT: &str = "get_prompt";
    pub const SET_GENERATION_PARAMS: &str = "set_generation_params";
    pub const GET_GENERATION_PARAMS: &str = "get_generation_params";

    pub const ALL: &[&str] = &[
        CHAT_STREAM,
        CLEAR_CONTEXT,
        GET_LOAD,
        GET_PROMPT,
        SET_GENERATION_PARAMS,
        GET_GENERATION_PARAMS,
    ];
}

/// Header carrying an agent promotion passphrase.
pub const AUTH_HEADER: &str = "x-streamgate-auth";
/// Response header carrying the opaque message id of a chat response.
pub const MESSAGE_ID_HEADER: &str = "x-streamgate-message-id";
/// Response header flagging that the client's role enables dev tooling.
pub const DEV_TOOL_HEADER: &str = "x-streamgate-dev-tool";

/// Body of a chat request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub regenerate: bool,
}

/// One inbound request, already lifted out of the transport.
#[derive(Clone)]
pub struct ApiRequest {
    headers: HashMap<String, String>,
    body: serde_json::Value,
    session: Option<SessionHandle>,
    disconnect: CancellationToken,
    // Per-request role state for sessionless clients; session-bound clients
    // get it copied here at finalization.
    role: Arc<parking_lot::Mutex<Option<ResolvedRole>>>,
}

impl ApiRequest {
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            headers: HashMap::new(),
            body,
            session: None,
            disconnect: CancellationToken::new(),
            role: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    /// Header names are stored lowercase.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_disconnect(mut self, token: CancellationToken) -> Self {
        self.disconnect = token;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Token fired by the transport when the client goes away.
    pub fn disconnect_token(&self) -> &CancellationToken {
        &self.disconnect
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnect.is_cancelled()
    }

    pub fn role(&self) -> Option<ResolvedRole> {
        self.role.lock().clone()
    }

    pub fn set_role(&self, role: ResolvedRole) {
        *self.role.lock() = Some(role);
    }
}

/// One outbound response.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

#[derive(Debug)]
pub enum ResponseBody {
    Json(serde_json::Value),
    /// Rendered chunks, pulled by the transport one frame at a time.
    Stream(mpsc::Receiver<String>),
}

impl ApiResponse {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Json(value),
        }
    }

    pub fn json_with_status(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: ResponseBody::Json(value),
        }
    }

    pub fn stream(receiver: mpsc::Receiver<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: ResponseBody::Stream(receiver),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Queue-overflow response. The status code is configurable because some
    /// deployments front this with clients that treat any non-200 as fatal.
    pub fn too_many_requests(as_http_error: bool) -> Self {
        let status = if as_http_error { 429 } else { 200 };
        Self::json_with_status(status, json!({"error": "too_many_requests"}))
    }

    pub fn forbidden() -> Self {
        Self::json_with_status(403, json!({"error": "access_denied"}))
    }

    /// Generic request-processing failure; details stay in the logs.
    pub fn internal_error() -> Self {
        Self::json_with_status(
            500,
            json!({"error": "internal_server_error", "message": "generation failed"}),
        )
    }

    /// Result-slot response for a request whose client left before streaming.
    pub fn client_disconnected() -> Self {
        Self::json_with_status(200, json!({"error": "client_disconnected"}))
    }
}
