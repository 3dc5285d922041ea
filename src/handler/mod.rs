//! Pluggable per-request processing behind the admission pipeline.
//!
//! The worker loop admits a request and hands it here together with its
//! finish hook. The default implementation runs the chat flow: mutate the
//! conversation, start a generation, and return a streaming response while a
//! spawned task pumps chunks and eventually fires the hook.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::{
    ApiRequest, ApiResponse, ChatRequestBody, DEV_TOOL_HEADER, MESSAGE_ID_HEADER,
};
use crate::engine::{EngineError, GenerationParams, TextEngine};
use crate::generation::{FinishCallback, FinishReason, GenerationSession};
use crate::prompt::{Conversation, PromptTemplate};
use crate::scheduler::FinishHook;
use crate::stream::{apply_replacements, OutputMode};

#[derive(Debug, Error)]
pub enum HandlerError {
    /// The client went away before any output was produced. The worker maps
    /// this to the disconnected-before-streaming finish reason.
    #[error("client disconnected before streaming began")]
    ClientDisconnected,
    #[error("request carries no session")]
    NoSession,
    #[error("invalid request body: {0}")]
    BadRequest(String),
    #[error("cannot regenerate an empty conversation")]
    EmptyRegenerate,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Processes one admitted request.
///
/// On success the implementation owns the hook and must guarantee it fires
/// exactly once when the work truly ends. On error the worker fires it.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn process_request(
        &self,
        request: ApiRequest,
        finished: FinishHook,
    ) -> Result<ApiResponse, HandlerError>;
}

/// Builds the conversation for a session's first chat turn.
pub type ConversationFactory = Arc<dyn Fn() -> Conversation + Send + Sync>;

/// Chat flow: conversation update, generation, streaming response.
pub struct SessionRequestHandler {
    session: GenerationSession,
    template: Arc<dyn PromptTemplate>,
    defaults: GenerationParams,
    output_mode: OutputMode,
    new_conversation: ConversationFactory,
}

impl SessionRequestHandler {
    pub fn new(
        engine: Arc<dyn TextEngine>,
        template: Arc<dyn PromptTemplate>,
        defaults: GenerationParams,
        output_mode: OutputMode,
        emit_delay: Duration,
    ) -> Self {
        Self {
            session: GenerationSession::new(engine, Arc::clone(&template), emit_delay),
            template,
            defaults,
            output_mode,
            new_conversation: Arc::new(|| Conversation::new("<human>", "<bot>")),
        }
    }

    /// Override how a fresh conversation is seeded (role tags, system text).
    pub fn with_conversation_factory(mut self, factory: ConversationFactory) -> Self {
        self.new_conversation = factory;
        self
    }
}

#[async_trait]
impl RequestHandler for SessionRequestHandler {
    async fn process_request(
        &self,
        request: ApiRequest,
        finished: FinishHook,
    ) -> Result<ApiResponse, HandlerError> {
        if request.is_disconnected() {
            return Err(HandlerError::ClientDisconnected);
        }
        let session = request.session().cloned().ok_or(HandlerError::NoSession)?;
        let body: ChatRequestBody = serde_json::from_value(request.body().clone())
            .map_err(|e| HandlerError::BadRequest(e.to_string()))?;

        let conversation = session.conversation_or_init(|| (self.new_conversation)());
        {
            let mut conv = conversation.lock().await;
            if body.regenerate {
                if conv.is_empty() {
                    return Err(HandlerError::EmptyRegenerate);
                }
                conv.clear_last_responder();
            } else {
                let input =
                    apply_replacements(&body.user_input, self.template.input_replacements());
                conv.push_requester(input);
                conv.push_responder(None);
            }
        }

        let mut params = self.defaults.clone();
        params.apply_overrides(&session.generation_overrides());

        let active = self
            .session
            .begin(conversation, params, request.disconnect_token().clone())
            .await?;

        // Capacity 1: a chunk is not "delivered" until the transport pulled
        // the previous one, which is what makes disconnects observable.
        let (tx, rx) = mpsc::channel(1);
        let message_id = Uuid::new_v4();
        let hook = finished.clone();
        let on_finish: FinishCallback = Arc::new(move |reason: FinishReason| {
            hook.invoke(reason);
        });
        tokio::spawn(active.drive(tx, self.output_mode, on_finish));

        let mut response =
            ApiResponse::stream(rx).with_header(MESSAGE_ID_HEADER, &message_id.to_string());
        if request.role().map(|r| r.dev_tool_enabled).unwrap_or(false) {
            response = response.with_header(DEV_TOOL_HEADER, "enabled");
        }
        Ok(response)
    }
}
