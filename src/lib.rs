//! streamgate: admission-controlled streaming chat runtime.
//!
//! Sits between an HTTP layer and a text generation engine: bounds
//! concurrency with a three-queue admission pipeline, streams responses as
//! position-tagged chunks with delta encoding and output filtering, keeps
//! per-session conversation state, and resolves client roles before any
//! request is admitted.
//!
//! The HTTP framework is an external collaborator. It adapts inbound
//! requests into [`api::ApiRequest`], calls the matching `handle_*` method
//! on [`ChatRuntime`], and maps the returned [`api::ApiResponse`] onto the
//! wire.

pub mod access;
pub mod api;
pub mod config;
pub mod engine;
pub mod generation;
pub mod handler;
pub mod logging;
pub mod prompt;
pub mod scheduler;
pub mod sessions;
pub mod stream;

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::access::{RoleResolver, RoleSet};
use crate::api::{names, ApiRequest, ApiResponse, ChatRequestBody};
use crate::config::RuntimeConfig;
use crate::engine::{GenerationOverrides, GenerationParams, TextEngine};
use crate::handler::{RequestHandler, SessionRequestHandler};
use crate::prompt::PromptTemplate;
use crate::scheduler::{AdmissionPipeline, FinishHandler, SubmitError};
use crate::sessions::SessionStore;

/// The assembled runtime: role set, admission pipeline, session store, and
/// the chat request handler, wired around one engine and one template.
pub struct ChatRuntime {
    config: RuntimeConfig,
    resolver: RoleResolver,
    pipeline: Arc<AdmissionPipeline>,
    handler: Arc<dyn RequestHandler>,
    sessions: Arc<SessionStore>,
    template: Arc<dyn PromptTemplate>,
    shutdown: CancellationToken,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ChatRuntime {
    /// Wire a runtime around one engine and one template.
    ///
    /// `roles` comes pre-verified ([`RoleSet::new`] rejects a broken
    /// configuration before a runtime can exist); `None` disables access
    /// control entirely.
    pub fn new(
        config: RuntimeConfig,
        engine: Arc<dyn TextEngine>,
        template: Arc<dyn PromptTemplate>,
        roles: Option<RoleSet>,
    ) -> Self {
        let resolver = RoleResolver::new(roles.map(Arc::new));
        let pipeline = Arc::new(AdmissionPipeline::new(config.pipeline));
        let handler = Arc::new(SessionRequestHandler::new(
            engine,
            Arc::clone(&template),
            config.generation.clone(),
            config.output_mode,
            config.emit_delay,
        ));
        Self {
            config,
            resolver,
            pipeline,
            handler,
            sessions: Arc::new(SessionStore::new()),
            template,
            shutdown: CancellationToken::new(),
            worker: parking_lot::Mutex::new(None),
        }
    }

    /// Swap in a custom request handler before starting the worker.
    pub fn with_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Observer called once per finished request. Set before `start`.
    pub fn set_on_finish(&self, on_finish: FinishHandler) {
        self.pipeline.set_on_finish(on_finish);
    }

    /// Spawn the admission worker. Idempotent: a second call is a no-op.
    pub fn start(&self) {
        let mut slot = self.worker.lock();
        if slot.is_some() {
            return;
        }
        tracing::info!(
            name = %self.config.name,
            max_concurrency = self.pipeline.config().max_concurrency,
            max_queue_size = self.pipeline.config().max_queue_size,
            "starting admission worker"
        );
        *slot = Some(
            self.pipeline
                .spawn_worker(Arc::clone(&self.handler), self.shutdown.clone()),
        );
    }

    /// Signal the worker to stop and wait for it.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Chat endpoint: role check, browser promotion, admission, then the
    /// response produced by the worker (streaming, overflow, or error).
    pub async fn handle_chat_request(&self, request: ApiRequest) -> ApiResponse {
        if self.resolver.verify_api(&request, names::CHAT_STREAM).is_err() {
            return ApiResponse::forbidden();
        }
        // A typed UI passphrase promotes the session instead of chatting.
        if request.session().is_some() {
            if let Ok(body) =
                serde_json::from_value::<ChatRequestBody>(request.body().clone())
            {
                if !body.regenerate && !body.user_input.is_empty() {
                    if let Some(role) =
                        self.resolver.promote_browser(&request, &body.user_input)
                    {
                        return ApiResponse::json(json!({
                            "success": true,
                            "message": "role promoted",
                            "role_name": role.role_name,
                        }));
                    }
                }
            }
        }
        match self.pipeline.submit(request) {
            Ok(result) => match result.await {
                Ok(response) => response,
                Err(_) => {
                    tracing::error!("admission worker dropped a result slot");
                    ApiResponse::internal_error()
                }
            },
            Err(SubmitError::QueueFull) => {
                ApiResponse::too_many_requests(self.config.overflow_as_http_error)
            }
        }
    }

    /// Current queue and processing occupancy.
    pub async fn handle_get_load(&self, request: ApiRequest) -> ApiResponse {
        if self.resolver.verify_api(&request, names::GET_LOAD).is_err() {
            return ApiResponse::forbidden();
        }
        let snapshot = self.pipeline.load();
        let mut body = json!({
            "success": true,
            "message": "success",
            "name": self.config.name,
        });
        if let (Some(map), Ok(serde_json::Value::Object(fields))) =
            (body.as_object_mut(), serde_json::to_value(&snapshot))
        {
            map.extend(fields);
        }
        ApiResponse::json(body)
    }

    /// Drop the session's conversation.
    pub async fn handle_clear_context(&self, request: ApiRequest) -> ApiResponse {
        if self.resolver.verify_api(&request, names::CLEAR_CONTEXT).is_err() {
            return ApiResponse::forbidden();
        }
        let cleared = request
            .session()
            .map(|s| s.clear_conversation())
            .unwrap_or(false);
        if cleared {
            ApiResponse::json(json!({"success": true, "message": "context cleared"}))
        } else {
            ApiResponse::json(json!({"success": false, "message": "no context."}))
        }
    }

    /// Rendered prompt for the session's conversation, or null.
    pub async fn handle_get_prompt(&self, request: ApiRequest) -> ApiResponse {
        if self.resolver.verify_api(&request, names::GET_PROMPT).is_err() {
            return ApiResponse::forbidden();
        }
        let conversation = request.session().and_then(|s| s.conversation());
        let prompt = match conversation {
            Some(conversation) => {
                let conv = conversation.lock().await;
                serde_json::Value::String(self.template.render(&conv, false))
            }
            None => serde_json::Value::Null,
        };
        ApiResponse::json(json!({"success": true, "prompt": prompt}))
    }

    /// Store per-session sampling overrides after range validation.
    pub async fn handle_set_generation_params(&self, request: ApiRequest) -> ApiResponse {
        if self
            .resolver
            .verify_api(&request, names::SET_GENERATION_PARAMS)
            .is_err()
        {
            return ApiResponse::forbidden();
        }
        let Some(session) = request.session() else {
            return ApiResponse::json_with_status(
                400,
                json!({"success": false, "message": "no session"}),
            );
        };
        let overrides: GenerationOverrides =
            match serde_json::from_value(request.body().clone()) {
                Ok(overrides) => overrides,
                Err(e) => {
                    return ApiResponse::json_with_status(
                        400,
                        json!({"success": false, "message": e.to_string()}),
                    );
                }
            };
        if let Err(e) = overrides.validate() {
            return ApiResponse::json_with_status(
                400,
                json!({"success": false, "message": e.to_string()}),
            );
        }
        session.set_generation_overrides(overrides);
        ApiResponse::json(json!({"success": true, "message": "params updated"}))
    }

    /// Effective sampling parameters (defaults merged with overrides).
    pub async fn handle_get_generation_params(&self, request: ApiRequest) -> ApiResponse {
        if self
            .resolver
            .verify_api(&request, names::GET_GENERATION_PARAMS)
            .is_err()
        {
            return ApiResponse::forbidden();
        }
        let mut params: GenerationParams = self.config.generation.clone();
        if let Some(session) = request.session() {
            params.apply_overrides(&session.generation_overrides());
        }
        let value = serde_json::to_value(&params).unwrap_or(serde_json::Value::Null);
        ApiResponse::json(json!({"success": true, "params": value}))
    }
}
