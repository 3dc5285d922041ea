//! Per-request role resolution.
//!
//! Resolution happens at admission, before a request ever reaches the queue:
//! grant the class default, apply promotions, finalize the binding onto the
//! request, then check the requested API against the bound allowance.

use std::sync::Arc;

use thiserror::Error;

use crate::api::{names, ApiRequest, AUTH_HEADER};

use super::role::{ResolvedRole, RoleSet};

#[derive(Debug, Error, PartialEq)]
#[error("role '{role}' is not allowed to call '{api}'")]
pub struct AccessDenied {
    pub role: String,
    pub api: String,
}

/// Resolves and checks roles. With no role set configured, access control is
/// disabled and every request passes.
#[derive(Clone, Default)]
pub struct RoleResolver {
    roles: Option<Arc<RoleSet>>,
}

impl RoleResolver {
    pub fn new(roles: Option<Arc<RoleSet>>) -> Self {
        Self { roles }
    }

    pub fn is_enabled(&self) -> bool {
        self.roles.is_some()
    }

    /// Bind the class default: session-bound requests get the browser default
    /// written into the session once; sessionless requests get the agent
    /// default (if any) bound to the request.
    fn grant_default(&self, request: &ApiRequest) {
        let Some(roles) = &self.roles else { return };
        match request.session() {
            Some(session) => session.set_role_if_absent(roles.browser_default()),
            None => {
                if let Some(agent) = roles.agent_default() {
                    request.set_role(agent.clone());
                }
            }
        }
    }

    /// Apply header promotion (sessionless clients) and copy the effective
    /// role onto the request.
    fn finalize(&self, request: &ApiRequest) {
        let Some(roles) = &self.roles else { return };
        match request.session() {
            Some(session) => {
                if let Some(role) = session.role() {
                    request.set_role(role);
                }
            }
            None => {
                if let Some(value) = request.header(AUTH_HEADER) {
                    if let Some(promoted) = roles.promote_agent(value) {
                        tracing::debug!(role = %promoted.role_name, "agent promoted via header");
                        request.set_role(promoted);
                    }
                }
            }
        }
    }

    /// Resolve the request's role and check it against `api_name`.
    ///
    /// A name that was never registered is denied no matter the role, even
    /// one whose allowance is `All`.
    pub fn verify_api(&self, request: &ApiRequest, api_name: &str) -> Result<(), AccessDenied> {
        if self.roles.is_none() {
            return Ok(());
        }
        if !names::ALL.contains(&api_name) {
            tracing::info!(api = api_name, "access denied: unregistered api name");
            return Err(AccessDenied {
                role: "<none>".to_string(),
                api: api_name.to_string(),
            });
        }
        self.grant_default(request);
        self.finalize(request);
        match request.role() {
            Some(role) if role.allowed_apis.permits(api_name) => Ok(()),
            Some(role) => {
                tracing::info!(role = %role.role_name, api = api_name, "access denied");
                Err(AccessDenied {
                    role: role.role_name,
                    api: api_name.to_string(),
                })
            }
            None => {
                tracing::info!(api = api_name, "access denied: no role bound");
                Err(AccessDenied {
                    role: "<none>".to_string(),
                    api: api_name.to_string(),
                })
            }
        }
    }

    /// Browser promotion: if the typed input matches a UI passphrase, bind
    /// the promoted role to the session and report it. The caller turns a
    /// successful promotion into a short-circuit response instead of a chat
    /// turn.
    pub fn promote_browser(&self, request: &ApiRequest, user_input: &str) -> Option<ResolvedRole> {
        let roles = self.roles.as_ref()?;
        let session = request.session()?;
        let promoted = roles.promote_browser(user_input)?;
        tracing::debug!(role = %promoted.role_name, "browser promoted via ui passphrase");
        session.set_role(promoted.clone());
        request.set_role(promoted.clone());
        Some(promoted)
    }
}
