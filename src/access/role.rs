//! Role definitions, credential methods, and set-level verification.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::api::names;

/// Which APIs a role may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiAllowance {
    All,
    Named(Vec<String>),
}

impl ApiAllowance {
    pub fn permits(&self, api_name: &str) -> bool {
        match self {
            ApiAllowance::All => true,
            ApiAllowance::Named(list) => list.iter().any(|a| a == api_name),
        }
    }
}

/// How a client proves it holds a role.
///
/// `None` marks a default role granted without credentials. Header phrases
/// promote sessionless (agent) clients; UI phrases promote session-bound
/// (browser) clients by typing the phrase as chat input. The `Sha256`
/// variants store only the hex digest of the phrase.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthMethod {
    None,
    HeaderPhrase { phrase: String },
    HeaderPhraseSha256 { digest: String },
    UiPhrase { phrase: String },
    UiPhraseSha256 { digest: String },
}

impl AuthMethod {
    pub fn is_none(&self) -> bool {
        matches!(self, AuthMethod::None)
    }

    fn matches_header(&self, value: &str) -> bool {
        match self {
            // Plaintext comparison is exact equality, not constant time.
            AuthMethod::HeaderPhrase { phrase } => phrase == value,
            AuthMethod::HeaderPhraseSha256 { digest } => {
                digest.eq_ignore_ascii_case(&sha256_hex(value))
            }
            _ => false,
        }
    }

    fn matches_ui(&self, value: &str) -> bool {
        match self {
            AuthMethod::UiPhrase { phrase } => phrase == value,
            AuthMethod::UiPhraseSha256 { digest } => {
                digest.eq_ignore_ascii_case(&sha256_hex(value))
            }
            _ => false,
        }
    }
}

/// Hex-encoded SHA-256 digest of a phrase.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// One configured role.
#[derive(Debug, Clone)]
pub struct RoleDefinition {
    pub name: String,
    pub allow: ApiAllowance,
    pub auth: AuthMethod,
    /// Session-bound roles live in the session; sessionless roles are
    /// re-resolved per request.
    pub use_session: bool,
    pub enable_dev_tool: bool,
}

impl RoleDefinition {
    fn resolved(&self) -> ResolvedRole {
        ResolvedRole {
            role_name: self.name.clone(),
            allowed_apis: self.allow.clone(),
            dev_tool_enabled: self.enable_dev_tool,
        }
    }
}

/// The role actually bound to a request or session.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRole {
    pub role_name: String,
    pub allowed_apis: ApiAllowance,
    pub dev_tool_enabled: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum RoleConfigError {
    #[error("unknown API name '{api}' in allow list of role '{role}'")]
    UnknownApi { role: String, api: String },
    #[error("no session-bound default role (credential-free) is defined")]
    MissingBrowserDefault,
    #[error("multiple session-bound default roles defined: '{first}' and '{second}'")]
    DuplicateBrowserDefault { first: String, second: String },
}

/// Verified role configuration with cached default lookups.
#[derive(Debug)]
pub struct RoleSet {
    roles: Vec<RoleDefinition>,
    browser_default: ResolvedRole,
    agent_default: Option<ResolvedRole>,
}

impl RoleSet {
    /// Verify the definitions and build the set.
    ///
    /// Exactly one credential-free session-bound role must exist (the browser
    /// default). A missing credential-free sessionless role is legal; agents
    /// then have no access until they promote, which is logged as a warning.
    pub fn new(roles: Vec<RoleDefinition>) -> Result<Self, RoleConfigError> {
        for role in &roles {
            if let ApiAllowance::Named(apis) = &role.allow {
                for api in apis {
                    if !names::ALL.contains(&api.as_str()) {
                        return Err(RoleConfigError::UnknownApi {
                            role: role.name.clone(),
                            api: api.clone(),
                        });
                    }
                }
            }
        }

        let mut browser_default: Option<ResolvedRole> = None;
        let mut agent_default: Option<ResolvedRole> = None;
        for role in &roles {
            if !role.auth.is_none() {
                continue;
            }
            if role.use_session {
                if let Some(existing) = &browser_default {
                    return Err(RoleConfigError::DuplicateBrowserDefault {
                        first: existing.role_name.clone(),
                        second: role.name.clone(),
                    });
                }
                browser_default = Some(role.resolved());
            } else if agent_default.is_none() {
                agent_default = Some(role.resolved());
            }
        }
        let browser_default = browser_default.ok_or(RoleConfigError::MissingBrowserDefault)?;
        if agent_default.is_none() {
            tracing::warn!(
                "no sessionless default role defined; agent clients must present credentials"
            );
        }
        Ok(Self {
            roles,
            browser_default,
            agent_default,
        })
    }

    pub fn browser_default(&self) -> &ResolvedRole {
        &self.browser_default
    }

    pub fn agent_default(&self) -> Option<&ResolvedRole> {
        self.agent_default.as_ref()
    }

    /// First sessionless role whose header credential matches, if any.
    pub fn promote_agent(&self, header_value: &str) -> Option<ResolvedRole> {
        self.roles
            .iter()
            .find(|r| !r.use_session && r.auth.matches_header(header_value))
            .map(RoleDefinition::resolved)
    }

    /// First session-bound role whose UI passphrase matches, if any.
    pub fn promote_browser(&self, user_input: &str) -> Option<ResolvedRole> {
        self.roles
            .iter()
            .find(|r| r.use_session && r.auth.matches_ui(user_input))
            .map(RoleDefinition::resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_browser_role() -> RoleDefinition {
        RoleDefinition {
            name: "user".into(),
            allow: ApiAllowance::Named(vec![names::CHAT_STREAM.into()]),
            auth: AuthMethod::None,
            use_session: true,
            enable_dev_tool: false,
        }
    }

    #[test]
    fn duplicate_browser_default_is_rejected() {
        let mut second = default_browser_role();
        second.name = "user2".into();
        let err = RoleSet::new(vec![default_browser_role(), second]).unwrap_err();
        assert_eq!(
            err,
            RoleConfigError::DuplicateBrowserDefault {
                first: "user".into(),
                second: "user2".into(),
            }
        );
    }

    #[test]
    fn missing_browser_default_is_rejected() {
        let err = RoleSet::new(vec![]).unwrap_err();
        assert_eq!(err, RoleConfigError::MissingBrowserDefault);
    }

    #[test]
    fn unknown_api_name_is_rejected() {
        let mut role = default_browser_role();
        role.allow = ApiAllowance::Named(vec!["not_an_api".into()]);
        let err = RoleSet::new(vec![role]).unwrap_err();
        assert_eq!(
            err,
            RoleConfigError::UnknownApi {
                role: "user".into(),
                api: "not_an_api".into(),
            }
        );
    }

    #[test]
    fn hashed_header_phrase_promotes() {
        let admin = RoleDefinition {
            name: "admin".into(),
            allow: ApiAllowance::All,
            auth: AuthMethod::HeaderPhraseSha256 {
                digest: sha256_hex("open sesame"),
            },
            use_session: false,
            enable_dev_tool: true,
        };
        let set = RoleSet::new(vec![default_browser_role(), admin]).unwrap();
        assert!(set.promote_agent("wrong").is_none());
        let promoted = set.promote_agent("open sesame").unwrap();
        assert_eq!(promoted.role_name, "admin");
        assert!(promoted.dev_tool_enabled);
    }

    #[test]
    fn first_matching_role_wins_promotion() {
        let mk = |name: &str| RoleDefinition {
            name: name.into(),
            allow: ApiAllowance::All,
            auth: AuthMethod::HeaderPhrase { phrase: "shared".into() },
            use_session: false,
            enable_dev_tool: false,
        };
        let set = RoleSet::new(vec![default_browser_role(), mk("first"), mk("second")]).unwrap();
        assert_eq!(set.promote_agent("shared").unwrap().role_name, "first");
    }

    #[test]
    fn ui_phrase_promotes_browser_roles_only() {
        let power = RoleDefinition {
            name: "power".into(),
            allow: ApiAllowance::All,
            auth: AuthMethod::UiPhrase { phrase: "let me in".into() },
            use_session: true,
            enable_dev_tool: true,
        };
        let set = RoleSet::new(vec![default_browser_role(), power]).unwrap();
        assert!(set.promote_agent("let me in").is_none());
        assert_eq!(set.promote_browser("let me in").unwrap().role_name, "power");
    }
}
