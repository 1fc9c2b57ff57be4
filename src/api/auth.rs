//! Agent credential handling: argon2 hashes at rest, bearer verification
//! per request, and a grace mode that admits but logs.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use tracing::warn;

use registry_metadata::{Agent, AgentId};

use crate::api::error::{ApiError, ApiResult};
use crate::platform::config::AuthMode;
use crate::platform::context::AppContext;

/// Hash a freshly issued API key for storage.
pub fn hash_api_key(key: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(key.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| ApiError::Validation("api key could not be hashed".to_string()))
}

/// Verify a presented key against the stored hash.
pub fn verify_api_key(key: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(key.as_bytes(), &parsed)
        .is_ok()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Authenticate an agent call: the path id plus the bearer credential,
/// verified against the stored hash. In grace mode a failed verification
/// admits the call but logs and audits it.
pub async fn authenticate_agent(
    ctx: &AppContext,
    agent_id: AgentId,
    headers: &HeaderMap,
) -> ApiResult<Agent> {
    let agent = ctx.registry().get_agent(agent_id).await?;
    if agent.archived_at.is_some() {
        return Err(ApiError::Unauthorized("agent is archived".to_string()));
    }

    let verified = bearer_token(headers)
        .map(|token| verify_api_key(token, &agent.api_key_hash))
        .unwrap_or(false);

    if verified {
        return Ok(agent);
    }

    match ctx.config().auth.mode {
        AuthMode::Enforce => {
            ctx.audit().log_auth_failure(&agent.name);
            Err(ApiError::Unauthorized(
                "invalid or missing agent credential".to_string(),
            ))
        }
        AuthMode::Grace => {
            warn!(agent = %agent.name, "unauthenticated agent call admitted (grace mode)");
            ctx.audit().log_auth_failure(&agent.name);
            Ok(agent)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_api_key("wt_agent_key_123").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_api_key("wt_agent_key_123", &hash));
        assert!(!verify_api_key("wrong-key", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_api_key("anything", "not-a-phc-string"));
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer wt_key".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("wt_key"));

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&basic), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
