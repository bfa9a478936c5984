//! API key lookup
//!
//! The key comes from the environment variable named in `[models] api_key_env`
//! (or the provider's conventional variable). For Anthropic, a Claude Code
//! OAuth token is accepted as a fallback.

use ciport_core::config::{ModelConfig, Provider};
use ciport_core::{CiportError, Result};
use std::env;

const ANTHROPIC_OAUTH_ENV: &str = "CLAUDE_CODE_OAUTH_TOKEN";

/// Resolve the API key for the configured provider
pub fn resolve_api_key(config: &ModelConfig) -> Result<String> {
    let var = config.api_key_env();

    if let Some(key) = non_empty_var(var) {
        tracing::debug!("Using API key from {}", var);
        return Ok(key);
    }

    if config.provider == Provider::Anthropic {
        if let Some(token) = non_empty_var(ANTHROPIC_OAUTH_ENV) {
            tracing::debug!("Using {} for Anthropic", ANTHROPIC_OAUTH_ENV);
            return Ok(token);
        }
    }

    Err(CiportError::Auth(format!(
        "No API key found for {}. Set {}.",
        config.provider, var
    )))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
