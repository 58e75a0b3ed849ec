use std::sync::Arc;
use tracing::debug;

use crate::error::PricingError;
use crate::pricing::models::{ResolvedModel, DEFAULT_PROVIDER};
use crate::pricing::repository::PricingRepository;

/// Built-in short-name mappings for the common model families.
///
/// Keys are lowercase. Values are OpenRouter-style canonical ids.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    // OpenAI
    ("gpt-4o", "openai/gpt-4o"),
    ("gpt-4o-mini", "openai/gpt-4o-mini"),
    ("gpt-4-turbo", "openai/gpt-4-turbo"),
    ("gpt-4.1", "openai/gpt-4.1"),
    ("gpt-4.1-mini", "openai/gpt-4.1-mini"),
    ("gpt-4.1-nano", "openai/gpt-4.1-nano"),
    ("gpt-5", "openai/gpt-5"),
    ("gpt-5-mini", "openai/gpt-5-mini"),
    ("gpt-5-codex", "openai/gpt-5-codex"),
    ("codex-mini-latest", "openai/codex-mini"),
    ("o1", "openai/o1"),
    ("o1-mini", "openai/o1-mini"),
    ("o3", "openai/o3"),
    ("o3-mini", "openai/o3-mini"),
    ("o4-mini", "openai/o4-mini"),
    // Anthropic
    ("claude-3-opus", "anthropic/claude-3-opus"),
    ("claude-3-opus-20240229", "anthropic/claude-3-opus"),
    ("claude-3-5-sonnet", "anthropic/claude-3.5-sonnet"),
    ("claude-3-5-sonnet-20241022", "anthropic/claude-3.5-sonnet"),
    ("claude-3-5-haiku", "anthropic/claude-3.5-haiku"),
    ("claude-3-5-haiku-20241022", "anthropic/claude-3.5-haiku"),
    ("claude-3-7-sonnet", "anthropic/claude-3.7-sonnet"),
    ("claude-3-7-sonnet-20250219", "anthropic/claude-3.7-sonnet"),
    ("claude-sonnet-4", "anthropic/claude-sonnet-4"),
    ("claude-sonnet-4-20250514", "anthropic/claude-sonnet-4"),
    ("claude-opus-4", "anthropic/claude-opus-4"),
    ("claude-opus-4-20250514", "anthropic/claude-opus-4"),
    ("claude-opus-4-1", "anthropic/claude-opus-4.1"),
    ("claude-sonnet-4-5", "anthropic/claude-sonnet-4.5"),
    ("claude-haiku-4-5", "anthropic/claude-haiku-4.5"),
    ("claude-opus-4-5", "anthropic/claude-opus-4.5"),
    ("sonnet", "anthropic/claude-sonnet-4.5"),
    ("opus", "anthropic/claude-opus-4.5"),
    ("haiku", "anthropic/claude-haiku-4.5"),
    // Google
    ("gemini-1.5-pro", "google/gemini-pro-1.5"),
    ("gemini-1.5-flash", "google/gemini-flash-1.5"),
    ("gemini-2.0-flash", "google/gemini-2.0-flash-001"),
    ("gemini-2.5-pro", "google/gemini-2.5-pro"),
    ("gemini-2.5-flash", "google/gemini-2.5-flash"),
    // Meta
    ("llama-3.1-8b", "meta-llama/llama-3.1-8b-instruct"),
    ("llama-3.1-70b", "meta-llama/llama-3.1-70b-instruct"),
    ("llama-3.1-405b", "meta-llama/llama-3.1-405b-instruct"),
    ("llama-3.3-70b", "meta-llama/llama-3.3-70b-instruct"),
    ("llama-4-maverick", "meta-llama/llama-4-maverick"),
    ("llama-4-scout", "meta-llama/llama-4-scout"),
];

/// Vendor prefixes tried against the built-in canonical ids.
const VENDOR_PREFIXES: &[&str] = &["openai/", "anthropic/", "google/", "meta-llama/"];

fn builtin_lookup(key: &str) -> Option<&'static str> {
    BUILTIN_ALIASES
        .iter()
        .find(|(short, _)| *short == key)
        .map(|(_, canonical)| *canonical)
}

fn builtin_canonical(candidate: &str) -> Option<&'static str> {
    BUILTIN_ALIASES
        .iter()
        .map(|(_, canonical)| *canonical)
        .find(|canonical| *canonical == candidate)
}

/// Maps runner-supplied model names to canonical `vendor/model` ids.
///
/// Read-only: consults the persisted alias table, then the built-in ruleset.
pub struct AliasResolver {
    repository: Arc<dyn PricingRepository>,
}

impl AliasResolver {
    pub fn new(repository: Arc<dyn PricingRepository>) -> Self {
        Self { repository }
    }

    pub async fn resolve(
        &self,
        runner_model: &str,
        runner_type: &str,
    ) -> Result<ResolvedModel, PricingError> {
        let input = runner_model.trim();
        if input.is_empty() {
            return Err(PricingError::invalid("model must not be empty"));
        }

        // Already canonical
        if input.contains('/') {
            return Ok(found(input, DEFAULT_PROVIDER));
        }

        if let Some(alias) = self.repository.get_alias(input, runner_type).await? {
            debug!(
                runner_model = input,
                runner_type,
                canonical_model = %alias.canonical_model,
                "Resolved model via alias table"
            );
            return Ok(found(&alias.canonical_model, &alias.provider));
        }

        Ok(resolve_builtin(input))
    }
}

/// Built-in rules, vendor-prefix probing and substring heuristics.
fn resolve_builtin(input: &str) -> ResolvedModel {
    let lowered = input.to_lowercase();

    if let Some(canonical) = builtin_lookup(&lowered) {
        return found(canonical, DEFAULT_PROVIDER);
    }

    for prefix in VENDOR_PREFIXES {
        if let Some(canonical) = builtin_canonical(&format!("{}{}", prefix, lowered)) {
            return found(canonical, DEFAULT_PROVIDER);
        }
    }

    // Best-effort guesses
    if lowered.contains("codex") || lowered.contains("gpt") {
        return found(&format!("openai/{}", input), DEFAULT_PROVIDER);
    }
    if lowered.contains("claude") {
        return found(&format!("anthropic/{}", input), DEFAULT_PROVIDER);
    }

    ResolvedModel {
        canonical_model: input.to_string(),
        provider: DEFAULT_PROVIDER.to_string(),
        found: false,
    }
}

fn found(canonical_model: &str, provider: &str) -> ResolvedModel {
    ResolvedModel {
        canonical_model: canonical_model.to_string(),
        provider: provider.to_string(),
        found: true,
    }
}
