use std::env;
use std::sync::OnceLock;

static T2O_STRICT_REGISTRY: OnceLock<bool> = OnceLock::new();

pub(crate) const LOG_LEVEL_ENV: &str = "T2O_LOG_LEVEL";
pub(crate) const LOG_FORMAT_ENV: &str = "T2O_LOG_FORMAT";

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Whether registry cache hits with a conflicting layout request are fatal (default on).
pub(crate) fn strict_registry_enabled() -> bool {
    *T2O_STRICT_REGISTRY.get_or_init(|| match env::var("T2O_STRICT_REGISTRY") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => true,
    })
}

pub(crate) fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
