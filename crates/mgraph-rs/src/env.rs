use std::env;
use std::sync::OnceLock;

static MGRAPH_OPTIMIZE: OnceLock<Option<bool>> = OnceLock::new();
static MGRAPH_LAZY: OnceLock<Option<bool>> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn read_flag(name: &str) -> Option<bool> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(parse_bool(&value)),
        _ => None,
    }
}

/// `MGRAPH_OPTIMIZE`: when set, overrides the configured program variant.
pub(crate) fn optimize_override() -> Option<bool> {
    *MGRAPH_OPTIMIZE.get_or_init(|| read_flag("MGRAPH_OPTIMIZE"))
}

/// `MGRAPH_LAZY`: when set, overrides the configured instantiation mode.
pub(crate) fn lazy_override() -> Option<bool> {
    *MGRAPH_LAZY.get_or_init(|| read_flag("MGRAPH_LAZY"))
}
