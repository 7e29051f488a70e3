/// Fallback token returned when normalization leaves nothing usable.
pub const SAFE_NAME_FALLBACK: &str = "chat_history";

/// Returns `name` with every character outside `[A-Za-z0-9_.-]` replaced by
/// an underscore, so chat titles can be used in file paths and dataset names.
/// An empty input, or one with no valid character at all, yields
/// [`SAFE_NAME_FALLBACK`].
pub fn safe_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut any_valid = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
            normalized.push(ch);
            any_valid = true;
        } else {
            normalized.push('_');
        }
    }
    if !any_valid {
        return SAFE_NAME_FALLBACK.to_string();
    }
    normalized
}
