use std::str::FromStr;

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Parse a number from an optional string value. Missing or malformed values fall back to `default`.
pub fn parse_number_or_default<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}
