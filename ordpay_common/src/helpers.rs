use std::time::Duration;

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

/// Parses a rate limit of the form `<count>/<period>`, where the period is one of `second`, `minute`, `hour` or
/// `day` (or the single-letter forms `s`, `m`, `h`, `d`). E.g. `30/hour`.
pub fn parse_rate_limit(value: &str) -> Option<(u32, Duration)> {
    let (count, period) = value.trim().split_once('/')?;
    let count = count.trim().parse::<u32>().ok()?;
    let secs = match period.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "second" => 1,
        "m" | "min" | "minute" => 60,
        "h" | "hr" | "hour" => 3_600,
        "d" | "day" => 86_400,
        _ => return None,
    };
    Some((count, Duration::from_secs(secs)))
}
