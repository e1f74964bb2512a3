pub(crate) fn parse_env_bool(value: String) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_env_csv(csv: &str) -> Vec<String> {
    csv.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .split(',')
        .map(str::trim)
        .map(|value| value.trim_matches('"').trim_matches('\''))
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect()
}
