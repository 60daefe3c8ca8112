use std::collections::BTreeMap;

/// Collects `CUSTOM_HEADER_<NAME>` environment variables into header name/value pairs.
///
/// `CUSTOM_HEADER_X_REQUEST_ID=abc` becomes the header `X-Request-Id: abc`: the prefix
/// is stripped, underscores become hyphens, and each hyphen-separated segment is
/// title-cased.
pub fn custom_headers_from_env() -> BTreeMap<String, String> {
    const PREFIX: &str = "CUSTOM_HEADER_";

    std::env::vars()
        .filter_map(|(key, value)| {
            let suffix = key.strip_prefix(PREFIX)?;
            Some((title_case_header(suffix), value))
        })
        .collect()
}

fn title_case_header(suffix: &str) -> String {
    suffix
        .split('_')
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_segments() {
        assert_eq!(title_case_header("X_REQUEST_ID"), "X-Request-Id");
        assert_eq!(title_case_header("AUTHORIZATION"), "Authorization");
    }

    #[test]
    fn reads_prefixed_env_vars() {
        // SAFETY: test-only env mutation, no other test in this crate reads these vars.
        unsafe {
            std::env::set_var("CUSTOM_HEADER_X_CUSTOM_ID", "42");
        }
        let headers = custom_headers_from_env();
        assert_eq!(headers.get("X-Custom-Id").map(String::as_str), Some("42"));
        unsafe {
            std::env::remove_var("CUSTOM_HEADER_X_CUSTOM_ID");
        }
    }
}
