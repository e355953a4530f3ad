//! Parse raw HTTP response header lines into a header map.

use std::collections::HashMap;

/// Collect `Name: value` lines into a map keyed by lower-cased name.
///
/// Repeated headers are joined with `", "`. Status lines and blank lines are
/// skipped. Only the last header block counts, so intermediate redirect and
/// `100 Continue` responses do not leak through.
pub(crate) fn parse_headers(lines: &[String]) -> HashMap<String, String> {
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            headers.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            headers
                .entry(name)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
    }

    headers
}
