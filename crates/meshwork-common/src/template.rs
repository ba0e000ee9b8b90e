//! Textual `${key}` substitution
//!
//! A flat key/value substitution pass applied to manifest text before it
//! is parsed and applied: identity hashes, CA bundles, and per-tenant
//! parameters are injected this way. Unknown placeholders are left intact
//! so later passes (or the manifests' own consumers) can resolve them.

use std::collections::BTreeMap;

/// Substitute `${key}` placeholders in `text` from `data`.
///
/// `$${...}` escapes to a literal `${...}`. Placeholders whose key is not
/// in `data` are left unchanged.
pub fn substitute(text: &str, data: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(idx) = rest.find("${") {
        // `$${` escapes to a literal `${`
        if idx > 0 && rest.as_bytes()[idx - 1] == b'$' {
            out.push_str(&rest[..idx - 1]);
            out.push_str("${");
            rest = &rest[idx + 2..];
            continue;
        }

        out.push_str(&rest[..idx]);
        let after = &rest[idx + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match data.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("${");
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated placeholder, emit as-is
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse a substitution data file: one `key=value` pair per line, `#`
/// comments and blank lines skipped.
pub fn parse_data_file(contents: &str) -> BTreeMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            line.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_keys() {
        let result = substitute(
            "name: ${tenant}\nca: ${ca_bundle}",
            &data(&[("tenant", "acme"), ("ca_bundle", "LS0t")]),
        );
        assert_eq!(result, "name: acme\nca: LS0t");
    }

    #[test]
    fn unknown_keys_are_left_intact() {
        let result = substitute("value: ${unknown}", &data(&[]));
        assert_eq!(result, "value: ${unknown}");
    }

    #[test]
    fn escaped_placeholder_is_literal() {
        let result = substitute("raw: $${not-subst}", &data(&[("not-subst", "x")]));
        assert_eq!(result, "raw: ${not-subst}");
    }

    #[test]
    fn unterminated_placeholder_is_preserved() {
        let result = substitute("broken: ${oops", &data(&[("oops", "x")]));
        assert_eq!(result, "broken: ${oops");
    }

    #[test]
    fn data_file_parsing() {
        let parsed = parse_data_file("# comment\ntenant=acme\n\nhash = abc123\n");
        assert_eq!(parsed.get("tenant").unwrap(), "acme");
        assert_eq!(parsed.get("hash").unwrap(), "abc123");
        assert_eq!(parsed.len(), 2);
    }
}
