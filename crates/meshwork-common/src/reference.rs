//! Artifact reference parsing
//!
//! Normalizes the reference syntaxes accepted in component metadata into a
//! single [`ArtifactReference`] shape: container images, charts, file-based
//! bundles, and registry-info strings.
//!
//! The grammar alternatives are tried in a fixed priority order and the
//! first match wins. The order matters: explicit scheme+host forms must be
//! preferred over the looser fallbacks so a host segment is never mistaken
//! for an opaque info string. A leading segment counts as a host only when
//! it contains a dot or a port, mirroring Docker's shorthand rule. Tests
//! pin the winner for inputs that more than one grammar could plausibly
//! match.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;

/// A parsed, normalized artifact reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactReference {
    /// URL scheme, when the reference carried one ("oci", "https", "file")
    pub scheme: Option<String>,
    /// Registry host, including a port when present ("ghcr.io:5000")
    pub host: Option<String>,
    /// Repository path; always populated on a successful parse
    pub repository: String,
    /// Version tag, when present
    pub tag: Option<String>,
    /// Content digest ("sha256:..."), when present
    pub digest: Option<String>,
    /// Opaque registry info string for typed generic-info references
    pub info: Option<String>,
    /// Whether the reference carried a leading `+` (create if missing)
    pub create_if_missing: bool,
    /// Explicit type prefix ("docker::", "helm::"), when present
    pub type_hint: Option<String>,
}

// Shared grammar fragments. NAME is a dotless repository segment; a leading
// segment with dots is a registry host, not a repository.
const HOST: &str = r"[A-Za-z0-9][A-Za-z0-9-]*(?:\.[A-Za-z0-9-]+)+";
const NAME: &str = r"[a-z0-9]+(?:[_-][a-z0-9]+)*";
const SEGMENT: &str = r"[a-z0-9]+(?:[._-][a-z0-9]+)*";
const TAG: &str = r"[A-Za-z0-9_][A-Za-z0-9._-]*";
const DIGEST: &str = r"[a-z0-9]+:[a-fA-F0-9]+";

macro_rules! grammar {
    ($name:ident, $re:expr) => {
        static $name: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($re).expect("grammar regex must compile"));
    };
}

grammar!(TYPED_PREFIX, r"^(?P<type>[a-z][a-z0-9]*)::(?P<rest>.+)$");
grammar!(
    SCHEME_HOST_PORT,
    &format!(
        r"^(?P<scheme>[a-z][a-z0-9+.-]*)://(?P<host>{HOST}:\d+)/(?P<repo>{SEGMENT}(?:/{SEGMENT})*)(?::(?P<tag>{TAG}))?(?:@(?P<digest>{DIGEST}))?$"
    )
);
grammar!(
    HOST_PORT,
    &format!(
        r"^(?P<host>{HOST}:\d+)/(?P<repo>{SEGMENT}(?:/{SEGMENT})*)(?::(?P<tag>{TAG}))?(?:@(?P<digest>{DIGEST}))?$"
    )
);
grammar!(FILE_PATH, r"^(?:file://)?(?P<path>\.?/[A-Za-z0-9._/-]+)$");
grammar!(
    LIBRARY_SHORTHAND,
    &format!(r"^(?P<name>{NAME})(?::(?P<tag>{TAG}))?(?:@(?P<digest>{DIGEST}))?$")
);
grammar!(
    REGISTRY_HOST_REPO,
    &format!(
        r"^(?P<host>{HOST})/(?P<repo>{SEGMENT}(?:/{SEGMENT})*)(?::(?P<tag>{TAG}))?(?:@(?P<digest>{DIGEST}))?$"
    )
);
grammar!(
    DOCKER_SHORTHAND,
    &format!(
        r"^(?P<repo>{NAME}(?:/{SEGMENT})+)(?::(?P<tag>{TAG}))?(?:@(?P<digest>{DIGEST}))?$"
    )
);
grammar!(
    SCHEME_HOST_REPO,
    &format!(
        r"^(?P<scheme>[a-z][a-z0-9+.-]*)://(?P<host>{HOST})/(?P<repo>{SEGMENT}(?:/{SEGMENT})*)(?::(?P<tag>{TAG}))?(?:@(?P<digest>{DIGEST}))?$"
    )
);
grammar!(
    GENERIC_INFO,
    &format!(r"^(?P<info>[A-Za-z0-9._-]+)(?::(?P<tag>{TAG}))?$")
);
grammar!(
    REGISTRY_ONLY,
    &format!(r"^(?P<host>{HOST})(?::(?P<port>\d+))?/?$")
);

/// Default registry host for Docker shorthand references
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Parse an artifact reference string into its normalized form.
///
/// A leading `+` marks the referenced artifact as create-if-missing and is
/// stripped before grammar matching. Returns a typed invalid-reference
/// error naming the original input when nothing matches.
pub fn parse_reference(input: &str) -> Result<ArtifactReference, Error> {
    let (create_if_missing, body) = match input.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let mut reference = parse_body(body, true).ok_or_else(|| invalid(input, body))?;
    reference.create_if_missing = create_if_missing;
    Ok(reference)
}

/// Classify the attempted reference kind for error reporting.
fn invalid(original: &str, body: &str) -> Error {
    if body.starts_with("oci://") || body.starts_with("oci::") {
        Error::invalid_oci_reference(original)
    } else {
        Error::invalid_artifact_reference(original)
    }
}

/// Try the untyped grammars in priority order.
///
/// `allow_shorthand` gates the bare Docker shorthands: inside a typed
/// prefix a bare name is an opaque info string, not an implicit
/// `library/` image, so typed recursion disables them.
fn parse_body(body: &str, allow_shorthand: bool) -> Option<ArtifactReference> {
    // (a)/(b) explicit host with port, scheme first
    if let Some(caps) = SCHEME_HOST_PORT.captures(body) {
        return Some(ArtifactReference {
            scheme: capture(&caps, "scheme"),
            host: capture(&caps, "host"),
            repository: caps["repo"].to_string(),
            tag: capture(&caps, "tag"),
            digest: capture(&caps, "digest"),
            ..Default::default()
        });
    }
    if let Some(caps) = HOST_PORT.captures(body) {
        return Some(ArtifactReference {
            host: capture(&caps, "host"),
            repository: caps["repo"].to_string(),
            tag: capture(&caps, "tag"),
            digest: capture(&caps, "digest"),
            ..Default::default()
        });
    }

    // (c) file-path references, local bundles
    if let Some(caps) = FILE_PATH.captures(body) {
        return Some(ArtifactReference {
            scheme: Some("file".to_string()),
            repository: caps["path"].to_string(),
            ..Default::default()
        });
    }

    // (d) bare name: implicit library/ prefix on the default registry
    if allow_shorthand {
        if let Some(caps) = LIBRARY_SHORTHAND.captures(body) {
            return Some(ArtifactReference {
                host: Some(DEFAULT_REGISTRY.to_string()),
                repository: format!("library/{}", &caps["name"]),
                tag: capture(&caps, "tag"),
                digest: capture(&caps, "digest"),
                ..Default::default()
            });
        }
    }

    // (e) registry-host/repo, then org/name shorthand on the default registry
    if let Some(caps) = REGISTRY_HOST_REPO.captures(body) {
        return Some(ArtifactReference {
            host: capture(&caps, "host"),
            repository: caps["repo"].to_string(),
            tag: capture(&caps, "tag"),
            digest: capture(&caps, "digest"),
            ..Default::default()
        });
    }
    if allow_shorthand {
        if let Some(caps) = DOCKER_SHORTHAND.captures(body) {
            return Some(ArtifactReference {
                host: Some(DEFAULT_REGISTRY.to_string()),
                repository: caps["repo"].to_string(),
                tag: capture(&caps, "tag"),
                digest: capture(&caps, "digest"),
                ..Default::default()
            });
        }
    }

    // (f) generic scheme://host/repo
    if let Some(caps) = SCHEME_HOST_REPO.captures(body) {
        return Some(ArtifactReference {
            scheme: capture(&caps, "scheme"),
            host: capture(&caps, "host"),
            repository: caps["repo"].to_string(),
            tag: capture(&caps, "tag"),
            digest: capture(&caps, "digest"),
            ..Default::default()
        });
    }

    // (g)/(h)/(i) typed prefix: try the explicit grammars on the remainder,
    // falling back to the opaque generic-info form
    if let Some(caps) = TYPED_PREFIX.captures(body) {
        let type_hint = caps["type"].to_string();
        let rest = &caps["rest"];
        if let Some(mut inner) = parse_body(rest, false) {
            inner.type_hint = Some(type_hint);
            return Some(inner);
        }
        if let Some(info_caps) = GENERIC_INFO.captures(rest) {
            let info = info_caps["info"].to_string();
            let tag = capture(&info_caps, "tag");
            // Consistency check: the matched pieces must reconstruct the
            // remainder exactly, otherwise trailing characters slipped by
            let reconstructed = match &tag {
                Some(t) => format!("{info}:{t}"),
                None => info.clone(),
            };
            if reconstructed != rest {
                return None;
            }
            return Some(ArtifactReference {
                repository: info.clone(),
                info: Some(info),
                tag,
                type_hint: Some(type_hint),
                ..Default::default()
            });
        }
        return None;
    }

    // (j) anchored registry-only form: the reference names the registry itself
    if let Some(caps) = REGISTRY_ONLY.captures(body) {
        let host = match capture(&caps, "port") {
            Some(port) => format!("{}:{}", &caps["host"], port),
            None => caps["host"].to_string(),
        };
        return Some(ArtifactReference {
            host: Some(host.clone()),
            repository: host,
            ..Default::default()
        });
    }

    None
}

/// A present-but-empty capture maps to absent, never to an empty string.
fn capture(caps: &regex::Captures<'_>, name: &str) -> Option<String> {
    caps.name(name)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_library_reference_round_trip() {
        let parsed = parse_reference("docker.io/library/nginx:1.25").unwrap();
        assert_eq!(parsed.host.as_deref(), Some("docker.io"));
        assert_eq!(parsed.repository, "library/nginx");
        assert_eq!(parsed.tag.as_deref(), Some("1.25"));
        assert_eq!(parsed.digest, None);
        assert_eq!(parsed.scheme, None);
    }

    #[test]
    fn bare_name_gets_library_prefix_and_default_registry() {
        let parsed = parse_reference("nginx").unwrap();
        assert_eq!(parsed.host.as_deref(), Some(DEFAULT_REGISTRY));
        assert_eq!(parsed.repository, "library/nginx");
        assert_eq!(parsed.tag, None);

        let parsed = parse_reference("nginx:1.25").unwrap();
        assert_eq!(parsed.repository, "library/nginx");
        assert_eq!(parsed.tag.as_deref(), Some("1.25"));
    }

    #[test]
    fn org_shorthand_keeps_repository_as_is() {
        let parsed = parse_reference("grafana/loki:2.9.0").unwrap();
        assert_eq!(parsed.host.as_deref(), Some(DEFAULT_REGISTRY));
        assert_eq!(parsed.repository, "grafana/loki");
        assert_eq!(parsed.tag.as_deref(), Some("2.9.0"));
    }

    #[test]
    fn scheme_host_port_is_preferred_over_looser_grammars() {
        let parsed = parse_reference("oci://registry.example.com:5000/charts/app:1.0.0").unwrap();
        assert_eq!(parsed.scheme.as_deref(), Some("oci"));
        assert_eq!(parsed.host.as_deref(), Some("registry.example.com:5000"));
        assert_eq!(parsed.repository, "charts/app");
        assert_eq!(parsed.tag.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn host_port_without_scheme() {
        let parsed = parse_reference("registry.example.com:5000/team/app").unwrap();
        assert_eq!(parsed.scheme, None);
        assert_eq!(parsed.host.as_deref(), Some("registry.example.com:5000"));
        assert_eq!(parsed.repository, "team/app");
    }

    #[test]
    fn oci_scheme_with_digest() {
        let digest = format!("sha256:{}", "a".repeat(64));
        let parsed = parse_reference(&format!("oci://ghcr.io/acme/app@{digest}")).unwrap();
        assert_eq!(parsed.scheme.as_deref(), Some("oci"));
        assert_eq!(parsed.host.as_deref(), Some("ghcr.io"));
        assert_eq!(parsed.repository, "acme/app");
        assert_eq!(parsed.digest.as_deref(), Some(digest.as_str()));
        assert_eq!(parsed.tag, None);
    }

    #[test]
    fn file_path_references() {
        let parsed = parse_reference("file:///bundles/platform.tgz").unwrap();
        assert_eq!(parsed.scheme.as_deref(), Some("file"));
        assert_eq!(parsed.repository, "/bundles/platform.tgz");

        let parsed = parse_reference("./local/bundle").unwrap();
        assert_eq!(parsed.scheme.as_deref(), Some("file"));
        assert_eq!(parsed.repository, "./local/bundle");
    }

    #[test]
    fn typed_prefix_sets_type_hint_on_inner_grammar() {
        let parsed = parse_reference("docker::ghcr.io/acme/app:v2").unwrap();
        assert_eq!(parsed.type_hint.as_deref(), Some("docker"));
        assert_eq!(parsed.host.as_deref(), Some("ghcr.io"));
        assert_eq!(parsed.repository, "acme/app");
        assert_eq!(parsed.tag.as_deref(), Some("v2"));

        let parsed = parse_reference("helm::oci://charts.example.com/stack:3.1.4").unwrap();
        assert_eq!(parsed.type_hint.as_deref(), Some("helm"));
        assert_eq!(parsed.scheme.as_deref(), Some("oci"));
    }

    #[test]
    fn typed_bare_name_is_an_info_string_not_a_library_image() {
        let parsed = parse_reference("keb::component-descriptor:2.4.1").unwrap();
        assert_eq!(parsed.type_hint.as_deref(), Some("keb"));
        assert_eq!(parsed.info.as_deref(), Some("component-descriptor"));
        assert_eq!(parsed.repository, "component-descriptor");
        assert_eq!(parsed.tag.as_deref(), Some("2.4.1"));
        assert_eq!(parsed.host, None);
    }

    #[test]
    fn typed_info_with_trailing_garbage_is_rejected() {
        // The info grammar would match a prefix; the consistency check must
        // reject the leftover characters rather than partially match
        let err = parse_reference("keb::descriptor:1.0 trailing").unwrap_err();
        assert!(matches!(err, Error::InvalidReference { .. }));
    }

    #[test]
    fn registry_only_reference() {
        let parsed = parse_reference("registry.example.com").unwrap();
        assert_eq!(parsed.host.as_deref(), Some("registry.example.com"));
        assert_eq!(parsed.repository, "registry.example.com");

        let parsed = parse_reference("registry.example.com:5000/").unwrap();
        assert_eq!(parsed.host.as_deref(), Some("registry.example.com:5000"));
    }

    #[test]
    fn create_if_missing_flag_is_stripped_and_surfaced() {
        let parsed = parse_reference("+ghcr.io/acme/app:v1").unwrap();
        assert!(parsed.create_if_missing);
        assert_eq!(parsed.repository, "acme/app");

        let parsed = parse_reference("ghcr.io/acme/app:v1").unwrap();
        assert!(!parsed.create_if_missing);
    }

    #[test]
    fn invalid_input_yields_typed_error_not_partial_match() {
        let err = parse_reference("oci://bad uri with spaces").unwrap_err();
        match err {
            Error::InvalidReference { input, kind } => {
                assert_eq!(input, "oci://bad uri with spaces");
                assert_eq!(kind, "oci");
            }
            other => panic!("expected InvalidReference, got {other:?}"),
        }

        let err = parse_reference("!!!").unwrap_err();
        match err {
            Error::InvalidReference { kind, .. } => assert_eq!(kind, "artifact"),
            other => panic!("expected InvalidReference, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_invalid() {
        assert!(parse_reference("").is_err());
        assert!(parse_reference("+").is_err());
    }

    #[test]
    fn priority_host_with_dot_never_parses_as_shorthand() {
        // A dotted leading segment is a registry host, never an image name
        let parsed = parse_reference("quay.io/app").unwrap();
        assert_eq!(parsed.host.as_deref(), Some("quay.io"));
        assert_eq!(parsed.repository, "app");
        assert_eq!(parsed.info, None);
    }

    #[test]
    fn each_grammar_has_a_distinct_winner() {
        // Cross-grammar sweep: every input maps to exactly one stable parse
        let cases = [
            ("nginx", "library/nginx"),
            ("acme/app", "acme/app"),
            ("docker.io/acme/app", "acme/app"),
            ("registry.io:443/acme/app", "acme/app"),
            ("oci://registry.io/acme/app", "acme/app"),
            ("oci://registry.io:443/acme/app", "acme/app"),
        ];
        for (input, repo) in cases {
            let parsed = parse_reference(input).unwrap();
            assert_eq!(parsed.repository, repo, "input: {input}");
        }
    }
}
