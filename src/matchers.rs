//! Label-driven request matching.
//!
//! Every container opts into routing with [`LABEL_ENABLE`] and may then
//! narrow the requests it serves with matcher labels.  Each matcher kind
//! is a row in [`MATCHERS`]: a label key paired with a constructor that
//! turns the label's value into a [`RequestMatcher`].  Matching is AND
//! across the labels present on a container; absent labels impose no
//! constraint, and labels nobody registered are ignored.

use std::borrow::Cow;

use http::header::HOST;
use http::request::Parts;
use http::{HeaderMap, Request, Uri};

use crate::types::{Container, ENABLE_VALUE, LABEL_ENABLE, LABEL_MATCH_HOST, LABEL_MATCH_PATH};

/// The parts of an incoming request that matchers may inspect.
#[derive(Debug, Clone, Copy)]
pub struct RequestHead<'a> {
    uri: &'a Uri,
    headers: &'a HeaderMap,
}

impl<'a> RequestHead<'a> {
    pub fn new(uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self { uri, headers }
    }

    /// Host the request is addressed to, without any port.
    ///
    /// The URI authority wins over the `Host` header, so absolute-form and
    /// HTTP/2 requests are handled alike.
    pub fn host(&self) -> Option<&'a str> {
        if let Some(host) = self.uri.host() {
            return Some(host);
        }
        let host = self.headers.get(HOST)?.to_str().ok()?;
        Some(strip_port(host))
    }

    pub fn path(&self) -> &'a str {
        self.uri.path()
    }

    pub fn headers(&self) -> &'a HeaderMap {
        self.headers
    }
}

impl<'a, B> From<&'a Request<B>> for RequestHead<'a> {
    fn from(req: &'a Request<B>) -> Self {
        Self::new(req.uri(), req.headers())
    }
}

impl<'a> From<&'a Parts> for RequestHead<'a> {
    fn from(parts: &'a Parts) -> Self {
        Self::new(&parts.uri, &parts.headers)
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal keeps its brackets
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split(':').next().unwrap_or(host)
}

pub trait RequestMatcher: Send + Sync {
    fn matches(&self, req: &RequestHead<'_>) -> bool;
}

/// Associates a container label with the matcher built from its value.
pub struct MatcherDescriptor {
    pub label: &'static str,
    pub build: fn(&str) -> Box<dyn RequestMatcher>,
}

/// Registered matcher kinds.
pub static MATCHERS: &[MatcherDescriptor] = &[
    MatcherDescriptor {
        label: LABEL_MATCH_HOST,
        build: host_matcher,
    },
    MatcherDescriptor {
        label: LABEL_MATCH_PATH,
        build: path_matcher,
    },
];

fn host_matcher(value: &str) -> Box<dyn RequestMatcher> {
    Box::new(HostMatcher::new(value))
}

fn path_matcher(value: &str) -> Box<dyn RequestMatcher> {
    Box::new(PathMatcher::new(value))
}

/// Returns whether `container` is a candidate for `req`.
pub fn matches(req: &RequestHead<'_>, container: &Container) -> bool {
    matches_with(MATCHERS, req, container)
}

pub(crate) fn matches_with(
    registry: &[MatcherDescriptor],
    req: &RequestHead<'_>,
    container: &Container,
) -> bool {
    if container.label(LABEL_ENABLE) != Some(ENABLE_VALUE) {
        return false;
    }

    registry.iter().all(|descriptor| match container.label(descriptor.label) {
        Some(value) => (descriptor.build)(value).matches(req),
        None => true,
    })
}

/// Splits a comma-separated label value into lowercase patterns.
fn patterns(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Matches the request host against one or more host names.
///
/// A `*` label in a pattern stands for exactly one DNS label, so
/// `*.example.com` matches `api.example.com` but neither `example.com`
/// nor `a.b.example.com`.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    hosts: Vec<String>,
}

impl HostMatcher {
    pub fn new(value: &str) -> Self {
        Self {
            hosts: patterns(value),
        }
    }

    fn host_matches(pattern: &str, host: &str) -> bool {
        if !pattern.contains('*') {
            return pattern == host;
        }
        let pattern_labels: Vec<&str> = pattern.split('.').collect();
        let host_labels: Vec<&str> = host.split('.').collect();
        pattern_labels.len() == host_labels.len()
            && pattern_labels
                .iter()
                .zip(&host_labels)
                .all(|(p, h)| *p == "*" || p == h)
    }
}

impl RequestMatcher for HostMatcher {
    fn matches(&self, req: &RequestHead<'_>) -> bool {
        let Some(host) = req.host() else {
            return false;
        };
        let host = host.to_lowercase();
        self.hosts.iter().any(|p| Self::host_matches(p, &host))
    }
}

/// Matches the request path against one or more path patterns.
///
/// * `*` matches every path
/// * `/prefix*` and `*suffix` match by prefix and suffix
/// * `*part*` matches paths containing `part`
/// * any other pattern with a `*` is a glob whose `*` stops at `/`
/// * everything else must be equal
///
/// The request path is percent-decoded and cleaned before comparison,
/// which is case-insensitive.
#[derive(Debug, Clone)]
pub struct PathMatcher {
    patterns: Vec<String>,
}

impl PathMatcher {
    pub fn new(value: &str) -> Self {
        Self {
            patterns: patterns(value),
        }
    }

    fn path_matches(pattern: &str, path: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        let stars = pattern.matches('*').count();
        let leading = pattern.starts_with('*');
        let trailing = pattern.ends_with('*');

        match (stars, leading, trailing) {
            (0, _, _) => pattern == path,
            (1, false, true) => path.starts_with(&pattern[..pattern.len() - 1]),
            (1, true, false) => path.ends_with(&pattern[1..]),
            (2, true, true) => path.contains(&pattern[1..pattern.len() - 1]),
            _ => glob_match(pattern, path),
        }
    }
}

impl RequestMatcher for PathMatcher {
    fn matches(&self, req: &RequestHead<'_>) -> bool {
        let path = normalize_path(req.path()).to_lowercase();
        self.patterns.iter().any(|p| Self::path_matches(p, &path))
    }
}

/// Percent-decode `path`, merge repeated slashes and resolve `.`/`..` segments.
///
/// A trailing slash survives, and `..` never climbs above the root.
fn normalize_path(path: &str) -> String {
    let decoded = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    let mut cleaned = String::with_capacity(decoded.len());
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    let trailing = decoded.ends_with('/') || decoded.ends_with("/.") || decoded.ends_with("/..");
    if cleaned.is_empty() || trailing {
        cleaned.push('/');
    }
    cleaned
}

/// Glob match where `*` never crosses a `/`.
///
/// Pattern and text are compared segment by segment, each with the
/// two-pointer wildcard scan, so the cost stays linear in the segment
/// length times the pattern length whatever the number of stars.
fn glob_match(pattern: &str, text: &str) -> bool {
    let mut patterns = pattern.split('/');
    let mut segments = text.split('/');
    loop {
        match (patterns.next(), segments.next()) {
            (None, None) => return true,
            (Some(p), Some(t)) if segment_match(p.as_bytes(), t.as_bytes()) => {}
            _ => return false,
        }
    }
}

fn segment_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it is matched up to.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, t));
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::container;
    use crate::types::LABEL_UPSTREAM_PORT;
    use std::time::{Duration, Instant};

    fn request(host: &str, path: &str) -> Request<()> {
        Request::builder()
            .uri(path)
            .header(HOST, host)
            .body(())
            .unwrap()
    }

    fn is_match(labels: &[(&str, &str)], req: &Request<()>) -> bool {
        matches(&RequestHead::from(req), &container("c1", labels, "10.0.0.5"))
    }

    #[test]
    fn test_disabled_containers_never_match() {
        let req = request("example.com", "/");
        assert!(!is_match(&[], &req));
        assert!(!is_match(&[(LABEL_ENABLE, "false")], &req));
        assert!(!is_match(&[(LABEL_ENABLE, "True")], &req));
        assert!(!is_match(&[(LABEL_ENABLE, "1")], &req));
        assert!(!is_match(&[(LABEL_UPSTREAM_PORT, "8080")], &req));
    }

    #[test]
    fn test_enable_only_matches_everything() {
        let labels = [(LABEL_ENABLE, "true"), (LABEL_UPSTREAM_PORT, "8080")];
        assert!(is_match(&labels, &request("example.com", "/")));
        assert!(is_match(&labels, &request("other.org", "/api/v1")));
        assert!(is_match(&labels, &Request::new(())));
    }

    #[test]
    fn test_unknown_labels_are_ignored() {
        let labels = [
            (LABEL_ENABLE, "true"),
            ("com.caddyserver.http.matchers.method", "POST"),
        ];
        assert!(is_match(&labels, &request("example.com", "/")));
    }

    #[test]
    fn test_host_match() {
        let labels = [(LABEL_ENABLE, "true"), (LABEL_MATCH_HOST, "example.com")];
        assert!(is_match(&labels, &request("example.com", "/")));
        assert!(!is_match(&labels, &request("other.com", "/")));
        assert!(!is_match(&labels, &Request::new(())));
    }

    #[test]
    fn test_host_match_ignores_case_and_port() {
        let labels = [(LABEL_ENABLE, "true"), (LABEL_MATCH_HOST, "Example.COM")];
        assert!(is_match(&labels, &request("EXAMPLE.com:8443", "/")));
    }

    #[test]
    fn test_host_from_absolute_uri() {
        let labels = [(LABEL_ENABLE, "true"), (LABEL_MATCH_HOST, "example.com")];
        let req = Request::builder()
            .uri("http://example.com:8080/index.html")
            .body(())
            .unwrap();
        assert!(is_match(&labels, &req));
    }

    #[test]
    fn test_host_wildcard_matches_one_label() {
        let labels = [(LABEL_ENABLE, "true"), (LABEL_MATCH_HOST, "*.example.com")];
        assert!(is_match(&labels, &request("api.example.com", "/")));
        assert!(!is_match(&labels, &request("example.com", "/")));
        assert!(!is_match(&labels, &request("a.b.example.com", "/")));
    }

    #[test]
    fn test_host_list() {
        let labels = [(LABEL_ENABLE, "true"), (LABEL_MATCH_HOST, "a.com, b.com")];
        assert!(is_match(&labels, &request("a.com", "/")));
        assert!(is_match(&labels, &request("b.com", "/")));
        assert!(!is_match(&labels, &request("c.com", "/")));
    }

    #[test]
    fn test_ipv6_host_header() {
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
        assert_eq!(strip_port("example.com:80"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
    }

    #[test]
    fn test_path_exact() {
        let labels = [(LABEL_ENABLE, "true"), (LABEL_MATCH_PATH, "/api")];
        assert!(is_match(&labels, &request("x", "/api")));
        assert!(is_match(&labels, &request("x", "/API")));
        assert!(!is_match(&labels, &request("x", "/api/users")));
    }

    #[test]
    fn test_path_patterns() {
        assert!(PathMatcher::path_matches("*", "/anything"));
        assert!(PathMatcher::path_matches("/api/*", "/api/users"));
        assert!(!PathMatcher::path_matches("/api/*", "/apikeys"));
        assert!(PathMatcher::path_matches("*.php", "/index.php"));
        assert!(!PathMatcher::path_matches("*.php", "/index.html"));
        assert!(PathMatcher::path_matches("*admin*", "/site/admin/login"));
        assert!(PathMatcher::path_matches("/users/*/profile", "/users/42/profile"));
        assert!(!PathMatcher::path_matches("/users/*/profile", "/users/42/x/profile"));
    }

    #[test]
    fn test_glob_is_linear_on_long_segments() {
        let long = format!("/assets/{}", "-".repeat(20_000));
        let started = Instant::now();
        assert!(!PathMatcher::path_matches("/assets/*-*-*.js", &long));
        assert!(PathMatcher::path_matches("/assets/*-*-*", &long));

        let segment = format!("/{}", "a".repeat(2_000));
        assert!(!PathMatcher::path_matches("/*a*a*a*a*a*b", &segment));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_glob_segments() {
        assert!(glob_match("/a/*/c", "/a/b/c"));
        assert!(glob_match("/a/*", "/a/"));
        assert!(!glob_match("/a/*", "/a"));
        assert!(!glob_match("/a/*/c", "/a/b/x/c"));
        assert!(glob_match("/*.tar.*", "/release.tar.gz"));
        assert!(!glob_match("/x*y", "/x"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/public/../admin/secret"), "/admin/secret");
        assert_eq!(normalize_path("//admin///secret"), "/admin/secret");
        assert_eq!(normalize_path("/%61dmin/secret"), "/admin/secret");
        assert_eq!(normalize_path("/a/./b/"), "/a/b/");
        assert_eq!(normalize_path("/../.."), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/a/b/.."), "/a/");
    }

    #[test]
    fn test_path_is_normalized_before_matching() {
        let public = [(LABEL_ENABLE, "true"), (LABEL_MATCH_PATH, "/public/*")];
        let admin = [(LABEL_ENABLE, "true"), (LABEL_MATCH_PATH, "/admin/*")];

        for path in ["/public/../admin/secret", "/%61dmin/secret", "//admin/secret"] {
            let req = request("example.com", path);
            assert!(!is_match(&public, &req), "{} routed to /public/*", path);
            assert!(is_match(&admin, &req), "{} not routed to /admin/*", path);
        }
    }

    #[test]
    fn test_all_present_matchers_must_pass() {
        let labels = [
            (LABEL_ENABLE, "true"),
            (LABEL_MATCH_HOST, "example.com"),
            (LABEL_MATCH_PATH, "/api/*"),
        ];
        assert!(is_match(&labels, &request("example.com", "/api/v1")));
        assert!(!is_match(&labels, &request("example.com", "/static/app.js")));
        assert!(!is_match(&labels, &request("other.com", "/api/v1")));
    }

    #[test]
    fn test_registry_is_extensible() {
        const LABEL_MATCH_HEADER: &str = "com.caddyserver.http.matchers.header";

        struct HeaderMatcher(String);

        impl RequestMatcher for HeaderMatcher {
            fn matches(&self, req: &RequestHead<'_>) -> bool {
                req.headers().contains_key(self.0.as_str())
            }
        }

        fn header_matcher(value: &str) -> Box<dyn RequestMatcher> {
            Box::new(HeaderMatcher(value.to_lowercase()))
        }

        let registry = [MatcherDescriptor {
            label: LABEL_MATCH_HEADER,
            build: header_matcher,
        }];
        let canary = container(
            "c1",
            &[(LABEL_ENABLE, "true"), (LABEL_MATCH_HEADER, "X-Canary")],
            "10.0.0.5",
        );
        let plain = container("c2", &[(LABEL_ENABLE, "true")], "10.0.0.6");

        let tagged = Request::builder()
            .uri("/")
            .header("x-canary", "1")
            .body(())
            .unwrap();
        let untagged = request("example.com", "/");

        assert!(matches_with(&registry, &RequestHead::from(&tagged), &canary));
        assert!(!matches_with(&registry, &RequestHead::from(&untagged), &canary));
        assert!(matches_with(&registry, &RequestHead::from(&untagged), &plain));
    }
}
