//! Route rules and the ordered route table.
//!
//! Rules are compiled once from configuration and never change afterwards.
//! Matching walks the rules in declaration order and returns the first one
//! whose predicate is fully satisfied; there is no scoring or fallthrough.
use hyper::{HeaderMap, Method, Request, header::HeaderName};
use regex::Regex;

use crate::{
    config::models::{HeaderCondition, RewriteConfig, RouteConfig},
    core::{
        error::RouteConfigError,
        resolver::TargetSpec,
        rewrite::{PathRewrite, RewriteError},
    },
};

/// Compiled request path pattern.
///
/// Syntax: literal segments, `*` (one whole segment or any characters inside
/// a segment), `?` (one character), `{name}` (one non-empty segment) and a
/// trailing `**` that matches zero or more remaining segments.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, RouteConfigError> {
        let invalid = |reason: &str| RouteConfigError::InvalidPathPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let Some(rest) = pattern.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };

        let segments: Vec<&str> = rest.split('/').collect();
        let last = segments.len() - 1;
        let mut expr = String::from("^");

        for (i, segment) in segments.iter().enumerate() {
            if *segment == "**" {
                if i != last {
                    return Err(invalid("'**' is only allowed as the last segment"));
                }
                expr.push_str("(?:/.*)?");
                continue;
            }

            expr.push('/');
            if *segment == "*" {
                expr.push_str("[^/]+");
                continue;
            }

            let mut literal = String::new();
            let mut chars = segment.chars();
            while let Some(c) = chars.next() {
                match c {
                    '*' | '?' | '{' => {
                        expr.push_str(&regex::escape(&literal));
                        literal.clear();
                    }
                    '}' => return Err(invalid("unbalanced '}'")),
                    _ => {
                        literal.push(c);
                        continue;
                    }
                }
                match c {
                    '*' => expr.push_str("[^/]*"),
                    '?' => expr.push_str("[^/]"),
                    _ => {
                        let mut name = String::new();
                        let mut closed = false;
                        for ch in chars.by_ref() {
                            if ch == '}' {
                                closed = true;
                                break;
                            }
                            name.push(ch);
                        }
                        if !closed {
                            return Err(invalid("unterminated '{'"));
                        }
                        if name.is_empty()
                            || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
                        {
                            return Err(invalid(&format!("invalid variable name '{name}'")));
                        }
                        expr.push_str("[^/]+");
                    }
                }
            }
            expr.push_str(&regex::escape(&literal));
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|source| RouteConfigError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Header presence check with an optional full-match regex on the value.
#[derive(Debug, Clone)]
pub struct HeaderPredicate {
    name: HeaderName,
    value: Option<Regex>,
}

impl HeaderPredicate {
    pub fn new(name: &str, value_matches: Option<&str>) -> Result<Self, RouteConfigError> {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| RouteConfigError::InvalidHeaderName {
                name: name.to_string(),
            })?;

        let value = value_matches
            .map(|pattern| {
                Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                    RouteConfigError::InvalidRegex {
                        pattern: pattern.to_string(),
                        source,
                    }
                })
            })
            .transpose()?;

        Ok(Self {
            name: header_name,
            value,
        })
    }

    pub fn matches(&self, headers: &HeaderMap) -> bool {
        match &self.value {
            None => headers.contains_key(&self.name),
            Some(regex) => headers
                .get_all(&self.name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .any(|v| regex.is_match(v)),
        }
    }
}

/// All conditions a request must satisfy for a rule to apply (logical AND).
#[derive(Debug, Clone)]
pub struct RoutePredicate {
    method: Option<Method>,
    path: PathPattern,
    headers: Vec<HeaderPredicate>,
}

impl RoutePredicate {
    pub fn matches(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        if let Some(expected) = &self.method {
            if expected != method {
                return false;
            }
        }
        self.path.matches(path) && self.headers.iter().all(|h| h.matches(headers))
    }
}

/// A predicate, an ordered rewrite chain and an upstream target.
#[derive(Debug, Clone)]
pub struct RouteRule {
    id: String,
    predicate: RoutePredicate,
    rewrites: Vec<PathRewrite>,
    target: TargetSpec,
}

impl RouteRule {
    /// Start building a rule programmatically.
    pub fn builder(id: impl Into<String>) -> RouteRuleBuilder {
        RouteRuleBuilder::new(id)
    }

    /// Compile a rule from its configuration form.
    pub fn from_config(config: &RouteConfig) -> Result<Self, RouteConfigError> {
        if config.id.trim().is_empty() {
            return Err(RouteConfigError::EmptyRouteId);
        }
        Self::compile(config).map_err(|e| RouteConfigError::in_route(&config.id, e))
    }

    fn compile(config: &RouteConfig) -> Result<Self, RouteConfigError> {
        let method = config
            .method
            .as_deref()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
                    RouteConfigError::InvalidMethod {
                        method: m.to_string(),
                    }
                })
            })
            .transpose()?;

        let headers = config
            .headers
            .iter()
            .map(|h| HeaderPredicate::new(&h.name, h.value_matches.as_deref()))
            .collect::<Result<Vec<_>, _>>()?;

        let rewrites = config
            .rewrite
            .iter()
            .map(|r| PathRewrite::new(&r.pattern, &r.replacement))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: config.id.clone(),
            predicate: RoutePredicate {
                method,
                path: PathPattern::parse(&config.path)?,
                headers,
            },
            rewrites,
            target: TargetSpec::parse(&config.target)?,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path_pattern(&self) -> &str {
        self.predicate.path.as_str()
    }

    pub fn method(&self) -> Option<&Method> {
        self.predicate.method.as_ref()
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    pub fn rewrites(&self) -> &[PathRewrite] {
        &self.rewrites
    }

    pub fn matches(&self, method: &Method, path: &str, headers: &HeaderMap) -> bool {
        self.predicate.matches(method, path, headers)
    }

    /// Run the rewrite chain in declaration order. Without rewrites the path
    /// is returned unchanged.
    pub fn rewrite_path(&self, path: &str) -> Result<String, RewriteError> {
        self.rewrites
            .iter()
            .try_fold(path.to_string(), |current, rewrite| rewrite.rewrite(&current))
    }
}

/// Builder mirroring the configuration shape of a route.
pub struct RouteRuleBuilder {
    config: RouteConfig,
}

impl RouteRuleBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            config: RouteConfig {
                id: id.into(),
                path: RouteConfig::default_path(),
                method: None,
                headers: Vec::new(),
                rewrite: Vec::new(),
                target: String::new(),
            },
        }
    }

    pub fn path(mut self, pattern: impl Into<String>) -> Self {
        self.config.path = pattern.into();
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.config.method = Some(method.to_string());
        self
    }

    /// Require a header; with `value_matches` its value must fully match the regex.
    pub fn header(mut self, name: impl Into<String>, value_matches: Option<&str>) -> Self {
        self.config.headers.push(HeaderCondition {
            name: name.into(),
            value_matches: value_matches.map(str::to_string),
        });
        self
    }

    pub fn rewrite(mut self, pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.config.rewrite.push(RewriteConfig {
            pattern: pattern.into(),
            replacement: replacement.into(),
        });
        self
    }

    /// `http(s)://host:port` for a static upstream or `lb://service` for discovery.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.config.target = target.into();
        self
    }

    pub fn build(self) -> Result<RouteRule, RouteConfigError> {
        RouteRule::from_config(&self.config)
    }
}

/// Immutable, ordered set of route rules.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, RouteConfigError> {
        let mut seen = std::collections::HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(RouteConfigError::DuplicateRouteId {
                    id: rule.id.clone(),
                });
            }
        }
        Ok(Self { rules })
    }

    pub fn from_config(routes: &[RouteConfig]) -> Result<Self, RouteConfigError> {
        let rules = routes
            .iter()
            .map(RouteRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }

    /// First rule, in declaration order, whose predicate matches.
    pub fn find(&self, method: &Method, path: &str, headers: &HeaderMap) -> Option<&RouteRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path, headers))
    }

    pub fn match_request<B>(&self, req: &Request<B>) -> Option<&RouteRule> {
        self.find(req.method(), req.uri().path(), req.headers())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use hyper::header::HeaderValue;

    use super::*;

    #[test]
    fn test_double_star_pattern() {
        let pattern = PathPattern::parse("/person/**").unwrap();
        assert!(pattern.matches("/person"));
        assert!(pattern.matches("/person/"));
        assert!(pattern.matches("/person/42"));
        assert!(pattern.matches("/person/42/address"));
        assert!(!pattern.matches("/personnel"));
        assert!(!pattern.matches("/address/1"));
    }

    #[test]
    fn test_exact_and_wildcard_patterns() {
        let exact = PathPattern::parse("/xyz").unwrap();
        assert!(exact.matches("/xyz"));
        assert!(!exact.matches("/xyz/1"));

        let single = PathPattern::parse("/users/*/orders").unwrap();
        assert!(single.matches("/users/7/orders"));
        assert!(!single.matches("/users//orders"));
        assert!(!single.matches("/users/7/8/orders"));

        let var = PathPattern::parse("/files/{name}.json").unwrap();
        assert!(var.matches("/files/report.json"));
        assert!(!var.matches("/files/.json"));

        let question = PathPattern::parse("/v?/ping").unwrap();
        assert!(question.matches("/v1/ping"));
        assert!(!question.matches("/v10/ping"));

        let literal_dot = PathPattern::parse("/a.b").unwrap();
        assert!(!literal_dot.matches("/axb"));

        let catch_all = PathPattern::parse("/**").unwrap();
        assert!(catch_all.matches("/"));
        assert!(catch_all.matches("/anything/at/all"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(PathPattern::parse("person/**").is_err());
        assert!(PathPattern::parse("/**/tail").is_err());
        assert!(PathPattern::parse("/{unterminated").is_err());
        assert!(PathPattern::parse("/{}").is_err());
        assert!(PathPattern::parse("/oops}").is_err());
    }

    #[test]
    fn test_header_predicate() {
        let present = HeaderPredicate::new("x-google", None).unwrap();
        let mut headers = HeaderMap::new();
        assert!(!present.matches(&headers));
        headers.insert("x-google", HeaderValue::from_static(""));
        assert!(present.matches(&headers));

        let valued = HeaderPredicate::new("x-tenant", Some("acme|globex")).unwrap();
        headers.insert("x-tenant", HeaderValue::from_static("acme-east"));
        assert!(!valued.matches(&headers));
        headers.append("x-tenant", HeaderValue::from_static("globex"));
        assert!(valued.matches(&headers));

        assert!(HeaderPredicate::new("bad header", None).is_err());
    }

    #[test]
    fn test_predicate_is_conjunction() {
        let rule = RouteRule::builder("google")
            .path("/**")
            .method(Method::GET)
            .header("x-google", None)
            .target("https://google.com")
            .build()
            .unwrap();

        let mut headers = HeaderMap::new();
        assert!(!rule.matches(&Method::GET, "/search", &headers));
        headers.insert("x-google", HeaderValue::from_static("1"));
        assert!(rule.matches(&Method::GET, "/search", &headers));
        assert!(!rule.matches(&Method::POST, "/search", &headers));
    }

    #[test]
    fn test_first_declared_rule_wins() {
        let table = RouteTable::new(vec![
            RouteRule::builder("specific")
                .path("/person/**")
                .target("http://first:8080")
                .build()
                .unwrap(),
            RouteRule::builder("catch-all")
                .path("/**")
                .target("http://second:8080")
                .build()
                .unwrap(),
        ])
        .unwrap();

        let headers = HeaderMap::new();
        for path in ["/person", "/person/1", "/person/1/address"] {
            for method in [Method::GET, Method::POST, Method::DELETE] {
                let rule = table.find(&method, path, &headers).unwrap();
                assert_eq!(rule.id(), "specific");
            }
        }
        assert_eq!(table.find(&Method::GET, "/other", &headers).unwrap().id(), "catch-all");
    }

    #[test]
    fn test_no_match_returns_none() {
        let table = RouteTable::new(vec![
            RouteRule::builder("person")
                .path("/person/**")
                .target("http://person-service:8080")
                .build()
                .unwrap(),
        ])
        .unwrap();
        assert!(table.find(&Method::GET, "/unmatched", &HeaderMap::new()).is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let rule = RouteRule::builder("dup")
            .path("/a")
            .target("http://a:1")
            .build()
            .unwrap();
        let err = RouteTable::new(vec![rule.clone(), rule]).unwrap_err();
        assert!(matches!(err, RouteConfigError::DuplicateRouteId { .. }));
    }

    #[test]
    fn test_rewrite_chain_runs_in_order() {
        let rule = RouteRule::builder("chain")
            .path("/api/**")
            .rewrite("^/api/(?<rest>.*)$", "/${rest}")
            .rewrite("^/v1/(?<rest>.*)$", "/legacy/${rest}")
            .target("http://backend:8080")
            .build()
            .unwrap();
        assert_eq!(rule.rewrite_path("/api/v1/users").unwrap(), "/legacy/users");
        assert!(rule.rewrite_path("/api/v2/users").is_err());
    }

    #[test]
    fn test_invalid_rule_reports_route_id() {
        let err = RouteRule::builder("broken")
            .path("/a")
            .method(Method::GET)
            .rewrite("(unclosed", "/")
            .target("http://a:1")
            .build()
            .unwrap_err();
        assert!(err.to_string().starts_with("route 'broken'"));
    }
}
