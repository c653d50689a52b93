//! The canonical endpoint descriptor threaded through the whole RPC core.
//!
//! [`RceUrl`] is immutable: every "mutation" (`with_param`, `with_protocol`,
//! ...) returns a new value. Parameters are kept in a [`BTreeMap`] rather
//! than an insertion-ordered map — this gives us both halves of the data
//! model's invariant for free: canonical serialization always iterates keys
//! in the same (sorted) order, and `PartialEq`/`Hash` are insensitive to the
//! order parameters were inserted in, because `BTreeMap`'s own `PartialEq`
//! and `Hash` impls already ignore insertion order.

use std::collections::BTreeMap;
use std::fmt;

/// Parameter keys that never participate in the Registry Protocol's cache
/// key (§3: "cache key = URL excluding `dynamic` and `enabled`").
const CACHE_KEY_EXCLUDED_PARAMS: [&str; 2] = ["dynamic", "enabled"];

/// An immutable `(protocol, host, port, path, parameters)` endpoint
/// descriptor.
///
/// Equality and hashing are sensitive to the parameter key set and values,
/// but not to the order parameters were added in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RceUrl {
    protocol: String,
    host: String,
    port: u16,
    path: String,
    params: BTreeMap<String, String>,
}

/// Errors produced while parsing a canonical URL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// The input did not match `protocol://host[:port][/path][?k=v&...]`.
    Malformed(String),
}

impl fmt::Display for UrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlError::Malformed(raw) => write!(f, "malformed url: {raw}"),
        }
    }
}

impl std::error::Error for UrlError {}

impl RceUrl {
    /// Construct a URL from its addressing components with no parameters.
    pub fn new(protocol: impl Into<String>, host: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            path: normalize_path(path.into()),
            params: BTreeMap::new(),
        }
    }

    /// Parse a canonical-form URL string.
    ///
    /// Accepts `protocol://host[:port][/path][?key=value&...]`. Parameter
    /// values are percent-decoded using `application/x-www-form-urlencoded`
    /// rules, which is also how [`RceUrl::to_string`] encodes them — so
    /// `RceUrl::parse(&url.to_string()) == url` holds for any `url`.
    pub fn parse(raw: &str) -> Result<Self, UrlError> {
        let (protocol, rest) = raw
            .split_once("://")
            .ok_or_else(|| UrlError::Malformed(raw.to_string()))?;
        if protocol.is_empty() {
            return Err(UrlError::Malformed(raw.to_string()));
        }

        let (authority_and_path, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };
        let (authority, path) = match authority_and_path.split_once('/') {
            Some((a, p)) => (a, format!("/{p}")),
            None => (authority_and_path, String::new()),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port: u16 = p.parse().map_err(|_| UrlError::Malformed(raw.to_string()))?;
                (h.to_string(), port)
            }
            None => (authority.to_string(), 0),
        };
        if host.is_empty() {
            return Err(UrlError::Malformed(raw.to_string()));
        }

        let mut params = BTreeMap::new();
        if let Some(query) = query {
            for (k, v) in form_urlencoded::parse(query.as_bytes()) {
                params.insert(k.into_owned(), v.into_owned());
            }
        }

        Ok(Self {
            protocol: protocol.to_string(),
            host,
            port,
            path,
            params,
        })
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The path component, e.g. `/com.example.DemoService` — conventionally
    /// the exported service interface name when no `interface` parameter is
    /// present.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Read a parameter, falling back to `default` when absent.
    pub fn param<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.params.get(key).map(String::as_str).unwrap_or(default)
    }

    /// Read a parameter without a fallback.
    pub fn param_opt(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Read a boolean-ish parameter (`"true"`/`"false"`), falling back to
    /// `default` when absent or unparseable.
    pub fn param_bool(&self, key: &str, default: bool) -> bool {
        match self.params.get(key).map(String::as_str) {
            Some("true") => true,
            Some("false") => false,
            _ => default,
        }
    }

    /// Read an integer parameter, falling back to `default` when absent or
    /// unparseable.
    pub fn param_u32(&self, key: &str, default: u32) -> u32 {
        self.params
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    /// All parameters, in canonical (sorted) order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Return a new URL with `key` set to `value`, replacing any existing
    /// value.
    pub fn with_param(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.params.insert(key.into(), value.into());
        next
    }

    /// Return a new URL with every `(key, value)` pair set, replacing any
    /// existing values for those keys.
    pub fn with_params<I, K, V>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.clone();
        for (k, v) in pairs {
            next.params.insert(k.into(), v.into());
        }
        next
    }

    /// Return a new URL with `key` removed, if present.
    pub fn without_param(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.params.remove(key);
        next
    }

    pub fn with_protocol(&self, protocol: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.protocol = protocol.into();
        next
    }

    pub fn with_host(&self, host: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.host = host.into();
        next
    }

    pub fn with_port(&self, port: u16) -> Self {
        let mut next = self.clone();
        next.port = port;
        next
    }

    pub fn with_path(&self, path: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.path = normalize_path(path.into());
        next
    }

    /// The service interface name: the `interface` parameter if present,
    /// else the path with its leading slash stripped.
    pub fn interface(&self) -> &str {
        match self.param_opt("interface") {
            Some(interface) => interface,
            None => self.path.trim_start_matches('/'),
        }
    }

    /// `(interface, group, version)` — the key that identifies "the same
    /// service" across provider and consumer URLs regardless of transport
    /// address.
    pub fn service_key(&self) -> String {
        let group = self.param_opt("group");
        let version = self.param_opt("version");
        let mut key = String::new();
        if let Some(group) = group {
            key.push_str(group);
            key.push('/');
        }
        key.push_str(self.interface());
        if let Some(version) = version {
            key.push(':');
            key.push_str(version);
        }
        key
    }

    /// The canonical form of this URL with `dynamic` and `enabled` removed —
    /// the key the Registry Protocol uses to dedupe local exports (§3, §4.6).
    pub fn cache_key(&self) -> String {
        let mut reduced = self.clone();
        for excluded in CACHE_KEY_EXCLUDED_PARAMS {
            reduced.params.remove(excluded);
        }
        reduced.to_string()
    }

    /// Embed this URL, percent-encoded, as the value of `key` on `outer` —
    /// the mechanism the `export`/`refer` parameters use to nest a full
    /// provider/consumer URL inside another URL's query string.
    pub fn embed_in(&self, outer: &Self, key: &str) -> Self {
        outer.with_param(key, self.to_string())
    }

    /// Decode a nested URL previously embedded with [`RceUrl::embed_in`].
    pub fn extract_from(outer: &Self, key: &str) -> Result<Self, UrlError> {
        let raw = outer
            .param_opt(key)
            .ok_or_else(|| UrlError::Malformed(format!("missing nested url param `{key}`")))?;
        Self::parse(raw)
    }
}

fn normalize_path(path: String) -> String {
    if path.is_empty() || path == "/" {
        return path;
    }
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

impl fmt::Display for RceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}{}", self.protocol, self.host, self.port, self.path)?;
        if !self.params.is_empty() {
            write!(f, "?")?;
            let mut first = true;
            for (k, v) in &self.params {
                if !first {
                    write!(f, "&")?;
                }
                first = false;
                for chunk in form_urlencoded::byte_serialize(k.as_bytes()) {
                    write!(f, "{chunk}")?;
                }
                write!(f, "=")?;
                for chunk in form_urlencoded::byte_serialize(v.as_bytes()) {
                    write!(f, "{chunk}")?;
                }
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for RceUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_canonical_form() {
        let url = RceUrl::new("dubbo", "10.0.0.1", 20880, "/svc.Demo")
            .with_param("methods", "hello")
            .with_param("side", "provider")
            .with_param("group", "g1");
        let parsed = RceUrl::parse(&url.to_string()).unwrap();
        assert_eq!(url, parsed);
    }

    #[test]
    fn round_trips_without_path_or_params() {
        let url = RceUrl::new("registry", "127.0.0.1", 2181, "");
        assert_eq!(url, RceUrl::parse(&url.to_string()).unwrap());
    }

    #[test]
    fn equality_ignores_parameter_insertion_order() {
        let a = RceUrl::new("dubbo", "h", 1, "/p")
            .with_param("a", "1")
            .with_param("b", "2");
        let b = RceUrl::new("dubbo", "h", 1, "/p")
            .with_param("b", "2")
            .with_param("a", "1");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn equality_is_sensitive_to_values() {
        let a = RceUrl::new("dubbo", "h", 1, "/p").with_param("a", "1");
        let b = RceUrl::new("dubbo", "h", 1, "/p").with_param("a", "2");
        assert_ne!(a, b);
    }

    #[test]
    fn cache_key_excludes_dynamic_and_enabled() {
        let a = RceUrl::new("dubbo", "h", 1, "/p")
            .with_param("dynamic", "true")
            .with_param("enabled", "true")
            .with_param("weight", "100");
        let b = RceUrl::new("dubbo", "h", 1, "/p")
            .with_param("dynamic", "false")
            .with_param("weight", "100");
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn service_key_combines_group_interface_version() {
        let url = RceUrl::new("dubbo", "h", 1, "/svc.Demo")
            .with_param("group", "g1")
            .with_param("version", "1.0.0");
        assert_eq!(url.service_key(), "g1/svc.Demo:1.0.0");
    }

    #[test]
    fn service_key_without_group_or_version() {
        let url = RceUrl::new("dubbo", "h", 1, "/svc.Demo");
        assert_eq!(url.service_key(), "svc.Demo");
    }

    #[test]
    fn nested_url_round_trips_through_export_param() {
        let provider = RceUrl::new("dubbo", "10.0.0.1", 20880, "/svc.Demo").with_param("side", "provider");
        let registry = RceUrl::new("zk", "127.0.0.1", 2181, "");
        let combined = provider.embed_in(&registry, "export");

        let parsed_outer = RceUrl::parse(&combined.to_string()).unwrap();
        let recovered = RceUrl::extract_from(&parsed_outer, "export").unwrap();
        assert_eq!(recovered, provider);
    }

    #[test]
    fn param_defaults_and_bool_and_u32() {
        let url = RceUrl::new("dubbo", "h", 1, "/p").with_param("retries", "5").with_param("check", "false");
        assert_eq!(url.param("timeout", "1000"), "1000");
        assert_eq!(url.param_u32("retries", 3), 5);
        assert!(!url.param_bool("check", true));
        assert!(url.param_bool("missing", true));
    }

    #[test]
    fn without_param_removes_key() {
        let url = RceUrl::new("dubbo", "h", 1, "/p").with_param("weight", "100");
        let removed = url.without_param("weight");
        assert_eq!(removed.param_opt("weight"), None);
    }

    #[test]
    fn malformed_url_fails_to_parse() {
        assert!(RceUrl::parse("not-a-url").is_err());
        assert!(RceUrl::parse("dubbo://").is_err());
    }

    #[test]
    fn interface_falls_back_to_path() {
        let url = RceUrl::new("dubbo", "h", 1, "/svc.Demo");
        assert_eq!(url.interface(), "svc.Demo");
        let with_param = url.with_param("interface", "svc.Other");
        assert_eq!(with_param.interface(), "svc.Other");
    }
}
