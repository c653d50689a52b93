use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rce_url::RceUrl;
use tracing::warn;

/// A single override rule: a function from URL to URL.
pub type Configurator = Arc<dyn Fn(RceUrl) -> RceUrl + Send + Sync>;

/// Kind of dynamic-configuration change delivered to a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigEventKind {
    Added,
    Modified,
    Deleted,
}

/// In-process stand-in for a real dynamic-configuration center, consumed the
/// same way a ZooKeeper/Nacos config client would be (Non-goal (ii)).
#[derive(Clone, Default)]
pub struct LocalDynamicConfig {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    rules: HashMap<String, String>,
    listeners: HashMap<String, Vec<Arc<ConfigListener>>>,
}

impl LocalDynamicConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the current raw rule text for `key` (`group` reserved for a
    /// future namespaced lookup; unused by the in-process stand-in).
    pub fn get_rule(&self, key: &str, _group: &str) -> Option<String> {
        self.inner.read().expect("config lock poisoned").rules.get(key).cloned()
    }

    pub fn add_listener(&self, key: &str, listener: Arc<ConfigListener>) {
        let mut inner = self.inner.write().expect("config lock poisoned");
        inner.listeners.entry(key.to_string()).or_default().push(listener.clone());
        drop(inner);
        let existing = self.get_rule(key, "");
        match existing {
            Some(raw) => listener.handle(ConfigEventKind::Added, Some(&raw)),
            None => {}
        }
    }

    pub fn remove_listener(&self, key: &str, listener: &Arc<ConfigListener>) {
        let mut inner = self.inner.write().expect("config lock poisoned");
        if let Some(list) = inner.listeners.get_mut(key) {
            list.retain(|l| !Arc::ptr_eq(l, listener));
        }
    }

    /// Test/bootstrap helper: push a rule change and fan it out to listeners.
    pub fn publish(&self, key: &str, raw: Option<String>) {
        let kind = if raw.is_some() {
            if self.get_rule(key, "").is_some() { ConfigEventKind::Modified } else { ConfigEventKind::Added }
        } else {
            ConfigEventKind::Deleted
        };

        {
            let mut inner = self.inner.write().expect("config lock poisoned");
            match &raw {
                Some(value) => {
                    inner.rules.insert(key.to_string(), value.clone());
                }
                None => {
                    inner.rules.remove(key);
                }
            }
        }

        let listeners: Vec<Arc<ConfigListener>> = {
            let inner = self.inner.read().expect("config lock poisoned");
            inner.listeners.get(key).cloned().unwrap_or_default()
        };
        for listener in listeners {
            listener.handle(kind, raw.as_deref());
        }
    }
}

/// Parses one rule line of the form `key=value` (our override-rule grammar)
/// into a [`Configurator`] that sets that URL parameter.
fn parse_rule_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    Some((key.trim().to_string(), value.trim().to_string()))
}

fn parse_rules(raw: &str) -> Vec<Configurator> {
    raw.lines()
        .filter_map(parse_rule_line)
        .map(|(key, value)| -> Configurator { Arc::new(move |url: RceUrl| url.with_param(&key, &value)) })
        .collect()
}

/// Bound to a rule key (application- or service-scoped). Holds the current
/// configurator list, fail-open on parse failure: a bad rule payload keeps
/// the previous list instead of clearing it.
pub struct ConfigListener {
    rule_key: String,
    rules: RwLock<Vec<Configurator>>,
    on_change: Box<dyn Fn() + Send + Sync>,
}

impl ConfigListener {
    pub fn new(rule_key: impl Into<String>, on_change: impl Fn() + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { rule_key: rule_key.into(), rules: RwLock::new(Vec::new()), on_change: Box::new(on_change) })
    }

    pub fn rule_key(&self) -> &str {
        &self.rule_key
    }

    fn handle(&self, kind: ConfigEventKind, raw: Option<&str>) {
        match kind {
            ConfigEventKind::Deleted => {
                *self.rules.write().expect("rule lock poisoned") = Vec::new();
            }
            ConfigEventKind::Added | ConfigEventKind::Modified => match raw {
                Some(raw) => {
                    let parsed = parse_rules(raw);
                    *self.rules.write().expect("rule lock poisoned") = parsed;
                }
                None => {
                    warn!(rule_key = %self.rule_key, "configuration push carried no payload; keeping prior rules");
                }
            },
        }
        self.notify_overrides();
    }

    /// Apply this listener's current rule set as a left-fold over `url`.
    pub fn apply(&self, url: RceUrl) -> RceUrl {
        let rules = self.rules.read().expect("rule lock poisoned");
        rules.iter().fold(url, |acc, configurator| configurator(acc))
    }

    fn notify_overrides(&self) {
        (self.on_change)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn base_url() -> RceUrl {
        RceUrl::from_str("rce://127.0.0.1:20880/com.example.Echo").unwrap()
    }

    #[test]
    fn rule_application_is_left_fold() {
        let config = LocalDynamicConfig::new();
        let notified = Arc::new(AtomicUsize::new(0));
        let notified2 = notified.clone();
        let listener = ConfigListener::new("com.example.Echo", move || {
            notified2.fetch_add(1, Ordering::SeqCst);
        });
        config.add_listener("com.example.Echo", listener.clone());
        config.publish("com.example.Echo", Some("timeout=500\nretries=1".to_string()));

        let url = listener.apply(base_url());
        assert_eq!(url.param("timeout", ""), "500");
        assert_eq!(url.param("retries", ""), "1");
        assert!(notified.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn delete_clears_rules() {
        let config = LocalDynamicConfig::new();
        let listener = ConfigListener::new("svc", || {});
        config.add_listener("svc", listener.clone());
        config.publish("svc", Some("timeout=500".to_string()));
        assert_eq!(listener.apply(base_url()).param("timeout", ""), "500");

        config.publish("svc", None);
        assert_eq!(listener.apply(base_url()).param("timeout", "default"), "default");
    }

    #[test]
    fn malformed_payload_is_fail_open() {
        let listener = ConfigListener::new("svc", || {});
        listener.handle(ConfigEventKind::Added, Some("timeout=500"));
        assert_eq!(listener.apply(base_url()).param("timeout", ""), "500");

        // A push with no payload must not clear the existing, valid rules.
        listener.handle(ConfigEventKind::Modified, None);
        assert_eq!(listener.apply(base_url()).param("timeout", ""), "500");
    }
}
