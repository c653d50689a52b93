use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rce_url::RceUrl;

use crate::error::RpcError;

/// Callback invoked with the full, current snapshot of URLs matching a
/// subscription's category set. Never called with an empty list unless the
/// category genuinely has no registrations.
pub trait NotifyListener: Send + Sync {
    fn notify(&self, urls: &[RceUrl]);
}

/// In-process stand-in for a real service registry (ZooKeeper/Nacos/etcd).
/// Non-goal (ii) explicitly excludes a real client; this type exists purely
/// so `registry_protocol` and `directory` are testable without one.
#[derive(Clone, Default)]
pub struct LocalRegistry {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    registered: Vec<RceUrl>,
    subscriptions: HashMap<String, Vec<(RceUrl, Arc<dyn NotifyListener>)>>,
}

fn subscription_key(url: &RceUrl) -> String {
    url.service_key()
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, url: RceUrl) -> Result<(), RpcError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.registered.iter().any(|u| u == &url) {
            inner.registered.push(url.clone());
        }
        drop(inner);
        self.notify_subscribers(&url);
        Ok(())
    }

    pub fn unregister(&self, url: &RceUrl) -> Result<(), RpcError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.registered.retain(|u| u != url);
        drop(inner);
        self.notify_subscribers(url);
        Ok(())
    }

    pub fn subscribe(&self, url: RceUrl, listener: Arc<dyn NotifyListener>) -> Result<(), RpcError> {
        let key = subscription_key(&url);
        let snapshot = self.lookup(&url);
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.subscriptions.entry(key).or_default().push((url, listener.clone()));
        drop(inner);
        listener.notify(&snapshot);
        Ok(())
    }

    pub fn unsubscribe(&self, url: &RceUrl, listener: &Arc<dyn NotifyListener>) -> Result<(), RpcError> {
        let key = subscription_key(url);
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if let Some(list) = inner.subscriptions.get_mut(&key) {
            list.retain(|(_, l)| !Arc::ptr_eq(l, listener));
        }
        Ok(())
    }

    /// How many listeners are currently subscribed under the bucket `url`
    /// would notify. Mostly useful for asserting a subscription happened at
    /// all, since `lookup`/`notify` already exercise its contents.
    pub fn subscriber_count(&self, url: &RceUrl) -> usize {
        let key = subscription_key(url);
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.subscriptions.get(&key).map(Vec::len).unwrap_or(0)
    }

    pub fn lookup(&self, url: &RceUrl) -> Vec<RceUrl> {
        let key = subscription_key(url);
        let inner = self.inner.read().expect("registry lock poisoned");
        inner
            .registered
            .iter()
            .filter(|u| subscription_key(u) == key)
            .cloned()
            .collect()
    }

    fn notify_subscribers(&self, changed: &RceUrl) {
        let key = subscription_key(changed);
        let snapshot = self.lookup(changed);
        let listeners: Vec<Arc<dyn NotifyListener>> = {
            let inner = self.inner.read().expect("registry lock poisoned");
            inner
                .subscriptions
                .get(&key)
                .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };
        for listener in listeners {
            listener.notify(&snapshot);
        }
    }
}
