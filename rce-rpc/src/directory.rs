use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use rce_url::RceUrl;

use crate::configurator::ConfigListener;
use crate::invocation::Invocation;
use crate::invoker::Invoker;
use crate::registry::{LocalRegistry, NotifyListener};

/// Builds the invoker for one provider URL. In a real deployment this would
/// dial the provider's protocol/port (Non-goal (i) excludes that); callers
/// supply whatever in-process stand-in (`LocalTransportInvoker` wrapping a
/// directly-held provider invoker) is appropriate for their test or demo.
pub type InvokerFactory = Arc<dyn Fn(RceUrl, &str) -> Arc<dyn Invoker> + Send + Sync>;

/// Routes an invocation to a subset of a directory's invokers. Mirrors a
/// single stage of a routing chain: tag routing, then application-scoped,
/// then service-scoped overrides.
pub trait Router: Send + Sync {
    fn route(&self, invokers: Vec<Arc<dyn Invoker>>, invocation: &Invocation) -> Vec<Arc<dyn Invoker>>;
}

/// No-op until a routing rule is pushed through its [`ConfigListener`]. Used
/// for the tag-, application-, and service-scoped stages of the static
/// router chain a `refer()` call builds — each bound to its own rule key,
/// each a pass-through until that key's rule actually arrives.
pub struct TagRouter {
    listener: Arc<ConfigListener>,
}

impl TagRouter {
    pub fn new(rule_key: impl Into<String>) -> Self {
        let listener = ConfigListener::new(rule_key, || {});
        Self { listener }
    }

    pub fn listener(&self) -> Arc<ConfigListener> {
        self.listener.clone()
    }
}

impl Router for TagRouter {
    fn route(&self, invokers: Vec<Arc<dyn Invoker>>, _invocation: &Invocation) -> Vec<Arc<dyn Invoker>> {
        // The tag rule only rewrites URLs (through the configurator chain in
        // `refresh`); at the routing stage itself there is nothing left to
        // filter on, so every invoker passes through unchanged.
        invokers
    }
}

/// Built from a registry-delivered `category=routers` URL: a single
/// `key=value` condition (grammar matches `ConfigListener`'s override rules)
/// that keeps only invokers whose URL has that parameter value. A router URL
/// with no `rule` parameter passes everything through.
pub struct ConditionRouter {
    condition: Option<(String, String)>,
}

impl ConditionRouter {
    pub fn from_rule_url(url: &RceUrl) -> Self {
        let condition = url.param_opt("rule").and_then(|raw| raw.split_once('=')).map(|(k, v)| (k.trim().to_string(), v.trim().to_string()));
        Self { condition }
    }
}

impl Router for ConditionRouter {
    fn route(&self, invokers: Vec<Arc<dyn Invoker>>, _invocation: &Invocation) -> Vec<Arc<dyn Invoker>> {
        let Some((key, value)) = &self.condition else {
            return invokers;
        };
        invokers.into_iter().filter(|invoker| invoker.url().param(key, "") == value).collect()
    }
}

/// Merges every registry-delivered `category=configurators` URL's
/// parameters onto `url`, skipping the bookkeeping keys that describe the
/// override itself rather than a value to apply.
fn apply_registry_overrides(url: RceUrl, overrides: &[RceUrl]) -> RceUrl {
    overrides.iter().fold(url, |acc, override_url| {
        override_url.params().fold(acc, |acc, (k, v)| {
            if matches!(k, "category" | "dynamic" | "enabled") {
                acc
            } else {
                acc.with_param(k, v)
            }
        })
    })
}

/// A live, continuously-updated view of the invokers available for one
/// service, grounded in the teacher's bean-registry snapshot-swap pattern
/// (`RwLock<Arc<_>>`, swapped wholesale rather than mutated in place).
///
/// Subscribes once, across the full category set (`providers`,
/// `configurators`, `routers`); every notification is re-partitioned by each
/// URL's own `category` parameter (`consumers` entries — this directory's
/// own self-registration, if any — are dropped) rather than assumed to be a
/// flat list of dialable providers.
pub struct Directory {
    consumer_url: RceUrl,
    registry: LocalRegistry,
    invoker_factory: InvokerFactory,
    app_configurator: Arc<ConfigListener>,
    service_configurator: Arc<ConfigListener>,
    static_routers: Vec<Arc<dyn Router>>,
    dynamic_routers: RwLock<Vec<Arc<dyn Router>>>,
    registry_overrides: RwLock<Vec<RceUrl>>,
    invokers: RwLock<Arc<Vec<Arc<dyn Invoker>>>>,
    destroyed: AtomicBool,
}

struct DirectoryNotifyListener(Arc<Directory>);

impl NotifyListener for DirectoryNotifyListener {
    fn notify(&self, urls: &[RceUrl]) {
        self.0.refresh(urls);
    }
}

impl Directory {
    pub fn new(
        consumer_url: RceUrl,
        registry: LocalRegistry,
        invoker_factory: InvokerFactory,
        app_configurator: Arc<ConfigListener>,
        service_configurator: Arc<ConfigListener>,
        routers: Vec<Arc<dyn Router>>,
    ) -> Arc<Self> {
        let directory = Arc::new(Self {
            consumer_url,
            registry,
            invoker_factory,
            app_configurator,
            service_configurator,
            static_routers: routers,
            dynamic_routers: RwLock::new(Vec::new()),
            registry_overrides: RwLock::new(Vec::new()),
            invokers: RwLock::new(Arc::new(Vec::new())),
            destroyed: AtomicBool::new(false),
        });
        let subscribe_url = directory.consumer_url.with_param("category", "providers,configurators,routers");
        let listener: Arc<dyn NotifyListener> = Arc::new(DirectoryNotifyListener(directory.clone()));
        directory.registry.subscribe(subscribe_url, listener).ok();
        directory
    }

    /// Partition a registry notification by each URL's `category` parameter
    /// (defaulting to `providers`) and refresh the corresponding piece of
    /// directory state.
    fn refresh(&self, urls: &[RceUrl]) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }

        let mut providers = Vec::new();
        let mut configurators = Vec::new();
        let mut routers = Vec::new();
        for url in urls {
            match url.param("category", "providers") {
                "configurators" => configurators.push(url.clone()),
                "routers" => routers.push(url.clone()),
                "consumers" => {}
                _ => providers.push(url.clone()),
            }
        }

        *self.registry_overrides.write().expect("directory lock poisoned") = configurators;
        self.rebuild_dynamic_routers(&routers);
        self.refresh_providers(&providers);
    }

    fn rebuild_dynamic_routers(&self, router_urls: &[RceUrl]) {
        let built: Vec<Arc<dyn Router>> = router_urls.iter().map(|url| Arc::new(ConditionRouter::from_rule_url(url)) as Arc<dyn Router>).collect();
        *self.dynamic_routers.write().expect("directory lock poisoned") = built;
    }

    /// Transform the registry's latest provider-URL snapshot through the
    /// merged configurator chain (app, service, then any registry-delivered
    /// override) and materialize fresh invokers, destroying any invoker that
    /// is no longer present.
    fn refresh_providers(&self, provider_urls: &[RceUrl]) {
        let overrides = self.registry_overrides.read().expect("directory lock poisoned").clone();

        let next: Vec<Arc<dyn Invoker>> = provider_urls
            .iter()
            .cloned()
            .map(|url| self.app_configurator.apply(url))
            .map(|url| self.service_configurator.apply(url))
            .map(|url| apply_registry_overrides(url, &overrides))
            .map(|url| {
                let interface = url.param("interface", url.path().trim_start_matches('/')).to_string();
                (self.invoker_factory)(url, &interface)
            })
            .collect();

        let previous = {
            let mut guard = self.invokers.write().expect("directory lock poisoned");
            std::mem::replace(&mut *guard, Arc::new(next))
        };
        for invoker in previous.iter() {
            if !self.invokers.read().expect("directory lock poisoned").iter().any(|i| i.url() == invoker.url()) {
                invoker.destroy();
            }
        }
    }

    pub fn list(&self, invocation: &Invocation) -> Vec<Arc<dyn Invoker>> {
        let snapshot = self.invokers.read().expect("directory lock poisoned").as_ref().clone();
        let dynamic = self.dynamic_routers.read().expect("directory lock poisoned").clone();
        self.static_routers.iter().chain(dynamic.iter()).fold(snapshot, |acc, router| router.route(acc, invocation))
    }

    pub fn consumer_url(&self) -> &RceUrl {
        &self.consumer_url
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        let invokers = self.invokers.read().expect("directory lock poisoned").clone();
        for invoker in invokers.iter() {
            invoker.destroy();
        }
    }
}
