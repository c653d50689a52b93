//! Composes the registry and dynamic-config stand-ins, the configurator
//! chain, and the cluster/directory layer into the two operations consumers
//! actually call: `export` a local service, `refer` a remote one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rce_url::RceUrl;
use tracing::{info, warn};

use crate::cluster::{Broadcast, Cluster, Failfast, Failover, MergeableCluster, MockCluster, RoundRobinLoadBalance};
use crate::configurator::{ConfigListener, LocalDynamicConfig};
use crate::directory::{Directory, InvokerFactory, Router, TagRouter};
use crate::error::{RpcError, RpcFailureKind};
use crate::exporter::Exporter;
use crate::invocation::{Invocation, RpcResult};
use crate::invoker::{InvokeFuture, Invoker};
use crate::registry::{LocalRegistry, NotifyListener};
use rce_core::settings::RuntimeSettings;

/// Interface name that requests the registry itself back as an `Invoker`
/// (refer step 2) — lets a caller that genuinely needs direct registry
/// access (an admin console, a health probe) refer it the same way it would
/// any other service, instead of reaching around the protocol.
pub const REGISTRY_SERVICE_INTERFACE: &str = "rce.registry.RegistryService";

/// Wraps a [`LocalRegistry`] so it can be returned from `refer` when the
/// caller asked for [`REGISTRY_SERVICE_INTERFACE`]. Understands a single
/// method, `lookup`, taking the `RceUrl` to look up.
struct RegistryServiceInvoker {
    url: RceUrl,
    registry: LocalRegistry,
    alive: AtomicBool,
}

impl Invoker for RegistryServiceInvoker {
    fn url(&self) -> &RceUrl {
        &self.url
    }

    fn interface(&self) -> &str {
        REGISTRY_SERVICE_INTERFACE
    }

    fn is_available(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_> {
        Box::pin(async move {
            match invocation.method_name() {
                "lookup" => {
                    let mut args = invocation.into_arguments().into_iter();
                    let lookup_url = match args.next().and_then(|a| a.downcast::<RceUrl>().ok()) {
                        Some(boxed) => *boxed,
                        None => self.url.clone(),
                    };
                    Ok(RpcResult::new(Box::new(self.registry.lookup(&lookup_url))))
                }
                other => Err(RpcError::RpcFailure {
                    kind: RpcFailureKind::Forbidden,
                    message: format!("registry service has no method '{other}'"),
                }),
            }
        })
    }

    fn destroy(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

struct OverrideListener {
    cache_key: String,
    state: Arc<Mutex<Option<Arc<ReexportState>>>>,
}

impl NotifyListener for OverrideListener {
    fn notify(&self, urls: &[RceUrl]) {
        // The subscription bucket is keyed only by service key (§ registry
        // stand-in), so it can also carry plain provider registrations for
        // the same service; only genuine `category=configurators` entries
        // are override rules.
        let overrides: Vec<RceUrl> = urls.iter().filter(|u| u.param("category", "providers") == "configurators").cloned().collect();
        info!(cache_key = %self.cache_key, count = overrides.len(), "override urls changed");
        if let Some(state) = self.state.lock().expect("reexport cell poisoned").clone() {
            state.set_registry_overrides(&overrides);
            state.reexport();
        }
    }
}

/// Everything a pushed configurator (from `LocalDynamicConfig`) or a pushed
/// override (from the registry's `overrideSubscribeUrl` subscription) needs
/// to recompute the effective provider URL and swap it into the live
/// [`Exporter`]. Built once export() has the cache key and filled into a
/// shared cell right before the listeners it drives are capable of firing,
/// breaking the otherwise-circular "listener needs the state it updates"
/// dependency.
struct ReexportState {
    provider_url: RceUrl,
    app_configurator: Arc<ConfigListener>,
    service_configurator: Arc<ConfigListener>,
    registry_overrides: Mutex<Vec<RceUrl>>,
    registry: LocalRegistry,
    bounds: Arc<Mutex<HashMap<String, Arc<Exporter>>>>,
    cache_key: String,
}

impl ReexportState {
    fn set_registry_overrides(&self, urls: &[RceUrl]) {
        *self.registry_overrides.lock().expect("override lock poisoned") = urls.to_vec();
    }

    /// Effective URL = registry overrides folded over (service configurator
    /// folded over (app configurator folded over the original provider URL)).
    fn effective_url(&self) -> RceUrl {
        let merged = self.service_configurator.apply(self.app_configurator.apply(self.provider_url.clone()));
        let overrides = self.registry_overrides.lock().expect("override lock poisoned");
        apply_registry_overrides(merged, &overrides)
    }

    fn reexport(&self) {
        let new_url = self.effective_url();
        let exporter = {
            let bounds = self.bounds.lock().expect("registry protocol lock poisoned");
            bounds.get(&self.cache_key).cloned()
        };
        let Some(exporter) = exporter else { return };
        if exporter.url() == new_url {
            return;
        }

        let new_registered = self.provider_url.param_bool("register", true);
        info!(cache_key = %self.cache_key, %new_url, "reexporting after configuration change");
        if let Err(err) = exporter.reexport(new_url, new_registered) {
            warn!(cache_key = %self.cache_key, %err, "reexport failed");
        }
    }
}

/// Merges every `(key, value)` pair from each override URL onto `url`,
/// skipping the bookkeeping keys (`category`, `dynamic`, `enabled`) that
/// describe the override itself rather than a value to apply.
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

/// Wires a [`LocalRegistry`], a [`LocalDynamicConfig`], and a provider
/// invoker factory into `export`/`refer`. One instance is normally shared
/// process-wide, the same way the teacher shares one `BeanContext`.
pub struct RegistryProtocol {
    registry: LocalRegistry,
    dynamic_config: LocalDynamicConfig,
    invoker_factory: InvokerFactory,
    settings: RuntimeSettings,
    bounds: Arc<Mutex<HashMap<String, Arc<Exporter>>>>,
}

impl RegistryProtocol {
    pub fn new(registry: LocalRegistry, dynamic_config: LocalDynamicConfig, invoker_factory: InvokerFactory) -> Self {
        Self {
            registry,
            dynamic_config,
            invoker_factory,
            settings: RuntimeSettings::default(),
            bounds: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 7 steps: decode the providerUrl nested in the invoker's `export`
    /// parameter, build the override-subscribe URL, merge app+service
    /// configurators, export locally via the `bounds` cache, conditionally
    /// register, subscribe the override listener, return a destroyable
    /// [`Exporter`] that later reconfiguration can swap in place.
    pub fn export(&self, invoker: Arc<dyn Invoker>) -> Result<Arc<Exporter>, RpcError> {
        let provider_url = RceUrl::extract_from(invoker.url(), "export").map_err(|_| RpcError::ExportMissing {
            cache_key: invoker.url().to_string(),
        })?;
        let cache_key = provider_url.cache_key();

        let mut bounds = self.bounds.lock().expect("registry protocol lock poisoned");
        if let Some(existing) = bounds.get(&cache_key) {
            return Ok(existing.clone());
        }

        let app_rule_key = provider_url.param("application", provider_url.host()).to_string();
        let service_rule_key = provider_url.service_key();

        // The configurators' on_change callbacks need the shared reexport
        // state, but that state needs the configurators to exist first —
        // broken by routing both callbacks through a cell filled in below.
        let reexport_cell: Arc<Mutex<Option<Arc<ReexportState>>>> = Arc::new(Mutex::new(None));

        let cell_for_app = reexport_cell.clone();
        let app_configurator = ConfigListener::new(app_rule_key.clone(), move || {
            if let Some(state) = cell_for_app.lock().expect("reexport cell poisoned").clone() {
                state.reexport();
            }
        });
        let cell_for_service = reexport_cell.clone();
        let service_configurator = ConfigListener::new(service_rule_key.clone(), move || {
            if let Some(state) = cell_for_service.lock().expect("reexport cell poisoned").clone() {
                state.reexport();
            }
        });
        bind_configurator(&self.dynamic_config, &app_configurator);
        bind_configurator(&self.dynamic_config, &service_configurator);

        let exported_url = service_configurator.apply(app_configurator.apply(provider_url.clone()));

        let registered = provider_url.param_bool("register", true);
        if registered {
            self.registry.register(exported_url.clone())?;
        }

        let override_listener: Arc<dyn NotifyListener> = Arc::new(OverrideListener {
            cache_key: cache_key.clone(),
            state: reexport_cell.clone(),
        });
        let override_subscribe_url = provider_url
            .with_protocol("provider")
            .with_param("category", "configurators")
            .with_param("check", "false");
        self.registry.subscribe(override_subscribe_url, override_listener.clone())?;

        let exporter = Arc::new(Exporter::new(
            cache_key.clone(),
            exported_url,
            invoker,
            self.registry.clone(),
            Some(override_listener),
            registered,
            self.settings.shutdown_timeout,
        ));
        bounds.insert(cache_key.clone(), exporter.clone());
        drop(bounds);

        let state = Arc::new(ReexportState {
            provider_url,
            app_configurator,
            service_configurator,
            registry_overrides: Mutex::new(Vec::new()),
            registry: self.registry.clone(),
            bounds: self.bounds.clone(),
            cache_key,
        });
        *reexport_cell.lock().expect("reexport cell poisoned") = Some(state);

        Ok(exporter)
    }

    /// 6 steps: if `interface` names the registry management interface
    /// itself, return the registry wrapped as an invoker; otherwise rebuild
    /// the consumer URL, merge app+service configurators, attach a
    /// `Directory` subscribed across the full category set, register the
    /// consumer URL when asked and the service isn't wildcard, select a
    /// cluster policy (`mergeable` when `group` has multiple values or `*`,
    /// else the URL-selected policy), and return `cluster.join(directory)`.
    pub fn refer(&self, interface: &str, url: RceUrl) -> Result<Arc<dyn Invoker>, RpcError> {
        let consumer_url = url.with_param("interface", interface.to_string());

        if interface == REGISTRY_SERVICE_INTERFACE {
            return Ok(Arc::new(RegistryServiceInvoker {
                url: consumer_url,
                registry: self.registry.clone(),
                alive: AtomicBool::new(true),
            }));
        }

        let app_rule_key = consumer_url.param("application", consumer_url.host()).to_string();
        let service_rule_key = consumer_url.service_key();
        let app_configurator = ConfigListener::new(app_rule_key.clone(), || {});
        let service_configurator = ConfigListener::new(service_rule_key.clone(), || {});
        bind_configurator(&self.dynamic_config, &app_configurator);
        bind_configurator(&self.dynamic_config, &service_configurator);

        // Tag, application-scoped, and service-scoped stages, per the router
        // chain (each just a distinctly-keyed condition gate until a rule is
        // pushed through its own `ConfigListener`).
        let routers: Vec<Arc<dyn Router>> = vec![
            Arc::new(TagRouter::new(format!("{app_rule_key}.tag-router"))),
            Arc::new(TagRouter::new(format!("{app_rule_key}.condition-router"))),
            Arc::new(TagRouter::new(format!("{service_rule_key}.condition-router"))),
        ];

        let directory = Directory::new(
            consumer_url.clone(),
            self.registry.clone(),
            self.invoker_factory.clone(),
            app_configurator,
            service_configurator,
            routers,
        );

        let registered = consumer_url.param_bool("register", true);
        let wildcard = consumer_url.interface() == "*";
        if registered && !wildcard {
            self.registry.register(consumer_url.with_param("category", "consumers"))?;
        }

        let cluster = self.select_cluster(&consumer_url);
        Ok(cluster.join(directory))
    }

    fn select_cluster(&self, url: &RceUrl) -> Arc<dyn Cluster> {
        let groups: Vec<&str> = url.param("group", "").split(',').filter(|g| !g.is_empty()).collect();
        let multi_group = groups.len() > 1 || url.param("group", "") == "*";

        let base: Arc<dyn Cluster> = if multi_group {
            Arc::new(MergeableCluster::new())
        } else {
            match url.param("cluster", "failover") {
                "failover" => Arc::new(Failover::new(Arc::new(RoundRobinLoadBalance::default()), self.settings.default_retries)),
                "failfast" => Arc::new(Failfast::new(Arc::new(RoundRobinLoadBalance::default()))),
                "broadcast" => Arc::new(Broadcast),
                "mergeable" => Arc::new(MergeableCluster::new()),
                other => {
                    info!(requested = other, "unrecognized cluster policy, falling back to failover");
                    Arc::new(Failover::new(Arc::new(RoundRobinLoadBalance::default()), self.settings.default_retries))
                }
            }
        };

        let mock_param = url.param("mock", "false");
        if mock_param == "false" {
            return base;
        }
        let mock_invoker = (self.invoker_factory)(url.clone(), url.param("interface", ""));
        Arc::new(MockCluster::new(base, mock_invoker, mock_param))
    }
}

/// Fetches the current raw rule and primes the listener, then binds it to
/// future pushes through [`LocalDynamicConfig::add_listener`].
fn bind_configurator(dynamic_config: &LocalDynamicConfig, listener: &Arc<ConfigListener>) {
    dynamic_config.add_listener(listener.rule_key(), listener.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Invocation, RpcResult};
    use crate::invoker::InvokeFuture;
    use std::str::FromStr;

    struct EchoInvoker {
        url: RceUrl,
    }
    impl Invoker for EchoInvoker {
        fn url(&self) -> &RceUrl {
            &self.url
        }
        fn interface(&self) -> &str {
            "com.example.Echo"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_> {
            Box::pin(async move { Ok(RpcResult::new(Box::new(invocation.method_name().to_string()))) })
        }
        fn destroy(&self) {}
    }

    /// Providers export through a registry-address invoker whose `export`
    /// parameter nests the real provider URL, mirroring the real protocol's
    /// `registryUrl` vs `providerUrl` split.
    fn registry_invoker_url(provider: &RceUrl) -> RceUrl {
        RceUrl::from_str("rce-registry://127.0.0.1:2181/").unwrap().with_param("export", provider.to_string())
    }

    fn provider_url() -> RceUrl {
        RceUrl::from_str("rce://127.0.0.1:20880/com.example.Echo?group=g&version=1.0&application=demo").unwrap()
    }

    fn protocol() -> RegistryProtocol {
        let registry = LocalRegistry::new();
        let dynamic_config = LocalDynamicConfig::new();
        let factory: InvokerFactory = Arc::new(|url, _iface| Arc::new(EchoInvoker { url }) as Arc<dyn Invoker>);
        RegistryProtocol::new(registry, dynamic_config, factory)
    }

    #[test]
    fn export_registers_and_caches_by_key() {
        let protocol = protocol();
        let provider = provider_url();
        let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
        let exporter1 = protocol.export(invoker.clone()).unwrap();
        let exporter2 = protocol.export(invoker).unwrap();
        assert_eq!(exporter1.cache_key(), exporter2.cache_key());
        assert_eq!(protocol.registry.lookup(&provider).len(), 1);
    }

    #[test]
    fn export_without_nested_url_fails() {
        let protocol = protocol();
        let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: RceUrl::from_str("rce-registry://127.0.0.1:2181/").unwrap() });
        let err = protocol.export(invoker).unwrap_err();
        assert!(matches!(err, RpcError::ExportMissing { .. }));
    }

    #[test]
    fn export_honors_register_false() {
        let protocol = protocol();
        let provider = provider_url().with_param("register", "false");
        let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
        protocol.export(invoker).unwrap();
        assert_eq!(protocol.registry.lookup(&provider).len(), 0);
    }

    #[test]
    fn export_builds_a_provider_protocol_configurators_subscribe_url() {
        let protocol = protocol();
        let provider = provider_url();
        let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
        protocol.export(invoker).unwrap();

        let expected = provider.with_protocol("provider").with_param("category", "configurators").with_param("check", "false");
        assert_eq!(protocol.registry.subscriber_count(&expected), 1);
    }

    #[test]
    fn override_push_reexports_with_new_weight() {
        let protocol = protocol();
        let provider = provider_url();
        let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
        let exporter = protocol.export(invoker).unwrap();
        assert_eq!(exporter.url().param("weight", "100"), "100");

        protocol.dynamic_config.publish(&provider.service_key(), Some("weight=200".to_string()));

        assert_eq!(exporter.url().param("weight", "100"), "200");
        // Reexport re-registers at the new URL; only the new URL is live.
        assert_eq!(protocol.registry.lookup(&provider).len(), 1);
        assert_eq!(protocol.registry.lookup(&provider)[0].param("weight", ""), "200");
    }

    #[test]
    fn registry_delivered_override_also_reexports() {
        let protocol = protocol();
        let provider = provider_url();
        let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
        let exporter = protocol.export(invoker).unwrap();

        let override_url = provider.with_protocol("provider").with_param("category", "configurators").with_param("timeout", "5000");
        protocol.registry.register(override_url).unwrap();

        assert_eq!(exporter.url().param("timeout", ""), "5000");
    }

    #[tokio::test]
    async fn refer_joins_a_directory_backed_by_registered_providers() {
        let protocol = protocol();
        let provider = provider_url();
        let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
        protocol.export(invoker).unwrap();

        let consumer_url = RceUrl::from_str("rce://127.0.0.1:0/com.example.Echo?group=g&version=1.0").unwrap();
        let cluster_invoker = protocol.refer("com.example.Echo", consumer_url).unwrap();
        let result = cluster_invoker.invoke(Invocation::new("echo")).await.unwrap();
        assert_eq!(result.downcast::<String>().unwrap(), "echo");
    }

    #[tokio::test]
    async fn refer_with_forced_mock_short_circuits() {
        let protocol = protocol();
        let consumer_url = RceUrl::from_str("rce://127.0.0.1:0/com.example.Echo?mock=force").unwrap();
        let cluster_invoker = protocol.refer("com.example.Echo", consumer_url).unwrap();
        let result = cluster_invoker.invoke(Invocation::new("echo")).await.unwrap();
        assert_eq!(result.downcast::<String>().unwrap(), "echo");
    }

    #[test]
    fn refer_registers_the_consumer_url_when_not_wildcard() {
        let protocol = protocol();
        let consumer_url = RceUrl::from_str("rce://127.0.0.1:0/com.example.Echo").unwrap();
        protocol.refer("com.example.Echo", consumer_url.clone()).unwrap();
        let registered = consumer_url.with_param("interface", "com.example.Echo").with_param("category", "consumers");
        assert_eq!(protocol.registry.lookup(&registered).len(), 1);
    }

    #[test]
    fn refer_skips_consumer_registration_for_wildcard_interface() {
        let protocol = protocol();
        let consumer_url = RceUrl::from_str("rce://127.0.0.1:0/anything").unwrap();
        protocol.refer("*", consumer_url).unwrap();
        // No consumer-category registration should have happened for "*".
        assert!(protocol
            .registry
            .lookup(&RceUrl::from_str("rce://127.0.0.1:0/anything?interface=*&category=consumers").unwrap())
            .is_empty());
    }

    #[tokio::test]
    async fn refer_for_registry_service_interface_returns_registry_invoker() {
        let protocol = protocol();
        let provider = provider_url();
        let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
        protocol.export(invoker).unwrap();

        let url = RceUrl::from_str("rce://127.0.0.1:0/ignored").unwrap();
        let registry_invoker = protocol.refer(REGISTRY_SERVICE_INTERFACE, url).unwrap();
        assert_eq!(registry_invoker.interface(), REGISTRY_SERVICE_INTERFACE);

        let lookup_invocation = Invocation::new("lookup").with_argument::<RceUrl>("RceUrl", provider.clone());
        let result = registry_invoker.invoke(lookup_invocation).await;
        let urls = result.unwrap().downcast::<Vec<RceUrl>>().unwrap();
        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn refer_selects_mergeable_for_multi_group_consumer() {
        let protocol = protocol();
        let consumer_url = RceUrl::from_str("rce://127.0.0.1:0/com.example.Echo?group=a,b").unwrap();
        let cluster_invoker = protocol.refer("com.example.Echo", consumer_url).unwrap();
        // Mergeable has no providers to merge yet; it must fail rather than panic.
        let result = cluster_invoker.invoke(Invocation::new("echo")).await;
        assert!(result.is_err());
    }
}
