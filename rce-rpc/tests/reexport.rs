//! End-to-end coverage of the reexport path: a configurator push (from
//! either `LocalDynamicConfig` or a registry-delivered override) recomputes
//! the effective provider URL and swaps it into the live `Exporter` without
//! handing the caller a new handle.

use std::str::FromStr;
use std::sync::Arc;

use rce_rpc::{Invocation, InvokeFuture, Invoker, InvokerFactory, LocalDynamicConfig, LocalRegistry, RegistryProtocol, RpcResult};
use rce_url::RceUrl;

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

fn factory() -> InvokerFactory {
    Arc::new(|url, _iface| Arc::new(EchoInvoker { url }) as Arc<dyn Invoker>)
}

fn provider_url() -> RceUrl {
    RceUrl::from_str("rce://127.0.0.1:20880/com.example.Echo?group=g&version=1.0&application=demo").unwrap()
}

fn registry_invoker_url(provider: &RceUrl) -> RceUrl {
    RceUrl::from_str("rce-registry://127.0.0.1:2181/").unwrap().with_param("export", provider.to_string())
}

// ── A service-scoped configurator push re-exports exactly once ──────────

#[test]
fn service_configurator_push_triggers_one_reexport() {
    let registry = LocalRegistry::new();
    let dynamic_config = LocalDynamicConfig::new();
    let protocol = RegistryProtocol::new(registry.clone(), dynamic_config.clone(), factory());

    let provider = provider_url();
    let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
    let exporter = protocol.export(invoker).unwrap();
    assert_eq!(exporter.url().param("weight", "100"), "100");

    dynamic_config.publish(&provider.service_key(), Some("weight=200".to_string()));
    assert_eq!(exporter.url().param("weight", "100"), "200");

    // A second push to the same value must not register a new URL again.
    let before = registry.subscriber_count(&provider.with_protocol("provider").with_param("category", "configurators"));
    dynamic_config.publish(&provider.service_key(), Some("weight=200".to_string()));
    let after = registry.subscriber_count(&provider.with_protocol("provider").with_param("category", "configurators"));
    assert_eq!(before, after);
}

// ── A registry-delivered override (category=configurators) re-exports too ─

#[test]
fn registry_override_registration_triggers_reexport() {
    let registry = LocalRegistry::new();
    let dynamic_config = LocalDynamicConfig::new();
    let protocol = RegistryProtocol::new(registry.clone(), dynamic_config, factory());

    let provider = provider_url();
    let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
    let exporter = protocol.export(invoker).unwrap();

    let override_url = provider
        .with_protocol("provider")
        .with_param("category", "configurators")
        .with_param("weight", "300");
    registry.register(override_url).unwrap();

    assert_eq!(exporter.url().param("weight", "100"), "300");
}

// ── Service-scoped rules take precedence over application-scoped ones ───

#[test]
fn service_configurator_wins_over_app_configurator_for_the_same_key() {
    let registry = LocalRegistry::new();
    let dynamic_config = LocalDynamicConfig::new();
    let protocol = RegistryProtocol::new(registry, dynamic_config.clone(), factory());

    let provider = provider_url();
    let invoker: Arc<dyn Invoker> = Arc::new(EchoInvoker { url: registry_invoker_url(&provider) });
    let exporter = protocol.export(invoker).unwrap();

    dynamic_config.publish(provider.param("application", provider.host()), Some("weight=150".to_string()));
    assert_eq!(exporter.url().param("weight", "100"), "150");

    dynamic_config.publish(&provider.service_key(), Some("weight=250".to_string()));
    assert_eq!(exporter.url().param("weight", "100"), "250");
}
