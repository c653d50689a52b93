//! End-to-end coverage of `RegistryProtocol::refer`'s cluster-policy
//! dispatch: the `cluster` URL parameter picks the wrapping `Cluster`, and a
//! multi-group consumer URL forces `mergeable` regardless of that parameter.

use std::str::FromStr;
use std::sync::Arc;

use rce_rpc::{Invocation, InvokeFuture, Invoker, InvokerFactory, LocalDynamicConfig, LocalRegistry, RegistryProtocol, RpcError, RpcFailureKind, RpcResult};
use rce_url::RceUrl;

struct FailingInvoker {
    url: RceUrl,
}

impl Invoker for FailingInvoker {
    fn url(&self) -> &RceUrl {
        &self.url
    }
    fn interface(&self) -> &str {
        "com.example.Echo"
    }
    fn is_available(&self) -> bool {
        true
    }
    fn invoke(&self, _invocation: Invocation) -> InvokeFuture<'_> {
        Box::pin(async move { Err(RpcError::RpcFailure { kind: RpcFailureKind::Forbidden, message: "always fails".into() }) })
    }
    fn destroy(&self) {}
}

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
        let port = self.url.port().to_string();
        Box::pin(async move { Ok(RpcResult::new(Box::new(invocation.method_name().to_string())).with_attachment("port", port)) })
    }
    fn destroy(&self) {}
}

fn protocol_with_factory(factory: InvokerFactory) -> RegistryProtocol {
    RegistryProtocol::new(LocalRegistry::new(), LocalDynamicConfig::new(), factory)
}

// ── `cluster=failfast` never retries a retryable failure ─────────────────

#[tokio::test]
async fn failfast_selection_does_not_retry() {
    let registry = LocalRegistry::new();
    let provider = RceUrl::from_str("rce://127.0.0.1:20880/com.example.Echo").unwrap();
    registry.register(provider.clone()).unwrap();

    let factory: InvokerFactory = Arc::new(|url, _iface| Arc::new(FailingInvoker { url }) as Arc<dyn Invoker>);
    let protocol = RegistryProtocol::new(registry, LocalDynamicConfig::new(), factory);

    let consumer = RceUrl::from_str("rce://127.0.0.1:0/com.example.Echo?cluster=failfast").unwrap();
    let invoker = protocol.refer("com.example.Echo", consumer).unwrap();
    let err = invoker.invoke(Invocation::new("echo")).await.unwrap_err();
    assert!(matches!(err, RpcError::RpcFailure { kind: RpcFailureKind::Forbidden, .. }));
}

// ── A multi-group consumer URL forces `mergeable` regardless of `cluster` ─

#[tokio::test]
async fn multi_group_consumer_merges_every_invoker_in_its_bucket() {
    let registry = LocalRegistry::new();
    // Both providers share the consumer's literal (unexpanded) `group=a,b`
    // service key — this in-process registry has no per-group fan-out, so a
    // multi-group subscription only ever sees providers registered under
    // that exact combined key.
    registry.register(RceUrl::from_str("rce://127.0.0.1:20880/com.example.Echo?group=a,b").unwrap()).unwrap();
    registry.register(RceUrl::from_str("rce://127.0.0.1:20881/com.example.Echo?group=a,b").unwrap()).unwrap();

    let factory: InvokerFactory = Arc::new(|url, _iface| Arc::new(EchoInvoker { url }) as Arc<dyn Invoker>);
    let protocol = protocol_with_factory(factory);

    // `cluster=failover` is explicitly requested but must be overridden by
    // the multi-group cardinality rule.
    let consumer = RceUrl::from_str("rce://127.0.0.1:0/com.example.Echo?group=a,b&cluster=failover").unwrap();
    let invoker = protocol.refer("com.example.Echo", consumer).unwrap();

    let result = invoker.invoke(Invocation::new("echo")).await.unwrap();
    // Both providers answered, so both ports' attachments survive the merge
    // even though only the last provider's value is kept.
    assert_eq!(result.attachments().len(), 2);
    assert_eq!(result.downcast::<String>().unwrap(), "echo");
}

// ── A single-group `cluster=mergeable` consumer also dispatches to it ────

#[tokio::test]
async fn explicit_mergeable_selection_is_honored_for_a_single_group() {
    let registry = LocalRegistry::new();
    registry.register(RceUrl::from_str("rce://127.0.0.1:20880/com.example.Echo").unwrap()).unwrap();

    let factory: InvokerFactory = Arc::new(|url, _iface| Arc::new(EchoInvoker { url }) as Arc<dyn Invoker>);
    let protocol = protocol_with_factory(factory);

    let consumer = RceUrl::from_str("rce://127.0.0.1:0/com.example.Echo?cluster=mergeable").unwrap();
    let invoker = protocol.refer("com.example.Echo", consumer).unwrap();
    let result = invoker.invoke(Invocation::new("echo")).await.unwrap();
    assert_eq!(result.downcast::<String>().unwrap(), "echo");
}
