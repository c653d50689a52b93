use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rce_url::RceUrl;

use crate::directory::Directory;
use crate::error::{RpcError, RpcFailureKind};
use crate::invocation::{Invocation, RpcResult};
use crate::invoker::{InvokeFuture, Invoker};

/// Picks one invoker out of a directory's live list for a given invocation.
/// Grounded in the same adaptive-default shape as `LoadBalance` extension
/// points elsewhere in the core: round-robin is the only strategy shipped
/// here, chosen for determinism in tests.
pub trait LoadBalance: Send + Sync {
    fn select(&self, invokers: &[Arc<dyn Invoker>], invocation: &Invocation) -> Option<Arc<dyn Invoker>>;
}

#[derive(Default)]
pub struct RoundRobinLoadBalance {
    counter: AtomicUsize,
}

impl LoadBalance for RoundRobinLoadBalance {
    fn select(&self, invokers: &[Arc<dyn Invoker>], _invocation: &Invocation) -> Option<Arc<dyn Invoker>> {
        let available: Vec<&Arc<dyn Invoker>> = invokers.iter().filter(|i| i.is_available()).collect();
        if available.is_empty() {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::SeqCst) % available.len();
        Some(available[idx].clone())
    }
}

/// Wraps a [`Directory`] into a single callable invoker. Each policy decides
/// how many directory invokers to try and in what order.
///
/// `failsafe` and `forking` are explicitly not implemented; see the design
/// notes for why. `mergeable` is implemented as an approximate fan-in (see
/// [`MergeableCluster`]), not a pluggable per-type `Merger`.
pub trait Cluster: Send + Sync {
    fn join(&self, directory: Arc<Directory>) -> Arc<dyn Invoker>;
}

struct ClusterInvoker {
    url: RceUrl,
    directory: Arc<Directory>,
    load_balance: Arc<dyn LoadBalance>,
    retries: u32,
}

impl Invoker for ClusterInvoker {
    fn url(&self) -> &RceUrl {
        &self.url
    }

    fn interface(&self) -> &str {
        ""
    }

    fn is_available(&self) -> bool {
        !self.directory.is_destroyed()
    }

    fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_> {
        Box::pin(async move { self.invoke_with_retry(invocation).await })
    }

    fn destroy(&self) {
        self.directory.destroy();
    }
}

impl ClusterInvoker {
    async fn invoke_with_retry(&self, invocation: Invocation) -> Result<RpcResult, RpcError> {
        let attempts = self.retries + 1;
        let mut last_err = None;
        for _ in 0..attempts {
            let invokers = self.directory.list(&invocation);
            let Some(invoker) = self.load_balance.select(&invokers, &invocation) else {
                return Err(RpcError::RpcFailure {
                    kind: RpcFailureKind::Network,
                    message: "no available invoker in directory".to_string(),
                });
            };
            match invoker.invoke(clone_invocation(&invocation)).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    let retryable = matches!(&err, RpcError::RpcFailure { kind, .. } if kind.is_retryable());
                    last_err = Some(err);
                    if !retryable {
                        break;
                    }
                }
            }
        }
        Err(last_err.unwrap_or(RpcError::RpcFailure {
            kind: RpcFailureKind::Network,
            message: "directory had no invokers to try".to_string(),
        }))
    }
}

/// Arguments are moved into the dispatcher on the first attempt; a retried
/// invocation is necessarily a fresh call, not a literal resend of the same
/// boxed values, so only method name and attachments survive across retries.
fn clone_invocation(invocation: &Invocation) -> Invocation {
    let mut next = Invocation::new(invocation.method_name());
    for (k, v) in invocation.attachments() {
        next = next.with_attachment(k.clone(), v.clone());
    }
    next
}

/// Retries on `failover`-eligible failures (`RpcFailureKind::is_retryable`),
/// up to `retries` additional attempts after the first.
pub struct Failover {
    load_balance: Arc<dyn LoadBalance>,
    retries: u32,
}

impl Failover {
    pub fn new(load_balance: Arc<dyn LoadBalance>, retries: u32) -> Self {
        Self { load_balance, retries }
    }
}

impl Cluster for Failover {
    fn join(&self, directory: Arc<Directory>) -> Arc<dyn Invoker> {
        let url = directory.consumer_url().clone();
        Arc::new(ClusterInvoker { url, directory, load_balance: self.load_balance.clone(), retries: self.retries })
    }
}

/// Fails on the first error, no retry.
pub struct Failfast {
    load_balance: Arc<dyn LoadBalance>,
}

impl Failfast {
    pub fn new(load_balance: Arc<dyn LoadBalance>) -> Self {
        Self { load_balance }
    }
}

impl Cluster for Failfast {
    fn join(&self, directory: Arc<Directory>) -> Arc<dyn Invoker> {
        let url = directory.consumer_url().clone();
        Arc::new(ClusterInvoker { url, directory, load_balance: self.load_balance.clone(), retries: 0 })
    }
}

struct BroadcastInvoker {
    url: RceUrl,
    directory: Arc<Directory>,
}

impl Invoker for BroadcastInvoker {
    fn url(&self) -> &RceUrl {
        &self.url
    }
    fn interface(&self) -> &str {
        ""
    }
    fn is_available(&self) -> bool {
        !self.directory.is_destroyed()
    }
    fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_> {
        Box::pin(async move {
            let invokers = self.directory.list(&invocation);
            let mut last_ok = None;
            let mut last_err = None;
            for invoker in invokers.iter().filter(|i| i.is_available()) {
                match invoker.invoke(clone_invocation(&invocation)).await {
                    Ok(result) => last_ok = Some(result),
                    Err(err) => last_err = Some(err),
                }
            }
            last_ok.ok_or_else(|| {
                last_err.unwrap_or(RpcError::RpcFailure {
                    kind: RpcFailureKind::Network,
                    message: "no available invoker to broadcast to".to_string(),
                })
            })
        })
    }
    fn destroy(&self) {
        self.directory.destroy();
    }
}

/// Calls every available invoker, returning the last successful result (or
/// the last error if none succeeded).
pub struct Broadcast;

impl Cluster for Broadcast {
    fn join(&self, directory: Arc<Directory>) -> Arc<dyn Invoker> {
        let url = directory.consumer_url().clone();
        Arc::new(BroadcastInvoker { url, directory })
    }
}

struct MergeableInvoker {
    url: RceUrl,
    directory: Arc<Directory>,
}

impl Invoker for MergeableInvoker {
    fn url(&self) -> &RceUrl {
        &self.url
    }
    fn interface(&self) -> &str {
        ""
    }
    fn is_available(&self) -> bool {
        !self.directory.is_destroyed()
    }
    fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_> {
        Box::pin(async move {
            let invokers = self.directory.list(&invocation);
            let mut results = Vec::new();
            let mut last_err = None;
            for invoker in invokers.iter().filter(|i| i.is_available()) {
                match invoker.invoke(clone_invocation(&invocation)).await {
                    Ok(result) => results.push(result),
                    Err(err) => last_err = Some(err),
                }
            }
            if results.is_empty() {
                return Err(last_err.unwrap_or(RpcError::RpcFailure {
                    kind: RpcFailureKind::Network,
                    message: "no group produced a result to merge".to_string(),
                }));
            }
            // No generic per-type merge-function registry exists (the real
            // protocol's `Merger<T>` extension point is out of scope here);
            // attachments from every group are folded together and the last
            // group's value wins, the same compromise `Broadcast` makes.
            let merged_attachments: BTreeMap<String, String> = results.iter().flat_map(|r| r.attachments().clone()).collect();
            let last = results.pop().expect("checked non-empty above");
            let mut merged = RpcResult::new(last.into_value());
            for (key, value) in merged_attachments {
                merged = merged.with_attachment(key, value);
            }
            Ok(merged)
        })
    }
    fn destroy(&self) {
        self.directory.destroy();
    }
}

/// Calls every available invoker across every group and merges their
/// results, the multi-group fan-in policy `select_cluster` uses whenever a
/// consumer's `group` parameter names more than one group (or `*`).
pub struct MergeableCluster;

impl MergeableCluster {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MergeableCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl Cluster for MergeableCluster {
    fn join(&self, directory: Arc<Directory>) -> Arc<dyn Invoker> {
        let url = directory.consumer_url().clone();
        Arc::new(MergeableInvoker { url, directory })
    }
}

/// Wraps another cluster policy, short-circuiting to a registered mock
/// invoker when the referring URL's `mock` parameter is truthy (or `force`).
pub struct MockCluster {
    inner: Arc<dyn Cluster>,
    mock: Arc<dyn Invoker>,
    force: bool,
}

impl MockCluster {
    pub fn new(inner: Arc<dyn Cluster>, mock: Arc<dyn Invoker>, mock_param: &str) -> Self {
        Self { inner, mock, force: mock_param == "force" }
    }
}

impl Cluster for MockCluster {
    fn join(&self, directory: Arc<Directory>) -> Arc<dyn Invoker> {
        if self.force {
            return self.mock.clone();
        }
        self.inner.join(directory)
    }
}
