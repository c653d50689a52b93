use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rce_url::RceUrl;

use crate::error::RpcError;
use crate::invoker::Invoker;
use crate::registry::{LocalRegistry, NotifyListener};

struct ExporterState {
    url: RceUrl,
    registered: bool,
}

/// Handle returned by `registry_protocol::export`. Dropping it does not tear
/// anything down — callers must call [`Exporter::unexport`] explicitly,
/// mirroring the teacher's explicit-shutdown `Guard` types over
/// drop-based cleanup for anything with network side effects.
///
/// The exported URL and registration flag live behind a lock so a later
/// override push can swap them in place (`reexport`) without invalidating
/// the `Arc<Exporter>` handle the original caller holds.
pub struct Exporter {
    cache_key: String,
    state: RwLock<ExporterState>,
    invoker: Arc<dyn Invoker>,
    registry: LocalRegistry,
    override_listener: Option<Arc<dyn NotifyListener>>,
    shutdown_timeout: Duration,
    unexported: AtomicBool,
}

impl Exporter {
    pub fn new(
        cache_key: impl Into<String>,
        url: RceUrl,
        invoker: Arc<dyn Invoker>,
        registry: LocalRegistry,
        override_listener: Option<Arc<dyn NotifyListener>>,
        registered: bool,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            cache_key: cache_key.into(),
            state: RwLock::new(ExporterState { url, registered }),
            invoker,
            registry,
            override_listener,
            shutdown_timeout,
            unexported: AtomicBool::new(false),
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn url(&self) -> RceUrl {
        self.state.read().expect("exporter lock poisoned").url.clone()
    }

    pub fn registered(&self) -> bool {
        self.state.read().expect("exporter lock poisoned").registered
    }

    pub fn invoker(&self) -> &Arc<dyn Invoker> {
        &self.invoker
    }

    /// Called by the registry protocol when a pushed override recomputes the
    /// effective URL. Re-registers at the new URL (unregistering the old one
    /// first) when `registered` stays or becomes true; if the service goes
    /// from registered to unregistered, the underlying invoker is destroyed
    /// after `shutdown_timeout`, the same grace period `unexport` gives
    /// in-flight calls, and this exporter is marked unexported so a later
    /// explicit `unexport()` call is a no-op rather than double-tearing-down.
    ///
    /// Does nothing if already unexported.
    pub(crate) fn reexport(&self, new_url: RceUrl, new_registered: bool) -> Result<(), RpcError> {
        if self.unexported.load(Ordering::Acquire) {
            return Ok(());
        }

        let (old_url, old_registered) = {
            let mut state = self.state.write().expect("exporter lock poisoned");
            let old_url = state.url.clone();
            let old_registered = state.registered;
            state.url = new_url.clone();
            state.registered = new_registered;
            (old_url, old_registered)
        };

        if old_registered {
            self.registry.unregister(&old_url)?;
        }
        if new_registered {
            self.registry.register(new_url)?;
        }

        if old_registered && !new_registered {
            self.unexported.store(true, Ordering::Release);
            let invoker = self.invoker.clone();
            let delay = self.shutdown_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                invoker.destroy();
            });
        }

        Ok(())
    }

    /// Ordered teardown: unregister, drop the override subscription, then
    /// after `shutdown_timeout` destroy the underlying invoker on a detached
    /// task so in-flight calls have a chance to finish.
    ///
    /// Idempotent: a second call (or a call after `reexport` already retired
    /// this exporter) is a no-op.
    pub async fn unexport(self: Arc<Self>) -> Result<(), RpcError> {
        if self.unexported.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let (url, registered) = {
            let state = self.state.read().expect("exporter lock poisoned");
            (state.url.clone(), state.registered)
        };

        if registered {
            self.registry.unregister(&url)?;
        }
        if let Some(listener) = &self.override_listener {
            let listener_clone: Arc<dyn NotifyListener> = listener.clone();
            self.registry.unsubscribe(&url, &listener_clone)?;
        }

        let invoker = self.invoker.clone();
        let delay = self.shutdown_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            invoker.destroy();
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{Invocation, RpcResult};
    use crate::invoker::InvokeFuture;
    use std::str::FromStr;

    struct Noop;
    impl Invoker for Noop {
        fn url(&self) -> &RceUrl {
            unreachable!()
        }
        fn interface(&self) -> &str {
            ""
        }
        fn is_available(&self) -> bool {
            true
        }
        fn invoke(&self, _invocation: Invocation) -> InvokeFuture<'_> {
            Box::pin(async move { Ok(RpcResult::new(Box::new(()))) })
        }
        fn destroy(&self) {}
    }

    fn test_url() -> RceUrl {
        RceUrl::from_str("rce://127.0.0.1:20880/com.example.Echo?group=g&version=1.0").unwrap()
    }

    #[tokio::test]
    async fn unexport_unregisters_and_is_idempotent() {
        let registry = LocalRegistry::new();
        let url = test_url();
        registry.register(url.clone()).unwrap();

        let exporter = Arc::new(Exporter::new(
            url.service_key(),
            url.clone(),
            Arc::new(Noop),
            registry.clone(),
            None,
            true,
            Duration::from_millis(1),
        ));

        assert_eq!(registry.lookup(&url).len(), 1);
        exporter.clone().unexport().await.unwrap();
        assert_eq!(registry.lookup(&url).len(), 0);

        // Second call must not error.
        exporter.unexport().await.unwrap();
    }

    #[tokio::test]
    async fn reexport_swaps_url_in_place_and_reregisters() {
        let registry = LocalRegistry::new();
        let url = test_url();
        registry.register(url.clone()).unwrap();

        let exporter = Arc::new(Exporter::new(
            url.service_key(),
            url.clone(),
            Arc::new(Noop),
            registry.clone(),
            None,
            true,
            Duration::from_millis(1),
        ));

        let reweighted = url.with_param("weight", "200");
        exporter.reexport(reweighted.clone(), true).unwrap();

        assert_eq!(exporter.url(), reweighted);
        let snapshot = registry.lookup(&reweighted);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].param("weight", ""), "200");
    }

    #[tokio::test]
    async fn reexport_to_unregistered_retires_the_exporter() {
        let registry = LocalRegistry::new();
        let url = test_url();
        registry.register(url.clone()).unwrap();

        let exporter = Arc::new(Exporter::new(
            url.service_key(),
            url.clone(),
            Arc::new(Noop),
            registry.clone(),
            None,
            true,
            Duration::from_millis(1),
        ));

        exporter.reexport(url.clone(), false).unwrap();
        assert_eq!(registry.lookup(&url).len(), 0);

        // Already retired by the reexport; explicit unexport is a no-op.
        exporter.clone().unexport().await.unwrap();
    }
}
