use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rce_core::dispatch::Dispatcher;
use rce_url::RceUrl;

use crate::error::{RpcError, RpcFailureKind};
use crate::invocation::{Invocation, RpcResult};

pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<RpcResult, RpcError>> + Send + 'a>>;

/// The single call primitive every concrete invoker implements.
///
/// Stateful: carries the URL it advertises, a liveness flag, and the service
/// interface it serves. Once destroyed, `is_available()` is `false` forever
/// and `invoke` always fails.
pub trait Invoker: Send + Sync {
    fn url(&self) -> &RceUrl;
    fn interface(&self) -> &str;
    fn is_available(&self) -> bool;
    fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_>;
    fn destroy(&self);
}

/// Invokes through a [`Dispatcher`] into a local, in-process service object —
/// the proxy-wrapping invoker used by `export()`.
pub struct ProxyInvoker {
    url: RceUrl,
    interface: String,
    target: Arc<dyn std::any::Any + Send + Sync>,
    dispatcher: Arc<dyn Dispatcher>,
    alive: AtomicBool,
}

impl ProxyInvoker {
    pub fn new(
        url: RceUrl,
        interface: impl Into<String>,
        target: Arc<dyn std::any::Any + Send + Sync>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self { url, interface: interface.into(), target, dispatcher, alive: AtomicBool::new(true) }
    }
}

impl Invoker for ProxyInvoker {
    fn url(&self) -> &RceUrl {
        &self.url
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn is_available(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_> {
        Box::pin(async move {
            if !self.is_available() {
                return Err(RpcError::RpcFailure {
                    kind: RpcFailureKind::Network,
                    message: "invoker destroyed".to_string(),
                });
            }
            let method_name = invocation.method_name().to_string();
            let args = invocation.into_arguments();
            let value = self
                .dispatcher
                .invoke_method(self.target.as_ref(), &method_name, args)
                .map_err(RpcError::Core)?;
            Ok(RpcResult::new(value))
        })
    }

    fn destroy(&self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Stands in for a real wire transport (Non-goal (i)): routes invocations to
/// another, directly-held invoker in the same process instead of serializing
/// over a socket.
pub struct LocalTransportInvoker {
    url: RceUrl,
    interface: String,
    delegate: Arc<dyn Invoker>,
    alive: AtomicBool,
}

impl LocalTransportInvoker {
    pub fn new(url: RceUrl, interface: impl Into<String>, delegate: Arc<dyn Invoker>) -> Self {
        Self { url, interface: interface.into(), delegate, alive: AtomicBool::new(true) }
    }
}

impl Invoker for LocalTransportInvoker {
    fn url(&self) -> &RceUrl {
        &self.url
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn is_available(&self) -> bool {
        self.alive.load(Ordering::Acquire) && self.delegate.is_available()
    }

    fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_> {
        Box::pin(async move {
            if !self.alive.load(Ordering::Acquire) {
                return Err(RpcError::RpcFailure {
                    kind: RpcFailureKind::Network,
                    message: "transport invoker destroyed".to_string(),
                });
            }
            self.delegate.invoke(invocation).await
        })
    }

    fn destroy(&self) {
        self.alive.store(false, Ordering::Release);
        self.delegate.destroy();
    }
}

/// Pre/post behavior wrapped around another invoker, grounded in the
/// teacher's `Interceptor::around` pattern.
pub trait Filter: Send + Sync {
    fn around<'a>(&'a self, invocation: Invocation, next: &'a dyn Invoker) -> InvokeFuture<'a> {
        next.invoke(invocation)
    }
}

pub struct FilterInvoker {
    url: RceUrl,
    interface: String,
    inner: Arc<dyn Invoker>,
    filter: Arc<dyn Filter>,
}

impl FilterInvoker {
    pub fn new(inner: Arc<dyn Invoker>, filter: Arc<dyn Filter>) -> Self {
        let url = inner.url().clone();
        let interface = inner.interface().to_string();
        Self { url, interface, inner, filter }
    }
}

impl Invoker for FilterInvoker {
    fn url(&self) -> &RceUrl {
        &self.url
    }

    fn interface(&self) -> &str {
        &self.interface
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn invoke(&self, invocation: Invocation) -> InvokeFuture<'_> {
        self.filter.around(invocation, self.inner.as_ref())
    }

    fn destroy(&self) {
        self.inner.destroy();
    }
}
