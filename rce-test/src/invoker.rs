use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use rce_rpc::{Invocation, InvokeFuture, Invoker, RpcError, RpcFailureKind, RpcResult};
use rce_url::RceUrl;

/// A scripted response for one [`MockInvoker::invoke`] call.
pub enum Outcome {
    /// Succeed, returning the invocation's method name as the result value.
    Echo,
    /// Fail with the given failure kind.
    Fail(RpcFailureKind, String),
}

/// A configurable [`Invoker`] double for directory/cluster/registry-protocol
/// tests. Outcomes are consumed in FIFO order from a queue; once drained,
/// every further call succeeds via [`Outcome::Echo`].
pub struct MockInvoker {
    url: RceUrl,
    interface: String,
    alive: AtomicBool,
    calls: AtomicU32,
    outcomes: Mutex<VecDeque<Outcome>>,
}

impl MockInvoker {
    pub fn new(url: RceUrl, interface: impl Into<String>) -> Self {
        Self {
            url,
            interface: interface.into(),
            alive: AtomicBool::new(true),
            calls: AtomicU32::new(0),
            outcomes: Mutex::new(VecDeque::new()),
        }
    }

    /// Fail the first `n` calls with `kind`, then fall back to echoing.
    pub fn failing_first(url: RceUrl, interface: impl Into<String>, n: u32, kind: RpcFailureKind) -> Self {
        let mock = Self::new(url, interface);
        mock.queue_n(n, || Outcome::Fail(kind, "mock failure".into()));
        mock
    }

    /// Number of `invoke` calls observed so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Push one more scripted outcome onto the back of the queue.
    pub fn queue(&self, outcome: Outcome) {
        self.outcomes.lock().expect("mock invoker lock poisoned").push_back(outcome);
    }

    fn queue_n(&self, n: u32, mut make: impl FnMut() -> Outcome) {
        let mut outcomes = self.outcomes.lock().expect("mock invoker lock poisoned");
        for _ in 0..n {
            outcomes.push_back(make());
        }
    }
}

impl Invoker for MockInvoker {
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcomes.lock().expect("mock invoker lock poisoned").pop_front();
        Box::pin(async move {
            match outcome {
                Some(Outcome::Fail(kind, message)) => Err(RpcError::RpcFailure { kind, message }),
                Some(Outcome::Echo) | None => {
                    Ok(RpcResult::new(Box::new(invocation.method_name().to_string()) as Box<dyn Any + Send>))
                }
            }
        })
    }

    fn destroy(&self) {
        self.alive.store(false, Ordering::Release);
    }
}
