//! RPC integration layer: composes the extension-registry-aware method
//! dispatcher (`rce-core`) with a registry/directory/cluster stack so a
//! consumer can `refer` a service by interface and URL, and a provider can
//! `export` one, without either side knowing about the other's location up
//! front.
//!
//! Non-goals (explicit, carried from the distilled spec): no real wire
//! transport (serialization/sockets), no real registry/dynamic-config client
//! (ZooKeeper, Nacos, etcd, ...). [`registry::LocalRegistry`] and
//! [`configurator::LocalDynamicConfig`] are in-process stand-ins that make
//! `registry_protocol`, `directory`, and `cluster` exercisable end to end.

pub mod cluster;
pub mod configurator;
pub mod directory;
pub mod error;
pub mod exporter;
pub mod invocation;
pub mod invoker;
pub mod registry;
pub mod registry_protocol;

pub use cluster::{Broadcast, Cluster, Failfast, Failover, LoadBalance, MergeableCluster, MockCluster, RoundRobinLoadBalance};
pub use configurator::{ConfigListener, LocalDynamicConfig};
pub use directory::{ConditionRouter, Directory, InvokerFactory, Router, TagRouter};
pub use error::{RpcError, RpcFailureKind};
pub use exporter::Exporter;
pub use invocation::{Invocation, RpcResult};
pub use invoker::{Filter, FilterInvoker, InvokeFuture, Invoker, LocalTransportInvoker, ProxyInvoker};
pub use registry::{LocalRegistry, NotifyListener};
pub use registry_protocol::{RegistryProtocol, REGISTRY_SERVICE_INTERFACE};

pub mod prelude {
    //! Re-exports of the types most call sites need: build a dispatcher with
    //! `#[derive_dispatch]`, wrap it in a `ProxyInvoker`, and pass it to
    //! `RegistryProtocol::export`/`refer`.
    pub use crate::cluster::{Cluster, Failover, RoundRobinLoadBalance};
    pub use crate::invocation::{Invocation, RpcResult};
    pub use crate::invoker::{Invoker, ProxyInvoker};
    pub use crate::registry::LocalRegistry;
    pub use crate::registry_protocol::RegistryProtocol;
    pub use crate::{RpcError, RpcFailureKind};
}
