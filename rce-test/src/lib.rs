//! Shared test doubles for the rce RPC framework.
//!
//! Mirrors `r2e-test`'s role as the teacher's shared test-utility crate, but
//! scoped to this core: [`LocalRegistry`]/[`LocalDynamicConfig`] (the
//! in-process registry/dynamic-config stand-ins, re-exported here for their
//! intended use as test fixtures) plus [`MockInvoker`], a scripted `Invoker`
//! double for directory/cluster/registry-protocol tests.

mod invoker;

pub use invoker::{MockInvoker, Outcome};
pub use rce_rpc::{LocalDynamicConfig, LocalRegistry};
