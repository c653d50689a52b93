//! rce — a pluggable, self-adaptive extension registry with a
//! registry-aware RPC integration layer.
//!
//! This facade crate re-exports the sub-crates through a single dependency:
//!
//! ```ignore
//! use rce::prelude::*;
//! ```
//!
//! # Sub-crates
//!
//! | Crate         | Purpose                                              |
//! |---------------|-------------------------------------------------------|
//! | `rce-url`     | Canonical endpoint descriptor threaded everywhere      |
//! | `rce-core`    | Extension registry, method dispatcher, bean container  |
//! | `rce-macros`  | `#[extension_point]`, `#[derive_dispatch]`, `#[bean]`, ... |
//! | `rce-rpc`     | Invoker/Exporter, Directory, Cluster, Registry Protocol (feature `rpc`, default on) |

// The proc macros use `proc-macro-crate` to detect whether the user depends
// on `rce` (facade) or the individual crates, and generate the correct paths.
pub extern crate rce_core;
pub extern crate rce_macros;

#[cfg(feature = "rpc")]
pub extern crate rce_rpc;

pub use rce_core::*;
pub use rce_url;

/// Unified prelude — import everything with `use rce::prelude::*`.
pub mod prelude {
    pub use rce_core::prelude::*;

    #[cfg(feature = "rpc")]
    pub use rce_rpc::prelude::*;
}
