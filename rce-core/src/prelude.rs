//! Import everything you need to register and resolve extension points with
//! a single `use`.
//!
//! ```ignore
//! use rce_core::prelude::*;
//!
//! #[extension_point(default = "failover")]
//! pub trait Cluster: Send + Sync {
//!     // #[adaptive] methods must return Result<_, CoreError> — the
//!     // generated dispatch body resolves the name and forwards with `?`.
//!     #[adaptive(keys = "cluster")]
//!     fn join(&self, url: &RceUrl) -> Result<String, CoreError>;
//! }
//! ```

// ── Macros (from rce-macros) ─────────────────────────────────────────────

pub use rce_macros::{adaptive, derive_dispatch, extension_point};

// Bean / DI macros, kept from the teacher's dependency-injection story.
pub use rce_macros::bean;
pub use rce_macros::producer;
pub use rce_macros::Bean;
pub use rce_macros::BeanState;

// ── Core types (from rce-core) ───────────────────────────────────────────

pub use crate::beans::{AsyncBean, Bean as BeanTrait, BeanContext, BeanError, BeanRegistry, Producer as ProducerTrait};
pub use crate::dispatch::{Dispatched, Dispatcher, dispatcher_for};
pub use crate::error::CoreError;
pub use crate::extension::{
    ActivationDescriptor, ExtensionContext, ExtensionDirectory, ExtensionFactory, ExtensionLoader,
    ExtensionPoint, HasUrl, WrapperFactory, resolve_adaptive_name,
};
pub use crate::manifest::{ManifestEntry, parse_manifest, register_from_manifest};
pub use crate::settings::RuntimeSettings;

pub use rce_url::RceUrl;
