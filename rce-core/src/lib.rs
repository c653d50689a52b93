pub mod beans;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod manifest;
pub mod prelude;
pub mod settings;

pub use beans::{AsyncBean, Bean, BeanContext, BeanError, BeanRegistry, BeanState, Producer};
pub use dispatch::{Dispatched, Dispatcher, dispatcher_for, no_such_method, no_such_property};
pub use error::CoreError;
pub use extension::{
    ActivationDescriptor, ExtensionContext, ExtensionDirectory, ExtensionFactory, ExtensionLoader,
    ExtensionPoint, HasUrl, WrapperFactory, resolve_adaptive_name,
};
pub use manifest::{ManifestEntry, parse_manifest, register_from_manifest};
pub use settings::RuntimeSettings;

pub use rce_url::{RceUrl, UrlError};
