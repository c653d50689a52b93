//! The extension registry: named, lazily-constructed singletons per
//! capability trait, with adaptive (URL-driven) dispatch and activation-based
//! auto-discovery.
//!
//! This is the Rust-idiomatic reading of a classpath-scanning SPI container:
//! there is no classloader, so registration is an explicit, compiled step
//! (`ExtensionLoader::register`) rather than a side effect of dropping a file
//! on a resource path. What survives from that model is the *shape* of the
//! contract — named singletons, an adaptive default, wrapper decoration, and
//! URL-keyed activation — realized with `TypeId`-indexed process-wide caches
//! the same way [`crate::beans`] caches bean instances.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use rce_url::RceUrl;

use crate::error::CoreError;

/// Marker trait for capability traits that can be resolved through the
/// extension registry. Implement it (usually via `#[extension_point]`) for
/// the trait object type, e.g. `impl ExtensionPoint for dyn Protocol {}`.
pub trait ExtensionPoint: Send + Sync + 'static {}

/// Lets an adaptive method locate the routing `RceUrl` from an argument that
/// isn't itself a `&RceUrl`.
pub trait HasUrl {
    fn url(&self) -> &RceUrl;
}

/// A factory that builds one named instance of extension point `T`.
pub type ExtensionFactory<T> =
    Arc<dyn Fn(&ExtensionContext) -> Result<Arc<T>, CoreError> + Send + Sync>;

/// A wrapper that decorates an already-built instance of `T`.
pub type WrapperFactory<T> = Arc<dyn Fn(Arc<T>) -> Arc<T> + Send + Sync>;

/// Declares when an extension auto-activates during [`ExtensionLoader::get_activated`].
#[derive(Debug, Clone, Default)]
pub struct ActivationDescriptor {
    /// Empty matches every group.
    pub groups: Vec<String>,
    /// Empty always matches; otherwise the url must carry a non-empty
    /// parameter whose key equals, or ends with `.<value>`, one of these.
    pub values: Vec<String>,
}

impl ActivationDescriptor {
    pub fn always() -> Self {
        Self::default()
    }

    pub fn matches(&self, url: &RceUrl, group: &str) -> bool {
        let group_ok = self.groups.is_empty() || self.groups.iter().any(|g| g == group);
        if !group_ok {
            return false;
        }
        if self.values.is_empty() {
            return true;
        }
        self.values.iter().any(|value| {
            url.params()
                .any(|(k, v)| !v.is_empty() && (k == value || k.ends_with(&format!(".{value}"))))
        })
    }
}

/// Context handed to every extension factory, used to pull in other
/// capabilities' adaptive instances — the injection step of the registry.
pub struct ExtensionContext {
    directory: &'static ExtensionDirectory,
}

impl ExtensionContext {
    fn new() -> Self {
        Self { directory: ExtensionDirectory::global() }
    }

    /// Resolve another extension point's adaptive instance. Fails with
    /// [`CoreError::NotAnExtensionPoint`] if nobody has called
    /// `loader_for::<T2>()` yet, and with [`CoreError::NoAdaptiveMethod`] if
    /// `T2` has no registered adaptive factory.
    pub fn adaptive<T: ?Sized + ExtensionPoint>(&self) -> Result<Arc<T>, CoreError> {
        self.directory.loader_for_checked::<T>()?.get_adaptive()
    }

    /// Resolve a named instance of another extension point.
    pub fn extension<T: ?Sized + ExtensionPoint>(&self, name: &str) -> Result<Arc<T>, CoreError> {
        self.directory.loader_for_checked::<T>()?.get(name)
    }
}

/// Process-wide map from extension-point `TypeId` to its [`ExtensionLoader`].
///
/// Mirrors the teacher's `BeanContext`/`MetaRegistry` type-erasure pattern:
/// the map stores `Box<dyn Any + Send + Sync>` holding an `Arc<ExtensionLoader<T>>`
/// (always `Sized` even when `T` is a trait object), downcast back by the
/// caller's own static type parameter.
pub struct ExtensionDirectory {
    loaders: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

static DIRECTORY: OnceLock<ExtensionDirectory> = OnceLock::new();

impl ExtensionDirectory {
    /// The single process-wide directory instance.
    pub fn global() -> &'static ExtensionDirectory {
        DIRECTORY.get_or_init(|| ExtensionDirectory { loaders: RwLock::new(HashMap::new()) })
    }

    /// Return `T`'s loader, creating an empty one on first call. Use this at
    /// startup/registration time, when `T` is known statically.
    pub fn loader_for<T: ?Sized + ExtensionPoint>(&self) -> Arc<ExtensionLoader<T>> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.loaders.read().expect("extension directory lock poisoned").get(&type_id) {
            if let Some(loader) = existing.downcast_ref::<Arc<ExtensionLoader<T>>>() {
                return loader.clone();
            }
        }
        let mut loaders = self.loaders.write().expect("extension directory lock poisoned");
        let boxed = loaders
            .entry(type_id)
            .or_insert_with(|| Box::new(Arc::new(ExtensionLoader::<T>::new())));
        boxed
            .downcast_ref::<Arc<ExtensionLoader<T>>>()
            .expect("extension loader type mismatch for this TypeId")
            .clone()
    }

    /// Return `T`'s loader, failing if nobody has registered one yet. This is
    /// the dynamic path used during injection, where only a `TypeId` is known
    /// at the call site (the caller still supplies `T` to downcast the
    /// type-erased entry, but does not get to silently create one).
    pub fn loader_for_checked<T: ?Sized + ExtensionPoint>(&self) -> Result<Arc<ExtensionLoader<T>>, CoreError> {
        let type_id = TypeId::of::<T>();
        self.loaders
            .read()
            .expect("extension directory lock poisoned")
            .get(&type_id)
            .and_then(|boxed| boxed.downcast_ref::<Arc<ExtensionLoader<T>>>())
            .cloned()
            .ok_or_else(|| CoreError::NotAnExtensionPoint { type_name: std::any::type_name::<T>().to_string() })
    }
}

struct ActivationEntry {
    order: usize,
    descriptor: ActivationDescriptor,
}

/// Named, lazily-constructed singletons for one extension point `T`.
pub struct ExtensionLoader<T: ?Sized + ExtensionPoint> {
    type_name: String,
    default_name: RwLock<Option<String>>,
    factories: RwLock<HashMap<String, ExtensionFactory<T>>>,
    wrappers: RwLock<Vec<WrapperFactory<T>>>,
    activations: RwLock<HashMap<String, ActivationEntry>>,
    activation_seq: std::sync::atomic::AtomicUsize,
    instances: RwLock<HashMap<String, Arc<T>>>,
    adaptive_factory: RwLock<Option<ExtensionFactory<T>>>,
    adaptive_instance: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized + ExtensionPoint> ExtensionLoader<T> {
    /// Construct a standalone loader not registered with any
    /// [`ExtensionDirectory`] — mainly useful in tests; production code
    /// should go through `ExtensionDirectory::global().loader_for::<T>()` so
    /// all consumers share the same singleton cache.
    pub(crate) fn new() -> Self {
        Self {
            type_name: std::any::type_name::<T>().to_string(),
            default_name: RwLock::new(None),
            factories: RwLock::new(HashMap::new()),
            wrappers: RwLock::new(Vec::new()),
            activations: RwLock::new(HashMap::new()),
            activation_seq: std::sync::atomic::AtomicUsize::new(0),
            instances: RwLock::new(HashMap::new()),
            adaptive_factory: RwLock::new(None),
            adaptive_instance: RwLock::new(None),
        }
    }

    /// Register a named implementation. Later calls with the same name
    /// replace the factory (and invalidate any cached instance under it).
    pub fn register(&self, name: impl Into<String>, factory: ExtensionFactory<T>) {
        let name = name.into();
        self.factories.write().expect("lock").insert(name.clone(), factory);
        self.instances.write().expect("lock").remove(&name);
    }

    /// Declare `name` as the default used when `get("true")` is called.
    pub fn register_default(&self, name: impl Into<String>) {
        *self.default_name.write().expect("lock") = Some(name.into());
    }

    pub fn default_name(&self) -> Option<String> {
        self.default_name.read().expect("lock").clone()
    }

    /// Register a factory producing the adaptive instance for `get_adaptive()`.
    pub fn register_adaptive(&self, factory: ExtensionFactory<T>) {
        *self.adaptive_factory.write().expect("lock") = Some(factory);
        *self.adaptive_instance.write().expect("lock") = None;
    }

    /// Register a wrapper applied, in registration order, to every newly
    /// constructed named instance. Wrapper ordering across distinct
    /// `register_wrapper` calls is otherwise unspecified.
    pub fn register_wrapper(&self, wrapper: WrapperFactory<T>) {
        self.wrappers.write().expect("lock").push(wrapper);
    }

    /// Declare when `name` auto-activates for [`Self::get_activated`].
    pub fn register_activation(&self, name: impl Into<String>, descriptor: ActivationDescriptor) {
        let order = self.activation_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.activations
            .write()
            .expect("lock")
            .insert(name.into(), ActivationEntry { order, descriptor });
    }

    fn resolve_name(&self, name: &str) -> Result<String, CoreError> {
        if name == "true" {
            self.default_name().ok_or_else(|| CoreError::NoSuchExtension {
                extension_point: self.type_name.clone(),
                name: name.to_string(),
            })
        } else {
            Ok(name.to_string())
        }
    }

    /// Get (constructing and wrapping on first call) the named singleton.
    pub fn get(&self, name: &str) -> Result<Arc<T>, CoreError> {
        let resolved = self.resolve_name(name)?;

        if let Some(found) = self.instances.read().expect("lock").get(&resolved) {
            return Ok(found.clone());
        }

        let mut instances = self.instances.write().expect("lock");
        if let Some(found) = instances.get(&resolved) {
            return Ok(found.clone());
        }

        let factory = self
            .factories
            .read()
            .expect("lock")
            .get(&resolved)
            .cloned()
            .ok_or_else(|| CoreError::NoSuchExtension {
                extension_point: self.type_name.clone(),
                name: resolved.clone(),
            })?;

        let ctx = ExtensionContext::new();
        let mut built = factory(&ctx)?;
        for wrapper in self.wrappers.read().expect("lock").iter() {
            built = wrapper(built);
        }
        instances.insert(resolved, built.clone());
        Ok(built)
    }

    /// Get (constructing on first call) the adaptive singleton.
    pub fn get_adaptive(&self) -> Result<Arc<T>, CoreError> {
        if let Some(existing) = self.adaptive_instance.read().expect("lock").clone() {
            return Ok(existing);
        }
        let mut slot = self.adaptive_instance.write().expect("lock");
        if let Some(existing) = slot.clone() {
            return Ok(existing);
        }
        let factory = self
            .adaptive_factory
            .read()
            .expect("lock")
            .clone()
            .ok_or_else(|| CoreError::NoAdaptiveMethod { type_name: self.type_name.clone() })?;
        let ctx = ExtensionContext::new();
        let instance = factory(&ctx)?;
        *slot = Some(instance.clone());
        Ok(instance)
    }

    /// Activated extensions for `url`/`group`, ordered by declaration order
    /// then name, spliced with any user override from the `key` url parameter.
    pub fn get_activated(&self, url: &RceUrl, key: &str, group: &str) -> Result<Vec<Arc<T>>, CoreError> {
        let mut auto: Vec<(usize, String)> = {
            let activations = self.activations.read().expect("lock");
            activations
                .iter()
                .filter(|(_, entry)| entry.descriptor.matches(url, group))
                .map(|(name, entry)| (entry.order, name.clone()))
                .collect()
        };
        auto.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let mut auto_names: Vec<String> = auto.into_iter().map(|(_, name)| name).collect();

        let raw = url.param(key, "");
        let requested: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();

        for name in &requested {
            if let Some(excluded) = name.strip_prefix('-') {
                auto_names.retain(|n| n != excluded);
            }
        }

        if requested.is_empty() {
            return auto_names.iter().map(|n| self.get(n)).collect();
        }

        let mut result = Vec::new();
        let mut spliced_default = false;
        for name in &requested {
            if name.starts_with('-') {
                continue;
            }
            if *name == "default" {
                if !spliced_default {
                    for auto_name in &auto_names {
                        result.push(self.get(auto_name)?);
                    }
                    spliced_default = true;
                }
                continue;
            }
            result.push(self.get(name)?);
        }
        Ok(result)
    }
}

/// Resolve the extension name for an adaptive method call: the first
/// non-empty of `keys` read from `url`, else `default_key`, else the
/// loader's declared default name.
pub fn resolve_adaptive_name(
    url: &RceUrl,
    method: &str,
    keys: &[&str],
    default_key: &str,
    loader_default: Option<&str>,
) -> Result<String, CoreError> {
    for key in keys {
        if let Some(value) = url.param_opt(key) {
            if !value.is_empty() {
                return Ok(value.to_string());
            }
        }
    }
    if let Some(value) = url.param_opt(default_key) {
        if !value.is_empty() {
            return Ok(value.to_string());
        }
    }
    if let Some(default) = loader_default {
        return Ok(default.to_string());
    }
    Err(CoreError::AdaptiveNameUnresolved { method: method.to_string() })
}
