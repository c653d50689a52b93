//! Method dispatcher: the sole reflective surface the invoker layer uses to
//! call into user service objects.
//!
//! There is no runtime bytecode synthesis here — `#[derive(Dispatch)]` (in
//! `rce-macros`) generates, at macro-expansion time, a concrete `Dispatcher`
//! implementation with an exact-match dispatch table for a type's declared
//! methods and property accessors. This module only owns the trait contract
//! and the process-wide cache that memoizes one dispatcher per type, the
//! same `TypeId`-keyed `OnceLock` pattern [`crate::extension::ExtensionDirectory`]
//! uses for extension singletons.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::CoreError;

/// Generated per-type dispatch table.
pub trait Dispatcher: Send + Sync + 'static {
    /// Methods the type declares directly (as opposed to inherited/default ones).
    fn declared_methods(&self) -> &'static [&'static str];
    /// Every method name reachable through [`Dispatcher::invoke_method`].
    fn all_methods(&self) -> &'static [&'static str];
    /// Read a property by bean-convention name (`foo` -> `foo()`/`.foo`).
    fn get_property(&self, target: &dyn Any, name: &str) -> Result<Box<dyn Any>, CoreError>;
    /// Write a property by bean-convention name.
    fn set_property(&self, target: &mut dyn Any, name: &str, value: Box<dyn Any>) -> Result<(), CoreError>;
    /// Invoke a method by exact name, with boxed argument values.
    fn invoke_method(
        &self,
        target: &dyn Any,
        name: &str,
        args: Vec<Box<dyn Any + Send>>,
    ) -> Result<Box<dyn Any + Send>, CoreError>;
}

/// Implemented by the `#[derive(Dispatch)]` macro: produces this type's
/// (shared, cacheable) dispatcher.
pub trait Dispatched: 'static {
    fn dispatcher() -> Arc<dyn Dispatcher>;
}

static DISPATCHERS: OnceLock<RwLock<HashMap<TypeId, Arc<dyn Dispatcher>>>> = OnceLock::new();

/// Return `T`'s dispatcher, building and caching it on first call.
pub fn dispatcher_for<T: Dispatched>() -> Arc<dyn Dispatcher> {
    let map = DISPATCHERS.get_or_init(|| RwLock::new(HashMap::new()));
    let type_id = TypeId::of::<T>();
    if let Some(existing) = map.read().expect("dispatcher cache lock poisoned").get(&type_id) {
        return existing.clone();
    }
    let mut write = map.write().expect("dispatcher cache lock poisoned");
    write.entry(type_id).or_insert_with(T::dispatcher).clone()
}

/// Helper for generated dispatchers: fail with [`CoreError::NoSuchMethod`].
pub fn no_such_method(type_name: &str, method: &str) -> CoreError {
    CoreError::NoSuchMethod { type_name: type_name.to_string(), method: method.to_string() }
}

/// Helper for generated dispatchers: fail with [`CoreError::NoSuchProperty`].
pub fn no_such_property(type_name: &str, property: &str) -> CoreError {
    CoreError::NoSuchProperty { type_name: type_name.to_string(), property: property.to_string() }
}
