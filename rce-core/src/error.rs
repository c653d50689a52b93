//! Hand-rolled error type for the extension registry and method dispatcher.
//!
//! No `thiserror`/`anyhow` here, matching the rest of the workspace: a plain
//! enum with manual `Display`/`Debug`/`std::error::Error`, plus [`map_error!`]
//! for bulk `From` impls at the crates that sit above this one.

/// Errors raised by the extension registry, manifest parser, and method
/// dispatcher.
pub enum CoreError {
    /// A dynamic lookup asked the directory for a type it has no loader for.
    NotAnExtensionPoint { type_name: String },
    /// `ExtensionLoader::get` was asked for a name nobody registered.
    NoSuchExtension { extension_point: String, name: String },
    /// Two manifest entries gave the same name to different targets.
    DuplicateExtension { name: String },
    /// An adaptive method's generated body found no `&RceUrl` in its arguments.
    AdaptiveUrlMissing { method: String },
    /// `resolve_adaptive_name` exhausted every URL key and had no default.
    AdaptiveNameUnresolved { method: String },
    /// `get_adaptive()` was called on a loader with no registered adaptive factory.
    NoAdaptiveMethod { type_name: String },
    /// A generated adaptive dispatch hit a method with no `#[adaptive]` attribute.
    NonAdaptiveMethod { method: String },
    /// The method dispatcher has no entry for the requested method name.
    NoSuchMethod { type_name: String, method: String },
    /// The method dispatcher has no property accessor for the requested name.
    NoSuchProperty { type_name: String, property: String },
    /// The extension manifest text did not match the documented grammar.
    Manifest(String),
    /// A dependency-injection failure from the bean graph.
    Bean(crate::beans::BeanError),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::NotAnExtensionPoint { type_name } => {
                write!(f, "`{type_name}` is not a registered extension point")
            }
            CoreError::NoSuchExtension { extension_point, name } => {
                write!(f, "no extension named `{name}` registered for `{extension_point}`")
            }
            CoreError::DuplicateExtension { name } => {
                write!(f, "manifest declares `{name}` more than once for different targets")
            }
            CoreError::AdaptiveUrlMissing { method } => {
                write!(f, "adaptive method `{method}` found no `&RceUrl` argument")
            }
            CoreError::AdaptiveNameUnresolved { method } => {
                write!(f, "adaptive method `{method}` could not resolve an extension name from the url")
            }
            CoreError::NoAdaptiveMethod { type_name } => {
                write!(f, "`{type_name}` has no registered adaptive factory")
            }
            CoreError::NonAdaptiveMethod { method } => {
                write!(f, "`{method}` is not marked #[adaptive]")
            }
            CoreError::NoSuchMethod { type_name, method } => {
                write!(f, "`{type_name}` has no method named `{method}`")
            }
            CoreError::NoSuchProperty { type_name, property } => {
                write!(f, "`{type_name}` has no property named `{property}`")
            }
            CoreError::Manifest(msg) => write!(f, "malformed extension manifest: {msg}"),
            CoreError::Bean(err) => write!(f, "{err}"),
        }
    }
}

impl std::fmt::Debug for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for CoreError {}

impl From<crate::beans::BeanError> for CoreError {
    fn from(err: crate::beans::BeanError) -> Self {
        CoreError::Bean(err)
    }
}

/// Generate `From<E> for CoreError` implementations that map error types to
/// a specific `CoreError` variant carrying the source's message.
///
/// ```ignore
/// rce_core::map_error! {
///     std::io::Error => Manifest,
/// }
/// ```
#[macro_export]
macro_rules! map_error {
    ( $( $err_ty:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$err_ty> for $crate::CoreError {
                fn from(err: $err_ty) -> Self {
                    $crate::CoreError::$variant(err.to_string())
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_human_readable() {
        let err = CoreError::NoSuchExtension {
            extension_point: "Protocol".into(),
            name: "dubbo".into(),
        };
        assert_eq!(err.to_string(), "no extension named `dubbo` registered for `Protocol`");
    }

    #[test]
    fn bean_error_wraps_through_display() {
        let bean_err = crate::beans::BeanError::DuplicateBean { type_name: "Foo".into() };
        let core_err: CoreError = bean_err.into();
        assert!(core_err.to_string().contains("Foo"));
    }
}
