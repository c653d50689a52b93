use std::fmt;

use rce_core::CoreError;

/// Errors raised by the registry protocol, cluster, and invoker layers.
///
/// Mirrors [`CoreError`]'s hand-rolled `Display`/`Debug`/`std::error::Error`
/// style — no `thiserror`, no `anyhow`.
#[derive(Debug)]
pub enum RpcError {
    /// No exporter is bound to the given cache key.
    ExportMissing { cache_key: String },
    /// The registry stand-in rejected a `register`/`unregister` call.
    RegistrationFailed { url: String, reason: String },
    /// The registry or dynamic-config stand-in rejected a `subscribe` call.
    SubscriptionFailed { key: String, reason: String },
    /// A call through an `Invoker` failed.
    RpcFailure { kind: RpcFailureKind, message: String },
    /// Delegation into the extension registry / dispatcher core.
    Core(CoreError),
}

/// Sub-kinds of [`RpcError::RpcFailure`], used by `failover` to decide
/// whether a failure is retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcFailureKind {
    Timeout,
    Network,
    ServerSide,
    Forbidden,
    Serialization,
}

impl RpcFailureKind {
    /// `failover` retries `Timeout` and `Network` failures; everything else
    /// is treated as a non-retryable application-level failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, RpcFailureKind::Timeout | RpcFailureKind::Network)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::ExportMissing { cache_key } => {
                write!(f, "no exporter bound for cache key '{cache_key}'")
            }
            RpcError::RegistrationFailed { url, reason } => {
                write!(f, "registry rejected '{url}': {reason}")
            }
            RpcError::SubscriptionFailed { key, reason } => {
                write!(f, "subscription failed for '{key}': {reason}")
            }
            RpcError::RpcFailure { kind, message } => {
                write!(f, "rpc failure ({kind:?}): {message}")
            }
            RpcError::Core(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Core(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CoreError> for RpcError {
    fn from(err: CoreError) -> Self {
        RpcError::Core(err)
    }
}

/// Bulk `From<T> for RpcError` generator, mirroring `rce_core::map_error!`.
#[macro_export]
macro_rules! map_rpc_error {
    ($($src:ty => $variant:ident { $($field:ident),* }),* $(,)?) => {
        $(
            impl From<$src> for $crate::error::RpcError {
                fn from(err: $src) -> Self {
                    $crate::error::RpcError::$variant {
                        $($field: err.$field.into()),*
                    }
                }
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_are_stable() {
        let err = RpcError::ExportMissing { cache_key: "svc/1.0".into() };
        assert_eq!(err.to_string(), "no exporter bound for cache key 'svc/1.0'");
    }

    #[test]
    fn retryable_kinds() {
        assert!(RpcFailureKind::Timeout.is_retryable());
        assert!(RpcFailureKind::Network.is_retryable());
        assert!(!RpcFailureKind::Forbidden.is_retryable());
        assert!(!RpcFailureKind::ServerSide.is_retryable());
        assert!(!RpcFailureKind::Serialization.is_retryable());
    }

    #[test]
    fn core_error_wraps_and_sources() {
        use std::error::Error;
        let core = CoreError::NoSuchExtension { extension_point: "Cluster".into(), name: "x".into() };
        let wrapped: RpcError = core.into();
        assert!(wrapped.source().is_some());
    }
}
