extern crate proc_macro;
use proc_macro::TokenStream;

pub(crate) mod bean_attr;
pub(crate) mod bean_derive;
pub(crate) mod bean_state_derive;
pub(crate) mod crate_path;
pub(crate) mod derive_dispatch;
pub(crate) mod extension_point;
pub(crate) mod producer_attr;

// ---------------------------------------------------------------------------
// Extension registry / adaptive dispatch
// ---------------------------------------------------------------------------

/// Attribute macro on a trait declaring it an extension point.
///
/// Generates `impl ExtensionPoint for dyn Trait` plus a `<Trait>Adaptive`
/// struct that resolves, per call, which named implementation to forward to
/// — see each `#[adaptive(keys = "...")]` method below.
///
/// ```ignore
/// #[extension_point(default = "failover")]
/// pub trait Cluster: Send + Sync {
///     #[adaptive(keys = "cluster")]
///     fn join(&self, url: &RceUrl) -> Result<String, CoreError>;
/// }
/// ```
///
/// `default` is optional; when present the generated adaptive struct gets a
/// `register_default` helper that registers the named implementation as the
/// loader's default. A trait with zero `#[adaptive]` methods is rejected at
/// macro-expansion time.
#[proc_macro_attribute]
pub fn extension_point(args: TokenStream, input: TokenStream) -> TokenStream {
    extension_point::expand(args, input)
}

/// Marks a trait method as resolved per call from a URL argument.
///
/// `keys` is a comma-separated list of URL parameter names consulted (in
/// order) before the trait-name-derived default key and the loader's
/// declared default. Consumed by [`extension_point`] — a no-op on its own.
#[proc_macro_attribute]
pub fn adaptive(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// Attribute macro on an inherent `impl` block — generates a
/// [`Dispatcher`](rce_core::dispatch::Dispatcher) and
/// [`Dispatched`](rce_core::dispatch::Dispatched) implementation with an
/// exact-match dispatch table built at macro-expansion time.
///
/// Every `pub fn(&self, ...)` becomes an invokable method; a zero-argument
/// `pub fn(&self) -> T` additionally becomes a property getter, and a
/// `pub fn set_foo(&mut self, value: T)` becomes the setter for property
/// `foo`.
///
/// ```ignore
/// #[derive_dispatch]
/// impl Greeter {
///     pub fn name(&self) -> String { self.name.clone() }
///     pub fn set_name(&mut self, name: String) { self.name = name; }
///     pub fn greet(&self) -> String { format!("hello {}", self.name) }
/// }
/// ```
#[proc_macro_attribute]
pub fn derive_dispatch(_args: TokenStream, input: TokenStream) -> TokenStream {
    derive_dispatch::expand(input)
}

// ---------------------------------------------------------------------------
// Bean / DI macros
// ---------------------------------------------------------------------------

/// Attribute macro on an `impl` block — marks the type as a bean and
/// generates a [`Bean`](rce_core::beans::Bean) trait impl.
///
/// The macro finds the first associated function that returns `Self` (the
/// constructor) and uses its parameter types as dependencies resolved from
/// the [`BeanContext`](rce_core::beans::BeanContext).
///
/// ```ignore
/// #[bean]
/// impl UserService {
///     pub fn new(directory: Arc<ExtensionDirectory>) -> Self {
///         Self { directory }
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn bean(_args: TokenStream, input: TokenStream) -> TokenStream {
    bean_attr::expand(input)
}

/// Attribute macro on a free function — marks it as a producer and generates
/// a [`Producer`](rce_core::beans::Producer) trait impl.
///
/// The macro generates a PascalCase struct from the function name
/// (e.g., `create_pool` -> `CreatePool`) and implements the `Producer` trait
/// on it, with the function's return type as `Producer::Output`. Parameters
/// are resolved from the [`BeanContext`](rce_core::beans::BeanContext).
///
/// ```ignore
/// #[producer]
/// async fn create_directory(settings: RuntimeSettings) -> Arc<ExtensionDirectory> {
///     Arc::new(ExtensionDirectory::global().clone())
/// }
/// ```
#[proc_macro_attribute]
pub fn producer(_args: TokenStream, input: TokenStream) -> TokenStream {
    producer_attr::expand(input)
}

/// Derive macro for simple beans whose `#[inject]` fields are resolved
/// from the [`BeanContext`](rce_core::beans::BeanContext).
///
/// Fields annotated with `#[inject]` are pulled from the context. Fields
/// without `#[inject]` use `Default::default()`.
///
/// ```ignore
/// #[derive(Clone, Bean)]
/// pub struct OrderService {
///     #[inject] directory: Arc<ExtensionDirectory>,
/// }
/// ```
#[proc_macro_derive(Bean, attributes(inject))]
pub fn derive_bean(input: TokenStream) -> TokenStream {
    bean_derive::expand(input)
}

/// Derive macro for state structs — generates
/// [`BeanState::from_context()`](rce_core::beans::BeanState).
///
/// Every field is resolved from the [`BeanContext`] by type.
///
/// ```ignore
/// #[derive(Clone, BeanState)]
/// pub struct Services {
///     pub directory: Arc<ExtensionDirectory>,
/// }
/// ```
#[proc_macro_derive(BeanState)]
pub fn derive_bean_state(input: TokenStream) -> TokenStream {
    bean_state_derive::expand(input)
}
