//! Typed service clients.
//!
//! [`service_client!`](crate::service_client) generates a struct whose async
//! methods are fixed paths into a [`ServiceRef`](super::ServiceRef). Each
//! method serializes its arguments positionally and decodes the result, so a
//! call site reads like a call on the real object.
//!
//! ```ignore
//! service_client! {
//!     /// Client for the `math` service.
//!     pub struct MathClient {
//!         fn add(a: i64, b: i64) -> i64;
//!         fn square [advanced.square] (n: i64) -> i64;
//!     }
//! }
//!
//! let client = MathClient::new(math.get_service()?);
//! assert_eq!(client.square(4).await?, 16);
//! ```

/// Generates a typed client over a [`ServiceRef`](crate::rpc::ServiceRef).
///
/// Each entry is `fn name(args) -> Return;`, optionally with an explicit
/// dotted path in brackets after the name.
#[macro_export]
macro_rules! service_client {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$method_meta:meta])*
                fn $method:ident $([ $($segment:ident).+ ])? ( $($arg:ident : $arg_ty:ty),* $(,)? ) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            service: $crate::rpc::ServiceRef,
        }

        impl $name {
            /// Wraps a service handle.
            #[must_use]
            pub fn new(service: $crate::rpc::ServiceRef) -> Self {
                Self { service }
            }

            /// Returns the underlying service handle.
            #[must_use]
            pub fn service(&self) -> &$crate::rpc::ServiceRef {
                &self.service
            }

            $(
                $(#[$method_meta])*
                pub async fn $method(&self, $($arg: $arg_ty),*) -> $crate::Result<$ret> {
                    let args: ::std::vec::Vec<$crate::__private::Value> =
                        ::std::vec![$($crate::rpc::encode_arg(&$arg)?),*];
                    self.service
                        .get($crate::__service_path!($method $([ $($segment).+ ])?))
                        .call_as(args)
                        .await
                }
            )*
        }
    };
}

/// Dotted path of a generated client method.
#[doc(hidden)]
#[macro_export]
macro_rules! __service_path {
    ($method:ident) => {
        stringify!($method)
    };
    ($method:ident [ $first:ident $(. $rest:ident)* ]) => {
        concat!(stringify!($first) $(, ".", stringify!($rest))*)
    };
}

// ============================================================================
// Tests
// ============================================================================
