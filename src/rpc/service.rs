//! Real side of a proxied service.
//!
//! A [`ServiceObject`] is a tree of named async methods and nested objects,
//! optionally callable itself. Calls address members by dotted path
//! (`"two.three"`); a missing path addresses the object itself.
//!
//! Methods own whatever state they need, so a nested method always runs
//! against the object it was defined on, not the root.
//!
//! ```ignore
//! let service = ServiceObject::new()
//!     .method("one", |()| async { Ok::<_, String>(1) })
//!     .object(
//!         "two",
//!         ServiceObject::new().method("three", |()| async { Ok::<_, String>(3) }),
//!     );
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::future::Future;
use std::result::Result as StdResult;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

// ============================================================================
// Types
// ============================================================================

/// Type-erased service method.
///
/// Takes the raw call arguments; fails with the method's error text.
pub type MethodFn =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, StdResult<Value, String>> + Send + Sync>;

#[derive(Clone)]
enum Member {
    Method(MethodFn),
    Object(ServiceObject),
}

// ============================================================================
// ServiceObject
// ============================================================================

/// Object exposed to other contexts through a proxy.
#[derive(Clone, Default)]
pub struct ServiceObject {
    members: BTreeMap<String, Member>,
    callable: Option<MethodFn>,
}

impl ServiceObject {
    /// Creates an empty service object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method.
    ///
    /// Arguments arrive as a JSON array and are decoded into `A`: a tuple
    /// for several arguments, the bare type for one, `()` for none.
    #[must_use]
    pub fn method<A, F, Fut, R, E>(mut self, name: impl Into<String>, method: F) -> Self
    where
        A: DeserializeOwned,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StdResult<R, E>> + Send + 'static,
        R: Serialize,
        E: Display,
    {
        self.members
            .insert(name.into(), Member::Method(erase(method)));
        self
    }

    /// Adds a nested object.
    #[must_use]
    pub fn object(mut self, name: impl Into<String>, object: ServiceObject) -> Self {
        self.members.insert(name.into(), Member::Object(object));
        self
    }

    /// Makes the object itself callable.
    #[must_use]
    pub fn callable<A, F, Fut, R, E>(mut self, method: F) -> Self
    where
        A: DeserializeOwned,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StdResult<R, E>> + Send + 'static,
        R: Serialize,
        E: Display,
    {
        self.callable = Some(erase(method));
        self
    }

    /// Invokes the member at `path` with `args`.
    ///
    /// A path that does not resolve to something callable yields `null`
    /// rather than an error.
    pub fn invoke(
        &self,
        path: Option<&str>,
        args: Vec<Value>,
    ) -> BoxFuture<'static, StdResult<Value, String>> {
        match self.resolve(path) {
            Some(method) => method(args),
            None => Box::pin(future::ready(Ok(Value::Null))),
        }
    }

    /// Dotted paths of every callable member, sorted.
    ///
    /// A callable nested object is listed under its own path.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths(None, &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: Option<&str>, paths: &mut Vec<String>) {
        for (name, member) in &self.members {
            let path = match prefix {
                Some(prefix) => format!("{prefix}.{name}"),
                None => name.clone(),
            };
            match member {
                Member::Method(_) => paths.push(path),
                Member::Object(object) => {
                    if object.callable.is_some() {
                        paths.push(path.clone());
                    }
                    object.collect_paths(Some(&path), paths);
                }
            }
        }
    }

    fn resolve(&self, path: Option<&str>) -> Option<&MethodFn> {
        let Some(path) = path.filter(|path| !path.is_empty()) else {
            return self.callable.as_ref();
        };

        let mut object = self;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            match object.members.get(segment)? {
                Member::Method(method) if segments.peek().is_none() => return Some(method),
                Member::Method(_) => return None,
                Member::Object(nested) => object = nested,
            }
        }

        object.callable.as_ref()
    }
}

impl fmt::Debug for ServiceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceObject")
            .field("paths", &self.paths())
            .field("callable", &self.callable.is_some())
            .finish()
    }
}

// ============================================================================
// Argument Handling
// ============================================================================

fn erase<A, F, Fut, R, E>(method: F) -> MethodFn
where
    A: DeserializeOwned,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StdResult<R, E>> + Send + 'static,
    R: Serialize,
    E: Display,
{
    Arc::new(move |args| match decode_args::<A>(args) {
        Ok(args) => {
            let reply = method(args);
            Box::pin(async move {
                match reply.await {
                    Ok(value) => serde_json::to_value(value).map_err(|e| e.to_string()),
                    Err(err) => Err(err.to_string()),
                }
            })
        }
        Err(err) => Box::pin(future::ready(Err(err))),
    })
}

/// Decodes a call's argument list into a method's parameter type.
///
/// Tries the whole list first (tuples), then `null` for an empty list and the
/// sole element for a single-argument call.
fn decode_args<A: DeserializeOwned>(args: Vec<Value>) -> StdResult<A, String> {
    let fallback = match args.as_slice() {
        [] => Some(Value::Null),
        [single] => Some(single.clone()),
        _ => None,
    };

    match serde_json::from_value(Value::Array(args)) {
        Ok(decoded) => Ok(decoded),
        Err(err) => fallback
            .and_then(|value| serde_json::from_value(value).ok())
            .ok_or_else(|| format!("Invalid arguments: {err}")),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn sample() -> ServiceObject {
        ServiceObject::new()
            .method("one", |()| async { Ok::<_, String>(1) })
            .object(
                "two",
                ServiceObject::new().method("three", |()| async { Ok::<_, String>(3) }),
            )
    }

    #[tokio::test]
    async fn test_invoke_nested_paths() {
        let service = sample();
        assert_eq!(service.invoke(Some("one"), vec![]).await, Ok(json!(1)));
        assert_eq!(service.invoke(Some("two.three"), vec![]).await, Ok(json!(3)));
    }

    #[tokio::test]
    async fn test_unresolved_paths_yield_null() {
        let service = sample();
        assert_eq!(service.invoke(Some("missing"), vec![]).await, Ok(Value::Null));
        assert_eq!(service.invoke(Some("one.deeper"), vec![]).await, Ok(Value::Null));
        assert_eq!(service.invoke(Some("two"), vec![]).await, Ok(Value::Null));
        assert_eq!(service.invoke(None, vec![]).await, Ok(Value::Null));
    }

    #[tokio::test]
    async fn test_callable_root_and_nested() {
        let service = ServiceObject::new()
            .callable(|name: String| async move { Ok::<_, String>(format!("hello {name}")) })
            .object(
                "math",
                ServiceObject::new()
                    .callable(|(a, b): (i64, i64)| async move { Ok::<_, String>(a * b) }),
            );

        assert_eq!(
            service.invoke(None, vec![json!("rust")]).await,
            Ok(json!("hello rust"))
        );
        assert_eq!(service.invoke(Some(""), vec![json!("x")]).await, Ok(json!("hello x")));
        assert_eq!(
            service.invoke(Some("math"), vec![json!(6), json!(7)]).await,
            Ok(json!(42))
        );
    }

    #[tokio::test]
    async fn test_arguments_decoding() {
        let service = ServiceObject::new()
            .method("add", |(a, b): (i64, i64)| async move { Ok::<_, String>(a + b) })
            .method("double", |n: i64| async move { Ok::<_, String>(n * 2) })
            .method("pair", |(n,): (i64,)| async move { Ok::<_, String>(n) });

        assert_eq!(service.invoke(Some("add"), vec![json!(2), json!(3)]).await, Ok(json!(5)));
        assert_eq!(service.invoke(Some("double"), vec![json!(21)]).await, Ok(json!(42)));
        assert_eq!(service.invoke(Some("pair"), vec![json!(9)]).await, Ok(json!(9)));

        let err = service
            .invoke(Some("add"), vec![json!("x")])
            .await
            .expect_err("bad arguments");
        assert!(err.starts_with("Invalid arguments"));
    }

    #[tokio::test]
    async fn test_method_error_text() {
        let service =
            ServiceObject::new().method("fail", |()| async { Err::<(), _>("disk full") });
        assert_eq!(
            service.invoke(Some("fail"), vec![]).await,
            Err("disk full".to_string())
        );
    }

    #[tokio::test]
    async fn test_method_state_is_its_own() {
        let counter = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&counter);
        let service = ServiceObject::new().object(
            "counter",
            ServiceObject::new().method("increment", move |()| {
                let inner = Arc::clone(&inner);
                async move { Ok::<_, String>(inner.fetch_add(1, Ordering::SeqCst) + 1) }
            }),
        );

        assert_eq!(service.invoke(Some("counter.increment"), vec![]).await, Ok(json!(1)));
        assert_eq!(service.invoke(Some("counter.increment"), vec![]).await, Ok(json!(2)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_paths() {
        let service = sample().object(
            "fn",
            ServiceObject::new().callable(|()| async { Ok::<_, String>(()) }),
        );
        assert_eq!(service.paths(), vec!["fn", "one", "two.three"]);
    }
}
