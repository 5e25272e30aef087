//! Runtime transport.
//!
//! Rides the extension platform's point-to-point runtime channel. The host
//! pairs requests and replies natively, so no namespace or instance
//! bookkeeping is needed; an untargeted send goes to every extension context,
//! a targeted one to a tab's content scripts.
//!
//! # Example
//!
//! ```ignore
//! let background = define_extension_messaging(runtime.background(), MessengerConfig::default());
//! background.on_message("getLength", |message: Message| async move {
//!     let data: String = message.data_as().map_err(|e| e.to_string())?;
//!     Ok::<_, String>(data.len())
//! })?;
//!
//! let content = define_extension_messaging(content_host, MessengerConfig::default());
//! let length = content.send_message("getLength", "test", None).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::host::{RuntimeHost, RuntimeListener, RuntimeTarget};
use crate::messaging::{Dispatch, Messenger, MessengerConfig, Subscription, Transport};
use crate::protocol::{Message, MessageSender, ResponseWrapper};

// ============================================================================
// RuntimeTransport
// ============================================================================

/// [`Transport`] over a [`RuntimeHost`].
pub struct RuntimeTransport<H: RuntimeHost> {
    host: Arc<H>,
}

impl<H: RuntimeHost> RuntimeTransport<H> {
    /// Creates a runtime transport.
    #[must_use]
    pub fn new(host: H) -> Self {
        Self {
            host: Arc::new(host),
        }
    }

    /// Returns the host.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &H {
        &self.host
    }
}

#[async_trait]
impl<H: RuntimeHost> Transport for RuntimeTransport<H> {
    type Target = Option<RuntimeTarget>;

    async fn send(
        &self,
        message: Message,
        target: Option<RuntimeTarget>,
    ) -> Result<Option<ResponseWrapper>> {
        let reply = self.host.send_message(message.to_wire()?, target).await?;
        Ok(reply.map(serde_json::from_value).transpose()?)
    }

    fn add_root_listener(&self, dispatch: Dispatch) -> Result<Subscription> {
        let listener: RuntimeListener = Arc::new(move |message, sender| {
            let reply = dispatch(with_sender(message, &sender));
            Box::pin(async move {
                match reply.await {
                    Ok(Some(wrapper)) => serde_json::to_value(wrapper).ok(),
                    Ok(None) => None,
                    Err(err) => {
                        debug!(error = %err, "Inbound runtime message rejected, not replying");
                        None
                    }
                }
            })
        });

        let key = self.host.add_listener(listener);
        let host = Arc::clone(&self.host);
        Ok(Subscription::new(move || host.remove_listener(key)))
    }
}

/// Attaches sender metadata to an object envelope.
fn with_sender(mut message: Value, sender: &MessageSender) -> Value {
    if let Value::Object(fields) = &mut message
        && let Ok(sender) = serde_json::to_value(sender)
    {
        fields.insert("sender".to_string(), sender);
    }
    message
}

// ============================================================================
// Constructors
// ============================================================================

/// Messenger over the extension runtime channel.
pub type ExtensionMessenger<H> = Messenger<RuntimeTransport<H>>;

/// Creates a messenger over the runtime channel of `host`.
#[must_use]
pub fn define_extension_messaging<H: RuntimeHost>(
    host: H,
    config: MessengerConfig,
) -> ExtensionMessenger<H> {
    Messenger::new(RuntimeTransport::new(host), config)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::Error;
    use crate::host::memory::MemoryRuntime;
    use crate::identifiers::{FrameId, TabId};

    fn tab(id: u32) -> TabId {
        TabId::new(id).expect("valid tab id")
    }

    #[tokio::test]
    async fn test_get_length_from_content_script() {
        let runtime = MemoryRuntime::new("ext");
        let background = define_extension_messaging(runtime.background(), MessengerConfig::default());
        let content = define_extension_messaging(
            runtime.content_script(tab(1), FrameId::main(), "https://example.com"),
            MessengerConfig::default(),
        );

        background
            .on_message("getLength", |message: Message| async move {
                let data: String = message.data_as().map_err(|e| e.to_string())?;
                Ok::<_, String>(data.len())
            })
            .expect("register");

        let length = content
            .send_message("getLength", "test", None)
            .await
            .expect("send");
        assert_eq!(length, json!(4));
    }

    #[tokio::test]
    async fn test_no_listeners_anywhere() {
        let runtime = MemoryRuntime::new("ext");
        let popup = define_extension_messaging(
            runtime.extension_page("popup.html"),
            MessengerConfig::default(),
        );
        let _background = define_extension_messaging(runtime.background(), MessengerConfig::default());

        let err = popup
            .send_message("getLength", "test", None)
            .await
            .expect_err("nobody listening");
        assert!(matches!(err, Error::NoReceiver));
        assert!(err.to_string().contains("Receiving end does not exist"));
    }

    #[tokio::test]
    async fn test_unhandled_type_is_no_response() {
        let runtime = MemoryRuntime::new("ext");
        let background = define_extension_messaging(runtime.background(), MessengerConfig::default());
        let popup = define_extension_messaging(
            runtime.extension_page("popup.html"),
            MessengerConfig::default(),
        );

        background
            .on_message("other", |_| async { Ok::<_, String>(()) })
            .expect("register");

        let err = popup
            .send_message("getLength", "test", None)
            .await
            .expect_err("unhandled");
        assert!(matches!(err, Error::NoResponse));
    }

    #[tokio::test]
    async fn test_handler_sees_sender() {
        let runtime = MemoryRuntime::new("ext");
        let background = define_extension_messaging(runtime.background(), MessengerConfig::default());
        let content = define_extension_messaging(
            runtime.content_script(tab(12), FrameId::new(4), "https://example.com/a"),
            MessengerConfig::default(),
        );

        background
            .on_message("whoami", |message: Message| async move {
                let sender = message.sender.ok_or("missing sender")?;
                let tab = sender.tab.ok_or("missing tab")?;
                Ok::<_, &'static str>(json!({
                    "tab": tab.id.as_u32(),
                    "frame": sender.frame_id.map(FrameId::as_u64),
                }))
            })
            .expect("register");

        let who = content
            .send_message("whoami", (), None)
            .await
            .expect("send");
        assert_eq!(who, json!({ "tab": 12, "frame": 4 }));
    }

    #[tokio::test]
    async fn test_targeted_send_reaches_tab() {
        let runtime = MemoryRuntime::new("ext");
        let background = define_extension_messaging(runtime.background(), MessengerConfig::default());
        let tab_one = define_extension_messaging(
            runtime.content_script(tab(1), FrameId::main(), "https://one.com"),
            MessengerConfig::default(),
        );
        let tab_two = define_extension_messaging(
            runtime.content_script(tab(2), FrameId::main(), "https://two.com"),
            MessengerConfig::default(),
        );

        tab_one
            .on_message("title", |_| async { Ok::<_, String>("one") })
            .expect("one");
        tab_two
            .on_message("title", |_| async { Ok::<_, String>("two") })
            .expect("two");

        let title = background
            .send_message("title", (), Some(RuntimeTarget::tab(tab(2))))
            .await
            .expect("send");
        assert_eq!(title, json!("two"));
    }

    #[tokio::test]
    async fn test_error_crosses_contexts() {
        let runtime = MemoryRuntime::new("ext");
        let background = define_extension_messaging(runtime.background(), MessengerConfig::default());
        let popup = define_extension_messaging(
            runtime.extension_page("popup.html"),
            MessengerConfig::default(),
        );

        background
            .on_message("fail", |_| async { Err::<(), _>("quota exceeded") })
            .expect("register");

        let err = popup
            .send_message("fail", (), None)
            .await
            .expect_err("remote error");
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[tokio::test]
    async fn test_tracing_logger_round_trip() -> anyhow::Result<()> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let runtime = MemoryRuntime::new("ext");
        let config = MessengerConfig::default().with_tracing_logger();
        let background = define_extension_messaging(runtime.background(), config.clone());
        let popup = define_extension_messaging(runtime.extension_page("popup.html"), config);

        background.on_message("echo", |message: Message| async move {
            Ok::<_, String>(message.data)
        })?;

        let echoed = popup
            .send_message("echo", json!({ "nested": [1, 2] }), None)
            .await?;
        assert_eq!(echoed, json!({ "nested": [1, 2] }));
        Ok(())
    }

    #[tokio::test]
    async fn test_root_listener_is_single_native_subscription() {
        let runtime = MemoryRuntime::new("ext");
        let background = define_extension_messaging(runtime.background(), MessengerConfig::default());

        let a = background
            .on_message("a", |_| async { Ok::<_, String>(1) })
            .expect("a");
        let b = background
            .on_message("b", |_| async { Ok::<_, String>(2) })
            .expect("b");
        assert_eq!(background.transport().host().listener_count(), 1);

        a.remove();
        assert_eq!(background.transport().host().listener_count(), 1);
        b.remove();
        assert_eq!(background.transport().host().listener_count(), 0);
    }
}
