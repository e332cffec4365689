//! Event subscriptions.
//!
//! The [`EventRegistry`] maps event names to [`Subscription`]s. Application
//! code mutates it through [`SocketIoClient::subscribe`](crate::SocketIoClient::subscribe)
//! while the connection's reader task looks subscriptions up for every inbound
//! event. Entries are built completely before they are inserted and lookups
//! hand out an [`Arc`], so the reader always sees a whole subscription, even
//! if it is replaced right after the lookup.

use std::any::type_name;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodeError;

type ErasedHandler = Box<dyn Fn(Value) -> Result<(), DeliveryError> + Send + Sync>;

/// Why a subscription could not process an event.
#[derive(Debug)]
pub enum DeliveryError {
    /// The payload does not match the subscribed type; the handler did not run.
    Decode(DecodeError),
    /// The handler ran and panicked.
    Handler(String),
}

/// A handler bound to an event name and a target payload type.
pub struct Subscription {
    name: String,
    target_type: &'static str,
    handler: ErasedHandler,
}

impl Subscription {
    /// Create a subscription that decodes payloads into `T` before calling `handler`.
    pub fn new<T, F>(name: impl Into<String>, handler: F) -> Self
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let name = name.into();
        let event = name.clone();
        let target_type = type_name::<T>();
        let handler = move |payload: Value| {
            let value = serde_json::from_value::<T>(payload).map_err(|source| {
                DeliveryError::Decode(DecodeError::Payload {
                    event: event.clone(),
                    target_type,
                    source,
                })
            })?;
            catch_unwind(AssertUnwindSafe(|| handler(value)))
                .map_err(|panic| DeliveryError::Handler(panic_message(panic.as_ref())))
        };
        Self {
            name,
            target_type,
            handler: Box::new(handler),
        }
    }

    /// Event name this subscription listens to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the Rust type payloads are decoded into.
    pub fn target_type(&self) -> &'static str {
        self.target_type
    }

    /// Decode `payload` into the target type and run the handler.
    ///
    /// # Errors
    ///
    /// [`DeliveryError::Decode`] if the payload does not fit the target type,
    /// [`DeliveryError::Handler`] if the handler panicked.
    pub fn deliver(&self, payload: Value) -> Result<(), DeliveryError> {
        (self.handler)(payload)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("name", &self.name)
            .field("target_type", &self.target_type)
            .finish_non_exhaustive()
    }
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Thread-safe map from event name to [`Subscription`].
///
/// At most one subscription exists per name; subscribing again replaces the
/// previous handler.
#[derive(Debug, Default)]
pub struct EventRegistry {
    subscriptions: RwLock<HashMap<String, Arc<Subscription>>>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `subscription`, replacing any previous one with the same name.
    ///
    /// Returns the replaced subscription, if any.
    pub fn insert(&self, subscription: Subscription) -> Option<Arc<Subscription>> {
        let subscription = Arc::new(subscription);
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subscription.name.clone(), subscription)
    }

    /// Subscribe `handler` to `name`, decoding payloads into `T`.
    pub fn subscribe<T, F>(&self, name: impl Into<String>, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.insert(Subscription::new(name, handler));
    }

    /// Remove the subscription for `name`. Returns `true` if one existed.
    pub fn unsubscribe(&self, name: &str) -> bool {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    /// Look up the subscription for `name`.
    pub fn lookup(&self, name: &str) -> Option<Arc<Subscription>> {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns `true` if `name` has a subscription.
    pub fn contains(&self, name: &str) -> bool {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Remove every subscription.
    pub fn clear(&self) {
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if there are no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Chat {
        text: String,
    }

    #[test]
    fn deliver_decodes_into_target_type() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = Subscription::new("chat", move |chat: Chat| sink.lock().unwrap().push(chat));

        sub.deliver(json!({"text": "hi"})).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Chat {
                text: "hi".into()
            }]
        );
        assert!(sub.target_type().ends_with("Chat"));
    }

    #[test]
    fn type_mismatch_is_decode_error_and_skips_handler() {
        let called = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&called);
        let sub = Subscription::new("chat", move |_: Chat| *flag.lock().unwrap() = true);

        let err = sub.deliver(json!(42)).unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Decode(DecodeError::Payload { ref event, .. }) if event == "chat"
        ));
        assert!(!*called.lock().unwrap());
    }

    #[test]
    fn handler_panic_is_caught() {
        let sub = Subscription::new("boom", |_: Value| panic!("kaboom"));
        let err = sub.deliver(Value::Null).unwrap_err();
        match err {
            DeliveryError::Handler(message) => assert_eq!(message, "kaboom"),
            other => panic!("expected handler error, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_is_last_write_wins() {
        let registry = EventRegistry::new();
        let hits = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&hits);
        registry.subscribe("chat", move |_: Value| first.lock().unwrap().push("first"));
        let second = Arc::clone(&hits);
        registry.subscribe("chat", move |_: Value| second.lock().unwrap().push("second"));

        assert_eq!(registry.len(), 1);
        registry
            .lookup("chat")
            .unwrap()
            .deliver(Value::Null)
            .unwrap();
        assert_eq!(*hits.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn unsubscribe_and_clear() {
        let registry = EventRegistry::new();
        registry.subscribe("a", |_: Value| {});
        registry.subscribe("b", |_: Value| {});

        assert!(registry.unsubscribe("a"));
        assert!(!registry.unsubscribe("a"));
        assert!(registry.lookup("a").is_none());
        assert!(registry.contains("b"));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn lookup_snapshot_survives_replacement() {
        let registry = EventRegistry::new();
        registry.subscribe("chat", |_: String| {});
        let snapshot = registry.lookup("chat").unwrap();

        registry.subscribe("chat", |_: i64| {});

        assert_eq!(snapshot.target_type(), type_name::<String>());
        assert_eq!(
            registry.lookup("chat").unwrap().target_type(),
            type_name::<i64>()
        );
    }

    #[test]
    fn concurrent_subscribe_and_lookup() {
        let registry = Arc::new(EventRegistry::new());
        let writer = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 0..200 {
                    registry.subscribe(format!("event-{}", i % 10), |_: Value| {});
                }
            })
        };
        for i in 0..200 {
            if let Some(sub) = registry.lookup(&format!("event-{}", i % 10)) {
                assert_eq!(sub.name(), format!("event-{}", i % 10));
            }
        }
        writer.join().unwrap();
        assert_eq!(registry.len(), 10);
    }
}
