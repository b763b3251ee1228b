//! ---
//! mbus_section: "02-messaging-ipc-data-model"
//! mbus_subsection: "module"
//! mbus_type: "source"
//! mbus_scope: "code"
//! mbus_description: "Message entity and gateway wire codec."
//! mbus_version: "v0.0.0-prealpha"
//! mbus_owner: "tbd"
//! ---
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{codec, Result};

/// Ordered string property map attached to every message.
pub type Properties = BTreeMap<String, String>;

/// Immutable message shared between queues by reference count.
///
/// Cloning increments the count; dropping the last clone frees the payload.
/// Content and properties are fixed at construction, so clones held by
/// several module queues can be read concurrently without locking.
#[derive(Debug, Clone)]
pub struct Message {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    content: Vec<u8>,
    properties: Properties,
}

impl Message {
    /// Construct a message from its payload and property map.
    pub fn new(content: impl Into<Vec<u8>>, properties: Properties) -> Self {
        Self {
            inner: Arc::new(Inner {
                content: content.into(),
                properties,
            }),
        }
    }

    /// The raw payload bytes.
    pub fn content(&self) -> &[u8] {
        &self.inner.content
    }

    /// The full property map.
    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    /// Look up a single property value.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.inner.properties.get(key).map(String::as_str)
    }

    /// Number of live clones of this message, the original included.
    ///
    /// Diagnostic accessor; leak tests compare it before and after fan-out.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Serialize into the gateway wire envelope.
    pub fn to_byte_array(&self) -> Result<Vec<u8>> {
        codec::encode(self)
    }

    /// Parse a message from the gateway wire envelope.
    pub fn from_byte_array(bytes: &[u8]) -> Result<Self> {
        codec::decode(bytes)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.inner.content == other.inner.content
            && self.inner.properties == other.inner.properties
    }
}

impl Eq for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    fn greeting() -> Message {
        let mut properties = Properties::new();
        properties.insert("Key1".to_string(), "Value1".to_string());
        Message::new("Hello!!!", properties)
    }

    #[test]
    fn clone_shares_the_payload() {
        let message = greeting();
        assert_eq!(message.ref_count(), 1);

        let clone = message.clone();
        assert_eq!(message.ref_count(), 2);
        assert_eq!(clone.content(), b"Hello!!!");
        assert_eq!(clone.property("Key1"), Some("Value1"));

        drop(clone);
        assert_eq!(message.ref_count(), 1);
    }

    #[test]
    fn equality_compares_content_and_properties() {
        let mut properties = Properties::new();
        properties.insert("Key1".to_string(), "Value1".to_string());
        assert_eq!(greeting(), Message::new("Hello!!!", properties));
        assert_ne!(greeting(), Message::new("Hello???", Properties::new()));
    }
}
