//! Draw event payload.

use std::sync::Arc;

/// An opaque draw event.
///
/// The relay never looks inside the body: coordinates, colors and stroke
/// metadata are the clients' business. Cloning is cheap because the body is
/// shared, which matters when one event fans out to many subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawEvent {
    content_type: Option<Arc<str>>,
    body: Arc<[u8]>,
}

impl DrawEvent {
    /// Create an event from raw body bytes.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: None,
            body: Arc::from(body.into()),
        }
    }

    /// Attach the MIME type the publisher declared.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(Arc::from(content_type.into()));
        self
    }

    /// Declared content type, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Body bytes, exactly as published.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}
