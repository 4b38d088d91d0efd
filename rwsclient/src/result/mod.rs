//! Normalization of DataExchange responses into typed results
//!
//! A response is first classified into one of a closed set of shapes
//! ([`ResponseKind`]); [`ExportResult`] and [`ImportResult`] then extract
//! their own payload from it.

mod export;
mod import;

pub use export::ExportResult;
pub use import::{
    ImportElement, ImportElementAction, ImportMessage, ImportMessageStatus, ImportResult,
    MessageLog, RawMessage, fold_messages,
};

use tracing::{info, warn};
use xmltree::{Element, EmitterConfig};

/// Error contract shared by the result types
///
/// A result is a success (truthy) iff it has no error.
pub trait BaseResult {
    fn has_error(&self) -> bool;

    fn error_msg(&self) -> Option<&str>;

    fn is_success(&self) -> bool {
        !self.has_error()
    }
}

/// Shape of a raw `<Operation>Result` element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// No result at all: undefined error on the service side
    Empty,

    /// `Export` element: the service reports an error
    RemoteError(String),

    /// The expected payload element is present
    Payload,

    /// Anything else, carried as its serialization
    Unrecognized(String),
}

impl ResponseKind {
    /// Classifies a response expected to carry `payload` (`Report` or `Import`)
    ///
    /// Precedence: empty, then `Export`, then `payload`, otherwise
    /// unrecognized.
    pub fn classify(response: Option<&Element>, payload: &str) -> Self {
        let Some(response) = response else {
            warn!("Empty response received. This indicates an undefined error.");
            return ResponseKind::Empty;
        };

        if let Some(export) = response.get_child("Export") {
            let message = export
                .attributes
                .get("Error")
                .cloned()
                .unwrap_or_else(|| serialize_tree(response));
            info!("Received an error response: {}", message);
            return ResponseKind::RemoteError(message);
        }

        if response.get_child(payload).is_some() {
            return ResponseKind::Payload;
        }

        warn!("Unrecognized response received, expected {}", payload);
        ResponseKind::Unrecognized(serialize_tree(response))
    }

    /// `(has_error, error_msg)` for this shape
    pub fn error(&self) -> (bool, Option<String>) {
        match self {
            ResponseKind::Empty => (true, Some(String::new())),
            ResponseKind::RemoteError(msg) | ResponseKind::Unrecognized(msg) => {
                (true, Some(msg.clone()))
            }
            ResponseKind::Payload => (false, None),
        }
    }
}

/// Indented XML rendering of a response tree, without declaration
pub fn serialize_tree(element: &Element) -> String {
    let mut buf = Vec::new();
    let config = EmitterConfig::new()
        .write_document_declaration(false)
        .perform_indent(true)
        .indent_string("  ");

    match element.write_with_config(&mut buf, config) {
        Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
        Err(e) => format!("<{}> (unserializable: {})", element.name, e),
    }
}
