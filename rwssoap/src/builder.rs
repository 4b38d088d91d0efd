//! Construction of DataExchange SOAP requests

use crate::{DATAEXCHANGE_NS, ENVELOPE_PREFIX, OPERATION_PREFIX, SOAP_ENVELOPE_NS, SoapError};
use xmltree::{Element, XMLNode};

/// One argument of a DataExchange operation
///
/// The DataExchange schema carries most values in attributes of a nested
/// element with the same name, e.g.
/// `<Identification><Identification Workspace="..."/></Identification>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoapArg {
    /// `<ns:Name>value</ns:Name>`
    Text { name: String, value: String },

    /// `<ns:Name><ns:Name attr="value" .../></ns:Name>`
    Attributes {
        name: String,
        attributes: Vec<(String, String)>,
    },
}

impl SoapArg {
    pub fn text(name: &str, value: &str) -> Self {
        SoapArg::Text {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn attributes(name: &str, attributes: &[(&str, &str)]) -> Self {
        SoapArg::Attributes {
            name: name.to_string(),
            attributes: attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SoapArg::Text { name, .. } | SoapArg::Attributes { name, .. } => name,
        }
    }

    fn to_element(&self) -> Element {
        let mut outer = prefixed_element(OPERATION_PREFIX, self.name());
        match self {
            SoapArg::Text { value, .. } => {
                outer.children.push(XMLNode::Text(value.clone()));
            }
            SoapArg::Attributes { name, attributes } => {
                let mut inner = prefixed_element(OPERATION_PREFIX, name);
                for (key, value) in attributes {
                    inner.attributes.insert(key.clone(), value.clone());
                }
                outer.children.push(XMLNode::Element(inner));
            }
        }
        outer
    }
}

/// Creates an element carrying a namespace prefix
pub(crate) fn prefixed_element(prefix: &str, name: &str) -> Element {
    let mut element = Element::new(name);
    element.prefix = Some(prefix.to_string());
    element
}

/// Builds the SOAP envelope of a DataExchange operation call
///
/// # Arguments
///
/// * `operation` - Operation name (e.g. "GetResult", "Import")
/// * `args` - Ordered operation arguments
pub fn build_soap_request(operation: &str, args: &[SoapArg]) -> Element {
    let mut request = prefixed_element(OPERATION_PREFIX, operation);
    for arg in args {
        request.children.push(XMLNode::Element(arg.to_element()));
    }

    let mut body = prefixed_element(ENVELOPE_PREFIX, "Body");
    body.children.push(XMLNode::Element(request));

    let mut envelope = prefixed_element(ENVELOPE_PREFIX, "Envelope");
    envelope.attributes.insert(
        format!("xmlns:{}", ENVELOPE_PREFIX),
        SOAP_ENVELOPE_NS.to_string(),
    );
    envelope.attributes.insert(
        format!("xmlns:{}", OPERATION_PREFIX),
        DATAEXCHANGE_NS.to_string(),
    );
    envelope.children.push(XMLNode::Element(prefixed_element(
        ENVELOPE_PREFIX,
        "Header",
    )));
    envelope.children.push(XMLNode::Element(body));

    envelope
}

/// Serializes an envelope to an XML document
pub fn serialize_envelope(envelope: &Element) -> Result<String, SoapError> {
    let mut buf = Vec::new();
    let config = xmltree::EmitterConfig::new()
        .write_document_declaration(true)
        .perform_indent(true)
        .indent_string("  ");
    envelope.write_with_config(&mut buf, config)?;

    Ok(String::from_utf8(buf)?)
}
