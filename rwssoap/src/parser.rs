//! Parsing of DataExchange SOAP responses

use crate::{SoapBody, SoapEnvelope, SoapError, SoapHeader};
use std::io::BufReader;
use xmltree::{Element, XMLNode};

/// Parses a complete SOAP envelope
pub fn parse_soap_envelope(xml: &[u8]) -> Result<SoapEnvelope, SoapError> {
    let reader = BufReader::new(xml);
    let root = Element::parse(reader)?;

    if !root.name.ends_with("Envelope") {
        return Err(SoapError::MissingEnvelope);
    }

    let header = root
        .get_child("Header")
        .map(|e| SoapHeader { content: e.clone() });

    let body_elem = root.get_child("Body").ok_or(SoapError::MissingBody)?;

    let body = SoapBody {
        content: body_elem.clone(),
    };

    Ok(SoapEnvelope { header, body })
}

/// Extracts the `<Operation>Result` element of an operation response
///
/// A DataExchange response has the shape
/// `Body/<Operation>Response/<Operation>Result/...`. Returns `None` when
/// the result element is missing or carries neither children, attributes
/// nor text: the service sent back an empty answer.
pub fn extract_operation_result(body: &SoapBody, operation: &str) -> Option<Element> {
    let response = body
        .content
        .get_child(format!("{}Response", operation).as_str())?;
    let result = response.get_child(format!("{}Result", operation).as_str())?;

    if is_empty_element(result) {
        None
    } else {
        Some(result.clone())
    }
}

fn is_empty_element(element: &Element) -> bool {
    element.attributes.is_empty()
        && element.children.iter().all(|node| match node {
            XMLNode::Element(_) => false,
            XMLNode::Text(text) | XMLNode::CData(text) => text.trim().is_empty(),
            _ => true,
        })
}
