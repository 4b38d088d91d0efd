//! Injection of custom parameters into an outgoing request
//!
//! `Parameter` values travel in attributes, which the regular argument
//! shape of `GetResult` cannot express. They are added to the envelope
//! after it has been built, under `Parameters/Parameters`.

use crate::builder::prefixed_element;
use crate::{OPERATION_PREFIX, SoapError};
use tracing::{debug, info};
use xmltree::{Element, XMLNode};

/// Adds `Parameter[@Name,@Value]` elements to the operation of `envelope`
///
/// Missing `Parameters/Parameters` levels are created with the operation's
/// prefix. A new outer `Parameters` element is placed before
/// `Authentication` when present, at the end otherwise. Parameters are
/// appended in the given order.
pub fn inject_parameters(
    envelope: &mut Element,
    parameters: &[(&str, &str)],
) -> Result<(), SoapError> {
    let body = envelope
        .get_mut_child("Body")
        .ok_or(SoapError::MissingBody)?;
    let operation = body
        .children
        .iter_mut()
        .find_map(|node| match node {
            XMLNode::Element(element) => Some(element),
            _ => None,
        })
        .ok_or(SoapError::NoOperation)?;

    let prefix = operation
        .prefix
        .clone()
        .unwrap_or_else(|| OPERATION_PREFIX.to_string());

    if operation.get_child("Parameters").is_none() {
        info!("Adding parameters to SOAP request");
        let position = operation
            .children
            .iter()
            .position(|node| matches!(node, XMLNode::Element(e) if e.name == "Authentication"))
            .unwrap_or(operation.children.len());
        operation.children.insert(
            position,
            XMLNode::Element(prefixed_element(&prefix, "Parameters")),
        );
    }
    let outer = operation
        .get_mut_child("Parameters")
        .ok_or_else(|| SoapError::MissingElement("Parameters".to_string()))?;

    if outer.get_child("Parameters").is_none() {
        outer
            .children
            .push(XMLNode::Element(prefixed_element(&prefix, "Parameters")));
    }
    let params = outer
        .get_mut_child("Parameters")
        .ok_or_else(|| SoapError::MissingElement("Parameters/Parameters".to_string()))?;

    for (name, value) in parameters {
        let mut param = prefixed_element(&prefix, "Parameter");
        param.attributes.insert("Name".to_string(), name.to_string());
        param
            .attributes
            .insert("Value".to_string(), value.to_string());
        params.children.push(XMLNode::Element(param));
    }

    debug!(count = parameters.len(), "Parameters injected");
    Ok(())
}
