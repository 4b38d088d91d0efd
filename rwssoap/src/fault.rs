//! SOAP Faults returned by the DataExchange service

use crate::SoapBody;
use std::fmt;

/// SOAP error (Fault)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapFault {
    /// Fault code (e.g. "soap:Client", "soap:Server")
    pub fault_code: String,

    /// Error description
    pub fault_string: String,

    /// Flattened text of the `detail` element, when present
    pub detail: Option<String>,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SOAP Fault {}: {}", self.fault_code, self.fault_string)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

/// Extracts a SOAP Fault from a response body
///
/// Returns `None` when the body carries a regular operation response.
pub fn parse_soap_fault(body: &SoapBody) -> Option<SoapFault> {
    let fault = body.content.get_child("Fault")?;

    let text_of = |name: &str| {
        fault
            .get_child(name)
            .and_then(|e| e.get_text())
            .map(|t| t.trim().to_string())
    };

    let fault_code = text_of("faultcode").unwrap_or_default();
    let fault_string = text_of("faultstring").unwrap_or_default();
    let detail = fault.get_child("detail").and_then(|d| {
        let mut text = String::new();
        collect_text(d, &mut text);
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    });

    Some(SoapFault {
        fault_code,
        fault_string,
        detail,
    })
}

fn collect_text(element: &xmltree::Element, out: &mut String) {
    for node in &element.children {
        match node {
            xmltree::XMLNode::Text(t) | xmltree::XMLNode::CData(t) => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(t.trim());
            }
            xmltree::XMLNode::Element(child) => collect_text(child, out),
            _ => {}
        }
    }
}
