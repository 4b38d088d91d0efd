//! SOAP envelope structures

use xmltree::Element;

/// Complete SOAP envelope
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// Optional SOAP header
    pub header: Option<SoapHeader>,

    /// SOAP body holding the operation call or its response
    pub body: SoapBody,
}

/// SOAP header
#[derive(Debug, Clone)]
pub struct SoapHeader {
    /// Raw XML content of the header
    pub content: Element,
}

/// SOAP body
#[derive(Debug, Clone)]
pub struct SoapBody {
    /// Raw XML content of the body
    pub content: Element,
}
