//! SOAP handling errors

/// Errors raised while building or parsing SOAP envelopes
#[derive(Debug, thiserror::Error)]
pub enum SoapError {
    #[error("XML parse error: {0}")]
    XmlParse(#[from] xmltree::ParseError),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] xmltree::Error),

    #[error("Envelope is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Missing SOAP Envelope")]
    MissingEnvelope,

    #[error("Missing SOAP Body")]
    MissingBody,

    #[error("No operation found in SOAP Body")]
    NoOperation,

    #[error("Missing {0} element")]
    MissingElement(String),
}
