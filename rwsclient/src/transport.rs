//! SOAP transport towards `DataExchange.asmx`

use crate::error::{RelaticsError, Result};
use rwssoap::{
    DATAEXCHANGE_NS, extract_operation_result, parse_soap_envelope, parse_soap_fault,
    serialize_envelope,
};
use tracing::{debug, warn};
use ureq::Agent;
use xmltree::Element;

/// A prepared DataExchange call
#[derive(Debug, Clone)]
pub struct SoapRequest {
    /// `https://<host>/DataExchange.asmx`
    pub endpoint: String,

    /// Operation name, e.g. "GetResult" or "Import"
    pub operation: String,

    /// Extra HTTP headers (`User-Agent`, `Authorization`)
    pub headers: Vec<(String, String)>,

    /// Complete SOAP envelope
    pub envelope: Element,
}

impl SoapRequest {
    /// Value of the `SOAPAction` header: `"http://www.relatics.com/<Operation>"`
    pub fn soap_action(&self) -> String {
        format!(r#""{}{}""#, DATAEXCHANGE_NS, self.operation)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends envelopes and returns the `<Operation>Result` element
///
/// `Ok(None)` stands for an empty answer of the service.
pub trait SoapTransport: Send + Sync {
    fn call(&self, request: &SoapRequest) -> Result<Option<Element>>;
}

/// Default limit on a SOAP response body (256 MiB)
///
/// Exports carry their documents inline as base64, so answers are often
/// well above the HTTP client's own 10 MB default.
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 256 * 1024 * 1024;

/// Blocking HTTP transport
pub struct HttpSoapTransport {
    agent: Agent,
    max_response_size: u64,
}

impl HttpSoapTransport {
    pub fn new() -> Self {
        // 500 answers carry SOAP Faults: the body must stay readable.
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self {
            agent,
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
        }
    }

    /// Sets the largest response body accepted, in bytes
    pub fn with_max_response_size(mut self, limit: u64) -> Self {
        self.max_response_size = limit;
        self
    }

    pub fn max_response_size(&self) -> u64 {
        self.max_response_size
    }
}

impl Default for HttpSoapTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SoapTransport for HttpSoapTransport {
    fn call(&self, request: &SoapRequest) -> Result<Option<Element>> {
        let body_xml = serialize_envelope(&request.envelope)?;
        debug!("SOAP envelope for {}:\n{}", request.operation, body_xml);

        let mut builder = self
            .agent
            .post(&request.endpoint)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", &request.soap_action());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send(body_xml)?;
        let status = response.status();
        let raw_body = response
            .body_mut()
            .with_config()
            .limit(self.max_response_size)
            .read_to_string()?;
        debug!(%status, "SOAP response for {}:\n{}", request.operation, raw_body);

        let envelope = parse_soap_envelope(raw_body.as_bytes()).map_err(|e| {
            RelaticsError::transport(format!(
                "HTTP {} from {}, body is not a SOAP envelope: {}",
                status, request.endpoint, e
            ))
        })?;

        if let Some(fault) = parse_soap_fault(&envelope.body) {
            return Err(RelaticsError::transport(fault.to_string()));
        }

        let result = extract_operation_result(&envelope.body, &request.operation);
        if result.is_none() {
            warn!("Empty {} response from {}", request.operation, request.endpoint);
        }
        Ok(result)
    }
}
