//! # rwssoap - SOAP envelopes for the Relatics DataExchange service
//!
//! This crate builds the SOAP 1.1 requests sent to
//! `https://<company>.relaticsonline.com/DataExchange.asmx` and parses the
//! envelopes it returns.
//!
//! ## Architecture
//!
//! - [`build_soap_request`] : envelope of an operation call, from ordered [`SoapArg`]s
//! - [`inject_parameters`] : `Parameters/Parameters/Parameter` elements of `GetResult`
//! - [`parse_soap_envelope`] / [`extract_operation_result`] : response decoding
//! - [`parse_soap_fault`] : SOAP Fault detection
//!
//! ## Example
//!
//! ```
//! use rwssoap::{SoapArg, build_soap_request, inject_parameters, serialize_envelope};
//!
//! let mut envelope = build_soap_request(
//!     "GetResult",
//!     &[
//!         SoapArg::text("Operation", "getActions"),
//!         SoapArg::attributes("Identification", &[("Workspace", "ws-123")]),
//!         SoapArg::attributes("Authentication", &[]),
//!     ],
//! );
//! inject_parameters(&mut envelope, &[("project", "P1")]).unwrap();
//!
//! let xml = serialize_envelope(&envelope).unwrap();
//! assert!(xml.contains("Name=\"project\""));
//! ```

mod builder;
mod envelope;
mod error;
mod fault;
mod parameters;
mod parser;

pub use builder::{SoapArg, build_soap_request, serialize_envelope};
pub use envelope::{SoapBody, SoapEnvelope, SoapHeader};
pub use error::SoapError;
pub use fault::{SoapFault, parse_soap_fault};
pub use parameters::inject_parameters;
pub use parser::{extract_operation_result, parse_soap_envelope};

/// SOAP 1.1 envelope namespace
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Namespace of the DataExchange operations
pub const DATAEXCHANGE_NS: &str = "http://www.relatics.com/";

/// Prefix bound to [`SOAP_ENVELOPE_NS`] in outgoing requests
pub const ENVELOPE_PREFIX: &str = "soap";

/// Prefix bound to [`DATAEXCHANGE_NS`] in outgoing requests
pub const OPERATION_PREFIX: &str = "ns0";
