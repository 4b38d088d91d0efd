//! # rwsclient - Client for the Relatics DataExchange webservice
//!
//! This crate calls the two DataExchange operations of a Relatics
//! workspace and turns their loosely typed answers into result types:
//!
//! - `GetResult` (export) → [`ExportResult`], with the attached documents extracted
//! - `Import` → [`ImportResult`], with the import log and the changed elements
//!
//! ## Architecture
//!
//! - [`ClientCredential`] : OAuth2 client credentials with a per-host token cache
//! - [`PayloadBuilder`] : rows or file (plus attachments) → base64 `Data` argument
//! - [`RelaticsWebservice`] : request dispatcher (authentication, parameters, transport)
//! - [`result`] : response classification and result types
//! - [`RelaticsConfigExt`] : Relatics settings in the `rwsconfig` configuration
//!
//! The network goes through two traits, [`SoapTransport`] and
//! [`TokenEndpoint`], implemented over blocking HTTP by default.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rwsclient::{Authentication, ClientCredential, Parameters, RelaticsWebservice};
//!
//! fn main() -> anyhow::Result<()> {
//!     let webservice = RelaticsWebservice::new("acme", "ws-123");
//!     let credential = ClientCredential::new("client-id", "client-secret");
//!
//!     let mut parameters = Parameters::new();
//!     parameters.insert("project".to_string(), "P1".to_string());
//!
//!     let result = webservice.export(
//!         "getActions",
//!         Some(&parameters),
//!         Authentication::from(&credential),
//!     )?;
//!     if result.has_error {
//!         eprintln!("{}", result);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config_ext;
pub mod credential;
pub mod error;
pub mod payload;
pub mod result;
pub mod transport;
pub mod webservice;

pub use config_ext::RelaticsConfigExt;
pub use credential::{ClientCredential, HttpTokenEndpoint, TokenEndpoint, TokenResponse, USER_AGENT};
pub use error::{RelaticsError, Result};
pub use payload::{ImportData, ImportPayload, PayloadBuilder, Row};
pub use result::{
    BaseResult, ExportResult, ImportElement, ImportElementAction, ImportMessage,
    ImportMessageStatus, ImportResult,
};
pub use transport::{DEFAULT_MAX_RESPONSE_SIZE, HttpSoapTransport, SoapRequest, SoapTransport};
pub use webservice::{Authentication, ImportOptions, Parameters, RelaticsWebservice};
