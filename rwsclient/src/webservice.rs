//! Request dispatcher for the `GetResult` and `Import` operations

use crate::config_ext::RelaticsConfigExt;
use crate::credential::{ClientCredential, USER_AGENT};
use crate::error::{RelaticsError, Result};
use crate::payload::{ImportData, PayloadBuilder};
use crate::result::{ExportResult, ImportResult};
use crate::transport::{HttpSoapTransport, SoapRequest, SoapTransport};
use indexmap::IndexMap;
use rwsconfig::Config;
use rwssoap::{SoapArg, build_soap_request, inject_parameters};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use xmltree::Element;

/// Custom parameters of a `GetResult` call, sent in insertion order
pub type Parameters = IndexMap<String, String>;

/// Authentication of a webservice call
#[derive(Debug, Clone, Copy, Default)]
pub enum Authentication<'a> {
    /// No authentication (an empty `Authentication` block is still sent)
    #[default]
    None,

    /// Entry code configured on the webservice
    EntryCode(&'a str),

    /// OAuth2 client credentials, sent as a bearer token
    ClientCredential(&'a ClientCredential),
}

impl<'a> From<&'a ClientCredential> for Authentication<'a> {
    fn from(credential: &'a ClientCredential) -> Self {
        Authentication::ClientCredential(credential)
    }
}

impl<'a> From<&'a str> for Authentication<'a> {
    fn from(entry_code: &'a str) -> Self {
        Authentication::EntryCode(entry_code)
    }
}

/// Optional arguments of an import
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Name shown in the "Imported file" column of the import log.
    /// Directories and extension are dropped.
    pub file_name: Option<String>,

    /// Files attached under `Documents/`
    pub documents: Vec<PathBuf>,

    /// Keeps the temporary zip archive (debugging aid)
    pub keep_zip_file: bool,
}

impl ImportOptions {
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_documents(mut self, documents: Vec<PathBuf>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_keep_zip_file(mut self, keep: bool) -> Self {
        self.keep_zip_file = keep;
        self
    }
}

/// Client of the DataExchange webservice of one workspace
pub struct RelaticsWebservice {
    hostname: String,
    workspace_id: String,
    user_agent: String,
    endpoint: String,
    wsdl_url: String,
    payload: PayloadBuilder,
    keep_zip_file: bool,
    transport: Arc<dyn SoapTransport>,
}

impl fmt::Debug for RelaticsWebservice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelaticsWebservice")
            .field("hostname", &self.hostname)
            .field("workspace_id", &self.workspace_id)
            .field("user_agent", &self.user_agent)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl RelaticsWebservice {
    /// Creates a client for `https://{company_name}.relaticsonline.com`
    pub fn new(company_name: &str, workspace_id: &str) -> Self {
        let hostname = format!("{}.relaticsonline.com", company_name.to_lowercase());
        let endpoint = format!("https://{}/DataExchange.asmx", hostname);
        let wsdl_url = format!("{}?wsdl", endpoint);

        Self {
            hostname,
            workspace_id: workspace_id.to_string(),
            user_agent: USER_AGENT.to_string(),
            endpoint,
            wsdl_url,
            payload: PayloadBuilder::new(),
            keep_zip_file: false,
            transport: Arc::new(HttpSoapTransport::new()),
        }
    }

    /// Creates a client from the global configuration
    pub fn from_config() -> Result<Self> {
        Self::from_config_with(&rwsconfig::get_config())
    }

    /// Creates a client from `config` (`relatics.*` and `import.*` keys)
    pub fn from_config_with(config: &Config) -> Result<Self> {
        let company_name = config.get_relatics_company_name()?;
        let workspace_id = config.get_relatics_workspace_id()?;

        let mut webservice = Self::new(&company_name, &workspace_id)
            .with_keep_zip_file(config.get_keep_zip_file()?)
            .with_import_basename(config.get_import_basename()?)
            .with_transport(
                HttpSoapTransport::new()
                    .with_max_response_size(config.get_relatics_max_response_size()?),
            );
        if let Some(user_agent) = config.get_user_agent()? {
            webservice = webservice.with_user_agent(user_agent);
        }

        info!(
            hostname = %webservice.hostname,
            workspace_id = %webservice.workspace_id,
            "Relatics webservice configured"
        );
        Ok(webservice)
    }

    /// User agent sent with SOAP and token requests, shown in the Relatics logs
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_transport(mut self, transport: impl SoapTransport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Keeps every import zip archive, whatever the per-call options
    pub fn with_keep_zip_file(mut self, keep: bool) -> Self {
        self.keep_zip_file = keep;
        self
    }

    /// Base name of imported data when no file name is given
    pub fn with_import_basename(mut self, basename: impl Into<String>) -> Self {
        self.payload = self.payload.with_default_basename(basename);
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn wsdl_url(&self) -> &str {
        &self.wsdl_url
    }

    /// Calls `GetResult` and returns the raw `GetResultResult` element
    ///
    /// `parameters` are injected as `Parameters/Parameters/Parameter`
    /// elements.
    pub fn get_result(
        &self,
        operation_name: &str,
        parameters: Option<&Parameters>,
        authentication: Authentication<'_>,
    ) -> Result<Option<Element>> {
        validate_operation(operation_name)?;

        let (auth_arg, headers) = self.authenticate(authentication)?;
        let mut envelope = build_soap_request(
            "GetResult",
            &[
                SoapArg::text("Operation", operation_name),
                self.identification(),
                auth_arg,
            ],
        );

        if let Some(parameters) = parameters.filter(|p| !p.is_empty()) {
            let pairs: Vec<(&str, &str)> = parameters
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            inject_parameters(&mut envelope, &pairs)?;
        }

        info!("Calling GetResult operation {:?} on {}", operation_name, self.hostname);
        self.send("GetResult", headers, envelope)
    }

    /// Calls `Import` and returns the raw `ImportResult` element
    ///
    /// Arguments are validated and the payload is built before any
    /// network traffic, token requests included.
    pub fn run_import(
        &self,
        operation_name: &str,
        data: &ImportData,
        authentication: Authentication<'_>,
        options: &ImportOptions,
    ) -> Result<Option<Element>> {
        validate_operation(operation_name)?;
        if data.is_empty() {
            return Err(RelaticsError::validation("Supplied data is empty"));
        }

        let documents = (!options.documents.is_empty()).then_some(options.documents.as_slice());
        let payload = self
            .payload
            .clone()
            .with_keep_zip_file(self.keep_zip_file || options.keep_zip_file)
            .build(data, options.file_name.as_deref(), documents)?;
        debug!(filename = %payload.filename, size = payload.data.len(), "Import payload built");

        let (auth_arg, headers) = self.authenticate(authentication)?;
        let envelope = build_soap_request(
            "Import",
            &[
                SoapArg::text("Operation", operation_name),
                self.identification(),
                auth_arg,
                SoapArg::text("Filename", &payload.filename),
                SoapArg::text("Data", &payload.data),
            ],
        );

        info!(
            "Calling Import operation {:?} on {} with {}",
            operation_name, self.hostname, payload.filename
        );
        self.send("Import", headers, envelope)
    }

    /// [`get_result`](Self::get_result) normalized into an [`ExportResult`]
    pub fn export(
        &self,
        operation_name: &str,
        parameters: Option<&Parameters>,
        authentication: Authentication<'_>,
    ) -> Result<ExportResult> {
        let response = self.get_result(operation_name, parameters, authentication)?;
        Ok(ExportResult::from_response(response))
    }

    /// [`run_import`](Self::run_import) normalized into an [`ImportResult`]
    pub fn import(
        &self,
        operation_name: &str,
        data: &ImportData,
        authentication: Authentication<'_>,
        options: &ImportOptions,
    ) -> Result<ImportResult> {
        let response = self.run_import(operation_name, data, authentication, options)?;
        Ok(ImportResult::from_response(response))
    }

    fn identification(&self) -> SoapArg {
        SoapArg::attributes("Identification", &[("Workspace", self.workspace_id.as_str())])
    }

    /// `Authentication` argument and extra HTTP headers
    ///
    /// The service rejects a missing block, so an empty one is sent when
    /// there is no entry code.
    fn authenticate(
        &self,
        authentication: Authentication<'_>,
    ) -> Result<(SoapArg, Vec<(String, String)>)> {
        let mut headers = vec![("User-Agent".to_string(), self.user_agent.clone())];

        let arg = match authentication {
            Authentication::None => SoapArg::attributes("Authentication", &[]),
            Authentication::EntryCode(code) => {
                SoapArg::attributes("Authentication", &[("Entrycode", code)])
            }
            Authentication::ClientCredential(credential) => {
                let token =
                    credential.get_token_with_agent(&self.hostname, false, &self.user_agent)?;
                headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
                SoapArg::attributes("Authentication", &[])
            }
        };

        Ok((arg, headers))
    }

    fn send(
        &self,
        operation: &str,
        headers: Vec<(String, String)>,
        envelope: Element,
    ) -> Result<Option<Element>> {
        let request = SoapRequest {
            endpoint: self.endpoint.clone(),
            operation: operation.to_string(),
            headers,
            envelope,
        };
        self.transport.call(&request)
    }
}

fn validate_operation(operation_name: &str) -> Result<()> {
    if operation_name.trim().is_empty() {
        return Err(RelaticsError::validation("Supplied operation name is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_from_company_name() {
        let ws = RelaticsWebservice::new("AcmeCorp", "ws-123");
        assert_eq!(ws.hostname(), "acmecorp.relaticsonline.com");
        assert_eq!(
            ws.endpoint(),
            "https://acmecorp.relaticsonline.com/DataExchange.asmx"
        );
        assert_eq!(
            ws.wsdl_url(),
            "https://acmecorp.relaticsonline.com/DataExchange.asmx?wsdl"
        );
        assert_eq!(ws.workspace_id(), "ws-123");
        assert_eq!(ws.user_agent(), USER_AGENT);
    }

    #[test]
    fn test_authentication_blocks() {
        let ws = RelaticsWebservice::new("acme", "ws").with_user_agent("tests/1.0");

        let (arg, headers) = ws.authenticate(Authentication::None).unwrap();
        assert_eq!(arg, SoapArg::attributes("Authentication", &[]));
        assert_eq!(
            headers,
            vec![("User-Agent".to_string(), "tests/1.0".to_string())]
        );

        let (arg, headers) = ws.authenticate(Authentication::from("code")).unwrap();
        assert_eq!(arg, SoapArg::attributes("Authentication", &[("Entrycode", "code")]));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_empty_operation_name() {
        let ws = RelaticsWebservice::new("acme", "ws");
        assert!(ws.get_result("", None, Authentication::None).unwrap_err().is_validation());
        assert!(
            ws.run_import(
                "  ",
                &ImportData::from("data.csv"),
                Authentication::None,
                &ImportOptions::default()
            )
            .unwrap_err()
            .is_validation()
        );
    }

    #[test]
    fn test_from_config_with() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert!(RelaticsWebservice::from_config_with(&config).is_err());

        config.set_relatics_company_name("Acme").unwrap();
        config.set_relatics_workspace_id("ws-1").unwrap();
        config.set_user_agent("configured/2.0").unwrap();

        let ws = RelaticsWebservice::from_config_with(&config).unwrap();
        assert_eq!(ws.hostname(), "acme.relaticsonline.com");
        assert_eq!(ws.user_agent(), "configured/2.0");
    }
}
