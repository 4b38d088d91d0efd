//! Relatics settings stored in the `rwsconfig` configuration
//!
//! Secrets (`client_secret`, `entry_code`) may be stored encrypted with
//! [`rwsconfig::encryption::encrypt_secret`]; they are decrypted
//! transparently.

use crate::transport::DEFAULT_MAX_RESPONSE_SIZE;
use anyhow::{Result, anyhow};
use rwsconfig::Config;
use rwsconfig::encryption;
use serde_yaml::Value;

/// Extension trait adding the Relatics settings to [`Config`]
///
/// ```rust,ignore
/// use rwsconfig::get_config;
/// use rwsclient::RelaticsConfigExt;
///
/// let config = get_config();
/// let company = config.get_relatics_company_name()?;
/// ```
pub trait RelaticsConfigExt {
    /// Company name, the first label of `<company>.relaticsonline.com`
    fn get_relatics_company_name(&self) -> Result<String>;

    fn set_relatics_company_name(&self, company_name: &str) -> Result<()>;

    /// Workspace identifier sent in every `Identification` block
    fn get_relatics_workspace_id(&self) -> Result<String>;

    fn set_relatics_workspace_id(&self, workspace_id: &str) -> Result<()>;

    /// Entry code, or `None` when not configured
    fn get_relatics_entry_code(&self) -> Result<Option<String>>;

    fn set_relatics_entry_code(&self, entry_code: &str) -> Result<()>;

    /// OAuth2 `(client_id, client_secret)`, or `None` when either is missing
    fn get_relatics_client_credentials(&self) -> Result<Option<(String, String)>>;

    /// Stores the OAuth2 credentials
    ///
    /// With `encrypt`, the secret is stored as `encrypted:...`, readable
    /// on this machine only.
    fn set_relatics_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        encrypt: bool,
    ) -> Result<()>;

    /// Directory where exported documents are saved, created if needed
    fn get_relatics_documents_dir(&self) -> Result<String>;

    /// Largest SOAP response body accepted, in bytes
    fn get_relatics_max_response_size(&self) -> Result<u64>;

    fn set_relatics_max_response_size(&self, limit: u64) -> Result<()>;
}

fn optional_string(config: &Config, path: &[&str]) -> Option<String> {
    config.get_scalar_string(path)
}

impl RelaticsConfigExt for Config {
    fn get_relatics_company_name(&self) -> Result<String> {
        optional_string(self, &["relatics", "company_name"])
            .ok_or_else(|| anyhow!("Relatics company name not configured"))
    }

    fn set_relatics_company_name(&self, company_name: &str) -> Result<()> {
        self.set_value(
            &["relatics", "company_name"],
            Value::String(company_name.to_string()),
        )
    }

    fn get_relatics_workspace_id(&self) -> Result<String> {
        optional_string(self, &["relatics", "workspace_id"])
            .ok_or_else(|| anyhow!("Relatics workspace id not configured"))
    }

    fn set_relatics_workspace_id(&self, workspace_id: &str) -> Result<()> {
        self.set_value(
            &["relatics", "workspace_id"],
            Value::String(workspace_id.to_string()),
        )
    }

    fn get_relatics_entry_code(&self) -> Result<Option<String>> {
        optional_string(self, &["relatics", "entry_code"])
            .map(|s| {
                encryption::get_secret(&s).map_err(|e| anyhow!("Failed to decrypt entry code: {}", e))
            })
            .transpose()
    }

    fn set_relatics_entry_code(&self, entry_code: &str) -> Result<()> {
        self.set_value(
            &["relatics", "entry_code"],
            Value::String(entry_code.to_string()),
        )
    }

    fn get_relatics_client_credentials(&self) -> Result<Option<(String, String)>> {
        let client_id = optional_string(self, &["relatics", "client_id"]);
        let client_secret = optional_string(self, &["relatics", "client_secret"]);

        match (client_id, client_secret) {
            (Some(id), Some(secret)) => {
                let secret = encryption::get_secret(&secret)
                    .map_err(|e| anyhow!("Failed to decrypt client secret: {}", e))?;
                Ok(Some((id, secret)))
            }
            _ => Ok(None),
        }
    }

    fn set_relatics_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        encrypt: bool,
    ) -> Result<()> {
        let stored = if encrypt {
            encryption::encrypt_secret(client_secret)?
        } else {
            client_secret.to_string()
        };

        self.set_value(
            &["relatics", "client_id"],
            Value::String(client_id.to_string()),
        )?;
        self.set_value(&["relatics", "client_secret"], Value::String(stored))
    }

    fn get_relatics_documents_dir(&self) -> Result<String> {
        self.get_managed_dir(&["host", "documents", "directory"], "documents")
    }

    fn get_relatics_max_response_size(&self) -> Result<u64> {
        match self.get_value(&["relatics", "max_response_size"]) {
            Ok(Value::Number(n)) => n
                .as_u64()
                .filter(|&limit| limit > 0)
                .ok_or_else(|| anyhow!("relatics.max_response_size must be a positive integer")),
            Ok(Value::Null) | Err(_) => Ok(DEFAULT_MAX_RESPONSE_SIZE),
            Ok(other) => Err(anyhow!(
                "relatics.max_response_size must be a positive integer, got {:?}",
                other
            )),
        }
    }

    fn set_relatics_max_response_size(&self, limit: u64) -> Result<()> {
        self.set_value(&["relatics", "max_response_size"], Value::from(limit))
    }
}
