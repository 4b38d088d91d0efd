//! Calls a Relatics workspace configured in `~/.relatics/config.yaml`
//!
//! Authentication uses the OAuth2 client credentials when configured, the
//! entry code otherwise, and nothing when neither is set.
//!
//! Usage:
//! ```bash
//! # Export, with optional parameters
//! cargo run --example relatics_demo -- export getActions project=P1
//!
//! # Import of a spreadsheet, with optional attachments
//! cargo run --example relatics_demo -- import importActions actions.xlsx drawing.pdf
//! ```

use anyhow::{Context, bail};
use rwsclient::{
    Authentication, ClientCredential, ImportData, ImportOptions, Parameters, RelaticsConfigExt,
    RelaticsWebservice,
};
use rwsconfig::get_config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let config = get_config();

    // RUST_LOG overrides the configured level
    let level = config.get_log_min_level()?.to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, operation, rest) = match args.as_slice() {
        [command, operation, rest @ ..] => (command.as_str(), operation.as_str(), rest),
        _ => bail!("usage: relatics_demo <export|import> <operation> [args...]"),
    };

    let webservice = RelaticsWebservice::from_config()?;
    println!("Workspace {} on {}", webservice.workspace_id(), webservice.hostname());

    let credential = match ClientCredential::from_config() {
        Ok(credential) => Some(credential),
        Err(e) => {
            tracing::debug!("No client credentials: {}", e);
            None
        }
    };
    let entry_code = config.get_relatics_entry_code()?;
    let authentication = match (&credential, &entry_code) {
        (Some(credential), _) => Authentication::from(credential),
        (None, Some(code)) => Authentication::EntryCode(code.as_str()),
        (None, None) => Authentication::None,
    };

    match command {
        "export" => {
            let mut parameters = Parameters::new();
            for arg in rest {
                let (name, value) = arg
                    .split_once('=')
                    .with_context(|| format!("parameter {:?} is not name=value", arg))?;
                parameters.insert(name.to_string(), value.to_string());
            }

            let result = webservice.export(operation, Some(&parameters), authentication)?;
            println!("Success: {}", bool::from(&result));
            println!("{}", result);

            if !result.documents.is_empty() {
                let directory = config.get_relatics_documents_dir()?;
                for path in result.save_documents(&directory)? {
                    println!("Saved {}", path.display());
                }
            }
        }
        "import" => {
            let [data, documents @ ..] = rest else {
                bail!("import needs a data file");
            };

            let options = ImportOptions::default()
                .with_documents(documents.iter().map(PathBuf::from).collect());
            let result = webservice.import(
                operation,
                &ImportData::from(data.as_str()),
                authentication,
                &options,
            )?;
            println!("Success: {}", bool::from(&result));
            println!("{}", result);
        }
        other => bail!("unknown command {:?}", other),
    }

    Ok(())
}
