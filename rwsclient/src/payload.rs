//! Construction of the `Data` blob of an import
//!
//! Import data is either a list of rows, sent as an XML document
//! (`<Import><Row key="value" .../></Import>`), or a spreadsheet/CSV file
//! sent as is. With attached documents both end up in a zip archive next
//! to a `Documents/` directory. The final blob is base64 encoded.

use crate::error::{RelaticsError, Result};
use base64::Engine;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use quick_xml::escape::escape;
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Base name of the imported file when the caller gives none
pub const IMPORT_BASENAME: &str = "relatics_webservice";

/// Extensions accepted for file imports
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "csv"];

/// Directory of the attachments inside the import archive
pub const DOCUMENTS_DIR: &str = "Documents";

static XML_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid XML name regex"));

/// One import row: column name to value, in column order
pub type Row = IndexMap<String, String>;

/// Data of an import
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportData {
    /// Rows serialized as an XML document
    Rows(Vec<Row>),

    /// Path of an Excel or CSV file
    File(PathBuf),
}

impl ImportData {
    pub fn is_empty(&self) -> bool {
        match self {
            ImportData::Rows(rows) => rows.is_empty(),
            ImportData::File(path) => path.as_os_str().is_empty(),
        }
    }
}

impl From<Vec<Row>> for ImportData {
    fn from(rows: Vec<Row>) -> Self {
        ImportData::Rows(rows)
    }
}

impl From<PathBuf> for ImportData {
    fn from(path: PathBuf) -> Self {
        ImportData::File(path)
    }
}

impl From<&Path> for ImportData {
    fn from(path: &Path) -> Self {
        ImportData::File(path.to_path_buf())
    }
}

impl From<&str> for ImportData {
    fn from(path: &str) -> Self {
        ImportData::File(PathBuf::from(path))
    }
}

/// Encoded import payload, ready for the `Filename` and `Data` arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPayload {
    /// `{base}.{extension}`
    pub filename: String,

    /// Base64 of the XML document, the data file or the zip archive
    pub data: String,
}

/// Builds [`ImportPayload`]s
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    default_basename: String,
    keep_zip_file: bool,
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self {
            default_basename: IMPORT_BASENAME.to_string(),
            keep_zip_file: false,
        }
    }

    /// Base name used when no file name is given
    pub fn with_default_basename(mut self, basename: impl Into<String>) -> Self {
        self.default_basename = basename.into();
        self
    }

    /// Keeps the zip archive as `{temp_dir}/{base}.zip` (debugging aid)
    pub fn with_keep_zip_file(mut self, keep: bool) -> Self {
        self.keep_zip_file = keep;
        self
    }

    /// Validates `data` and encodes it
    ///
    /// `file_name` is reduced to its base name: directories and extension
    /// are dropped, the extension is derived from the data. Attachments in
    /// `documents` are stored under `Documents/` in a zip archive.
    pub fn build(
        &self,
        data: &ImportData,
        file_name: Option<&str>,
        documents: Option<&[PathBuf]>,
    ) -> Result<ImportPayload> {
        if data.is_empty() {
            return Err(RelaticsError::validation("Supplied data is empty"));
        }

        let extension = match data {
            ImportData::Rows(rows) => {
                validate_rows(rows)?;
                "xml".to_string()
            }
            ImportData::File(path) => supported_extension(path)?,
        };

        let basename = file_name
            .map(base_name)
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| self.default_basename.clone());

        let (bytes, extension) = match documents.filter(|d| !d.is_empty()) {
            Some(documents) => {
                let archive = self.build_archive(data, &basename, &extension, documents)?;
                (archive, "zip".to_string())
            }
            None => {
                let bytes = match data {
                    ImportData::Rows(rows) => rows_to_xml(rows).into_bytes(),
                    ImportData::File(path) => fs::read(path)?,
                };
                (bytes, extension)
            }
        };

        Ok(ImportPayload {
            filename: format!("{}.{}", basename, extension),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    fn build_archive(
        &self,
        data: &ImportData,
        basename: &str,
        extension: &str,
        documents: &[PathBuf],
    ) -> Result<Vec<u8>> {
        // Removed on drop, including on every error path below.
        let mut temp = tempfile::Builder::new()
            .prefix(basename)
            .suffix(".zip")
            .tempfile()?;

        let mut entries = Vec::with_capacity(documents.len() + 1);
        let mut zip = ZipWriter::new(temp.as_file_mut());
        let options = SimpleFileOptions::default();

        for document in documents {
            let name = format!("{}/{}", DOCUMENTS_DIR, file_name_of(document)?);
            zip.start_file(name.as_str(), options)?;
            io::copy(&mut File::open(document)?, &mut zip)?;
            entries.push(name);
        }

        match data {
            ImportData::Rows(rows) => {
                let name = format!("{}.{}", basename, extension);
                zip.start_file(name.as_str(), options)?;
                zip.write_all(rows_to_xml(rows).as_bytes())?;
                entries.push(name);
            }
            ImportData::File(path) => {
                let name = file_name_of(path)?;
                zip.start_file(name.as_str(), options)?;
                io::copy(&mut File::open(path)?, &mut zip)?;
                entries.push(name);
            }
        }

        let file = zip.finish()?;
        file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        debug!(?entries, size = bytes.len(), "Zip-file created");

        if self.keep_zip_file {
            let kept = std::env::temp_dir().join(format!("{}.zip", basename));
            temp.persist(&kept).map_err(|e| e.error)?;
            debug!("Zip-file kept at {}", kept.display());
        }

        Ok(bytes)
    }
}

/// Serializes rows as `<Import><Row .../></Import>`
pub fn rows_to_xml(rows: &[Row]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push_str("<Import>");
    for row in rows {
        xml.push_str("<Row");
        for (key, value) in row {
            xml.push_str(&format!(r#" {}="{}""#, key, escape(value.as_str())));
        }
        xml.push_str("/>");
    }
    xml.push_str("</Import>");
    xml
}

/// Strips directories and extension from a file name
///
/// Both `/` and `\` count as separators, whatever the platform.
pub fn base_name(file_name: &str) -> String {
    let last = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn validate_rows(rows: &[Row]) -> Result<()> {
    for (index, row) in rows.iter().enumerate() {
        if let Some(key) = row.keys().find(|k| !XML_NAME.is_match(k)) {
            return Err(RelaticsError::validation(format!(
                "Row {} has an invalid column name: {:?}",
                index, key
            )));
        }
    }
    Ok(())
}

fn supported_extension(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(RelaticsError::validation(format!(
            "Supplied file has unsupported file extension: {:?}",
            extension
        )))
    }
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| RelaticsError::validation(format!("Not a file: {}", path.display())))
}
