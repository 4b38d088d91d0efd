use super::{BaseResult, ResponseKind, serialize_tree};
use crate::error::Result;
use base64::Engine;
use colored::Colorize;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use xmltree::{Element, XMLNode};
use zip::ZipArchive;

/// Result of a `GetResult` call
///
/// Documents attached to the report (`Report/Documents`, a base64 zip) are
/// extracted into [`documents`](Self::documents) and removed from
/// [`data`](Self::data).
#[derive(Debug, Clone, Default)]
pub struct ExportResult {
    pub has_error: bool,
    pub error_msg: Option<String>,

    /// Response tree (`GetResultResult`) without the documents
    pub data: Option<Element>,

    /// File name to content, in archive order
    pub documents: IndexMap<String, Vec<u8>>,
}

impl ExportResult {
    pub fn from_response(response: Option<Element>) -> Self {
        let kind = ResponseKind::classify(response.as_ref(), "Report");
        let (mut has_error, mut error_msg) = kind.error();

        let mut response = response;
        let mut documents = IndexMap::new();

        if let Some(report) = response.as_mut().and_then(|r| r.get_mut_child("Report")) {
            if let Some(encoded) = inline_documents(report) {
                match decode_documents(&encoded) {
                    Ok(decoded) => documents = decoded,
                    Err(e) => {
                        warn!("Failed to decode report documents: {}", e);
                        if !has_error {
                            has_error = true;
                            error_msg = Some(format!("Failed to decode report documents: {}", e));
                        }
                    }
                }
                report.take_child("Documents");
            }
        }

        Self {
            has_error,
            error_msg,
            data: response,
            documents,
        }
    }

    /// Writes every document into `directory`, created when missing
    ///
    /// Names are reduced to their last path component; directory entries
    /// are skipped. When two documents reduce to the same name, the later
    /// one is saved as `name (1).ext`, `name (2).ext`, ... Returns the
    /// written paths in document order.
    pub fn save_documents(&self, directory: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;

        let mut used = HashSet::new();
        let mut written = Vec::with_capacity(self.documents.len());
        for (name, content) in &self.documents {
            let base_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
            if base_name.is_empty() {
                continue;
            }
            let file_name = unique_name(base_name, &mut used);
            if file_name != base_name {
                warn!("Document {} saved as {} to avoid a name collision", name, file_name);
            }
            let path = directory.join(&file_name);
            fs::write(&path, content)?;
            debug!("Saved document {} ({} bytes)", path.display(), content.len());
            written.push(path);
        }

        Ok(written)
    }
}

/// `name`, or `stem (n).ext` with the first free `n`, recorded in `used`
fn unique_name(name: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut n = 1;
    while used.contains(&candidate) {
        candidate = format!("{} ({}){}", stem, n, extension);
        n += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Text of `Report/Documents` when it is a plain text node
fn inline_documents(report: &Element) -> Option<String> {
    let documents = report.get_child("Documents")?;
    if documents
        .children
        .iter()
        .any(|n| matches!(n, XMLNode::Element(_)))
    {
        return None;
    }
    documents.get_text().map(|t| t.into_owned())
}

fn decode_documents(encoded: &str) -> Result<IndexMap<String, Vec<u8>>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(compact)?;

    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut documents = IndexMap::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        // Directory entries are kept with no content, as the archive lists them.
        let name = file.name().to_string();
        let mut content = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut content)?;
        documents.insert(name, content);
    }

    debug!(
        documents = ?documents.keys().collect::<Vec<_>>(),
        "Report documents extracted"
    );
    Ok(documents)
}

impl BaseResult for ExportResult {
    fn has_error(&self) -> bool {
        self.has_error
    }

    fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }
}

impl From<&ExportResult> for bool {
    fn from(result: &ExportResult) -> bool {
        !result.has_error
    }
}

impl fmt::Display for ExportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_error {
            writeln!(
                f,
                "{} {}",
                "ERROR:".red().bold(),
                self.error_msg.as_deref().unwrap_or_default()
            )?;
        }

        if let Some(data) = &self.data {
            writeln!(f, "[Data]:")?;
            writeln!(f, "{}", serialize_tree(data))?;
        }

        if !self.documents.is_empty() {
            writeln!(f, "[Documents]:")?;
            writeln!(
                f,
                "{}",
                format!("{:<45} {:>12}", "RelaticsFilename", "Size (bytes)").bold()
            )?;
            for (name, content) in &self.documents {
                writeln!(f, "{:<45} {:>12}", name, content.len())?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    fn zip_base64(files: &[(&str, &[u8])]) -> String {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        let bytes = zip.finish().unwrap().into_inner();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn parse(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_documents_are_extracted_and_removed() {
        let encoded = zip_base64(&[("a.txt", b"hello")]);
        let response = parse(&format!(
            r#"<GetResultResult><Report ReportName="r"><row id="1"/><Documents>{}</Documents></Report></GetResultResult>"#,
            encoded
        ));

        let result = ExportResult::from_response(Some(response));

        assert!(!result.has_error);
        assert!(bool::from(&result));
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.documents["a.txt"], b"hello".to_vec());

        let report = result.data.as_ref().unwrap().get_child("Report").unwrap();
        assert!(report.get_child("Documents").is_none());
        assert!(report.get_child("row").is_some());
    }

    #[test]
    fn test_wrapped_base64_is_accepted() {
        let encoded = zip_base64(&[("b.bin", &[0u8, 1, 2, 3])]);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(16)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        let response = parse(&format!(
            "<GetResultResult><Report><Documents>{}</Documents></Report></GetResultResult>",
            wrapped
        ));

        let result = ExportResult::from_response(Some(response));
        assert_eq!(result.documents["b.bin"], vec![0u8, 1, 2, 3]);
    }

    #[test]
    fn test_corrupted_documents_flag_error() {
        let response = parse(
            "<GetResultResult><Report><Documents>bm90IGEgemlw</Documents></Report></GetResultResult>",
        );

        let result = ExportResult::from_response(Some(response));
        assert!(result.has_error);
        assert!(result.error_msg.unwrap().contains("documents"));
    }

    #[test]
    fn test_report_without_documents() {
        let response = parse(r#"<GetResultResult><Report><row id="1"/></Report></GetResultResult>"#);
        let result = ExportResult::from_response(Some(response));
        assert!(!result.has_error);
        assert!(result.documents.is_empty());
        assert!(result.to_string().contains("[Data]:"));
    }

    #[test]
    fn test_empty_and_error_responses_are_falsy() {
        let empty = ExportResult::from_response(None);
        assert!(empty.has_error);
        assert!(!bool::from(&empty));
        assert_eq!(empty.error_msg(), Some(""));

        let error = ExportResult::from_response(Some(parse(
            r#"<GetResultResult><Export Error="Operation not found"/></GetResultResult>"#,
        )));
        assert!(!error.is_success());
        assert_eq!(error.error_msg(), Some("Operation not found"));
        assert!(error.to_string().contains("Operation not found"));

        let unknown = ExportResult::from_response(Some(parse("<GetResultResult><Other/></GetResultResult>")));
        assert!(unknown.has_error);
    }

    #[test]
    fn test_save_documents() {
        let mut result = ExportResult::default();
        result
            .documents
            .insert("sub/a.txt".to_string(), b"hello".to_vec());
        result.documents.insert("b.txt".to_string(), b"world".to_vec());

        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let written = result.save_documents(&target).unwrap();

        assert_eq!(written, vec![target.join("a.txt"), target.join("b.txt")]);
        assert_eq!(fs::read(target.join("a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(target.join("b.txt")).unwrap(), b"world");
    }

    #[test]
    fn test_directory_entries_are_listed() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.add_directory("sub/", options).unwrap();
        zip.start_file("sub/a.txt", options).unwrap();
        zip.write_all(b"hello").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

        let documents = decode_documents(&encoded).unwrap();
        assert_eq!(
            documents.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["sub/", "sub/a.txt"]
        );
        assert!(documents["sub/"].is_empty());

        let result = ExportResult {
            documents,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let written = result.save_documents(dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("a.txt")]);
    }

    #[test]
    fn test_colliding_names_are_renamed() {
        let mut result = ExportResult::default();
        result.documents.insert("one/a.txt".to_string(), b"1".to_vec());
        result.documents.insert("two/a.txt".to_string(), b"2".to_vec());
        result.documents.insert("three/a.txt".to_string(), b"3".to_vec());
        result.documents.insert("x/README".to_string(), b"r1".to_vec());
        result.documents.insert("y/README".to_string(), b"r2".to_vec());

        let dir = tempfile::tempdir().unwrap();
        let written = result.save_documents(dir.path()).unwrap();

        let names: Vec<_> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["a.txt", "a (1).txt", "a (2).txt", "README", "README (1)"]
        );
        assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"1");
        assert_eq!(fs::read(dir.path().join("a (1).txt")).unwrap(), b"2");
        assert_eq!(fs::read(dir.path().join("a (2).txt")).unwrap(), b"3");
        assert_eq!(fs::read(dir.path().join("README (1)")).unwrap(), b"r2");
    }
}
