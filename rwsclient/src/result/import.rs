use super::{BaseResult, ResponseKind};
use chrono::{Duration, NaiveTime};
use colored::{Color, Colorize};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, warn};
use xmltree::Element;

static PROCESSING_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Processing row\s*:\s*(\d+)").expect("valid regex"));
static TOTAL_ROWS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Total rows imported:\s*(\d+)").expect("valid regex"));
static TOTAL_TIME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Total time \(ms\):\s*(\d+)").expect("valid regex"));

/// Status of an import log message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportMessageStatus {
    Progress,
    Comment,
    Success,
    Warning,
    Error,
    Other(String),
}

impl ImportMessageStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Progress => "Progress",
            Self::Comment => "Comment",
            Self::Success => "Success",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ImportMessageStatus {
    fn from(value: &str) -> Self {
        match value {
            "Progress" => Self::Progress,
            "Comment" => Self::Comment,
            "Success" => Self::Success,
            "Warning" => Self::Warning,
            "Error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ImportMessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Terminal color per status, `None` keeps the default color
const STATUS_COLORS: [(&str, Option<Color>); 5] = [
    ("Progress", Some(Color::Blue)),
    ("Comment", None),
    ("Success", Some(Color::Green)),
    ("Warning", Some(Color::Yellow)),
    ("Error", Some(Color::Red)),
];

fn status_color(status: &ImportMessageStatus) -> Option<Color> {
    STATUS_COLORS
        .iter()
        .find(|(name, _)| *name == status.as_str())
        .and_then(|(_, color)| *color)
}

/// Action applied to an imported element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImportElementAction {
    Add,
    Update,
    Other(String),
}

impl ImportElementAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Add => "Add",
            Self::Update => "Update",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ImportElementAction {
    fn from(value: &str) -> Self {
        match value {
            "Add" => Self::Add,
            "Update" => Self::Update,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ImportElementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One line of the import log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMessage {
    pub time: NaiveTime,
    pub status: ImportMessageStatus,
    pub message: String,

    /// Row being processed when the message was logged
    pub row: u32,
}

impl fmt::Display for ImportMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = format!("{:<8}", self.status);
        let status = match status_color(&self.status) {
            Some(color) => status.color(color),
            None => status.normal(),
        };
        write!(
            f,
            "{}  {:05}  {}  {}",
            self.time.format("%H:%M:%S"),
            self.row,
            status,
            self.message
        )
    }
}

/// An element added or updated by the import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportElement {
    pub action: ImportElementAction,
    pub id: String,
    pub foreign_key: String,
}

impl fmt::Display for ImportElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<6}  {}  {}", self.action, self.id, self.foreign_key)
    }
}

/// A `Message` element as found in the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub time: String,
    pub status: String,
    pub text: String,
}

impl RawMessage {
    pub fn new(time: &str, status: &str, text: &str) -> Self {
        Self {
            time: time.to_string(),
            status: status.to_string(),
            text: text.to_string(),
        }
    }

    fn from_element(element: &Element) -> Self {
        let attribute = |name: &str| element.attributes.get(name).cloned().unwrap_or_default();
        Self {
            time: attribute("Time"),
            status: attribute("Result"),
            text: element
                .get_text()
                .map(|t| t.into_owned())
                .unwrap_or_default(),
        }
    }
}

/// Messages of an import log with the figures found in them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    pub messages: Vec<ImportMessage>,
    pub total_rows: Option<u64>,
    pub elapsed_time: Option<Duration>,
}

/// Turns raw messages into [`ImportMessage`]s
///
/// The row counter starts at 0 and follows the `Processing row : <n>`
/// progress messages. A message is tagged with the row current before it
/// is read. `Total rows imported: <n>` and `Total time (ms): <n>` progress
/// messages set the totals. Every message is kept, in order.
pub fn fold_messages<'a, I>(raw: I) -> MessageLog
where
    I: IntoIterator<Item = &'a RawMessage>,
{
    let (log, _) = raw
        .into_iter()
        .fold((MessageLog::default(), 0u32), |(mut log, row), raw| {
            let status = ImportMessageStatus::from(raw.status.as_str());
            log.messages.push(ImportMessage {
                time: parse_time(&raw.time),
                status: status.clone(),
                message: raw.text.clone(),
                row,
            });

            let mut next_row = row;
            if status == ImportMessageStatus::Progress {
                if let Some(n) = capture_number(&PROCESSING_ROW, &raw.text) {
                    next_row = u32::try_from(n).unwrap_or(row);
                } else if let Some(n) = capture_number(&TOTAL_ROWS, &raw.text) {
                    log.total_rows = Some(n);
                } else if let Some(n) = capture_number(&TOTAL_TIME, &raw.text) {
                    log.elapsed_time = i64::try_from(n).ok().map(Duration::milliseconds);
                }
            }

            (log, next_row)
        });
    log
}

fn capture_number(pattern: &Regex, text: &str) -> Option<u64> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_time(value: &str) -> NaiveTime {
    NaiveTime::parse_from_str(value.trim(), "%H:%M:%S%.f").unwrap_or_else(|e| {
        warn!("Unparsable message time {:?}: {}", value, e);
        NaiveTime::default()
    })
}

/// Renders a duration as `h:mm:ss.ffffff`
pub fn format_elapsed(duration: &Duration) -> String {
    let micros = duration.num_microseconds().unwrap_or(i64::MAX).max(0);
    let seconds = micros / 1_000_000;
    format!(
        "{}:{:02}:{:02}.{:06}",
        seconds / 3600,
        (seconds / 60) % 60,
        seconds % 60,
        micros % 1_000_000
    )
}

/// Result of an `Import` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub has_error: bool,
    pub error_msg: Option<String>,
    pub messages: Vec<ImportMessage>,
    pub elements: Vec<ImportElement>,
    pub total_rows: Option<u64>,
    pub elapsed_time: Option<Duration>,
}

impl ImportResult {
    pub fn from_response(response: Option<Element>) -> Self {
        let kind = ResponseKind::classify(response.as_ref(), "Import");
        let (has_error, error_msg) = kind.error();

        let mut result = Self {
            has_error,
            error_msg,
            ..Default::default()
        };

        let Some(import) = response.as_ref().and_then(|r| r.get_child("Import")) else {
            return result;
        };

        let raw: Vec<RawMessage> = child_elements(import, "Message")
            .map(RawMessage::from_element)
            .collect();
        let log = fold_messages(&raw);
        result.messages = log.messages;
        result.total_rows = log.total_rows;
        result.elapsed_time = log.elapsed_time;

        let mut groups = child_elements(import, "Elements");
        if let Some(group) = groups.next() {
            result.elements = group
                .children
                .iter()
                .filter_map(|n| n.as_element())
                .map(|e| {
                    let attribute = |name: &str| e.attributes.get(name).cloned().unwrap_or_default();
                    ImportElement {
                        action: ImportElementAction::from(attribute("Action").as_str()),
                        id: attribute("ID"),
                        foreign_key: attribute("ForeignKey"),
                    }
                })
                .collect();
        }
        let ignored = groups.count();
        if ignored > 0 {
            debug!("Ignoring {} additional Elements group(s)", ignored);
        }

        result
    }

    /// Messages with the given status, in log order
    pub fn filter_messages(&self, status: &ImportMessageStatus) -> Vec<&ImportMessage> {
        self.messages.iter().filter(|m| &m.status == status).collect()
    }

    pub fn progress_messages(&self) -> Vec<&ImportMessage> {
        self.filter_messages(&ImportMessageStatus::Progress)
    }

    pub fn comment_messages(&self) -> Vec<&ImportMessage> {
        self.filter_messages(&ImportMessageStatus::Comment)
    }

    pub fn success_messages(&self) -> Vec<&ImportMessage> {
        self.filter_messages(&ImportMessageStatus::Success)
    }

    pub fn warning_messages(&self) -> Vec<&ImportMessage> {
        self.filter_messages(&ImportMessageStatus::Warning)
    }

    pub fn error_messages(&self) -> Vec<&ImportMessage> {
        self.filter_messages(&ImportMessageStatus::Error)
    }

    /// Elements with the given action, in response order
    pub fn filter_elements(&self, action: &ImportElementAction) -> Vec<&ImportElement> {
        self.elements.iter().filter(|e| &e.action == action).collect()
    }

    pub fn added_elements(&self) -> Vec<&ImportElement> {
        self.filter_elements(&ImportElementAction::Add)
    }

    pub fn updated_elements(&self) -> Vec<&ImportElement> {
        self.filter_elements(&ImportElementAction::Update)
    }
}

fn child_elements<'a>(parent: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> {
    parent
        .children
        .iter()
        .filter_map(|n| n.as_element())
        .filter(move |e| e.name == name)
}

impl BaseResult for ImportResult {
    fn has_error(&self) -> bool {
        self.has_error
    }

    fn error_msg(&self) -> Option<&str> {
        self.error_msg.as_deref()
    }
}

impl From<&ImportResult> for bool {
    fn from(result: &ImportResult) -> bool {
        !result.has_error
    }
}

impl fmt::Display for ImportResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_error {
            writeln!(
                f,
                "{} {}",
                "ERROR:".red().bold(),
                self.error_msg.as_deref().unwrap_or_default()
            )?;
        }

        if let Some(total_rows) = self.total_rows {
            writeln!(f, "Rows imported : {}", total_rows)?;
        }

        if let Some(elapsed) = &self.elapsed_time {
            writeln!(f, "Elapsed time  : {} (h:mm:ss.ffffff)", format_elapsed(elapsed))?;
        }

        if !self.messages.is_empty() {
            writeln!(f, "[Messages]:")?;
            writeln!(f, "{}", "Time      Row    Status    Message".bold())?;
            for message in &self.messages {
                writeln!(f, "{}", message)?;
            }
        }

        if !self.elements.is_empty() {
            writeln!(f, "[Elements]:")?;
            writeln!(
                f,
                "{}",
                "Action  ID                                    Foreign key".bold()
            )?;
            for element in &self.elements {
                writeln!(f, "{}", element)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMPORT_RESULT: &str = r#"<ImportResult>
  <Import>
    <Message Time="21:52:34" Result="Progress">Successfully created ImportLog.</Message>
    <Message Time="21:52:34" Result="Progress">Processing row : 00001</Message>
    <Message Time="21:52:34" Result="Success">Element added</Message>
    <Message Time="21:52:35" Result="Progress">Processing row : 00002</Message>
    <Message Time="21:52:35" Result="Warning">Value truncated</Message>
    <Message Time="21:52:35" Result="Progress">Total rows imported: 2</Message>
    <Message Time="21:52:35" Result="Progress">Total time (ms): 3723004</Message>
    <Elements>
      <Element Action="Add" ID="a1b2" ForeignKey="Object 1"/>
      <Element Action="Update" ID="c3d4" ForeignKey="Object 2"/>
    </Elements>
  </Import>
</ImportResult>"#;

    fn parse(xml: &str) -> Element {
        Element::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_row_follows_processing_messages() {
        let raw = vec![
            RawMessage::new("10:00:00", "Progress", "Processing row : 00001"),
            RawMessage::new("10:00:01", "Success", "ok"),
        ];

        let log = fold_messages(&raw);

        assert_eq!(log.messages.len(), 2);
        assert_eq!(log.messages[0].row, 0);
        assert_eq!(log.messages[1].row, 1);
        assert_eq!(log.total_rows, None);
        assert_eq!(log.elapsed_time, None);
    }

    #[test]
    fn test_patterns_only_apply_to_progress() {
        let raw = vec![
            RawMessage::new("10:00:00", "Comment", "Processing row : 7"),
            RawMessage::new("10:00:00", "Comment", "Total rows imported: 9"),
            RawMessage::new("10:00:01", "Success", "ok"),
        ];

        let log = fold_messages(&raw);
        assert!(log.messages.iter().all(|m| m.row == 0));
        assert_eq!(log.total_rows, None);
    }

    #[test]
    fn test_unparsable_time_falls_back_to_midnight() {
        let log = fold_messages(&[RawMessage::new("soon", "Progress", "x")]);
        assert_eq!(log.messages[0].time, NaiveTime::default());
    }

    #[test]
    fn test_from_response() {
        let result = ImportResult::from_response(Some(parse(IMPORT_RESULT)));

        assert!(!result.has_error);
        assert!(bool::from(&result));
        assert_eq!(result.messages.len(), 7);

        let rows: Vec<u32> = result.messages.iter().map(|m| m.row).collect();
        assert_eq!(rows, vec![0, 0, 1, 1, 2, 2, 2]);

        assert_eq!(result.total_rows, Some(2));
        assert_eq!(result.elapsed_time, Some(Duration::milliseconds(3_723_004)));
        assert_eq!(
            result.messages[0].time,
            NaiveTime::from_hms_opt(21, 52, 34).unwrap()
        );

        assert_eq!(result.progress_messages().len(), 5);
        assert_eq!(result.success_messages().len(), 1);
        assert_eq!(result.warning_messages()[0].message, "Value truncated");
        assert!(result.error_messages().is_empty());
        assert!(result.comment_messages().is_empty());

        assert_eq!(result.elements.len(), 2);
        assert_eq!(result.added_elements()[0].id, "a1b2");
        assert_eq!(result.updated_elements()[0].foreign_key, "Object 2");
    }

    #[test]
    fn test_only_first_elements_group_is_read() {
        let xml = r#"<ImportResult><Import>
            <Elements><Element Action="Add" ID="1" ForeignKey="a"/></Elements>
            <Elements><Element Action="Add" ID="2" ForeignKey="b"/></Elements>
        </Import></ImportResult>"#;

        let result = ImportResult::from_response(Some(parse(xml)));
        assert_eq!(result.elements.len(), 1);
        assert_eq!(result.elements[0].id, "1");
    }

    #[test]
    fn test_unknown_values_are_preserved() {
        let xml = r#"<ImportResult><Import>
            <Message Time="08:00:00" Result="Debug">hello</Message>
            <Elements><Element Action="Delete" ID="1" ForeignKey="a"/></Elements>
        </Import></ImportResult>"#;

        let result = ImportResult::from_response(Some(parse(xml)));
        assert_eq!(
            result.messages[0].status,
            ImportMessageStatus::Other("Debug".to_string())
        );
        assert_eq!(
            result.elements[0].action,
            ImportElementAction::Other("Delete".to_string())
        );
        assert!(result.added_elements().is_empty());
    }

    #[test]
    fn test_error_responses() {
        let empty = ImportResult::from_response(None);
        assert!(empty.has_error);
        assert!(!bool::from(&empty));

        let error = ImportResult::from_response(Some(parse(
            r#"<ImportResult><Export Error="Import not allowed"/></ImportResult>"#,
        )));
        assert!(error.has_error);
        assert_eq!(error.error_msg(), Some("Import not allowed"));

        let unknown = ImportResult::from_response(Some(parse("<ImportResult><Report/></ImportResult>")));
        assert!(unknown.has_error);
        assert!(unknown.error_msg.unwrap().contains("Report"));
    }

    #[test]
    fn test_display() {
        colored::control::set_override(false);

        let result = ImportResult::from_response(Some(parse(IMPORT_RESULT)));
        let text = result.to_string();

        assert!(text.contains("Rows imported : 2"));
        assert!(text.contains("Elapsed time  : 1:02:03.004000"));
        assert!(text.contains("21:52:34  00001  Success   Element added"));
        assert!(text.contains("Add     a1b2  Object 1"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(&Duration::milliseconds(0)), "0:00:00.000000");
        assert_eq!(format_elapsed(&Duration::milliseconds(1500)), "0:00:01.500000");
        assert_eq!(format_elapsed(&Duration::seconds(90_061)), "25:01:01.000000");
    }
}
