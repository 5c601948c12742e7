//! BOINC remote job submission wire format
//!
//! Requests are small XML documents posted as the `request` form field.
//! Responses are parsed into a minimal element tree; only the handful of
//! elements the client needs are ever looked up.

use harvester_core::domain::batch::{BatchDescription, FileDescription, JobDescription};
use harvester_core::domain::worker::BatchId;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{ClientError, Result};

/// Renders a `submit_batch` request
pub fn submit_batch_request(authenticator: &str, batch: &BatchDescription) -> String {
    let mut xml = String::from("<submit_batch>\n");
    push_tag(&mut xml, "authenticator", authenticator);
    xml.push_str("<batch>\n");
    push_tag(&mut xml, "app_name", &batch.app_name);
    push_tag(&mut xml, "batch_name", &batch.batch_name);
    if let Some(template) = &batch.input_template {
        push_tag(&mut xml, "input_template_filename", template);
    }
    if let Some(template) = &batch.output_template {
        push_tag(&mut xml, "output_template_filename", template);
    }
    for job in &batch.jobs {
        push_job(&mut xml, job);
    }
    xml.push_str("</batch>\n</submit_batch>\n");
    xml
}

/// Renders a `query_batch` request asking for per-job details
pub fn query_batch_request(authenticator: &str, batch_id: &BatchId) -> String {
    let mut xml = String::from("<query_batch>\n");
    push_tag(&mut xml, "authenticator", authenticator);
    push_tag(&mut xml, "batch_id", batch_id.as_str());
    push_tag(&mut xml, "get_cpu_time", "1");
    push_tag(&mut xml, "get_job_details", "1");
    xml.push_str("</query_batch>\n");
    xml
}

fn push_job(xml: &mut String, job: &JobDescription) {
    xml.push_str("<job>\n");
    push_tag(xml, "command_line", &job.command_line);
    push_tag(xml, "rsc_fpops_est", &job.fpops_est.to_string());
    for file in &job.files {
        xml.push_str("<input_file>\n");
        match file {
            FileDescription::Inline { content } => {
                push_tag(xml, "mode", "inline");
                push_tag(xml, "source", content);
            }
            FileDescription::Reference { source } => {
                push_tag(xml, "mode", "local_staged");
                push_tag(xml, "source", source);
            }
        }
        xml.push_str("</input_file>\n");
    }
    xml.push_str("</job>\n");
}

fn push_tag(xml: &mut String, name: &str, value: &str) {
    xml.push('<');
    xml.push_str(name);
    xml.push('>');
    xml.push_str(&escape(value));
    xml.push_str("</");
    xml.push_str(name);
    xml.push_str(">\n");
}

/// A parsed XML element
///
/// Text is kept verbatim so inline file contents survive a round trip;
/// callers trim the values they interpret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// First direct child called `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children called `name`
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child called `name`
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Message of the distinguished error element
    ///
    /// The element may be the document root or its first child.
    pub fn error_message(&self) -> Option<String> {
        let error = if self.name == "error" {
            self
        } else {
            self.children.first().filter(|c| c.name == "error")?
        };
        Some(
            error
                .child_text("error_msg")
                .unwrap_or(error.text.as_str())
                .trim()
                .to_string(),
        )
    }
}

/// Parses a response document into an element tree
pub fn parse(document: &str) -> Result<Element> {
    let mut reader = Reader::from_str(document);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ClientError::ParseError(e.to_string()))?;

        match event {
            Event::Start(start) => {
                stack.push(Element::new(element_name(start.name().as_ref())));
            }
            Event::Empty(start) => {
                let element = Element::new(element_name(start.name().as_ref()));
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ClientError::ParseError(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ClientError::ParseError("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ClientError::ParseError(
            "document ended inside an element".to_string(),
        ));
    }

    root.ok_or_else(|| ClientError::ParseError("empty document".to_string()))
}

fn element_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(ClientError::ParseError(
                "more than one root element".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> BatchDescription {
        BatchDescription {
            app_name: "ATLAS_backfill".to_string(),
            batch_name: "manual:test".to_string(),
            input_template: Some("ATLAS_backfill_IN_2".to_string()),
            output_template: None,
            jobs: vec![JobDescription {
                files: vec![FileDescription::Inline {
                    content: "if [ $a < 3 ] && true; then".to_string(),
                }],
                fpops_est: 1e6,
                command_line: "BOINC BOINC_BACKFILL".to_string(),
            }],
        }
    }

    #[test]
    fn test_submit_request_layout() {
        let xml = submit_batch_request("key&1", &batch());
        assert!(xml.starts_with("<submit_batch>\n<authenticator>key&amp;1</authenticator>\n<batch>\n"));
        assert!(xml.contains("<input_template_filename>ATLAS_backfill_IN_2</input_template_filename>"));
        assert!(!xml.contains("output_template_filename"));
        assert!(xml.contains("<rsc_fpops_est>1000000</rsc_fpops_est>"));
        assert!(xml.contains("<source>if [ $a &lt; 3 ] &amp;&amp; true; then</source>"));
        assert!(xml.ends_with("</batch>\n</submit_batch>\n"));
    }

    #[test]
    fn test_inline_content_survives_parsing() {
        let xml = submit_batch_request("key", &batch());
        let root = parse(&xml).unwrap();
        let source = root
            .child("batch")
            .and_then(|b| b.child("job"))
            .and_then(|j| j.child("input_file"))
            .and_then(|f| f.child_text("source"))
            .unwrap();
        assert_eq!(source, "if [ $a < 3 ] && true; then");
    }

    #[test]
    fn test_query_request_layout() {
        let xml = query_batch_request("key", &BatchId::new("42"));
        let root = parse(&xml).unwrap();
        assert_eq!(root.name, "query_batch");
        assert_eq!(root.child_text("batch_id"), Some("42"));
        assert_eq!(root.child_text("get_job_details"), Some("1"));
    }

    #[test]
    fn test_error_element_at_root_or_first_child() {
        let root = parse("<error><error_msg>bad auth</error_msg></error>").unwrap();
        assert_eq!(root.error_message().as_deref(), Some("bad auth"));

        let wrapped =
            parse("<query_batch><error><error_msg>no batch</error_msg></error></query_batch>")
                .unwrap();
        assert_eq!(wrapped.error_message().as_deref(), Some("no batch"));

        let ok = parse("<batch><state>1</state></batch>").unwrap();
        assert_eq!(ok.error_message(), None);
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(parse("").is_err());
        assert!(parse("<batch><state>1</state>").is_err());
        assert!(parse("<a></b>").is_err());
        assert!(parse("<a/><b/>").is_err());
    }
}
