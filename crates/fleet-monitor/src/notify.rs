use crate::config::{EmailSettings, SmtpSettings};
use anyhow::Context;
use lettre::message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{Message, SmtpTransport, Transport};
use std::path::{Path, PathBuf};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const OCTET_STREAM_CONTENT_TYPE: &str = "application/octet-stream";

/// An HTML email with file attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<PathBuf>,
}

impl Envelope {
    pub fn new(
        email: &EmailSettings,
        subject: String,
        html_body: String,
        attachments: Vec<PathBuf>,
    ) -> Self {
        Self {
            from: email.from.clone(),
            to: email.to.clone(),
            cc: email.cc.clone(),
            bcc: email.bcc.clone(),
            subject,
            html_body,
            attachments,
        }
    }

    /// Every recipient: primary, then secondary, then hidden.
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(&self.cc)
            .chain(&self.bcc)
            .map(String::as_str)
    }
}

/// Delivers an `Envelope`.
pub trait Dispatch {
    fn dispatch(&self, envelope: &Envelope) -> anyhow::Result<()>;
}

fn mailbox(address: &str) -> anyhow::Result<Mailbox> {
    address
        .parse()
        .with_context(|| format!("invalid email address {address:?}"))
}

fn content_type(path: &Path) -> anyhow::Result<ContentType> {
    let is_xlsx = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("xlsx"));
    let content_type = if is_xlsx {
        XLSX_CONTENT_TYPE
    } else {
        OCTET_STREAM_CONTENT_TYPE
    };
    ContentType::parse(content_type).with_context(|| format!("invalid content type {content_type}"))
}

/// Builds the message for `envelope`, reading every attachment.
/// Fails if an attachment is missing.
pub fn build_message(envelope: &Envelope) -> anyhow::Result<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&envelope.from)?)
        .subject(envelope.subject.as_str());

    for address in &envelope.to {
        builder = builder.to(mailbox(address)?);
    }
    for address in &envelope.cc {
        builder = builder.cc(mailbox(address)?);
    }
    for address in &envelope.bcc {
        builder = builder.bcc(mailbox(address)?);
    }

    let mut body = MultiPart::mixed().singlepart(SinglePart::html(envelope.html_body.clone()));

    for path in &envelope.attachments {
        let content = std::fs::read(path)
            .with_context(|| format!("attachment not found: {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("attachment has no file name: {}", path.display()))?;

        body = body.singlepart(Attachment::new(filename.to_string()).body(content, content_type(path)?));
    }

    builder.multipart(body).context("building email message")
}

/// Sends over plain SMTP, without TLS or authentication.
pub struct SmtpDispatcher {
    server: String,
    port: u16,
}

impl SmtpDispatcher {
    pub fn new(smtp: &SmtpSettings) -> Self {
        Self {
            server: smtp.server.clone(),
            port: smtp.port,
        }
    }
}

impl Dispatch for SmtpDispatcher {
    fn dispatch(&self, envelope: &Envelope) -> anyhow::Result<()> {
        let message = build_message(envelope)?;
        let transport = SmtpTransport::builder_dangerous(self.server.as_str())
            .port(self.port)
            .build();

        tracing::info!(
            server = %self.server,
            port = self.port,
            recipients = ?envelope.recipients().collect::<Vec<_>>(),
            "sending email"
        );
        transport
            .send(&message)
            .with_context(|| format!("sending email via {}:{}", self.server, self.port))?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn envelope(attachments: Vec<PathBuf>) -> Envelope {
        Envelope {
            from: "monitor@example.com".to_string(),
            to: vec!["dba@example.com".to_string()],
            cc: vec!["lead@example.com".to_string()],
            bcc: vec!["audit@example.com".to_string()],
            subject: "DB Monitoring Report".to_string(),
            html_body: "<p>Attached.</p>".to_string(),
            attachments,
        }
    }

    #[test]
    fn attachments_are_typed_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let xlsx = dir.path().join("JobSteps_Failed_15days_2024-03-20.xlsx");
        let log = dir.path().join("run.log");
        std::fs::write(&xlsx, b"PK-not-really").unwrap();
        std::fs::write(&log, b"log").unwrap();

        let message = build_message(&envelope(vec![xlsx, log])).unwrap();

        let mut recipients = message
            .envelope()
            .to()
            .iter()
            .map(|address| address.to_string())
            .collect::<Vec<_>>();
        recipients.sort();
        assert_eq!(
            recipients,
            vec!["audit@example.com", "dba@example.com", "lead@example.com"]
        );

        let formatted = String::from_utf8_lossy(&message.formatted()).to_string();
        assert!(formatted.contains("JobSteps_Failed_15days_2024-03-20.xlsx"));
        assert!(formatted.contains("spreadsheetml.sheet"));
        assert!(formatted.contains(OCTET_STREAM_CONTENT_TYPE));
        assert!(formatted.contains("run.log"));
    }

    #[test]
    fn missing_attachment_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("BackupStatus_Last24H_2024-03-20.xlsx");

        let err = build_message(&envelope(vec![missing])).unwrap_err();
        assert!(
            err.to_string().starts_with("attachment not found"),
            "{err:#}"
        );
    }

    #[test]
    fn invalid_addresses_fail() {
        let mut bad = envelope(Vec::new());
        bad.to.push("not an address".to_string());
        assert!(build_message(&bad).is_err());
    }
}
