//! Alert message rendering

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::store::FailureRecord;

/// Rendered in place of absent optional fields
pub const PLACEHOLDER: &str = "N/A";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// An email ready to hand to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub subject: String,
    pub html: String,
    /// Plain-text alternative derived from `html`
    pub text: String,
}

impl AlertMessage {
    fn from_html(subject: String, html: String) -> Self {
        let text = html_to_text(&html);
        Self {
            subject,
            html,
            text,
        }
    }
}

/// Render the alert for one delivery failure
pub fn render_alert(record: &FailureRecord) -> AlertMessage {
    let subject = format!("Postal Delivery Failure Alert - {}", record.status);

    let html = format!(
        "<h2>Postal Delivery Failure Alert</h2>
<p><strong>A delivery failure has been detected in your Postal mail server.</strong></p>

<h3>Delivery Details:</h3>
<ul>
    <li><strong>Delivery ID:</strong> {id}</li>
    <li><strong>Message ID:</strong> {message_id}</li>
    <li><strong>Status:</strong> {status}</li>
    <li><strong>Timestamp:</strong> {timestamp}</li>
</ul>

<h3>Message Details:</h3>
<ul>
    <li><strong>From:</strong> {from}</li>
    <li><strong>To:</strong> {to}</li>
    <li><strong>Subject:</strong> {subject}</li>
    <li><strong>Scope:</strong> {scope}</li>
</ul>

<h3>Error Information:</h3>
<ul>
    <li><strong>Error Code:</strong> {code}</li>
    <li><strong>Output:</strong> {output}</li>
    <li><strong>Details:</strong> {details}</li>
</ul>

<p><em>This is an automated notification from your Postal monitoring system.</em></p>
",
        id = record.id,
        message_id = record.message_id,
        status = escape_html(record.status.as_str()),
        timestamp = record.timestamp.format(TIMESTAMP_FORMAT),
        from = escape_html(&record.mail_from),
        to = escape_html(&record.rcpt_to),
        subject = optional(record.subject.as_deref()),
        scope = escape_html(&record.scope),
        code = optional(record.code.as_deref()),
        output = optional(record.output.as_deref()),
        details = optional(record.details.as_deref()),
    );

    AlertMessage::from_html(subject, html)
}

/// Static confirmation message used to verify the transport configuration
pub fn test_message(sent_at: DateTime<Utc>) -> AlertMessage {
    let subject = "Postal Monitor Test Email".to_string();
    let html = format!(
        "<h2>Postal Monitor Test Email</h2>
<p>This is a test message from Postal Monitor.</p>
<p>If you received it, the SMTP configuration is working.</p>
<br>
<p><strong>Sent at:</strong> {}</p>
",
        sent_at.format(TIMESTAMP_FORMAT)
    );

    AlertMessage::from_html(subject, html)
}

/// Escaped value, or the placeholder when absent or empty
fn optional(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => escape_html(v),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Encode HTML special characters
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn line_break_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>").expect("valid line break pattern"))
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag pattern"))
}

/// Plain-text fallback: line breaks become newlines, markup is stripped,
/// entities are decoded and indentation removed. Runs of blank lines are
/// collapsed to one.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = line_break_regex().replace_all(html, "\n");
    let stripped = tag_regex().replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);

    let mut lines: Vec<&str> = Vec::new();
    for line in decoded.lines().map(str::trim) {
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

fn decode_entities(input: &str) -> String {
    // &amp; last so that "&amp;lt;" decodes to "&lt;"
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DeliveryStatus;
    use chrono::TimeZone;

    fn record() -> FailureRecord {
        FailureRecord {
            id: 10,
            message_id: 77,
            status: DeliveryStatus::HardFail,
            code: Some("550".to_string()),
            output: Some("550 5.1.1 <user@remote.example>: Recipient unknown".to_string()),
            details: Some("Permanent failure".to_string()),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap(),
            mail_from: "app@example.com".to_string(),
            rcpt_to: "user@remote.example".to_string(),
            subject: Some("Your invoice".to_string()),
            scope: "outgoing".to_string(),
        }
    }

    #[test]
    fn test_subject_names_status() {
        let alert = render_alert(&record());
        assert_eq!(alert.subject, "Postal Delivery Failure Alert - HardFail");

        let mut held = record();
        held.status = DeliveryStatus::Held;
        assert_eq!(
            render_alert(&held).subject,
            "Postal Delivery Failure Alert - Held"
        );
    }

    #[test]
    fn test_body_contains_every_field() {
        let alert = render_alert(&record());
        for expected in [
            "<strong>Delivery ID:</strong> 10",
            "<strong>Message ID:</strong> 77",
            "<strong>Status:</strong> HardFail",
            "<strong>Timestamp:</strong> 2024-03-05 14:07:09 UTC",
            "<strong>From:</strong> app@example.com",
            "<strong>To:</strong> user@remote.example",
            "<strong>Subject:</strong> Your invoice",
            "<strong>Scope:</strong> outgoing",
            "<strong>Error Code:</strong> 550",
            "<strong>Details:</strong> Permanent failure",
        ] {
            assert!(alert.html.contains(expected), "missing {expected:?}");
        }
        assert!(alert
            .html
            .contains("550 5.1.1 &lt;user@remote.example&gt;: Recipient unknown"));
    }

    #[test]
    fn test_missing_error_fields_render_placeholder() {
        let mut bare = record();
        bare.code = None;
        bare.output = None;
        bare.details = None;

        let alert = render_alert(&bare);
        assert!(alert.html.contains("<strong>Error Code:</strong> N/A"));
        assert!(alert.html.contains("<strong>Output:</strong> N/A"));
        assert!(alert.html.contains("<strong>Details:</strong> N/A"));

        // Other fields are untouched
        let full = render_alert(&record());
        let before_errors = |html: &str| {
            html.split("<h3>Error Information:</h3>")
                .next()
                .unwrap()
                .to_string()
        };
        assert_eq!(before_errors(&alert.html), before_errors(&full.html));
        assert_eq!(alert.subject, full.subject);
    }

    #[test]
    fn test_empty_values_render_placeholder() {
        let mut blank = record();
        blank.output = Some("   ".to_string());
        blank.subject = None;

        let alert = render_alert(&blank);
        assert!(alert.html.contains("<strong>Output:</strong> N/A"));
        assert!(alert.html.contains("<strong>Subject:</strong> N/A"));
    }

    #[test]
    fn test_text_body_has_no_markup() {
        let alert = render_alert(&record());

        assert!(!alert.text.contains("<li>"));
        assert!(!alert.text.contains("<strong>"));
        assert!(alert.text.starts_with("Postal Delivery Failure Alert\n"));
        assert!(alert.text.contains("\nDelivery ID: 10\n"));
        assert!(alert.text.contains("Output: 550 5.1.1 <user@remote.example>: Recipient unknown"));
        assert!(!alert.text.contains("\n\n\n"));
    }

    #[test]
    fn test_html_to_text_converts_line_breaks() {
        assert_eq!(html_to_text("one<br>two<BR/>three<br />four"), "one\ntwo\nthree\nfour");
        assert_eq!(html_to_text("<p>a &amp;lt; b</p>"), "a &lt; b");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn test_test_message() {
        let sent_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let alert = test_message(sent_at);
        assert_eq!(alert.subject, "Postal Monitor Test Email");
        assert!(alert.text.contains("Sent at: 2024-01-02 03:04:05 UTC"));
        assert!(!alert.text.contains("<p>"));
    }
}
