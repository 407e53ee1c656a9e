use std::collections::HashMap;
use std::str::FromStr;

use lazy_static::lazy_static;
use mail_parser::MessageParser;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use strum::{AsRefStr, Display, EnumString};

use super::session::RawMessage;

/// Dropped outright: failed payments never become transaction records.
const FAILURE_MARKER: &str = "Transaction Status: FAILED";

lazy_static! {
    // CSS class the bank's template sets on each notification block.
    static ref NOTIFICATION_SELECTOR: Selector = Selector::parse("span.gmailmsg").unwrap();
    static ref RE_LINE_BREAK: Regex = Regex::new(r"<br\s*/?>").unwrap();
}

/// Field labels the bank's template emits, spelled exactly as they appear
/// in the message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum FieldLabel {
    #[strum(serialize = "UPI Ref. No.")]
    UpiRefNo,
    #[strum(serialize = "Amount")]
    Amount,
    #[strum(serialize = "From VPA")]
    FromVpa,
    #[strum(serialize = "To VPA")]
    ToVpa,
    #[strum(serialize = "Payee Name")]
    PayeeName,
    #[strum(serialize = "Transaction Date")]
    TransactionDate,
}

/// Raw `label -> value` strings pulled from one notification block. Labels
/// can be missing here; the normalizer rejects incomplete rows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    values: HashMap<FieldLabel, String>,
}

impl ExtractedFields {
    pub fn insert(&mut self, label: FieldLabel, value: String) {
        self.values.insert(label, value);
    }

    pub fn get(&self, label: FieldLabel) -> Option<&str> {
        self.values.get(&label).map(String::as_str)
    }
}

/// Pulls every successful notification block out of one raw message.
///
/// Walks the MIME tree, parses each HTML body and reads the labeled lines
/// of every marked block. Non-HTML parts and undecodable messages are
/// skipped, never fatal.
pub fn extract(raw: &RawMessage) -> Vec<ExtractedFields> {
    let Some(message) = MessageParser::default().parse(&raw.content) else {
        tracing::warn!(seq = raw.seq, "unparseable message, skipping");
        return Vec::new();
    };

    let mut entries = Vec::new();
    for part in &message.parts {
        if part.is_text_html() {
            if let Some(html) = part.text_contents() {
                collect_blocks(html, &mut entries);
            }
        }
    }

    entries
}

fn collect_blocks(html: &str, entries: &mut Vec<ExtractedFields>) {
    let document = Html::parse_document(html);
    for element in document.select(&NOTIFICATION_SELECTOR) {
        if let Some(fields) = parse_block(element) {
            entries.push(fields);
        }
    }
}

/// One marked element yields one entry, or none when the block is not a
/// successful payment notification.
fn parse_block(element: ElementRef) -> Option<ExtractedFields> {
    let text = element.text().collect::<String>();
    if !text.contains(FieldLabel::UpiRefNo.as_ref()) || text.contains(FAILURE_MARKER) {
        return None;
    }

    let mut fields = ExtractedFields::default();
    for line in RE_LINE_BREAK.split(&element.inner_html()) {
        let line = line.trim();
        // Markup-only lines and prose without a separator carry no field.
        if line.starts_with('<') || !line.contains(':') {
            continue;
        }
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let Ok(label) = FieldLabel::from_str(label.trim()) else {
            continue;
        };
        fields.insert(label, value.trim().to_string());
    }

    Some(fields)
}
