//! Structured output extraction from the reasoning loop's terminal text.
//!
//! The model is asked to answer with labelled sections:
//!
//! ```text
//! Potential Contacts: ...
//! Subject: ...
//! Body: ...
//! ```
//!
//! Labels are matched case-insensitively and each section runs until the
//! next recognized label or the end of the text. Only `Body:` is mandatory.
//! Sourced-fact markers inside the body are returned untouched.

use std::sync::LazyLock;

use outreach_core::error::ExtractionError;
use outreach_core::event::StructuredResult;
use regex_lite::Regex;

/// Opening marker around a fact that came from a tool result.
pub const FACT_OPEN: &str = "<<<mcp_data>>>";
/// Closing marker around a fact that came from a tool result.
pub const FACT_CLOSE: &str = "<<<end_mcp_data>>>";

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(potential\s+contacts|contacts|subject|body)\s*:").expect("header pattern")
});

static FACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<<<mcp_data>>>(.*?)<<<end_mcp_data>>>").expect("fact pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Contacts,
    Subject,
    Body,
}

impl Section {
    fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.starts_with("subject") {
            Self::Subject
        } else if label.starts_with("body") {
            Self::Body
        } else {
            Self::Contacts
        }
    }
}

/// Parse terminal text into contacts, subject and body.
///
/// The first occurrence of each label wins. Once `Body:` is found the rest
/// of the text belongs to the body, so a body that quotes a "Subject:" line
/// stays whole.
pub fn extract(text: &str) -> Result<StructuredResult, ExtractionError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ExtractionError::EmptyInput);
    }

    // (section, start of label, end of label)
    let mut headers: Vec<(Section, usize, usize)> = Vec::new();
    for caps in HEADER.captures_iter(text) {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let section = Section::from_label(label.as_str());
        headers.push((section, whole.start(), whole.end()));
        if section == Section::Body {
            break;
        }
    }

    let body_at = headers
        .iter()
        .position(|(section, _, _)| *section == Section::Body)
        .ok_or(ExtractionError::MissingBody)?;

    let mut result = StructuredResult::default();
    let mut seen_contacts = false;
    let mut seen_subject = false;

    for (i, &(section, _, value_start)) in headers.iter().enumerate() {
        let value_end = if i == body_at {
            text.len()
        } else {
            headers[i + 1].1
        };
        let value = text[value_start..value_end].trim().to_string();

        match section {
            Section::Contacts if !seen_contacts => {
                result.contacts = value;
                seen_contacts = true;
            }
            Section::Subject if !seen_subject => {
                result.subject = value;
                seen_subject = true;
            }
            Section::Body => {
                result.body = value;
                break;
            }
            _ => {}
        }
    }

    Ok(result)
}

/// Facts wrapped in sourced-fact markers, in order of appearance.
pub fn sourced_facts(body: &str) -> Vec<&str> {
    FACT.captures_iter(body)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}
