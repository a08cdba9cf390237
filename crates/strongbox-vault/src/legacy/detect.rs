//! Classify a tabular file by its first record.
//!
//! Header strategies run first, in [`HEADER_STRATEGIES`] order; when none
//! matches, the first record is data and [`POSITIONAL_STRATEGIES`] guess
//! from the field count. The orders are part of the compatibility contract
//! and are asserted in tests.

use thiserror::Error;

use super::{ColumnMap, Layout, LegacyFormat};
use crate::strategy::{first_success, Strategy};

/// No strategy recognised the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("record layout not recognised")]
pub struct DetectionFailed;

type Detector = Strategy<[String], Layout, DetectionFailed>;

/// Header-token strategies, most specific first.
pub const HEADER_STRATEGIES: [Detector; 4] = [
    Strategy {
        name: "current-header",
        run: current_header,
    },
    Strategy {
        name: "third-party-header",
        run: third_party_header,
    },
    Strategy {
        name: "legacy-a-header",
        run: legacy_a_header,
    },
    Strategy {
        name: "legacy-b-header",
        run: legacy_b_header,
    },
];

/// Field-count strategies for header-less files.
pub const POSITIONAL_STRATEGIES: [Detector; 3] = [
    Strategy {
        name: "legacy-a-positional",
        run: legacy_a_positional,
    },
    Strategy {
        name: "current-positional",
        run: current_positional,
    },
    Strategy {
        name: "third-party-positional",
        run: third_party_positional,
    },
];

/// Detect the layout of a file from its first record.
///
/// Never fails: an unrecognised record yields [`LegacyFormat::Unknown`]
/// with no header, and rows are then tried against every layout.
#[must_use]
pub fn detect_format(first_record: &[String]) -> Layout {
    let detected = first_success(first_record, &HEADER_STRATEGIES)
        .or_else(|_| first_success(first_record, &POSITIONAL_STRATEGIES));
    match detected {
        Ok((name, layout)) => {
            tracing::debug!(strategy = name, format = ?layout.format, "tabular layout detected");
            layout
        }
        Err(_) => Layout::unknown(),
    }
}

// ---------------------------------------------------------------------------
// Header strategies
// ---------------------------------------------------------------------------

fn lowered(fields: &[String]) -> Vec<String> {
    fields.iter().map(|f| f.trim().to_lowercase()).collect()
}

fn has(tokens: &[String], wanted: &str) -> bool {
    tokens.iter().any(|t| t == wanted)
}

fn position(tokens: &[String], aliases: &[&str]) -> Option<usize> {
    tokens.iter().position(|t| aliases.contains(&t.as_str()))
}

fn current_header(fields: &[String]) -> Result<Layout, DetectionFailed> {
    let tokens = lowered(fields);
    if has(&tokens, "type") && has(&tokens, "data") && has(&tokens, "id") {
        Ok(Layout::with_header(LegacyFormat::Current, ColumnMap::default()))
    } else {
        Err(DetectionFailed)
    }
}

fn third_party_header(fields: &[String]) -> Result<Layout, DetectionFailed> {
    let tokens = lowered(fields);
    if !["name", "url", "username", "password"]
        .iter()
        .all(|w| has(&tokens, w))
    {
        return Err(DetectionFailed);
    }
    let columns = ColumnMap {
        title: position(&tokens, &["name"]),
        url: position(&tokens, &["url"]),
        username: position(&tokens, &["username"]),
        password: position(&tokens, &["password"]),
        notes: position(&tokens, &["note", "notes"]),
        email: position(&tokens, &["email"]),
        phone: position(&tokens, &["phone"]),
    };
    Ok(Layout::with_header(LegacyFormat::ThirdPartyExport, columns))
}

fn legacy_a_header(fields: &[String]) -> Result<Layout, DetectionFailed> {
    let tokens = lowered(fields);
    let has_metadata = ["createdat", "updatedat", "isfavorite", "sortorder"]
        .iter()
        .any(|w| has(&tokens, w));
    if has(&tokens, "title") && has(&tokens, "password") && has_metadata {
        Ok(Layout::with_header(LegacyFormat::LegacyA, ColumnMap::default()))
    } else {
        Err(DetectionFailed)
    }
}

fn legacy_b_header(fields: &[String]) -> Result<Layout, DetectionFailed> {
    let tokens = lowered(fields);
    if !(has(&tokens, "title") && has(&tokens, "password")) {
        return Err(DetectionFailed);
    }
    let columns = ColumnMap {
        title: position(&tokens, &["title"]),
        url: position(&tokens, &["url", "website", "web site"]),
        username: position(&tokens, &["username", "user name", "login"]),
        password: position(&tokens, &["password"]),
        notes: position(&tokens, &["notes", "note", "comments"]),
        email: position(&tokens, &["email"]),
        phone: position(&tokens, &["phone"]),
    };
    Ok(Layout::with_header(LegacyFormat::LegacyB, columns))
}

// ---------------------------------------------------------------------------
// Positional strategies
// ---------------------------------------------------------------------------

fn legacy_a_positional(fields: &[String]) -> Result<Layout, DetectionFailed> {
    let timestamps_ok = fields.len() >= 11
        && fields[7].trim().parse::<i64>().is_ok()
        && fields[8].trim().parse::<i64>().is_ok();
    if timestamps_ok {
        Ok(Layout::headerless(LegacyFormat::LegacyA))
    } else {
        Err(DetectionFailed)
    }
}

fn current_positional(fields: &[String]) -> Result<Layout, DetectionFailed> {
    let type_token = fields.get(1).map(|f| f.trim()).unwrap_or_default();
    let looks_like_type = !type_token.is_empty()
        && type_token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c == '_');
    if (9..=10).contains(&fields.len()) && looks_like_type {
        Ok(Layout::headerless(LegacyFormat::Current))
    } else {
        Err(DetectionFailed)
    }
}

fn third_party_positional(fields: &[String]) -> Result<Layout, DetectionFailed> {
    if (4..=7).contains(&fields.len()) {
        Ok(Layout::headerless(LegacyFormat::ThirdPartyExport))
    } else {
        Err(DetectionFailed)
    }
}
