//! Header normalization.

use std::collections::HashMap;

use crate::error::PipelineError;

/// Currency markers exported into some raw headers, e.g. `2025-09-20 (TRY)`.
pub const CURRENCY_MARKERS: &[&str] = &["(TRY)"];

/// Normalize a single raw header.
///
/// Strips a leading byte-order mark, every currency marker and all
/// whitespace. Case and underscores are kept. Applying it twice gives the
/// same result as applying it once.
pub fn normalize_header(raw: &str) -> String {
    let mut name = raw.trim_start_matches('\u{feff}').to_string();
    // Dropping whitespace can expose a marker ("( TRY )") and dropping a
    // marker can splice another one together, so repeat until stable.
    loop {
        let before = name.len();
        for marker in CURRENCY_MARKERS {
            name = name.replace(marker, "");
        }
        name.retain(|c| !c.is_whitespace());
        if name.len() == before {
            return name;
        }
    }
}

/// Normalize a full header row.
///
/// Fails when two raw headers collapse to the same non-empty name, since the
/// projection step could not tell them apart. Empty headers, as left by
/// trailing delimiters, match no schema field and are never compared.
pub fn normalize_headers<'a, I>(raw: I) -> Result<Vec<String>, PipelineError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut out = Vec::new();

    for header in raw {
        let normalized = normalize_header(header);
        if normalized.is_empty() {
            out.push(normalized);
            continue;
        }
        if let Some(first) = seen.get(&normalized) {
            return Err(PipelineError::HeaderCollision {
                first: first.clone(),
                second: header.to_string(),
                normalized,
            });
        }
        seen.insert(normalized.clone(), header.to_string());
        out.push(normalized);
    }

    Ok(out)
}
