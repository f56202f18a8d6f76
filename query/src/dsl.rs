use ppi_core::model::AnalysisMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_TERM_LEN: usize = 128;
const AF2_LEVEL: &str = "AF2";

/// Organism codes recognized as a prefix without a colon, e.g. `HsBBS7`.
pub const KNOWN_ORGANISM_CODES: [&str; 9] = ["Hs", "Cr", "Mm", "Dm", "Ce", "Sc", "Dr", "Xl", "Rn"];

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
pub struct BaitsRequest {
    #[serde(default)]
    pub mode: Option<String>,
}

impl BaitsRequest {
    pub fn effective_mode(&self) -> AnalysisMode {
        AnalysisMode::parse_or_default(self.mode.as_deref())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryValidationError {
    #[error("search term must not be empty")]
    EmptyTerm,
    #[error("search term must be at most {0} characters")]
    TermTooLong(usize),
    #[error("confidence levels must not contain empty values")]
    EmptyConfidenceLevel,
}

/// Interaction search: a protein term, optionally organism-prefixed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Term as the client sent it, echoed in the response.
    pub raw_term: String,
    pub term: String,
    pub organism_code: Option<String>,
    pub mode: AnalysisMode,
    pub confidence_levels: Vec<String>,
}

impl SearchRequest {
    /// `confidence` is the comma-separated query parameter, if present.
    pub fn parse(
        raw_term: &str,
        mode: Option<&str>,
        confidence: Option<&str>,
    ) -> Result<Self, QueryValidationError> {
        let trimmed = raw_term.trim();
        if trimmed.is_empty() {
            return Err(QueryValidationError::EmptyTerm);
        }
        if trimmed.chars().count() > MAX_TERM_LEN {
            return Err(QueryValidationError::TermTooLong(MAX_TERM_LEN));
        }

        let (organism_code, term) = split_organism_prefix(trimmed);

        let confidence_levels = match confidence {
            None => Vec::new(),
            Some(raw) if raw.trim().is_empty() => Vec::new(),
            Some(raw) => {
                let levels: Vec<String> = raw.split(',').map(|l| l.trim().to_string()).collect();
                if levels.iter().any(String::is_empty) {
                    return Err(QueryValidationError::EmptyConfidenceLevel);
                }
                levels
            }
        };

        Ok(Self {
            raw_term: raw_term.to_string(),
            term: term.to_string(),
            organism_code: organism_code.map(str::to_string),
            mode: AnalysisMode::parse_or_default(mode),
            confidence_levels,
        })
    }

    /// AF2 models carry no interface tier; `AF2` is a pseudo-level selecting them.
    pub fn includes_af2(&self) -> bool {
        self.confidence_levels.iter().any(|l| l == AF2_LEVEL)
    }

    pub fn label_levels(&self) -> impl Iterator<Item = &str> {
        self.confidence_levels
            .iter()
            .map(String::as_str)
            .filter(|l| *l != AF2_LEVEL)
    }
}

/// `Hs:BBS7` -> (Some("Hs"), "BBS7"); `HsBBS7` -> (Some("Hs"), "BBS7") for known codes.
/// Like any prefix rule this also splits genes such as `SCAPER` into `Sc` + `APER`.
fn split_organism_prefix(term: &str) -> (Option<&str>, &str) {
    if let Some((code, rest)) = term.split_once(':') {
        let mut chars = code.chars();
        let well_formed = code.len() == 2
            && chars.next().is_some_and(|c| c.is_ascii_uppercase())
            && chars.next().is_some_and(|c| c.is_ascii_lowercase());
        if well_formed && !rest.is_empty() {
            return (Some(code), rest);
        }
        return (None, term);
    }

    // Case-insensitive, normalized to the canonical code: `HSBBS7` -> ("Hs", "BBS7").
    if let Some(head) = term.get(..2) {
        let rest = &term[2..];
        if !rest.is_empty() {
            if let Some(code) = KNOWN_ORGANISM_CODES
                .iter()
                .find(|code| code.eq_ignore_ascii_case(head))
            {
                return (Some(code), rest);
            }
        }
    }
    (None, term)
}
