//! Read-only audit of the reciprocal rule over the whole interaction table.

use ppi_core::model::{AnalysisVersion, Interaction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use storage::Tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    /// Validated row with no reverse-direction row.
    MissingMirror,
    /// Only one direction carries evidence.
    OneSided,
    /// Both directions validated with different method sets.
    DivergentMethods,
    /// Mirrored rows disagree on prediction scores.
    DivergentScores,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReciprocalMismatch {
    pub kind: MismatchKind,
    pub interaction_id: u64,
    pub mirror_id: Option<u64>,
    pub bait_uniprot: String,
    pub prey_uniprot: String,
    pub analysis_version: AnalysisVersion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReciprocalReport {
    pub pairs_checked: usize,
    pub mismatches: Vec<ReciprocalMismatch>,
}

impl ReciprocalReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

pub fn reciprocal_report(tables: &Tables) -> ReciprocalReport {
    let mut report = ReciprocalReport::default();
    let mut visited: HashSet<u64> = HashSet::new();

    for row in tables.interactions() {
        if !visited.insert(row.id) {
            continue;
        }
        let mirror = tables.mirror_of(row);
        // Homodimers are their own mirror.
        if let Some(mirror) = mirror.filter(|m| m.id != row.id) {
            visited.insert(mirror.id);
        }
        report.pairs_checked += 1;

        let kind = match mirror {
            None if row.is_validated() => Some(MismatchKind::MissingMirror),
            None => None,
            Some(mirror) => compare_mirrors(row, mirror),
        };
        if let Some(kind) = kind {
            report.mismatches.push(mismatch(tables, kind, row, mirror));
        }
    }
    report
}

fn compare_mirrors(row: &Interaction, mirror: &Interaction) -> Option<MismatchKind> {
    if !row.scores_match(mirror) {
        return Some(MismatchKind::DivergentScores);
    }
    match (row.is_validated(), mirror.is_validated()) {
        (false, false) => None,
        (true, false) | (false, true) => Some(MismatchKind::OneSided),
        (true, true) if row.experimental_validation != mirror.experimental_validation => {
            Some(MismatchKind::DivergentMethods)
        }
        (true, true) => None,
    }
}

fn mismatch(
    tables: &Tables,
    kind: MismatchKind,
    row: &Interaction,
    mirror: Option<&Interaction>,
) -> ReciprocalMismatch {
    let accession = |id: u64| {
        tables
            .protein(id)
            .map(|p| p.uniprot_id.clone())
            .unwrap_or_else(|| format!("#{id}"))
    };
    ReciprocalMismatch {
        kind,
        interaction_id: row.id,
        mirror_id: mirror.map(|m| m.id),
        bait_uniprot: accession(row.bait_protein_id),
        prey_uniprot: accession(row.prey_protein_id),
        analysis_version: row.analysis_version(),
    }
}
