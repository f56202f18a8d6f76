use crate::dsl::SearchRequest;
use ppi_core::model::{
    AnalysisMode, AnalysisVersion, ConfidenceTier, ExperimentalValidation, Interaction, Protein,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use storage::Tables;

const AF3: &str = "AF3";
const AF2: &str = "AF2";

/// A matched row joined with both endpoint proteins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionHit {
    pub id: u64,
    pub iptm: f32,
    pub confidence: Option<String>,
    pub alphafold_version: Option<String>,
    pub source_path: Option<String>,
    pub contacts_pae_lt_3: Option<u32>,
    pub contacts_pae_lt_6: Option<u32>,
    pub interface_plddt: Option<f32>,
    pub ipsae: Option<f32>,
    pub ipsae_confidence: Option<ConfidenceTier>,
    pub analysis_version: AnalysisVersion,
    pub experimental_validation: Option<ExperimentalValidation>,
    pub bait_uniprot: String,
    pub bait_gene: Option<String>,
    pub bait_organism: Option<String>,
    pub bait_organism_code: Option<String>,
    pub prey_uniprot: String,
    pub prey_gene: Option<String>,
    pub prey_organism: Option<String>,
    pub prey_organism_code: Option<String>,
}

impl InteractionHit {
    fn join(row: &Interaction, bait: &Protein, prey: &Protein) -> Self {
        let scores = &row.scores;
        Self {
            id: row.id,
            iptm: scores.iptm,
            confidence: scores.confidence.clone(),
            alphafold_version: scores.alphafold_version.clone(),
            source_path: scores.source_path.clone(),
            contacts_pae_lt_3: scores.contacts_pae_lt_3,
            contacts_pae_lt_6: scores.contacts_pae_lt_6,
            interface_plddt: scores.interface_plddt,
            ipsae: scores.ipsae,
            ipsae_confidence: scores.ipsae_confidence,
            analysis_version: scores.analysis_version,
            experimental_validation: row.experimental_validation.clone(),
            bait_uniprot: bait.uniprot_id.clone(),
            bait_gene: bait.gene_name.clone(),
            bait_organism: bait.organism.clone(),
            bait_organism_code: bait.organism_code.clone(),
            prey_uniprot: prey.uniprot_id.clone(),
            prey_gene: prey.gene_name.clone(),
            prey_organism: prey.organism.clone(),
            prey_organism_code: prey.organism_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub interactions: Vec<InteractionHit>,
    pub search_term: String,
    pub filter_mode: String,
    pub confidence_levels: Vec<String>,
}

pub fn search_interactions(tables: &Tables, request: &SearchRequest) -> SearchResults {
    let needle = request.term.to_lowercase();

    let mut hits: Vec<InteractionHit> = tables
        .interactions()
        .filter_map(|row| {
            let bait = tables.protein(row.bait_protein_id)?;
            let prey = tables.protein(row.prey_protein_id)?;
            let matched = protein_matches(tables, bait, &request.term, &needle)
                || protein_matches(tables, prey, &request.term, &needle)
                || contains_ignore_case(row.scores.source_path.as_deref(), &needle);
            if !matched {
                return None;
            }
            if let Some(code) = request.organism_code.as_deref() {
                if bait.organism_code.as_deref() != Some(code)
                    && prey.organism_code.as_deref() != Some(code)
                {
                    return None;
                }
            }
            if !passes_confidence_filter(row, request) {
                return None;
            }
            Some(InteractionHit::join(row, bait, prey))
        })
        .collect();

    match request.mode {
        AnalysisMode::Ipsae => hits.sort_by(compare_by_ipsae),
        AnalysisMode::V3 => hits.sort_by(compare_by_interface),
    }

    SearchResults {
        interactions: hits,
        search_term: request.raw_term.clone(),
        filter_mode: request.mode.as_str().to_string(),
        confidence_levels: request.confidence_levels.clone(),
    }
}

fn protein_matches(tables: &Tables, protein: &Protein, term: &str, needle: &str) -> bool {
    protein.uniprot_id == term
        || contains_ignore_case(Some(&protein.uniprot_id), needle)
        || contains_ignore_case(protein.gene_name.as_deref(), needle)
        || tables
            .aliases_of(protein.id)
            .any(|alias| contains_ignore_case(Some(&alias.alias_name), needle))
}

fn contains_ignore_case(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

fn passes_confidence_filter(row: &Interaction, request: &SearchRequest) -> bool {
    let scores = &row.scores;
    match request.mode {
        AnalysisMode::Ipsae => {
            if !request.mode.includes(row) {
                return false;
            }
            if request.confidence_levels.is_empty() {
                return true;
            }
            scores.ipsae_confidence.is_some_and(|tier| {
                request
                    .confidence_levels
                    .iter()
                    .any(|level| level == tier.as_str())
            })
        }
        AnalysisMode::V3 => {
            if request.confidence_levels.is_empty() {
                return true;
            }
            let label_match = scores
                .confidence
                .as_deref()
                .is_some_and(|label| request.label_levels().any(|level| level == label));
            let af2_match = request.includes_af2()
                && scores.alphafold_version.as_deref() == Some(AF2)
                && scores.confidence.is_none();
            label_match || af2_match
        }
    }
}

/// Interface quality tier of an AF3 model: 1 high, 2 medium, 3 low. Non-AF3 rows are 4.
pub fn interface_tier(row: &InteractionHit) -> u8 {
    if row.alphafold_version.as_deref() != Some(AF3) {
        return 4;
    }
    let iptm = row.iptm;
    let contacts = row.contacts_pae_lt_3;
    let plddt = row.interface_plddt;
    let contacts_at_least = |n: u32| contacts.is_some_and(|c| c >= n);
    let plddt_at_least = |p: f32| plddt.is_some_and(|v| v >= p);

    let high = iptm >= 0.7
        || (contacts_at_least(40) && plddt_at_least(80.0))
        || (contacts_at_least(30) && iptm >= 0.5 && plddt_at_least(80.0));
    let sparse = iptm < 0.75 && contacts.unwrap_or(0) < 5;
    if high && !sparse {
        return 1;
    }

    let medium = iptm >= 0.6
        || (contacts_at_least(20) && plddt_at_least(75.0))
        || (contacts_at_least(15) && iptm >= 0.45);
    if medium {
        2
    } else {
        3
    }
}

fn compare_by_ipsae(a: &InteractionHit, b: &InteractionHit) -> Ordering {
    ConfidenceTier::rank(a.ipsae_confidence)
        .cmp(&ConfidenceTier::rank(b.ipsae_confidence))
        .then_with(|| desc_nulls_last(a.ipsae, b.ipsae))
        .then_with(|| b.iptm.total_cmp(&a.iptm))
}

fn compare_by_interface(a: &InteractionHit, b: &InteractionHit) -> Ordering {
    let af3_first = |hit: &InteractionHit| u8::from(hit.alphafold_version.as_deref() != Some(AF3));
    af3_first(a)
        .cmp(&af3_first(b))
        .then_with(|| interface_tier(a).cmp(&interface_tier(b)))
        .then_with(|| {
            b.contacts_pae_lt_3
                .unwrap_or(0)
                .cmp(&a.contacts_pae_lt_3.unwrap_or(0))
        })
        .then_with(|| b.iptm.total_cmp(&a.iptm))
}

fn desc_nulls_last(a: Option<f32>, b: Option<f32>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
