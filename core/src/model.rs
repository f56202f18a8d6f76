use rkyv::Archive;
use serde::{Deserialize, Serialize};

#[derive(
    Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, PartialEq, Eq, Clone,
)]
#[archive(check_bytes)] // Enables bytecheck validation for zero-copy safety
pub struct Protein {
    pub id: u64,
    pub uniprot_id: String,
    pub gene_name: Option<String>,
    pub organism: Option<String>,
    pub organism_code: Option<String>,
}

impl Protein {
    pub fn new(id: u64, uniprot_id: impl Into<String>) -> Self {
        Self {
            id,
            uniprot_id: uniprot_id.into(),
            gene_name: None,
            organism: None,
            organism_code: None,
        }
    }

    /// Identity metadata must agree for two records to describe the same accession.
    pub fn same_identity(&self, other: &Protein) -> bool {
        self.uniprot_id == other.uniprot_id
            && self.gene_name == other.gene_name
            && self.organism == other.organism
            && self.organism_code == other.organism_code
    }
}

#[derive(
    Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, PartialEq, Eq, Clone,
)]
#[archive(check_bytes)]
pub struct ProteinAlias {
    pub id: u64,
    pub protein_id: u64,
    pub alias_name: String,
    pub alias_type: String,
}

#[derive(
    Archive,
    rkyv::Deserialize,
    rkyv::Serialize,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
)]
#[archive(check_bytes)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisVersion {
    V3,
    V4,
}

impl AnalysisVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisVersion::V3 => "v3",
            AnalysisVersion::V4 => "v4",
        }
    }
}

#[derive(
    Archive,
    rkyv::Deserialize,
    rkyv::Serialize,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
)]
#[archive(check_bytes)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "High",
            ConfidenceTier::Medium => "Medium",
            ConfidenceTier::Low => "Low",
        }
    }

    pub fn rank(tier: Option<ConfidenceTier>) -> u8 {
        match tier {
            Some(ConfidenceTier::High) => 1,
            Some(ConfidenceTier::Medium) => 2,
            Some(ConfidenceTier::Low) => 3,
            None => 4,
        }
    }
}

/// Analysis mode selected by a request. Filters which rows a listing counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    #[default]
    V3,
    Ipsae,
}

impl AnalysisMode {
    /// Unknown or missing values degrade to the default mode.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("ipsae") | Some("v4") => AnalysisMode::Ipsae,
            _ => AnalysisMode::V3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::V3 => "v3",
            AnalysisMode::Ipsae => "ipsae",
        }
    }

    pub fn includes(&self, interaction: &Interaction) -> bool {
        match self {
            AnalysisMode::V3 => true,
            AnalysisMode::Ipsae => {
                interaction.scores.analysis_version == AnalysisVersion::V4
                    && interaction.scores.ipsae.is_some()
            }
        }
    }
}

#[derive(
    Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, PartialEq, Eq, Clone,
)]
#[archive(check_bytes)]
pub struct ExperimentalMethod {
    pub method: String,
    pub study: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl ExperimentalMethod {
    pub fn new(method: impl Into<String>, study: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            study: study.into(),
            pmid: None,
            confidence: None,
            notes: None,
            date: None,
        }
    }

    fn dedup_key(&self) -> (String, String, String) {
        (
            self.study.clone(),
            self.method.clone(),
            self.pmid.clone().unwrap_or_default(),
        )
    }
}

#[derive(
    Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, PartialEq, Eq, Clone,
)]
#[archive(check_bytes)]
pub struct ValidationSummary {
    pub is_validated: bool,
    pub validation_count: u32,
    pub strongest_method: String,
    pub consensus_confidence: String,
}

#[derive(
    Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, PartialEq, Eq, Clone,
)]
#[archive(check_bytes)]
pub struct ExperimentalValidation {
    pub experimental_methods: Vec<ExperimentalMethod>,
    pub validation_summary: ValidationSummary,
}

impl ExperimentalValidation {
    /// Build a payload from methods, dropping duplicates by (study, method, pmid).
    /// The summary is always derived from the surviving methods.
    pub fn from_methods(methods: impl IntoIterator<Item = ExperimentalMethod>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let experimental_methods: Vec<ExperimentalMethod> = methods
            .into_iter()
            .filter(|method| seen.insert(method.dedup_key()))
            .collect();

        let validation_summary = ValidationSummary {
            is_validated: !experimental_methods.is_empty(),
            validation_count: experimental_methods.len() as u32,
            strongest_method: experimental_methods
                .first()
                .map(|m| m.method.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            consensus_confidence: consensus_confidence(&experimental_methods).to_string(),
        };

        Self {
            experimental_methods,
            validation_summary,
        }
    }

    /// Union of several payloads (in order) plus extra methods.
    pub fn merged<'a>(
        existing: impl IntoIterator<Item = &'a ExperimentalValidation>,
        extra: impl IntoIterator<Item = ExperimentalMethod>,
    ) -> Self {
        let carried = existing
            .into_iter()
            .flat_map(|v| v.experimental_methods.iter().cloned());
        Self::from_methods(carried.chain(extra))
    }

    pub fn method_count(&self) -> usize {
        self.experimental_methods.len()
    }
}

// Structural evidence outranks biochemical evidence, which outranks proteomics alone.
fn consensus_confidence(methods: &[ExperimentalMethod]) -> &'static str {
    let has = |needles: &[&str]| {
        methods
            .iter()
            .any(|m| needles.iter().any(|needle| m.method.contains(needle)))
    };
    let structural = has(&["Crystal structure", "Cryo-EM", "NMR"]);
    let biochemical = has(&["reconstitution", "Pulldown", "Y2H"]);
    let proteomics = has(&["MS"]);

    if structural || (biochemical && proteomics) {
        "high"
    } else if biochemical || proteomics {
        "medium"
    } else {
        "low"
    }
}

/// Prediction scores of one directed row, as produced by the structural pipeline.
#[derive(
    Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, PartialEq, Clone,
)]
#[archive(check_bytes)]
pub struct InteractionScores {
    pub analysis_version: AnalysisVersion,
    pub iptm: f32,
    pub confidence: Option<String>,
    pub interface_plddt: Option<f32>,
    pub contacts_pae_lt_3: Option<u32>,
    pub contacts_pae_lt_6: Option<u32>,
    pub ipsae: Option<f32>,
    pub ipsae_confidence: Option<ConfidenceTier>,
    pub alphafold_version: Option<String>,
    pub source_path: Option<String>,
}

impl InteractionScores {
    pub fn new(analysis_version: AnalysisVersion, iptm: f32) -> Self {
        Self {
            analysis_version,
            iptm,
            confidence: None,
            interface_plddt: None,
            contacts_pae_lt_3: None,
            contacts_pae_lt_6: None,
            ipsae: None,
            ipsae_confidence: None,
            alphafold_version: None,
            source_path: None,
        }
    }

    /// Non-finite scores never reach the store.
    pub fn is_well_formed(&self) -> bool {
        self.iptm.is_finite()
            && self.ipsae.map_or(true, f32::is_finite)
            && self.interface_plddt.map_or(true, f32::is_finite)
    }
}

#[derive(
    Archive, rkyv::Deserialize, rkyv::Serialize, Serialize, Deserialize, Debug, PartialEq, Clone,
)]
#[archive(check_bytes)]
pub struct Interaction {
    pub id: u64,
    pub bait_protein_id: u64,
    pub prey_protein_id: u64,
    #[serde(flatten)]
    pub scores: InteractionScores,
    pub experimental_validation: Option<ExperimentalValidation>,
}

impl Interaction {
    pub fn new(id: u64, bait_protein_id: u64, prey_protein_id: u64, scores: InteractionScores) -> Self {
        Self {
            id,
            bait_protein_id,
            prey_protein_id,
            scores,
            experimental_validation: None,
        }
    }

    pub fn analysis_version(&self) -> AnalysisVersion {
        self.scores.analysis_version
    }

    /// Storage key: one row per direction per analysis version.
    pub fn pair_key(&self) -> PairKey {
        (self.bait_protein_id, self.prey_protein_id, self.scores.analysis_version)
    }

    pub fn mirror_key(&self) -> PairKey {
        (self.prey_protein_id, self.bait_protein_id, self.scores.analysis_version)
    }

    /// Mode-scoped scores that both directions of a pair must agree on.
    pub fn scores_match(&self, other: &Interaction) -> bool {
        self.scores.analysis_version == other.scores.analysis_version
            && self.scores.iptm == other.scores.iptm
            && self.scores.ipsae == other.scores.ipsae
    }

    /// Reverse-direction row carrying the same scores and evidence, under a new id.
    pub fn mirrored(&self, id: u64) -> Self {
        Self {
            id,
            bait_protein_id: self.prey_protein_id,
            prey_protein_id: self.bait_protein_id,
            scores: self.scores.clone(),
            experimental_validation: self.experimental_validation.clone(),
        }
    }

    pub fn is_validated(&self) -> bool {
        self.experimental_validation
            .as_ref()
            .is_some_and(|v| v.validation_summary.is_validated)
    }
}

/// (bait protein id, prey protein id, analysis version)
pub type PairKey = (u64, u64, AnalysisVersion);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_fallback_to_default() {
        assert_eq!(AnalysisMode::parse_or_default(None), AnalysisMode::V3);
        assert_eq!(AnalysisMode::parse_or_default(Some("v3")), AnalysisMode::V3);
        assert_eq!(AnalysisMode::parse_or_default(Some("IPSAE")), AnalysisMode::Ipsae);
        assert_eq!(AnalysisMode::parse_or_default(Some("v4")), AnalysisMode::Ipsae);
        assert_eq!(AnalysisMode::parse_or_default(Some("bogus")), AnalysisMode::V3);
        assert_eq!(AnalysisMode::parse_or_default(Some("")), AnalysisMode::V3);
    }

    #[test]
    fn test_ipsae_mode_requires_v4_score() {
        let mut row = Interaction::new(1, 1, 2, InteractionScores::new(AnalysisVersion::V4, 0.8));
        assert!(AnalysisMode::V3.includes(&row));
        assert!(!AnalysisMode::Ipsae.includes(&row));

        row.scores.ipsae = Some(0.6);
        assert!(AnalysisMode::Ipsae.includes(&row));

        row.scores.analysis_version = AnalysisVersion::V3;
        assert!(!AnalysisMode::Ipsae.includes(&row));
    }

    #[test]
    fn test_validation_dedup_and_summary() {
        let mut pulldown = ExperimentalMethod::new("Pulldown", "Taschner et al., 2014");
        pulldown.pmid = Some("24550735".into());

        let validation = ExperimentalValidation::from_methods(vec![
            pulldown.clone(),
            pulldown.clone(),
            ExperimentalMethod::new("XL-MS", "Petriman et al., 2022"),
        ]);

        assert_eq!(validation.method_count(), 2);
        assert!(validation.validation_summary.is_validated);
        assert_eq!(validation.validation_summary.validation_count, 2);
        assert_eq!(validation.validation_summary.strongest_method, "Pulldown");
        assert_eq!(validation.validation_summary.consensus_confidence, "high");
    }

    #[test]
    fn test_consensus_confidence_tiers() {
        let structural = ExperimentalValidation::from_methods(vec![ExperimentalMethod::new(
            "Crystal structure",
            "Bhogaraju et al., 2011",
        )]);
        assert_eq!(structural.validation_summary.consensus_confidence, "high");

        let y2h = ExperimentalValidation::from_methods(vec![ExperimentalMethod::new(
            "Y2H",
            "Lucker et al., 2005",
        )]);
        assert_eq!(y2h.validation_summary.consensus_confidence, "medium");

        let other = ExperimentalValidation::from_methods(vec![ExperimentalMethod::new(
            "Co-localization",
            "Example et al., 2020",
        )]);
        assert_eq!(other.validation_summary.consensus_confidence, "low");
    }

    #[test]
    fn test_merge_keeps_order_and_drops_duplicates() {
        let a = ExperimentalValidation::from_methods(vec![ExperimentalMethod::new("Cryo-EM", "A")]);
        let b = ExperimentalValidation::from_methods(vec![
            ExperimentalMethod::new("Cryo-EM", "A"),
            ExperimentalMethod::new("Pulldown", "B"),
        ]);
        let merged =
            ExperimentalValidation::merged([&a, &b], vec![ExperimentalMethod::new("Y2H", "C")]);
        let methods: Vec<&str> = merged
            .experimental_methods
            .iter()
            .map(|m| m.method.as_str())
            .collect();
        assert_eq!(methods, vec!["Cryo-EM", "Pulldown", "Y2H"]);
        assert_eq!(merged.validation_summary.strongest_method, "Cryo-EM");
    }

    #[test]
    fn test_mirror_swaps_direction_and_keeps_scores() {
        let mut forward = Interaction::new(10, 1, 2, InteractionScores::new(AnalysisVersion::V3, 0.92));
        forward.scores.ipsae = Some(0.5);
        let reverse = forward.mirrored(11);
        assert_eq!(reverse.id, 11);
        assert_eq!(reverse.bait_protein_id, 2);
        assert_eq!(reverse.prey_protein_id, 1);
        assert!(forward.scores_match(&reverse));
        assert_eq!(forward.mirror_key(), reverse.pair_key());
    }
}
