//! Per-interaction interface contact documents used to color a predicted structure
//! by predicted aligned error (PAE).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contacts at or above this PAE (Å) are not considered interface contacts.
pub const PAE_CUTOFF: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaeBand {
    VeryHigh,
    High,
    Medium,
    Low,
}

impl PaeBand {
    /// `None` when the value falls outside the interface cutoff.
    pub fn classify(pae: f32) -> Option<Self> {
        if !pae.is_finite() || pae < 0.0 {
            return None;
        }
        match pae {
            p if p < 3.0 => Some(PaeBand::VeryHigh),
            p if p < 5.0 => Some(PaeBand::High),
            p if p < 8.0 => Some(PaeBand::Medium),
            p if p < PAE_CUTOFF => Some(PaeBand::Low),
            _ => None,
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            PaeBand::VeryHigh => "#228b22",
            PaeBand::High => "#00ff00",
            PaeBand::Medium => "#ffff00",
            PaeBand::Low => "#ff4500",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidueContact {
    pub chain1: String,
    pub resi1: u32,
    pub aa1: String,
    pub chain2: String,
    pub resi2: u32,
    pub aa2: String,
    pub pae: f32,
    pub distance: f32,
    pub confidence: PaeBand,
    pub color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSummary {
    pub total_contacts: u32,
    pub very_high_count: u32,
    pub high_count: u32,
    pub medium_count: u32,
    pub low_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactData {
    pub chains: Vec<String>,
    pub chain_lengths: BTreeMap<String, u32>,
    pub contacts: Vec<ResidueContact>,
    pub summary: ContactSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactArtifact {
    pub interaction_id: u64,
    pub generated_at: String,
    pub data: ContactData,
}

/// One residue pair as emitted by the structural pipeline, before banding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawContact {
    pub chain1: String,
    pub resi1: u32,
    pub aa1: String,
    pub chain2: String,
    pub resi2: u32,
    pub aa2: String,
    pub pae: f32,
    pub distance: f32,
}

impl ContactArtifact {
    /// Band each contact, drop those past the cutoff, and derive the summary.
    pub fn build(
        interaction_id: u64,
        generated_at: impl Into<String>,
        chain_lengths: BTreeMap<String, u32>,
        raw: impl IntoIterator<Item = RawContact>,
    ) -> Self {
        let mut summary = ContactSummary::default();
        let contacts: Vec<ResidueContact> = raw
            .into_iter()
            .filter_map(|c| {
                let band = PaeBand::classify(c.pae)?;
                match band {
                    PaeBand::VeryHigh => summary.very_high_count += 1,
                    PaeBand::High => summary.high_count += 1,
                    PaeBand::Medium => summary.medium_count += 1,
                    PaeBand::Low => summary.low_count += 1,
                }
                Some(ResidueContact {
                    chain1: c.chain1,
                    resi1: c.resi1,
                    aa1: c.aa1,
                    chain2: c.chain2,
                    resi2: c.resi2,
                    aa2: c.aa2,
                    pae: c.pae,
                    distance: c.distance,
                    confidence: band,
                    color: band.color().to_string(),
                })
            })
            .collect();
        summary.total_contacts = contacts.len() as u32;

        Self {
            interaction_id,
            generated_at: generated_at.into(),
            data: ContactData {
                chains: chain_lengths.keys().cloned().collect(),
                chain_lengths,
                contacts,
                summary,
            },
        }
    }
}
