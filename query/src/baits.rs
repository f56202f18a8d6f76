use ppi_core::model::AnalysisMode;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use storage::Tables;

/// One protein acting as bait, with the number of its rows in the requested mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaitSummary {
    pub uniprot_id: String,
    pub gene_name: Option<String>,
    pub organism: Option<String>,
    pub organism_code: Option<String>,
    pub interaction_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaitListing {
    pub baits: Vec<BaitSummary>,
    pub count: usize,
    pub mode: String,
}

impl BaitListing {
    fn new(baits: Vec<BaitSummary>, mode: AnalysisMode) -> Self {
        Self {
            count: baits.len(),
            baits,
            mode: mode.as_str().to_string(),
        }
    }
}

/// Group rows by bait, drop baits with no rows in `mode`, order by gene then accession.
pub fn aggregate_baits(tables: &Tables, mode: AnalysisMode) -> BaitListing {
    let mut counts: BTreeMap<u64, u64> = BTreeMap::new();
    for interaction in tables.interactions().filter(|i| mode.includes(i)) {
        *counts.entry(interaction.bait_protein_id).or_default() += 1;
    }

    let mut baits: Vec<BaitSummary> = counts
        .into_iter()
        .filter_map(|(protein_id, interaction_count)| {
            // Rows reference existing proteins; skip rather than panic if one is missing.
            let protein = tables.protein(protein_id)?;
            Some(BaitSummary {
                uniprot_id: protein.uniprot_id.clone(),
                gene_name: protein.gene_name.clone(),
                organism: protein.organism.clone(),
                organism_code: protein.organism_code.clone(),
                interaction_count,
            })
        })
        .collect();

    baits.sort_by(compare_baits);
    BaitListing::new(baits, mode)
}

fn compare_baits(a: &BaitSummary, b: &BaitSummary) -> Ordering {
    let gene = match (&a.gene_name, &b.gene_name) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    gene.then_with(|| a.uniprot_id.cmp(&b.uniprot_id))
}
