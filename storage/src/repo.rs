use crate::wal::{Wal, WalError};
use ppi_core::error::{ErrorCode, PpiError};
use ppi_core::model::{
    AnalysisVersion, ExperimentalMethod, ExperimentalValidation, Interaction, InteractionScores,
    PairKey, Protein, ProteinAlias,
};
use rkyv::ser::{serializers::AllocSerializer, Serializer};
use rkyv::{Archive, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),
    #[error("Serialization error")]
    Serialization,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Reciprocal consistency violated: {0}")]
    ReciprocalViolation(String),
}

impl PpiError for RepoError {
    fn error_code(&self) -> ErrorCode {
        match self {
            RepoError::NotFound(_) => ErrorCode::NotFound,
            RepoError::InvalidTransaction(_) => ErrorCode::InvalidArgument,
            RepoError::Conflict(_) | RepoError::ReciprocalViolation(_) => ErrorCode::Conflict,
            RepoError::Wal(_) | RepoError::Serialization => ErrorCode::Internal,
        }
    }
}

/// One row-level write inside a transaction.
#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub enum Mutation {
    PutProtein(Protein),
    PutAlias(ProteinAlias),
    PutInteraction(Interaction),
}

/// A committed transaction as persisted in the WAL.
#[derive(Archive, Deserialize, Serialize, Debug, Clone)]
#[archive(check_bytes)]
pub struct WalRecord {
    pub mutations: Vec<Mutation>,
}

/// Protein identity as supplied by an importer, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProtein {
    pub uniprot_id: String,
    pub gene_name: Option<String>,
    pub organism: Option<String>,
    pub organism_code: Option<String>,
}

impl NewProtein {
    pub fn new(uniprot_id: impl Into<String>) -> Self {
        Self {
            uniprot_id: uniprot_id.into(),
            gene_name: None,
            organism: None,
            organism_code: None,
        }
    }

    pub fn with_gene(mut self, gene_name: impl Into<String>) -> Self {
        self.gene_name = Some(gene_name.into());
        self
    }

    pub fn with_organism(mut self, organism: impl Into<String>, code: impl Into<String>) -> Self {
        self.organism = Some(organism.into());
        self.organism_code = Some(code.into());
        self
    }

    fn into_protein(self, id: u64) -> Protein {
        Protein {
            id,
            uniprot_id: self.uniprot_id,
            gene_name: self.gene_name,
            organism: self.organism,
            organism_code: self.organism_code,
        }
    }
}

/// A directed interaction addressed by accessions.
#[derive(Debug, Clone)]
pub struct InteractionDraft {
    pub bait_uniprot: String,
    pub prey_uniprot: String,
    pub scores: InteractionScores,
}

/// Both directed rows of one biological interaction. Identical for homodimers.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionPair {
    pub forward: Interaction,
    pub reverse: Interaction,
}

/// Evidence to attach to the pair `bait <-> prey` for one analysis version.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub bait_uniprot: String,
    pub prey_uniprot: String,
    pub analysis_version: AnalysisVersion,
    pub methods: Vec<ExperimentalMethod>,
}

/// In-memory image of the relational tables.
#[derive(Debug, Default)]
pub struct Tables {
    proteins: BTreeMap<u64, Protein>,
    accessions: HashMap<String, u64>,
    aliases: BTreeMap<u64, ProteinAlias>,
    interactions: BTreeMap<u64, Interaction>,
    pairs: HashMap<PairKey, u64>,
}

impl Tables {
    pub fn protein(&self, id: u64) -> Option<&Protein> {
        self.proteins.get(&id)
    }

    pub fn protein_by_accession(&self, uniprot_id: &str) -> Option<&Protein> {
        self.accessions
            .get(uniprot_id)
            .and_then(|id| self.proteins.get(id))
    }

    pub fn proteins(&self) -> impl Iterator<Item = &Protein> {
        self.proteins.values()
    }

    pub fn aliases_of(&self, protein_id: u64) -> impl Iterator<Item = &ProteinAlias> {
        self.aliases
            .values()
            .filter(move |alias| alias.protein_id == protein_id)
    }

    pub fn interaction(&self, id: u64) -> Option<&Interaction> {
        self.interactions.get(&id)
    }

    pub fn interactions(&self) -> impl Iterator<Item = &Interaction> {
        self.interactions.values()
    }

    pub fn find_interaction(&self, key: PairKey) -> Option<&Interaction> {
        self.pairs
            .get(&key)
            .and_then(|id| self.interactions.get(id))
    }

    pub fn mirror_of(&self, interaction: &Interaction) -> Option<&Interaction> {
        self.find_interaction(interaction.mirror_key())
    }

    pub fn protein_count(&self) -> usize {
        self.proteins.len()
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.len()
    }

    fn next_protein_id(&self) -> u64 {
        next_id(&self.proteins)
    }

    fn next_alias_id(&self) -> u64 {
        next_id(&self.aliases)
    }

    fn next_interaction_id(&self) -> u64 {
        next_id(&self.interactions)
    }

    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::PutProtein(protein) => {
                self.accessions
                    .insert(protein.uniprot_id.clone(), protein.id);
                self.proteins.insert(protein.id, protein);
            }
            Mutation::PutAlias(alias) => {
                self.aliases.insert(alias.id, alias);
            }
            Mutation::PutInteraction(interaction) => {
                self.pairs.insert(interaction.pair_key(), interaction.id);
                self.interactions.insert(interaction.id, interaction);
            }
        }
    }
}

fn next_id<V>(table: &BTreeMap<u64, V>) -> u64 {
    table.keys().next_back().map_or(1, |last| last + 1)
}

/// Rows a pending transaction would write, layered over the committed tables.
struct Staged<'a> {
    base: &'a Tables,
    proteins: HashMap<u64, Protein>,
    accessions: HashMap<String, u64>,
    aliases: HashMap<u64, ProteinAlias>,
    interactions: HashMap<u64, Interaction>,
    pairs: HashMap<PairKey, u64>,
}

impl<'a> Staged<'a> {
    fn new(base: &'a Tables) -> Self {
        Self {
            base,
            proteins: HashMap::new(),
            accessions: HashMap::new(),
            aliases: HashMap::new(),
            interactions: HashMap::new(),
            pairs: HashMap::new(),
        }
    }

    fn protein(&self, id: u64) -> Option<&Protein> {
        self.proteins.get(&id).or_else(|| self.base.protein(id))
    }

    fn protein_id_for(&self, uniprot_id: &str) -> Option<u64> {
        self.accessions
            .get(uniprot_id)
            .or_else(|| self.base.accessions.get(uniprot_id))
            .copied()
    }

    fn alias(&self, id: u64) -> Option<&ProteinAlias> {
        self.aliases.get(&id).or_else(|| self.base.aliases.get(&id))
    }

    fn interaction(&self, id: u64) -> Option<&Interaction> {
        self.interactions
            .get(&id)
            .or_else(|| self.base.interaction(id))
    }

    fn interaction_id_for(&self, key: PairKey) -> Option<u64> {
        self.pairs
            .get(&key)
            .or_else(|| self.base.pairs.get(&key))
            .copied()
    }

    fn stage(&mut self, mutation: &Mutation) -> Result<(), RepoError> {
        match mutation {
            Mutation::PutProtein(protein) => self.stage_protein(protein),
            Mutation::PutAlias(alias) => self.stage_alias(alias),
            Mutation::PutInteraction(interaction) => self.stage_interaction(interaction),
        }
    }

    fn stage_protein(&mut self, protein: &Protein) -> Result<(), RepoError> {
        if protein.uniprot_id.trim().is_empty() {
            return Err(RepoError::InvalidTransaction(
                "protein uniprot_id must not be empty".into(),
            ));
        }
        if let Some(existing) = self.protein(protein.id) {
            if !existing.same_identity(protein) {
                return Err(RepoError::Conflict(format!(
                    "protein {} is immutable and already recorded as {}",
                    protein.id, existing.uniprot_id
                )));
            }
        }
        if let Some(owner) = self.protein_id_for(&protein.uniprot_id) {
            if owner != protein.id {
                return Err(RepoError::Conflict(format!(
                    "accession {} already belongs to protein {}",
                    protein.uniprot_id, owner
                )));
            }
        }
        self.accessions
            .insert(protein.uniprot_id.clone(), protein.id);
        self.proteins.insert(protein.id, protein.clone());
        Ok(())
    }

    fn stage_alias(&mut self, alias: &ProteinAlias) -> Result<(), RepoError> {
        if self.protein(alias.protein_id).is_none() {
            return Err(RepoError::InvalidTransaction(format!(
                "alias protein {} does not exist",
                alias.protein_id
            )));
        }
        if alias.alias_name.trim().is_empty() {
            return Err(RepoError::InvalidTransaction(
                "alias_name must not be empty".into(),
            ));
        }
        if let Some(existing) = self.alias(alias.id) {
            if existing != alias {
                return Err(RepoError::Conflict(format!(
                    "alias {} already exists with different content",
                    alias.id
                )));
            }
        }
        self.aliases.insert(alias.id, alias.clone());
        Ok(())
    }

    fn stage_interaction(&mut self, interaction: &Interaction) -> Result<(), RepoError> {
        for (side, protein_id) in [
            ("bait", interaction.bait_protein_id),
            ("prey", interaction.prey_protein_id),
        ] {
            if self.protein(protein_id).is_none() {
                return Err(RepoError::InvalidTransaction(format!(
                    "interaction {} {} protein {} does not exist",
                    interaction.id, side, protein_id
                )));
            }
        }
        if !interaction.scores.is_well_formed() {
            return Err(RepoError::InvalidTransaction(format!(
                "interaction {} carries non-finite scores",
                interaction.id
            )));
        }
        if let Some(existing) = self.interaction(interaction.id) {
            if existing.pair_key() != interaction.pair_key() {
                return Err(RepoError::Conflict(format!(
                    "interaction {} cannot change its endpoints or analysis version",
                    interaction.id
                )));
            }
        }
        if let Some(owner) = self.interaction_id_for(interaction.pair_key()) {
            if owner != interaction.id {
                return Err(RepoError::Conflict(format!(
                    "directed pair {}->{} ({}) already stored as interaction {}",
                    interaction.bait_protein_id,
                    interaction.prey_protein_id,
                    interaction.analysis_version().as_str(),
                    owner
                )));
            }
        }
        self.pairs.insert(interaction.pair_key(), interaction.id);
        self.interactions
            .insert(interaction.id, interaction.clone());
        Ok(())
    }

    /// Every row the transaction touched must agree with its mirror in the post-state.
    fn check_reciprocal(&self) -> Result<(), RepoError> {
        let touched: BTreeSet<u64> = self.interactions.keys().copied().collect();
        for id in touched {
            let Some(row) = self.interaction(id) else {
                continue;
            };
            let mirror = self
                .interaction_id_for(row.mirror_key())
                .and_then(|mirror_id| self.interaction(mirror_id));

            match mirror {
                None if row.experimental_validation.is_some() => {
                    return Err(RepoError::ReciprocalViolation(format!(
                        "interaction {} carries validation but has no reverse row",
                        row.id
                    )));
                }
                None => {}
                Some(mirror) => {
                    if !row.scores_match(mirror) {
                        return Err(RepoError::ReciprocalViolation(format!(
                            "interactions {} and {} disagree on scores",
                            row.id, mirror.id
                        )));
                    }
                    if row.experimental_validation != mirror.experimental_validation {
                        return Err(RepoError::ReciprocalViolation(format!(
                            "interactions {} and {} disagree on validation",
                            row.id, mirror.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Durable schema store. Tables live in memory and are rebuilt from the WAL on open.
pub struct Repository {
    wal: Arc<Mutex<Wal>>,
    tx_lock: Arc<Mutex<()>>,
    tables: Arc<RwLock<Tables>>,
}

impl Repository {
    /// Open a Repository with WAL replay to restore previous state.
    pub async fn open(wal_path: impl AsRef<Path>) -> Result<Self, RepoError> {
        let mut wal = Wal::open(&wal_path).await?;
        let mut tables = Tables::default();

        let last_lsn = wal
            .replay(|_lsn, data| {
                let record = decode_record(&data)?;
                for mutation in record.mutations {
                    tables.apply(mutation);
                }
                Ok(())
            })
            .await?;

        tracing::info!(
            path = %wal_path.as_ref().display(),
            last_lsn,
            proteins = tables.protein_count(),
            interactions = tables.interaction_count(),
            "schema store opened"
        );

        Ok(Self {
            wal: Arc::new(Mutex::new(wal)),
            tx_lock: Arc::new(Mutex::new(())),
            tables: Arc::new(RwLock::new(tables)),
        })
    }

    /// Consistent read view of all tables. Writers wait until it is dropped.
    pub async fn tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().await
    }

    pub async fn current_lsn(&self) -> u64 {
        self.wal.lock().await.current_lsn()
    }

    /// Apply mutations atomically within one transaction boundary.
    /// If validation fails, nothing is written to the WAL or the tables.
    pub async fn apply_transaction(&self, mutations: Vec<Mutation>) -> Result<(), RepoError> {
        self.transact(|_| Ok((mutations, ()))).await
    }

    /// Build a transaction from the committed state and commit it, with no writer in between.
    async fn transact<F, T>(&self, build: F) -> Result<T, RepoError>
    where
        F: FnOnce(&Tables) -> Result<(Vec<Mutation>, T), RepoError>,
    {
        // Serialize build, validation and apply to avoid TOCTOU between concurrent writers.
        let _tx_guard = self.tx_lock.lock().await;

        let (mutations, output) = {
            let tables = self.tables.read().await;
            let (mutations, output) = build(&*tables)?;
            if mutations.is_empty() {
                return Ok(output);
            }

            let mut staged = Staged::new(&tables);
            for mutation in &mutations {
                staged.stage(mutation)?;
            }
            staged.check_reciprocal()?;
            (mutations, output)
        };

        let record = WalRecord { mutations };
        let bytes = encode_record(&record)?;

        // Durability first for the full transaction boundary.
        {
            // A failed commit is rolled back inside the WAL; tables stay untouched.
            let mut wal = self.wal.lock().await;
            wal.commit(&bytes).await?;
        }

        // One write lock for the whole batch so readers never observe half a pair.
        let mut tables = self.tables.write().await;
        for mutation in record.mutations {
            tables.apply(mutation);
        }

        Ok(output)
    }

    /// Insert a protein, or return the stored one when the identity matches exactly.
    /// A differing record for a known accession is rejected rather than merged.
    pub async fn upsert_protein(&self, protein: NewProtein) -> Result<Protein, RepoError> {
        self.transact(|tables| {
            if let Some(existing) = tables.protein_by_accession(&protein.uniprot_id) {
                let candidate = protein.clone().into_protein(existing.id);
                if existing.same_identity(&candidate) {
                    return Ok((Vec::new(), existing.clone()));
                }
                return Err(RepoError::Conflict(format!(
                    "accession {} already recorded with different metadata",
                    protein.uniprot_id
                )));
            }
            let stored = protein.into_protein(tables.next_protein_id());
            Ok((vec![Mutation::PutProtein(stored.clone())], stored))
        })
        .await
    }

    pub async fn add_alias(
        &self,
        uniprot_id: &str,
        alias_name: &str,
        alias_type: &str,
    ) -> Result<ProteinAlias, RepoError> {
        self.transact(|tables| {
            let protein = tables
                .protein_by_accession(uniprot_id)
                .ok_or_else(|| RepoError::NotFound(format!("protein {uniprot_id}")))?;
            if let Some(existing) = tables
                .aliases_of(protein.id)
                .find(|a| a.alias_name == alias_name && a.alias_type == alias_type)
            {
                return Ok((Vec::new(), existing.clone()));
            }
            let alias = ProteinAlias {
                id: tables.next_alias_id(),
                protein_id: protein.id,
                alias_name: alias_name.to_string(),
                alias_type: alias_type.to_string(),
            };
            Ok((vec![Mutation::PutAlias(alias.clone())], alias))
        })
        .await
    }

    /// Insert one directed row without evidence.
    pub async fn insert_interaction(
        &self,
        draft: InteractionDraft,
    ) -> Result<Interaction, RepoError> {
        self.transact(|tables| {
            let (bait, prey) = resolve_endpoints(tables, &draft.bait_uniprot, &draft.prey_uniprot)?;
            let row = Interaction::new(tables.next_interaction_id(), bait, prey, draft.scores);
            Ok((vec![Mutation::PutInteraction(row.clone())], row))
        })
        .await
    }

    /// Insert both directions of an interaction with shared scores.
    pub async fn insert_interaction_pair(
        &self,
        draft: InteractionDraft,
    ) -> Result<InteractionPair, RepoError> {
        self.transact(|tables| {
            let (bait, prey) = resolve_endpoints(tables, &draft.bait_uniprot, &draft.prey_uniprot)?;
            let forward_id = tables.next_interaction_id();
            let forward = Interaction::new(forward_id, bait, prey, draft.scores);

            if bait == prey {
                let mutations = vec![Mutation::PutInteraction(forward.clone())];
                return Ok((mutations, InteractionPair { reverse: forward.clone(), forward }));
            }

            let reverse = forward.mirrored(forward_id + 1);
            let mutations = vec![
                Mutation::PutInteraction(forward.clone()),
                Mutation::PutInteraction(reverse.clone()),
            ];
            Ok((mutations, InteractionPair { forward, reverse }))
        })
        .await
    }

    /// Attach evidence to both directions of a pair in one transaction.
    ///
    /// Either stored direction may be named as the bait. A missing direction is
    /// created first by mirroring the existing one. The two rows end up with the
    /// same merged payload, or nothing is written at all.
    pub async fn attach_validation(
        &self,
        request: ValidationRequest,
    ) -> Result<InteractionPair, RepoError> {
        if request.methods.is_empty() {
            return Err(RepoError::InvalidTransaction(
                "validation requires at least one experimental method".into(),
            ));
        }

        self.transact(|tables| {
            let (bait, prey) =
                resolve_endpoints(tables, &request.bait_uniprot, &request.prey_uniprot)?;
            let version = request.analysis_version;

            let forward = tables.find_interaction((bait, prey, version)).cloned();
            let reverse = tables.find_interaction((prey, bait, version)).cloned();

            let mut mutations = Vec::with_capacity(2);
            let (mut forward, mut reverse) = match (forward, reverse) {
                (Some(forward), Some(reverse)) => {
                    if !forward.scores_match(&reverse) {
                        return Err(RepoError::Conflict(format!(
                            "interactions {} and {} disagree on scores",
                            forward.id, reverse.id
                        )));
                    }
                    (forward, reverse)
                }
                (Some(forward), None) => {
                    let reverse = forward.mirrored(tables.next_interaction_id());
                    (forward, reverse)
                }
                (None, Some(reverse)) => {
                    let forward = reverse.mirrored(tables.next_interaction_id());
                    (forward, reverse)
                }
                (None, None) => {
                    return Err(RepoError::NotFound(format!(
                        "interaction {} <-> {} ({})",
                        request.bait_uniprot,
                        request.prey_uniprot,
                        version.as_str()
                    )))
                }
            };

            let merged = ExperimentalValidation::merged(
                forward
                    .experimental_validation
                    .iter()
                    .chain(reverse.experimental_validation.iter()),
                request.methods.iter().cloned(),
            );
            forward.experimental_validation = Some(merged.clone());
            reverse.experimental_validation = Some(merged);

            if forward.id == reverse.id {
                mutations.push(Mutation::PutInteraction(forward.clone()));
            } else {
                // Reverse first: it may be the row this transaction creates.
                mutations.push(Mutation::PutInteraction(reverse.clone()));
                mutations.push(Mutation::PutInteraction(forward.clone()));
            }
            Ok((mutations, InteractionPair { forward, reverse }))
        })
        .await
    }
}

fn resolve_endpoints(
    tables: &Tables,
    bait_uniprot: &str,
    prey_uniprot: &str,
) -> Result<(u64, u64), RepoError> {
    let lookup = |accession: &str| {
        tables
            .protein_by_accession(accession)
            .map(|p| p.id)
            .ok_or_else(|| RepoError::NotFound(format!("protein {accession}")))
    };
    Ok((lookup(bait_uniprot)?, lookup(prey_uniprot)?))
}

fn encode_record(record: &WalRecord) -> Result<Vec<u8>, RepoError> {
    let mut serializer = AllocSerializer::<4096>::default();
    serializer
        .serialize_value(record)
        .map_err(|_| RepoError::Serialization)?;
    Ok(serializer.into_serializer().into_inner().to_vec())
}

fn decode_record(data: &[u8]) -> Result<WalRecord, WalError> {
    let archived =
        rkyv::check_archived_root::<WalRecord>(data).map_err(|_| WalError::CorruptEntry)?;
    archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| WalError::CorruptEntry)
}
