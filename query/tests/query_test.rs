use ppi_core::error::{ErrorCode, PpiError};
use ppi_core::model::{AnalysisVersion, ConfidenceTier, ExperimentalMethod, InteractionScores};
use query::{BaitsRequest, QueryEngine, QueryError};
use std::sync::Arc;
use std::time::Duration;
use storage::{InteractionDraft, NewProtein, Repository, StorePool, ValidationRequest};
use tempfile::{tempdir, TempDir};

async fn engine(pool_size: usize) -> (TempDir, Arc<Repository>, QueryEngine) {
    let dir = tempdir().unwrap();
    let repo = Arc::new(Repository::open(dir.path().join("query.wal")).await.unwrap());
    let pool = StorePool::new(repo.clone(), pool_size, Duration::from_millis(50));
    (dir, repo, QueryEngine::new(pool))
}

async fn protein(repo: &Repository, uniprot: &str, gene: Option<&str>, code: &str) {
    let organism = match code {
        "Cr" => "Chlamydomonas reinhardtii",
        "Mm" => "Mus musculus",
        _ => "Homo sapiens",
    };
    let mut record = NewProtein::new(uniprot).with_organism(organism, code);
    if let Some(gene) = gene {
        record = record.with_gene(gene);
    }
    repo.upsert_protein(record).await.unwrap();
}

fn draft(bait: &str, prey: &str, scores: InteractionScores) -> InteractionDraft {
    InteractionDraft {
        bait_uniprot: bait.into(),
        prey_uniprot: prey.into(),
        scores,
    }
}

fn v3(iptm: f32) -> InteractionScores {
    let mut scores = InteractionScores::new(AnalysisVersion::V3, iptm);
    scores.alphafold_version = Some("AF3".into());
    scores
}

fn v4(iptm: f32, ipsae: Option<f32>, tier: Option<ConfidenceTier>) -> InteractionScores {
    let mut scores = InteractionScores::new(AnalysisVersion::V4, iptm);
    scores.alphafold_version = Some("AF3".into());
    scores.ipsae = ipsae;
    scores.ipsae_confidence = tier;
    scores
}

fn baits(mode: &str) -> BaitsRequest {
    BaitsRequest {
        mode: Some(mode.into()),
    }
}

#[tokio::test]
async fn test_validation_on_one_direction_reaches_both_and_lists_bait() {
    let (_dir, repo, engine) = engine(2).await;
    protein(&repo, "Q8NEZ3", Some("WDR19"), "Hs").await;
    protein(&repo, "Q9H0F7", Some("ARL6"), "Hs").await;
    repo.insert_interaction_pair(draft("Q8NEZ3", "Q9H0F7", v3(0.92)))
        .await
        .unwrap();

    repo.attach_validation(ValidationRequest {
        bait_uniprot: "Q8NEZ3".into(),
        prey_uniprot: "Q9H0F7".into(),
        analysis_version: AnalysisVersion::V3,
        methods: vec![ExperimentalMethod::new("Pulldown", "Example et al., 2020")],
    })
    .await
    .unwrap();

    {
        let tables = repo.tables().await;
        let arl6 = tables.protein_by_accession("Q9H0F7").unwrap().id;
        let wdr19 = tables.protein_by_accession("Q8NEZ3").unwrap().id;
        let reverse = tables
            .find_interaction((arl6, wdr19, AnalysisVersion::V3))
            .unwrap();
        assert!(reverse.is_validated());
    }

    let listing = engine.list_baits(&baits("v3")).await.unwrap();
    assert_eq!(listing.mode, "v3");
    let wdr19 = listing
        .baits
        .iter()
        .find(|b| b.gene_name.as_deref() == Some("WDR19"))
        .unwrap();
    assert!(wdr19.interaction_count >= 1);
    assert!(engine.reciprocal_report().await.unwrap().is_consistent());
}

#[tokio::test]
async fn test_counts_match_bait_rows_and_zero_count_baits_are_excluded() {
    let (_dir, repo, engine) = engine(2).await;
    protein(&repo, "Q8NEZ3", Some("WDR19"), "Hs").await;
    protein(&repo, "Q9H0F7", Some("ARL6"), "Hs").await;
    protein(&repo, "Q13099", Some("IFT88"), "Hs").await;
    // Prey only, never a bait.
    protein(&repo, "P00001", Some("AAA1"), "Hs").await;

    repo.insert_interaction(draft("Q8NEZ3", "Q9H0F7", v3(0.9)))
        .await
        .unwrap();
    repo.insert_interaction(draft("Q8NEZ3", "Q13099", v3(0.4)))
        .await
        .unwrap();
    repo.insert_interaction(draft("Q8NEZ3", "P00001", v4(0.6, Some(0.5), None)))
        .await
        .unwrap();
    repo.insert_interaction(draft("Q13099", "P00001", v4(0.6, None, None)))
        .await
        .unwrap();

    let listing = engine.list_baits(&baits("v3")).await.unwrap();
    let counts: Vec<(&str, u64)> = listing
        .baits
        .iter()
        .map(|b| (b.uniprot_id.as_str(), b.interaction_count))
        .collect();
    assert_eq!(counts, vec![("Q13099", 1), ("Q8NEZ3", 3)]);
    assert_eq!(listing.count, 2);

    // ipsae counts only v4 rows carrying a score, so IFT88 drops out entirely.
    let listing = engine.list_baits(&baits("ipsae")).await.unwrap();
    let counts: Vec<(&str, u64)> = listing
        .baits
        .iter()
        .map(|b| (b.uniprot_id.as_str(), b.interaction_count))
        .collect();
    assert_eq!(counts, vec![("Q8NEZ3", 1)]);
    assert_eq!(listing.mode, "ipsae");
}

#[tokio::test]
async fn test_sort_by_gene_then_accession_with_missing_genes_last() {
    let (_dir, repo, engine) = engine(1).await;
    protein(&repo, "Z99999", Some("BBS1"), "Hs").await;
    protein(&repo, "A00001", Some("BBS1"), "Mm").await;
    protein(&repo, "M00001", Some("ARL13B"), "Hs").await;
    protein(&repo, "B00001", None, "Cr").await;
    protein(&repo, "T00001", Some("TARGET"), "Hs").await;

    for bait in ["Z99999", "A00001", "M00001", "B00001"] {
        repo.insert_interaction(draft(bait, "T00001", v3(0.7)))
            .await
            .unwrap();
    }

    let listing = engine.list_baits(&BaitsRequest::default()).await.unwrap();
    let order: Vec<&str> = listing.baits.iter().map(|b| b.uniprot_id.as_str()).collect();
    assert_eq!(order, vec!["M00001", "A00001", "Z99999", "B00001"]);
    assert_eq!(listing.mode, "v3");
}

#[tokio::test]
async fn test_unsupported_mode_falls_back_to_default() {
    let (_dir, repo, engine) = engine(1).await;
    protein(&repo, "Q8NEZ3", Some("WDR19"), "Hs").await;
    protein(&repo, "Q9H0F7", Some("ARL6"), "Hs").await;
    repo.insert_interaction(draft("Q8NEZ3", "Q9H0F7", v3(0.8)))
        .await
        .unwrap();

    let fallback = engine.list_baits(&baits("alphafold9")).await.unwrap();
    let default = engine.list_baits(&BaitsRequest::default()).await.unwrap();
    assert_eq!(fallback, default);
}

#[tokio::test]
async fn test_pool_released_after_success_and_error() {
    let (_dir, _repo, engine) = engine(1).await;

    engine.list_baits(&BaitsRequest::default()).await.unwrap();
    assert_eq!(engine.pool().available(), 1);

    let err = engine.search("   ", None, None).await.unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidArgument);
    assert_eq!(engine.pool().available(), 1);

    engine.search("WDR19", None, None).await.unwrap();
    assert_eq!(engine.pool().available(), 1);
}

#[tokio::test]
async fn test_exhausted_pool_surfaces_retryable_error() {
    let (_dir, _repo, engine) = engine(1).await;
    let held = engine.pool().acquire().await.unwrap();

    let err = engine.list_baits(&BaitsRequest::default()).await.unwrap_err();
    assert!(matches!(err, QueryError::Pool(_)));
    assert_eq!(err.error_code(), ErrorCode::ResourceExhausted);
    assert!(err.error_code().is_retryable());

    drop(held);
    assert!(engine.list_baits(&BaitsRequest::default()).await.is_ok());
}

#[tokio::test]
async fn test_search_by_gene_alias_and_organism_prefix() {
    let (_dir, repo, engine) = engine(2).await;
    protein(&repo, "Q8NEZ3", Some("WDR19"), "Hs").await;
    protein(&repo, "Q9H0F7", Some("ARL6"), "Hs").await;
    protein(&repo, "A8JFR3", Some("IFT144"), "Cr").await;
    protein(&repo, "A8HXY1", Some("IFT140"), "Cr").await;
    repo.add_alias("Q9H0F7", "BBS3", "gene_synonym").await.unwrap();

    repo.insert_interaction_pair(draft("Q8NEZ3", "Q9H0F7", v3(0.92)))
        .await
        .unwrap();
    repo.insert_interaction(draft("A8JFR3", "A8HXY1", v3(0.81)))
        .await
        .unwrap();

    let results = engine.search("bbs3", None, None).await.unwrap();
    assert_eq!(results.interactions.len(), 2);
    assert_eq!(results.search_term, "bbs3");
    assert_eq!(results.filter_mode, "v3");

    let results = engine.search("Cr:IFT14", None, None).await.unwrap();
    assert_eq!(results.interactions.len(), 1);
    assert_eq!(results.interactions[0].bait_gene.as_deref(), Some("IFT144"));

    let results = engine.search("HsIFT14", None, None).await.unwrap();
    assert!(results.interactions.is_empty());
}

#[tokio::test]
async fn test_organism_prefix_matches_any_case() {
    let (_dir, repo, engine) = engine(2).await;
    protein(&repo, "A8JFR3", Some("IFT144"), "Cr").await;
    protein(&repo, "A8HXY1", Some("IFT140"), "Cr").await;
    repo.insert_interaction(draft("A8JFR3", "A8HXY1", v3(0.81)))
        .await
        .unwrap();

    for term in ["CrIFT144", "CRIFT144", "crift144"] {
        let results = engine.search(term, None, None).await.unwrap();
        assert_eq!(results.interactions.len(), 1, "{term}");
        assert_eq!(results.search_term, term);
    }
    let results = engine.search("HSIFT144", None, None).await.unwrap();
    assert!(results.interactions.is_empty());
}

#[tokio::test]
async fn test_ipsae_search_filters_and_orders_by_tier() {
    let (_dir, repo, engine) = engine(2).await;
    protein(&repo, "Q8NEZ3", Some("WDR19"), "Hs").await;
    protein(&repo, "Q9H0F7", Some("ARL6"), "Hs").await;
    protein(&repo, "Q13099", Some("IFT88"), "Hs").await;
    protein(&repo, "Q9Y366", Some("IFT52"), "Hs").await;

    repo.insert_interaction(draft(
        "Q8NEZ3",
        "Q9H0F7",
        v4(0.9, Some(0.41), Some(ConfidenceTier::Medium)),
    ))
    .await
    .unwrap();
    repo.insert_interaction(draft(
        "Q8NEZ3",
        "Q13099",
        v4(0.5, Some(0.72), Some(ConfidenceTier::High)),
    ))
    .await
    .unwrap();
    repo.insert_interaction(draft("Q8NEZ3", "Q9Y366", v4(0.95, None, None)))
        .await
        .unwrap();

    let results = engine.search("WDR19", Some("ipsae"), None).await.unwrap();
    let preys: Vec<&str> = results
        .interactions
        .iter()
        .map(|h| h.prey_uniprot.as_str())
        .collect();
    assert_eq!(preys, vec!["Q13099", "Q9H0F7"]);

    let results = engine
        .search("WDR19", Some("ipsae"), Some("Medium"))
        .await
        .unwrap();
    assert_eq!(results.interactions.len(), 1);
    assert_eq!(results.confidence_levels, vec!["Medium"]);
}

#[tokio::test]
async fn test_af2_pseudo_level_selects_unlabelled_af2_rows() {
    let (_dir, repo, engine) = engine(2).await;
    protein(&repo, "Q8NEZ3", Some("WDR19"), "Hs").await;
    protein(&repo, "Q9H0F7", Some("ARL6"), "Hs").await;
    protein(&repo, "Q13099", Some("IFT88"), "Hs").await;

    let mut af2 = InteractionScores::new(AnalysisVersion::V3, 0.66);
    af2.alphafold_version = Some("AF2".into());
    repo.insert_interaction(draft("Q8NEZ3", "Q9H0F7", af2))
        .await
        .unwrap();
    let mut labelled = v3(0.88);
    labelled.confidence = Some("High".into());
    repo.insert_interaction(draft("Q8NEZ3", "Q13099", labelled))
        .await
        .unwrap();

    let only_af2 = engine.search("WDR19", None, Some("AF2")).await.unwrap();
    assert_eq!(only_af2.interactions.len(), 1);
    assert_eq!(only_af2.interactions[0].prey_uniprot, "Q9H0F7");

    let both = engine
        .search("WDR19", Some("v3"), Some("High,AF2"))
        .await
        .unwrap();
    let preys: Vec<&str> = both.interactions.iter().map(|h| h.prey_uniprot.as_str()).collect();
    assert_eq!(preys, vec!["Q13099", "Q9H0F7"]);
}

#[tokio::test]
async fn test_ipsae_search_and_listing_agree_on_rows() {
    let (_dir, repo, engine) = engine(2).await;
    protein(&repo, "Q8NEZ3", Some("WDR19"), "Hs").await;
    protein(&repo, "Q9H0F7", Some("ARL6"), "Hs").await;
    protein(&repo, "Q13099", Some("IFT88"), "Hs").await;

    // A v3 row that happens to carry an ipSAE value is not an ipSAE-mode row.
    let mut stray = v3(0.9);
    stray.ipsae = Some(0.8);
    stray.ipsae_confidence = Some(ConfidenceTier::High);
    repo.insert_interaction(draft("Q8NEZ3", "Q9H0F7", stray))
        .await
        .unwrap();
    repo.insert_interaction(draft(
        "Q8NEZ3",
        "Q13099",
        v4(0.7, Some(0.6), Some(ConfidenceTier::Medium)),
    ))
    .await
    .unwrap();

    let results = engine.search("WDR19", Some("ipsae"), None).await.unwrap();
    let preys: Vec<&str> = results
        .interactions
        .iter()
        .map(|h| h.prey_uniprot.as_str())
        .collect();
    assert_eq!(preys, vec!["Q13099"]);

    let listing = engine.list_baits(&baits("ipsae")).await.unwrap();
    assert_eq!(listing.baits.len(), 1);
    assert_eq!(listing.baits[0].interaction_count, results.interactions.len() as u64);
}
