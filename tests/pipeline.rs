use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use assert_matches::assert_matches;
use serde_json::{Value, json};

use kira_pdb_homology::domain::{SequenceQuery, StructureId};
use kira_pdb_homology::error::KiraError;
use kira_pdb_homology::lookup::CompoundLookup;
use kira_pdb_homology::metadata::MetadataClient;
use kira_pdb_homology::output::JsonOutput;
use kira_pdb_homology::pipeline::{Pipeline, PipelineOptions, PipelineResult};
use kira_pdb_homology::search::{SearchClient, SearchHits, SearchRequest, StructureHit};

/// Canned hits keyed by query sequence. Sequences listed in `failing` error out.
#[derive(Default)]
struct MockSearch {
    hits: HashMap<String, Vec<(&'static str, f64)>>,
    failing: HashSet<String>,
    calls: Mutex<usize>,
}

impl MockSearch {
    fn with(mut self, sequence: &str, hits: &[(&'static str, f64)]) -> Self {
        self.hits.insert(sequence.to_string(), hits.to_vec());
        self
    }

    fn failing(mut self, sequence: &str) -> Self {
        self.failing.insert(sequence.to_string());
        self
    }
}

impl SearchClient for MockSearch {
    fn search(&self, request: &SearchRequest<'_>) -> Result<SearchHits, KiraError> {
        *self.calls.lock().unwrap() += 1;
        if self.failing.contains(request.sequence) {
            return Err(KiraError::SearchHttp("operation timed out".to_string()));
        }
        Ok(self
            .hits
            .get(request.sequence)
            .map(|items| {
                items
                    .iter()
                    .map(|(id, evalue)| StructureHit::new(id.parse().unwrap(), *evalue, 0.8))
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Serves GraphQL entries built from `entities` (entity id → lineage ECs).
/// Every requested id is recorded; `fail_on` makes that 1-based bundle fail.
/// Entities in `strandless` are served without `entity_poly.pdbx_strand_id`.
#[derive(Default)]
struct MockMetadata {
    entities: HashMap<String, Vec<&'static str>>,
    strandless: HashSet<String>,
    requested: Mutex<Vec<Vec<String>>>,
    fail_on: Option<usize>,
}

impl MockMetadata {
    fn with(mut self, entity: &str, ecs: &[&'static str]) -> Self {
        self.entities.insert(entity.to_string(), ecs.to_vec());
        self
    }

    fn strandless(mut self, entity: &str) -> Self {
        self.strandless.insert(entity.to_string());
        self
    }

    fn requests(&self) -> Vec<Vec<String>> {
        self.requested.lock().unwrap().clone()
    }

    fn entry(&self, structure: &StructureId) -> Value {
        let mut entities = self
            .entities
            .iter()
            .filter(|(id, _)| id.starts_with(&format!("{}_", structure.as_str())))
            .collect::<Vec<_>>();
        entities.sort();
        if entities.is_empty() {
            return Value::Null;
        }
        let polymers = entities
            .into_iter()
            .map(|(id, ecs)| {
                let poly = if self.strandless.contains(id.as_str()) {
                    json!({})
                } else {
                    json!({ "pdbx_strand_id": "A" })
                };
                json!({
                    "rcsb_id": id,
                    "entity_poly": poly,
                    "rcsb_entity_source_organism": [
                        { "ncbi_taxonomy_id": 562, "ncbi_scientific_name": "Escherichia coli" }
                    ],
                    "rcsb_polymer_entity": {
                        "rcsb_ec_lineage": ecs.iter().map(|ec| json!({ "id": ec })).collect::<Vec<_>>()
                    },
                    "uniprots": null
                })
            })
            .collect::<Vec<_>>();
        json!({
            "rcsb_id": structure.as_str(),
            "exptl": [{ "method": "X-RAY DIFFRACTION" }],
            "rcsb_primary_citation": null,
            "polymer_entities": polymers,
            "nonpolymer_entities": null
        })
    }
}

impl MetadataClient for MockMetadata {
    fn fetch_entries(&self, ids: &[StructureId]) -> Result<Value, KiraError> {
        let mut requested = self.requested.lock().unwrap();
        requested.push(ids.iter().map(|id| id.as_str().to_string()).collect());
        if self.fail_on == Some(requested.len()) {
            return Err(KiraError::MetadataUnavailable("connection reset".to_string()));
        }
        let entries = ids.iter().map(|id| self.entry(id)).collect::<Vec<_>>();
        Ok(json!({ "data": { "entries": entries } }))
    }
}

fn options(max_hits: usize, bundle_size: usize) -> PipelineOptions {
    PipelineOptions {
        max_hits,
        bundle_size,
        ..PipelineOptions::default()
    }
}

fn run(
    search: MockSearch,
    metadata: MockMetadata,
    options: PipelineOptions,
    queries: &[SequenceQuery],
) -> (Result<PipelineResult, KiraError>, Pipeline<MockSearch, MockMetadata>) {
    let pipeline = Pipeline::new(search, metadata, CompoundLookup::new(), options);
    let result = pipeline.run(queries, &JsonOutput);
    (result, pipeline)
}

fn rows(result: &PipelineResult, gene_id: &str) -> Vec<String> {
    result
        .table
        .rows_for(gene_id)
        .map(|index| result.table.entity_ids[index].as_str().to_string())
        .collect()
}

#[test]
fn shared_structure_is_fetched_once_and_evaluated_per_gene() {
    let search = MockSearch::default()
        .with("MKTAYIAK", &[("1ABC_1", 1e-20)])
        .with("MSTAGKVI", &[("1ABC_1", 1e-10)]);
    let metadata = MockMetadata::default().with("1ABC_1", &["1.1.1.1"]);
    let queries = [
        SequenceQuery::new("g1", "MKTAYIAK"),
        SequenceQuery::new("g2", "MSTAGKVI"),
    ];
    let pipeline = Pipeline::new(search, metadata, CompoundLookup::new(), options(2, 100));
    let result = pipeline.run(&queries, &JsonOutput).unwrap();

    assert_eq!(rows(&result, "g1"), vec!["1ABC_1"]);
    assert_eq!(rows(&result, "g2"), vec!["1ABC_1"]);
    assert_eq!(result.table.similarities, vec![(1e-20, 0.8), (1e-10, 0.8)]);
    assert_eq!(result.summary.distinct_structures, 1);
    assert_eq!(result.summary.metadata_requests, 1);
}

#[test]
fn metadata_requests_are_bundled_and_deduplicated() {
    let search = MockSearch::default()
        .with("AAAA", &[("1AAA_1", 1e-9), ("2BBB_1", 1e-8), ("3CCC_1", 1e-7)])
        .with("CCCC", &[("3CCC_1", 1e-9), ("4DDD_1", 1e-8), ("5EEE_1", 1e-7)])
        .with("DDDD", &[("1AAA_2", 1e-3), ("5EEE_1", 1e-4)]);
    let metadata = MockMetadata::default()
        .with("1AAA_1", &["1.1.1.1"])
        .with("1AAA_2", &["1.1.1.2"])
        .with("2BBB_1", &["2.2.2.2"])
        .with("3CCC_1", &["3.3.3.3"])
        .with("4DDD_1", &["4.4.4.4"])
        .with("5EEE_1", &["5.5.5.5"]);
    let queries = [
        SequenceQuery::new("g1", "AAAA"),
        SequenceQuery::new("g2", "CCCC"),
        SequenceQuery::new("g3", "DDDD"),
    ];
    let (result, pipeline) = run(search, metadata, options(2, 2), &queries);
    let result = result.unwrap();

    let requests = pipeline.metadata_client().requests();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|bundle| bundle.len() <= 2));
    let flattened = requests.concat();
    assert_eq!(flattened, vec!["1AAA", "2BBB", "3CCC", "4DDD", "5EEE"]);
    assert_eq!(result.summary.metadata_requests, 3);
    assert_eq!(result.summary.distinct_structures, 5);
}

#[test]
fn duplicate_ec_keeps_most_significant_owner() {
    let search = MockSearch::default().with("MKT", &[("1AAA_1", 1e-5), ("2BBB_1", 1e-30)]);
    let metadata = MockMetadata::default()
        .with("1AAA_1", &["2", "2.7", "2.7.1", "2.7.1.1"])
        .with("2BBB_1", &["2.7.1.1"]);
    let queries = [SequenceQuery::new("g3", "MKT")];
    let (result, _) = run(search, metadata, options(5, 100), &queries);
    assert_eq!(rows(&result.unwrap(), "g3"), vec!["2BBB_1"]);
}

#[test]
fn cap_and_ordering_follow_best_evalue() {
    let search = MockSearch::default().with(
        "MKT",
        &[("1AAA_1", 1e-5), ("2BBB_1", 1e-10), ("3CCC_1", 1e-50)],
    );
    let metadata = MockMetadata::default()
        .with("1AAA_1", &["1.1.1.1"])
        .with("2BBB_1", &["2.2.2.2"])
        .with("3CCC_1", &["3.3.3.3"]);
    let queries = [SequenceQuery::new("g1", "MKT")];
    let (result, _) = run(search, metadata, options(2, 100), &queries);
    let result = result.unwrap();

    assert_eq!(rows(&result, "g1"), vec!["3CCC_1", "2BBB_1"]);
    assert_eq!(result.table.similarities[0].0, 1e-50);
    assert_eq!(result.table.similarities[1].0, 1e-10);
}

#[test]
fn candidates_without_ec_are_dropped() {
    let search = MockSearch::default().with("MKT", &[("1AAA_1", 1e-100), ("2BBB_1", 1e-3)]);
    let metadata = MockMetadata::default()
        .with("1AAA_1", &[])
        .with("2BBB_1", &["3.1.1.1"]);
    let queries = [SequenceQuery::new("g1", "MKT")];
    let (result, _) = run(search, metadata, options(2, 100), &queries);
    assert_eq!(rows(&result.unwrap(), "g1"), vec!["2BBB_1"]);
}

#[test]
fn rows_are_capped_distinct_and_ordered_per_gene() {
    let search = MockSearch::default()
        .with(
            "AAAA",
            &[("1AAA_1", 1e-40), ("2BBB_1", 1e-30), ("3CCC_1", 1e-20), ("4DDD_1", 1e-10)],
        )
        .with("CCCC", &[("4DDD_1", 1e-60), ("3CCC_1", 1e-5)]);
    let metadata = MockMetadata::default()
        .with("1AAA_1", &["1.1.1.1", "2.2.2.2"])
        .with("2BBB_1", &["2.2.2.2"])
        .with("3CCC_1", &["3.3.3.3", "1.1.1.1"])
        .with("4DDD_1", &["4.4.4.4"]);
    let queries = [
        SequenceQuery::new("g1", "AAAA"),
        SequenceQuery::new("g2", "CCCC"),
    ];
    let (result, _) = run(search, metadata, options(3, 100), &queries);
    let result = result.unwrap();

    for gene in ["g1", "g2"] {
        let indices = result.table.rows_for(gene).collect::<Vec<_>>();
        assert!(indices.len() <= 3);
        let mut seen = HashSet::new();
        let mut last = f64::NEG_INFINITY;
        for index in indices {
            let row = result.table.row(index).unwrap();
            assert!(row.evalue >= last, "rows for {gene} out of order");
            last = row.evalue;
            assert!(seen.insert(row.entity_id.clone()), "{gene} repeats {}", row.entity_id);
        }
    }
    // 2BBB_1 only carries 2.2.2.2, which 1AAA_1 already owns with a better e-value.
    assert_eq!(rows(&result, "g1"), vec!["1AAA_1", "3CCC_1", "4DDD_1"]);
    assert_eq!(rows(&result, "g2"), vec!["4DDD_1", "3CCC_1"]);
}

#[test]
fn failed_search_yields_no_rows_for_that_gene_only() {
    let search = MockSearch::default()
        .with("AAAA", &[("1AAA_1", 1e-9)])
        .failing("BBBB")
        .with("CCCC", &[("2BBB_1", 1e-9)]);
    let metadata = MockMetadata::default()
        .with("1AAA_1", &["1.1.1.1"])
        .with("2BBB_1", &["2.2.2.2"]);
    let queries = [
        SequenceQuery::new("g1", "AAAA"),
        SequenceQuery::new("g2", "BBBB"),
        SequenceQuery::new("g3", "CCCC"),
    ];
    let (result, pipeline) = run(search, metadata, options(2, 100), &queries);
    let result = result.unwrap();

    assert_eq!(*pipeline.search_client().calls.lock().unwrap(), 3);
    assert_eq!(rows(&result, "g1"), vec!["1AAA_1"]);
    assert!(rows(&result, "g2").is_empty());
    assert_eq!(rows(&result, "g3"), vec!["2BBB_1"]);
    assert_eq!(result.summary.proteins, 3);
    assert_eq!(result.summary.proteins_with_hits, 2);
}

#[test]
fn metadata_failure_aborts_with_bundle_context() {
    let search = MockSearch::default().with(
        "AAAA",
        &[("1AAA_1", 1e-9), ("2BBB_1", 1e-8), ("3CCC_1", 1e-7)],
    );
    let metadata = MockMetadata {
        fail_on: Some(2),
        ..MockMetadata::default()
    }
    .with("1AAA_1", &["1.1.1.1"])
    .with("2BBB_1", &["2.2.2.2"])
    .with("3CCC_1", &["3.3.3.3"]);
    let queries = [SequenceQuery::new("g1", "AAAA")];
    let (result, _) = run(search, metadata, options(2, 2), &queries);

    let err = result.unwrap_err();
    assert!(err.is_remote_unavailable());
    assert_matches!(
        err,
        KiraError::MetadataBundle { bundle: 2, total: 2, ref first_id, .. } if first_id == "3CCC"
    );
}

#[test]
fn malformed_bundle_aborts_before_later_bundles() {
    let search = MockSearch::default().with(
        "AAAA",
        &[("1AAA_1", 1e-9), ("2BBB_1", 1e-8), ("3CCC_1", 1e-7)],
    );
    let metadata = MockMetadata::default()
        .with("1AAA_1", &["1.1.1.1"])
        .with("2BBB_1", &["2.2.2.2"])
        .with("3CCC_1", &["3.3.3.3"])
        .strandless("2BBB_1");
    let queries = [SequenceQuery::new("g1", "AAAA")];
    let (result, pipeline) = run(search, metadata, options(2, 1), &queries);

    let err = result.unwrap_err();
    assert!(err.is_malformed_response());
    assert!(!err.is_remote_unavailable());
    assert_matches!(
        err,
        KiraError::MetadataBundle { bundle: 2, total: 3, ref first_id, .. } if first_id == "2BBB"
    );
    assert_eq!(
        pipeline.metadata_client().requests(),
        vec![vec!["1AAA".to_string()], vec!["2BBB".to_string()]]
    );
}

#[test]
fn missing_structures_are_reported_and_dropped() {
    let search = MockSearch::default().with("AAAA", &[("9ZZZ_1", 1e-50), ("1AAA_1", 1e-9)]);
    let metadata = MockMetadata::default().with("1AAA_1", &["1.1.1.1"]);
    let queries = [SequenceQuery::new("g1", "AAAA")];
    let (result, _) = run(search, metadata, options(2, 100), &queries);
    let result = result.unwrap();

    assert_eq!(rows(&result, "g1"), vec!["1AAA_1"]);
    assert_eq!(result.summary.missing_structures, vec!["9ZZZ".to_string()]);
}

#[test]
fn invalid_input_is_rejected_before_any_remote_call() {
    let (result, pipeline) = run(
        MockSearch::default(),
        MockMetadata::default(),
        options(2, 100),
        &[],
    );
    assert_matches!(result, Err(KiraError::EmptyInput));
    assert_eq!(*pipeline.search_client().calls.lock().unwrap(), 0);

    let queries = [
        SequenceQuery::new("g1", "MKTAYIAK"),
        SequenceQuery::new("g2", "MKT-AYI"),
    ];
    let (result, pipeline) = run(
        MockSearch::default(),
        MockMetadata::default(),
        options(2, 100),
        &queries,
    );
    assert_matches!(result, Err(KiraError::InvalidSequence { ref gene_id, .. }) if gene_id == "g2");
    assert_eq!(*pipeline.search_client().calls.lock().unwrap(), 0);
    assert!(pipeline.metadata_client().requests().is_empty());

    let (result, _) = run(
        MockSearch::default(),
        MockMetadata::default(),
        options(0, 100),
        &queries[..1],
    );
    assert_matches!(result, Err(KiraError::InvalidOption { .. }));
}

#[test]
fn parallel_search_preserves_input_order() {
    let mut search = MockSearch::default();
    let mut metadata = MockMetadata::default();
    let ids = ["1AAA_1", "2BBB_1", "3CCC_1", "4DDD_1", "5EEE_1", "6FFF_1", "7GGG_1"];
    let sequences = ["AAAA", "CCCC", "DDDD", "EEEE", "FFFF", "GGGG", "HHHH"];
    let ecs = ["1.1.1.1", "2.2.2.2", "3.3.3.3", "4.4.4.4", "5.5.5.5", "6.6.6.6", "7.7.7.7"];
    for ((id, sequence), ec) in ids.iter().zip(sequences).zip(ecs) {
        search = search.with(sequence, &[(*id, 1e-10)]);
        metadata = metadata.with(id, &[ec]);
    }
    let queries = sequences
        .iter()
        .enumerate()
        .map(|(index, sequence)| SequenceQuery::new(format!("g{index}"), *sequence))
        .collect::<Vec<_>>();

    let parallel = PipelineOptions {
        workers: 3,
        ..options(2, 3)
    };
    let (result, _) = run(search, metadata, parallel, &queries);
    let result = result.unwrap();

    let genes = result.table.gene_ids.clone();
    let expected = (0..ids.len()).map(|index| format!("g{index}")).collect::<Vec<_>>();
    assert_eq!(genes, expected);
    let entities = result
        .table
        .entity_ids
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(entities, ids.to_vec());
}

#[test]
fn result_serializes_column_oriented() {
    let search = MockSearch::default().with("MKT", &[("1AAA_1", 1e-9)]);
    let metadata = MockMetadata::default().with("1AAA_1", &["1.1.1.1"]);
    let queries = [SequenceQuery::new("g1", "MKT")];
    let (result, _) = run(search, metadata, options(2, 100), &queries);
    let value = serde_json::to_value(result.unwrap()).unwrap();

    let table = &value["table"];
    assert_eq!(table["id"], json!(["g1"]));
    assert_eq!(table["rcsbid"], json!(["1AAA_1"]));
    assert_eq!(table["method"], json!(["X-RAY DIFFRACTION"]));
    assert_eq!(table["strand"], json!([["A"]]));
    assert_eq!(table["similarity"], json!([[1e-9, 0.8]]));
    assert_eq!(table["taxonomy"], json!([[[562, "Escherichia coli"]]]));
    assert_eq!(table["ec"], json!([[["1.1.1.1", "RCSB"]]]));
    assert_eq!(table["references"], json!([null]));
    assert_eq!(value["summary"]["rows"], 1);
}
