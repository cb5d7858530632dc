use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domain::{SequenceQuery, StructureId, Threshold};
use crate::error::KiraError;
use crate::lookup::CompoundLookup;
use crate::metadata::{self, DEFAULT_BUNDLE_SIZE, FetchReport, MetadataClient};
use crate::search::{self, SearchClient, SearchHits, SearchRequest};
use crate::select;
use crate::table::ResultTable;

const SEARCH_PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PipelineOptions {
    pub threshold: Threshold,
    pub result_cap: usize,
    pub bundle_size: usize,
    pub max_hits: usize,
    pub workers: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            threshold: Threshold::default(),
            result_cap: 500,
            bundle_size: DEFAULT_BUNDLE_SIZE,
            max_hits: 2,
            workers: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StructureIdCollector {
    seen: HashSet<StructureId>,
    order: Vec<StructureId>,
}

impl StructureIdCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: &StructureId) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push(id.clone());
        true
    }

    pub fn add_hits(&mut self, hits: &SearchHits) {
        for id in hits.structure_ids() {
            self.add(id);
        }
    }

    pub fn ids(&self) -> &[StructureId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub proteins: usize,
    pub proteins_with_hits: usize,
    pub distinct_structures: usize,
    pub metadata_requests: usize,
    pub missing_structures: Vec<String>,
    pub rows: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub summary: RunSummary,
    pub table: ResultTable,
}

pub struct Pipeline<S: SearchClient, M: MetadataClient> {
    search: S,
    metadata: M,
    lookup: CompoundLookup,
    options: PipelineOptions,
}

impl<S: SearchClient, M: MetadataClient> Pipeline<S, M> {
    pub fn new(search: S, metadata: M, lookup: CompoundLookup, options: PipelineOptions) -> Self {
        Self {
            search,
            metadata,
            lookup,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn search_client(&self) -> &S {
        &self.search
    }

    pub fn metadata_client(&self) -> &M {
        &self.metadata
    }

    pub fn run(
        &self,
        queries: &[SequenceQuery],
        sink: &dyn ProgressSink,
    ) -> Result<PipelineResult, KiraError> {
        self.validate(queries)?;

        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!("phase=Search; querying {} sequences", queries.len()),
            elapsed: None,
        });
        let all_hits = self.search_phase(queries);
        let proteins_with_hits = all_hits.iter().filter(|hits| !hits.is_empty()).count();

        let mut collector = StructureIdCollector::new();
        for hits in &all_hits {
            collector.add_hits(hits);
        }
        tracing::info!(
            "{} distinct PDB IDs hit across {} input features",
            collector.len(),
            queries.len()
        );
        sink.event(ProgressEvent {
            message: format!(
                "phase=Search; {proteins_with_hits} of {} sequences with hits, {} distinct structures",
                queries.len(),
                collector.len()
            ),
            elapsed: Some(start.elapsed()),
        });

        let start = Instant::now();
        sink.event(ProgressEvent {
            message: format!(
                "phase=Metadata; fetching {} structures in bundles of {}",
                collector.len(),
                self.options.bundle_size
            ),
            elapsed: None,
        });
        let FetchReport {
            metadata,
            requests,
            skipped,
        } = metadata::fetch_all(
            &self.metadata,
            collector.ids(),
            self.options.bundle_size,
            &self.lookup,
        )?;
        sink.event(ProgressEvent {
            message: format!("phase=Metadata; {requests} requests, {} structures", metadata.len()),
            elapsed: Some(start.elapsed()),
        });

        let start = Instant::now();
        let mut table = ResultTable::new();
        for (query, hits) in queries.iter().zip(&all_hits) {
            if hits.is_empty() {
                continue;
            }
            let selected = select::select_hits(hits, &metadata, self.options.max_hits);
            let added = table.extend_gene(&query.gene_id, &selected, hits, &metadata);
            tracing::debug!(gene_id = %query.gene_id, candidates = hits.len(), retained = added);
        }
        sink.event(ProgressEvent {
            message: format!("phase=Select; {} rows", table.len()),
            elapsed: Some(start.elapsed()),
        });

        Ok(PipelineResult {
            summary: RunSummary {
                proteins: queries.len(),
                proteins_with_hits,
                distinct_structures: collector.len(),
                metadata_requests: requests,
                missing_structures: skipped,
                rows: table.len(),
                generated_at: chrono::Utc::now().to_rfc3339(),
            },
            table,
        })
    }

    fn validate(&self, queries: &[SequenceQuery]) -> Result<(), KiraError> {
        if queries.is_empty() {
            return Err(KiraError::EmptyInput);
        }
        for (name, value) in [
            ("result_cap", self.options.result_cap),
            ("bundle_size", self.options.bundle_size),
            ("max_hits", self.options.max_hits),
        ] {
            if value == 0 {
                return Err(KiraError::InvalidOption {
                    name: name.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
        }
        queries.iter().try_for_each(SequenceQuery::validate)
    }

    // One search per query; the returned hits line up with `queries`
    // regardless of how many workers ran them.
    fn search_phase(&self, queries: &[SequenceQuery]) -> Vec<SearchHits> {
        let workers = self.options.workers.clamp(1, queries.len().max(1));
        if workers == 1 {
            return queries
                .iter()
                .enumerate()
                .map(|(index, query)| {
                    let hits = self.search_one(query);
                    if (index + 1) % SEARCH_PROGRESS_EVERY == 0 {
                        tracing::info!(
                            "done querying sequences for {} of {}",
                            index + 1,
                            queries.len()
                        );
                    }
                    hits
                })
                .collect();
        }

        let chunk = queries.len().div_ceil(workers);
        thread::scope(|scope| {
            let handles = queries
                .chunks(chunk)
                .map(|batch| {
                    scope.spawn(move || {
                        batch
                            .iter()
                            .map(|query| self.search_one(query))
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(hits) => hits,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn search_one(&self, query: &SequenceQuery) -> SearchHits {
        let request = SearchRequest {
            sequence: &query.sequence,
            threshold: self.options.threshold,
            result_cap: self.options.result_cap,
        };
        search::search_or_empty(&self.search, &query.gene_id, &request)
    }
}
