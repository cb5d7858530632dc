use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{EntityId, StructureId, Threshold};
use crate::error::KiraError;
use crate::http;

pub const DEFAULT_SEARCH_URL: &str = "https://search.rcsb.org/rcsbsearch/v2/query";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureHit {
    pub entity_id: EntityId,
    pub evalue: f64,
    pub sequence_identity: f64,
    pub bitscore: Option<f64>,
    pub alignment_length: Option<u64>,
    pub mismatches: Option<u64>,
    pub gaps_opened: Option<u64>,
    pub query_beg: Option<u64>,
    pub query_end: Option<u64>,
    pub subject_beg: Option<u64>,
    pub subject_end: Option<u64>,
    pub query_length: Option<u64>,
    pub subject_length: Option<u64>,
    pub query_aligned_seq: Option<String>,
    pub subject_aligned_seq: Option<String>,
}

impl StructureHit {
    pub fn new(entity_id: EntityId, evalue: f64, sequence_identity: f64) -> Self {
        Self {
            entity_id,
            evalue,
            sequence_identity,
            bitscore: None,
            alignment_length: None,
            mismatches: None,
            gaps_opened: None,
            query_beg: None,
            query_end: None,
            subject_beg: None,
            subject_end: None,
            query_length: None,
            subject_length: None,
            query_aligned_seq: None,
            subject_aligned_seq: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MatchContext {
    evalue: f64,
    sequence_identity: f64,
    bitscore: Option<f64>,
    alignment_length: Option<u64>,
    mismatches: Option<u64>,
    gaps_opened: Option<u64>,
    query_beg: Option<u64>,
    query_end: Option<u64>,
    subject_beg: Option<u64>,
    subject_end: Option<u64>,
    query_length: Option<u64>,
    subject_length: Option<u64>,
    query_aligned_seq: Option<String>,
    subject_aligned_seq: Option<String>,
}

impl MatchContext {
    fn into_hit(self, entity_id: EntityId) -> StructureHit {
        StructureHit {
            entity_id,
            evalue: self.evalue,
            sequence_identity: self.sequence_identity,
            bitscore: self.bitscore,
            alignment_length: self.alignment_length,
            mismatches: self.mismatches,
            gaps_opened: self.gaps_opened,
            query_beg: self.query_beg,
            query_end: self.query_end,
            subject_beg: self.subject_beg,
            subject_end: self.subject_end,
            query_length: self.query_length,
            subject_length: self.subject_length,
            query_aligned_seq: self.query_aligned_seq,
            subject_aligned_seq: self.subject_aligned_seq,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchHits {
    hits: Vec<StructureHit>,
    index: HashMap<EntityId, usize>,
}

impl SearchHits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, hit: StructureHit) {
        match self.index.get(&hit.entity_id) {
            Some(&pos) => self.hits[pos] = hit,
            None => {
                self.index.insert(hit.entity_id.clone(), self.hits.len());
                self.hits.push(hit);
            }
        }
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<&StructureHit> {
        self.index.get(entity_id).map(|&pos| &self.hits[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &StructureHit> {
        self.hits.iter()
    }

    pub fn structure_ids(&self) -> impl Iterator<Item = &StructureId> {
        self.hits.iter().map(|hit| hit.entity_id.structure_id())
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl FromIterator<StructureHit> for SearchHits {
    fn from_iter<T: IntoIterator<Item = StructureHit>>(iter: T) -> Self {
        let mut hits = SearchHits::new();
        for hit in iter {
            hits.insert(hit);
        }
        hits
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub sequence: &'a str,
    pub threshold: Threshold,
    pub result_cap: usize,
}

pub trait SearchClient: Send + Sync {
    fn search(&self, request: &SearchRequest<'_>) -> Result<SearchHits, KiraError>;
}

#[derive(Clone)]
pub struct RcsbSearchHttpClient {
    client: Client,
    endpoint: String,
}

impl RcsbSearchHttpClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, KiraError> {
        let client = http::build_client(timeout, KiraError::SearchHttp)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, KiraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "RCSB search request failed".to_string());
        Err(KiraError::SearchStatus { status, message })
    }
}

impl SearchClient for RcsbSearchHttpClient {
    fn search(&self, request: &SearchRequest<'_>) -> Result<SearchHits, KiraError> {
        let body = build_search_query(request);
        let response = http::send_with_retries(
            || self.client.post(&self.endpoint).json(&body),
            KiraError::SearchHttp,
        )?;
        let response = Self::handle_status(response)?;
        // 204 No Content: nothing above the cutoff.
        if response.status().as_u16() == 204 {
            return Ok(SearchHits::new());
        }
        let text = response
            .text()
            .map_err(|err| KiraError::SearchHttp(err.to_string()))?;
        if text.trim().is_empty() {
            return Ok(SearchHits::new());
        }
        let raw: Value =
            serde_json::from_str(&text).map_err(|err| KiraError::SearchResponse(err.to_string()))?;
        Ok(parse_search_response(&raw))
    }
}

pub fn build_search_query(request: &SearchRequest<'_>) -> Value {
    let mut parameters = json!({
        "sequence_type": "protein",
        "value": request.sequence,
    });
    parameters[request.threshold.mode().cutoff_parameter()] = json!(request.threshold.value());

    json!({
        "query": {
            "type": "terminal",
            "service": "sequence",
            "parameters": parameters,
        },
        "return_type": "polymer_entity",
        "request_options": {
            "results_verbosity": "verbose",
            "paginate": {
                "start": 0,
                "rows": request.result_cap,
            },
            "results_content_type": ["experimental"],
            "sort": [{ "sort_by": "score", "direction": "desc" }],
            "scoring_strategy": "combined",
        },
    })
}

// Takes the first match context of the first node of the first service for
// every result item; items missing any of those are skipped.
pub fn parse_search_response(raw: &Value) -> SearchHits {
    let mut hits = SearchHits::new();
    let Some(items) = raw.get("result_set").and_then(|v| v.as_array()) else {
        return hits;
    };
    for item in items {
        let Some(identifier) = item.get("identifier").and_then(|v| v.as_str()) else {
            continue;
        };
        let Some(context) = item
            .get("services")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|service| service.get("nodes"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|node| node.get("match_context"))
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
        else {
            continue;
        };
        let entity_id = match identifier.parse::<EntityId>() {
            Ok(id) => id,
            Err(err) => {
                tracing::debug!(%identifier, error = %err, "skipping search result");
                continue;
            }
        };
        match MatchContext::deserialize(context) {
            Ok(context) => hits.insert(context.into_hit(entity_id)),
            Err(err) => {
                tracing::debug!(%identifier, error = %err, "skipping search result without statistics");
            }
        }
    }
    hits
}

pub fn search_or_empty<S: SearchClient + ?Sized>(
    client: &S,
    gene_id: &str,
    request: &SearchRequest<'_>,
) -> SearchHits {
    match client.search(request) {
        Ok(hits) => hits,
        Err(err) => {
            tracing::warn!(gene_id, error = %err, "RCSB sequence search failed; continuing with no hits");
            SearchHits::new()
        }
    }
}
