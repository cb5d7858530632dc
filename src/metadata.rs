use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::{EntityId, StructureId};
use crate::entry;
use crate::error::KiraError;
use crate::http;
use crate::lookup::CompoundLookup;

pub const DEFAULT_GRAPHQL_URL: &str = "https://data.rcsb.org/graphql";
pub const DEFAULT_BUNDLE_SIZE: usize = 100;

const ENTRY_FIELDS: &str = r#"
    rcsb_id
    exptl { method }
    rcsb_primary_citation {
      title
      rcsb_authors
      journal_abbrev
      year
      pdbx_database_id_PubMed
    }
    polymer_entities {
      rcsb_id
      entity_poly { pdbx_seq_one_letter_code pdbx_strand_id }
      rcsb_entity_source_organism { ncbi_taxonomy_id ncbi_scientific_name }
      rcsb_polymer_entity_container_identifiers {
        reference_sequence_identifiers { database_accession database_name }
      }
      rcsb_polymer_entity { rcsb_ec_lineage { id } }
      uniprots {
        rcsb_uniprot_protein {
          name { value }
          ec { number provenance_code }
        }
      }
    }
    nonpolymer_entities {
      nonpolymer_comp {
        rcsb_chem_comp_synonyms { name provenance_source }
        rcsb_chem_comp_descriptor { InChI InChIKey SMILES }
      }
    }
"#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub pubmed_id: Option<u64>,
    pub title: String,
    pub journal: String,
    pub first_author: String,
    pub year: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxon {
    pub taxon_id: Option<u64>,
    pub scientific_name: String,
}

impl Serialize for Taxon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.taxon_id, &self.scientific_name).serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceSequence {
    pub accession: String,
    pub database: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniprotEc {
    pub number: String,
    pub provenance_code: Option<String>,
}

impl UniprotEc {
    pub fn new(number: impl Into<String>, provenance_code: Option<&str>) -> Self {
        Self {
            number: number.into(),
            provenance_code: provenance_code.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcSource {
    Rcsb,
    Uniprot,
    RcsbAndUniprot,
}

impl EcSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EcSource::Rcsb => "RCSB",
            EcSource::Uniprot => "UniProt",
            EcSource::RcsbAndUniprot => "RCSB;UniProt",
        }
    }
}

impl fmt::Display for EcSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EcSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedEc {
    pub ec_number: String,
    pub source: EcSource,
}

impl Serialize for CombinedEc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.ec_number, self.source).serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProteinEntityMetadata {
    pub strands: Vec<String>,
    pub taxonomy: Vec<Taxon>,
    pub uniprot_ids: Vec<String>,
    pub reference_sequences: Vec<ReferenceSequence>,
    pub structure_ec_numbers: Vec<String>,
    pub uniprot_names: Vec<String>,
    pub uniprot_ec_entries: Vec<UniprotEc>,
    combined_ec: Vec<CombinedEc>,
}

impl ProteinEntityMetadata {
    pub fn new(structure_ec_numbers: Vec<String>, uniprot_ec_entries: Vec<UniprotEc>) -> Self {
        let combined_ec = entry::combine_ec(&structure_ec_numbers, &uniprot_ec_entries);
        Self {
            structure_ec_numbers,
            uniprot_ec_entries,
            combined_ec,
            ..Self::default()
        }
    }

    pub fn combined_ec(&self) -> &[CombinedEc] {
        &self.combined_ec
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CompoundMetadata {
    pub reference_name: String,
    pub inchi: Option<String>,
    pub inchikey: Option<String>,
    pub smiles: Option<String>,
    pub mapped_internal_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureMetadata {
    pub structure_id: StructureId,
    pub reference: Option<Citation>,
    pub methods: Vec<String>,
    pub compounds: Vec<CompoundMetadata>,
    pub proteins: BTreeMap<EntityId, ProteinEntityMetadata>,
}

impl StructureMetadata {
    pub fn new(structure_id: StructureId) -> Self {
        Self {
            structure_id,
            reference: None,
            methods: Vec::new(),
            compounds: Vec::new(),
            proteins: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MetadataMap {
    entries: HashMap<StructureId, StructureMetadata>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metadata: StructureMetadata) {
        self.entries.insert(metadata.structure_id.clone(), metadata);
    }

    pub fn get(&self, id: &StructureId) -> Option<&StructureMetadata> {
        self.entries.get(id)
    }

    pub fn entity(
        &self,
        entity_id: &EntityId,
    ) -> Option<(&StructureMetadata, &ProteinEntityMetadata)> {
        let structure = self.entries.get(entity_id.structure_id())?;
        let protein = structure.proteins.get(entity_id)?;
        Some((structure, protein))
    }

    pub fn contains(&self, id: &StructureId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<StructureMetadata> for MetadataMap {
    fn from_iter<T: IntoIterator<Item = StructureMetadata>>(iter: T) -> Self {
        let mut map = MetadataMap::new();
        for metadata in iter {
            map.insert(metadata);
        }
        map
    }
}

pub trait MetadataClient: Send + Sync {
    fn fetch_entries(&self, ids: &[StructureId]) -> Result<Value, KiraError>;
}

#[derive(Clone)]
pub struct RcsbGraphqlHttpClient {
    client: Client,
    endpoint: String,
}

impl RcsbGraphqlHttpClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, KiraError> {
        let client = http::build_client(timeout, KiraError::MetadataUnavailable)?;
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
            .unwrap_or_else(|_| "RCSB GraphQL request failed".to_string());
        Err(KiraError::MetadataStatus { status, message })
    }
}

impl MetadataClient for RcsbGraphqlHttpClient {
    fn fetch_entries(&self, ids: &[StructureId]) -> Result<Value, KiraError> {
        let body = json!({ "query": build_metadata_query(ids) });
        let response = http::send_with_retries(
            || self.client.post(&self.endpoint).json(&body),
            KiraError::MetadataUnavailable,
        )?;
        let response = Self::handle_status(response)?;
        let text = response
            .text()
            .map_err(|err| KiraError::MetadataUnavailable(err.to_string()))?;
        serde_json::from_str(&text).map_err(|err| KiraError::MalformedMetadata(err.to_string()))
    }
}

pub fn build_metadata_query(ids: &[StructureId]) -> String {
    let quoted = ids
        .iter()
        .map(|id| format!("\"{}\"", id.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{\n  entries(entry_ids: [{quoted}]) {{{ENTRY_FIELDS}  }}\n}}")
}

#[derive(Debug, Clone)]
pub struct FetchReport {
    pub metadata: MetadataMap,
    pub requests: usize,
    pub skipped: Vec<String>,
}

// Fetches and parses metadata for `ids` in ordered bundles of at most
// `bundle_size`. The first failing bundle aborts the whole fetch.
pub fn fetch_all<M: MetadataClient + ?Sized>(
    client: &M,
    ids: &[StructureId],
    bundle_size: usize,
    lookup: &CompoundLookup,
) -> Result<FetchReport, KiraError> {
    if bundle_size == 0 {
        return Err(KiraError::InvalidOption {
            name: "bundle_size".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    let total = ids.len().div_ceil(bundle_size);
    let mut metadata = MetadataMap::new();
    let mut skipped = Vec::new();
    let mut done = 0usize;

    for (index, bundle) in ids.chunks(bundle_size).enumerate() {
        let wrap = |source: KiraError| KiraError::MetadataBundle {
            bundle: index + 1,
            total,
            first_id: bundle
                .first()
                .map(|id| id.as_str().to_string())
                .unwrap_or_default(),
            source: Box::new(source),
        };

        let raw = client.fetch_entries(bundle).map_err(wrap)?;
        let parsed = parse_bundle_response(&raw, lookup).map_err(wrap)?;
        let returned = parsed
            .iter()
            .map(|structure| structure.structure_id.clone())
            .collect::<HashSet<_>>();
        for id in bundle.iter().filter(|id| !returned.contains(*id)) {
            tracing::warn!(structure = %id, "RCSB returned no entry; hits on it will be dropped");
            skipped.push(id.as_str().to_string());
        }
        for structure in parsed {
            metadata.insert(structure);
        }

        done += bundle.len();
        tracing::info!(
            bundle = index + 1,
            total,
            "done querying metadata for {done} of {} structures",
            ids.len()
        );
    }

    Ok(FetchReport {
        metadata,
        requests: total,
        skipped,
    })
}

fn parse_bundle_response(
    raw: &Value,
    lookup: &CompoundLookup,
) -> Result<Vec<StructureMetadata>, KiraError> {
    if let Some(errors) = raw.get("errors").and_then(|v| v.as_array()) {
        if let Some(first) = errors.first() {
            let message = first
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown GraphQL error");
            return Err(KiraError::MetadataUnavailable(message.to_string()));
        }
    }

    let entries = raw
        .get("data")
        .and_then(|v| v.get("entries"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            KiraError::MalformedMetadata("data.entries is missing or not a list".to_string())
        })?;

    // Unknown ids come back as null; callers reconcile against the request.
    entries
        .iter()
        .filter(|value| !value.is_null())
        .map(|value| entry::parse_entry(value, lookup))
        .collect()
}
