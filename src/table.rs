use serde::Serialize;

use crate::domain::EntityId;
use crate::metadata::{Citation, CombinedEc, CompoundMetadata, MetadataMap, Taxon};
use crate::search::SearchHits;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetainedHit {
    pub gene_id: String,
    pub entity_id: EntityId,
    pub method: String,
    pub strands: Vec<String>,
    pub evalue: f64,
    pub sequence_identity: f64,
    pub taxonomy: Vec<Taxon>,
    pub name: String,
    pub compounds: Vec<CompoundMetadata>,
    pub combined_ec: Vec<CombinedEc>,
    pub uniprot_ids: Vec<String>,
    pub reference: Option<Citation>,
}

impl RetainedHit {
    pub fn assemble(
        gene_id: &str,
        entity_id: &EntityId,
        hits: &SearchHits,
        metadata: &MetadataMap,
    ) -> Option<Self> {
        let hit = hits.get(entity_id)?;
        let (structure, protein) = metadata.entity(entity_id)?;
        Some(Self {
            gene_id: gene_id.to_string(),
            entity_id: entity_id.clone(),
            method: structure.methods.first().cloned().unwrap_or_default(),
            strands: protein.strands.clone(),
            evalue: hit.evalue,
            sequence_identity: hit.sequence_identity,
            taxonomy: protein.taxonomy.clone(),
            name: protein.uniprot_names.first().cloned().unwrap_or_default(),
            compounds: structure.compounds.clone(),
            combined_ec: protein.combined_ec().to_vec(),
            uniprot_ids: protein.uniprot_ids.clone(),
            reference: structure.reference.clone(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    #[serde(rename = "id")]
    pub gene_ids: Vec<String>,
    #[serde(rename = "rcsbid")]
    pub entity_ids: Vec<EntityId>,
    #[serde(rename = "method")]
    pub methods: Vec<String>,
    #[serde(rename = "strand")]
    pub strands: Vec<Vec<String>>,
    #[serde(rename = "similarity")]
    pub similarities: Vec<(f64, f64)>,
    pub taxonomy: Vec<Vec<Taxon>>,
    #[serde(rename = "name")]
    pub names: Vec<String>,
    #[serde(rename = "components")]
    pub compounds: Vec<Vec<CompoundMetadata>>,
    #[serde(rename = "ec")]
    pub combined_ec: Vec<Vec<CombinedEc>>,
    #[serde(rename = "uniprotID")]
    pub uniprot_ids: Vec<Vec<String>>,
    #[serde(rename = "references")]
    pub references: Vec<Option<Citation>>,
}

impl ResultTable {
    pub const COLUMNS: [&'static str; 11] = [
        "id",
        "rcsbid",
        "method",
        "strand",
        "similarity",
        "taxonomy",
        "name",
        "components",
        "ec",
        "uniprotID",
        "references",
    ];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: RetainedHit) {
        self.gene_ids.push(row.gene_id);
        self.entity_ids.push(row.entity_id);
        self.methods.push(row.method);
        self.strands.push(row.strands);
        self.similarities.push((row.evalue, row.sequence_identity));
        self.taxonomy.push(row.taxonomy);
        self.names.push(row.name);
        self.compounds.push(row.compounds);
        self.combined_ec.push(row.combined_ec);
        self.uniprot_ids.push(row.uniprot_ids);
        self.references.push(row.reference);
    }

    pub fn extend_gene(
        &mut self,
        gene_id: &str,
        selected: &[EntityId],
        hits: &SearchHits,
        metadata: &MetadataMap,
    ) -> usize {
        let before = self.len();
        for entity_id in selected {
            if let Some(row) = RetainedHit::assemble(gene_id, entity_id, hits, metadata) {
                self.push(row);
            }
        }
        self.len() - before
    }

    pub fn row(&self, index: usize) -> Option<RetainedHit> {
        if index >= self.len() {
            return None;
        }
        let (evalue, sequence_identity) = self.similarities[index];
        Some(RetainedHit {
            gene_id: self.gene_ids[index].clone(),
            entity_id: self.entity_ids[index].clone(),
            method: self.methods[index].clone(),
            strands: self.strands[index].clone(),
            evalue,
            sequence_identity,
            taxonomy: self.taxonomy[index].clone(),
            name: self.names[index].clone(),
            compounds: self.compounds[index].clone(),
            combined_ec: self.combined_ec[index].clone(),
            uniprot_ids: self.uniprot_ids[index].clone(),
            reference: self.references[index].clone(),
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = RetainedHit> + '_ {
        (0..self.len()).filter_map(|index| self.row(index))
    }

    pub fn len(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gene_ids.is_empty()
    }

    pub fn rows_for<'a>(&'a self, gene_id: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.gene_ids
            .iter()
            .enumerate()
            .filter(move |(_, id)| id.as_str() == gene_id)
            .map(|(index, _)| index)
    }
}
