use serde_json::Value;

use crate::domain::{EntityId, StructureId, ec_field_count};
use crate::error::KiraError;
use crate::lookup::CompoundLookup;
use crate::metadata::{
    Citation, CombinedEc, CompoundMetadata, EcSource, ProteinEntityMetadata, ReferenceSequence,
    StructureMetadata, Taxon, UniprotEc,
};

const PDB_REFERENCE_PROVENANCE: &str = "PDB Reference Data";

pub fn parse_entry(raw: &Value, lookup: &CompoundLookup) -> Result<StructureMetadata, KiraError> {
    let structure_id: StructureId = raw
        .get("rcsb_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| KiraError::MalformedMetadata("entry without rcsb_id".to_string()))?
        .parse::<StructureId>()
        .map_err(|err: KiraError| KiraError::MalformedMetadata(err.to_string()))?;

    let mut metadata = StructureMetadata::new(structure_id);
    metadata.reference = raw.get("rcsb_primary_citation").and_then(parse_citation);

    if let Some(exptl) = raw.get("exptl").and_then(|v| v.as_array()) {
        for exp in exptl {
            if let Some(method) = exp.get("method").and_then(|v| v.as_str()) {
                if !method.is_empty() {
                    metadata.methods.push(method.to_string());
                }
            }
        }
    }

    if let Some(entities) = raw.get("polymer_entities").and_then(|v| v.as_array()) {
        for entity in entities {
            let (entity_id, protein) = parse_polymer_entity(entity, &metadata.structure_id)?;
            metadata.proteins.insert(entity_id, protein);
        }
    }

    if let Some(entities) = raw.get("nonpolymer_entities").and_then(|v| v.as_array()) {
        for entity in entities {
            let Some(comp) = entity.get("nonpolymer_comp").filter(|v| !v.is_null()) else {
                continue;
            };
            if let Some(compound) = parse_compound(comp, lookup) {
                metadata.compounds.push(compound);
            }
        }
    }

    Ok(metadata)
}

fn parse_citation(raw: &Value) -> Option<Citation> {
    if raw.is_null() {
        return None;
    }
    let text = |key: &str| raw.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let year = match raw.get("year") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => "NA".to_string(),
    };
    Some(Citation {
        pubmed_id: raw.get("pdbx_database_id_PubMed").and_then(|v| v.as_u64()),
        title: text("title").unwrap_or_default(),
        journal: text("journal_abbrev").unwrap_or_else(|| "NA".to_string()),
        first_author: raw
            .get("rcsb_authors")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        year,
    })
}

fn parse_polymer_entity(
    raw: &Value,
    structure_id: &StructureId,
) -> Result<(EntityId, ProteinEntityMetadata), KiraError> {
    let entity_id: EntityId = raw
        .get("rcsb_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            KiraError::MalformedMetadata(format!("polymer entity of {structure_id} without rcsb_id"))
        })?
        .parse::<EntityId>()
        .map_err(|err: KiraError| KiraError::MalformedMetadata(err.to_string()))?;

    let strands = raw
        .get("entity_poly")
        .and_then(|v| v.get("pdbx_strand_id"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            KiraError::MalformedMetadata(format!("{entity_id} has no entity_poly.pdbx_strand_id"))
        })?
        .split(',')
        .map(|chain| chain.trim().to_string())
        .collect::<Vec<_>>();

    let mut taxonomy = Vec::new();
    if let Some(organisms) = raw
        .get("rcsb_entity_source_organism")
        .and_then(|v| v.as_array())
    {
        for org in organisms {
            taxonomy.push(Taxon {
                taxon_id: org.get("ncbi_taxonomy_id").and_then(|v| v.as_u64()),
                scientific_name: org
                    .get("ncbi_scientific_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
            });
        }
    }

    let mut uniprot_ids = Vec::new();
    let mut reference_sequences = Vec::new();
    if let Some(refs) = raw
        .get("rcsb_polymer_entity_container_identifiers")
        .and_then(|v| v.get("reference_sequence_identifiers"))
        .and_then(|v| v.as_array())
    {
        for rsid in refs {
            let accession = rsid
                .get("database_accession")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            let database = rsid
                .get("database_name")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            uniprot_ids.push(accession.clone());
            reference_sequences.push(ReferenceSequence { accession, database });
        }
    }

    let mut structure_ec_numbers: Vec<String> = Vec::new();
    if let Some(lineage) = raw
        .get("rcsb_polymer_entity")
        .and_then(|v| v.get("rcsb_ec_lineage"))
        .and_then(|v| v.as_array())
    {
        for item in lineage {
            if let Some(id) = item.get("id").and_then(|v| v.as_str()) {
                if !id.is_empty() && !structure_ec_numbers.iter().any(|ec| ec == id) {
                    structure_ec_numbers.push(id.to_string());
                }
            }
        }
    }

    let mut uniprot_names = Vec::new();
    let mut uniprot_ec_entries = Vec::new();
    if let Some(uniprots) = raw.get("uniprots").and_then(|v| v.as_array()) {
        for unp in uniprots {
            let Some(protein) = unp.get("rcsb_uniprot_protein").filter(|v| !v.is_null()) else {
                continue;
            };
            if let Some(name) = protein.get("name").filter(|v| !v.is_null()) {
                uniprot_names.push(
                    name.get("value")
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string(),
                );
            }
            if let Some(ecs) = protein.get("ec").and_then(|v| v.as_array()) {
                for ec in ecs {
                    uniprot_ec_entries.push(UniprotEc {
                        number: ec
                            .get("number")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                        provenance_code: ec
                            .get("provenance_code")
                            .and_then(|v| v.as_str())
                            .map(str::to_string),
                    });
                }
            }
        }
    }

    let mut protein = ProteinEntityMetadata::new(structure_ec_numbers, uniprot_ec_entries);
    protein.strands = strands;
    protein.taxonomy = taxonomy;
    protein.uniprot_ids = uniprot_ids;
    protein.reference_sequences = reference_sequences;
    protein.uniprot_names = uniprot_names;

    Ok((entity_id, protein))
}

// Merges structure-lineage and UniProt EC assignments into one list with each
// EC number at most once.
// Only four-field lineage codes are taken from the structure source; shorter
// lineage levels are never recorded, even when no four-field code exists.
pub fn combine_ec(structure_ec_numbers: &[String], uniprot_ec: &[UniprotEc]) -> Vec<CombinedEc> {
    let mut combined: Vec<CombinedEc> = Vec::new();

    for ec in structure_ec_numbers {
        if ec_field_count(ec) == 4 && !combined.iter().any(|item| &item.ec_number == ec) {
            combined.push(CombinedEc {
                ec_number: ec.clone(),
                source: EcSource::Rcsb,
            });
        }
    }

    for entry in uniprot_ec {
        if entry.number.is_empty() {
            continue;
        }
        match combined
            .iter_mut()
            .find(|item| item.ec_number == entry.number)
        {
            Some(item) => {
                if item.source == EcSource::Rcsb {
                    item.source = EcSource::RcsbAndUniprot;
                }
            }
            None => combined.push(CombinedEc {
                ec_number: entry.number.clone(),
                source: EcSource::Uniprot,
            }),
        }
    }

    combined
}

fn parse_compound(comp: &Value, lookup: &CompoundLookup) -> Option<CompoundMetadata> {
    let reference_name = comp
        .get("rcsb_chem_comp_synonyms")
        .and_then(|v| v.as_array())
        .and_then(|synonyms| {
            synonyms.iter().find(|syn| {
                syn.get("provenance_source").and_then(|v| v.as_str())
                    == Some(PDB_REFERENCE_PROVENANCE)
            })
        })
        .and_then(|syn| syn.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let descriptor = comp.get("rcsb_chem_comp_descriptor");
    let field = |key: &str| {
        descriptor
            .and_then(|d| d.get(key))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let inchi = field("InChI");
    let inchikey = field("InChIKey");
    let smiles = field("SMILES");
    let mapped_internal_id = inchikey
        .as_deref()
        .and_then(|key| lookup.resolve(key))
        .map(str::to_string);

    if inchi.is_none() && inchikey.is_none() && smiles.is_none() && mapped_internal_id.is_none() {
        return None;
    }

    Some(CompoundMetadata {
        reference_name,
        inchi,
        inchikey,
        smiles,
        mapped_internal_id,
    })
}
