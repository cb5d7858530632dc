use std::collections::HashMap;

use crate::domain::EntityId;
use crate::metadata::MetadataMap;
use crate::search::SearchHits;

#[derive(Debug, Clone, PartialEq)]
pub struct EcOwner<'a> {
    pub ec_number: &'a str,
    pub entity_id: &'a EntityId,
    pub evalue: f64,
}

// Builds the EC pool for one gene: every EC reachable from a candidate that
// resolves in `metadata`, owned by the candidate with the lowest e-value.
// Candidates are visited in ranked order and ties keep the first owner.
// The result is sorted by e-value, ascending; equal e-values keep pool order.
pub fn rank_ec_owners<'a>(hits: &'a SearchHits, metadata: &'a MetadataMap) -> Vec<EcOwner<'a>> {
    let mut owners: Vec<EcOwner<'a>> = Vec::new();
    let mut index: HashMap<&'a str, usize> = HashMap::new();

    for hit in hits.iter() {
        let Some((_, protein)) = metadata.entity(&hit.entity_id) else {
            continue;
        };
        for ec in protein.combined_ec() {
            match index.get(ec.ec_number.as_str()) {
                Some(&pos) => {
                    if owners[pos].evalue > hit.evalue {
                        owners[pos].entity_id = &hit.entity_id;
                        owners[pos].evalue = hit.evalue;
                    }
                }
                None => {
                    index.insert(ec.ec_number.as_str(), owners.len());
                    owners.push(EcOwner {
                        ec_number: ec.ec_number.as_str(),
                        entity_id: &hit.entity_id,
                        evalue: hit.evalue,
                    });
                }
            }
        }
    }

    owners.sort_by(|a, b| a.evalue.total_cmp(&b.evalue));
    owners
}

pub fn select_hits(hits: &SearchHits, metadata: &MetadataMap, max_hits: usize) -> Vec<EntityId> {
    let mut retained: Vec<EntityId> = Vec::new();
    if max_hits == 0 {
        return retained;
    }
    for owner in rank_ec_owners(hits, metadata) {
        if retained.iter().any(|id| id == owner.entity_id) {
            continue;
        }
        retained.push(owner.entity_id.clone());
        if retained.len() >= max_hits {
            break;
        }
    }
    retained
}
