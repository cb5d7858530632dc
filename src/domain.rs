use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

static STRUCTURE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9][A-Z0-9]{3}|PDB_[0-9A-Z]{8})$").unwrap());

static ENTITY_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[0-9][A-Z0-9]{3}|PDB_[0-9A-Z]{8}))_([0-9]+)$").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdMode {
    Evalue,
    Identity,
}

impl ThresholdMode {
    pub fn cutoff_parameter(&self) -> &'static str {
        match self {
            ThresholdMode::Evalue => "evalue_cutoff",
            ThresholdMode::Identity => "identity_cutoff",
        }
    }
}

impl fmt::Display for ThresholdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdMode::Evalue => write!(f, "evalue"),
            ThresholdMode::Identity => write!(f, "identity"),
        }
    }
}

impl FromStr for ThresholdMode {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "evalue" => Ok(ThresholdMode::Evalue),
            "identity" => Ok(ThresholdMode::Identity),
            _ => Err(KiraError::InvalidThresholdMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Threshold {
    mode: ThresholdMode,
    value: f64,
}

impl Threshold {
    pub fn new(mode: ThresholdMode, value: f64) -> Result<Self, KiraError> {
        if !value.is_finite() || value < 0.0 {
            return Err(KiraError::InvalidThreshold(format!(
                "{value} (must be a finite, non-negative number)"
            )));
        }
        if mode == ThresholdMode::Identity && value > 1.0 {
            return Err(KiraError::InvalidThreshold(format!(
                "{value} (identity cutoff is a fraction between 0 and 1)"
            )));
        }
        Ok(Self { mode, value })
    }

    pub fn mode(&self) -> ThresholdMode {
        self.mode
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self {
            mode: ThresholdMode::Evalue,
            value: 0.00001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureId(String);

impl StructureId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StructureId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if !STRUCTURE_ID_RE.is_match(&normalized) {
            return Err(KiraError::InvalidProteinId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId {
    id: String,
    structure: StructureId,
}

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn structure_id(&self) -> &StructureId {
        &self.structure
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl FromStr for EntityId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        let structure = ENTITY_ID_RE
            .captures(&normalized)
            .and_then(|caps| caps.get(1))
            .map(|m| StructureId(m.as_str().to_string()))
            .ok_or_else(|| KiraError::InvalidEntityId(value.to_string()))?;
        Ok(Self {
            id: normalized,
            structure,
        })
    }
}

impl TryFrom<String> for EntityId {
    type Error = KiraError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(value: EntityId) -> Self {
        value.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceQuery {
    pub gene_id: String,
    pub sequence: String,
}

impl SequenceQuery {
    pub fn new(gene_id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            gene_id: gene_id.into(),
            sequence: sequence.into(),
        }
    }

    pub fn validate(&self) -> Result<(), KiraError> {
        if self.gene_id.trim().is_empty() {
            return Err(KiraError::InvalidSequence {
                gene_id: "<unnamed>".to_string(),
                reason: "gene id is empty".to_string(),
            });
        }
        if self.sequence.trim().is_empty() {
            return Err(KiraError::InvalidSequence {
                gene_id: self.gene_id.clone(),
                reason: "sequence is empty".to_string(),
            });
        }
        if let Some(ch) = self
            .sequence
            .chars()
            .find(|ch| !ch.is_ascii_alphabetic())
        {
            return Err(KiraError::InvalidSequence {
                gene_id: self.gene_id.clone(),
                reason: format!("unexpected character {ch:?}"),
            });
        }
        Ok(())
    }
}

// Number of dot-separated fields in an EC code; `1.1.1.-` counts as four.
pub fn ec_field_count(ec: &str) -> usize {
    ec.split('.').count()
}
