use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("no input sequences provided")]
    EmptyInput,

    #[error("invalid sequence for {gene_id}: {reason}")]
    InvalidSequence { gene_id: String, reason: String },

    #[error("invalid FASTA input at line {line}: {message}")]
    InvalidFasta { line: usize, message: String },

    #[error("invalid threshold mode: {0} (expected `evalue` or `identity`)")]
    InvalidThresholdMode(String),

    #[error("invalid threshold value: {0}")]
    InvalidThreshold(String),

    #[error("invalid option {name}: {message}")]
    InvalidOption { name: String, message: String },

    #[error("invalid PDB id: {0}")]
    InvalidProteinId(String),

    #[error("invalid PDB entity id: {0}")]
    InvalidEntityId(String),

    #[error("config file not found: {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read InChIKey lookup table at {path}: {message}")]
    LookupRead { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("RCSB search request failed: {0}")]
    SearchHttp(String),

    #[error("RCSB search returned status {status}: {message}")]
    SearchStatus { status: u16, message: String },

    #[error("RCSB search response could not be decoded: {0}")]
    SearchResponse(String),

    #[error("RCSB metadata service unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("RCSB metadata service returned status {status}: {message}")]
    MetadataStatus { status: u16, message: String },

    #[error("malformed RCSB metadata: {0}")]
    MalformedMetadata(String),

    #[error("metadata phase failed on bundle {bundle} of {total} (starting at {first_id})")]
    MetadataBundle {
        bundle: usize,
        total: usize,
        first_id: String,
        #[source]
        source: Box<KiraError>,
    },
}

impl KiraError {
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            KiraError::EmptyInput
                | KiraError::InvalidSequence { .. }
                | KiraError::InvalidFasta { .. }
                | KiraError::InvalidThresholdMode(_)
                | KiraError::InvalidThreshold(_)
                | KiraError::InvalidOption { .. }
                | KiraError::InvalidProteinId(_)
                | KiraError::InvalidEntityId(_)
                | KiraError::MissingConfig(_)
                | KiraError::ConfigRead(_)
                | KiraError::ConfigParse(_)
                | KiraError::LookupRead { .. }
        )
    }

    pub fn is_remote_unavailable(&self) -> bool {
        match self {
            KiraError::SearchHttp(_)
            | KiraError::SearchStatus { .. }
            | KiraError::MetadataUnavailable(_)
            | KiraError::MetadataStatus { .. } => true,
            KiraError::MetadataBundle { source, .. } => source.is_remote_unavailable(),
            _ => false,
        }
    }

    pub fn is_malformed_response(&self) -> bool {
        match self {
            KiraError::SearchResponse(_) | KiraError::MalformedMetadata(_) => true,
            KiraError::MetadataBundle { source, .. } => source.is_malformed_response(),
            _ => false,
        }
    }
}
