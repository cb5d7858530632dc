use std::fs;
use std::path::Path;

use crate::error::KiraError;

#[derive(Debug, Clone, Default)]
pub struct CompoundLookup {
    entries: Vec<(String, String)>,
}

impl CompoundLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn from_tsv(path: &Path) -> Result<Self, KiraError> {
        let content = fs::read_to_string(path).map_err(|err| KiraError::LookupRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse_tsv(&content).map_err(|message| KiraError::LookupRead {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse_tsv(content: &str) -> Result<Self, String> {
        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let key = fields.next().unwrap_or("").trim();
            let value = fields.next().map(str::trim).unwrap_or("");
            if entries.is_empty() && key.eq_ignore_ascii_case("inchikey") {
                continue;
            }
            if key.is_empty() || value.is_empty() {
                return Err(format!("line {}: expected `inchikey<TAB>compound_id`", index + 1));
            }
            entries.push((key.to_string(), value.to_string()));
        }
        Ok(Self { entries })
    }

    // Strips the last two characters of the InChIKey and returns the id of
    // the first key containing that prefix.
    pub fn resolve(&self, inchikey: &str) -> Option<&str> {
        if inchikey.is_empty() || self.entries.is_empty() {
            return None;
        }
        let prefix = inchikey_prefix(inchikey);
        self.entries
            .iter()
            .find(|(key, _)| key.contains(prefix))
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn inchikey_prefix(inchikey: &str) -> &str {
    match inchikey.char_indices().rev().nth(1) {
        Some((idx, _)) if inchikey.chars().count() > 2 => &inchikey[..idx],
        _ => inchikey,
    }
}
