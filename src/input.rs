use std::fs;
use std::path::Path;

use crate::domain::SequenceQuery;
use crate::error::KiraError;

pub fn read_fasta(path: &Path) -> Result<Vec<SequenceQuery>, KiraError> {
    let content = fs::read_to_string(path)
        .map_err(|err| KiraError::Filesystem(format!("read {}: {err}", path.display())))?;
    parse_fasta(&content)
}

pub fn parse_fasta(content: &str) -> Result<Vec<SequenceQuery>, KiraError> {
    let mut queries = Vec::new();
    let mut current: Option<(String, String, usize)> = None;

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('>') {
            if let Some(record) = current.take() {
                queries.push(finish_record(record)?);
            }
            let gene_id = header.split_whitespace().next().unwrap_or("").to_string();
            if gene_id.is_empty() {
                return Err(KiraError::InvalidFasta {
                    line: line_no,
                    message: "header without identifier".to_string(),
                });
            }
            current = Some((gene_id, String::new(), line_no));
            continue;
        }
        match current.as_mut() {
            Some((_, sequence, _)) => {
                sequence.extend(line.chars().filter(|ch| !ch.is_whitespace()));
            }
            None => {
                return Err(KiraError::InvalidFasta {
                    line: line_no,
                    message: "sequence data before the first header".to_string(),
                });
            }
        }
    }
    if let Some(record) = current.take() {
        queries.push(finish_record(record)?);
    }
    Ok(queries)
}

fn finish_record((gene_id, sequence, line): (String, String, usize)) -> Result<SequenceQuery, KiraError> {
    let sequence = sequence.trim_end_matches('*').to_ascii_uppercase();
    if sequence.is_empty() {
        return Err(KiraError::InvalidFasta {
            line,
            message: format!("record {gene_id} has no sequence"),
        });
    }
    Ok(SequenceQuery { gene_id, sequence })
}
