use std::fs;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::error::KiraError;
use crate::pipeline::{PipelineResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_result(result: &PipelineResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_config(config: &ResolvedConfig) -> io::Result<()> {
        Self::print_json(config)
    }

    pub fn write_result(result: &PipelineResult, path: &Path) -> Result<(), KiraError> {
        let json = serde_json::to_vec_pretty(result)
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| KiraError::Filesystem(err.to_string()))?;
        }
        fs::write(path, json)
            .map_err(|err| KiraError::Filesystem(format!("write {}: {err}", path.display())))
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
