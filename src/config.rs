use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::csum::algo::CsumKind;
use crate::error::{Error, Result};
use crate::extent::layout::CsumLayout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Bytes per record.
    pub record_size: u32,
    /// Bytes per checksum chunk.
    pub chunk_size: u32,
    pub algorithm: CsumKind,
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            record_size: 1,
            chunk_size: 32 * 1024,
            algorithm: CsumKind::Sha256,
            log_level: "info".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.record_size == 0 {
            return Err(Error::Config("record_size must be non-zero".into()));
        }
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be non-zero".into()));
        }
        if !CsumLayout::new(self.record_size, self.chunk_size, 0).chunks_tile_records() {
            return Err(Error::Config(format!(
                "chunk_size {} and record_size {} must divide one another",
                self.chunk_size, self.record_size
            )));
        }
        Ok(())
    }
}

pub fn parse_config(s: &str) -> Result<StoreConfig> {
    let cfg: StoreConfig =
        serde_yaml::from_str(s).map_err(|e| Error::Config(format!("parsing YAML config: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<StoreConfig> {
    let content = fs::read_to_string(path.as_ref())?;
    parse_config(&content)
}
