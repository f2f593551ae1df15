use serde::{Deserialize, Serialize};

use crate::{error::DomainError, space::ProfileSnapshot};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Yaml,
}

pub trait ProfileExporter {
    fn export(&self, profile: &ProfileSnapshot, format: ExportFormat)
        -> Result<Vec<u8>, DomainError>;
}

pub struct SnapshotExporter;

impl ProfileExporter for SnapshotExporter {
    fn export(
        &self,
        profile: &ProfileSnapshot,
        format: ExportFormat,
    ) -> Result<Vec<u8>, DomainError> {
        match format {
            ExportFormat::Json => serde_json::to_vec_pretty(profile)
                .map_err(|err| DomainError::Serialization(err.to_string())),
            ExportFormat::Yaml => serde_yaml::to_string(profile)
                .map(String::into_bytes)
                .map_err(|err| DomainError::Serialization(err.to_string())),
        }
    }
}
