//! Definition sources.
//!
//! A source is an ordered list of raw records plus a label describing where
//! they came from. Sources are read once at startup; the store never touches
//! the filesystem itself.

use std::path::Path;

use super::definition::RawDefinition;
use super::error::CatalogError;

/// Catalog files compiled into the binary, in load order.
const BUILTIN_DEFINITIONS: &[(&str, &str)] = &[
    (
        "generic.yaml",
        include_str!("../../collector_definitions/generic.yaml"),
    ),
    (
        "search.yaml",
        include_str!("../../collector_definitions/search.yaml"),
    ),
    (
        "audience.yaml",
        include_str!("../../collector_definitions/audience.yaml"),
    ),
    (
        "disapprovals.yaml",
        include_str!("../../collector_definitions/disapprovals.yaml"),
    ),
];

/// An ordered batch of raw definition records.
#[derive(Debug, Clone)]
pub struct DefinitionSource {
    /// Where the records came from (file path or `builtin:<file>`).
    pub origin: String,
    /// Records in file order.
    pub records: Vec<RawDefinition>,
}

impl DefinitionSource {
    /// Create a source from already parsed records.
    pub fn new(origin: impl Into<String>, records: Vec<RawDefinition>) -> Self {
        Self {
            origin: origin.into(),
            records,
        }
    }

    /// Parse a YAML document holding a sequence of definitions.
    ///
    /// An empty document yields an empty source.
    pub fn from_yaml_str(origin: impl Into<String>, content: &str) -> Result<Self, CatalogError> {
        let origin = origin.into();
        if content.trim().is_empty() {
            return Ok(Self::new(origin, Vec::new()));
        }
        let records: Vec<RawDefinition> =
            serde_yaml::from_str(content).map_err(|source| CatalogError::Parse {
                origin: origin.clone(),
                source,
            })?;
        Ok(Self::new(origin, records))
    }

    /// The bundled catalog, one source per bundled file.
    pub fn builtin() -> Result<Vec<Self>, CatalogError> {
        BUILTIN_DEFINITIONS
            .iter()
            .map(|(file, content)| Self::from_yaml_str(format!("builtin:{file}"), content))
            .collect()
    }

    /// Read user supplied definitions from a file or a directory.
    ///
    /// Directories are scanned for `.yaml` / `.yml` files, sorted by file name
    /// so the load order is stable. Each file becomes its own source.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Vec<Self>, CatalogError> {
        let path = path.as_ref();
        let io_err = |source: std::io::Error| CatalogError::Io {
            origin: path.display().to_string(),
            source,
        };

        if path.is_file() {
            return Ok(vec![Self::read_file(path)?]);
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(path).map_err(io_err)? {
            let file = entry.map_err(io_err)?.path();
            if !file.is_file() {
                continue;
            }
            let ext = file.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext == "yaml" || ext == "yml" {
                files.push(file);
            }
        }
        files.sort();

        files
            .iter()
            .map(|file| {
                tracing::debug!("Loading collector definitions from: {}", file.display());
                Self::read_file(file)
            })
            .collect()
    }

    fn read_file(path: &Path) -> Result<Self, CatalogError> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            origin: origin.clone(),
            source,
        })?;
        Self::from_yaml_str(origin, &content)
    }
}
