use crate::error::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration, loadable from TOML.
///
/// ```toml
/// [build]
/// record_fields = true
/// parallel = false
///
/// [analysis]
/// impact_depth = 3
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub build: BuildOptions,
    pub analysis: AnalysisDefaults,
}

/// What the graph builder emits and how it schedules work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Emit `recordField` nodes and `accessesField` edges for read fields
    pub record_fields: bool,

    /// Scan method bodies for references to their unit's fields
    pub field_usage: bool,

    /// Plan units on the rayon pool before applying them to the graph
    pub parallel: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            record_fields: true,
            field_usage: true,
            parallel: true,
        }
    }
}

/// Depths and limits used when a caller does not pass explicit values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisDefaults {
    pub impact_depth: usize,
    pub context_depth: usize,
    pub hotspot_limit: usize,
    pub coupling_limit: usize,
    /// Upper bound on path length for `find_paths` and `trace_call_path`
    pub max_path_depth: usize,
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        Self {
            impact_depth: 2,
            context_depth: 1,
            hotspot_limit: 10,
            coupling_limit: 10,
            max_path_depth: 6,
        }
    }
}

impl EngineConfig {
    /// Wider analysis windows for large unit batches.
    pub fn for_large_batches() -> Self {
        Self {
            analysis: AnalysisDefaults {
                impact_depth: 3,
                hotspot_limit: 25,
                coupling_limit: 25,
                max_path_depth: 8,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Structure only: no field-level nodes, no field-usage scan, single thread.
    pub fn minimal() -> Self {
        Self {
            build: BuildOptions {
                record_fields: false,
                field_usage: false,
                parallel: false,
            },
            ..Default::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        log::debug!("loading engine config from {}", path.display());
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if analysis.max_path_depth == 0 {
            return Err(GraphError::invalid_config("max_path_depth must be > 0"));
        }
        if analysis.hotspot_limit == 0 {
            return Err(GraphError::invalid_config("hotspot_limit must be > 0"));
        }
        if analysis.coupling_limit == 0 {
            return Err(GraphError::invalid_config("coupling_limit must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn presets_are_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert!(EngineConfig::for_large_batches().validate().is_ok());
        assert!(EngineConfig::minimal().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            "[build]\nparallel = false\n\n[analysis]\nimpact_depth = 4\n",
        )
        .expect("valid config");

        assert!(!config.build.parallel);
        assert!(config.build.record_fields);
        assert_eq!(config.analysis.impact_depth, 4);
        assert_eq!(config.analysis.hotspot_limit, 10);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = EngineConfig::from_toml_str("[analysis]\nmax_path_depth = 0\n").unwrap_err();
        assert!(matches!(err, GraphError::InvalidConfig(_)));

        let err = EngineConfig::from_toml_str("[analysis]\nimpact_depth = \"deep\"\n").unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[build]\nfield_usage = false").expect("write config");

        let config = EngineConfig::load(file.path()).expect("config loads");
        assert!(!config.build.field_usage);
        assert_eq!(config.analysis, AnalysisDefaults::default());

        let missing = EngineConfig::load(file.path().with_extension("absent"));
        assert!(matches!(missing, Err(GraphError::Io(_))));
    }
}
