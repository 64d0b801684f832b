//! Generation parameters
//!
//! Options controlling what is generated and how it is named. Loaded from a YAML
//! settings file; every field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error};

use crate::error::DalgenError;
use crate::introspect::TableFilter;

/// Timeout used for sample executions unless a longer one is configured
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationParameters {
    /// File the generated code is written to
    pub export_file_name: PathBuf,
    /// Namespace of the generated code
    pub code_namespace: String,
    /// Code inserted right after the namespace opens
    pub namespace_start_code: Option<String>,
    pub additional_namespaces: Vec<String>,

    pub class_prefix: String,
    pub view_prefix: String,
    pub member_prefix: String,
    pub base_class_for_tables: Option<String>,
    pub make_names_lowercase: bool,

    /// Tables to generate; empty means all
    pub selected_tables: Vec<String>,
    pub excluded_tables: Vec<String>,
    pub excluded_tables_prefix: Option<String>,
    /// Catalog schema procedures are executed in
    pub catalog_schema: String,

    pub dont_inject_infrastructure_classes: bool,
    pub dont_inject_basic_sql_provider: bool,
    pub dont_inject_linq_helpers: bool,
    pub generate_query_object: bool,
    pub generate_sql_statements: bool,
    /// Directory with replacement clip files
    pub clips_dir: Option<PathBuf>,

    pub use_sps: bool,
    pub sp_class_name: String,
    pub sp_prefix: String,
    pub use_sp_with_tables: bool,
    pub prefix_sp_with_tables: String,
    /// Marker (`-- <flag>`) a procedure definition must contain to get a data object wrapper
    pub sp_data_wrapper_flag: Option<String>,
    pub sp_data_wrapper_autotrim: bool,
    pub sp_sample_timeout_secs: Option<u64>,
    pub sp_sample_with_dummy_args: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            export_file_name: PathBuf::from("dal.cs"),
            code_namespace: "Dal".to_string(),
            namespace_start_code: None,
            additional_namespaces: Vec::new(),
            class_prefix: "Table".to_string(),
            view_prefix: "View".to_string(),
            member_prefix: String::new(),
            base_class_for_tables: None,
            make_names_lowercase: true,
            selected_tables: Vec::new(),
            excluded_tables: Vec::new(),
            excluded_tables_prefix: None,
            catalog_schema: "dbo".to_string(),
            dont_inject_infrastructure_classes: false,
            dont_inject_basic_sql_provider: false,
            dont_inject_linq_helpers: true,
            generate_query_object: true,
            generate_sql_statements: false,
            clips_dir: None,
            use_sps: false,
            sp_class_name: "StoredProcedures".to_string(),
            sp_prefix: String::new(),
            use_sp_with_tables: true,
            prefix_sp_with_tables: "grp_".to_string(),
            sp_data_wrapper_flag: None,
            sp_data_wrapper_autotrim: false,
            sp_sample_timeout_secs: None,
            sp_sample_with_dummy_args: false,
        }
    }
}

impl GenerationParameters {
    /// Load, normalize and validate a settings file
    pub fn load(path: &Path) -> Result<Self, DalgenError> {
        if !path.exists() {
            error!(path = ?path, "Settings file not found");
            return Err(DalgenError::ConfigFileMissing(path.to_path_buf()));
        }

        debug!(path = ?path, "Loading settings file");
        let text = std::fs::read_to_string(path).map_err(|e| {
            error!(path = ?path, error = %e, "Failed to read settings file");
            DalgenError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, DalgenError> {
        let params: Self = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| DalgenError::Config(format!("Invalid settings: {}", e)))?
        };
        let params = params.normalize();
        params.validate()?;
        Ok(params)
    }

    /// Drop blank list entries and upper-case the exclusion rules
    pub fn normalize(mut self) -> Self {
        fn clean(list: Vec<String>) -> Vec<String> {
            list.into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }

        self.additional_namespaces = clean(self.additional_namespaces);
        self.selected_tables = clean(self.selected_tables);
        self.excluded_tables = clean(self.excluded_tables)
            .into_iter()
            .map(|s| s.to_uppercase())
            .collect();
        self.excluded_tables_prefix = self
            .excluded_tables_prefix
            .map(|p| p.trim().to_uppercase())
            .filter(|p| !p.is_empty());
        self.sp_data_wrapper_flag = self
            .sp_data_wrapper_flag
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        self.base_class_for_tables = self
            .base_class_for_tables
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        self
    }

    pub fn validate(&self) -> Result<(), DalgenError> {
        if !is_identifier_path(&self.code_namespace) {
            return Err(DalgenError::Config(format!(
                "code_namespace '{}' is not a valid namespace",
                self.code_namespace
            )));
        }
        if self.use_sps && (!is_identifier_path(&self.sp_class_name) || self.sp_class_name.contains('.')) {
            return Err(DalgenError::Config(format!(
                "sp_class_name '{}' is not a valid class name",
                self.sp_class_name
            )));
        }
        Ok(())
    }

    pub fn table_filter(&self) -> TableFilter {
        TableFilter {
            include: if self.selected_tables.is_empty() {
                None
            } else {
                Some(self.selected_tables.clone())
            },
            excluded: self.excluded_tables.clone(),
            excluded_prefix: self.excluded_tables_prefix.clone(),
        }
    }

    /// Whether a procedure is treated as returning tabular data
    pub fn returns_data(&self, procedure: &str) -> bool {
        self.use_sp_with_tables && procedure.starts_with(&self.prefix_sp_with_tables)
    }

    /// Whether a sample should be captured for a procedure with this definition
    pub fn wants_sample(&self, definition: Option<&str>) -> bool {
        match &self.sp_data_wrapper_flag {
            None => true,
            Some(flag) => definition.is_some_and(|d| d.contains(&format!("-- {}", flag))),
        }
    }

    pub fn sample_timeout(&self) -> Duration {
        self.sp_sample_timeout_secs
            .map(Duration::from_secs)
            .filter(|t| *t > DEFAULT_SAMPLE_TIMEOUT)
            .unwrap_or(DEFAULT_SAMPLE_TIMEOUT)
    }
}

fn is_identifier_path(value: &str) -> bool {
    !value.is_empty()
        && value.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
                && chars.all(|c| c.is_alphanumeric() || c == '_')
        })
}
