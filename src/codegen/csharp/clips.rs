//! Fixed C# code blocks injected into the output
//!
//! The built-in clips ship with the binary; a directory containing files with
//! the same names can replace any of them.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::DalgenError;

/// Marker in the attributes clip replaced by the query helper types
pub const QUERY_HELPER_MARKER: &str = "#$#QUERY_HELPER#$#";

#[derive(Debug, Clone)]
pub struct Clips {
    pub namespaces: String,
    pub attributes: String,
    pub attributes_query: String,
    pub basic_provider: String,
    pub query_obj: String,
    pub check_nullable: String,
}

impl Clips {
    pub fn builtin() -> Self {
        Self {
            namespaces: include_str!("clips/namespaces.txt").to_string(),
            attributes: include_str!("clips/attributes.txt").to_string(),
            attributes_query: include_str!("clips/attributes_query.txt").to_string(),
            basic_provider: include_str!("clips/basic_provider.txt").to_string(),
            query_obj: include_str!("clips/query_obj.txt").to_string(),
            check_nullable: include_str!("clips/check_nullable.txt").to_string(),
        }
    }

    /// Built-in clips with every `<name>.txt` found in `dir` replacing its counterpart
    pub fn load_dir(dir: &Path) -> Result<Self, DalgenError> {
        if !dir.is_dir() {
            return Err(DalgenError::Config(format!(
                "clips directory '{}' does not exist",
                dir.display()
            )));
        }

        let mut clips = Self::builtin();
        for (name, slot) in [
            ("namespaces", &mut clips.namespaces),
            ("attributes", &mut clips.attributes),
            ("attributes_query", &mut clips.attributes_query),
            ("basic_provider", &mut clips.basic_provider),
            ("query_obj", &mut clips.query_obj),
            ("check_nullable", &mut clips.check_nullable),
        ] {
            let path = dir.join(format!("{}.txt", name));
            if path.is_file() {
                *slot = fs::read_to_string(&path).map_err(|e| {
                    DalgenError::Config(format!("Failed to read clip '{}': {}", path.display(), e))
                })?;
                debug!(clip = name, path = ?path, "Loaded clip override");
            }
        }
        Ok(clips)
    }

    /// Attribute classes, with or without the query helper types
    pub fn attributes_block(&self, with_query: bool) -> String {
        let helper = if with_query { self.attributes_query.as_str() } else { "" };
        self.attributes.replace(QUERY_HELPER_MARKER, helper.trim_end())
    }
}

impl Default for Clips {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_block() {
        let clips = Clips::builtin();
        let with_query = clips.attributes_block(true);
        assert!(with_query.contains("public enum QueryOperator"));
        assert!(!with_query.contains(QUERY_HELPER_MARKER));

        let without = clips.attributes_block(false);
        assert!(!without.contains("QueryOperator"));
        assert!(!without.contains(QUERY_HELPER_MARKER));
        assert!(without.contains("public class DataFieldAttribute"));
    }

    #[test]
    fn test_load_dir_overrides() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("namespaces.txt"), "using System;\n").unwrap();

        let clips = Clips::load_dir(dir.path()).unwrap();
        assert_eq!(clips.namespaces, "using System;\n");
        assert_eq!(clips.basic_provider, Clips::builtin().basic_provider);
    }

    #[test]
    fn test_load_missing_dir() {
        let err = Clips::load_dir(Path::new("/nonexistent/clips")).unwrap_err();
        assert!(matches!(err, DalgenError::Config(_)));
    }
}
