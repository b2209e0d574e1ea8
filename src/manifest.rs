//! `package.json` parsing
//!
//! Only the two dependency tables matter here; every other field is ignored.

use crate::context::ExecutionContext;
use crate::error::{AccelError, AccelResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the project manifest
pub const PACKAGE_FILE: &str = "package.json";

/// Dependency name to version range
pub type Dependencies = BTreeMap<String, String>;

/// The dependency tables of a `package.json` file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub dependencies: Dependencies,

    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: Dependencies,

    #[serde(skip)]
    path: PathBuf,
}

impl Manifest {
    /// Read and parse the manifest at `path`
    pub async fn load(context: &dyn ExecutionContext, path: &Path) -> AccelResult<Self> {
        debug!("Extracting dependencies ({})", path.display());
        if !context.is_file(path).await? {
            return Err(AccelError::MissingPackageFile(path.to_path_buf()));
        }
        let contents = context.read_file(path).await?;
        let mut manifest = Self::parse(&contents).map_err(|reason| AccelError::ManifestInvalid {
            path: path.to_path_buf(),
            reason,
        })?;
        manifest.path = path.to_path_buf();
        Ok(manifest)
    }

    /// Parse manifest bytes (UTF-8, optionally with a byte order mark)
    pub fn parse(contents: &[u8]) -> Result<Self, String> {
        let text = std::str::from_utf8(contents).map_err(|e| e.to_string())?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        match serde_json::from_str::<Value>(text).map_err(|e| e.to_string())? {
            document @ Value::Object(_) => {
                serde_json::from_value(document).map_err(|e| e.to_string())
            }
            other => Err(format!("expected a JSON object, found {}", kind(&other))),
        }
    }

    /// Where the manifest was loaded from (empty when parsed from bytes)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dependencies relevant to an install
    ///
    /// Development dependencies are merged in unless `production` is set;
    /// on a name conflict the development entry wins.
    pub fn dependencies(&self, production: bool) -> Dependencies {
        let mut result = self.dependencies.clone();
        if !production {
            result.extend(
                self.dev_dependencies
                    .iter()
                    .map(|(name, version)| (name.clone(), version.clone())),
            );
        }
        if result.is_empty() {
            warn!("No dependencies extracted from {} file?!", self.path.display());
        } else {
            debug!("Extracted {} dependencies from package.json file", result.len());
        }
        result
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
