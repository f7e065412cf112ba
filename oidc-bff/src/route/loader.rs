use super::EndpointRoute;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
struct RouteFile {
    #[serde(default)]
    endpoints: Vec<EndpointRoute>,
}

/// Read every `*.yaml` / `*.yml` file in `dir` and concatenate their
/// `endpoints:` lists in file-name order.
pub fn load_routes_dir(dir: impl AsRef<Path>) -> Result<Vec<EndpointRoute>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| Error::Config(format!("cannot read routes directory {}: {e}", dir.display())))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_yaml(path))
        .collect();
    files.sort();

    let mut routes = Vec::new();
    for path in files {
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        if raw.trim().is_empty() {
            continue;
        }
        let file: RouteFile = serde_yaml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid route file {}: {e}", path.display())))?;
        tracing::debug!(file = %path.display(), endpoints = file.endpoints.len(), "loaded route file");
        routes.extend(file.endpoints);
    }

    Ok(routes)
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}
