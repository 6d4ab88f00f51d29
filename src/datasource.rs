//! Prometheus datasources from a Grafana provisioning file
//!
//! ```yaml
//! datasources:
//!   - name: prod
//!     type: prometheus
//!     url: https://prometheus.prod.example.com
//!     jsonData:
//!       httpHeaderName1: Authorization
//!     secureJsonData:
//!       httpHeaderValue1: Bearer xyz
//! ```
//!
//! Loading never fails the process: a missing or unreadable file yields an
//! empty registry, and individual bad entries are skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::{error, info, warn};

/// A Prometheus endpoint and its optional custom auth header
#[derive(Clone, PartialEq, Eq)]
pub struct Datasource {
    /// Unique datasource name, used as `datasource_id` by tools
    pub name: String,
    /// Base URL without trailing slash
    pub url: String,
    /// Custom header name sent with every request
    pub auth_header_name: Option<String>,
    auth_header_value: Option<String>,
}

impl Datasource {
    /// Create a datasource
    pub fn new(name: impl Into<String>, url: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            url: url.as_ref().trim_end_matches('/').to_string(),
            auth_header_name: None,
            auth_header_value: None,
        }
    }

    /// Attach a custom auth header
    #[must_use]
    pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_header_name = Some(name.into());
        self.auth_header_value = Some(value.into());
        self
    }

    /// The auth header pair, when both halves are configured
    #[must_use]
    pub fn auth_header(&self) -> Option<(&str, &str)> {
        match (&self.auth_header_name, &self.auth_header_value) {
            (Some(name), Some(value)) if !name.is_empty() => Some((name, value)),
            _ => None,
        }
    }
}

impl fmt::Debug for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datasource")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("auth_header_name", &self.auth_header_name)
            .field(
                "auth_header_value",
                &self.auth_header_value.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProvisioningFile {
    #[serde(default)]
    datasources: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDatasource {
    name: String,
    url: String,
    #[serde(default)]
    json_data: Option<RawJsonData>,
    #[serde(default)]
    secure_json_data: Option<RawSecureJsonData>,
}

#[derive(Debug, Deserialize)]
struct RawJsonData {
    #[serde(rename = "httpHeaderName1", default)]
    http_header_name1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSecureJsonData {
    #[serde(rename = "httpHeaderValue1", default)]
    http_header_value1: Option<String>,
}

impl From<RawDatasource> for Datasource {
    fn from(raw: RawDatasource) -> Self {
        let mut ds = Datasource::new(raw.name, raw.url);
        ds.auth_header_name = raw.json_data.and_then(|j| j.http_header_name1);
        ds.auth_header_value = raw.secure_json_data.and_then(|s| s.http_header_value1);
        ds
    }
}

/// Datasources keyed by name
#[derive(Debug, Clone, Default)]
pub struct DatasourceRegistry {
    datasources: BTreeMap<String, Datasource>,
}

impl DatasourceRegistry {
    /// Build a registry from already-parsed datasources
    pub fn from_datasources(datasources: impl IntoIterator<Item = Datasource>) -> Self {
        Self {
            datasources: datasources
                .into_iter()
                .map(|ds| (ds.name.clone(), ds))
                .collect(),
        }
    }

    /// Load the provisioning file at `path`
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            warn!(file = %path.display(), "Datasources file does not exist");
            return Self::default();
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Failed to read datasources file");
                return Self::default();
            }
        };

        let registry = match Self::parse(&contents) {
            Ok(registry) => registry,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Failed to load datasources file");
                return Self::default();
            }
        };

        info!(
            file = %path.display(),
            datasource_count = registry.len(),
            "Loaded datasources"
        );
        for ds in registry.iter().take(3) {
            info!(datasource = %ds.name, url = %ds.url, "Datasource example");
        }
        registry
    }

    /// Parse provisioning YAML, keeping only `type: prometheus` entries
    pub fn parse(yaml: &str) -> crate::Result<Self> {
        let file: Option<ProvisioningFile> = serde_yaml::from_str(yaml)?;
        let entries = file.and_then(|f| f.datasources).unwrap_or_default();

        let mut datasources = Vec::new();
        for entry in entries {
            let kind = entry.get("type").and_then(Value::as_str);
            if kind != Some("prometheus") {
                continue;
            }
            let name = entry
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string);
            match serde_yaml::from_value::<RawDatasource>(entry) {
                Ok(raw) => datasources.push(Datasource::from(raw)),
                Err(e) => {
                    error!(name = ?name, error = %e, "Failed to parse datasource");
                }
            }
        }

        Ok(Self::from_datasources(datasources))
    }

    /// Look up a datasource by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Datasource> {
        self.datasources.get(name)
    }

    /// All datasource names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.datasources.keys().map(String::as_str).collect()
    }

    /// Number of datasources
    #[must_use]
    pub fn len(&self) -> usize {
        self.datasources.len()
    }

    /// Whether no datasources are configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datasources.is_empty()
    }

    /// Iterate datasources in name order
    pub fn iter(&self) -> impl Iterator<Item = &Datasource> {
        self.datasources.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r"
apiVersion: 1
datasources:
  - name: prod
    type: prometheus
    url: https://prom.prod.example.com/
    jsonData:
      httpHeaderName1: Authorization
    secureJsonData:
      httpHeaderValue1: Bearer secret-value
  - name: staging
    type: prometheus
    url: http://prom.staging:9090
  - name: logs
    type: loki
    url: http://loki:3100
  - name: broken
    type: prometheus
";

    #[test]
    fn test_parse_keeps_prometheus_only() {
        let registry = DatasourceRegistry::parse(SAMPLE).unwrap();
        assert_eq!(registry.names(), vec!["prod", "staging"]);
        assert!(registry.get("logs").is_none());
        assert!(registry.get("broken").is_none());
    }

    #[test]
    fn test_url_trimmed_and_header_parsed() {
        let registry = DatasourceRegistry::parse(SAMPLE).unwrap();
        let prod = registry.get("prod").unwrap();
        assert_eq!(prod.url, "https://prom.prod.example.com");
        assert_eq!(
            prod.auth_header(),
            Some(("Authorization", "Bearer secret-value"))
        );
        assert_eq!(registry.get("staging").unwrap().auth_header(), None);
    }

    #[test]
    fn test_debug_redacts_header_value() {
        let ds = Datasource::new("x", "http://x").with_auth_header("X-Token", "hunter2");
        let debug = format!("{ds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_empty_documents() {
        assert!(DatasourceRegistry::parse("").unwrap().is_empty());
        assert!(DatasourceRegistry::parse("apiVersion: 1\n").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(DatasourceRegistry::parse("datasources: [unclosed").is_err());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let registry = DatasourceRegistry::load(Path::new("/nonexistent/datasources.yaml"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let registry = DatasourceRegistry::load(file.path());
        assert_eq!(registry.len(), 2);
    }
}
