//! Cluster file loading

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use bigbrother_core::{BigBrotherError, Result};
use bigbrother_ipvs::{Cluster, ClusterConfig};

/// Read and validate the cluster file.
pub async fn load_clusters(path: &Path, default_interval: Duration) -> Result<Vec<Cluster>> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        BigBrotherError::Config(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_clusters(&raw, default_interval)
}

/// Parse a YAML mapping of cluster name to definition. Fwmarks must be unique
/// since they identify the IPVS service.
pub fn parse_clusters(raw: &str, default_interval: Duration) -> Result<Vec<Cluster>> {
    let entries: BTreeMap<String, ClusterConfig> = serde_yaml::from_str(raw)
        .map_err(|e| BigBrotherError::Config(format!("invalid cluster file: {}", e)))?;

    let mut seen = HashMap::new();
    let mut clusters = Vec::with_capacity(entries.len());
    for (name, entry) in entries {
        let cluster = Cluster::from_config(&name, entry, default_interval)
            .map_err(|e| BigBrotherError::Config(e.to_string()))?;

        if let Some(other) = seen.insert(cluster.fwmark(), name.clone()) {
            return Err(BigBrotherError::Config(format!(
                "clusters {} and {} share fwmark {}",
                other,
                name,
                cluster.fwmark()
            )));
        }
        clusters.push(cluster);
    }
    Ok(clusters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigbrother_ipvs::Fwmark;

    const CLUSTERS: &str = r#"
test1:
  check_interval: 5
  scheduler: wrr
  fwmark: 1
  nodes:
    - address: 127.0.0.1
      port: 9001
      path: /test/valid
    - address: 127.0.0.2
      port: 9001
test2:
  scheduler: wrr
  fwmark: "2"
  nodes: []
"#;

    #[test]
    fn test_parse_clusters() {
        let clusters = parse_clusters(CLUSTERS, Duration::from_secs(1)).unwrap();

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].to_string(), "test1 (1)");
        assert_eq!(clusters[0].nodes().len(), 2);
        assert_eq!(clusters[0].nodes()[0].path(), "/test/valid");
        assert_eq!(clusters[0].nodes()[1].path(), "/");
        assert_eq!(clusters[1].fwmark(), Fwmark(2));
        assert!(clusters.iter().all(|c| !c.monitored()));
    }

    #[test]
    fn test_missing_fwmark_is_config_error() {
        let raw = "broken:\n  scheduler: wrr\n  nodes: []\n";
        let err = parse_clusters(raw, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BigBrotherError::Config(_)));
    }

    #[test]
    fn test_duplicate_fwmark_is_config_error() {
        let raw = "a:\n  scheduler: wrr\n  fwmark: 1\nb:\n  scheduler: wrr\n  fwmark: 1\n";
        let err = parse_clusters(raw, Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("share fwmark 1"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let path = std::env::temp_dir().join(format!("bigbrother-{}.yml", uuid::Uuid::new_v4()));
        let err = load_clusters(&path, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, BigBrotherError::Config(_)));
    }
}
