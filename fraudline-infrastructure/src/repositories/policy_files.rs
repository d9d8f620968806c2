use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use tokio::fs;

use fraudline_domain::ports::PolicyRepository;
use fraudline_domain::ScoringPolicy;

/// Rule tables stored as YAML.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyFileRepository;

impl PolicyFileRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PolicyRepository for PolicyFileRepository {
    async fn load_policy(&self, path: &str) -> anyhow::Result<ScoringPolicy> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read rules file {}", path))?;
        let mut policy: ScoringPolicy = serde_yaml::from_str(&content)
            .with_context(|| format!("invalid rules file {}", path))?;
        policy.normalize();
        policy.validate()?;
        Ok(policy)
    }

    async fn save_policy(&self, path: &str, policy: &ScoringPolicy) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let content = serde_yaml::to_string(policy)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraudline_domain::TemporalBasis;

    fn scratch_path(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("fraudline-{}-{}", std::process::id(), name))
            .to_string_lossy()
            .to_string()
    }

    #[tokio::test]
    async fn saved_policy_loads_back() {
        let repo = PolicyFileRepository::new();
        let path = scratch_path("rules/saved.yaml");
        let mut policy = ScoringPolicy::default();
        policy.velocity_window_minutes = 15;
        policy.temporal_basis = TemporalBasis::TransactionTime;
        repo.save_policy(&path, &policy).await.expect("save");
        let loaded = repo.load_policy(&path).await.expect("load");
        assert_eq!(loaded, policy);
        let _ = fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn partial_file_keeps_defaults() {
        let repo = PolicyFileRepository::new();
        let path = scratch_path("partial.yaml");
        fs::write(
            &path,
            "fraud_threshold: 55.0\nip_prefixes:\n  high_risk: [\"203.0.\"]\n  high_risk_points: 30\n",
        )
        .await
        .expect("write");
        let loaded = repo.load_policy(&path).await.expect("load");
        assert_eq!(loaded.fraud_threshold, 55.0);
        assert_eq!(loaded.ip_prefixes.high_risk, vec!["203.0."]);
        assert_eq!(loaded.ip_prefixes.private_points, 5);
        assert_eq!(loaded.amount_bands, ScoringPolicy::default().amount_bands);
        let _ = fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn invalid_policy_is_rejected() {
        let repo = PolicyFileRepository::new();
        let path = scratch_path("invalid.yaml");
        fs::write(&path, "velocity_window_minutes: 0\n").await.expect("write");
        assert!(repo.load_policy(&path).await.is_err());
        let _ = fs::remove_file(&path).await;
    }
}
