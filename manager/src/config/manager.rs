// File: manager/src/config/manager.rs
use super::{InventoryFile, ManagerConfig};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use protocol::types::ConfigRules;

pub struct ConfigManager {
    config_dir: PathBuf,
    current_config: Arc<ManagerConfig>,
}

impl ConfigManager {
    pub async fn new(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            config_dir,
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<ManagerConfig> {
        self.current_config.clone()
    }

    /// Distribution source for one node's channel rules. Kept as plain JSON
    /// so the file can be copied verbatim onto the share.
    pub fn node_rules_path(&self, node_name: &str) -> PathBuf {
        self.config_dir
            .join("nodes")
            .join(node_name)
            .join("config.json")
    }

    pub async fn load_node_rules(&self, node_name: &str) -> Result<Option<ConfigRules>> {
        let path = self.node_rules_path(node_name);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow!("Failed to read {}: {}", path.display(), e)),
        };
        let rules: ConfigRules = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse {}: {}", path.display(), e))?;
        Ok(Some(rules))
    }

    async fn load_configuration(config_dir: &Path) -> Result<ManagerConfig> {
        let main_config_path = config_dir.join("main.toml");
        let main_config_content = fs::read_to_string(&main_config_path)
            .await
            .map_err(|e| anyhow!("Failed to read main config {}: {}", main_config_path.display(), e))?;

        let mut config: ManagerConfig = toml::from_str(&main_config_content)
            .map_err(|e| anyhow!("Failed to parse main config: {}", e))?;

        let inventory_path = config_dir.join("inventory.toml");
        let inventory_content = fs::read_to_string(&inventory_path)
            .await
            .map_err(|e| anyhow!("Failed to read inventory {}: {}", inventory_path.display(), e))?;

        let inventory: InventoryFile = toml::from_str(&inventory_content)
            .map_err(|e| anyhow!("Failed to parse inventory: {}", e))?;

        config.nodes = inventory.nodes;

        info!(
            "Configuration loaded: {} nodes ({} active)",
            config.nodes.len(),
            config.nodes.values().filter(|n| n.exists).count()
        );

        Ok(config)
    }
}
