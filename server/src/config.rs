//! Session configuration loaded from an optional TOML file
//!
//! Every field has a default so the server starts without any file. Command
//! line flags override the capacity after loading.

use serde::Deserialize;
use shared::{CosmeticCatalog, Vec3};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Lobby participant capacity
    pub max_players: usize,
    /// Concurrent UDP connections accepted, announced or not
    pub max_connections: usize,
    pub client_timeout_secs: u64,
    /// Full snapshot broadcast period, in ticks
    pub snapshot_interval_ticks: u32,
    /// Fixed seed for buff draws; random when absent
    pub rng_seed: Option<u64>,
    /// Live projectiles one client may have in flight at once
    pub max_projectiles_per_client: usize,
    pub lobby_spawn_points: Vec<Vec3>,
    pub game_spawn_points: Vec<Vec3>,
    pub enemy_spawns: Vec<Vec3>,
    pub pickup_spawns: Vec<Vec3>,
    pub cosmetics: CosmeticCatalog,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_players: 5,
            max_connections: 16,
            client_timeout_secs: 5,
            snapshot_interval_ticks: 30,
            rng_seed: None,
            max_projectiles_per_client: 8,
            lobby_spawn_points: (0..5)
                .map(|i| Vec3::new(-4.0 + i as f32 * 2.0, 0.0, 0.0))
                .collect(),
            game_spawn_points: vec![
                Vec3::new(-10.0, 0.0, -10.0),
                Vec3::new(10.0, 0.0, -10.0),
                Vec3::new(-10.0, 0.0, 10.0),
                Vec3::new(10.0, 0.0, 10.0),
                Vec3::new(0.0, 0.0, 0.0),
            ],
            enemy_spawns: vec![
                Vec3::new(0.0, 0.0, 20.0),
                Vec3::new(20.0, 0.0, 0.0),
                Vec3::new(-20.0, 0.0, 0.0),
            ],
            pickup_spawns: vec![Vec3::new(0.0, 0.0, 5.0), Vec3::new(5.0, 0.0, -5.0)],
            cosmetics: CosmeticCatalog::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("max_players must be at least 1".into()));
        }
        if self.max_connections < self.max_players {
            return Err(ConfigError::Invalid(
                "max_connections must be at least max_players".into(),
            ));
        }
        if self.snapshot_interval_ticks == 0 {
            return Err(ConfigError::Invalid(
                "snapshot_interval_ticks must be at least 1".into(),
            ));
        }
        if self.max_projectiles_per_client == 0 {
            return Err(ConfigError::Invalid(
                "max_projectiles_per_client must be at least 1".into(),
            ));
        }
        if self.cosmetics.counts.iter().any(|count| *count < 1) {
            return Err(ConfigError::Invalid(
                "every cosmetic slot needs at least one option".into(),
            ));
        }
        Ok(())
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_players, 5);
        assert_eq!(config.lobby_spawn_points.len(), 5);
        assert_eq!(config.client_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let text = r#"
            max_players = 3
            rng_seed = 7
            game_spawn_points = [{ x = 1.0, y = 0.0, z = 2.0 }]

            [cosmetics]
            counts = [2, 2, 2, 2, 2, 2, 2]
        "#;

        let config = ServerConfig::from_toml(text).unwrap();
        assert_eq!(config.max_players, 3);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.game_spawn_points, vec![Vec3::new(1.0, 0.0, 2.0)]);
        assert_eq!(config.cosmetics.counts, [2; 7]);
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.snapshot_interval_ticks, 30);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        let result = ServerConfig::from_toml("max_players = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = ServerConfig::from_toml("max_players = 20");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = ServerConfig::from_toml("max_projectiles_per_client = 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let result = ServerConfig::from_toml("max_players = \"many\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
