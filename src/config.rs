//! Configuration: TOML file, environment overrides, validation.

use crate::{
    board::{SlotSpec, TierConfig},
    errors::{EngineError, Result},
    outcome::OutcomeWeights,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, env, path::Path};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub game: GameConfig,
    pub deposit: DepositConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/giftspin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared secret the identity-integrity header is signed with.
    pub identity_secret: String,
    /// SHA-256 hex of the service-to-service API key.
    pub service_key_hash: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_secret: String::new(),
            service_key_hash: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Balance granted to brand-new accounts, in minor units.
    pub starting_balance: u64,
    /// Breakeven tolerance around the stake, in minor units.
    pub breakeven_tolerance: u64,
    /// Conversion bonus in permille: 1200 = payout of 1.20 × captured value.
    pub bonus_permille: u64,
    /// Board cache freshness window.
    pub board_ttl_secs: i64,
    /// Sweep interval for expired cached boards.
    pub board_sweep_secs: u64,
    /// Tier used by the time-gated free wager.
    pub free_tier: String,
    pub free_cooldown_secs: i64,
    pub weights: OutcomeWeights,
    pub tiers: BTreeMap<String, TierConfig>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let mut tiers = BTreeMap::new();
        tiers.insert(
            "bronze".to_string(),
            TierConfig {
                stake: 200,
                edge: vec![
                    SlotSpec::Fixed {
                        name: "Star Shard".into(),
                        value: 20,
                    },
                    SlotSpec::Range { min: 50, max: 180 },
                    SlotSpec::Range { min: 150, max: 400 },
                ],
                center: SlotSpec::Range {
                    min: 400,
                    max: 1_500,
                },
            },
        );
        tiers.insert(
            "silver".to_string(),
            TierConfig {
                stake: 1_000,
                edge: vec![
                    SlotSpec::Fixed {
                        name: "Star Shard".into(),
                        value: 100,
                    },
                    SlotSpec::Range { min: 250, max: 900 },
                    SlotSpec::Range {
                        min: 800,
                        max: 2_000,
                    },
                ],
                center: SlotSpec::Range {
                    min: 2_000,
                    max: 8_000,
                },
            },
        );
        tiers.insert(
            "daily".to_string(),
            TierConfig {
                stake: 0,
                edge: vec![
                    SlotSpec::Fixed {
                        name: "Star Shard".into(),
                        value: 5,
                    },
                    SlotSpec::Range { min: 20, max: 80 },
                ],
                center: SlotSpec::Range { min: 60, max: 250 },
            },
        );
        Self {
            starting_balance: 200_000,
            breakeven_tolerance: 5,
            bonus_permille: 1_200,
            board_ttl_secs: 600,
            board_sweep_secs: 120,
            free_tier: "daily".to_string(),
            free_cooldown_secs: 86_400,
            // Raw weights; normalized at draw time.
            weights: OutcomeWeights {
                lose: 62.0,
                breakeven: 25.0,
                win: 13.0,
            },
            tiers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositConfig {
    /// Destination wallet players transfer to.
    pub wallet_address: String,
    /// Base URL of the external-ledger HTTP gateway.
    pub gateway_url: String,
    /// External-currency type tag recorded on intents.
    pub external_kind: String,
    pub token_prefix: String,
    pub expiry_secs: i64,
    /// Internal minor units credited per whole external coin.
    pub units_per_coin: u64,
    /// How many recent inbound transfers the gateway scan covers.
    pub scan_limit: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// Overall bound on one verify's external query, retries included.
    pub verify_timeout_secs: u64,
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            wallet_address: String::new(),
            gateway_url: "https://toncenter.com".to_string(),
            external_kind: "ton".to_string(),
            token_prefix: "gsp".to_string(),
            expiry_secs: 30 * 60,
            units_per_coin: 100,
            scan_limit: 50,
            retry_attempts: 3,
            retry_delay_ms: 1_500,
            verify_timeout_secs: 15,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            game: GameConfig::default(),
            deposit: DepositConfig::default(),
        }
    }
}

/// Configuration loader: file, then environment, then validation.
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn load(&self) -> Result<EngineConfig> {
        let mut config = match &self.config_path {
            Some(path) => self.load_from_file(path)?,
            None => EngineConfig::default(),
        };
        self.apply_env_overrides(&mut config);
        validate(&config)?;
        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> Result<EngineConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {path}: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("failed to parse {path}: {e}")))
    }

    fn apply_env_overrides(&self, config: &mut EngineConfig) {
        if let Ok(host) = env::var("GIFTSPIN_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = env::var("GIFTSPIN_PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }
        if let Ok(dir) = env::var("GIFTSPIN_DATA_DIR") {
            config.storage.data_dir = dir;
        }
        if let Ok(secret) = env::var("GIFTSPIN_IDENTITY_SECRET") {
            config.auth.identity_secret = secret;
        }
        if let Ok(hash) = env::var("GIFTSPIN_SERVICE_KEY_HASH") {
            config.auth.service_key_hash = hash;
        }
        if let Ok(wallet) = env::var("GIFTSPIN_DEPOSIT_WALLET") {
            config.deposit.wallet_address = wallet;
        }
        if let Ok(url) = env::var("GIFTSPIN_GATEWAY_URL") {
            config.deposit.gateway_url = url;
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(config: &EngineConfig) -> Result<()> {
    if config.server.port == 0 {
        return Err(EngineError::Config("server.port must be non-zero".into()));
    }
    if config.game.tiers.is_empty() {
        return Err(EngineError::Config("game.tiers must not be empty".into()));
    }
    match config.game.tiers.get(&config.game.free_tier) {
        None => {
            return Err(EngineError::Config(format!(
                "game.free_tier '{}' is not a configured tier",
                config.game.free_tier
            )))
        }
        Some(tier) if tier.stake != 0 => {
            return Err(EngineError::Config(
                "the free tier must have stake 0".into(),
            ))
        }
        Some(_) => {}
    }
    for (name, tier) in &config.game.tiers {
        for spec in tier.edge.iter().chain(std::iter::once(&tier.center)) {
            if let SlotSpec::Range { min, max } = spec {
                if min > max {
                    return Err(EngineError::Config(format!(
                        "tier '{name}': range slot has min > max"
                    )));
                }
            }
        }
    }
    config.game.weights.validate()?;
    if config.game.bonus_permille == 0 {
        return Err(EngineError::Config(
            "game.bonus_permille must be positive".into(),
        ));
    }
    if config.game.board_ttl_secs <= 0 {
        return Err(EngineError::Config(
            "game.board_ttl_secs must be positive".into(),
        ));
    }
    if config.deposit.units_per_coin == 0 {
        return Err(EngineError::Config(
            "deposit.units_per_coin must be positive".into(),
        ));
    }
    if config.deposit.expiry_secs <= 0 {
        return Err(EngineError::Config(
            "deposit.expiry_secs must be positive".into(),
        ));
    }
    if config.deposit.retry_attempts == 0 {
        return Err(EngineError::Config(
            "deposit.retry_attempts must be at least 1".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = EngineConfig::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn free_tier_must_exist_and_be_stakeless() {
        let mut config = EngineConfig::default();
        config.game.free_tier = "missing".into();
        assert!(validate(&config).is_err());

        let mut config = EngineConfig::default();
        config.game.free_tier = "bronze".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn bad_range_is_rejected() {
        let mut config = EngineConfig::default();
        if let Some(tier) = config.game.tiers.get_mut("bronze") {
            tier.center = SlotSpec::Range { min: 500, max: 100 };
        }
        assert!(validate(&config).is_err());
    }

    #[test]
    fn toml_roundtrip_keeps_tiers() {
        let config = EngineConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.game.tiers.len(), config.game.tiers.len());
        assert_eq!(parsed.deposit.expiry_secs, 1_800);
    }
}
