//! Configuration management
//!
//! Strongly-typed grid configuration with constructor-time validation.
//! Loaded from JSON files; every section is validated before any simulation
//! proceeds so a misconfigured range fails immediately instead of producing
//! silent garbage results.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::MarketRegime;

/// Bounds on grid level count
pub const MIN_GRID_LEVELS: usize = 2;
pub const MAX_GRID_LEVELS: usize = 200;

/// Configuration validation errors. Always fatal to the configuration;
/// nothing is silently corrected.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("lower bound ({lower}) must be < upper bound ({upper})")]
    InvalidRange { lower: f64, upper: f64 },

    #[error("range bounds must be positive, got lower={0}")]
    NonPositiveBound(f64),

    #[error("grid spacing must be positive, got {0}")]
    NonPositiveSpacing(f64),

    #[error("grid level count {count} outside allowed range {min}..={max}")]
    LevelCountOutOfRange {
        count: usize,
        min: usize,
        max: usize,
    },

    #[error("maker fee must be >= 0, got {0}")]
    NegativeFee(f64),

    #[error("leverage {0} outside allowed range 1..=100")]
    LeverageOutOfRange(f64),

    #[error("initial_position_pct {0} must be within [0, 1]")]
    InitialPositionOutOfRange(f64),

    #[error("risk budget must be positive, got {0}")]
    NonPositiveBudget(f64),

    #[error("spacing clamp invalid: base ({base}) must be <= max ({max})")]
    InvalidSpacingClamp { base: f64, max: f64 },

    #[error("{name} must be within [0, 1], got {value}")]
    FractionOutOfRange { name: &'static str, value: f64 },
}

/// Price range the grid operates within
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    pub lower: f64,
    pub upper: f64,
}

impl RangeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lower <= 0.0 {
            return Err(ConfigError::NonPositiveBound(self.lower));
        }
        if self.lower >= self.upper {
            return Err(ConfigError::InvalidRange {
                lower: self.lower,
                upper: self.upper,
            });
        }
        Ok(())
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// How level prices are spaced across the range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpacingMode {
    /// Constant percentage spacing; preferred for volatile ranges
    #[default]
    Geometric,
    /// Constant absolute spacing
    Arithmetic,
}

/// Adaptive spacing derived from a volatility estimate instead of a fixed count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveSpacingConfig {
    /// Floor spacing; also the cost-coverage minimum (default: 0.004)
    #[serde(default = "default_base_spacing")]
    pub base_spacing: f64,

    /// Ceiling spacing so widening never grows unbounded (default: 0.03)
    #[serde(default = "default_max_spacing")]
    pub max_spacing: f64,

    /// Minimum net return per round trip after costs (default: 0.001)
    #[serde(default = "default_min_net_return")]
    pub min_net_return: f64,

    /// How aggressively spacing widens when volatility runs above average (default: 0.5)
    #[serde(default = "default_volatility_factor")]
    pub volatility_factor: f64,

    /// Volatility buffer applied to the bounds, in ATR multiples (default: 1.0)
    #[serde(default = "default_cushion_atr_mult")]
    pub cushion_atr_mult: f64,

    /// ATR period feeding the spacing estimate (default: 14)
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
}

fn default_base_spacing() -> f64 {
    0.004
}

fn default_max_spacing() -> f64 {
    0.03
}

fn default_min_net_return() -> f64 {
    0.001
}

fn default_volatility_factor() -> f64 {
    0.5
}

fn default_cushion_atr_mult() -> f64 {
    1.0
}

fn default_atr_period() -> usize {
    14
}

impl Default for AdaptiveSpacingConfig {
    fn default() -> Self {
        Self {
            base_spacing: default_base_spacing(),
            max_spacing: default_max_spacing(),
            min_net_return: default_min_net_return(),
            volatility_factor: default_volatility_factor(),
            cushion_atr_mult: default_cushion_atr_mult(),
            atr_period: default_atr_period(),
        }
    }
}

impl AdaptiveSpacingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_spacing <= 0.0 {
            return Err(ConfigError::NonPositiveSpacing(self.base_spacing));
        }
        if self.base_spacing > self.max_spacing {
            return Err(ConfigError::InvalidSpacingClamp {
                base: self.base_spacing,
                max: self.max_spacing,
            });
        }
        Ok(())
    }
}

/// Level generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Number of grid intervals; produces count + 1 level prices (default: 10)
    #[serde(default = "default_level_count")]
    pub count: usize,

    /// Spacing mode for the fixed-count ladder (default: geometric)
    #[serde(default)]
    pub mode: SpacingMode,

    /// Volatility-derived spacing parameters for the adaptive variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive: Option<AdaptiveSpacingConfig>,
}

fn default_level_count() -> usize {
    10
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            count: default_level_count(),
            mode: SpacingMode::default(),
            adaptive: None,
        }
    }
}

impl LevelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count < MIN_GRID_LEVELS || self.count > MAX_GRID_LEVELS {
            return Err(ConfigError::LevelCountOutOfRange {
                count: self.count,
                min: MIN_GRID_LEVELS,
                max: MAX_GRID_LEVELS,
            });
        }
        if let Some(adaptive) = &self.adaptive {
            adaptive.validate()?;
        }
        Ok(())
    }
}

/// Fee and leverage parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Maker fee rate per fill (default: 0.001 = 0.1%)
    #[serde(default = "default_maker_fee")]
    pub maker_fee: f64,

    /// Account leverage (default: 1.0)
    #[serde(default = "default_leverage")]
    pub leverage: f64,
}

fn default_maker_fee() -> f64 {
    0.001
}

fn default_leverage() -> f64 {
    1.0
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            maker_fee: default_maker_fee(),
            leverage: default_leverage(),
        }
    }
}

impl FeeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maker_fee < 0.0 {
            return Err(ConfigError::NegativeFee(self.maker_fee));
        }
        if !(1.0..=100.0).contains(&self.leverage) {
            return Err(ConfigError::LeverageOutOfRange(self.leverage));
        }
        Ok(())
    }

    /// Fees paid on a complete buy-then-sell cycle
    pub fn round_trip(&self) -> f64 {
        self.maker_fee * 2.0
    }
}

/// How the risk budget is distributed across levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    /// Same allocation per level
    Equal,
    /// Edge-heavy linear weighting
    #[default]
    Weighted,
}

/// Allocation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Total risk budget in quote currency (default: 10_000)
    #[serde(default = "default_risk_budget")]
    pub risk_budget: f64,

    #[serde(default)]
    pub mode: AllocationMode,

    /// Slope of the edge-heavy weight ramp (default: 0.25)
    #[serde(default = "default_edge_weight_factor")]
    pub edge_weight_factor: f64,

    /// Regime label steering the buy/sell budget split (default: neutral)
    #[serde(default)]
    pub regime: MarketRegime,
}

fn default_risk_budget() -> f64 {
    10_000.0
}

fn default_edge_weight_factor() -> f64 {
    0.25
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            risk_budget: default_risk_budget(),
            mode: AllocationMode::default(),
            edge_weight_factor: default_edge_weight_factor(),
            regime: MarketRegime::default(),
        }
    }
}

impl AllocationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.risk_budget <= 0.0 {
            return Err(ConfigError::NonPositiveBudget(self.risk_budget));
        }
        Ok(())
    }
}

/// Inventory limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Maximum long exposure in base units (default: 1.0)
    #[serde(default = "default_max_units")]
    pub max_long_units: f64,

    /// Maximum short exposure in base units (default: 1.0)
    #[serde(default = "default_max_units")]
    pub max_short_units: f64,

    /// Snapshot history retained for analysis (default: 1000)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_max_units() -> f64 {
    1.0
}

fn default_history_limit() -> usize {
    1000
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            max_long_units: default_max_units(),
            max_short_units: default_max_units(),
            history_limit: default_history_limit(),
        }
    }
}

/// Risk throttle thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Inventory utilization at which all new orders stop (default: 0.9)
    #[serde(default = "default_inventory_threshold")]
    pub inventory_threshold: f64,

    /// Daily profit, as a fraction of the risk budget, that triggers the
    /// profit lock (default: 0.02)
    #[serde(default = "default_profit_target_pct")]
    pub profit_target_pct: f64,

    /// Size multiplier while the profit lock holds (default: 0.5)
    #[serde(default = "default_profit_reduction")]
    pub profit_reduction: f64,

    /// ATR ratio at which the volatility brake engages (default: 2.0)
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: f64,

    /// Size multiplier while the volatility brake holds (default: 0.3)
    #[serde(default = "default_volatility_reduction")]
    pub volatility_reduction: f64,
}

fn default_inventory_threshold() -> f64 {
    0.9
}

fn default_profit_target_pct() -> f64 {
    0.02
}

fn default_profit_reduction() -> f64 {
    0.5
}

fn default_volatility_threshold() -> f64 {
    2.0
}

fn default_volatility_reduction() -> f64 {
    0.3
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            inventory_threshold: default_inventory_threshold(),
            profit_target_pct: default_profit_target_pct(),
            profit_reduction: default_profit_reduction(),
            volatility_threshold: default_volatility_threshold(),
            volatility_reduction: default_volatility_reduction(),
        }
    }
}

impl ThrottleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("inventory_threshold", self.inventory_threshold),
            ("profit_reduction", self.profit_reduction),
            ("volatility_reduction", self.volatility_reduction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FractionOutOfRange { name, value });
            }
        }
        Ok(())
    }
}

/// How exit fills are matched against open positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingMode {
    /// Pair buy[i] with sell[i+1] via the position's expected exit level
    #[default]
    Adjacent,
    /// Oldest open position of the matching side closes first
    Fifo,
}

/// Main grid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub range: RangeConfig,

    #[serde(default)]
    pub levels: LevelConfig,

    #[serde(default)]
    pub fees: FeeConfig,

    #[serde(default)]
    pub allocation: AllocationConfig,

    #[serde(default)]
    pub inventory: InventoryConfig,

    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Fraction of the buy-side budget pre-established as inventory at
    /// setup (default: 0.0)
    #[serde(default)]
    pub initial_position_pct: f64,

    /// Levels sized below this notional are skipped, not errors (default: 10.0)
    #[serde(default = "default_min_order_size_usd")]
    pub min_order_size_usd: f64,

    #[serde(default)]
    pub matching: MatchingMode,
}

fn default_min_order_size_usd() -> f64 {
    10.0
}

impl GridConfig {
    /// Load configuration from a JSON file and validate it
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: GridConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate().context("Invalid grid configuration")?;
        Ok(config)
    }

    /// Validate every section. Called at load and again by the engine
    /// constructor so programmatically-built configs get the same checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.range.validate()?;
        self.levels.validate()?;
        self.fees.validate()?;
        self.allocation.validate()?;
        self.throttle.validate()?;
        if !(0.0..=1.0).contains(&self.initial_position_pct) {
            return Err(ConfigError::InitialPositionOutOfRange(
                self.initial_position_pct,
            ));
        }
        Ok(())
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            range: RangeConfig {
                lower: 90_000.0,
                upper: 110_000.0,
            },
            levels: LevelConfig::default(),
            fees: FeeConfig::default(),
            allocation: AllocationConfig::default(),
            inventory: InventoryConfig::default(),
            throttle: ThrottleConfig::default(),
            initial_position_pct: 0.0,
            min_order_size_usd: default_min_order_size_usd(),
            matching: MatchingMode::default(),
        }
    }
}
