//! Engine configuration module
//!
//! Holds the tunable knobs of the simulation engine. The risk constants are
//! hand-tuned against observed production incidents rather than derived from a
//! model, so they live here as explicit caller-owned configuration instead of
//! being buried in the scoring code.

use serde::{Deserialize, Serialize};

/// Target environment for a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Environment {
    /// Parse an environment tag, defaulting to dev for unknown values
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "prod" | "production" => Environment::Prod,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Dev,
        }
    }

    /// Additive score contribution of the environment
    pub fn risk_weight(self) -> u32 {
        match self {
            Environment::Dev => 0,
            Environment::Staging => 5,
            Environment::Prod => 10,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Dev => write!(f, "dev"),
            Environment::Staging => write!(f, "staging"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

/// Hand-tuned risk scoring constants
///
/// These are deliberate, calibrated values; change them only with production
/// evidence in hand.
#[derive(Debug, Clone)]
pub struct RiskTuning {
    /// Per-object weights feeding the dependency signal
    pub broken_weight: u32,
    pub direct_weight: u32,
    pub indirect_weight: u32,
    /// Dependency signal ceiling
    pub dependency_cap: u32,
    /// Extra score when any operation requires a table rewrite
    pub rewrite_score: u32,
    /// Score ceiling for metadata-only changes
    pub metadata_only_cap: u32,
    /// Score floor for high-dependency changes that also rewrite the table
    pub dangerous_floor: u32,
    /// Same floor when targeting prod
    pub dangerous_floor_prod: u32,
    /// Score floor when the dangerous combination also holds a HIGH lock
    pub critical_floor: u32,
    /// Level thresholds: below medium = LOW, below high = MEDIUM, ...
    pub medium_threshold: u32,
    pub high_threshold: u32,
    pub critical_threshold: u32,
}

impl Default for RiskTuning {
    fn default() -> Self {
        Self {
            broken_weight: 8,
            direct_weight: 2,
            indirect_weight: 1,
            dependency_cap: 40,
            rewrite_score: 20,
            metadata_only_cap: 24,
            dangerous_floor: 75,
            dangerous_floor_prod: 85,
            critical_floor: 90,
            medium_threshold: 30,
            high_threshold: 60,
            critical_threshold: 85,
        }
    }
}

/// Input caps
///
/// The impact analyzer re-scans every view/routine definition once per diff
/// entry, so unbounded scripts have quadratic worst-case cost. These caps keep
/// a runaway input from stalling a host process.
#[derive(Debug, Clone)]
pub struct EngineLimits {
    pub max_statements: usize,
    pub max_script_bytes: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_statements: 500,
            max_script_bytes: 1024 * 1024,
        }
    }
}

/// Complete engine settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub risk: RiskTuning,
    pub limits: EngineLimits,
    /// Schema assumed for unqualified table names
    pub default_schema: String,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            risk: RiskTuning::default(),
            limits: EngineLimits::default(),
            default_schema: "public".to_string(),
        }
    }

    /// Schema to assume when a statement leaves the table unqualified
    pub fn default_schema(&self) -> &str {
        if self.default_schema.is_empty() {
            "public"
        } else {
            &self.default_schema
        }
    }
}
