//! Migration analysis: blast radius, lock estimation, risk scoring and
//! advisory checks

pub mod antipatterns;
pub mod impact;
pub mod lock;
pub mod risk;

pub use antipatterns::detect_antipatterns;
pub use impact::{analyze_impact, ImpactReport, ReferenceMatcher, TextualReferenceMatcher};
pub use lock::{estimate_locks, LockImpact, LockSeverity, LockType};
pub use risk::{score_risk, RiskLevel, RiskScore};
