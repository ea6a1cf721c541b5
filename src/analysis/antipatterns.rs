//! Migration anti-pattern advisories
//!
//! Lightweight regex checks over the raw statements. These are advisory
//! strings only; they feed no score and block nothing. Statements arrive
//! already comment-stripped from the splitter.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_CONCURRENT_INDEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*create\s+(unique\s+)?index\b").unwrap()
});
static CONCURRENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bconcurrently\b").unwrap());
static DROP_TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*drop\s+table\b").unwrap());
static IF_EXISTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bif\s+exists\b").unwrap());
static DEFAULT_NOT_NULL_ADD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\badd\s+(column\s+)?\S+[^;]*\bdefault\b[^;]*\bnot\s+null\b|\badd\s+(column\s+)?\S+[^;]*\bnot\s+null\b[^;]*\bdefault\b").unwrap()
});
static CASCADE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bcascade\b").unwrap());
static ALTER_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\balter\s+column\s+\S+\s+(set\s+data\s+)?type\b").unwrap()
});

/// Scan split statements for known migration hazards
pub fn detect_antipatterns(statements: &[String]) -> Vec<String> {
    let mut findings = Vec::new();

    if statements
        .iter()
        .any(|s| NON_CONCURRENT_INDEX.is_match(s) && !CONCURRENT.is_match(s))
    {
        findings.push(
            "CREATE INDEX without CONCURRENTLY blocks writes for the whole build; \
             prefer CREATE INDEX CONCURRENTLY outside a transaction."
                .to_string(),
        );
    }

    if statements
        .iter()
        .any(|s| DROP_TABLE.is_match(s) && !IF_EXISTS.is_match(s))
    {
        findings.push(
            "DROP TABLE without IF EXISTS fails the whole script on a missing table; \
             add IF EXISTS for rerunnable migrations."
                .to_string(),
        );
    }

    if statements.iter().any(|s| DEFAULT_NOT_NULL_ADD.is_match(s)) {
        findings.push(
            "Adding a column with DEFAULT and NOT NULL in one statement can rewrite the table; \
             split into add, backfill, and constrain steps."
                .to_string(),
        );
    }

    if statements.iter().any(|s| CASCADE.is_match(s)) {
        findings.push(
            "CASCADE silently drops dependent objects; enumerate and drop them explicitly."
                .to_string(),
        );
    }

    if statements.iter().any(|s| ALTER_TYPE.is_match(s)) {
        findings.push(
            "ALTER COLUMN TYPE usually rewrites the table under ACCESS EXCLUSIVE; \
             consider a shadow column with a phased cutover."
                .to_string(),
        );
    }

    if statements.len() > 10 {
        findings.push(format!(
            "Script contains {} statements; large migrations are harder to review and roll back, \
             consider splitting by concern.",
            statements.len()
        ));
    }

    findings
}
