// warden-core/src/domain/governance/validator.rs

// Decides from real values whether a column is protected. Name-based guesses never
// count as evidence here.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::domain::governance::pii::ProtectionRequirement;
use crate::domain::project::PolicyConfig;

static BASE64_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").ok());
static HEX_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(0x|0X)?[0-9a-fA-F]+$").ok());

const ENCRYPTION_PREFIXES: &[&str] = &[
    "enc::",
    "enc:",
    "ENC(",
    "vault:v",
    "$aes$",
    "aes256:",
    "kms:",
    "AQICAH",
    "-----BEGIN PGP",
];
const MASK_CHARS: &[char] = &['*', '#', '•'];
const MIN_MASK_RUN: usize = 3;
const REDACTION_TOKENS: &[&str] = &["[REDACTED]", "REDACTED", "***"];
const MIN_ENTROPY_LEN: usize = 20;
const MAX_REPORTED_SAMPLES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionSignal {
    Base64,
    Hex,
    EncryptionPrefix,
    HighEntropy,
    MaskingArtifact,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatorConfig {
    pub protected_ratio: f64,
    pub entropy_threshold: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            protected_ratio: 0.8,
            entropy_threshold: 4.5,
        }
    }
}

impl From<&PolicyConfig> for ValidatorConfig {
    fn from(policy: &PolicyConfig) -> Self {
        Self {
            protected_ratio: policy.protected_ratio,
            entropy_threshold: policy.entropy_threshold,
        }
    }
}

/// Shannon entropy in bits per character.
pub fn shannon_entropy(value: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut total = 0usize;
    for c in value.chars() {
        *counts.entry(c).or_insert(0) += 1;
        total += 1;
    }
    if total == 0 {
        return 0.0;
    }
    let len = total as f64;
    counts
        .values()
        .map(|&n| {
            let p = n as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn looks_base64(value: &str) -> bool {
    if value.len() < 8 || value.len() % 4 != 0 {
        return false;
    }
    if !BASE64_RE.as_ref().is_some_and(|re| re.is_match(value)) {
        return false;
    }
    if STANDARD.decode(value).is_err() {
        return false;
    }
    // Plain words and digit runs also fit the alphabet.
    let padded = value.ends_with('=');
    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
    let has_digit_or_symbol = value
        .chars()
        .any(|c| c.is_ascii_digit() || c == '+' || c == '/');
    padded || (has_upper && has_lower && has_digit_or_symbol)
}

fn looks_hex(value: &str) -> bool {
    let prefixed = value.starts_with("0x") || value.starts_with("0X");
    let digits = if prefixed { &value[2..] } else { value };
    if digits.len() < 16 || digits.len() % 2 != 0 {
        return false;
    }
    if !HEX_RE.as_ref().is_some_and(|re| re.is_match(value)) {
        return false;
    }
    // Card and account numbers are all decimal digits.
    prefixed || digits.chars().any(|c| c.is_ascii_alphabetic())
}

fn longest_run(value: &str, matches: impl Fn(char) -> bool) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for c in value.chars() {
        run = if matches(c) { run + 1 } else { 0 };
        longest = longest.max(run);
    }
    longest
}

fn looks_masked(value: &str) -> bool {
    if REDACTION_TOKENS.contains(&value) {
        return true;
    }
    let total = value.chars().count();
    let masked = value.chars().filter(|c| MASK_CHARS.contains(c)).count();
    if masked >= 2 && masked * 2 >= total {
        return true;
    }
    if longest_run(value, |c| MASK_CHARS.contains(&c)) >= MIN_MASK_RUN {
        return true;
    }
    // `XXXX-1234`, `xxx-xx-6789`: every letter is part of the mask.
    let is_x = |c: char| c == 'x' || c == 'X';
    value.chars().filter(|c| c.is_alphabetic()).all(is_x)
        && longest_run(value, is_x) >= MIN_MASK_RUN
}

/// Why a single value counts as protected, if it does.
pub fn protection_signal(
    value: &str,
    requirement: ProtectionRequirement,
    entropy_threshold: f64,
) -> Option<ProtectionSignal> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if ENCRYPTION_PREFIXES.iter().any(|p| value.starts_with(p)) {
        return Some(ProtectionSignal::EncryptionPrefix);
    }
    if looks_hex(value) {
        return Some(ProtectionSignal::Hex);
    }
    if looks_base64(value) {
        return Some(ProtectionSignal::Base64);
    }
    if value.chars().count() >= MIN_ENTROPY_LEN && shannon_entropy(value) > entropy_threshold {
        return Some(ProtectionSignal::HighEntropy);
    }
    if requirement.masking && looks_masked(value) {
        return Some(ProtectionSignal::MaskingArtifact);
    }
    None
}

/// First characters of a value, safe to put in logs and issue descriptions.
pub fn redact_sample(value: &str) -> String {
    let total = value.chars().count();
    let visible = if total > 8 { 4 } else { total / 2 };
    let head: String = value.chars().take(visible).collect();
    format!("{}…", head)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixVerdict {
    pub is_fixed: bool,
    pub reason: String,
    pub sampled: usize,
    pub protected: usize,
    pub protected_ratio: f64,
    /// At most two, redacted.
    pub unprotected_samples: Vec<String>,
}

impl FixVerdict {
    fn fixed(reason: &str) -> Self {
        Self {
            is_fixed: true,
            reason: reason.to_string(),
            sampled: 0,
            protected: 0,
            protected_ratio: 1.0,
            unprotected_samples: vec![],
        }
    }
}

pub fn evaluate_samples(
    samples: &[String],
    requirement: ProtectionRequirement,
    config: &ValidatorConfig,
) -> FixVerdict {
    if requirement.is_monitoring() {
        return FixVerdict::fixed("no protection required");
    }
    let values: Vec<&str> = samples
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if values.is_empty() {
        return FixVerdict::fixed("no data to protect");
    }

    let mut protected = 0;
    let mut unprotected_samples = Vec::new();
    for value in &values {
        if protection_signal(value, requirement, config.entropy_threshold).is_some() {
            protected += 1;
        } else if unprotected_samples.len() < MAX_REPORTED_SAMPLES {
            unprotected_samples.push(redact_sample(value));
        }
    }

    let ratio = protected as f64 / values.len() as f64;
    let is_fixed = ratio >= config.protected_ratio;
    let reason = format!(
        "{}/{} sampled values look protected ({:.0}%, required {:.0}%)",
        protected,
        values.len(),
        ratio * 100.0,
        config.protected_ratio * 100.0
    );

    FixVerdict {
        is_fixed,
        reason,
        sampled: values.len(),
        protected,
        protected_ratio: ratio,
        unprotected_samples,
    }
}
