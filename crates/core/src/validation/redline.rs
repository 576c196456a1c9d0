//! Redline scan over outgoing advisory text.
//!
//! Any hit rejects the answer regardless of its confidence score.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Azerbaijani mobile/landline numbers, `+`-prefixed international numbers and
/// separated ten-digit numbers.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:\+994|\b0)[\s.-]?\(?\d{2}\)?[\s.-]?\d{3}[\s.-]?\d{2}[\s.-]?\d{2}\b|\+\d{1,3}[\s.-]?\(?\d{2,4}\)?[\s.-]?\d{3,4}[\s.-]?\d{3,4}\b|\(?\b\d{3}\)?[\s.-]\d{3}[\s.-]\d{4}\b",
    )
    .expect("phone pattern compiles")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern compiles")
});

static IBAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z]{2}\d{2}\s?[A-Z0-9]{4}(?:\s?[A-Z0-9]{4}){2,6}(?:\s?[A-Z0-9]{1,4})?\b")
        .expect("iban pattern compiles")
});

static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b").expect("card pattern compiles")
});

/// Pesticides banned under the Stockholm/Rotterdam lists that advice must never name.
static BANNED_SUBSTANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:ddt|endosulfan|paraquat|methyl\s+bromide|aldicarb|lindane|carbofuran|monocrotophos)\b",
    )
    .expect("substance pattern compiles")
});

static PROMPT_LEAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)system\s+prompt|<<\s*sys\s*>>|\[/?inst\]|as an ai language model|my instructions|ignore (?:all )?previous instructions",
    )
    .expect("leakage pattern compiles")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedlineReason {
    PhoneNumber,
    EmailAddress,
    FinancialIdentifier,
    BannedSubstance,
    PromptLeakage,
}

impl RedlineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhoneNumber => "phone_number",
            Self::EmailAddress => "email_address",
            Self::FinancialIdentifier => "financial_identifier",
            Self::BannedSubstance => "banned_substance",
            Self::PromptLeakage => "prompt_leakage",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedlineViolation {
    pub reason: RedlineReason,
    /// Masked so the audit trail never stores the identifier itself.
    pub excerpt: String,
}

/// Returns every redline hit in `text`, in scan order.
pub fn scan(text: &str) -> Vec<RedlineViolation> {
    let patterns: [(&LazyLock<Regex>, RedlineReason); 6] = [
        (&PHONE_RE, RedlineReason::PhoneNumber),
        (&EMAIL_RE, RedlineReason::EmailAddress),
        (&IBAN_RE, RedlineReason::FinancialIdentifier),
        (&CARD_RE, RedlineReason::FinancialIdentifier),
        (&BANNED_SUBSTANCE_RE, RedlineReason::BannedSubstance),
        (&PROMPT_LEAK_RE, RedlineReason::PromptLeakage),
    ];

    patterns
        .iter()
        .flat_map(|(pattern, reason)| {
            pattern.find_iter(text).map(move |found| RedlineViolation {
                reason: *reason,
                excerpt: mask(found.as_str(), *reason),
            })
        })
        .collect()
}

fn mask(found: &str, reason: RedlineReason) -> String {
    match reason {
        RedlineReason::BannedSubstance | RedlineReason::PromptLeakage => found.to_string(),
        _ => {
            let visible = found.chars().take(2).collect::<String>();
            format!("{visible}***")
        }
    }
}
