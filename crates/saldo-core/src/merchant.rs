//! Merchant canonicalization
//!
//! Raw merchant fields from bank exports carry store numbers, masked card
//! numbers, payment-channel prefixes and reference codes. The normalizer
//! reduces them to one canonical display name per merchant and a casefolded
//! chain key so different spellings of the same chain aggregate identically
//! in downstream analytics.
//!
//! All lookup tables are built once at construction and never mutated.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::{MerchantKind, NormalizedMerchant};

/// Display name used when a merchant field is an internal bank code and the
/// description yields nothing better
pub const UNKNOWN_MERCHANT: &str = "Ukjent brukersted";

/// Known raw spellings → canonical display name. Keys are lowercase; they
/// double as the brand lexicon for free-text extraction.
const ALIASES: &[(&str, &str)] = &[
    ("rema", "REMA 1000"),
    ("rema 1000", "REMA 1000"),
    ("kiwi", "KIWI"),
    ("meny", "MENY"),
    ("spar", "SPAR"),
    ("joker", "Joker"),
    ("bunnpris", "Bunnpris"),
    ("coop extra", "Coop Extra"),
    ("extra", "Coop Extra"),
    ("coop prix", "Coop Prix"),
    ("coop mega", "Coop Mega"),
    ("coop obs", "Coop Obs"),
    ("obs", "Coop Obs"),
    ("vinmonopolet", "Vinmonopolet"),
    ("circle k", "Circle K"),
    ("uno-x", "Uno-X"),
    ("esso", "Esso"),
    ("shell", "Shell"),
    ("st1", "St1"),
    ("netflix", "Netflix"),
    ("netflix.com", "Netflix"),
    ("spotify", "Spotify"),
    ("hbo max", "HBO Max"),
    ("viaplay", "Viaplay"),
    ("disney plus", "Disney+"),
    ("vipps", "Vipps"),
    ("ruter", "Ruter"),
    ("vy", "Vy"),
    ("flytoget", "Flytoget"),
    ("easypark", "EasyPark"),
    ("fjellinjen", "Fjellinjen"),
    ("sas", "SAS"),
    ("widerøe", "Widerøe"),
    ("ikea", "IKEA"),
    ("elkjøp", "Elkjøp"),
    ("power", "POWER"),
    ("komplett", "Komplett"),
    ("clas ohlson", "Clas Ohlson"),
    ("jysk", "JYSK"),
    ("biltema", "Biltema"),
    ("europris", "Europris"),
    ("h&m", "H&M"),
    ("h & m", "H&M"),
    ("zara", "Zara"),
    ("cubus", "Cubus"),
    ("dressmann", "Dressmann"),
    ("zalando", "Zalando"),
    ("apotek 1", "Apotek 1"),
    ("vitusapotek", "Vitusapotek"),
    ("boots apotek", "Boots Apotek"),
    ("sats", "SATS"),
    ("foodora", "Foodora"),
    ("wolt", "Wolt"),
    ("mcdonald's", "McDonald's"),
    ("mcdonalds", "McDonald's"),
    ("mcd", "McDonald's"),
    ("burger king", "Burger King"),
    ("peppes", "Peppes Pizza"),
    ("peppes pizza", "Peppes Pizza"),
    ("espresso house", "Espresso House"),
    ("telenor", "Telenor"),
    ("telia", "Telia"),
    ("tibber", "Tibber"),
    ("fjordkraft", "Fjordkraft"),
    ("skatteetaten", "Skatteetaten"),
];

/// Leading payment-channel markers stripped before merchant extraction
const PAYMENT_NOISE_PREFIXES: &[&str] = &[
    "visa",
    "mastercard",
    "bankaxept",
    "varekjøp",
    "kortkjøp",
    "korttransaksjon",
    "nettgiro",
    "avtalegiro",
    "efaktura",
    "betaling til",
    "betalt til",
    "til:",
    "fra:",
];

/// Filler tokens that never count as part of a merchant name
const FILLER_TOKENS: &[&str] = &["til", "fra", "og", "med", "nok", "kr", "as", "a/s"];

fn masked_card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*+\s?\d{2,6}").expect("masked card regex"))
}

fn rate_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bkurs:?\s*\d+[.,]\d+\s*$").expect("rate suffix regex"))
}

/// Leading dotted/segmented numeric reference code, optionally with a single
/// letter prefix, followed by a separator
fn reference_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z]?\d+(?:[./-]\d+)+[\s:]+").expect("reference prefix regex")
    })
}

fn normalize_space(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// True when the field is numeric/currency noise with no usable name
fn is_bank_code(text: &str) -> bool {
    let letters: String = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .collect::<String>()
        .to_lowercase();
    letters.is_empty() || letters == "kr" || letters == "nok" || letters == "ref"
}

/// Word-boundary substring check over lowercase text
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[start + needle.len()..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

/// Strip masked card numbers, exchange-rate suffixes and payment-channel
/// prefixes from statement text
pub(crate) fn strip_payment_noise(text: &str) -> String {
    let mut t = masked_card_re().replace_all(text.trim(), " ").into_owned();
    t = rate_suffix_re().replace_all(&t, "").into_owned();

    let mut changed = true;
    while changed {
        changed = false;
        let lower = t.trim_start().to_lowercase();
        for prefix in PAYMENT_NOISE_PREFIXES {
            if lower.starts_with(prefix) {
                let trimmed = t.trim_start();
                t = trimmed[prefix.len()..]
                    .trim_start_matches([' ', ':', '*', '-'])
                    .to_string();
                changed = true;
                break;
            }
        }
    }
    normalize_space(&t)
}

fn is_meaningful_token(token: &str) -> bool {
    token.chars().count() > 1
        && token.chars().any(|c| c.is_alphabetic())
        && !FILLER_TOKENS.contains(&token.to_lowercase().as_str())
}

/// Merchant normalizer with immutable alias and brand tables
pub struct MerchantNormalizer {
    aliases: HashMap<&'static str, &'static str>,
}

impl MerchantNormalizer {
    pub fn new() -> Self {
        Self {
            aliases: ALIASES.iter().copied().collect(),
        }
    }

    /// Exact alias lookup, then brand-token scan in table order
    fn canonical(&self, text: &str) -> Option<&'static str> {
        let lower = normalize_space(text).to_lowercase();
        if let Some(name) = self.aliases.get(lower.as_str()) {
            return Some(name);
        }
        ALIASES
            .iter()
            .find(|(needle, _)| contains_word(&lower, needle))
            .map(|(_, name)| *name)
    }

    /// Derive a merchant name from free statement text: strip payment noise,
    /// prefer a known brand, else keep the first 1–3 meaningful tokens
    pub(crate) fn merchant_from_text(&self, text: &str) -> Option<String> {
        let cleaned = strip_payment_noise(text);
        if cleaned.is_empty() {
            return None;
        }
        if let Some(name) = self.canonical(&cleaned) {
            return Some(name.to_string());
        }
        let tokens: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|t| is_meaningful_token(t))
            .take(3)
            .collect();
        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(" "))
        }
    }

    /// Canonicalize a merchant field, falling back to the description when
    /// the field is an internal bank code
    pub fn normalize(
        &self,
        merchant_field: Option<&str>,
        description: Option<&str>,
    ) -> NormalizedMerchant {
        let field = merchant_field.map(str::trim).filter(|s| !s.is_empty());

        if let Some(raw) = field {
            if is_bank_code(raw) {
                if let Some(name) = description.and_then(|d| self.merchant_from_text(d)) {
                    return NormalizedMerchant {
                        merchant: name,
                        merchant_raw: raw.to_string(),
                        merchant_kind: MerchantKind::Name,
                    };
                }
                return NormalizedMerchant {
                    merchant: UNKNOWN_MERCHANT.to_string(),
                    merchant_raw: raw.to_string(),
                    merchant_kind: MerchantKind::Code,
                };
            }
            let stripped = reference_prefix_re().replace(raw, "").into_owned();
            let merchant = self
                .canonical(&stripped)
                .map(str::to_string)
                .unwrap_or_else(|| normalize_space(&stripped));
            return NormalizedMerchant {
                merchant,
                merchant_raw: raw.to_string(),
                merchant_kind: MerchantKind::Name,
            };
        }

        let desc = description.map(str::trim).filter(|s| !s.is_empty());
        match desc.and_then(|d| self.merchant_from_text(d)) {
            Some(name) => NormalizedMerchant {
                merchant: name,
                merchant_raw: desc.unwrap_or_default().to_string(),
                merchant_kind: MerchantKind::Name,
            },
            None => NormalizedMerchant {
                merchant: UNKNOWN_MERCHANT.to_string(),
                merchant_raw: desc.unwrap_or_default().to_string(),
                merchant_kind: MerchantKind::Unknown,
            },
        }
    }

    /// Casefolded, store-id-insensitive grouping key
    pub fn chain_key(&self, merchant: &str) -> String {
        let canonical = self
            .canonical(merchant)
            .map(str::to_string)
            .unwrap_or_else(|| normalize_space(merchant));
        let lower = canonical.to_lowercase();
        let tokens: Vec<&str> = lower
            .split_whitespace()
            .filter(|t| !t.chars().any(|c| c.is_ascii_digit()))
            .collect();
        if tokens.is_empty() {
            lower
        } else {
            tokens.join(" ")
        }
    }
}

impl Default for MerchantNormalizer {
    fn default() -> Self {
        Self::new()
    }
}
