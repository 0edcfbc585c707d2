// src/address.rs
//! Address normalizer for single-line US addresses.
//!
//! - [`normalize`] pulls out ZIP, state, city, number, directional prefix and
//!   suffix, and builds a canonical "4507 Knap Hollow" style string.
//! - [`normalize_simple`] only upper-cases, collapses whitespace and expands
//!   abbreviations in place. Cheap, used for similarity.
//! - [`similarity`] is token-set Jaccard on simplified strings.
//!
//! Nothing here fails: malformed text degrades to `None` components.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// (abbreviation, full word), upper-case.
const STREET_SUFFIXES: &[(&str, &str)] = &[
    ("ST", "STREET"),
    ("AVE", "AVENUE"),
    ("AV", "AVENUE"),
    ("RD", "ROAD"),
    ("DR", "DRIVE"),
    ("LN", "LANE"),
    ("BLVD", "BOULEVARD"),
    ("CT", "COURT"),
    ("PL", "PLACE"),
    ("CIR", "CIRCLE"),
    ("PKWY", "PARKWAY"),
    ("TRL", "TRAIL"),
    ("WAY", "WAY"),
    ("HOLW", "HOLLOW"),
    ("CV", "COVE"),
    ("TER", "TERRACE"),
    ("TERR", "TERRACE"),
    ("HWY", "HIGHWAY"),
    ("XING", "CROSSING"),
];

const STREET_PREFIXES: &[(&str, &str)] = &[
    ("N", "NORTH"),
    ("S", "SOUTH"),
    ("E", "EAST"),
    ("W", "WEST"),
];

const STATES: &[&str] = &["TX", "CA", "NY", "FL", "IL"];

const MAX_CITY_WORDS: usize = 3;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static RE_ZIP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ ,](\d{5})(?:-\d{4})?$").expect("zip regex"));
static RE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+[A-Z]?$").expect("street number regex"));
static RE_ABBREV: Lazy<Regex> = Lazy::new(|| {
    let alts: Vec<&str> = STREET_SUFFIXES
        .iter()
        .chain(STREET_PREFIXES.iter())
        .map(|(abbr, _)| *abbr)
        .collect();
    Regex::new(&format!(r"\b({})\b\.?", alts.join("|"))).expect("abbreviation regex")
});

/// Structured components. Prefix and suffix are stored lower-case full words,
/// street name and city upper-case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedAddress {
    pub street_number: Option<String>,
    pub street_prefix: Option<String>,
    pub street_name: Option<String>,
    pub street_suffix: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub normalized: String,
}

fn clean(input: &str) -> String {
    RE_WS.replace_all(input.trim(), " ").to_uppercase()
}

fn suffix_full(token: &str) -> Option<&'static str> {
    let t = token.trim_end_matches('.');
    STREET_SUFFIXES
        .iter()
        .find(|(abbr, full)| *abbr == t || *full == t)
        .map(|(_, full)| *full)
}

fn prefix_full(token: &str) -> Option<&'static str> {
    let t = token.trim_end_matches('.');
    STREET_PREFIXES
        .iter()
        .find(|(abbr, _)| *abbr == t)
        .map(|(_, full)| *full)
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn trim_punct(s: &str) -> &str {
    s.trim().trim_end_matches([',', ' ']).trim()
}

/// Parse a free-text address into components.
pub fn normalize(address: Option<&str>) -> NormalizedAddress {
    let mut out = NormalizedAddress::default();
    let mut rest = match address {
        Some(a) if !a.trim().is_empty() => clean(a),
        _ => return out,
    };

    // ZIP: only a trailing token with something before it. A leading
    // five-digit run is a house number.
    if let Some(caps) = RE_ZIP.captures(&rest) {
        if let (Some(whole), Some(zip)) = (caps.get(0), caps.get(1)) {
            out.zip_code = Some(zip.as_str().to_string());
            rest = trim_punct(&rest[..whole.start()]).to_string();
        }
    }

    // State: trailing allow-listed two-letter token.
    if let Some((head, last)) = rest.rsplit_once(' ') {
        let last = last.trim_end_matches([',', '.']);
        if STATES.contains(&last) {
            out.state = Some(last.to_string());
            rest = trim_punct(head).to_string();
        }
    }

    if out.state.is_some() {
        if let Some((street, city)) = rest.rsplit_once(',') {
            let city = city.trim();
            if !city.is_empty() {
                out.city = Some(city.to_string());
            }
            rest = trim_punct(street).to_string();
        } else if let Some((street, city)) = split_trailing_city(&rest) {
            out.city = Some(city);
            rest = street;
        }
    }

    let mut tokens: Vec<&str> = rest.split(' ').filter(|t| !t.is_empty()).collect();

    if tokens.len() > 1 && RE_NUMBER.is_match(tokens[0]) {
        out.street_number = Some(tokens.remove(0).to_string());
    }

    if tokens.len() > 1 {
        if let Some(full) = prefix_full(tokens[0]) {
            out.street_prefix = Some(full.to_lowercase());
            tokens.remove(0);
        }
    }

    if tokens.len() > 1 {
        if let Some(full) = tokens.last().and_then(|t| suffix_full(t)) {
            out.street_suffix = Some(full.to_lowercase());
            tokens.pop();
        }
    }

    let name = tokens.join(" ");
    let name = name.trim_matches([',', ' ']);
    if !name.is_empty() {
        out.street_name = Some(name.to_string());
    }

    let mut parts: Vec<String> = Vec::with_capacity(4);
    if let Some(n) = &out.street_number {
        parts.push(n.clone());
    }
    if let Some(p) = &out.street_prefix {
        parts.push(title_case(p));
    }
    if let Some(n) = &out.street_name {
        parts.push(title_case(n));
    }
    if let Some(s) = &out.street_suffix {
        parts.push(title_case(s));
    }
    out.normalized = parts.join(" ");
    out
}

/// Comma-less "123 MAIN ST AUSTIN": the city is the run of at most three words
/// after the last street suffix. Without a suffix we cannot tell street from city.
fn split_trailing_city(rest: &str) -> Option<(String, String)> {
    let tokens: Vec<&str> = rest.split(' ').collect();
    let suffix_at = tokens
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .find(|(_, t)| suffix_full(t).is_some())
        .map(|(i, _)| i)?;
    let city = &tokens[suffix_at + 1..];
    if city.is_empty() || city.len() > MAX_CITY_WORDS {
        return None;
    }
    Some((tokens[..=suffix_at].join(" "), city.join(" ")))
}

/// Upper-case, collapse whitespace, expand suffix/prefix abbreviations in place.
pub fn normalize_simple(address: &str) -> String {
    let cleaned = clean(address);
    RE_ABBREV
        .replace_all(&cleaned, |caps: &Captures| {
            let abbr = &caps[1];
            suffix_full(abbr)
                .or_else(|| prefix_full(abbr))
                .unwrap_or(abbr)
                .to_string()
        })
        .into_owned()
}

fn token_set(simple: &str) -> HashSet<String> {
    simple
        .split(' ')
        .map(|t| t.trim_end_matches([',', '.']).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Symmetric similarity in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let na = normalize_simple(a);
    let nb = normalize_simple(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }
    let ta = token_set(&na);
    let tb = token_set(&nb);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let inter = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    inter as f64 / union as f64
}
