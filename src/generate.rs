//! Constraint-satisfying synthetic records.
//!
//! For every field of an [`EntitySchema`] the generator draws one value that
//! independently satisfies that field's constraints. String fields prefer
//! realism: a declared [`SemanticHint`] (or, absent one, a shape sniffed from
//! the pattern text) selects a heuristic producing realistic emails, URLs,
//! digit strings, or natural text; only when no heuristic applies does the
//! generator fall back to synthesizing text directly from the pattern.
//! Naive pattern synthesis is technically valid but yields gibberish for
//! common shapes, which is why the heuristics run first.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::schema::{EntitySchema, FieldKind, FieldSpec, SemanticHint};
use crate::store::Document;

const WORDS: &[&str] = &[
    "amber", "basin", "cedar", "delta", "ember", "fjord", "grove", "harbor", "island", "juniper",
    "kernel", "lantern", "meadow", "nimbus", "orchard", "prairie", "quarry", "ridge", "summit",
    "timber", "umbra", "valley", "willow", "yonder", "zephyr",
];

const NAMES: &[&str] = &[
    "ada", "grace", "alan", "edsger", "barbara", "donald", "tony", "radia", "ken", "dennis",
];

const DOMAINS: &[&str] = &["example.com", "example.org", "mail.test", "inbox.dev"];

/// Generate one record satisfying every field constraint of `schema`.
#[must_use]
pub fn synthesize(schema: &EntitySchema) -> Document {
    let mut rng = rand::thread_rng();
    let mut doc = Map::new();
    for (name, spec) in schema.fields() {
        doc.insert(name.to_string(), field_value(&mut rng, spec));
    }
    doc
}

/// Generate `count` records.
#[must_use]
pub fn synthesize_many(schema: &EntitySchema, count: usize) -> Vec<Document> {
    (0..count).map(|_| synthesize(schema)).collect()
}

fn field_value(rng: &mut impl Rng, spec: &FieldSpec) -> Value {
    match spec.kind {
        FieldKind::String => Value::String(string_value(rng, spec)),
        FieldKind::Number => number_value(rng, spec),
        FieldKind::Boolean => Value::Bool(rng.gen_bool(0.5)),
        FieldKind::Date => Value::String(past_date(rng)),
        FieldKind::Reference => Value::String(Uuid::new_v4().to_string()),
        FieldKind::StringArray => {
            let len = rng.gen_range(1..=3);
            Value::Array(
                (0..len)
                    .map(|_| Value::String(pick(rng, WORDS).to_string()))
                    .collect(),
            )
        }
        FieldKind::Any => Value::String(pick(rng, WORDS).to_string()),
    }
}

/// Numbers draw uniformly from `[min, max]`, defaulting to `[0, 100]`.
/// Whole-number bounds produce whole values for realism.
fn number_value(rng: &mut impl Rng, spec: &FieldSpec) -> Value {
    let min = spec.min.unwrap_or(0.0);
    let max = spec.max.unwrap_or(100.0).max(min);
    let drawn = rng.gen_range(min..=max);
    let drawn = if min.fract() == 0.0 && max.fract() == 0.0 {
        drawn.round().clamp(min, max)
    } else {
        drawn
    };
    serde_json::Number::from_f64(drawn).map_or(Value::Null, Value::Number)
}

/// A random instant from the past five years, RFC 3339.
fn past_date(rng: &mut impl Rng) -> String {
    let back = chrono::Duration::seconds(rng.gen_range(0..5 * 365 * 24 * 3600));
    (chrono::Utc::now() - back).to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn string_value(rng: &mut impl Rng, spec: &FieldSpec) -> String {
    let hint = spec
        .hint
        .or_else(|| spec.pattern.as_ref().and_then(|rule| sniff_hint(rule.regex.as_str())));

    let candidate = match hint {
        Some(SemanticHint::Email) => email(rng, spec),
        Some(SemanticHint::Url) => url(rng, spec),
        Some(SemanticHint::Numeric) => digits(rng, spec),
        Some(SemanticHint::FreeText) | None => free_text(rng, spec),
    };

    // The heuristic picks the shape; the declared constraints decide. A
    // candidate the pattern or length bounds reject is replaced by a value
    // sampled from the pattern itself.
    if satisfies_string_constraints(&candidate, spec) {
        return candidate;
    }
    match &spec.pattern {
        Some(rule) => from_pattern(rng, rule.regex.as_str(), spec),
        None => candidate,
    }
}

fn satisfies_string_constraints(text: &str, spec: &FieldSpec) -> bool {
    if let Some(rule) = &spec.pattern {
        if !rule.regex.is_match(text) {
            return false;
        }
    }
    let len = text.chars().count();
    spec.min_length.is_none_or(|min| len >= min) && spec.max_length.is_none_or(|max| len <= max)
}

/// Infer a generation shape from the textual form of a pattern. Fallback
/// only: a declared [`SemanticHint`] always wins, since substring sniffing
/// misclassifies unusual patterns.
fn sniff_hint(pattern: &str) -> Option<SemanticHint> {
    if pattern.contains('@') {
        Some(SemanticHint::Email)
    } else if pattern.contains("http") || pattern.contains("www") {
        Some(SemanticHint::Url)
    } else if (pattern.contains("\\d") || pattern.contains("0-9"))
        && !pattern.contains("a-z")
        && !pattern.contains("A-Z")
    {
        Some(SemanticHint::Numeric)
    } else if pattern.contains("a-z") && pattern.contains("\\s") {
        Some(SemanticHint::FreeText)
    } else {
        None
    }
}

fn email(rng: &mut impl Rng, spec: &FieldSpec) -> String {
    let mut candidate = format!(
        "{}.{}{}@{}",
        pick(rng, NAMES),
        pick(rng, WORDS),
        rng.gen_range(1..100),
        pick(rng, DOMAINS),
    );
    if let Some(max) = spec.max_length {
        if candidate.len() > max {
            // Shortest realistic form that still reads as an address.
            candidate = format!("{}@{}", pick(rng, NAMES), pick(rng, DOMAINS));
        }
    }
    if let Some(min) = spec.min_length {
        // Pad the local part; the tail of the address stays untouched.
        while candidate.chars().count() < min {
            candidate.insert(0, char::from(b'a' + rng.gen_range(0..26u8)));
        }
    }
    candidate
}

fn url(rng: &mut impl Rng, spec: &FieldSpec) -> String {
    let mut candidate = format!("https://www.{}.com/{}", pick(rng, WORDS), pick(rng, WORDS));
    if let Some(max) = spec.max_length {
        if candidate.len() > max {
            candidate = format!("https://{}.com", pick(rng, WORDS));
            candidate.truncate(max);
        }
    }
    if let Some(min) = spec.min_length {
        while candidate.len() < min {
            candidate.push_str("/page");
        }
    }
    candidate
}

fn digits(rng: &mut impl Rng, spec: &FieldSpec) -> String {
    let len = spec.min_length.unwrap_or(6).max(1);
    let len = spec.max_length.map_or(len, |max| len.min(max.max(1)));
    (0..len).map(|_| char::from(b'0' + rng.gen_range(0..10u8))).collect()
}

/// Trimmed natural-language text within the declared length bounds: sentences
/// are appended until the minimum is met, then the text is truncated at a
/// word boundary if it overruns the maximum.
fn free_text(rng: &mut impl Rng, spec: &FieldSpec) -> String {
    let min = spec.min_length.unwrap_or(0);
    let max = spec.max_length;

    let mut text = sentence(rng);
    while text.chars().count() < min {
        text.push(' ');
        text.push_str(&sentence(rng));
    }

    if let Some(max) = max {
        if text.chars().count() > max {
            let cut: String = text.chars().take(max).collect();
            text = match cut.rfind(' ') {
                Some(boundary) if boundary >= min => cut[..boundary].to_string(),
                _ => cut,
            };
        }
    }
    text.trim().to_string()
}

fn sentence(rng: &mut impl Rng) -> String {
    let len = rng.gen_range(4..=8);
    let mut words: Vec<&str> = (0..len).map(|_| pick(rng, WORDS)).collect();
    let mut first = words[0].to_string();
    if let Some(initial) = first.get_mut(0..1) {
        initial.make_ascii_uppercase();
    }
    words[0] = "";
    format!("{}{}.", first, words.join(" "))
}

/// Pattern-directed fallback: sample a string from the regex itself. Anchors
/// are stripped before compilation since the sampler rejects them. A pattern
/// the sampler cannot compile degrades to free text.
fn from_pattern(rng: &mut impl Rng, pattern: &str, spec: &FieldSpec) -> String {
    let trimmed = pattern.trim_start_matches('^').trim_end_matches('$');
    match rand_regex::Regex::compile(trimmed, 16) {
        Ok(sampler) => rng.sample::<String, _>(&sampler),
        Err(_) => free_text(rng, spec),
    }
}

fn pick<'a>(rng: &mut impl Rng, pool: &'a [&'a str]) -> &'a str {
    pool.choose(rng).copied().unwrap_or("plain")
}
