use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::browser::Card;
use crate::store::Item;

pub const PRICE_SELECTOR: &str = "span[data-test='fop-price']";
pub const PROMO_SELECTOR: &str = "span[data-test='fop-offer-text']";

const MIN_CARD_TEXT_LEN: usize = 10;
const MIN_NAME_LEN: usize = 3;

/// Lines containing any of these are never product names.
const RESERVED_WORDS: &[&str] = &["add", "cart", "price"];

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?\s*(?:g|kg|lb|oz|ml|l|pack|ct|count|each|pc|lbs))").unwrap()
});

/// Run-scoped set of accepted product names, first-seen wins. Created once
/// per run (seeded from replayed records on resume) and threaded through
/// every section so re-enumerated cards cannot double-count.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// True and records the name on first occurrence, false thereafter.
    pub fn accept(&mut self, name: &str) -> bool {
        self.seen.insert(name.to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SkipReason {
    /// Card text too short or with no meaningful line.
    TooShort,
    /// No line qualified as a product name.
    NoName,
    /// Name already accepted earlier in the run.
    Duplicate,
}

/// Outcome of running the heuristic over one card. Nothing is swallowed:
/// the collector tallies every variant into its section report.
pub enum CardOutcome {
    Extracted(Item),
    Skipped(SkipReason),
    Failed(anyhow::Error),
}

/// Turn one raw card into at most one product record.
///
/// Only an unreadable card or a missing name rejects the card; a missing or
/// malformed price/size/promotion degrades that field to its default.
pub async fn extract_card<C: Card>(
    card: &C,
    category: &str,
    dedup: &mut DedupIndex,
) -> CardOutcome {
    let text = match card.text().await {
        Ok(t) => t,
        Err(e) => return CardOutcome::Failed(e),
    };

    let text = text.trim();
    if text.chars().count() < MIN_CARD_TEXT_LEN {
        return CardOutcome::Skipped(SkipReason::TooShort);
    }
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return CardOutcome::Skipped(SkipReason::TooShort);
    }

    let Some(name) = pick_name(&lines) else {
        return CardOutcome::Skipped(SkipReason::NoName);
    };
    if !dedup.accept(name) {
        return CardOutcome::Skipped(SkipReason::Duplicate);
    }

    let price = match card.sub_text(PRICE_SELECTOR).await {
        Ok(Some(t)) => parse_price(t.trim()),
        _ => 0.0,
    };
    let size = lines
        .iter()
        .find_map(|line| SIZE_RE.captures(line))
        .map(|caps| caps[1].to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let promotion = match card.sub_text(PROMO_SELECTOR).await {
        Ok(Some(t)) if !t.trim().is_empty() => Some(t.trim().to_string()),
        _ => None,
    };

    CardOutcome::Extracted(Item {
        name: name.to_string(),
        price,
        size,
        unit_price: None,
        category: category.to_string(),
        has_price: price > 0.0,
        promotion,
    })
}

/// First line long enough that mentions none of the reserved words.
fn pick_name<'a>(lines: &[&'a str]) -> Option<&'a str> {
    lines.iter().copied().find(|line| {
        let lower = line.to_lowercase();
        line.chars().count() >= MIN_NAME_LEN
            && !RESERVED_WORDS.iter().any(|word| lower.contains(word))
    })
}

/// "$1.49" → 1.49; anything unprefixed, unparseable, or negative → 0.0.
fn parse_price(text: &str) -> f64 {
    text.strip_prefix('$')
        .and_then(|rest| rest.trim().parse::<f64>().ok())
        .filter(|p| *p >= 0.0)
        .unwrap_or(0.0)
}

// ── Tests ──
