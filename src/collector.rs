use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;
use tracing::debug;

use crate::browser::Browser;
use crate::extract::{extract_card, CardOutcome, DedupIndex, SkipReason};
use crate::sections::Section;
use crate::store::Item;

pub const CARD_SELECTOR: &str = "[class*='product-card']";
pub const PAGE_EXTENT_SCRIPT: &str = "return document.body.scrollHeight";
const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body.scrollHeight);";

pub const MAX_SCROLLS: usize = 100;
pub const MAX_SECTION_ITEMS: usize = 1000;
/// Consecutive no-growth scrolls that count as end of list.
pub const MAX_STALLED_SCROLLS: u32 = 5;

/// Lazy content needs time to materialize after a scroll.
const SCROLL_SETTLE: Duration = Duration::from_millis(1500);
const NAV_SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Growth {
    Grown,
    NotGrown,
}

/// Classifies one scroll step by whether the page extent strictly grew.
/// A flaky non-growth reading is indistinguishable from real exhaustion
/// here; the collector's stall counter absorbs both.
pub struct GrowthDetector {
    settle: Duration,
}

impl GrowthDetector {
    pub fn new() -> Self {
        Self { settle: SCROLL_SETTLE }
    }

    pub async fn step<B: Browser>(&self, browser: &B) -> Result<Growth> {
        let before = page_extent(browser).await?;
        browser.evaluate(SCROLL_SCRIPT).await?;
        sleep(self.settle).await;
        let after = page_extent(browser).await?;
        Ok(if after > before { Growth::Grown } else { Growth::NotGrown })
    }
}

async fn page_extent<B: Browser>(browser: &B) -> Result<i64> {
    let value = browser.evaluate(PAGE_EXTENT_SCRIPT).await?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .with_context(|| format!("page extent was not numeric: {}", value))
}

/// What one section's collection did, aggregated from per-card outcomes.
#[derive(Debug)]
pub struct SectionReport {
    pub label: String,
    pub new_items: usize,
    pub scrolls: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Ended on the stall counter rather than a scroll/item cap.
    pub stalled_out: bool,
}

impl SectionReport {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            new_items: 0,
            scrolls: 0,
            duplicates: 0,
            rejected: 0,
            failed: 0,
            stalled_out: false,
        }
    }

    fn note_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Duplicate => self.duplicates += 1,
            SkipReason::TooShort | SkipReason::NoName => self.rejected += 1,
        }
    }
}

/// Scroll one section to exhaustion, extracting every visible card after
/// each growth step. Accepted items land in `items`; `dedup` is the only
/// guard against re-counting cards across re-enumerations and sections.
pub async fn collect_section<B: Browser>(
    browser: &B,
    section: &Section,
    items: &mut Vec<Item>,
    dedup: &mut DedupIndex,
) -> Result<SectionReport> {
    browser
        .navigate(&section.url)
        .await
        .with_context(|| format!("navigating to {}", section.url))?;
    sleep(NAV_SETTLE).await;

    let detector = GrowthDetector::new();
    let mut report = SectionReport::new(&section.label);
    let mut stalled = 0u32;

    let pb = ProgressBar::new(MAX_SCROLLS as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} scroll {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    while report.scrolls < MAX_SCROLLS && report.new_items < MAX_SECTION_ITEMS {
        let growth = detector.step(browser).await?;
        report.scrolls += 1;
        pb.inc(1);

        match growth {
            Growth::Grown => {
                stalled = 0;
                // Full re-fetch every time: new cards are not reliably
                // distinguishable from old ones at the DOM level.
                let added = sweep(browser, section, items, dedup, &mut report).await?;
                debug!(
                    "scroll {}: {} new items ({} total for section)",
                    report.scrolls, added, report.new_items
                );
                pb.set_message(format!("{} items", report.new_items));
            }
            Growth::NotGrown => {
                stalled += 1;
                debug!("scroll {}: no growth ({}/{})", report.scrolls, stalled, MAX_STALLED_SCROLLS);
                pb.set_message(format!("no growth {}/{}", stalled, MAX_STALLED_SCROLLS));
                if stalled >= MAX_STALLED_SCROLLS {
                    report.stalled_out = true;
                    break;
                }
            }
        }
    }

    // Catch content rendered after the last growth step.
    sweep(browser, section, items, dedup, &mut report).await?;
    pb.finish_and_clear();
    Ok(report)
}

/// Enumerate the currently visible cards and run the heuristic over all of
/// them, appending accepted items.
async fn sweep<B: Browser>(
    browser: &B,
    section: &Section,
    items: &mut Vec<Item>,
    dedup: &mut DedupIndex,
    report: &mut SectionReport,
) -> Result<usize> {
    let cards = browser.cards(CARD_SELECTOR).await?;
    let mut added = 0;
    for card in &cards {
        match extract_card(card, &section.label, dedup).await {
            CardOutcome::Extracted(item) => {
                items.push(item);
                added += 1;
                report.new_items += 1;
            }
            CardOutcome::Skipped(reason) => report.note_skip(reason),
            CardOutcome::Failed(e) => {
                report.failed += 1;
                debug!("card unreadable: {:#}", e);
            }
        }
    }
    Ok(added)
}

// ── Tests ──
