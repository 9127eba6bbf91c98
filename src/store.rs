use std::collections::HashMap;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CHECKPOINT_FILE: &str = "voila_focused_groceries_progress.csv";
pub const BUDGET_CHECKPOINT_FILE: &str = "voila_budget_items_progress.csv";
pub const FINAL_FILE: &str = "voila_focused_groceries_FINAL.csv";
pub const BUDGET_FINAL_FILE: &str = "voila_budget_items_FINAL.csv";

/// An item is a budget item at or below this price.
pub const BUDGET_PRICE_CEILING: f64 = 5.0;

static UNSAFE_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\-.]").unwrap());

/// One accepted product record. Field order is the artifact column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub price: f64,
    pub size: String,
    /// Reserved: the storefront does not expose a usable per-unit price yet.
    pub unit_price: Option<f64>,
    pub category: String,
    pub has_price: bool,
    pub promotion: Option<String>,
}

/// Artifact file name for a category label: lowercased, with everything
/// outside `[\w.-]` replaced by `_`.
pub fn section_file_name(label: &str) -> String {
    let lowered = label.to_lowercase();
    let safe = UNSAFE_CHARS_RE.replace_all(&lowered, "_");
    format!("voila_{}.csv", safe)
}

/// CSV-backed result store. All artifacts live flat under one directory;
/// a section's artifact existing is what marks that section complete.
pub struct Store {
    out_dir: PathBuf,
}

impl Store {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into() }
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.out_dir.join(file_name)
    }

    pub fn section_path(&self, label: &str) -> PathBuf {
        self.path(&section_file_name(label))
    }

    pub fn has(&self, file_name: &str) -> bool {
        self.path(file_name).exists()
    }

    /// Persist one completed section: its own artifact, then the full-run
    /// checkpoint, then the budget checkpoint. Each write is independently
    /// best-effort; a no-op when the run holds no items at all.
    pub fn save_section(&self, label: &str, items: &[Item]) {
        if items.is_empty() {
            info!("no items collected yet, skipping persistence for {}", label);
            return;
        }

        let section_items: Vec<Item> =
            dedup_by_name(items.iter().filter(|i| i.category == label).cloned());
        self.try_write(&self.section_path(label), &section_items);
        self.write_checkpoints(items, CHECKPOINT_FILE, BUDGET_CHECKPOINT_FILE);
    }

    /// Persist the terminal artifacts and print the run summary.
    pub fn save_final(&self, items: &[Item]) {
        if items.is_empty() {
            println!("No products collected, nothing to save.");
            return;
        }
        self.write_checkpoints(items, FINAL_FILE, BUDGET_FINAL_FILE);
        print_summary(&dedup_by_name(items.iter().cloned()));
    }

    fn write_checkpoints(&self, items: &[Item], all_file: &str, budget_file: &str) {
        let all = dedup_by_name(items.iter().cloned());
        self.try_write(&self.path(all_file), &all);
        let budget = budget_view(&all);
        if !budget.is_empty() {
            self.try_write(&self.path(budget_file), &budget);
        }
    }

    fn try_write(&self, path: &Path, items: &[Item]) {
        match self.write(path, items) {
            Ok(()) => info!("wrote {} rows to {}", items.len(), path.display()),
            Err(e) => warn!("failed to write {}: {:#}", path.display(), e),
        }
    }

    fn write(&self, path: &Path, items: &[Item]) -> Result<()> {
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("creating {}", self.out_dir.display()))?;
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        for item in items {
            writer.serialize(item)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Load one artifact's rows.
    pub fn load(&self, file_name: &str) -> Result<Vec<Item>> {
        let path = self.path(file_name);
        let mut reader =
            csv::Reader::from_path(&path).with_context(|| format!("opening {}", path.display()))?;
        let mut items = Vec::new();
        for row in reader.deserialize() {
            let item: Item = row.with_context(|| format!("reading {}", path.display()))?;
            items.push(item);
        }
        Ok(items)
    }

    /// Delete every known artifact. Returns how many files were removed.
    pub fn wipe(&self, section_labels: &[String]) -> usize {
        let mut names: Vec<String> = section_labels.iter().map(|l| section_file_name(l)).collect();
        names.extend(
            [CHECKPOINT_FILE, BUDGET_CHECKPOINT_FILE, FINAL_FILE, BUDGET_FINAL_FILE]
                .map(String::from),
        );

        let mut removed = 0;
        for name in names {
            let path = self.path(&name);
            if !path.exists() {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("deleted {}", path.display());
                    removed += 1;
                }
                Err(e) => warn!("failed to delete {}: {}", path.display(), e),
            }
        }
        removed
    }
}

/// Keep the first occurrence of each name, preserving order.
pub fn dedup_by_name(items: impl Iterator<Item = Item>) -> Vec<Item> {
    let mut seen = HashSet::new();
    items.filter(|i| seen.insert(i.name.clone())).collect()
}

/// Items with a known price at or below the budget ceiling.
pub fn budget_view(items: &[Item]) -> Vec<Item> {
    items
        .iter()
        .filter(|i| i.has_price && i.price <= BUDGET_PRICE_CEILING)
        .cloned()
        .collect()
}

pub fn print_summary(items: &[Item]) {
    println!("\nFinal results: {} unique products", items.len());

    let mut per_category: HashMap<&str, usize> = HashMap::new();
    for item in items {
        *per_category.entry(item.category.as_str()).or_default() += 1;
    }
    let mut counts: Vec<_> = per_category.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    for (category, count) in counts {
        println!("  {}: {} items", category, count);
    }

    let priced: Vec<&Item> = items.iter().filter(|i| i.has_price).collect();
    if priced.is_empty() {
        return;
    }
    let min = priced.iter().map(|i| i.price).fold(f64::INFINITY, f64::min);
    let max = priced.iter().map(|i| i.price).fold(0.0, f64::max);
    let mean = priced.iter().map(|i| i.price).sum::<f64>() / priced.len() as f64;
    println!("\nPrice analysis ({} priced items):", priced.len());
    println!("  Range: ${:.2} - ${:.2}", min, max);
    println!("  Average: ${:.2}", mean);
    println!(
        "  Budget items (<= ${:.2}): {}",
        BUDGET_PRICE_CEILING,
        budget_view(items).len()
    );
}

// ── Tests ──
