use tracing::{info, warn};

use crate::extract::DedupIndex;
use crate::sections::Section;
use crate::store::{
    self, section_file_name, Item, Store, BUDGET_CHECKPOINT_FILE, BUDGET_FINAL_FILE, FINAL_FILE,
};

/// What is already on disk, computed once at startup.
#[derive(Debug)]
pub struct ResumePlan {
    /// Sections whose completion artifact exists, in configured order.
    pub completed: Vec<Section>,
    /// Residual sections still needing collection, in configured order.
    pub missing: Vec<Section>,
    pub has_checkpoint: bool,
    /// Checkpoint/terminal artifacts present besides the section files.
    pub other_artifacts: Vec<String>,
}

impl ResumePlan {
    /// True when a previous run left nothing behind.
    pub fn is_fresh(&self) -> bool {
        self.completed.is_empty() && self.other_artifacts.is_empty()
    }
}

pub fn inspect(store: &Store, sections: &[Section]) -> ResumePlan {
    let (completed, missing): (Vec<Section>, Vec<Section>) = sections
        .iter()
        .cloned()
        .partition(|s| store.has(&section_file_name(&s.label)));

    let other_artifacts = [
        store::CHECKPOINT_FILE,
        BUDGET_CHECKPOINT_FILE,
        FINAL_FILE,
        BUDGET_FINAL_FILE,
    ]
    .iter()
    .filter(|name| store.has(name))
    .map(|name| name.to_string())
    .collect();

    ResumePlan {
        completed,
        missing,
        has_checkpoint: store.has(store::CHECKPOINT_FILE),
        other_artifacts,
    }
}

/// Replay previously collected records into memory: the full-run checkpoint
/// wholesale when present, otherwise each completed section's artifact.
/// Every replayed name seeds the dedup index so a resumed run cannot
/// re-accept it. Loading is best-effort per file.
pub fn replay(store: &Store, plan: &ResumePlan) -> (Vec<Item>, DedupIndex) {
    let mut items = Vec::new();
    let mut from_checkpoint = false;

    if plan.has_checkpoint {
        match store.load(store::CHECKPOINT_FILE) {
            Ok(loaded) => {
                info!("loaded {} items from checkpoint", loaded.len());
                items = loaded;
                from_checkpoint = true;
            }
            Err(e) => warn!("checkpoint unreadable, falling back to section artifacts: {:#}", e),
        }
    }

    if !from_checkpoint {
        for section in &plan.completed {
            match store.load(&section_file_name(&section.label)) {
                Ok(loaded) => {
                    info!("loaded {} items from {}", loaded.len(), section.label);
                    items.extend(loaded);
                }
                Err(e) => warn!("skipping artifact for {}: {:#}", section.label, e),
            }
        }
    }

    let mut dedup = DedupIndex::new();
    for item in &items {
        dedup.accept(&item.name);
    }
    (items, dedup)
}

// ── Operator decision ──

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OperatorChoice {
    /// Collect only the residual sections, keeping existing artifacts.
    Resume,
    /// Discard every artifact and collect everything again.
    StartOver,
    /// Exit without touching anything.
    Abort,
}

/// Parse a menu answer ("1", "2", "3").
pub fn parse_choice(input: &str) -> Option<OperatorChoice> {
    match input.trim() {
        "1" => Some(OperatorChoice::Resume),
        "2" => Some(OperatorChoice::StartOver),
        "3" => Some(OperatorChoice::Abort),
        _ => None,
    }
}

#[derive(Debug, PartialEq)]
pub enum Decision {
    /// Collect these sections, replaying existing records first.
    Proceed(Vec<Section>),
    /// Delete all artifacts, then collect these sections from scratch.
    WipeThenProceed(Vec<Section>),
    Abort,
}

/// Pure decision over the already-computed plan; no I/O, no prompting.
pub fn decide(sections: &[Section], plan: &ResumePlan, choice: OperatorChoice) -> Decision {
    match choice {
        OperatorChoice::Resume => Decision::Proceed(plan.missing.clone()),
        OperatorChoice::StartOver => Decision::WipeThenProceed(sections.to_vec()),
        OperatorChoice::Abort => Decision::Abort,
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CHECKPOINT_FILE;
    use tempfile::TempDir;

    fn sections() -> Vec<Section> {
        vec![
            Section::new("Produce", "https://example.test/produce"),
            Section::new("Cheese", "https://example.test/cheese"),
            Section::new("Deli", "https://example.test/deli"),
        ]
    }

    fn item(name: &str, price: f64, category: &str) -> Item {
        Item {
            name: name.to_string(),
            price,
            size: "Unknown".to_string(),
            unit_price: None,
            category: category.to_string(),
            has_price: price > 0.0,
            promotion: None,
        }
    }

    #[test]
    fn empty_directory_means_everything_residual() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        let plan = inspect(&store, &sections());

        assert!(plan.is_fresh());
        assert!(plan.completed.is_empty());
        assert_eq!(plan.missing, sections());
        assert!(!plan.has_checkpoint);

        let (items, dedup) = replay(&store, &plan);
        assert!(items.is_empty());
        assert!(dedup.is_empty());
    }

    #[test]
    fn residual_is_sections_minus_completed() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        let all = sections();

        // Complete "Cheese" only; the checkpoint written alongside must not
        // shrink the residual set.
        store.save_section("Cheese", &[item("Brie", 7.99, "Cheese")]);

        let plan = inspect(&store, &all);
        let completed: Vec<&str> = plan.completed.iter().map(|s| s.label.as_str()).collect();
        let missing: Vec<&str> = plan.missing.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(completed, vec!["Cheese"]);
        assert_eq!(missing, vec!["Produce", "Deli"]);
        assert!(plan.has_checkpoint);
    }

    #[test]
    fn checkpoint_replayed_wholesale() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        // Checkpoint carries both categories even though only one section
        // artifact exists.
        let all_items = vec![item("Brie", 7.99, "Cheese"), item("Ham", 3.49, "Deli")];
        store.save_section("Cheese", &all_items);

        let plan = inspect(&store, &sections());
        let (items, dedup) = replay(&store, &plan);
        assert_eq!(items.len(), 2);
        assert!(dedup.contains("Brie"));
        assert!(dedup.contains("Ham"));
    }

    #[test]
    fn section_artifacts_replayed_without_checkpoint() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.save_section("Cheese", &[item("Brie", 7.99, "Cheese")]);
        store.save_section("Deli", &[item("Brie", 6.99, "Deli"), item("Ham", 3.49, "Deli")]);
        std::fs::remove_file(store.path(CHECKPOINT_FILE)).unwrap();

        let plan = inspect(&store, &sections());
        assert!(!plan.has_checkpoint);

        let (items, dedup) = replay(&store, &plan);
        // Cheese and Deli both carry a "Brie" row; the index collapses them.
        assert_eq!(items.len(), 3);
        assert_eq!(dedup.len(), 2);
        assert!(dedup.contains("Brie"));
        assert!(dedup.contains("Ham"));
    }

    #[test]
    fn all_sections_complete_leaves_nothing_to_do() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        let all = sections();
        let run = vec![
            item("Apples", 2.99, "Produce"),
            item("Brie", 7.99, "Cheese"),
            item("Ham", 3.49, "Deli"),
        ];
        for section in &all {
            store.save_section(&section.label, &run);
        }

        let plan = inspect(&store, &all);
        assert!(plan.missing.is_empty());
        assert_eq!(plan.completed.len(), 3);
    }

    #[test]
    fn unreadable_artifact_does_not_block_others() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        store.save_section("Cheese", &[item("Brie", 7.99, "Cheese")]);
        std::fs::remove_file(store.path(CHECKPOINT_FILE)).unwrap();
        // A directory where a CSV should be makes that one artifact fail.
        std::fs::create_dir(store.path(&section_file_name("Deli"))).unwrap();

        let plan = inspect(&store, &sections());
        let (items, _) = replay(&store, &plan);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Brie");
    }

    #[test]
    fn decisions_follow_choice() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path());
        let all = sections();
        store.save_section("Cheese", &[item("Brie", 7.99, "Cheese")]);
        let plan = inspect(&store, &all);

        match decide(&all, &plan, OperatorChoice::Resume) {
            Decision::Proceed(residual) => {
                let labels: Vec<&str> = residual.iter().map(|s| s.label.as_str()).collect();
                assert_eq!(labels, vec!["Produce", "Deli"]);
            }
            other => panic!("expected Proceed, got {:?}", other),
        }
        assert_eq!(
            decide(&all, &plan, OperatorChoice::StartOver),
            Decision::WipeThenProceed(all.clone())
        );
        assert_eq!(decide(&all, &plan, OperatorChoice::Abort), Decision::Abort);
    }

    #[test]
    fn menu_answers() {
        assert_eq!(parse_choice(" 1 "), Some(OperatorChoice::Resume));
        assert_eq!(parse_choice("2"), Some(OperatorChoice::StartOver));
        assert_eq!(parse_choice("3"), Some(OperatorChoice::Abort));
        assert_eq!(parse_choice("yes"), None);
        assert_eq!(parse_choice(""), None);
    }
}
