mod browser;
mod collector;
mod extract;
mod resume;
mod sections;
mod store;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::time::sleep;
use tracing::warn;

use crate::browser::{Browser, WebBrowser};
use crate::extract::DedupIndex;
use crate::resume::{Decision, OperatorChoice, ResumePlan};
use crate::sections::Section;
use crate::store::{section_file_name, Item, Store};

/// Pause between categories so navigation is not back-to-back.
const SECTION_PAUSE: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "voila_scraper", about = "Infinite-scroll category scraper for voila.ca")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect every category that has no completion artifact yet
    Run {
        /// Compute the residual categories and proceed without prompting
        #[arg(long)]
        auto_resume: bool,
        /// Delete all artifacts and start over without prompting
        #[arg(long, conflicts_with = "auto_resume")]
        fresh: bool,
        /// WebDriver endpoint to open the Chrome session against
        #[arg(long, default_value = "http://localhost:9515")]
        webdriver_url: String,
        /// Run the browser headless
        #[arg(long)]
        headless: bool,
        /// Directory holding the CSV artifacts
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
        /// Sanity-check each pending category URL before collecting
        #[arg(long)]
        check_urls: bool,
    },
    /// Show the resume plan without opening a browser
    Plan {
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
    /// Row counts and price statistics for the artifacts on disk
    Stats {
        #[arg(long, default_value = "data")]
        out_dir: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            auto_resume,
            fresh,
            webdriver_url,
            headless,
            out_dir,
            check_urls,
        } => cmd_run(auto_resume, fresh, &webdriver_url, headless, out_dir, check_urls).await,
        Commands::Plan { out_dir } => cmd_plan(out_dir),
        Commands::Stats { out_dir } => cmd_stats(out_dir),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

enum RunEnd {
    Completed,
    Interrupted,
}

async fn cmd_run(
    auto_resume: bool,
    fresh: bool,
    webdriver_url: &str,
    headless: bool,
    out_dir: PathBuf,
    check_urls: bool,
) -> Result<()> {
    let store = Store::new(out_dir);
    let all = sections::targets();
    let plan = resume::inspect(&store, &all);

    let choice = if auto_resume {
        println!(
            "Auto-resume: {} of {} categories already complete.",
            plan.completed.len(),
            all.len()
        );
        OperatorChoice::Resume
    } else if fresh {
        OperatorChoice::StartOver
    } else if plan.is_fresh() {
        println!("No existing artifacts found. Starting fresh.");
        OperatorChoice::Resume
    } else {
        print_plan(&plan);
        prompt_choice()?
    };

    let (residual, mut items, mut dedup) = match resume::decide(&all, &plan, choice) {
        Decision::Abort => {
            println!("Exiting without changes.");
            return Ok(());
        }
        Decision::WipeThenProceed(everything) => {
            let removed = store.wipe(&labels(&all));
            println!("Deleted {} artifact(s). Starting over.", removed);
            (everything, Vec::new(), DedupIndex::new())
        }
        Decision::Proceed(residual) => {
            let (items, dedup) = resume::replay(&store, &plan);
            if !items.is_empty() {
                println!("Resuming with {} previously collected items.", items.len());
            }
            (residual, items, dedup)
        }
    };

    if residual.is_empty() {
        println!("All categories already collected. Nothing to do.");
        return Ok(());
    }

    let check = check_urls
        || (!auto_resume
            && !fresh
            && prompt_yes_no("Check category URLs before collecting? (y/n): ")?);

    println!("Collecting {} categories...", residual.len());
    let browser = WebBrowser::connect(webdriver_url, headless).await?;

    let outcome = tokio::select! {
        res = run_sections(&browser, &store, &residual, &mut items, &mut dedup, check) => {
            res.map(|_| RunEnd::Completed)
        }
        _ = tokio::signal::ctrl_c() => Ok(RunEnd::Interrupted),
    };

    match &outcome {
        Ok(RunEnd::Completed) => store.save_final(&items),
        Ok(RunEnd::Interrupted) => {
            println!("\nInterrupted. Completed categories are checkpointed; re-run to resume.");
        }
        Err(_) => {}
    }

    if let Err(e) = browser.quit().await {
        warn!("failed to shut down the browser session: {:#}", e);
    }
    outcome.map(|_| ())
}

async fn run_sections<B: Browser>(
    browser: &B,
    store: &Store,
    residual: &[Section],
    items: &mut Vec<Item>,
    dedup: &mut DedupIndex,
    check_urls: bool,
) -> Result<()> {
    if check_urls {
        preflight(browser, residual).await;
    }

    for (i, section) in residual.iter().enumerate() {
        println!("[{}/{}] Collecting {}...", i + 1, residual.len(), section.label);
        match collector::collect_section(browser, section, items, dedup).await {
            Ok(report) => {
                println!(
                    "  {} new items in {} scrolls ({} duplicates, {} rejected, {} unreadable){}",
                    report.new_items,
                    report.scrolls,
                    report.duplicates,
                    report.rejected,
                    report.failed,
                    if report.stalled_out { "" } else { " - stopped at cap" },
                );
                store.save_section(&section.label, items);
            }
            Err(e) => warn!("category {} failed, moving on: {:#}", section.label, e),
        }
        sleep(SECTION_PAUSE).await;
    }
    Ok(())
}

/// Navigate to each pending category and flag pages that look wrong.
async fn preflight<B: Browser>(browser: &B, residual: &[Section]) {
    println!("Checking {} category URLs...", residual.len());
    for section in residual {
        let verdict = async {
            browser.navigate(&section.url).await?;
            sleep(SECTION_PAUSE).await;
            browser.title().await
        }
        .await;

        match verdict {
            Ok(title) => match title_problem(&title, &section.label) {
                None => println!("  ok: {}", section.label),
                Some(problem) => println!("  suspect: {}: {}", section.label, problem),
            },
            Err(e) => println!("  failed: {}: {:#}", section.label, e),
        }
    }
}

fn title_problem(title: &str, label: &str) -> Option<String> {
    let lower = title.to_lowercase();
    if lower.contains("404") || lower.contains("not found") || lower.contains("error") {
        Some(format!("page reports an error ({})", title))
    } else if !lower.contains(&label.to_lowercase()) {
        Some(format!("title does not mention the category ({})", title))
    } else {
        None
    }
}

fn cmd_plan(out_dir: PathBuf) -> Result<()> {
    let store = Store::new(out_dir);
    let all = sections::targets();
    let plan = resume::inspect(&store, &all);
    print_plan(&plan);
    if !plan.completed.is_empty() || plan.has_checkpoint {
        let (items, _) = resume::replay(&store, &plan);
        println!("A resumed run would start with {} replayed items.", items.len());
    }
    Ok(())
}

fn cmd_stats(out_dir: PathBuf) -> Result<()> {
    let store = Store::new(out_dir);
    let all = sections::targets();

    let mut names: Vec<String> = all.iter().map(|s| section_file_name(&s.label)).collect();
    names.extend(
        [
            store::CHECKPOINT_FILE,
            store::BUDGET_CHECKPOINT_FILE,
            store::FINAL_FILE,
            store::BUDGET_FINAL_FILE,
        ]
        .map(String::from),
    );

    let mut found = false;
    for name in &names {
        if !store.has(name) {
            continue;
        }
        found = true;
        match store.load(name) {
            Ok(items) => println!("{}: {} rows", name, items.len()),
            Err(e) => println!("{}: unreadable ({:#})", name, e),
        }
    }
    if !found {
        println!("No artifacts found.");
        return Ok(());
    }

    // Price statistics over the most authoritative snapshot available.
    let snapshot = if store.has(store::FINAL_FILE) {
        store::FINAL_FILE
    } else {
        store::CHECKPOINT_FILE
    };
    if store.has(snapshot) {
        if let Ok(items) = store.load(snapshot) {
            store::print_summary(&items);
        }
    }
    Ok(())
}

fn print_plan(plan: &ResumePlan) {
    if plan.is_fresh() {
        println!("No existing artifacts found.");
        return;
    }
    println!("\nExisting artifacts detected.");
    if !plan.completed.is_empty() {
        println!("Complete categories:");
        for section in &plan.completed {
            println!("  - {} ({})", section.label, section_file_name(&section.label));
        }
    }
    if !plan.other_artifacts.is_empty() {
        println!("Run-level artifacts:");
        for name in &plan.other_artifacts {
            println!("  - {}", name);
        }
    }
    if plan.missing.is_empty() {
        println!("All categories appear to be complete.");
    } else {
        println!("Missing categories ({}):", plan.missing.len());
        for section in &plan.missing {
            println!("  - {}", section.label);
        }
    }
}

fn labels(sections: &[Section]) -> Vec<String> {
    sections.iter().map(|s| s.label.clone()).collect()
}

// ── Prompting ──

fn ask(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn prompt_choice() -> Result<OperatorChoice> {
    println!("\nChoose an option:");
    println!("  1. Continue with the missing categories only");
    println!("  2. Delete all artifacts and start over");
    println!("  3. Exit without changes");
    loop {
        let answer = ask("> ")?;
        match resume::parse_choice(&answer) {
            Some(choice) => return Ok(choice),
            None => println!("Please enter 1, 2, or 3."),
        }
    }
}

fn prompt_yes_no(question: &str) -> Result<bool> {
    loop {
        match ask(question)?.to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => println!("Please answer y or n."),
        }
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_checks() {
        assert!(title_problem("404 Not Found", "Deli").is_some());
        assert!(title_problem("Error | Voila", "Deli").is_some());
        assert!(title_problem("Groceries | Voila", "Deli").is_some());
        assert!(title_problem("Deli | Voila.ca", "Deli").is_none());
    }
}
