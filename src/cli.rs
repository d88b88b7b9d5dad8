//! Command-line interface
//!
//! The binary runs the pipeline against fixture collaborators (a demo feed,
//! canned captions, a deterministic generator, an echo publisher) over the
//! real file-backed store — enough to exercise every stage, inspect
//! ledgers, and drive approval decisions. Deployments with live
//! integrations embed the library instead.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};

use clipflow_approval::{Decision, Resolution};
use clipflow_config::Config;
use clipflow_engine::WorkerPool;
use clipflow_engine::fixtures::{self, DryRunHarness};
use clipflow_store::{JsonLedgerStore, RecordStore, emit_jcs};
use clipflow_utils::{ItemStatus, logging};

#[derive(Parser)]
#[command(name = "clipflow", version, about = "Video-to-post workflow engine with guardrails")]
struct Cli {
    /// Path to a config file (default: discovery)
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Verbose logging (structured fields, span timings)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the feed once and register new items
    Poll,
    /// Poll and process items; loops on the configured interval
    Run {
        /// Run one poll-and-process cycle, then exit
        #[arg(long)]
        once: bool,
        /// Approve every parked draft automatically (demo mode)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Drive one item from its current status
    Process {
        item_id: String,
    },
    /// Show queue statistics, or one item's status
    Status {
        item_id: Option<String>,
        /// Emit canonical JSON
        #[arg(long)]
        json: bool,
    },
    /// Print an item's full transition ledger
    Ledger {
        item_id: String,
        /// Emit canonical JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply a reviewer decision to a parked item
    Decide {
        item_id: String,
        decision: DecisionArg,
        /// Replacement body for `edit`
        #[arg(long)]
        body: Option<String>,
    },
    /// Force-cancel an item that is parked or between stages
    Cancel {
        item_id: String,
        /// Reason recorded in the ledger
        #[arg(long, default_value = "operator cancel")]
        reason: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DecisionArg {
    Approve,
    Reject,
    Edit,
}

/// CLI entrypoint, called from main.
///
/// # Errors
/// Any setup or command failure, with context for the user.
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing(cli.verbose) {
        eprintln!("warning: tracing init failed: {e}");
    }

    let config = Arc::new(Config::discover(cli.config.as_deref())?);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(execute(cli.command, config))
}

async fn execute(command: Command, config: Arc<Config>) -> Result<()> {
    let store: Arc<dyn RecordStore> =
        Arc::new(JsonLedgerStore::open(config.store_root.clone()).context("Failed to open store")?);
    let harness = fixtures::dry_run_harness(config.clone(), store.clone())?;

    match command {
        Command::Poll => {
            let fresh = harness.orchestrator.ingest().await?;
            if fresh.is_empty() {
                println!("No new items");
            } else {
                for id in &fresh {
                    println!("detected {id}");
                }
                println!("{} new item(s); run `clipflow run --once` to process", fresh.len());
            }
        }
        Command::Run { once, auto_approve } => {
            run_cycles(&harness, &config, once, auto_approve).await?;
        }
        Command::Process { item_id } => {
            let status = harness.orchestrator.advance(&item_id).await?;
            println!("{item_id}: {status}");
        }
        Command::Status { item_id, json } => match item_id {
            Some(item_id) => item_status(store.as_ref(), &item_id, json)?,
            None => queue_status(store.as_ref(), json)?,
        },
        Command::Ledger { item_id, json } => {
            let ledger = store.ledger(&item_id)?;
            if json {
                println!("{}", emit_jcs(&ledger)?);
            } else {
                for t in ledger {
                    let from = t.from.map_or("-".to_string(), |s| s.to_string());
                    let mut line = format!("{}  {from} -> {}  [{}]", t.at.to_rfc3339(), t.to, t.stage);
                    if let Some(e) = &t.evaluation {
                        line.push_str(&format!("  verdict={:?}", e.verdict));
                    }
                    if let Some(err) = &t.error {
                        line.push_str(&format!("  error={}: {}", err.kind, err.message));
                    }
                    if let Some(r) = &t.receipt {
                        line.push_str(&format!("  remote={}", r.remote_post_id));
                    }
                    println!("{line}");
                }
            }
        }
        Command::Decide {
            item_id,
            decision,
            body,
        } => {
            let decision = match decision {
                DecisionArg::Approve => Decision::Approve,
                DecisionArg::Reject => Decision::Reject,
                DecisionArg::Edit => Decision::Edit {
                    body: body.context("--body is required for edit")?,
                },
            };
            let resolution = harness
                .orchestrator
                .resolve_approval(&item_id, decision)
                .await?;
            match resolution {
                Resolution::Approved => {
                    let status = store.current_status(&item_id)?;
                    println!("approved; item is now {}", fmt_status(status));
                }
                Resolution::Rejected => println!("rejected"),
                Resolution::EditAccepted { revision } => {
                    println!("edit accepted as revision {revision}; awaiting approval again");
                }
                Resolution::EditCapExhausted => {
                    println!("edit-cycle cap reached; item rejected");
                }
                Resolution::AlreadyResolved => {
                    println!("no-op: item is not awaiting approval");
                }
            }
        }
        Command::Cancel { item_id, reason } => {
            match harness.orchestrator.cancel(&item_id, &reason)? {
                clipflow_engine::CancelOutcome::Cancelled(status) => {
                    println!("cancelled; item is now {status}");
                }
                clipflow_engine::CancelOutcome::AlreadyTerminal(status) => {
                    println!("already terminal ({status})");
                }
                clipflow_engine::CancelOutcome::Busy => {
                    println!("item is mid-stage; retry once the current stage finishes");
                }
            }
        }
    }

    Ok(())
}

async fn run_cycles(
    harness: &DryRunHarness,
    config: &Config,
    once: bool,
    auto_approve: bool,
) -> Result<()> {
    loop {
        let mut queue = harness.orchestrator.ingest().await?;
        queue.extend(harness.orchestrator.resumable_items()?);
        queue.sort();
        queue.dedup();

        // A fresh bounded pool per cycle; shutdown drains the batch
        let pool = WorkerPool::spawn(harness.orchestrator.clone(), config.workers.concurrency);
        let work = pool.handle();
        for item_id in &queue {
            work.enqueue(item_id.clone());
        }
        drop(work);
        pool.shutdown().await;

        for item_id in queue {
            let status = harness.orchestrator.store().current_status(&item_id)?;
            println!("{item_id}: {}", fmt_status(status));

            if status == Some(ItemStatus::AwaitingApproval) && auto_approve {
                let resolution = harness
                    .orchestrator
                    .resolve_approval(&item_id, Decision::Approve)
                    .await?;
                if resolution == Resolution::Approved {
                    let final_status = harness.orchestrator.store().current_status(&item_id)?;
                    println!("{item_id}: auto-approved -> {}", fmt_status(final_status));
                }
            }
        }

        if once {
            return Ok(());
        }

        let interval = Duration::from_secs(config.workers.poll_interval_secs);
        println!("sleeping {}s until next poll (ctrl-c to stop)", interval.as_secs());
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                println!("stopping");
                return Ok(());
            }
        }
    }
}

fn fmt_status(status: Option<ItemStatus>) -> String {
    status.map_or("unknown".to_string(), |s| s.to_string())
}

fn item_status(store: &dyn RecordStore, item_id: &str, json: bool) -> Result<()> {
    let Some(item) = store.get_item(item_id)? else {
        anyhow::bail!("unknown item: {item_id}");
    };
    let status = store.current_status(item_id)?;
    let draft = store.current_draft(item_id)?;

    if json {
        let value = serde_json::json!({
            "item": item,
            "status": status,
            "current_draft": draft,
        });
        println!("{}", emit_jcs(&value)?);
        return Ok(());
    }

    println!("{item_id}: {}", fmt_status(status));
    println!("  url: {}", item.url);
    if let Some(title) = &item.title {
        println!("  title: {title}");
    }
    if let Some(draft) = draft {
        println!(
            "  draft: rev {} ({} chars, {} hashtags)",
            draft.revision,
            draft.body.chars().count(),
            draft.hashtags.len()
        );
    }
    Ok(())
}

fn queue_status(store: &dyn RecordStore, json: bool) -> Result<()> {
    let items = store.all_items()?;
    let mut counts = std::collections::BTreeMap::new();
    for item in &items {
        if let Some(status) = store.current_status(&item.external_id)? {
            *counts.entry(status.as_str()).or_insert(0u32) += 1;
        }
    }

    if json {
        println!("{}", emit_jcs(&serde_json::json!({
            "total": items.len(),
            "by_status": counts,
        }))?);
        return Ok(());
    }

    println!("{} item(s)", items.len());
    for (status, count) in counts {
        println!("  {status}: {count}");
    }
    Ok(())
}
