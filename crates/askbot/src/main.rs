//! Interactive console host for the askbot usage tracker.
//!
//! The real deployment hangs this engine behind a chat transport; this binary
//! drives the same command surface (`ask`, `stats`, `history`, `limit`,
//! `info`) from stdin so the tracker can be exercised end to end without one.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use askbot_core::{
    activity::{ActivityService, Submission},
    clock::ClockPolicy,
    config::Config,
    domain::{truncate_text, UserId},
    ports::ResponderPort,
    store::JsonFileStore,
};

const HISTORY_DEFAULT: usize = 5;
const HISTORY_MAX: usize = 10;
const PROMPT_PREVIEW_LEN: usize = 100;

/// Placeholder generator. Swap in a real model client behind the same port.
struct CannedResponder;

#[async_trait::async_trait]
impl ResponderPort for CannedResponder {
    async fn respond(&self, _user_id: UserId, prompt: &str) -> askbot_core::Result<String> {
        Ok(format!(
            "Thanks for your question: \"{prompt}\".\n\
             This is a canned response; connect a real model backend for intelligent answers."
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    askbot_core::logging::init("askbot")?;

    let cfg = Config::load().context("loading configuration")?;
    let policy = ClockPolicy::system(cfg.timezone);
    let store = Arc::new(JsonFileStore::new(cfg.data_file.clone()));
    let service = ActivityService::new(store, policy, cfg.activity_limits())
        .context("loading tracker state")?;
    let responder: Arc<dyn ResponderPort> = Arc::new(CannedResponder);

    println!(
        "askbot console | daily limit {}, history capacity {}, data file {}",
        cfg.daily_limit,
        cfg.history_capacity,
        cfg.data_file.display()
    );
    println!("Type `help` for commands.");

    run_console(service, responder, &cfg).await
}

async fn run_console(
    service: ActivityService,
    responder: Arc<dyn ResponderPort>,
    cfg: &Config,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut parts = line.splitn(2, char::is_whitespace);
        let command = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or("").trim();

        match command {
            "ask" => cmd_ask(&service, responder.as_ref(), cfg, rest).await,
            "stats" => cmd_stats(&service, cfg, rest).await,
            "limit" => cmd_limit(&service, cfg, rest).await,
            "history" => cmd_history(&service, rest).await,
            "info" => cmd_info(&service, cfg).await,
            "help" => print_help(),
            "quit" | "exit" => break,
            other => println!("Unknown command `{other}`. Type `help` for commands."),
        }
    }

    Ok(())
}

async fn cmd_ask(service: &ActivityService, responder: &dyn ResponderPort, cfg: &Config, rest: &str) {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let Some(user) = parse_user(parts.next()) else {
        println!("Usage: ask <user-id> <prompt>");
        return;
    };
    let prompt = parts.next().unwrap_or("").trim();
    if prompt.is_empty() {
        println!("Usage: ask <user-id> <prompt>");
        return;
    }

    let submission = match service.submit(user, prompt, cfg.daily_limit).await {
        Ok(s) => s,
        Err(e) => {
            println!("[CONSOLE] storage error, request not processed: {e}");
            return;
        }
    };

    match submission {
        Submission::Rejected { retry_after } => {
            println!(
                "Daily limit of {} messages reached. Try again in {}.",
                cfg.daily_limit,
                format_wait(retry_after)
            );
        }
        Submission::Accepted { remaining, pending } => {
            let response = match responder.respond(user, prompt).await {
                Ok(r) => r,
                Err(e) => {
                    // Quota already consumed; no history entry is written.
                    println!("[CONSOLE] responder failed: {e}");
                    return;
                }
            };
            if let Err(e) = pending.complete(&response).await {
                println!("[CONSOLE] storage error, response not recorded: {e}");
            }
            println!("{response}");
            println!("({remaining} messages remaining today)");
        }
    }
}

async fn cmd_stats(service: &ActivityService, cfg: &Config, rest: &str) {
    let Some(user) = parse_user(rest.split_whitespace().next()) else {
        println!("Usage: stats <user-id>");
        return;
    };

    let stats = service.stats(user, cfg.daily_limit).await;
    println!("Statistics for user {}:", user.0);
    println!("  today:     {}/{}", stats.request_count, cfg.daily_limit);
    println!("  remaining: {}", stats.remaining);
    println!("  lifetime:  {}", stats.total_requests_lifetime);
    println!("  count day: {}", stats.count_date);
}

async fn cmd_limit(service: &ActivityService, cfg: &Config, rest: &str) {
    let Some(user) = parse_user(rest.split_whitespace().next()) else {
        println!("Usage: limit <user-id>");
        return;
    };

    let stats = service.stats(user, cfg.daily_limit).await;
    let used = cfg.daily_limit.saturating_sub(stats.remaining);

    if cfg.daily_limit == 0 {
        println!("Daily limit is 0: all requests are denied.");
        return;
    }

    let filled = ((used as usize) * 10) / (cfg.daily_limit as usize);
    let bar: String = "█".repeat(filled) + &"░".repeat(10 - filled);
    println!("Usage: {bar} {used}/{}", cfg.daily_limit);
    println!(
        "Remaining: {} message{} left today",
        stats.remaining,
        if stats.remaining == 1 { "" } else { "s" }
    );
}

async fn cmd_history(service: &ActivityService, rest: &str) {
    let mut parts = rest.split_whitespace();
    let Some(user) = parse_user(parts.next()) else {
        println!("Usage: history <user-id> [count]");
        return;
    };
    let count = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(HISTORY_DEFAULT)
        .clamp(1, HISTORY_MAX);

    let entries = service.history(user, count).await;
    if entries.is_empty() {
        println!("No chat history for user {} yet.", user.0);
        return;
    }

    println!("Recent history for user {} (last {}):", user.0, entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let preview = if entry.prompt.chars().count() > PROMPT_PREVIEW_LEN {
            format!("{}...", truncate_text(&entry.prompt, PROMPT_PREVIEW_LEN))
        } else {
            entry.prompt.clone()
        };
        println!("  {}. {}  Q: {preview}", i + 1, format_timestamp(&entry.timestamp));
    }
}

async fn cmd_info(service: &ActivityService, cfg: &Config) {
    println!("askbot usage tracker console");
    println!("  daily limit:      {} messages per user", cfg.daily_limit);
    println!("  history capacity: {} interactions per user", cfg.history_capacity);
    println!("  tracked users:    {}", service.tracked_users().await);
    println!("  data file:        {}", cfg.data_file.display());
}

fn print_help() {
    println!("Commands:");
    println!("  ask <user-id> <prompt>     submit a question");
    println!("  stats <user-id>            usage statistics");
    println!("  limit <user-id>            daily limit status");
    println!("  history <user-id> [count]  recent interactions (default {HISTORY_DEFAULT}, max {HISTORY_MAX})");
    println!("  info                       tracker information");
    println!("  quit                       exit");
}

fn parse_user(raw: Option<&str>) -> Option<UserId> {
    raw.and_then(|s| s.parse::<i64>().ok()).map(UserId)
}

/// `23h 59m` style rendering for retry-after durations.
fn format_wait(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{secs}s")
    }
}

/// RFC3339 → `YYYY-MM-DD HH:MM` for display.
fn format_timestamp(ts: &str) -> String {
    match ts.get(..16) {
        Some(head) => head.replacen('T', " ", 1),
        None => ts.to_string(),
    }
}
