//! Echo Bot Demo
//!
//! Reads messages from stdin, dispatches them through amber, and prints the
//! replies.
//!
//! Every line is one message. A line of the form `!event <name> [json]`
//! raises a named event instead.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --group 1001 --prefix /
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use amber::prelude::*;
use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "echo-bot", about = "Console echo bot for the amber framework")]
struct Args {
    /// Treat input as group messages from this group.
    #[arg(long)]
    group: Option<i64>,

    /// Sender user id.
    #[arg(long, default_value_t = 10000)]
    user: i64,

    /// Extra prefix keywords (repeatable).
    #[arg(long)]
    prefix: Vec<String>,

    /// Configuration file to load instead of the default search.
    #[arg(long)]
    config: Option<PathBuf>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn ping(_msg: Arc<Message>) -> &'static str {
    "pong"
}

async fn echo(msg: Arc<Message>) -> Option<Chain> {
    let rest = msg.text.trim().strip_prefix("echo")?.trim();
    if rest.is_empty() {
        return None;
    }
    Some(Chain::new().at(msg.user_id).text(format!(" {rest}")))
}

async fn help(_msg: Arc<Message>) -> String {
    [
        "echo <text>  repeat text",
        "ping         pong",
        "help         this help",
        "whoami       sender info (private only)",
    ]
    .join("\n")
}

fn build_handlers(args: &Args) -> Result<BotHandlers> {
    let mut bot = BotHandlers::new();
    bot.add_prefix(["amber", "/"]);
    bot.add_prefix(args.prefix.clone());

    bot.handle_message(|msg| async move {
        info!(kind = %msg.kind, user_id = msg.user_id, text = %msg.text, "Received");
        Some(msg)
    })?;

    bot.on_overspeed(|_msg| async { "Slow down a little." })?;

    bot.on_group_message("ping").keywords(equal("ping")).handler(ping);
    bot.on_group_message("echo")
        .keywords(Matcher::pattern(r"^echo\b")?)
        .handler(echo);
    bot.on_group_message("help")
        .keywords(vec![equal("help"), equal("?")])
        .handler(help);

    bot.on_private_message("ping").keywords("ping").handler(ping);
    bot.on_private_message("echo")
        .keywords(Matcher::pattern(r"^echo\b")?)
        .handler(echo);
    bot.on_private_message("whoami")
        .check_prefix(Prefix::Disabled)
        .verify(|msg| async move { msg.text.trim() == "whoami" })
        .handler(|msg| async move { format!("You are {} ({})", msg.user_id, msg.kind) });

    bot.on_event("member_join", |event| async move {
        let user = event.payload.get("user_id").and_then(|v| v.as_i64());
        user.map(|id| Chain::new().text("Welcome, ").at(id))
    })?;

    bot.timed_task("heartbeat", Duration::from_secs(60), || async {
        info!("Echo bot is alive");
    });

    Ok(bot)
}

fn parse_line(line: &str, args: &Args) -> Option<Incoming> {
    let line = line.trim_end();
    if line.is_empty() {
        return None;
    }

    if let Some(rest) = line.strip_prefix("!event ") {
        let (name, payload) = rest.split_once(' ').unwrap_or((rest, "null"));
        let payload = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Invalid event payload: {e}");
                return None;
            }
        };
        return Some(Event::new(name, payload).into());
    }

    let message = match args.group {
        Some(group_id) => Message::group(group_id, args.user, line),
        None => Message::private(args.user, line),
    };
    Some(message.into())
}

fn print_reply(outbound: &Outbound) {
    match outbound.target {
        Some(target) => match target.group_id {
            Some(group_id) => println!("[group {group_id}] {}", outbound.chain),
            None => println!("[user {}] {}", target.user_id, outbound.chain),
        },
        None => println!("[event] {}", outbound.chain),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let bot = build_handlers(&args)?;

    let mut builder = AmberRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    let runtime = builder.build(bot)?;

    let (inbound_tx, inbound_rx) = mpsc::channel(256);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(256);

    let printer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            print_reply(&outbound);
        }
    });

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(incoming) = parse_line(&line, &args)
                && inbound_tx.send(incoming).await.is_err()
            {
                break;
            }
        }
    });

    runtime.run(inbound_rx, outbound_tx).await?;

    reader.abort();
    printer.await?;
    Ok(())
}
