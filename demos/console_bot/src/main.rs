//! Console Bot Example
//!
//! Treats stdin as one backend connection. Each line is an inbound frame:
//! either a full JSON message record, or plain text which is wrapped as a
//! group message from user `console` with permission level 1.
//!
//! Outbound envelopes are printed to stdout as JSON.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot
//! /help
//! /echo hello
//! {"user_type": "direct", "user_id": "42", "content": [{"type": "text", "data": "/info"}]}
//! ```

use std::sync::Arc;

use anyhow::Result;
use futures::stream;
use gscore::framework::SvRegistry;
use gscore::prelude::*;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

const CONNECTION_ID: &str = "console";

// ============================================================================
// Handlers
// ============================================================================

async fn ping(_bot: Bot, _event: Event) -> &'static str {
    "Pong!"
}

async fn echo(_bot: Bot, event: Event) -> Option<String> {
    let text = event.text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

async fn help(bot: Bot, _event: Event) {
    let help_text = "/echo <text> - Echo text\n\
                     /ping        - Pong!\n\
                     /info        - Message info\n\
                     /group       - Group only\n\
                     /enable <sv>, /disable <sv> - Toggle a module (admin)";
    if let Err(e) = bot.send(help_text, false).await {
        error!(error = %e, "Failed to send help message");
    }
}

async fn info_handler(_bot: Bot, event: Event) -> String {
    format!(
        "Message Info\n\
         • Type: {}\n\
         • From: {} (pm {})\n\
         • Group: {}\n\
         • Message ID: {}",
        event.user_type,
        event.user_id,
        event.user_pm,
        event.group_id.as_deref().unwrap_or("-"),
        event.msg_id,
    )
}

async fn group_only(bot: Bot, event: Event) -> Result<()> {
    let reply = format!(
        "This is a group-only command! Group: {}",
        event.group_id.as_deref().unwrap_or("-")
    );
    bot.send(reply, true).await?;
    Ok(())
}

async fn set_enabled(registry: &SvRegistry, name: &str, enabled: bool) -> Result<String> {
    let sv = registry
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("no module named '{name}'"))?;
    sv.set(SvUpdate::new().enabled(enabled)).await?;
    let state = if enabled { "enabled" } else { "disabled" };
    Ok(format!("{name} {state}"))
}

// ============================================================================
// Inbound frames
// ============================================================================

/// Turns a console line into an inbound frame.
fn to_frame(line: &str) -> Option<Vec<u8>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('{') {
        return Some(line.as_bytes().to_vec());
    }

    let record = json!({
        "bot_id": "console",
        "bot_self_id": "gscore",
        "user_type": "group",
        "group_id": "console-group",
        "user_id": "console",
        "user_pm": 1,
        "content": [{"type": "text", "data": line}],
    });
    serde_json::to_vec(&record).ok()
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let runtime = Runtime::new();

    let basic = runtime.sv("basic", SvConfig::default()).await?;
    basic.on_fullmatch("/ping", ping);
    basic.on_fullmatch(["/help", "help"], help);
    basic.on_fullmatch("/info", info_handler);
    basic.on_prefix("/echo ", echo);

    let group = runtime
        .sv("group", SvConfig::default().with_area(Area::Group))
        .await?;
    group.on_fullmatch("/group", group_only);

    let admin = runtime
        .sv(
            "admin",
            SvConfig::default().with_priority(0).with_permission(1),
        )
        .await?;
    for (prefix, enabled) in [("/enable ", true), ("/disable ", false)] {
        let registry = Arc::clone(runtime.registry());
        admin.on_prefix(prefix, move |_bot: Bot, event: Event| {
            let registry = Arc::clone(&registry);
            async move { set_enabled(&registry, event.text.trim(), enabled).await }
        });
    }

    info!(modules = runtime.registry().len(), "Modules registered");

    let (handle, mut outbound) =
        ConnectionHandle::channel(CONNECTION_ID, runtime.config().session.outbound_buffer);

    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = outbound.recv().await {
            let line = [frame.as_slice(), b"\n"].concat();
            if stdout.write_all(&line).await.is_err() || stdout.flush().await.is_err() {
                break;
            }
        }
    });

    let lines = BufReader::new(tokio::io::stdin()).lines();
    let frames = stream::unfold(lines, |mut lines| async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(frame) = to_frame(&line) {
                        return Some((frame, lines));
                    }
                }
                Ok(None) => return None,
                Err(e) => {
                    error!(error = %e, "Failed to read stdin");
                    return None;
                }
            }
        }
    });

    runtime
        .run_until_signal(runtime.serve(handle, frames))
        .await;

    printer.await?;
    Ok(())
}
