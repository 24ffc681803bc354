//! Echo Bot Example
//!
//! Receives activities over HTTP and echoes messages back, word by word,
//! through the turn's stream so the platform sees a progressively growing
//! reply.
//!
//! # Routes
//!
//! ```text
//! middleware  log every activity, then next()
//! "/help"     command list (stops the chain)
//! "/ping"     pong
//! message     streaming echo
//! conversationUpdate  greeting
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-bot -- --config demos/echo_bot/parley.toml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use parley::prelude::*;
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "A streaming echo bot")]
struct Args {
    /// Config file; defaults to `parley.toml` in the working directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Config profile (`parley.<profile>.toml`).
    #[arg(short, long)]
    profile: Option<String>,
}

const HELP: &str = "\
Echo Bot - Commands
  /ping   Pong!
  /help   This help
  <text>  Echo, streamed word by word";

// ============================================================================
// Handlers
// ============================================================================

async fn log_activity(ctx: ActivityContext) -> Result<(), BoxError> {
    let activity = ctx.activity();
    info!(
        from = %activity.from.id,
        conversation = %activity.conversation.id,
        text = activity.text.as_deref().unwrap_or_default(),
        "{}",
        activity.activity_type()
    );
    ctx.next().await?;
    Ok(())
}

async fn help(ctx: ActivityContext) -> Result<(), ApiError> {
    ctx.reply(Activity::message(HELP)).await?;
    Ok(())
}

async fn ping(ctx: ActivityContext) -> Result<(), ApiError> {
    ctx.reply(Activity::message("Pong!")).await?;
    Ok(())
}

async fn echo(ctx: ActivityContext) {
    let text = ctx.activity().text.clone().unwrap_or_default();
    for word in text.split_inclusive(char::is_whitespace) {
        ctx.emit(word);
        tokio::time::sleep(Duration::from_millis(80)).await;
    }
}

async fn greet(ctx: ActivityContext) -> Result<(), ApiError> {
    ctx.send(Activity::message("Hi! Say something and I'll say it back."))
        .await?;
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    if let Some(profile) = &args.profile {
        loader = loader.profile(profile);
    }

    let app = AppBuilder::load(loader)?
        .plugin(HttpPlugin::new())
        .routes(|router| {
            router
                .use_middleware(log_activity)
                .message("/help", help)
                .message("/ping", ping)
                .on_message(echo)
                .on_conversation_update(greet);
        })
        .build()?;

    info!(routes = app.route_count(), "Echo bot ready");
    app.run().await?;
    Ok(())
}
