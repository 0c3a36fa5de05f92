use anyhow::{Context, Result};
use channel_mirror::bot::content::{ChannelPost, EditedPost, PinNotification};
use channel_mirror::bot::{handlers, BotIdentity, MirrorContext, TelegramMirrorApi};
use channel_mirror::config::Settings;
use channel_mirror::storage::MirrorMap;
use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{debug, error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting the bot token from logs
struct RedactionPatterns {
    token1: Regex,
    token2: Regex,
    token3: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token1: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            token2: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token3: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let output = self.token1.replace_all(input, "$1[TELEGRAM_TOKEN]$3");
        let output = self.token2.replace_all(&output, "[TELEGRAM_TOKEN]");
        self.token3
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .into_owned()
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the original length; the redacted text may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter {
            inner: (self.make_inner)(),
            patterns: self.patterns.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().context("invalid redaction pattern")?);
    init_logging(patterns);

    info!("Starting channel mirror...");

    let settings = Settings::new().context("failed to load configuration")?;
    info!(
        "Mirroring channel {} into group {}",
        settings.source_channel_id, settings.destination_group_id
    );

    let store = Arc::new(
        MirrorMap::load(&settings.persistence_path)
            .await
            .context("failed to load mirror map")?,
    );

    let bot = Bot::new(settings.telegram_token.clone());
    let me = bot.get_me().await.context("failed to resolve bot identity")?;
    info!("Running as @{}", me.username());

    let api = Arc::new(TelegramMirrorApi::new(
        bot.clone(),
        settings.telegram_api_max_retries,
    ));
    let ctx = Arc::new(MirrorContext::new(
        api,
        store,
        BotIdentity(me.user.id),
        &settings,
    ));

    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![ctx.clone()])
        .default_handler(|upd| async move {
            debug!("Ignoring update {:?}", upd.id);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Waiting for pending albums...");
    ctx.aggregator().shutdown().await;
    ctx.store().save().await.context("failed to save mirror map")?;
    info!("Mirror map saved, bye.");

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter {
        make_inner: io::stderr,
        patterns,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(
            Update::filter_channel_post()
                .filter(|msg: Message, ctx: Arc<MirrorContext>| msg.chat.id == ctx.source())
                .endpoint(handle_new_post),
        )
        .branch(
            Update::filter_edited_channel_post()
                .filter(|msg: Message, ctx: Arc<MirrorContext>| msg.chat.id == ctx.source())
                .endpoint(handle_edited_post),
        )
        .branch(
            Update::filter_message()
                .filter(|msg: Message, ctx: Arc<MirrorContext>| {
                    msg.chat.id == ctx.destination()
                })
                .filter_map(|msg: Message| PinNotification::from_message(&msg))
                .endpoint(handle_pin_notification),
        )
}

async fn handle_new_post(
    msg: Message,
    ctx: Arc<MirrorContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::mirror_post(&ctx, ChannelPost::from_message(&msg)).await {
        error!("Failed to mirror post {}: {}", msg.id.0, e);
    }
    respond(())
}

async fn handle_edited_post(
    msg: Message,
    ctx: Arc<MirrorContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::propagate_edit(&ctx, EditedPost::from_message(&msg)).await {
        error!("Failed to propagate edit of post {}: {}", msg.id.0, e);
    }
    respond(())
}

async fn handle_pin_notification(
    notification: PinNotification,
    ctx: Arc<MirrorContext>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::suppress_pin_notification(&ctx, notification).await {
        error!(
            "Failed to delete pin notification {}: {}",
            notification.id.0, e
        );
    }
    respond(())
}
