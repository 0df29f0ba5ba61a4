// Copyright © 2025 The mailbridge developers
// Licensed under the mailbridge License v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::Duration;

use clap::Parser;
use mailbridge::mailbridge_version;
use mailbridge::modules::{
    bot::MailBot,
    common::{rustls::install_crypto_provider, signal::SignalManager},
    error::MailBridgeResult,
    event::{Event, EventHandler},
    imap::SessionStatus,
    logger,
    settings::cli::Settings,
};
use mimalloc::MiMalloc;
use tracing::{error, info, warn};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Logs every event; stands in for a real bot framework.
struct LoggingHandler;

impl EventHandler for LoggingHandler {
    async fn handle_event(&self, bot: &MailBot, event: &Event) {
        info!(
            "Bot <{}>: [{}] {}{}",
            bot.account().address,
            event.event_name(),
            event.description(),
            if event.is_tome() { " (to me)" } else { "" }
        );
    }
}

#[tokio::main]
async fn main() -> MailBridgeResult<()> {
    let settings = Settings::parse();
    logger::initialize_logging(&settings);
    info!("Starting mailbridge");
    info!("Version:  {}", mailbridge_version!());

    install_crypto_provider()?;
    let account = settings.account();
    if let Err(error) = account.validate() {
        eprintln!("{:?}", error);
        return Err(error);
    }

    let signals = SignalManager::new();
    signals.start();
    let mut shutdown = signals.subscribe();

    let bot = MailBot::new(account);
    let interval = Duration::from_secs(settings.mailbridge_poll_interval_secs);
    info!(
        "Bot <{}>: polling every {}s",
        bot.account().address,
        interval.as_secs()
    );

    loop {
        tokio::select! {
            result = poll_once(&bot) => {
                if let Err(e) = result {
                    if e.is_network() {
                        warn!("Bot <{}>: connection lost, retrying next cycle: {e:?}", bot.account().address);
                        bot.session().disconnect().await;
                    } else {
                        error!("Bot <{}>: poll failed: {e:?}", bot.account().address);
                    }
                }
            }
            _ = shutdown.recv() => break,
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => break,
        }
    }

    info!("Shutting down");
    match bot.logout().await {
        Ok(true) => info!("Bot <{}>: logged out", bot.account().address),
        Ok(false) => warn!("Bot <{}>: logout was rejected", bot.account().address),
        Err(e) => warn!("Bot <{}>: logout failed: {e:?}", bot.account().address),
    }
    bot.session().disconnect().await;
    Ok(())
}

async fn poll_once(bot: &MailBot) -> MailBridgeResult<()> {
    match bot.session().state().await {
        SessionStatus::Authenticated | SessionStatus::Selected(_) => {}
        SessionStatus::Disconnected | SessionStatus::Connected => bot.connect().await?,
    }
    for event in bot.fetch_unseen_events().await? {
        bot.handle_event(event, &LoggingHandler).await;
    }
    Ok(())
}
