use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use dailycast::cli;
use dailycast::commands::CommandHandler;
use dailycast::config::Config;
use dailycast::pipeline::{DeliveryPipeline, RegistrationFlow};
use dailycast::predict::PredictionPicker;
use dailycast::registry::{InMemoryStore, SubscriberStore};
use dailycast::scheduler::DailyDeliveryScheduler;
use dailycast::transport::{MessagingTransport, TelegramTransport};
use dailycast::weather::OpenWeatherGateway;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();

    if args.help {
        cli::print_help();
        return Ok(());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dailycast=info".parse().unwrap()),
        )
        .init();

    info!("dailycast v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Delivery hour: {:02}:00 local", config.delivery_hour);
    info!("  Weather timeout: {}s", config.weather_timeout_secs);

    // Refuse to run with a bad configuration; a DELIVERY_HOUR of 25 would
    // otherwise produce triggers that never fire
    if let Err(e) = config.validate() {
        error!("{}", e);
        std::process::exit(1);
    }
    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    // Wire up the components
    let store: Arc<dyn SubscriberStore> = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(OpenWeatherGateway::new(&config)?);
    let transport = Arc::new(TelegramTransport::new(&config));
    let pipeline = Arc::new(DeliveryPipeline::new(
        store.clone(),
        gateway.clone(),
        transport.clone(),
        PredictionPicker::from_entropy(),
    ));
    let scheduler = Arc::new(DailyDeliveryScheduler::new(
        pipeline.clone(),
        config.delivery_hour,
    ));
    let registration = Arc::new(RegistrationFlow::new(
        store.clone(),
        gateway,
        scheduler.clone(),
        config.delivery_hour,
    ));
    let handler = Arc::new(CommandHandler::new(
        store.clone(),
        registration,
        pipeline.clone(),
    ));

    // Handle --deliver mode (one on-demand delivery, then exit)
    if let Some(chat_id) = args.deliver {
        info!("Running single delivery for chat {} (--deliver mode)", chat_id);
        pipeline.deliver(chat_id).await;
        return Ok(());
    }

    // Re-register triggers for every stored active subscriber
    let active = store.active();
    if !active.is_empty() {
        info!("Rescheduling {} stored subscriber(s)", active.len());
        for subscriber in &active {
            scheduler.schedule(subscriber);
        }
    }

    info!("Bot started, polling for commands");
    run_polling(&config, transport, handler).await;

    scheduler.shutdown();
    info!("Shut down cleanly");
    Ok(())
}

/// Long-poll for updates and dispatch each to the command handler on its
/// own task, so a slow registration (weather lookup) for one chat never
/// delays commands from another.
async fn run_polling(
    config: &Config,
    transport: Arc<TelegramTransport>,
    handler: Arc<CommandHandler>,
) {
    let mut offset: i64 = 0;

    loop {
        let updates = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c, shutting down");
                return;
            }
            result = transport.poll_updates(offset, config.poll_interval_secs) => match result {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Polling failed, retrying: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(config.poll_interval_secs)).await;
                    continue;
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                debug!("Ignoring non-text message from chat {}", message.chat.id);
                continue;
            };

            let transport = transport.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let sender_name = message.from.as_ref().and_then(|s| s.first_name.clone());
                let reply = handler
                    .handle(message.chat.id, sender_name.as_deref(), &text)
                    .await;
                if let Some(reply) = reply {
                    if let Err(e) = transport.send(message.chat.id, &reply).await {
                        error!("Failed to reply to chat {}: {}", message.chat.id, e);
                    }
                }
            });
        }
    }
}
