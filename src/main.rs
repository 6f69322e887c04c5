mod alerting;
mod api;
mod bot;
mod config;
mod error;
mod storage;

use api::cryptocompare::CryptoCompareClient;
use api::telegram::TelegramClient;
use bot::Bot;
use config::Config;
use dotenv::dotenv;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::error::Error;
use std::io::Write;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenv().ok();

    // Configure logger
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("cryptonotify", LevelFilter::Debug)
        .parse_env("RUST_LOG")
        .format(|buf, record| {
            let ts = chrono::Local::now().format("%H:%M:%S%.3f");
            writeln!(
                buf,
                "[{} {:<5} {}] {}",
                ts,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();

    info!("Starting crypto price notifier...");

    let config = Config::from_env()?;
    let telegram = TelegramClient::new(config.bot_token.clone(), config.poll_timeout)?;
    let market = CryptoCompareClient::new(config.price_api_key.clone(), &config.default_quote)?;
    let bot = Bot::new(telegram, market, config.db_path.clone(), &config.default_quote);

    info!(
        "Checking alerts every {:?}, snapshot at {}",
        config.alert_interval,
        config.db_path.display()
    );

    // Both loops share one task, so their store access never overlaps.
    let alerts = async {
        let mut ticker = tokio::time::interval(config.alert_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let fired = bot.run_alert_cycle().await;
            if !fired.is_empty() {
                info!("{} alerts fired", fired.len());
            }
        }
    };

    let commands = async {
        loop {
            match bot.poll_commands().await {
                Ok(0) => {}
                Ok(handled) => log::debug!("Handled {} messages", handled),
                Err(e) => {
                    error!("Polling for messages failed: {}", e);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }
    };

    tokio::select! {
        _ = alerts => {},
        _ = commands => {},
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    };

    bot.flush().await;
    info!("Shutdown complete");
    Ok(())
}
