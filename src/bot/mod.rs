pub mod commands;
pub mod format;


use crate::api::{gather_prices, Inbound, MarketData, ParseMode, SymbolCatalog, Transport};
use crate::alerting::alerts::{AlertStore, OwnerId, WatchEntry};
use crate::alerting::engine::{evaluate_cycle, TriggerEvent};
use crate::error::NotifierError;
use crate::storage::{self, Snapshot};
use commands::{interpret, Intent};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use tokio::sync::Mutex;

const TOP_COINS: usize = 10;

struct BotState {
    store: AlertStore,
    last_update: i64,
}

struct Reply {
    text: String,
    parse_mode: Option<ParseMode>,
}

impl Reply {
    fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parse_mode: None,
        }
    }
}

/// Owns the alert store and drives both the command batches and the alert
/// cycles against it. The state lock is held for a whole batch or cycle.
pub struct Bot<T, M> {
    transport: T,
    market: M,
    db_path: PathBuf,
    default_quote: String,
    state: Mutex<BotState>,
}

impl<T: Transport, M: MarketData> Bot<T, M> {
    /// Restores the store and update offset from `db_path`.
    pub fn new(transport: T, market: M, db_path: PathBuf, default_quote: &str) -> Self {
        let (store, last_update) = storage::load(&db_path).into_parts();
        info!(
            "Starting with {} watches for {} owners",
            store.len(),
            store.owner_count()
        );
        Self {
            transport,
            market,
            db_path,
            default_quote: default_quote.to_string(),
            state: Mutex::new(BotState { store, last_update }),
        }
    }

    /// Fetches one batch of inbound messages and answers each of them.
    /// Returns how many messages were handled.
    pub async fn poll_commands(&self) -> Result<usize, NotifierError> {
        let offset = self.state.lock().await.last_update + 1;
        let batch = self.transport.receive(offset).await?;
        let Some(last_update_id) = batch.last_update_id else {
            return Ok(0);
        };

        let mut state = self.state.lock().await;
        for message in &batch.messages {
            let reply = self.handle_message(&mut state.store, message).await;
            // The mutation is done; a cancelled batch must not replay it.
            state.last_update = state.last_update.max(message.update_id);
            if let Err(e) = self
                .transport
                .send(message.owner, &reply.text, reply.parse_mode)
                .await
            {
                warn!("Reply to {} failed: {}", message.owner, e);
            }
        }
        state.last_update = state.last_update.max(last_update_id);
        self.persist(&state);
        Ok(batch.messages.len())
    }

    /// One alert cycle: price every watched pair, fire and retire what
    /// matched, notify the owners.
    pub async fn run_alert_cycle(&self) -> Vec<TriggerEvent> {
        let mut state = self.state.lock().await;
        if state.store.is_empty() {
            return Vec::new();
        }

        let prices = gather_prices(&self.market, &state.store.pairs()).await;
        let events = evaluate_cycle(&mut state.store, &prices);
        if events.is_empty() {
            debug!("Cycle over {} pairs, nothing triggered", prices.len());
            return events;
        }

        let catalog = self.catalog_or_empty().await;
        for event in &events {
            let text = format::trigger_message(event, &catalog);
            info!("🔔 {} -> {}", event.owner, text);
            if let Err(e) = self.transport.send(event.owner, &text, None).await {
                error!("Notification to {} lost: {}", event.owner, e);
            }
        }
        self.persist(&state);
        events
    }

    /// Writes the current state; called on shutdown.
    pub async fn flush(&self) {
        let state = self.state.lock().await;
        self.persist(&state);
    }

    async fn handle_message(&self, store: &mut AlertStore, message: &Inbound) -> Reply {
        if !message.is_command {
            return Reply::plain(format!("Invalid command {}", message.text));
        }
        debug!(
            "handling update {} from {}: {:?}",
            message.update_id, message.owner, message.text
        );

        let catalog = if commands::needs_catalog(&message.text) {
            match self.market.catalog().await {
                Ok(catalog) => Some(catalog),
                Err(e) => {
                    error!("Symbol list unavailable: {}", e);
                    return Reply::plain("Price service unavailable, try again later");
                }
            }
        } else {
            None
        };

        let intent = interpret(
            &message.text,
            catalog.as_ref().unwrap_or(&SymbolCatalog::default()),
            &self.default_quote,
        );
        self.execute(store, message.owner, intent, catalog).await
    }

    /// `catalog` is only present when parsing needed it; other replies fetch
    /// it for display names and fall back to raw symbols.
    async fn execute(
        &self,
        store: &mut AlertStore,
        owner: OwnerId,
        intent: Intent,
        catalog: Option<SymbolCatalog>,
    ) -> Reply {
        match intent {
            Intent::Help => Reply::plain(format::HELP_TEXT),
            Intent::ListTop => match self.market.top_coins(TOP_COINS).await {
                Ok(coins) => Reply {
                    text: format::top_message(&coins, &self.default_quote),
                    parse_mode: Some(ParseMode::Markdown),
                },
                Err(e) => {
                    error!("Top coins unavailable: {}", e);
                    Reply::plain("Could not fetch the top coins, try again later")
                }
            },
            Intent::ListAlerts => {
                let catalog = self.display_catalog(catalog).await;
                Reply::plain(format::alerts_message(store.list_watches(owner), &catalog))
            }
            Intent::ClearAlerts => {
                let removed = store.clear_owner(owner);
                info!("Cleared {} watches for {}", removed, owner);
                Reply::plain("Done.")
            }
            Intent::PriceQuery { base, quote } => {
                if !self.market.is_pair_valid(&base, &quote).await {
                    return Reply::plain(format!("Invalid symbols {} {}", base, quote));
                }
                match self.market.price(&base, &quote).await {
                    Ok(price) => {
                        let catalog = self.display_catalog(catalog).await;
                        Reply::plain(format::price_message(&base, &quote, price, &catalog))
                    }
                    Err(e) => {
                        error!("Price lookup for {}/{} failed: {}", base, quote, e);
                        Reply::plain(format!("Could not fetch the price of {} {}", base, quote))
                    }
                }
            }
            Intent::SetWatch {
                base,
                direction,
                target,
                quote,
            } => {
                let catalog = self.display_catalog(catalog).await;
                store.add_watch(owner, &base, direction, &quote, target);
                let entry = WatchEntry {
                    owner,
                    base: &base,
                    direction,
                    quote: &quote,
                    target,
                };
                Reply::plain(format::watch_set_message(&entry, &catalog))
            }
            Intent::Invalid(reason) => Reply::plain(reason),
        }
    }

    async fn display_catalog(&self, catalog: Option<SymbolCatalog>) -> SymbolCatalog {
        match catalog {
            Some(catalog) => catalog,
            None => self.catalog_or_empty().await,
        }
    }

    async fn catalog_or_empty(&self) -> SymbolCatalog {
        self.market.catalog().await.unwrap_or_else(|e| {
            warn!("Symbol list unavailable, using raw symbols: {}", e);
            SymbolCatalog::default()
        })
    }

    fn persist(&self, state: &BotState) {
        let snapshot = Snapshot::capture(&state.store, state.last_update);
        if let Err(e) = storage::save(&self.db_path, &snapshot) {
            error!("Could not save {}: {}", self.db_path.display(), e);
        }
    }
}
