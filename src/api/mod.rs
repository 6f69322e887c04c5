pub mod cryptocompare;
pub mod telegram;

use crate::alerting::alerts::OwnerId;
use crate::alerting::engine::PriceBoard;
use crate::error::NotifierError;
use futures::future::join_all;
use log::warn;
use std::collections::{BTreeSet, HashMap};

/// Known coins (symbol to display name) and the quote currencies the price
/// source accepts.
#[derive(Debug, Clone, Default)]
pub struct SymbolCatalog {
    coins: HashMap<String, String>,
    quotes: BTreeSet<String>,
}

impl SymbolCatalog {
    pub fn new(coins: HashMap<String, String>, quotes: impl IntoIterator<Item = String>) -> Self {
        Self {
            coins,
            quotes: quotes.into_iter().collect(),
        }
    }

    pub fn is_coin(&self, symbol: &str) -> bool {
        self.coins.contains_key(symbol)
    }

    pub fn is_quote(&self, symbol: &str) -> bool {
        self.quotes.contains(symbol)
    }

    /// Falls back to the symbol itself for unknown coins.
    pub fn display_name<'a>(&'a self, symbol: &'a str) -> &'a str {
        self.coins.get(symbol).map(String::as_str).unwrap_or(symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoinSummary {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub market_cap: f64,
    pub change_pct_24h: f64,
}

#[allow(async_fn_in_trait)]
pub trait MarketData {
    async fn catalog(&self) -> Result<SymbolCatalog, NotifierError>;

    async fn top_coins(&self, limit: usize) -> Result<Vec<CoinSummary>, NotifierError>;

    /// Fails with `UnsupportedPair` when the pair cannot be quoted.
    async fn price(&self, base: &str, quote: &str) -> Result<f64, NotifierError>;

    async fn is_pair_valid(&self, base: &str, quote: &str) -> bool {
        self.price(base, quote).await.is_ok()
    }
}

/// Looks up every pair concurrently. Pairs that fail are left off the board.
pub async fn gather_prices<M>(market: &M, pairs: &BTreeSet<(String, String)>) -> PriceBoard
where
    M: MarketData + ?Sized,
{
    let lookups = pairs.iter().map(|(base, quote)| async move {
        (base, quote, market.price(base, quote).await)
    });

    let mut board = PriceBoard::new();
    for (base, quote, result) in join_all(lookups).await {
        match result {
            Ok(price) => board.insert(base, quote, price),
            Err(e) => warn!("Price lookup failed for {}/{}: {}", base, quote, e),
        }
    }
    board
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
}

impl ParseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseMode::Markdown => "Markdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub update_id: i64,
    pub owner: OwnerId,
    pub text: String,
    /// Whether the message opens with a bot command entity.
    pub is_command: bool,
}

/// One poll's worth of messages. `last_update_id` also covers updates that
/// carried no usable text, so the caller can move its offset past them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateBatch {
    pub last_update_id: Option<i64>,
    pub messages: Vec<Inbound>,
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(
        &self,
        owner: OwnerId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), NotifierError>;

    /// Updates with an id of at least `offset`; empty when none arrived.
    async fn receive(&self, offset: i64) -> Result<UpdateBatch, NotifierError>;
}
