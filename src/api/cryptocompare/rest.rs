use crate::api::{CoinSummary, MarketData, SymbolCatalog};
use crate::error::NotifierError;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const CRYPTOCOMPARE_URL: &str = "https://min-api.cryptocompare.com/data";
const CACHE_DURATION: Duration = Duration::from_secs(10);

/// Quote currencies accepted for watches.
pub const QUOTE_SYMBOLS: &[&str] = &["USD", "EUR", "GBP", "JPY", "USDT", "BTC", "ETH"];

#[derive(Debug, Deserialize)]
struct CoinListResponse {
    #[serde(rename = "Data", default)]
    data: HashMap<String, CoinListEntry>,
}

#[derive(Debug, Deserialize)]
struct CoinListEntry {
    #[serde(rename = "CoinName")]
    coin_name: String,
}

#[derive(Debug, Deserialize)]
struct TopListResponse {
    #[serde(rename = "Data", default)]
    data: Vec<TopListEntry>,
}

#[derive(Debug, Deserialize)]
struct TopListEntry {
    #[serde(rename = "CoinInfo")]
    coin_info: TopCoinInfo,
    #[serde(rename = "RAW", default)]
    raw: HashMap<String, TopCoinRaw>,
}

#[derive(Debug, Deserialize)]
struct TopCoinInfo {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "FullName")]
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct TopCoinRaw {
    #[serde(rename = "PRICE")]
    price: f64,
    #[serde(rename = "MKTCAP", default)]
    market_cap: f64,
    #[serde(rename = "CHANGEPCT24HOUR", default)]
    change_pct_24h: f64,
}

struct Cached<T> {
    fetched_at: Instant,
    value: T,
}

impl<T: Clone> Cached<T> {
    fn fresh(&self) -> Option<T> {
        (self.fetched_at.elapsed() < CACHE_DURATION).then(|| self.value.clone())
    }
}

/// CryptoCompare REST client with a short-lived response cache.
pub struct CryptoCompareClient {
    client: Client,
    api_key: Option<String>,
    quote: String,
    catalog: Mutex<Option<Cached<SymbolCatalog>>>,
    top: Mutex<Option<Cached<Vec<CoinSummary>>>>,
    prices: Mutex<HashMap<(String, String), Cached<f64>>>,
}

impl CryptoCompareClient {
    pub fn new(api_key: Option<String>, quote: &str) -> Result<Self, NotifierError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        info!("CryptoCompare client ready (keyed: {})", api_key.is_some());
        Ok(Self {
            client,
            api_key,
            quote: quote.to_string(),
            catalog: Mutex::new(None),
            top: Mutex::new(None),
            prices: Mutex::new(HashMap::new()),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, NotifierError> {
        let url = format!("{}/{}", CRYPTOCOMPARE_URL, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("authorization", format!("Apikey {}", key));
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(NotifierError::ApiError(format!(
                "{} returned {}",
                path,
                response.status()
            )));
        }
        Ok(response.json::<Value>().await?)
    }
}

impl MarketData for CryptoCompareClient {
    async fn catalog(&self) -> Result<SymbolCatalog, NotifierError> {
        let mut cache = self.catalog.lock().await;
        if let Some(catalog) = cache.as_ref().and_then(Cached::fresh) {
            return Ok(catalog);
        }
        let body = self.get_json("all/coinlist", &[]).await?;
        let catalog = parse_catalog(body)?;
        *cache = Some(Cached {
            fetched_at: Instant::now(),
            value: catalog.clone(),
        });
        Ok(catalog)
    }

    async fn top_coins(&self, limit: usize) -> Result<Vec<CoinSummary>, NotifierError> {
        let mut cache = self.top.lock().await;
        if let Some(top) = cache.as_ref().and_then(Cached::fresh) {
            if top.len() >= limit {
                return Ok(top.into_iter().take(limit).collect());
            }
        }
        let body = self
            .get_json(
                "top/mktcapfull",
                &[("limit", limit.to_string()), ("tsym", self.quote.clone())],
            )
            .await?;
        let top = parse_top(body, &self.quote)?;
        *cache = Some(Cached {
            fetched_at: Instant::now(),
            value: top.clone(),
        });
        Ok(top)
    }

    async fn price(&self, base: &str, quote: &str) -> Result<f64, NotifierError> {
        let key = (base.to_string(), quote.to_string());
        if let Some(price) = self.prices.lock().await.get(&key).and_then(Cached::fresh) {
            return Ok(price);
        }
        let body = self
            .get_json("price", &[("fsym", base.to_string()), ("tsyms", quote.to_string())])
            .await?;
        let price = parse_price(&body, base, quote)?;
        debug!("{}/{} = {}", base, quote, price);
        self.prices.lock().await.insert(
            key,
            Cached {
                fetched_at: Instant::now(),
                value: price,
            },
        );
        Ok(price)
    }
}

fn parse_catalog(body: Value) -> Result<SymbolCatalog, NotifierError> {
    let list: CoinListResponse = serde_json::from_value(body)?;
    if list.data.is_empty() {
        return Err(NotifierError::ApiError("empty coin list".to_string()));
    }
    let coins = list
        .data
        .into_iter()
        .map(|(symbol, entry)| (symbol.to_uppercase(), entry.coin_name))
        .collect();
    Ok(SymbolCatalog::new(
        coins,
        QUOTE_SYMBOLS.iter().map(|s| s.to_string()),
    ))
}

fn parse_top(body: Value, quote: &str) -> Result<Vec<CoinSummary>, NotifierError> {
    let top: TopListResponse = serde_json::from_value(body)?;
    Ok(top
        .data
        .into_iter()
        .filter_map(|mut entry| {
            let raw = entry.raw.remove(quote)?;
            Some(CoinSummary {
                symbol: entry.coin_info.name,
                name: entry.coin_info.full_name,
                price: raw.price,
                market_cap: raw.market_cap,
                change_pct_24h: raw.change_pct_24h,
            })
        })
        .collect())
}

/// `{"USD": 123.4}` on success; anything else means the pair is not quoted.
fn parse_price(body: &Value, base: &str, quote: &str) -> Result<f64, NotifierError> {
    body.get(quote)
        .and_then(Value::as_f64)
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| NotifierError::unsupported(base, quote))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_response() {
        let ok = json!({ "USD": 27123.5 });
        assert_eq!(parse_price(&ok, "BTC", "USD").unwrap(), 27123.5);

        let error = json!({
            "Response": "Error",
            "Message": "There is no data for the symbol XYZ ."
        });
        assert!(matches!(
            parse_price(&error, "XYZ", "USD"),
            Err(NotifierError::UnsupportedPair { .. })
        ));
        assert!(parse_price(&json!({ "EUR": 1.0 }), "BTC", "USD").is_err());
    }

    #[test]
    fn coin_list_builds_catalog() {
        let body = json!({
            "Response": "Success",
            "Data": {
                "BTC": { "Symbol": "BTC", "CoinName": "Bitcoin", "FullName": "Bitcoin (BTC)" },
                "ETH": { "Symbol": "ETH", "CoinName": "Ethereum", "FullName": "Ethereum (ETH)" }
            }
        });
        let catalog = parse_catalog(body).unwrap();

        assert!(catalog.is_coin("BTC"));
        assert!(!catalog.is_coin("XYZ"));
        assert_eq!(catalog.display_name("ETH"), "Ethereum");
        assert_eq!(catalog.display_name("XYZ"), "XYZ");
        assert!(catalog.is_quote("USD"));
        assert!(catalog.is_quote("BTC"));
        assert!(!catalog.is_quote("SAT"));
    }

    #[test]
    fn empty_coin_list_is_an_error() {
        assert!(parse_catalog(json!({ "Response": "Error", "Data": {} })).is_err());
    }

    #[test]
    fn top_list_keeps_entries_with_quote() {
        let body = json!({
            "Data": [
                {
                    "CoinInfo": { "Name": "BTC", "FullName": "Bitcoin" },
                    "RAW": { "USD": { "PRICE": 27000.0, "MKTCAP": 520000000000.0, "CHANGEPCT24HOUR": -1.5 } }
                },
                {
                    "CoinInfo": { "Name": "NEW", "FullName": "New Coin" }
                }
            ]
        });
        let top = parse_top(body, "USD").unwrap();

        assert_eq!(top.len(), 1);
        assert_eq!(top[0].symbol, "BTC");
        assert_eq!(top[0].name, "Bitcoin");
        assert_eq!(top[0].change_pct_24h, -1.5);
    }
}
