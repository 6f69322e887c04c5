use crate::api::{CoinSummary, SymbolCatalog};
use crate::alerting::alerts::WatchEntry;
use crate::alerting::engine::TriggerEvent;
use num_format::{Locale, ToFormattedString};

pub const HELP_TEXT: &str = "Hi, welcome to the Crypto price notification bot\n\
Set alerts on your favorite crypto currencies. Get notified and earn $$$\n\
\n\
/price <coin> [currency] - current price\n\
/lower <coin> <price> [currency] - notify when the price drops below\n\
/higher <coin> <price> [currency] - notify when the price rises above\n\
/alerts - list your alerts\n\
/clear - remove all your alerts\n\
/top - top coins by market cap";

/// Roughly three significant digits, between 1 and 8 decimals.
pub fn format_price(price: f64) -> String {
    let precision = if price.is_finite() && price > 0.0 {
        (2 - price.log10().floor() as i64).clamp(1, 8) as usize
    } else {
        2
    };
    format!("{:.*}", precision, price)
}

pub fn trigger_message(event: &TriggerEvent, catalog: &SymbolCatalog) -> String {
    format!(
        "{} is {} {} at {} {}",
        catalog.display_name(&event.base),
        event.direction,
        format_price(event.target.value()),
        format_price(event.observed_price),
        event.quote
    )
}

pub fn watch_set_message(entry: &WatchEntry<'_>, catalog: &SymbolCatalog) -> String {
    format!(
        "Notification set for {} {} {} {}.",
        catalog.display_name(entry.base),
        entry.direction,
        format_price(entry.target.value()),
        entry.quote
    )
}

pub fn price_message(base: &str, quote: &str, price: f64, catalog: &SymbolCatalog) -> String {
    format!(
        "1 {} = {} {}",
        catalog.display_name(base),
        format_price(price),
        quote
    )
}

/// Lines are sorted so the reply does not depend on store order.
pub fn alerts_message<'a>(
    watches: impl Iterator<Item = WatchEntry<'a>>,
    catalog: &SymbolCatalog,
) -> String {
    let mut lines: Vec<(String, String)> = watches
        .map(|w| {
            let name = catalog.display_name(w.base).to_string();
            let line = format!(
                "{} {} {} {}",
                name,
                w.direction,
                format_price(w.target.value()),
                w.quote
            );
            (name, line)
        })
        .collect();

    if lines.is_empty() {
        return "No alert is set".to_string();
    }
    lines.sort();

    let mut msg = String::from("Current alerts:\n");
    for (_, line) in lines {
        msg.push_str(&line);
        msg.push('\n');
    }
    msg
}

/// Markdown ranking for the `top` command.
pub fn top_message(coins: &[CoinSummary], quote: &str) -> String {
    if coins.is_empty() {
        return "No market data available".to_string();
    }
    let mut msg = format!("*Top {} coins by market cap*\n", coins.len());
    for (rank, coin) in coins.iter().enumerate() {
        let cap = coin.market_cap.max(0.0).round() as u64;
        msg.push_str(&format!(
            "{}. *{}* ({}) {} {} | {:+.2}% | cap {} {}\n",
            rank + 1,
            coin.name,
            coin.symbol,
            format_price(coin.price),
            quote,
            coin.change_pct_24h,
            cap.to_formatted_string(&Locale::en),
            quote
        ));
    }
    msg
}
