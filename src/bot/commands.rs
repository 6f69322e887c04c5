use crate::api::SymbolCatalog;
use crate::alerting::alerts::{Direction, Target};

/// Quote symbols denominated in satoshis, rescaled to BTC.
const SATOSHI_SYMBOLS: &[&str] = &["SAT", "SATS"];
const SATOSHIS_PER_BTC: f64 = 100_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Help,
    ListTop,
    ListAlerts,
    ClearAlerts,
    PriceQuery {
        base: String,
        quote: String,
    },
    SetWatch {
        base: String,
        direction: Direction,
        target: Target,
        quote: String,
    },
    Invalid(String),
}

fn invalid(reason: impl Into<String>) -> Intent {
    Intent::Invalid(reason.into())
}

/// Parses one command message such as `/lower btc 20000 usd`.
///
/// Coin and quote symbols are checked against `catalog`; whether a price
/// pair is actually quoted is left to the caller.
pub fn interpret(text: &str, catalog: &SymbolCatalog, default_quote: &str) -> Intent {
    let parts = split_command(text);
    let Some(keyword) = parts.first().map(|first| command_keyword(first)) else {
        return invalid("Unknown command");
    };

    match keyword {
        "START" | "HELP" => Intent::Help,
        "TOP" | "ALL" => Intent::ListTop,
        "ALERTS" => Intent::ListAlerts,
        "CLEAR" => Intent::ClearAlerts,
        "PRICE" => {
            if parts.len() < 2 {
                return invalid("Invalid command");
            }
            Intent::PriceQuery {
                base: parts[1].clone(),
                quote: parts
                    .get(2)
                    .cloned()
                    .unwrap_or_else(|| default_quote.to_string()),
            }
        }
        "LOWER" | "HIGHER" => {
            let direction = if keyword == "LOWER" {
                Direction::Below
            } else {
                Direction::Above
            };
            parse_watch(&parts, direction, catalog, default_quote)
        }
        _ => invalid("Unknown command"),
    }
}

/// Only `lower`/`higher` validate symbols against the catalog.
pub fn needs_catalog(text: &str) -> bool {
    split_command(text)
        .first()
        .is_some_and(|first| matches!(command_keyword(first), "LOWER" | "HIGHER"))
}

fn split_command(text: &str) -> Vec<String> {
    text.trim()
        .trim_start_matches('/')
        .split_whitespace()
        .map(str::to_uppercase)
        .collect()
}

/// Drops a trailing `@botname`.
fn command_keyword(first: &str) -> &str {
    first.split('@').next().unwrap_or_default()
}

fn parse_watch(
    parts: &[String],
    direction: Direction,
    catalog: &SymbolCatalog,
    default_quote: &str,
) -> Intent {
    if !(3..=4).contains(&parts.len()) {
        return invalid("Invalid command");
    }

    let base = &parts[1];
    if !catalog.is_coin(base) {
        return invalid(format!("Invalid symbol \"{}\"", base));
    }

    let raw_target = &parts[2];
    let Some(mut target) = raw_target
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value > 0.0)
    else {
        return invalid(format!("Invalid number \"{}\"", raw_target));
    };

    let mut quote = parts
        .get(3)
        .cloned()
        .unwrap_or_else(|| default_quote.to_string());
    if SATOSHI_SYMBOLS.contains(&quote.as_str()) {
        target /= SATOSHIS_PER_BTC;
        quote = "BTC".to_string();
    }

    if !catalog.is_quote(&quote) {
        return invalid(format!("Invalid symbol {}", quote));
    }

    match Target::new(target) {
        Some(target) => Intent::SetWatch {
            base: base.clone(),
            direction,
            target,
            quote,
        },
        None => invalid(format!("Invalid number \"{}\"", raw_target)),
    }
}
