//! Per-symbol exchange metadata: asset names and trading-rule filters.
//!
//! Binance publishes the rules in `exchangeInfo` as a `filters` array. Only the
//! three rule families the executor enforces are extracted:
//!
//! | filterType                  | Fields                                   |
//! |-----------------------------|------------------------------------------|
//! | `PRICE_FILTER`              | `minPrice`, `maxPrice`, `tickSize`       |
//! | `LOT_SIZE`                  | `minQty`, `maxQty`, `stepSize`           |
//! | `MIN_NOTIONAL` / `NOTIONAL` | `minNotional` (or `notional`)            |
//!
//! The exchange disables a rule by setting its bound to zero, so a zero
//! field here means "no constraint".

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OcoError;

/// Trading-rule filters for one symbol. Immutable per fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingFilters {
    pub tick_size: Decimal,
    pub min_price: Decimal,
    pub max_price: Decimal,
    pub step_qty: Decimal,
    pub min_qty: Decimal,
    pub max_qty: Decimal,
    pub min_notional: Decimal,
}

/// Symbol metadata needed to place and validate orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub filters: TradingFilters,
}

impl SymbolInfo {
    /// Build from one element of the `exchangeInfo` `symbols` array.
    pub fn from_exchange_info(v: &Value) -> Result<Self, OcoError> {
        let field = |key: &str| -> Result<String, OcoError> {
            v.get(key)
                .and_then(|s| s.as_str())
                .map(str::to_string)
                .ok_or_else(|| OcoError::Parse(format!("symbol info missing `{key}`")))
        };
        let symbol = field("symbol")?;
        let base_asset = field("baseAsset")?;
        let quote_asset = field("quoteAsset")?;

        let filters = v
            .get("filters")
            .and_then(|f| f.as_array())
            .ok_or_else(|| OcoError::Parse(format!("{symbol}: `filters` is not an array")))?;

        Ok(Self {
            filters: TradingFilters::from_filter_array(filters)?,
            symbol,
            base_asset,
            quote_asset,
        })
    }

    /// Find `symbol` inside a full `exchangeInfo` document.
    pub fn find_in(info: &Value, symbol: &str) -> Result<Self, OcoError> {
        let symbols = info
            .get("symbols")
            .and_then(|s| s.as_array())
            .ok_or_else(|| OcoError::Parse("exchangeInfo has no `symbols` array".into()))?;
        let entry = symbols
            .iter()
            .find(|s| s.get("symbol").and_then(|v| v.as_str()) == Some(symbol))
            .ok_or_else(|| OcoError::Parse(format!("symbol {symbol} not in exchangeInfo")))?;
        Self::from_exchange_info(entry)
    }
}

impl TradingFilters {
    /// Extract the filters from an exchange `filters` array. Filter types that
    /// are absent leave their fields at zero (rule disabled).
    pub fn from_filter_array(filters: &[Value]) -> Result<Self, OcoError> {
        let mut out = Self::default();
        for f in filters {
            let Some(kind) = f.get("filterType").and_then(|t| t.as_str()) else {
                continue;
            };
            match kind {
                "PRICE_FILTER" => {
                    out.min_price = dec_field(f, "minPrice")?;
                    out.max_price = dec_field(f, "maxPrice")?;
                    out.tick_size = dec_field(f, "tickSize")?;
                }
                "LOT_SIZE" => {
                    out.min_qty = dec_field(f, "minQty")?;
                    out.max_qty = dec_field(f, "maxQty")?;
                    out.step_qty = dec_field(f, "stepSize")?;
                }
                "MIN_NOTIONAL" | "NOTIONAL" => {
                    out.min_notional = if f.get("minNotional").is_some() {
                        dec_field(f, "minNotional")?
                    } else {
                        dec_field(f, "notional")?
                    };
                }
                _ => {}
            }
        }
        Ok(out)
    }
}

/// Read a decimal that Binance encodes as a JSON string (numbers accepted too).
pub fn dec_field(v: &Value, key: &str) -> Result<Decimal, OcoError> {
    match v.get(key) {
        Some(Value::String(s)) => parse_decimal(s),
        Some(Value::Number(n)) => parse_decimal(&n.to_string()),
        Some(other) => Err(OcoError::Parse(format!("`{key}` is not a decimal: {other}"))),
        None => Err(OcoError::Parse(format!("missing `{key}`"))),
    }
}

/// Like [`dec_field`] but absent or empty values read as zero.
pub fn dec_field_or_zero(v: &Value, key: &str) -> Result<Decimal, OcoError> {
    match v.get(key) {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(Value::String(s)) if s.is_empty() => Ok(Decimal::ZERO),
        Some(_) => dec_field(v, key),
    }
}

/// Parse a decimal string, accepting scientific notation as a fallback.
pub fn parse_decimal(s: &str) -> Result<Decimal, OcoError> {
    Decimal::from_str(s)
        .or_else(|_| Decimal::from_scientific(s))
        .map_err(|e| OcoError::Parse(format!("bad decimal {s:?}: {e}")))
}
