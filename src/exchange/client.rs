//! Binance spot REST API client.

use crate::config::BinanceConfig;
use crate::error::ExchangeError;
use crate::exchange::traits::{OrderAmount, OrderFill, TradingApi};
use crate::exchange::types::*;
use crate::utils::decimal::round_down_to_lot;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

const SPOT_BASE_URL: &str = "https://api.binance.com";
const SPOT_TESTNET_URL: &str = "https://testnet.binance.vision";

/// Binance API client for the spot market.
pub struct BinanceClient {
    http: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    /// Base asset and LOT_SIZE per symbol, fetched once
    symbol_rules: RwLock<HashMap<String, SymbolRules>>,
}

impl BinanceClient {
    /// Create a new Binance client from configuration.
    pub fn new(config: &BinanceConfig, timeout: Duration) -> Result<Self> {
        let base_url = if config.testnet {
            SPOT_TESTNET_URL
        } else {
            SPOT_BASE_URL
        };
        Self::with_base_url(config, base_url, timeout)
    }

    /// Create a client against an explicit REST endpoint.
    pub fn with_base_url(config: &BinanceConfig, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol_rules: RwLock::new(HashMap::new()),
        })
    }

    /// Generate HMAC-SHA256 signature for authenticated requests.
    fn sign(&self, query_string: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(query_string.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Decode a 2xx body, or turn Binance's `{code, msg}` into an error.
    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => Err(ExchangeError::Api {
                    code: err.code,
                    msg: err.msg,
                }
                .into()),
                Err(_) => Err(anyhow::anyhow!("{} failed with HTTP {}: {}", what, status, body)),
            };
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    // ==================== Market Data (Public) ====================

    /// Get the latest price for a symbol.
    #[instrument(skip(self))]
    pub async fn get_ticker_price(&self, symbol: &str) -> Result<TickerPrice> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .context("Failed to fetch ticker price")?;

        Self::decode(response, "ticker price").await
    }

    /// Get exchange info for a single symbol.
    #[instrument(skip(self))]
    pub async fn get_exchange_info(&self, symbol: &str) -> Result<SpotSymbolInfo> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .context("Failed to fetch exchange info")?;

        let info: SpotExchangeInfo = Self::decode(response, "exchange info").await?;
        info.symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()).into())
    }

    /// Trading rules for a symbol, cached after the first lookup.
    pub async fn symbol_rules(&self, symbol: &str) -> Result<SymbolRules> {
        if let Some(rules) = self.symbol_rules.read().await.get(symbol) {
            return Ok(rules.clone());
        }

        let rules = SymbolRules::from(&self.get_exchange_info(symbol).await?);
        debug!(%symbol, base_asset = %rules.base_asset, lot = ?rules.lot_size, "Cached symbol rules");
        self.symbol_rules
            .write()
            .await
            .insert(symbol.to_string(), rules.clone());
        Ok(rules)
    }

    /// LOT_SIZE rule for a symbol, if the exchange publishes one.
    pub async fn lot_size(&self, symbol: &str) -> Result<Option<LotSize>> {
        Ok(self.symbol_rules(symbol).await?.lot_size)
    }

    /// Round a quantity down to the symbol's step and enforce the minimum.
    pub async fn to_lot_precision(&self, symbol: &str, quantity: Decimal) -> Result<Decimal> {
        let Some(lot) = self.lot_size(symbol).await? else {
            return Ok(quantity);
        };

        let rounded = round_down_to_lot(quantity, lot.step_size);
        anyhow::ensure!(
            rounded > Decimal::ZERO && rounded >= lot.min_qty,
            "Quantity {} for {} is below the minimum lot {}",
            quantity,
            symbol,
            lot.min_qty
        );
        Ok(rounded)
    }

    // ==================== Orders (Authenticated) ====================

    /// Place a signed MARKET order for a base-asset quantity.
    #[instrument(skip(self))]
    pub async fn place_spot_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<OrderResponse> {
        let params = [
            ("symbol".to_string(), symbol.to_string()),
            ("side".to_string(), side.to_string()),
            ("type".to_string(), "MARKET".to_string()),
            ("quantity".to_string(), quantity.to_string()),
            ("newOrderRespType".to_string(), "FULL".to_string()),
            ("timestamp".to_string(), Utc::now().timestamp_millis().to_string()),
        ];

        let query_string: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let signature = self.sign(&query_string);
        let url = format!(
            "{}/api/v3/order?{}&signature={}",
            self.base_url, query_string, signature
        );

        debug!(%symbol, %side, %quantity, "Placing spot market order");

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("Failed to place spot order")?;

        Self::decode(response, "order").await
    }
}

#[async_trait]
impl TradingApi for BinanceClient {
    async fn fetch_current_price(&self, symbol: &str) -> Result<Decimal> {
        let ticker = self.get_ticker_price(symbol).await?;
        if ticker.price <= Decimal::ZERO {
            return Err(ExchangeError::InvalidPrice {
                symbol: symbol.to_string(),
                price: ticker.price.to_string(),
            }
            .into());
        }
        Ok(ticker.price)
    }

    async fn place_market_order(
        &self,
        side: OrderSide,
        symbol: &str,
        amount: OrderAmount,
    ) -> Result<OrderFill> {
        let (raw_quantity, quoted_price) = match amount {
            OrderAmount::Notional(usdt) => {
                let price = self.fetch_current_price(symbol).await?;
                (usdt / price, Some(price))
            }
            OrderAmount::Quantity(qty) => (qty, None),
        };
        let quantity = self.to_lot_precision(symbol, raw_quantity).await?;

        let response = self.place_spot_market_order(symbol, side, quantity).await?;
        info!(
            %symbol,
            %side,
            order_id = response.order_id,
            status = ?response.status,
            executed_qty = %response.executed_qty,
            quote_qty = %response.cumulative_quote_qty,
            "Spot order executed"
        );

        match response.status {
            OrderStatus::Filled | OrderStatus::PartiallyFilled => {
                let fill = OrderFill::from_response(&response, quoted_price);
                if side != OrderSide::Buy {
                    return Ok(fill);
                }

                // Buy commission paid in the bought asset never reaches the balance
                let rules = self.symbol_rules(symbol).await?;
                let commission = response.commission_in(&rules.base_asset);
                if commission > Decimal::ZERO {
                    debug!(%symbol, %commission, asset = %rules.base_asset, "Deducting base-asset commission");
                }
                Ok(fill.net_of(commission))
            }
            status => Err(ExchangeError::OrderNotFilled {
                status: format!("{:?}", status),
            }
            .into()),
        }
    }
}
