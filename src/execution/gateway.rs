use crate::api::{BinanceTrader, OrderSize};
use crate::models::OrderSide;
use crate::{BotError, Result};
use async_trait::async_trait;
use chrono::Utc;

/// Exchange minimum notional plus a margin for fees and spread
pub const MIN_NOTIONAL_USD: f64 = 10.5;

/// Largest BUY the bot will ever place on its own
pub const MAX_BUY_NOTIONAL: f64 = 10_000.0;

/// A market order to fill.
///
/// `amount` is USD notional for a BUY and base-asset quantity for a SELL.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub ref_price: f64,
    pub live: bool,
}

impl OrderRequest {
    pub fn buy(symbol: &str, notional: f64, ref_price: f64, live: bool) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            amount: notional,
            ref_price,
            live,
        }
    }

    pub fn sell(symbol: &str, quantity: f64, ref_price: f64, live: bool) -> Self {
        Self {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            amount: quantity,
            ref_price,
            live,
        }
    }

    /// USD value of the order
    pub fn notional(&self) -> f64 {
        match self.side {
            OrderSide::Buy => self.amount,
            OrderSide::Sell => self.amount * self.ref_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionReport {
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
    pub order_id: String,
    pub avg_price: f64,
}

/// Fills orders, simulated or real
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn execute(&self, request: OrderRequest) -> Result<ExecutionReport>;
}

/// Order gateway: safety checks, then a simulated fill or a signed market order.
#[derive(Clone, Default)]
pub struct OrderGateway {
    trader: Option<BinanceTrader>,
}

impl OrderGateway {
    pub fn new(trader: Option<BinanceTrader>) -> Self {
        Self { trader }
    }

    /// Gateway that can only simulate; LIVE requests fail with missing credentials
    pub fn simulated() -> Self {
        Self { trader: None }
    }

    fn check(&self, request: &OrderRequest) -> Result<()> {
        if request.ref_price.is_nan() || request.ref_price <= 0.0 || !request.amount.is_finite() {
            return Err(BotError::InvalidData(format!(
                "{} {} needs a positive reference price",
                request.side, request.symbol
            )));
        }

        let notional = request.notional();
        if notional < MIN_NOTIONAL_USD {
            return Err(BotError::BelowMinNotional {
                notional,
                minimum: MIN_NOTIONAL_USD,
            });
        }

        if request.side == OrderSide::Buy && request.amount > MAX_BUY_NOTIONAL {
            return Err(BotError::SafetyLimit(format!(
                "BUY of ${:.2} exceeds the ${:.0} ceiling",
                request.amount, MAX_BUY_NOTIONAL
            )));
        }

        Ok(())
    }

    fn simulate(request: &OrderRequest) -> ExecutionReport {
        let (executed_qty, cumulative_quote_qty) = match request.side {
            OrderSide::Buy => (
                format_quantity(&request.symbol, request.amount / request.ref_price),
                request.amount,
            ),
            OrderSide::Sell => {
                let qty = format_quantity(&request.symbol, request.amount);
                (qty, qty * request.ref_price)
            }
        };

        tracing::info!(
            "🧪 SIMULATED ORDER: {} {} {} @ ${}",
            request.side,
            executed_qty,
            request.symbol,
            format_price(request.ref_price)
        );

        ExecutionReport {
            executed_qty,
            cumulative_quote_qty,
            order_id: format!("SIM_{}", Utc::now().timestamp_millis()),
            avg_price: request.ref_price,
        }
    }

    async fn submit(trader: &BinanceTrader, request: &OrderRequest) -> Result<ExecutionReport> {
        let size = match request.side {
            OrderSide::Buy => OrderSize::Quote(request.amount),
            OrderSide::Sell => OrderSize::Base(format_quantity(&request.symbol, request.amount)),
        };

        tracing::info!(
            "💸 REAL ORDER EXECUTING: {} {:?} {}",
            request.side,
            size,
            request.symbol
        );

        let response = trader.market_order(&request.symbol, request.side, size).await?;

        let executed_qty: f64 = response.executed_qty.parse()?;
        let cumulative_quote_qty: f64 = response.cummulative_quote_qty.parse()?;
        let avg_price = if executed_qty > 0.0 {
            cumulative_quote_qty / executed_qty
        } else {
            request.ref_price
        };

        tracing::info!(
            "✅ Order {} {}: {} filled for ${:.2}",
            response.order_id,
            response.status,
            executed_qty,
            cumulative_quote_qty
        );

        Ok(ExecutionReport {
            executed_qty,
            cumulative_quote_qty,
            order_id: response.order_id.to_string(),
            avg_price,
        })
    }
}

#[async_trait]
impl OrderExecutor for OrderGateway {
    async fn execute(&self, request: OrderRequest) -> Result<ExecutionReport> {
        self.check(&request)?;

        if !request.live {
            return Ok(Self::simulate(&request));
        }

        let Some(trader) = &self.trader else {
            return Err(BotError::MissingCredentials);
        };

        Self::submit(trader, &request).await
    }
}

/// Lot-size decimals by base asset
fn quantity_decimals(symbol: &str) -> i32 {
    if symbol.starts_with("BTC") {
        5
    } else if symbol.starts_with("ETH") {
        4
    } else if symbol.starts_with("SOL") {
        3
    } else if symbol.starts_with("XRP") {
        1
    } else if symbol.starts_with("DOGE") {
        0
    } else {
        5
    }
}

/// Round a base quantity down to the symbol's lot size
pub fn format_quantity(symbol: &str, quantity: f64) -> f64 {
    let factor = 10f64.powi(quantity_decimals(symbol));
    // Nudge before flooring so 0.29 stays 0.29 instead of 0.28999
    ((quantity * factor) + 1e-9).floor() / factor
}

/// Price string at tick-size precision
pub fn format_price(price: f64) -> String {
    let decimals = if price < 0.01 {
        8
    } else if price < 1.0 {
        5
    } else {
        2
    };
    format!("{:.*}", decimals, price)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{ExecutionReport, OrderExecutor, OrderRequest};
    use crate::models::OrderSide;
    use crate::Result;
    use async_trait::async_trait;

    /// Fills every order at one fixed price
    pub struct FixedFill(pub f64);

    #[async_trait]
    impl OrderExecutor for FixedFill {
        async fn execute(&self, request: OrderRequest) -> Result<ExecutionReport> {
            let executed_qty = match request.side {
                OrderSide::Buy => request.amount / self.0,
                OrderSide::Sell => request.amount,
            };
            Ok(ExecutionReport {
                executed_qty,
                cumulative_quote_qty: executed_qty * self.0,
                order_id: "42".to_string(),
                avg_price: self.0,
            })
        }
    }
}
