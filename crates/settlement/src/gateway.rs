//! Payment gateway trait and the simulated card gateway.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::Money;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

/// Card details as submitted by the customer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardData {
    pub number: String,
    #[serde(default, alias = "titular")]
    pub holder: Option<String>,
    #[serde(default, alias = "vencimiento")]
    pub expiry: Option<String>,
    #[serde(default)]
    pub cvv: Option<String>,
}

impl CardData {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            ..Default::default()
        }
    }
}

// Hand-written so the card number and CVV never reach the logs.
impl std::fmt::Display for CardData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = normalize_card_number(&self.number);
        let last4 = digits.get(digits.len().saturating_sub(4)..).unwrap_or("");
        write!(f, "card ending {last4}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardBrand {
    Visa,
    Mastercard,
    Amex,
}

/// Why the gateway refused a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    InvalidCard,
    InsufficientFunds,
    ExpiredCard,
}

impl DeclineReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DeclineReason::InvalidCard => "invalid_card",
            DeclineReason::InsufficientFunds => "insufficient_funds",
            DeclineReason::ExpiredCard => "expired_card",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DeclineReason::InvalidCard => "The card number is not valid",
            DeclineReason::InsufficientFunds => "The card has insufficient funds",
            DeclineReason::ExpiredCard => "The card has expired",
        }
    }
}

impl std::fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Deterministic result of a test card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CardOutcome {
    Approved(CardBrand),
    Declined(DeclineReason),
}

/// An entry of the test instrument table.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TestCard {
    pub number: &'static str,
    pub brand: CardBrand,
    #[serde(flatten)]
    pub outcome: CardOutcome,
    pub description: &'static str,
}

pub const TEST_CARDS: &[TestCard] = &[
    TestCard {
        number: "4111111111111111",
        brand: CardBrand::Visa,
        outcome: CardOutcome::Approved(CardBrand::Visa),
        description: "Visa, approved",
    },
    TestCard {
        number: "5555555555554444",
        brand: CardBrand::Mastercard,
        outcome: CardOutcome::Approved(CardBrand::Mastercard),
        description: "Mastercard, approved",
    },
    TestCard {
        number: "378282246310005",
        brand: CardBrand::Amex,
        outcome: CardOutcome::Approved(CardBrand::Amex),
        description: "American Express, approved",
    },
    TestCard {
        number: "4000000000000002",
        brand: CardBrand::Visa,
        outcome: CardOutcome::Declined(DeclineReason::InsufficientFunds),
        description: "Visa, declined for insufficient funds",
    },
    TestCard {
        number: "4000000000000069",
        brand: CardBrand::Visa,
        outcome: CardOutcome::Declined(DeclineReason::ExpiredCard),
        description: "Visa, declined as expired",
    },
];

/// Strips spaces and dashes from a card number.
pub fn normalize_card_number(number: &str) -> String {
    number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

/// Looks a card number up in the test table. Unknown numbers are invalid.
pub fn lookup(number: &str) -> CardOutcome {
    let number = normalize_card_number(number);
    TEST_CARDS
        .iter()
        .find(|card| card.number == number)
        .map(|card| card.outcome)
        .unwrap_or(CardOutcome::Declined(DeclineReason::InvalidCard))
}

/// A successful card authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Authorization {
    pub transaction_id: String,
    pub authorization_code: String,
    pub brand: CardBrand,
}

/// Generates a 6-character uppercase authorization code.
pub fn authorization_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

fn transaction_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("TXN-{}-{suffix:06}", Utc::now().timestamp_millis())
}

#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Delay applied to approved authorizations.
    pub latency: Duration,
}

impl GatewayConfig {
    pub fn with_latency_ms(ms: u64) -> Self {
        Self {
            latency: Duration::from_millis(ms),
        }
    }

    /// No simulated delay.
    pub fn instant() -> Self {
        Self {
            latency: Duration::ZERO,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::with_latency_ms(1500)
    }
}

/// Authorizes card charges.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(
        &self,
        card: &CardData,
        amount: Money,
    ) -> std::result::Result<Authorization, DeclineReason>;
}

/// Gateway that answers from the fixed test card table.
#[derive(Debug, Clone, Default)]
pub struct SimulatedGateway {
    config: GatewayConfig,
}

impl SimulatedGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    #[tracing::instrument(skip(self), fields(card = %card))]
    async fn authorize(
        &self,
        card: &CardData,
        amount: Money,
    ) -> std::result::Result<Authorization, DeclineReason> {
        match lookup(&card.number) {
            CardOutcome::Declined(reason) => Err(reason),
            CardOutcome::Approved(brand) => {
                if !self.config.latency.is_zero() {
                    tokio::time::sleep(self.config.latency).await;
                }
                Ok(Authorization {
                    transaction_id: transaction_id(),
                    authorization_code: authorization_code(),
                    brand,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_table() {
        assert_eq!(
            lookup("4111111111111111"),
            CardOutcome::Approved(CardBrand::Visa)
        );
        assert_eq!(
            lookup("5555 5555 5555 4444"),
            CardOutcome::Approved(CardBrand::Mastercard)
        );
        assert_eq!(
            lookup("3782-822463-10005"),
            CardOutcome::Approved(CardBrand::Amex)
        );
        assert_eq!(
            lookup("4000000000000002"),
            CardOutcome::Declined(DeclineReason::InsufficientFunds)
        );
        assert_eq!(
            lookup("4000000000000069"),
            CardOutcome::Declined(DeclineReason::ExpiredCard)
        );
        assert_eq!(
            lookup("4242424242424242"),
            CardOutcome::Declined(DeclineReason::InvalidCard)
        );
        assert_eq!(lookup(""), CardOutcome::Declined(DeclineReason::InvalidCard));
    }

    #[test]
    fn test_authorization_code_shape() {
        let code = authorization_code();
        assert_eq!(code.len(), 6);
        assert!(
            code.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
    }

    #[test]
    fn test_display_masks_number() {
        let card = CardData::new("4111 1111 1111 1111");
        assert_eq!(card.to_string(), "card ending 1111");
    }

    #[tokio::test(start_paused = true)]
    async fn test_approval_waits_for_latency() {
        let gateway = SimulatedGateway::new(GatewayConfig::with_latency_ms(1500));
        let started = tokio::time::Instant::now();

        let auth = gateway
            .authorize(&CardData::new("4111111111111111"), Money::from_dollars(10))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert!(auth.transaction_id.starts_with("TXN-"));
        assert_eq!(auth.brand, CardBrand::Visa);
    }

    #[tokio::test]
    async fn test_decline_is_immediate() {
        let gateway = SimulatedGateway::new(GatewayConfig::with_latency_ms(60_000));
        let result = gateway
            .authorize(&CardData::new("4000000000000069"), Money::from_dollars(10))
            .await;
        assert_eq!(result, Err(DeclineReason::ExpiredCard));
    }
}
