//! Minimal Crypto Pay API client: invoices and exchange rates.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::plans::Plan;

pub const DEFAULT_API_URL: &str = "https://pay.crypt.bot/api";

/// Markup applied to crypto quotes on top of the ruble price.
pub const DEFAULT_MARGIN: f64 = 0.30;

pub struct Client {
    token: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CreateInvoiceRequest {
    currency_type: &'static str,
    fiat: &'static str,
    amount: String,
    description: String,
    payload: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    error: Option<ApiError>,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    name: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Invoice {
    pub invoice_id: i64,
    #[serde(default)]
    pub bot_invoice_url: Option<String>,
    #[serde(default)]
    pub pay_url: Option<String>,
}

impl Invoice {
    pub fn url(&self) -> Option<&str> {
        self.bot_invoice_url.as_deref().or(self.pay_url.as_deref())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ExchangeRate {
    pub source: String,
    pub target: String,
    pub rate: String,
}

/// Invoice payload naming the buyer and the plan: `"<user_id>|<plan_key>"`.
pub fn invoice_payload(user_id: i64, plan: Plan) -> String {
    format!("{}|{}", user_id, plan.key())
}

impl Client {
    pub fn new(token: String, base_url: String) -> Self {
        Self {
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Creates a RUB-denominated invoice for `plan`.
    pub async fn create_invoice(&self, user_id: i64, plan: Plan, amount_rub: u32) -> Result<Invoice, Error> {
        let request = CreateInvoiceRequest {
            currency_type: "fiat",
            fiat: "RUB",
            amount: amount_rub.to_string(),
            description: format!("Subscription:{}", plan.key()),
            payload: invoice_payload(user_id, plan),
        };

        let response = self
            .http
            .post(format!("{}/createInvoice", self.base_url))
            .header("Crypto-Pay-API-Token", &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::unwrap_envelope(response).await
    }

    pub async fn exchange_rates(&self) -> Result<Vec<ExchangeRate>, Error> {
        let response = self
            .http
            .get(format!("{}/getExchangeRates", self.base_url))
            .header("Crypto-Pay-API-Token", &self.token)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        Self::unwrap_envelope(response).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Http(e.to_string()))?;

        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|e| Error::Parse(format!("{status}: {e}")))?;

        if !envelope.ok {
            let detail = match envelope.error {
                Some(ApiError { code: Some(code), name }) => format!("{code} {name}"),
                Some(ApiError { name, .. }) => name,
                None => status.to_string(),
            };
            return Err(Error::Api(detail));
        }

        envelope.result.ok_or(Error::Empty)
    }
}

fn find_rate(rates: &[ExchangeRate], source: &str, target: &str) -> Option<f64> {
    rates
        .iter()
        .find(|r| r.source.eq_ignore_ascii_case(source) && r.target.eq_ignore_ascii_case(target))
        .and_then(|r| r.rate.parse::<f64>().ok())
        .filter(|rate| *rate > 0.0)
}

/// Approximate amount of `asset` covering `rub` plus the margin, with 8
/// decimals. `None` when either USD/RUB or ASSET/USD is missing.
pub fn quote(rub: u32, asset: &str, rates: &[ExchangeRate], margin: f64) -> Option<String> {
    let usd_rub = find_rate(rates, "USD", "RUB")?;
    let asset_usd = find_rate(rates, asset, "USD")?;

    let usd = f64::from(rub) * (1.0 + margin) / usd_rub;
    Some(format!("{:.8}", usd / asset_usd))
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api(String),
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api(e) => write!(f, "Crypto Pay error: {e}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}
