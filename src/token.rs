use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

pub const MAX_WALLETS_KEY: &str = "Maximum Number of Wallets Allowed";
pub const TOKENS_PER_WALLET_KEY: &str = "Number of Tokens per Wallet";
pub const PROJECT_NAME_KEY: &str = "Project Name";

/// A token record as served by the inventory endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToken {
    mint_address: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    balance: Option<f64>,
    #[serde(default)]
    metadata: Option<RawMetadataField>,
}

// Both dialects are served: a bare object, or an array holding one object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMetadataField {
    Many(Vec<RawMetadata>),
    One(RawMetadata),
    Other(IgnoredAny),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default)]
    token_name: Option<String>,
    #[serde(default)]
    token_symbol: Option<String>,
    #[serde(default)]
    token_description: Option<RawDescription>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDescription {
    #[serde(default)]
    token_data: Map<String, Value>,
    #[serde(default)]
    project_data: Map<String, Value>,
}

impl RawMetadataField {
    fn into_first(self) -> Option<RawMetadata> {
        match self {
            RawMetadataField::Many(list) => list.into_iter().next(),
            RawMetadataField::One(metadata) => Some(metadata),
            RawMetadataField::Other(_) => None,
        }
    }
}

/// Descriptive metadata of a token, normalized from either wire dialect.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenDetails {
    pub project_name: Option<String>,
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub currency_type: Option<String>,
    pub consumable_name: Option<String>,
    pub wallet_cost: Option<f64>,
    /// `None` when absent or not a JSON number.
    pub max_wallets: Option<f64>,
    /// `None` when absent or not a JSON number.
    pub tokens_per_wallet: Option<f64>,
}

impl TokenDetails {
    fn from_raw(raw: RawMetadata) -> Self {
        let description = raw.token_description.unwrap_or_default();
        let data = &description.token_data;
        let project = &description.project_data;

        TokenDetails {
            project_name: string_field(data, &[PROJECT_NAME_KEY]),
            token_name: string_field(data, &["Token Name"]).or(raw.token_name),
            token_symbol: string_field(data, &["Token Symbol"]).or(raw.token_symbol),
            currency_type: string_field(data, &["Currency Type", "currency_type"]),
            consumable_name: string_field(project, &["Consumable Name", "consumable_name"]),
            wallet_cost: data.get("Wallet Cost").and_then(lenient_number),
            max_wallets: data.get(MAX_WALLETS_KEY).and_then(Value::as_f64),
            tokens_per_wallet: data.get(TOKENS_PER_WALLET_KEY).and_then(Value::as_f64),
        }
    }
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

// Only used for informational fields; capacity fields stay strict.
fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
        _ => None,
    }
}

/// Canonical token record used everywhere past the fetch boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub mint_address: String,
    pub name: String,
    pub symbol: String,
    pub balance: f64,
    pub details: Option<TokenDetails>,
}

impl Token {
    /// Name shown on the chart: the project name, falling back to the token name.
    pub fn display_name(&self) -> &str {
        self.details
            .as_ref()
            .and_then(|d| d.project_name.as_deref())
            .unwrap_or(&self.name)
    }

    /// Both capacity fields, if present and numeric.
    pub fn capacity_fields(&self) -> Option<(f64, f64)> {
        let details = self.details.as_ref()?;
        Some((details.max_wallets?, details.tokens_per_wallet?))
    }
}

impl From<RawToken> for Token {
    fn from(raw: RawToken) -> Self {
        Token {
            mint_address: raw.mint_address,
            name: raw.name.unwrap_or_default(),
            symbol: raw.symbol.unwrap_or_default(),
            balance: raw.balance.unwrap_or_default(),
            details: raw
                .metadata
                .and_then(RawMetadataField::into_first)
                .map(TokenDetails::from_raw),
        }
    }
}

/// Parse a response body into canonical tokens.
///
/// The body must be a JSON array. A record that cannot be read as a token
/// (no mint address, wrongly typed field) is skipped so the rest still show.
pub fn from_slice(body: &[u8]) -> Result<Vec<Token>, serde_json::Error> {
    let records: Vec<Value> = serde_json::from_slice(body)?;
    let total = records.len();
    let tokens: Vec<Token> = records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match serde_json::from_value::<RawToken>(record) {
            Ok(raw) => Some(Token::from(raw)),
            Err(e) => {
                warn!(index = i, error = %e, "skipping unreadable token record");
                None
            }
        })
        .collect();
    if tokens.len() < total {
        warn!(kept = tokens.len(), total, "some token records were skipped");
    }
    Ok(tokens)
}
