use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Local};
use ratatui::style::Color;
use tracing::{info, warn};

use crate::config::MonitorConfig;
use crate::error::{FetchError, FETCH_FAILED_MESSAGE};
use crate::token::Token;

/// Label of the row shown for a mint that dropped out of the latest fetch.
pub const PLACEHOLDER_NAME: &str = "Unknown";

/// Frozen sequence of mint addresses controlling row order across refreshes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayOrder {
    mints: Vec<String>,
}

impl DisplayOrder {
    /// Seed the order from `fresh` if it is still empty. Returns true if
    /// the order was frozen by this call.
    pub fn ensure(&mut self, fresh: &[Token]) -> bool {
        if !self.mints.is_empty() || fresh.is_empty() {
            return false;
        }
        self.mints = fresh.iter().map(|t| t.mint_address.clone()).collect();
        true
    }

    pub fn clear(&mut self) {
        self.mints.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.mints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.mints.iter().map(String::as_str)
    }
}

/// True only if both capacity fields are present and numeric.
pub fn is_valid(token: &Token) -> bool {
    token.capacity_fields().is_some()
}

/// An empty prefix excludes nothing.
pub fn is_excluded(token: &Token, excluded_prefix: &str) -> bool {
    !excluded_prefix.is_empty() && token.display_name().starts_with(excluded_prefix)
}

/// One bar pair of the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRow {
    pub name: String,
    pub key: String,
    pub current_balance: f64,
    pub max_capacity: f64,
    pub color: Color,
    pub placeholder: bool,
}

impl DerivedRow {
    fn placeholder(mint: &str) -> Self {
        DerivedRow {
            name: PLACEHOLDER_NAME.to_string(),
            key: mint.to_string(),
            current_balance: 0.0,
            max_capacity: 0.0,
            color: Color::Reset,
            placeholder: true,
        }
    }

    /// Share of capacity still held, in percent. `None` without capacity.
    pub fn utilization(&self) -> Option<f64> {
        (self.max_capacity > 0.0).then(|| self.current_balance / self.max_capacity * 100.0)
    }
}

/// Derive the chart row of a valid token; `None` if it fails validation.
pub fn derive_row(token: &Token) -> Option<DerivedRow> {
    let (max_wallets, tokens_per_wallet) = token.capacity_fields()?;
    Some(DerivedRow {
        name: token.display_name().to_string(),
        key: token.mint_address.clone(),
        current_balance: token.balance,
        max_capacity: max_wallets * tokens_per_wallet,
        color: Color::Reset,
        placeholder: false,
    })
}

/// Build the rows in display order.
///
/// A mint missing from `tokens` yields a zero placeholder row, while a token
/// that is present but invalid or excluded is dropped altogether.
pub fn chart_rows(
    order: &DisplayOrder,
    tokens: &[Token],
    excluded_prefix: &str,
    palette: &[Color],
) -> Vec<DerivedRow> {
    let mut by_mint: HashMap<&str, &Token> = HashMap::with_capacity(tokens.len());
    for token in tokens {
        by_mint.entry(token.mint_address.as_str()).or_insert(token);
    }

    let mut rows: Vec<DerivedRow> = order
        .iter()
        .filter_map(|mint| match by_mint.get(mint) {
            None => Some(DerivedRow::placeholder(mint)),
            Some(token) if !is_valid(token) || is_excluded(token, excluded_prefix) => None,
            Some(token) => derive_row(token),
        })
        .collect();

    if !palette.is_empty() {
        for (i, row) in rows.iter_mut().enumerate() {
            row.color = palette[i % palette.len()];
        }
    }
    rows
}

/// Totals shown on the summary cards.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Summary {
    pub tokens: usize,
    pub total_capacity: f64,
    pub in_circulation: f64,
    pub consumed: f64,
}

impl Summary {
    pub fn from_rows(rows: &[DerivedRow]) -> Self {
        rows.iter()
            .filter(|r| !r.placeholder)
            .fold(Summary::default(), |mut s, r| {
                s.tokens += 1;
                s.total_capacity += r.max_capacity;
                s.in_circulation += r.current_balance;
                s.consumed += (r.max_capacity - r.current_balance).max(0.0);
                s
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: DateTime<Local>,
    pub in_circulation: f64,
    pub consumed: f64,
}

/// Bounded in-memory series of circulation samples, one per applied refresh.
#[derive(Debug, Clone)]
pub struct History {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        History {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

/// Identity of an issued fetch, captured when the request starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub request: u64,
    pub epoch: u64,
    pub wallet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    Failed,
    Stale,
}

/// Monitor state for one dashboard: latest tokens, frozen order, error flag.
///
/// Responses are fenced by ticket: a response is applied only if it was
/// issued for the current wallet and is newer than the last applied one.
#[derive(Debug)]
pub struct Monitor {
    config: MonitorConfig,
    wallet_index: usize,
    tokens: Vec<Token>,
    order: DisplayOrder,
    error: Option<String>,
    loading: bool,
    history: History,
    last_update: Option<DateTime<Local>>,
    epoch: u64,
    next_request: u64,
    last_applied: u64,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        let history = History::new(config.history_len);
        Monitor {
            config,
            wallet_index: 0,
            tokens: Vec::new(),
            order: DisplayOrder::default(),
            error: None,
            loading: true,
            history,
            last_update: None,
            epoch: 0,
            next_request: 0,
            last_applied: 0,
        }
    }

    pub fn wallet(&self) -> &str {
        self.config
            .wallets
            .get(self.wallet_index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn wallet_position(&self) -> (usize, usize) {
        (self.wallet_index + 1, self.config.wallets.len())
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn order(&self) -> &DisplayOrder {
        &self.order
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    pub fn begin_fetch(&mut self) -> FetchTicket {
        self.next_request += 1;
        FetchTicket {
            request: self.next_request,
            epoch: self.epoch,
            wallet: self.wallet().to_string(),
        }
    }

    pub fn apply(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<Token>, FetchError>,
    ) -> Applied {
        if ticket.epoch != self.epoch || ticket.request <= self.last_applied {
            info!(
                request = ticket.request,
                wallet = %ticket.wallet,
                "discarding stale token data response"
            );
            return Applied::Stale;
        }
        self.last_applied = ticket.request;
        self.loading = false;

        match result {
            Ok(tokens) => {
                self.tokens = tokens;
                if self.order.ensure(&self.tokens) {
                    info!(wallet = %ticket.wallet, tokens = self.order.len(), "display order frozen");
                }
                self.error = None;

                let now = Local::now();
                let summary = self.summary();
                self.history.push(Sample {
                    at: now,
                    in_circulation: summary.in_circulation,
                    consumed: summary.consumed,
                });
                self.last_update = Some(now);
                Applied::Updated
            }
            Err(e) => {
                warn!(wallet = %ticket.wallet, error = %e, parse = e.is_parse(), "token data refresh failed");
                self.error = Some(FETCH_FAILED_MESSAGE.to_string());
                Applied::Failed
            }
        }
    }

    /// Select the wallet at `index` (wrapping) and forget everything known
    /// about the previous one. In-flight responses become stale.
    pub fn switch_wallet(&mut self, index: usize) {
        let count = self.config.wallets.len().max(1);
        self.wallet_index = index % count;
        self.tokens.clear();
        self.order.clear();
        self.history.clear();
        self.error = None;
        self.loading = true;
        self.last_update = None;
        self.epoch += 1;
        info!(wallet = %self.wallet(), "switched wallet");
    }

    pub fn next_wallet(&mut self) {
        self.switch_wallet(self.wallet_index + 1);
    }

    pub fn previous_wallet(&mut self) {
        let count = self.config.wallets.len().max(1);
        self.switch_wallet(self.wallet_index + count - 1);
    }

    pub fn rows(&self) -> Vec<DerivedRow> {
        chart_rows(
            &self.order,
            &self.tokens,
            &self.config.excluded_prefix,
            &self.config.palette,
        )
    }

    pub fn summary(&self) -> Summary {
        Summary::from_rows(&self.rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::token::tests::token;
    use serde_json::json;

    fn valid(mint: &str, name: &str, balance: f64, max: f64, per_wallet: f64) -> Token {
        token(mint, name, balance, json!(max), json!(per_wallet))
    }

    fn monitor() -> Monitor {
        let config = Config {
            wallets: vec!["w1".into(), "w2".into()],
            history_len: 3,
            ..Config::default()
        };
        Monitor::new(config.monitor_config().unwrap())
    }

    const PALETTE: [Color; 2] = [Color::Red, Color::Blue];

    #[test]
    fn test_example_rows() {
        let tokens = vec![
            valid("A", "Alpha", 100.0, 5.0, 1000.0),
            valid("B", "Beta", 0.0, 0.0, 0.0),
        ];
        let mut order = DisplayOrder::default();
        order.ensure(&tokens);

        let rows = chart_rows(&order, &tokens, "AT", &PALETTE);
        let values: Vec<_> = rows
            .iter()
            .map(|r| (r.key.as_str(), r.current_balance, r.max_capacity))
            .collect();
        assert_eq!(values, vec![("A", 100.0, 5000.0), ("B", 0.0, 0.0)]);
        assert_eq!(rows[0].name, "Alpha");
    }

    #[test]
    fn test_max_capacity_is_product() {
        for (max, per_wallet) in [(3.0, 7.0), (12.0, 250.0), (1.5, 4.0)] {
            let row = derive_row(&valid("A", "Alpha", 1.0, max, per_wallet)).unwrap();
            assert_eq!(row.max_capacity, max * per_wallet);
        }
    }

    #[test]
    fn test_order_is_frozen_after_first_nonempty_fetch() {
        let mut order = DisplayOrder::default();
        assert!(!order.ensure(&[]));
        assert!(order.is_empty());

        let first = vec![valid("A", "a", 1.0, 1.0, 1.0), valid("B", "b", 1.0, 1.0, 1.0)];
        assert!(order.ensure(&first));

        let second = vec![valid("B", "b", 2.0, 1.0, 1.0), valid("A", "a", 2.0, 1.0, 1.0)];
        assert!(!order.ensure(&second));
        assert_eq!(order.iter().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_invalid_and_excluded_are_dropped() {
        let tokens = vec![
            token("A", "Alpha", 1.0, json!("N/A"), json!(10)),
            valid("B", "ATM cartridge", 1.0, 2.0, 3.0),
            valid("C", "Gamma", 1.0, 2.0, 3.0),
        ];
        let mut order = DisplayOrder::default();
        order.ensure(&tokens);

        assert!(!is_valid(&tokens[0]));
        assert!(is_excluded(&tokens[1], "AT"));
        assert!(!is_excluded(&tokens[2], "AT"));

        let rows = chart_rows(&order, &tokens, "AT", &PALETTE);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "C");
        assert_eq!(rows[0].color, Color::Red);

        // an empty prefix disables exclusion
        let rows = chart_rows(&order, &tokens, "", &PALETTE);
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_missing_mint_yields_placeholder() {
        let first = vec![valid("A", "Alpha", 1.0, 2.0, 3.0), valid("B", "Beta", 4.0, 5.0, 6.0)];
        let mut order = DisplayOrder::default();
        order.ensure(&first);

        let later = vec![valid("B", "Beta", 4.0, 5.0, 6.0), valid("Z", "Zeta", 1.0, 1.0, 1.0)];
        let rows = chart_rows(&order, &later, "AT", &PALETTE);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, PLACEHOLDER_NAME);
        assert_eq!(rows[0].key, "A");
        assert_eq!(rows[0].current_balance, 0.0);
        assert_eq!(rows[0].max_capacity, 0.0);
        assert!(rows[0].placeholder);
        assert_eq!(rows[1].key, "B");
        assert_eq!(rows[1].color, Color::Blue);
    }

    #[test]
    fn test_palette_wraps() {
        let tokens: Vec<_> = ["A", "B", "C"]
            .iter()
            .map(|m| valid(m, m, 1.0, 1.0, 1.0))
            .collect();
        let mut order = DisplayOrder::default();
        order.ensure(&tokens);
        let colors: Vec<_> = chart_rows(&order, &tokens, "AT", &PALETTE)
            .into_iter()
            .map(|r| r.color)
            .collect();
        assert_eq!(colors, vec![Color::Red, Color::Blue, Color::Red]);
    }

    #[test]
    fn test_summary_skips_placeholders() {
        let rows = vec![
            derive_row(&valid("A", "a", 100.0, 5.0, 1000.0)).unwrap(),
            derive_row(&valid("B", "b", 50.0, 1.0, 10.0)).unwrap(),
            DerivedRow::placeholder("C"),
        ];
        let summary = Summary::from_rows(&rows);
        assert_eq!(summary.tokens, 2);
        assert_eq!(summary.total_capacity, 5010.0);
        assert_eq!(summary.in_circulation, 150.0);
        assert_eq!(summary.consumed, 4900.0);
    }

    #[test]
    fn test_utilization() {
        let row = derive_row(&valid("A", "a", 250.0, 1.0, 1000.0)).unwrap();
        assert_eq!(row.utilization(), Some(25.0));
        assert_eq!(DerivedRow::placeholder("B").utilization(), None);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut history = History::new(2);
        for i in 0..3 {
            history.push(Sample {
                at: Local::now(),
                in_circulation: i as f64,
                consumed: 0.0,
            });
        }
        let values: Vec<_> = history.iter().map(|s| s.in_circulation).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_apply_success_and_error() {
        let mut m = monitor();
        assert!(m.is_loading());

        let ticket = m.begin_fetch();
        assert_eq!(ticket.wallet, "w1");
        let outcome = m.apply(&ticket, Ok(vec![valid("A", "a", 1.0, 2.0, 3.0)]));
        assert_eq!(outcome, Applied::Updated);
        assert!(!m.is_loading());
        assert_eq!(m.rows().len(), 1);
        assert_eq!(m.history().len(), 1);

        let ticket = m.begin_fetch();
        let outcome = m.apply(&ticket, Err(FetchError::EmptyWallet));
        assert_eq!(outcome, Applied::Failed);
        assert_eq!(m.error(), Some(FETCH_FAILED_MESSAGE));
        // previous data is retained, the error only changes what is shown
        assert_eq!(m.tokens().len(), 1);

        let ticket = m.begin_fetch();
        m.apply(&ticket, Ok(vec![valid("A", "a", 1.0, 2.0, 3.0)]));
        assert_eq!(m.error(), None);
    }

    #[test]
    fn test_out_of_order_responses_are_discarded() {
        let mut m = monitor();
        let slow = m.begin_fetch();
        let fast = m.begin_fetch();

        assert_eq!(m.apply(&fast, Ok(vec![valid("B", "b", 1.0, 1.0, 1.0)])), Applied::Updated);
        assert_eq!(m.apply(&slow, Ok(vec![valid("A", "a", 1.0, 1.0, 1.0)])), Applied::Stale);
        assert_eq!(m.tokens()[0].mint_address, "B");
    }

    #[test]
    fn test_wallet_switch_discards_in_flight_response() {
        let mut m = monitor();
        let first = m.begin_fetch();
        m.apply(&first, Ok(vec![valid("A", "a", 1.0, 1.0, 1.0)]));

        let in_flight = m.begin_fetch();
        m.next_wallet();
        assert_eq!(m.wallet(), "w2");
        assert!(m.tokens().is_empty());
        assert!(m.order().is_empty());
        assert!(m.history().is_empty());
        assert!(m.is_loading());

        assert_eq!(
            m.apply(&in_flight, Ok(vec![valid("A", "a", 1.0, 1.0, 1.0)])),
            Applied::Stale
        );

        let fresh = m.begin_fetch();
        assert_eq!(fresh.wallet, "w2");
        m.apply(&fresh, Ok(vec![valid("C", "c", 1.0, 1.0, 1.0)]));
        assert_eq!(m.order().iter().collect::<Vec<_>>(), vec!["C"]);

        m.next_wallet();
        assert_eq!(m.wallet(), "w1");
        m.previous_wallet();
        assert_eq!(m.wallet(), "w2");
        assert_eq!(m.wallet_position(), (2, 2));
    }
}
