use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Page size the server applies when the query does not set one
pub const DEFAULT_LIMIT: u32 = 1000;
/// Hard cap the server clamps any requested page size to
pub const MAX_LIMIT: u32 = 5000;

/// Transaction kind as stored server-side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Expense,
    Income,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Expense => "expense",
            TransactionType::Income => "income",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two record dates the server filters and sorts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateField {
    TransactionDate,
    ValueDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Date,
    Amount,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Immutable filter/pagination/sort criteria for one logical query.
///
/// Build with the chainable `with_*` setters; `validate` runs once before the
/// first request so a bad limit or an inverted range never reaches the wire.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_types: Option<Vec<TransactionType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accounts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub date_type: DateField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_in_stats: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<f64>,
    pub limit: u32,
    pub offset: u32,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        TransactionQuery {
            categories: None,
            transaction_types: None,
            accounts: None,
            description_filter: None,
            start_date: None,
            end_date: None,
            date_type: DateField::ValueDate,
            include_in_stats: None,
            min_amount: None,
            max_amount: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort_by: SortField::Date,
            sort_order: SortOrder::Desc,
        }
    }
}

impl TransactionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_transaction_types(mut self, types: Vec<TransactionType>) -> Self {
        self.transaction_types = Some(types);
        self
    }

    pub fn with_accounts<I, S>(mut self, accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accounts = Some(accounts.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_description_filter(mut self, keyword: impl Into<String>) -> Self {
        self.description_filter = Some(keyword.into());
        self
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn with_date_type(mut self, date_type: DateField) -> Self {
        self.date_type = date_type;
        self
    }

    pub fn with_include_in_stats(mut self, include: bool) -> Self {
        self.include_in_stats = Some(include);
        self
    }

    pub fn with_amount_range(mut self, min: f64, max: f64) -> Self {
        self.min_amount = Some(min);
        self.max_amount = Some(max);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_sort(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = field;
        self.sort_order = order;
        self
    }

    /// Check the criteria against the server's documented bounds
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(ApiError::InvalidQuery(format!(
                "limit must be between 1 and {}, got {}",
                MAX_LIMIT, self.limit
            )));
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
            if min > max {
                return Err(ApiError::InvalidQuery(format!(
                    "min_amount {} is greater than max_amount {}",
                    min, max
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ApiError::InvalidQuery(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Joined category row, present when the transaction has one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub budget: Option<f64>,
}

/// Joined account row, present when the transaction has one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountRef {
    pub id: String,
    pub name: String,
    pub account_type: Option<String>,
    pub bank: Option<String>,
}

/// One transaction record as returned by the API. Treated as an immutable
/// value once received; the server owns the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub description: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub transaction_date: NaiveDate,
    pub value_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub include_in_stats: bool,
    pub transfer_fee: Option<f64>,
    pub category_id: Option<String>,
    pub categories: Option<CategoryRef>,
    pub account_id: Option<String>,
    pub accounts: Option<AccountRef>,
}

/// Pagination block of a page response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    pub total: u64,
    #[serde(default)]
    pub returned: Option<u32>,
    pub has_more: bool,
}

/// Aggregate block the server computes over the returned page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSummary {
    pub total_transactions: u64,
    #[serde(default)]
    pub returned_transactions: Option<u64>,
    pub expense_count: u64,
    pub income_count: u64,
    pub transfer_count: u64,
    pub total_expenses: f64,
    pub total_income: f64,
    pub total_transfers: f64,
    #[serde(default)]
    pub total_transfer_fees: Option<f64>,
    pub net_total: f64,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
}

/// Full body of a successful page response
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Vec<Transaction>,
    pub summary: Option<ServerSummary>,
    pub pagination: Pagination,
    #[serde(default)]
    pub error: Option<String>,
}

/// Errors surfaced by the transactions API client
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("Malformed response: {0}")]
    Protocol(String),
    #[error("Pagination exceeded the safety cap of {0} pages")]
    PageLimitExceeded(u32),
    #[error("Fetch cancelled after {0} page(s)")]
    Cancelled(u32),
}
