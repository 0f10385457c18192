//! Client library for the investment-transactions API: filtered, paginated
//! fetching with client-side aggregation and CSV export.

pub mod api;
pub mod config;
pub mod export;
pub mod summary;
pub mod utils;

pub use self::{
    api::{ApiError, PageCursor, Transaction, TransactionQuery, TransactionsClient},
    config::{AppConfig, ConfigError, Credentials},
    export::{export_csv, ExportError},
    summary::{summarize, Summary},
    utils::Table,
};
