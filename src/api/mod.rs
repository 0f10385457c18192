pub mod client;
pub mod models;

pub use client::{PageCursor, TransactionsClient};
pub use models::{ApiError, ApiResponse, Transaction, TransactionQuery};
