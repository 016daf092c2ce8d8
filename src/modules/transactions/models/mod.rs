pub mod transaction;

pub use transaction::{
    Transaction, TransactionStatus, TransactionType, NON_RETRYABLE_ERROR_CODES,
};
