pub mod types;

pub use types::{ACCOUNT_NUMBER_MAX, ACCOUNT_NUMBER_MIN, AccountNumber, Balance, BankInfo};
