//! The command set and its factory.
//!
//! Each wire code maps to one command variant carrying the context it may
//! touch: the bank code alone, the account store, or the network scanner.
//! Argument values are validated when the command is constructed; a command
//! built from bad values still executes and reports its own error line, so
//! every request gets exactly one response.

use bankd_common::{
    ACCOUNT_NUMBER_MAX, ACCOUNT_NUMBER_MIN, AccountNumber, Balance,
};
use bankd_storage::{Store, StoreError};
use thiserror::Error;
use tracing::error;

use crate::{protocol::parse_address, scanner::NetworkScanner};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FactoryError {
    /// The argument count does not match the command's arity.
    #[error("invalid arguments")]
    InvalidArguments,
    /// An argument failed to carry a usable value at all.
    #[error("argument value error")]
    ArgumentValue,
}

#[derive(Debug, Clone)]
pub struct BankCodeContext {
    pub bank_code: String,
}

#[derive(Debug, Clone)]
pub struct StorageContext {
    pub bank_code: String,
    pub store: Store,
}

#[derive(Debug, Clone)]
pub struct NetworkContext {
    pub our_ip: String,
    pub scanner: NetworkScanner,
}

/// Every command the node understands, ready to execute.
#[derive(Debug)]
pub enum Command {
    BankCode(BankCodeCommand),
    CreateAccount(CreateAccountCommand),
    RemoveAccount(RemoveAccountCommand),
    Deposit(DepositCommand),
    Withdraw(WithdrawCommand),
    Balance(BalanceCommand),
    TotalAmount(TotalAmountCommand),
    ClientCount(ClientCountCommand),
    RobberyPlan(RobberyPlanCommand),
}

impl Command {
    /// Runs the command and produces exactly one response line (no CRLF).
    pub async fn execute(self) -> String {
        match self {
            Command::BankCode(cmd) => cmd.execute(),
            Command::CreateAccount(cmd) => cmd.execute().await,
            Command::RemoveAccount(cmd) => cmd.execute().await,
            Command::Deposit(cmd) => cmd.execute().await,
            Command::Withdraw(cmd) => cmd.execute().await,
            Command::Balance(cmd) => cmd.execute().await,
            Command::TotalAmount(cmd) => cmd.execute().await,
            Command::ClientCount(cmd) => cmd.execute().await,
            Command::RobberyPlan(cmd) => cmd.execute().await,
        }
    }
}

/// Maps wire codes to command constructors bound to their contexts.
#[derive(Debug, Clone)]
pub struct CommandFactory {
    bank_code: BankCodeContext,
    storage: StorageContext,
    network: NetworkContext,
}

impl CommandFactory {
    pub fn new(
        bank_code: BankCodeContext,
        storage: StorageContext,
        network: NetworkContext,
    ) -> Self {
        Self {
            bank_code,
            storage,
            network,
        }
    }

    /// Builds the command registered under `code`, or `None` for an unknown
    /// code. An argument-count mismatch fails construction.
    pub fn create(&self, code: &str, args: &[String]) -> Option<Result<Command, FactoryError>> {
        let command = match code {
            "BC" => with_arity(args, 0, || {
                Command::BankCode(BankCodeCommand {
                    ctx: self.bank_code.clone(),
                })
            }),
            "AC" => with_arity(args, 0, || {
                Command::CreateAccount(CreateAccountCommand {
                    ctx: self.storage.clone(),
                })
            }),
            "AR" => with_arity(args, 1, || {
                Command::RemoveAccount(RemoveAccountCommand::new(self.storage.clone(), &args[0]))
            }),
            "AD" => with_arity(args, 2, || {
                Command::Deposit(DepositCommand::new(self.storage.clone(), &args[0], &args[1]))
            }),
            "AW" => with_arity(args, 2, || {
                Command::Withdraw(WithdrawCommand::new(self.storage.clone(), &args[0], &args[1]))
            }),
            "AB" => with_arity(args, 1, || {
                Command::Balance(BalanceCommand::new(self.storage.clone(), &args[0]))
            }),
            "BA" => with_arity(args, 0, || {
                Command::TotalAmount(TotalAmountCommand {
                    ctx: self.storage.clone(),
                })
            }),
            "BN" => with_arity(args, 0, || {
                Command::ClientCount(ClientCountCommand {
                    ctx: self.storage.clone(),
                })
            }),
            "ROP" => with_arity(args, 1, || {
                Command::RobberyPlan(RobberyPlanCommand::new(self.network.clone(), &args[0]))
            }),
            _ => return None,
        };
        Some(command)
    }
}

fn with_arity(
    args: &[String],
    expected: usize,
    build: impl FnOnce() -> Command,
) -> Result<Command, FactoryError> {
    if args.len() == expected {
        Ok(build())
    } else {
        Err(FactoryError::InvalidArguments)
    }
}

fn success_response(code: &str, message: Option<&str>) -> String {
    match message {
        Some(message) => format!("{code} {message}"),
        None => code.to_string(),
    }
}

fn error_response(message: &str) -> String {
    format!("ER {message}")
}

/// Account number out of an `"<account>/<owner>"` address, if parseable.
fn parse_account(address: &str) -> Option<AccountNumber> {
    let (account, _) = parse_address(address)?;
    account.parse().ok()
}

/// Strictly positive amount, or nothing.
fn parse_amount(value: &str) -> Option<Balance> {
    let amount: Balance = value.parse().ok()?;
    (amount > 0).then_some(amount)
}

fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped.chars().rev().collect()
}

/// `BC`: reports the node's bank code.
#[derive(Debug)]
pub struct BankCodeCommand {
    ctx: BankCodeContext,
}

impl BankCodeCommand {
    fn execute(self) -> String {
        success_response("BC", Some(&self.ctx.bank_code))
    }
}

/// `AC`: opens a new account under a fresh random number.
#[derive(Debug)]
pub struct CreateAccountCommand {
    ctx: StorageContext,
}

impl CreateAccountCommand {
    async fn execute(self) -> String {
        match self.ctx.store.create_account().await {
            Ok(account) => {
                success_response("AC", Some(&format!("{account}/{}", self.ctx.bank_code)))
            }
            Err(e) => {
                error!("Error while creating account: {e}");
                error_response("Failed to create account, try again later")
            }
        }
    }
}

/// `AR`: removes an account.
#[derive(Debug)]
pub struct RemoveAccountCommand {
    ctx: StorageContext,
    account: Option<AccountNumber>,
}

impl RemoveAccountCommand {
    fn new(ctx: StorageContext, address: &str) -> Self {
        Self {
            ctx,
            account: parse_account(address),
        }
    }

    async fn execute(self) -> String {
        // A malformed address can match no row, same as a missing account.
        let Some(account) = self.account else {
            return error_response("Account not found");
        };
        match self.ctx.store.remove_account(account).await {
            Ok(()) => success_response("AR", None),
            Err(StoreError::AccountNotFound) => error_response("Account not found"),
            Err(e) => {
                error!("Error while removing account: {e}");
                error_response("Error while removing account")
            }
        }
    }
}

/// `AD`: deposits a positive amount into an account.
#[derive(Debug)]
pub struct DepositCommand {
    ctx: StorageContext,
    params: Option<(AccountNumber, Balance)>,
}

impl DepositCommand {
    fn new(ctx: StorageContext, address: &str, amount: &str) -> Self {
        let params = parse_account(address).zip(parse_amount(amount));
        Self { ctx, params }
    }

    async fn execute(self) -> String {
        let Some((account, amount)) = self.params else {
            return error_response("Invalid parameters");
        };
        match self.ctx.store.deposit(account, amount).await {
            Ok(()) => success_response("AD", None),
            Err(StoreError::AccountNotFound) => error_response("Invalid account number"),
            Err(e) => {
                error!("Error while depositing: {e}");
                error_response("Error while depositing")
            }
        }
    }
}

/// `AW`: withdraws a positive amount, refused when funds are short.
#[derive(Debug)]
pub struct WithdrawCommand {
    ctx: StorageContext,
    params: Option<(AccountNumber, Balance)>,
}

impl WithdrawCommand {
    fn new(ctx: StorageContext, address: &str, amount: &str) -> Self {
        let params = parse_account(address).zip(parse_amount(amount));
        Self { ctx, params }
    }

    async fn execute(self) -> String {
        let Some((account, amount)) = self.params else {
            return error_response("Invalid parameters");
        };
        match self.ctx.store.withdraw(account, amount).await {
            Ok(()) => success_response("AW", None),
            Err(StoreError::AccountNotFound) => error_response("Account not found"),
            Err(StoreError::LackOfFunds) => error_response("Lack of funds"),
            Err(e) => {
                error!("Error while withdrawing: {e}");
                error_response("Database error")
            }
        }
    }
}

/// `AB`: reads an account balance from the cache.
#[derive(Debug)]
pub struct BalanceCommand {
    ctx: StorageContext,
    account: Option<AccountNumber>,
}

impl BalanceCommand {
    fn new(ctx: StorageContext, address: &str) -> Self {
        let account = parse_account(address)
            .filter(|n| (ACCOUNT_NUMBER_MIN..=ACCOUNT_NUMBER_MAX).contains(n));
        Self { ctx, account }
    }

    async fn execute(self) -> String {
        let Some(account) = self.account else {
            return error_response("Invalid account number format");
        };
        match self.ctx.store.get_balance(account).await {
            Some(balance) => success_response("AB", Some(&balance.to_string())),
            None => error_response("Account not found"),
        }
    }
}

/// `BA`: total amount held by this node.
#[derive(Debug)]
pub struct TotalAmountCommand {
    ctx: StorageContext,
}

impl TotalAmountCommand {
    async fn execute(self) -> String {
        let total = self.ctx.store.total_amount().await.unwrap_or_else(|e| {
            error!("Failed to read total amount: {e}");
            0
        });
        success_response("BA", Some(&total.to_string()))
    }
}

/// `BN`: number of accounts held by this node.
#[derive(Debug)]
pub struct ClientCountCommand {
    ctx: StorageContext,
}

impl ClientCountCommand {
    async fn execute(self) -> String {
        let count = self.ctx.store.client_count().await.unwrap_or_else(|e| {
            error!("Failed to read client count: {e}");
            0
        });
        success_response("BN", Some(&count.to_string()))
    }
}

/// `ROP`: scans the network and formats a robbery plan for a target amount.
#[derive(Debug)]
pub struct RobberyPlanCommand {
    ctx: NetworkContext,
    target_amount: Option<u64>,
}

impl RobberyPlanCommand {
    fn new(ctx: NetworkContext, target_amount: &str) -> Self {
        Self {
            ctx,
            target_amount: target_amount.parse().ok(),
        }
    }

    async fn execute(self) -> String {
        let Some(target_amount) = self.target_amount else {
            return error_response("Invalid target amount");
        };

        let banks = self.ctx.scanner.scan_network(&self.ctx.our_ip).await;
        if banks.is_empty() {
            return error_response("No banks found in network");
        }

        let targets = self.ctx.scanner.find_robbery_targets(target_amount, &banks);
        if targets.is_empty() {
            return error_response("Could not create robbery plan");
        }

        let total_amount: u64 = targets.iter().map(|b| b.total_amount).sum();
        let total_clients: u64 = targets.iter().map(|b| b.client_count).sum();
        let bank_ips = targets
            .iter()
            .map(|b| b.ip.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        success_response(
            "ROP",
            Some(&format!(
                "To achieve ${}, rob banks {}. You will have to steal: ${}. Affected clients: {}",
                format_thousands(target_amount),
                bank_ips,
                format_thousands(total_amount),
                total_clients
            )),
        )
    }
}
