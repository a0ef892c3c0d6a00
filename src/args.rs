//! These structs provide the CLI interface for the ledger CLI.
//!
//! Argument structs that are also accepted by MCP tools derive `Deserialize` and `JsonSchema` in
//! addition to clap's traits, so both surfaces share one definition.

use crate::finance::{parse_date, Filter};
use crate::model::{AccountKind, Amount, Role, TransactionKind, TransferMethod, TransferStatus};
use crate::payments::SourceKind;
use crate::report::ReportFormat;
use clap::{Parser, Subcommand};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// ledger: Church finance administration from the command line.
///
/// Records tithes, offerings, donations and expenses per branch and ministry, moves funds between
/// finance accounts through an approval workflow, exports reports, and accepts online giving
/// through a payment provider.
///
/// Every command except `init` acts on behalf of a user, given by --actor or LEDGER_ACTOR. What
/// that user may do depends on their role.
///
/// There is also a mode in which an AI agent can use this program through the mcp subcommand.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the database and the first administrator.
    ///
    /// This is the first command you should run. By default data lives in $HOME/ledger; pass
    /// --ledger-home or set LEDGER_HOME to put it somewhere else.
    Init(InitArgs),
    /// Manage who may use the ledger and what they may do.
    #[command(subcommand)]
    Users(UsersCommand),
    /// Manage branches and their ministries.
    #[command(subcommand)]
    Branches(BranchesCommand),
    /// Manage finance accounts.
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// Record, list, summarize, import and void transactions.
    #[command(subcommand)]
    Transactions(TransactionsCommand),
    /// Request, review and complete fund transfers between accounts.
    #[command(subcommand)]
    Transfers(TransfersCommand),
    /// Export reports.
    #[command(subcommand)]
    Report(ReportCommand),
    /// Online giving through the payment provider.
    #[command(subcommand)]
    Payments(PaymentsCommand),
    /// Read the audit log.
    #[command(subcommand)]
    Audit(AuditCommand),
    /// Copy the database into the backups directory.
    Backup,
    /// Run as an MCP server on stdio.
    Mcp,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where ledger data and configuration is held. Defaults to ~/ledger
    #[arg(long, env = "LEDGER_HOME", default_value_t = default_ledger_home())]
    ledger_home: DisplayPath,

    /// The email of the user running the command.
    #[arg(long, env = "LEDGER_ACTOR")]
    actor: Option<String>,
}

impl Common {
    pub fn new(log_level: LevelFilter, ledger_home: PathBuf, actor: Option<String>) -> Self {
        Self {
            log_level,
            ledger_home: ledger_home.into(),
            actor,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn ledger_home(&self) -> &DisplayPath {
        &self.ledger_home
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }
}

/// Args for the `ledger init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The church name, printed at the top of every report.
    #[arg(long)]
    church_name: String,

    /// The email of the first administrator.
    #[arg(long)]
    admin_email: String,

    /// The display name of the first administrator.
    #[arg(long)]
    admin_name: String,
}

impl InitArgs {
    pub fn new(
        church_name: impl Into<String>,
        admin_email: impl Into<String>,
        admin_name: impl Into<String>,
    ) -> Self {
        Self {
            church_name: church_name.into(),
            admin_email: admin_email.into(),
            admin_name: admin_name.into(),
        }
    }

    pub fn church_name(&self) -> &str {
        &self.church_name
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    pub fn admin_name(&self) -> &str {
        &self.admin_name
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum UsersCommand {
    /// Add a user.
    Add(AddUserArgs),
    /// List all users.
    List,
    /// Change a user's role.
    SetRole {
        email: String,
        #[arg(long)]
        role: Role,
    },
    /// Allow a deactivated user to act again.
    Activate { email: String },
    /// Stop a user from doing anything without deleting them.
    Deactivate { email: String },
    /// Delete a user.
    Remove { email: String },
}

#[derive(Debug, Parser, Clone)]
pub struct AddUserArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub role: Role,
    /// The branch (id or name) the user belongs to, if any.
    #[arg(long)]
    pub branch: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BranchesCommand {
    /// Add a branch.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        location: String,
    },
    /// List all branches.
    List,
    /// Rename or relocate a branch.
    Update {
        /// The branch id or name.
        branch: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    /// Delete a branch. Fails while it still owns accounts or transactions.
    Remove { branch: String },
    /// Manage the ministries of a branch.
    #[command(subcommand)]
    Ministries(MinistriesCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum MinistriesCommand {
    /// Add a ministry to a branch.
    Add {
        #[arg(long)]
        branch: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List ministries, optionally for one branch.
    List {
        #[arg(long)]
        branch: Option<String>,
    },
    /// Delete a ministry by id.
    Remove { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AccountsCommand {
    /// Add a finance account.
    Add(AddAccountArgs),
    /// List accounts and their balances.
    List {
        #[arg(long)]
        branch: Option<String>,
    },
    /// Rebuild stored balances from the ledger and report any drift.
    Recompute,
}

#[derive(Debug, Parser, Clone)]
pub struct AddAccountArgs {
    /// The owning branch, by id or name.
    #[arg(long)]
    pub branch: String,
    #[arg(long)]
    pub name: String,
    #[arg(long, value_enum)]
    pub kind: AccountKind,
    /// A ministry of the branch, by id or name.
    #[arg(long)]
    pub ministry: Option<String>,
    /// Bank or e-wallet number, needed to receive payouts.
    #[arg(long, default_value = "")]
    pub account_number: String,
    #[arg(long, default_value = "0")]
    pub opening_balance: Amount,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TransactionsCommand {
    /// Record a tithe, offering or donation.
    RecordDonation(RecordDonationArgs),
    /// Record an expense.
    RecordExpense(RecordExpenseArgs),
    /// List completed transactions.
    List(ListTransactionsArgs),
    /// Show totals for the selected transactions.
    Summary(FilterArgs),
    /// Load transactions from a CSV file. All rows are stored or none.
    Import {
        /// A CSV file with the columns Date,Type,Category,Branch,Amount,Description,Recorded By
        file: PathBuf,
    },
    /// Delete a transaction recorded in error and reverse its effect on the account balance.
    Void { id: String },
}

/// The finance filter. Empty and `all` values are treated as "no criterion".
#[derive(Debug, Default, Clone, PartialEq, Eq, Parser, Serialize, Deserialize, JsonSchema)]
pub struct FilterArgs {
    /// Only this branch, by name.
    #[arg(long)]
    #[serde(default)]
    pub branch: Option<String>,

    /// Earliest date, inclusive. YYYY-MM-DD or MM/DD/YYYY.
    #[arg(long)]
    #[serde(default)]
    pub start: Option<String>,

    /// Latest date, inclusive. YYYY-MM-DD or MM/DD/YYYY.
    #[arg(long)]
    #[serde(default)]
    pub end: Option<String>,

    /// Only Income or only Expense.
    #[arg(long = "type")]
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Only this category.
    #[arg(long)]
    #[serde(default)]
    pub category: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> Filter {
        Filter {
            branch: criterion(&self.branch).map(String::from),
            start: criterion(&self.start).map(parse_date),
            end: criterion(&self.end).map(parse_date),
            kind: criterion(&self.kind).and_then(|k| TransactionKind::from_str(k).ok()),
            category: criterion(&self.category).map(String::from),
        }
    }
}

fn criterion(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

serde_plain::derive_display_from_serialize!(OutputFormat);
serde_plain::derive_fromstr_from_deserialize!(OutputFormat);

#[derive(Debug, Default, Clone, Parser)]
pub struct ListTransactionsArgs {
    #[clap(flatten)]
    pub filter: FilterArgs,

    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

/// Money coming in: a tithe, an offering, or a donation.
#[derive(Debug, Clone, Parser, Serialize, Deserialize, JsonSchema)]
pub struct RecordDonationArgs {
    /// The account to credit, by id or name. Its branch owns the record.
    #[arg(long)]
    #[serde(default)]
    pub account: Option<String>,

    /// The branch that owns the record, when no account is given.
    #[arg(long, required_unless_present = "account")]
    #[serde(default)]
    pub branch: Option<String>,

    /// The amount, for example `1500` or `1,500.00`.
    #[arg(long)]
    pub amount: Amount,

    /// Tithe, Offering, Special Donation, or any other income category.
    #[arg(long, default_value = "Offering")]
    #[serde(default = "default_donation_category")]
    pub category: String,

    #[arg(long)]
    #[serde(default)]
    pub donor: Option<String>,

    /// Defaults to today.
    #[arg(long)]
    #[serde(default)]
    pub date: Option<String>,

    #[arg(long, default_value = "")]
    #[serde(default)]
    pub description: String,
}

fn default_donation_category() -> String {
    crate::model::OFFERING.to_string()
}

/// Money going out.
#[derive(Debug, Clone, Parser, Serialize, Deserialize, JsonSchema)]
pub struct RecordExpenseArgs {
    /// The account to debit, by id or name. Its branch owns the record.
    #[arg(long)]
    #[serde(default)]
    pub account: Option<String>,

    /// The branch that owns the record, when no account is given.
    #[arg(long, required_unless_present = "account")]
    #[serde(default)]
    pub branch: Option<String>,

    #[arg(long)]
    pub amount: Amount,

    /// For example Electricity, Rent, Outreach.
    #[arg(long)]
    pub category: String,

    /// Defaults to today.
    #[arg(long)]
    #[serde(default)]
    pub date: Option<String>,

    #[arg(long, default_value = "")]
    #[serde(default)]
    pub description: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum TransfersCommand {
    /// Ask to move money from one account to one or more others.
    Request(RequestTransferArgs),
    /// List transfers, newest first.
    List {
        #[arg(long, value_enum)]
        status: Option<TransferStatus>,
    },
    /// Approve a pending transfer and complete it.
    Approve(ReviewArgs),
    /// Reject a pending transfer.
    Reject(ReviewArgs),
    /// Finish an approved transfer whose completion was interrupted.
    Resume { id: String },
}

/// One destination of a transfer, written `ACCOUNT=AMOUNT` on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Destination {
    /// The account id or name.
    pub account: String,
    pub amount: Amount,
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (account, amount) = s
            .rsplit_once('=')
            .ok_or_else(|| format!("Expected ACCOUNT=AMOUNT, got '{s}'"))?;
        let amount = Amount::from_str(amount).map_err(|e| e.to_string())?;
        Ok(Self {
            account: account.trim().to_string(),
            amount,
        })
    }
}

#[derive(Debug, Clone, Parser, Serialize, Deserialize, JsonSchema)]
pub struct RequestTransferArgs {
    /// The source account, by id or name.
    #[arg(long)]
    pub from: String,

    /// A destination as ACCOUNT=AMOUNT. Repeat for a split transfer.
    #[arg(long = "to", required = true)]
    pub to: Vec<Destination>,

    #[arg(long, default_value = "")]
    #[serde(default)]
    pub purpose: String,

    #[arg(long, value_enum, default_value_t)]
    #[serde(default)]
    pub method: TransferMethod,
}

#[derive(Debug, Clone, Parser)]
pub struct ReviewArgs {
    pub id: String,

    /// Why the transfer was approved or rejected.
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReportCommand {
    /// Write a PDF or CSV report of the selected transactions.
    Export(ExportArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct ExportArgs {
    #[clap(flatten)]
    pub filter: FilterArgs,

    #[arg(long, value_enum, default_value_t)]
    pub format: ReportFormat,

    /// Where to write the report.
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PaymentsCommand {
    /// Create a checkout for an online gift and record it as pending.
    Checkout(CheckoutArgs),
    /// Mark a pending online gift as paid and credit its account.
    Confirm { transaction_id: String },
    /// List online gifts that have not been confirmed.
    Pending,
}

#[derive(Debug, Clone, Parser)]
pub struct CheckoutArgs {
    /// The account to credit once paid, by id or name.
    #[arg(long)]
    pub account: String,

    #[arg(long)]
    pub amount: Amount,

    #[arg(long, value_enum, default_value_t)]
    pub method: SourceKind,

    #[arg(long, default_value = "Offering")]
    pub category: String,

    #[arg(long)]
    pub donor: Option<String>,

    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuditCommand {
    /// Show audit entries, newest first.
    List {
        #[arg(long)]
        actor: Option<String>,
        /// user, branch, ministry, account, transaction, or transfer.
        #[arg(long)]
        entity: Option<String>,
        #[arg(long, default_value_t = crate::db::DEFAULT_AUDIT_LIMIT)]
        limit: i64,
    },
}

fn default_ledger_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("ledger"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --ledger-home or LEDGER_HOME instead of relying on the default \
                ledger home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("ledger")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
