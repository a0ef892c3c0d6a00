use church_ledger::args::{
    AccountsCommand, Args, AuditCommand, BranchesCommand, Command, MinistriesCommand,
    PaymentsCommand, ReportCommand, TransactionsCommand, TransfersCommand, UsersCommand,
};
use church_ledger::model::UserStatus;
use church_ledger::{commands, Config, Error, ErrorType, Mode, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().ledger_home().path();

    // When LEDGER_IN_TEST_MODE is set and non-empty the in-memory payment provider is used,
    // otherwise Mode::Live.
    let mode = Mode::from_env();

    if let Command::Init(init_args) = args.command() {
        commands::init(home, init_args).await?.print();
        return Ok(());
    }

    let actor = args.common().actor().ok_or_else(|| {
        Error::msg(
            ErrorType::Permission,
            "No acting user, pass --actor or set LEDGER_ACTOR",
        )
    })?;
    let config = Config::load(home).await?;

    let _: () = match args.command() {
        // Handled above, before an actor is required.
        Command::Init(_) => {}

        Command::Users(users) => match users {
            UsersCommand::Add(a) => commands::add_user(config, actor, a.clone()).await?.print(),
            UsersCommand::List => commands::list_users(config, actor).await?.print(),
            UsersCommand::SetRole { email, role } => {
                commands::set_user_role(config, actor, email, *role)
                    .await?
                    .print()
            }
            UsersCommand::Activate { email } => {
                commands::set_user_status(config, actor, email, UserStatus::Active)
                    .await?
                    .print()
            }
            UsersCommand::Deactivate { email } => {
                commands::set_user_status(config, actor, email, UserStatus::Inactive)
                    .await?
                    .print()
            }
            UsersCommand::Remove { email } => {
                commands::remove_user(config, actor, email).await?.print()
            }
        },

        Command::Branches(branches) => match branches {
            BranchesCommand::Add { name, location } => {
                commands::add_branch(config, actor, name, location)
                    .await?
                    .print()
            }
            BranchesCommand::List => commands::list_branches(config, actor).await?.print(),
            BranchesCommand::Update {
                branch,
                name,
                location,
            } => commands::update_branch(
                config,
                actor,
                branch,
                name.as_deref(),
                location.as_deref(),
            )
            .await?
            .print(),
            BranchesCommand::Remove { branch } => {
                commands::remove_branch(config, actor, branch).await?.print()
            }
            BranchesCommand::Ministries(ministries) => match ministries {
                MinistriesCommand::Add {
                    branch,
                    name,
                    description,
                } => commands::add_ministry(config, actor, branch, name, description)
                    .await?
                    .print(),
                MinistriesCommand::List { branch } => {
                    commands::list_ministries(config, actor, branch.as_deref())
                        .await?
                        .print()
                }
                MinistriesCommand::Remove { id } => {
                    commands::remove_ministry(config, actor, id).await?.print()
                }
            },
        },

        Command::Accounts(accounts) => match accounts {
            AccountsCommand::Add(a) => commands::add_account(config, actor, a.clone())
                .await?
                .print(),
            AccountsCommand::List { branch } => {
                commands::list_accounts(config, actor, branch.as_deref())
                    .await?
                    .print()
            }
            AccountsCommand::Recompute => {
                commands::recompute_balances(config, actor).await?.print()
            }
        },

        Command::Transactions(transactions) => match transactions {
            TransactionsCommand::RecordDonation(a) => {
                commands::record_donation(config, actor, a.clone())
                    .await?
                    .print()
            }
            TransactionsCommand::RecordExpense(a) => {
                commands::record_expense(config, actor, a.clone())
                    .await?
                    .print()
            }
            TransactionsCommand::List(a) => {
                commands::list_transactions(config, actor, &a.filter, a.format)
                    .await?
                    .print()
            }
            TransactionsCommand::Summary(filter) => {
                commands::summarize(config, actor, filter).await?.print()
            }
            TransactionsCommand::Import { file } => {
                commands::import_transactions(config, actor, file)
                    .await?
                    .print()
            }
            TransactionsCommand::Void { id } => {
                commands::void_transaction(config, actor, id).await?.print()
            }
        },

        Command::Transfers(transfers) => match transfers {
            TransfersCommand::Request(a) => commands::request_transfer(config, actor, a.clone())
                .await?
                .print(),
            TransfersCommand::List { status } => {
                commands::list_transfers(config, actor, *status)
                    .await?
                    .print()
            }
            TransfersCommand::Approve(a) => {
                commands::approve_transfer(config, mode, actor, &a.id, a.note.as_deref())
                    .await?
                    .print()
            }
            TransfersCommand::Reject(a) => {
                commands::reject_transfer(config, actor, &a.id, a.note.as_deref())
                    .await?
                    .print()
            }
            TransfersCommand::Resume { id } => {
                commands::resume_transfer(config, mode, actor, id)
                    .await?
                    .print()
            }
        },

        Command::Report(ReportCommand::Export(a)) => {
            commands::export_report(config, actor, a.clone())
                .await?
                .print()
        }

        Command::Payments(payments) => match payments {
            PaymentsCommand::Checkout(a) => commands::checkout(config, mode, actor, a.clone())
                .await?
                .print(),
            PaymentsCommand::Confirm { transaction_id } => {
                commands::confirm_payment(config, actor, transaction_id)
                    .await?
                    .print()
            }
            PaymentsCommand::Pending => commands::list_pending(config, actor).await?.print(),
        },

        Command::Audit(AuditCommand::List {
            actor: by,
            entity,
            limit,
        }) => commands::list_audit(config, actor, by.as_deref(), entity.as_deref(), *limit)
            .await?
            .print(),

        Command::Backup => commands::backup(config, actor).await?.print(),

        Command::Mcp => commands::mcp(config, mode, actor).await?.print(),
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use the default log level for the library and the binary.
            EnvFilter::new(format!(
                "church_ledger={level},{}={level}",
                env!("CARGO_BIN_NAME")
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
