//! Transaction handlers: recording, listing, summarizing, importing and voiding.

use crate::args::{FilterArgs, OutputFormat, RecordDonationArgs, RecordExpenseArgs};
use crate::commands::{authorize, Out};
use crate::error::{ErrorType, IntoResult};
use crate::finance::{
    aggregate, branch_totals, category_totals, export_rows, format_currency, CategoryTotal,
    Summary, HEADERS,
};
use crate::model::{Amount, Permission, TransactionKind, TransactionRecord, User};
use crate::report::{parse_strict_date, read_records, write_records};
use crate::utils::{self, plural};
use crate::{Config, Error, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Records money coming in. The category defaults to `Offering`. Requires `RecordTransactions`.
pub async fn record_donation(
    config: Config,
    actor: &str,
    args: RecordDonationArgs,
) -> Result<Out<TransactionRecord>> {
    let me = authorize(&config, actor, Permission::RecordTransactions).await?;
    let mut record = new_record(
        &me,
        TransactionKind::Income,
        args.amount,
        &args.category,
        args.account.as_deref(),
        args.branch.as_deref(),
        args.date.as_deref(),
    )?
    .with_description(args.description.trim());
    if let Some(donor) = args.donor.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        record = record.with_donor(donor);
    }
    save(&config, &me, record).await
}

/// Records money going out. Requires `RecordTransactions`.
pub async fn record_expense(
    config: Config,
    actor: &str,
    args: RecordExpenseArgs,
) -> Result<Out<TransactionRecord>> {
    let me = authorize(&config, actor, Permission::RecordTransactions).await?;
    let record = new_record(
        &me,
        TransactionKind::Expense,
        args.amount,
        &args.category,
        args.account.as_deref(),
        args.branch.as_deref(),
        args.date.as_deref(),
    )?
    .with_description(args.description.trim());
    save(&config, &me, record).await
}

fn new_record(
    me: &User,
    kind: TransactionKind,
    amount: Amount,
    category: &str,
    account: Option<&str>,
    branch: Option<&str>,
    date: Option<&str>,
) -> Result<TransactionRecord> {
    if !amount.is_positive() {
        return Err(Error::msg(
            ErrorType::Validation,
            format!("The amount must be greater than zero, got {amount}"),
        ));
    }
    let category = category.trim();
    if category.is_empty() {
        return Err(Error::msg(ErrorType::Validation, "A category is required"));
    }
    let date = match date.map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => parse_strict_date(d).pub_result(ErrorType::Validation)?,
        None => Local::now().date_naive(),
    };
    let account = account.map(str::trim).filter(|a| !a.is_empty());
    let branch = branch.map(str::trim).filter(|b| !b.is_empty());
    if account.is_none() && branch.is_none() {
        return Err(Error::msg(
            ErrorType::Validation,
            "Either an account or a branch is required",
        ));
    }
    let record = TransactionRecord::new(
        utils::new_id("txn"),
        kind,
        amount,
        category,
        branch.unwrap_or_default(),
        date,
        &me.email,
    );
    Ok(match account {
        Some(account) => record.with_account(account),
        None => record,
    })
}

async fn save(
    config: &Config,
    me: &User,
    record: TransactionRecord,
) -> Result<Out<TransactionRecord>> {
    let record = config
        .db()
        .record_transaction(&me.email, record)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Recorded {} {} of {} for {} ({})",
            record.category,
            record.kind.as_str().to_lowercase(),
            format_currency(record.amount, config.currency()),
            record.branch,
            record.id
        ),
        record,
    ))
}

/// Lists completed transactions matching `filter`. The message holds the rendering in `format`.
pub async fn list_transactions(
    config: Config,
    actor: &str,
    filter: &FilterArgs,
    format: OutputFormat,
) -> Result<Out<Vec<TransactionRecord>>> {
    authorize(&config, actor, Permission::ViewFinances).await?;
    let records = config
        .db()
        .list_transactions(&filter.to_filter())
        .await
        .pub_result(ErrorType::Database)?;
    let message = match format {
        OutputFormat::Table => table(&records, config.currency()),
        OutputFormat::Json => serde_json::to_string_pretty(&records)
            .map_err(|e| Error::new(ErrorType::Internal, e))?,
        OutputFormat::Csv => {
            let bytes = write_records(&records).pub_result(ErrorType::Report)?;
            String::from_utf8_lossy(&bytes).into_owned()
        }
    };
    Ok(Out::new(message, records))
}

fn table(records: &[TransactionRecord], currency: &str) -> String {
    let rows = export_rows(records, currency);
    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.cells()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: [&str; 7]| {
        cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut out = format!("{} transaction{}\n", records.len(), plural(records.len()));
    out.push_str(&line(HEADERS));
    for row in &rows {
        out.push('\n');
        out.push_str(&line(row.cells()));
    }
    out
}

/// What `summarize` returns: the totals and their breakdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    /// The filter in words, e.g. `Branch: Main | 2025-01-01 to 2025-01-31`.
    pub filter: String,
    pub summary: Summary,
    pub categories: Vec<CategoryTotal>,
    pub branches: Vec<CategoryTotal>,
}

/// Totals for the completed transactions matching `filter`.
pub async fn summarize(
    config: Config,
    actor: &str,
    filter: &FilterArgs,
) -> Result<Out<SummaryReport>> {
    authorize(&config, actor, Permission::ViewFinances).await?;
    let filter = filter.to_filter();
    let records = config
        .db()
        .list_transactions(&filter)
        .await
        .pub_result(ErrorType::Database)?;
    let report = SummaryReport {
        filter: filter.describe(),
        summary: aggregate(&records),
        categories: category_totals(&records),
        branches: branch_totals(&records),
    };
    let money = |a: Amount| format_currency(a, config.currency());
    let s = &report.summary;
    let mut message = format!(
        "{}\n{} transaction{}\n  Income:    {}\n    Tithes:    {}\n    Offerings: {}\n    \
        Donations: {}\n    Other:     {}\n  Expenses:  {}\n  Net:       {}",
        report.filter,
        s.count,
        plural(s.count),
        money(s.income),
        money(s.tithes),
        money(s.offerings),
        money(s.donations),
        money(s.other_income),
        money(s.expenses),
        money(s.net),
    );
    for c in &report.categories {
        message.push_str(&format!(
            "\n  {} / {}: {} ({})",
            c.kind,
            c.name,
            money(c.total),
            c.count
        ));
    }
    Ok(Out::new(message, report))
}

/// Loads a CSV file in the export layout. Every row is stored or none are.
pub async fn import_transactions(config: Config, actor: &str, file: &Path) -> Result<Out<usize>> {
    let me = authorize(&config, actor, Permission::RecordTransactions).await?;
    let data = utils::read(file).await.pub_result(ErrorType::Validation)?;
    let records = read_records(&data, &me.email).pub_result(ErrorType::Validation)?;
    let count = config
        .db()
        .import_transactions(&me.email, &records, &file.display().to_string())
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Imported {count} transaction{} from {}",
            plural(count),
            file.display()
        ),
        count,
    ))
}

/// Deletes a transaction recorded in error and reverses its effect on the account balance.
/// Transfer rows cannot be voided.
pub async fn void_transaction(
    config: Config,
    actor: &str,
    id: &str,
) -> Result<Out<TransactionRecord>> {
    let me = authorize(&config, actor, Permission::RecordTransactions).await?;
    let record = config
        .db()
        .void_transaction(&me.email, id)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(format!("Voided transaction {}", record.id), record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{amt, TestEnv};

    fn donation(account: &str, amount: &str, category: &str, date: &str) -> RecordDonationArgs {
        RecordDonationArgs {
            account: Some(account.into()),
            branch: None,
            amount: amt(amount),
            category: category.into(),
            donor: Some("J. Cruz".into()),
            date: Some(date.into()),
            description: String::new(),
        }
    }

    fn expense(branch: &str, amount: &str, category: &str) -> RecordExpenseArgs {
        RecordExpenseArgs {
            account: None,
            branch: Some(branch.into()),
            amount: amt(amount),
            category: category.into(),
            date: Some("2025-03-10".into()),
            description: "Monthly bill".into(),
        }
    }

    #[tokio::test]
    async fn test_record_donation_credits_account() {
        let env = TestEnv::new().await;
        let out = record_donation(
            env.config(),
            TestEnv::FINANCE,
            donation("Main Fund", "1500", "Tithe", "2025-03-02"),
        )
        .await
        .unwrap();
        let record = out.structure().unwrap();
        assert_eq!(record.branch, "Main");
        assert_eq!(record.donor.as_deref(), Some("J. Cruz"));
        assert_eq!(record.recorded_by, TestEnv::FINANCE);
        assert_eq!(env.balance(&env.main_fund().id).await, amt("11500"));
    }

    #[tokio::test]
    async fn test_expense_may_overdraw_account() {
        let env = TestEnv::new().await;
        let mut args = expense("North", "2500", "Roof Repair");
        args.account = Some("North Fund".into());
        args.branch = None;
        let out = record_expense(env.config(), TestEnv::FINANCE, args)
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().branch, "North");
        assert_eq!(env.balance(&env.north_fund().id).await, amt("-500"));
    }

    #[tokio::test]
    async fn test_record_validation() {
        let env = TestEnv::new().await;
        let mut bad = donation("Main Fund", "0", "Tithe", "2025-03-02");
        let err = record_donation(env.config(), TestEnv::FINANCE, bad.clone())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);

        bad.amount = amt("5");
        bad.date = Some("yesterday".into());
        let err = record_donation(env.config(), TestEnv::FINANCE, bad.clone())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);

        bad.date = None;
        bad.account = None;
        let err = record_donation(env.config(), TestEnv::FINANCE, bad)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("account or a branch"));

        let err = record_expense(env.config(), TestEnv::BISHOP, expense("Main", "10", "Rent"))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Permission);
    }

    #[tokio::test]
    async fn test_list_and_summarize() {
        let env = TestEnv::new().await;
        let config = env.config();
        record_donation(
            config.clone(),
            TestEnv::FINANCE,
            donation("Main Fund", "1500", "Tithe", "2025-03-02"),
        )
        .await
        .unwrap();
        record_donation(
            config.clone(),
            TestEnv::FINANCE,
            donation("North Fund", "200", "Offering", "2025-03-02"),
        )
        .await
        .unwrap();
        record_expense(config.clone(), TestEnv::FINANCE, expense("Main", "320.75", "Electricity"))
            .await
            .unwrap();

        let filter = FilterArgs {
            start: Some("2025-03-01".into()),
            end: Some("2025-03-31".into()),
            ..Default::default()
        };
        let out = list_transactions(config.clone(), TestEnv::BISHOP, &filter, OutputFormat::Table)
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().len(), 3);
        assert!(out.message().starts_with("3 transactions\nDate"));
        assert!(out.message().contains("PHP 1,500.00"));

        let out = list_transactions(config.clone(), TestEnv::BISHOP, &filter, OutputFormat::Csv)
            .await
            .unwrap();
        assert!(out.message().contains("2025-03-10,Expense,Electricity,Main,320.75"));

        let main_only = FilterArgs {
            branch: Some("Main".into()),
            ..filter.clone()
        };
        let out = summarize(config.clone(), TestEnv::BISHOP, &main_only).await.unwrap();
        let summary = &out.structure().unwrap().summary;
        assert_eq!(summary.income, amt("1500"));
        assert_eq!(summary.tithes, amt("1500"));
        assert_eq!(summary.expenses, amt("320.75"));
        assert_eq!(summary.net, amt("1179.25"));
        assert!(out.message().contains("Branch: Main"));
    }

    #[tokio::test]
    async fn test_import_and_void() {
        let env = TestEnv::new().await;
        let config = env.config();
        let file = env.scratch("import.csv");
        std::fs::write(
            &file,
            "Date,Type,Category,Branch,Amount,Description,Recorded By\n\
            2025-01-05,Income,Tithe,Main,500,,\n\
            01/12/2025,Expense,Rent,North,-100,Refund,\n",
        )
        .unwrap();
        let out = import_transactions(config.clone(), TestEnv::FINANCE, &file)
            .await
            .unwrap();
        assert_eq!(out.structure(), Some(&2));

        let records = config.db().list_transactions(&Default::default()).await.unwrap();
        let refund = records.iter().find(|r| r.category == "Rent").unwrap();
        assert_eq!(refund.kind, TransactionKind::Income);
        assert_eq!(refund.recorded_by, TestEnv::FINANCE);

        let out = void_transaction(config.clone(), TestEnv::FINANCE, &refund.id)
            .await
            .unwrap();
        assert_eq!(out.structure().unwrap().id, refund.id);
        assert!(config.db().get_transaction(&refund.id).await.unwrap().is_none());

        // A bad row rejects the whole file.
        std::fs::write(
            &file,
            "Date,Type,Category,Branch,Amount,Description,Recorded By\n\
            2025-01-05,Income,Tithe,Main,500,,\n\
            2025-01-06,Income,Tithe,Nowhere,500,,\n",
        )
        .unwrap();
        let before = config.db().list_transactions(&Default::default()).await.unwrap();
        assert!(import_transactions(config.clone(), TestEnv::FINANCE, &file)
            .await
            .is_err());
        let after = config.db().list_transactions(&Default::default()).await.unwrap();
        assert_eq!(before.len(), after.len());
    }
}
