use crate::model::{Amount, TransactionKind, TransactionRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Totals over a set of transaction records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Summary {
    pub income: Amount,
    pub expenses: Amount,
    /// Income in the Tithe category.
    pub tithes: Amount,
    /// Income in the Offering category.
    pub offerings: Amount,
    /// Income whose category mentions a donation.
    pub donations: Amount,
    /// Income that is none of the above, including incoming transfers.
    pub other_income: Amount,
    /// `|income - expenses|`
    pub net: Amount,
    pub count: usize,
}

/// Per-category totals, see `category_totals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CategoryTotal {
    pub kind: TransactionKind,
    pub name: String,
    pub total: Amount,
    pub count: usize,
}

/// Reduces `records` to a `Summary`. Only the category sums look at categories; the income and
/// expense totals take every record into account.
pub fn aggregate(records: &[TransactionRecord]) -> Summary {
    let mut s = Summary {
        count: records.len(),
        ..Default::default()
    };
    for r in records {
        match r.kind {
            TransactionKind::Income => {
                s.income += r.amount;
                match income_bucket(&r.category) {
                    Bucket::Tithe => s.tithes += r.amount,
                    Bucket::Offering => s.offerings += r.amount,
                    Bucket::Donation => s.donations += r.amount,
                    Bucket::Other => s.other_income += r.amount,
                }
            }
            TransactionKind::Expense => s.expenses += r.amount,
        }
    }
    s.net = (s.income - s.expenses).abs();
    s
}

/// Totals grouped by kind and category. Sorted by kind (income first), then by descending total,
/// then by name.
pub fn category_totals(records: &[TransactionRecord]) -> Vec<CategoryTotal> {
    group(records, |r| r.category.trim().to_string())
}

/// Totals grouped by kind and branch, sorted like `category_totals`.
pub fn branch_totals(records: &[TransactionRecord]) -> Vec<CategoryTotal> {
    group(records, |r| r.branch.clone())
}

fn group<F>(records: &[TransactionRecord], key: F) -> Vec<CategoryTotal>
where
    F: Fn(&TransactionRecord) -> String,
{
    let mut map: BTreeMap<(TransactionKind, String), (Amount, usize)> = BTreeMap::new();
    for r in records {
        let entry = map.entry((r.kind, key(r))).or_default();
        entry.0 += r.amount;
        entry.1 += 1;
    }
    let mut totals: Vec<CategoryTotal> = map
        .into_iter()
        .map(|((kind, name), (total, count))| CategoryTotal {
            kind,
            name,
            total,
            count,
        })
        .collect();
    totals.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then(b.total.cmp(&a.total))
            .then(a.name.cmp(&b.name))
    });
    totals
}

enum Bucket {
    Tithe,
    Offering,
    Donation,
    Other,
}

fn income_bucket(category: &str) -> Bucket {
    let c = category.trim().to_ascii_lowercase();
    match c.as_str() {
        "tithe" | "tithes" => Bucket::Tithe,
        "offering" | "offerings" => Bucket::Offering,
        _ if c.contains("donation") => Bucket::Donation,
        _ => Bucket::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OFFERING, SPECIAL_DONATION, TITHE, TRANSFER_IN};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn rec(kind: TransactionKind, cat: &str, branch: &str, amount: &str) -> TransactionRecord {
        TransactionRecord::new(
            "id",
            kind,
            Amount::from_str(amount).unwrap(),
            cat,
            branch,
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            "tester",
        )
    }

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn sample() -> Vec<TransactionRecord> {
        vec![
            rec(TransactionKind::Income, TITHE, "Main", "1000"),
            rec(TransactionKind::Income, "tithes", "North", "250.50"),
            rec(TransactionKind::Income, OFFERING, "Main", "300"),
            rec(TransactionKind::Income, SPECIAL_DONATION, "Main", "200"),
            rec(TransactionKind::Income, TRANSFER_IN, "North", "100"),
            rec(TransactionKind::Expense, "Electricity", "Main", "400"),
            rec(TransactionKind::Expense, "Water", "North", "150"),
        ]
    }

    #[test]
    fn test_empty_is_all_zero() {
        let s = aggregate(&[]);
        assert_eq!(s, Summary::default());
        assert!(s.net.is_zero());
    }

    #[test]
    fn test_aggregate_sums() {
        let s = aggregate(&sample());
        assert_eq!(s.income, amt("1850.50"));
        assert_eq!(s.expenses, amt("550"));
        assert_eq!(s.tithes, amt("1250.50"));
        assert_eq!(s.offerings, amt("300"));
        assert_eq!(s.donations, amt("200"));
        assert_eq!(s.other_income, amt("100"));
        assert_eq!(s.net, amt("1300.50"));
        assert_eq!(s.count, 7);
    }

    #[test]
    fn test_net_is_absolute_difference() {
        let records = vec![
            rec(TransactionKind::Income, OFFERING, "Main", "100"),
            rec(TransactionKind::Expense, "Repairs", "Main", "350"),
        ];
        let s = aggregate(&records);
        assert_eq!(s.net, amt("250"));
        assert_eq!(s.net, (s.income - s.expenses).abs());
    }

    #[test]
    fn test_category_sums_never_exceed_income() {
        let s = aggregate(&sample());
        assert!(s.tithes <= s.income);
        assert!(s.offerings <= s.income);
        assert!(s.donations <= s.income);
        assert_eq!(s.tithes + s.offerings + s.donations + s.other_income, s.income);
    }

    #[test]
    fn test_expense_named_like_income_category_is_not_counted_as_tithe() {
        let records = vec![rec(TransactionKind::Expense, TITHE, "Main", "50")];
        let s = aggregate(&records);
        assert!(s.tithes.is_zero());
        assert_eq!(s.expenses, amt("50"));
    }

    #[test]
    fn test_category_totals_order() {
        let totals = category_totals(&sample());
        let names: Vec<_> = totals.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Tithe",
                OFFERING,
                "tithes",
                SPECIAL_DONATION,
                TRANSFER_IN,
                "Electricity",
                "Water"
            ]
        );
        assert_eq!(totals[0].count, 1);
    }

    #[test]
    fn test_branch_totals() {
        let totals = branch_totals(&sample());
        let main_income = totals
            .iter()
            .find(|t| t.kind == TransactionKind::Income && t.name == "Main")
            .unwrap();
        assert_eq!(main_income.total, amt("1500"));
        assert_eq!(main_income.count, 3);
    }
}
