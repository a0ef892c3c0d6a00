use crate::model::Amount;
use chrono::NaiveDate;

/// Formats a value for display with the configured currency code, e.g. `PHP 1,234.50`.
pub fn format_currency(value: impl Into<Amount>, currency: &str) -> String {
    value.into().format_with(currency)
}

/// Formats a date for reports, e.g. `Jan 05, 2025`.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%b %d, %Y").to_string()
}

#[test]
fn test_format_currency() {
    use rust_decimal::Decimal;
    assert_eq!(format_currency(Decimal::new(123450, 2), "PHP"), "PHP 1,234.50");
    assert_eq!(format_currency(Decimal::new(-5, 0), "USD"), "-USD 5.00");
}

#[test]
fn test_format_date() {
    let d = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
    assert_eq!(format_date(d), "Jan 05, 2025");
}
