//! The monthly expenses breakdown. The expenses worksheet holds one pair of columns per month: the
//! month title sits above the names, and the amounts are in the column to its right.

use super::{Endpoint, Params, Services};
use crate::error::{Error, Result};
use crate::model::{clean_title, parse_number, serialize_metric, Worksheet};
use serde::Serialize;
use std::collections::BTreeMap;

const TOTAL_ROW: &str = "total";

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MonthExpenses {
    #[serde(serialize_with = "serialize_metric")]
    salary_sum: f64,
    #[serde(serialize_with = "serialize_metric")]
    other_expenses_sum: f64,
}

pub(super) async fn expenses(services: &Services, params: &Params) -> Result<String> {
    let quotation_sheet = params.required("quotationSheet")?;
    let expenses_worksheet = params.required("expensesWorkSheet")?;
    let month = clean_title(params.required("month")?).to_lowercase();
    let endpoint = Endpoint::Expenses;
    let key = endpoint
        .key()
        .part(quotation_sheet)
        .part(expenses_worksheet)
        .part(&month);
    let month = month.as_str();
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let quotation = services.open(quotation_sheet).await?;
            let worksheet = quotation.worksheet(expenses_worksheet).await?;
            let keywords = &services.options().other_expense_keywords;
            let sums = month_expenses(&worksheet, month, keywords)?;
            Ok(BTreeMap::from([(capitalize(month), sums)]))
        })
        .await
}

/// Splits the month's amounts into salaries and other expenses. Names containing one of
/// `keywords` are other expenses. `month` is lowercase.
fn month_expenses(
    worksheet: &Worksheet,
    month: &str,
    keywords: &[String],
) -> Result<MonthExpenses> {
    let ix = worksheet
        .headers()
        .iter()
        .position(|h| clean_title(h).to_lowercase() == month)
        .ok_or_else(|| Error::not_found(format!("Month {month} not found in the worksheet")))?;

    let mut sums = MonthExpenses::default();
    for row in worksheet.rows() {
        let name = row.get(ix).map(|c| c.trim().to_lowercase()).unwrap_or_default();
        if name.is_empty() || name == TOTAL_ROW {
            continue;
        }
        let Some(amount) = row.get(ix + 1).and_then(|c| parse_number(c)) else {
            continue;
        };
        if keywords.iter().any(|k| name.contains(&k.to_lowercase())) {
            sums.other_expenses_sum += amount;
        } else {
            sums.salary_sum += amount;
        }
    }
    Ok(sums)
}

/// `june 2024` becomes `June 2024`.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
