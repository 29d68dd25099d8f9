//! Endpoints over the quotation document: boxes served and what meals cost.

use super::{
    boxes_filter, month_title, Endpoint, Params, Services, BOXES, COST_FOR_200_MEALS, MEAL_NAME,
};
use crate::api::Document;
use crate::config::WindowPolicy;
use crate::error::Result;
use crate::model::{column_total, Metric, NumericRule, RowFilter, SheetDate, DATE};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// The number of meal days `mealsServedLast7days` reports.
const LAST_DAYS: usize = 7;

/// The quotation grid starts on the sixth row of the sheet, i.e. the fifth row below the header.
const GRID_FIRST_ROW: usize = 4;
const GRID_MEAL_PLAN: usize = 3;
const GRID_QUOTATIONS: usize = 4;
const GRID_COST: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ServedMeal {
    date: String,
    meal_name: String,
    /// As written in the sheet, e.g. `1,050`.
    boxes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct LastMeals {
    /// Newest first.
    #[serde(rename = "last7DaysMeals")]
    meals: Vec<ServedMeal>,
    #[serde(rename = "dataAvailable")]
    data_available: bool,
}

pub(super) async fn meals_served_last_7_days(
    services: &Services,
    params: &Params,
) -> Result<String> {
    let quotation_sheet = params.required("quotationSheet")?;
    let quotation_worksheet = params.required("quotationWorkSheet")?;
    let endpoint = Endpoint::MealsServedLast7days;
    let key = endpoint.key().part(quotation_sheet).part(quotation_worksheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let quotation = services.open(quotation_sheet).await?;
            last_meals(services, &quotation, quotation_worksheet).await
        })
        .await
}

async fn last_meals(
    services: &Services,
    quotation: &Document,
    quotation_worksheet: &str,
) -> Result<LastMeals> {
    let options = services.options();
    let start = quotation.select(quotation_worksheet)?;
    let window = quotation
        .trailing_window(start, LAST_DAYS, &boxes_filter(&options.sentinels))
        .await?;
    if !window.complete && options.window == WindowPolicy::Strict {
        debug!(
            "Only {} meal days before '{}', returning none",
            window.rows.len(),
            start.title()
        );
        return Ok(LastMeals {
            meals: Vec::new(),
            data_available: false,
        });
    }
    let meals = window
        .rows
        .iter()
        .rev()
        .map(|r| ServedMeal {
            date: r.get(DATE).to_string(),
            meal_name: r.get(MEAL_NAME).to_string(),
            boxes: r.get(BOXES).to_string(),
        })
        .collect();
    Ok(LastMeals {
        meals,
        data_available: window.complete,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MealsServed {
    total_meals_served: Metric,
    /// e.g. `July/02/2024`
    formatted_latest_date: Option<String>,
}

pub(super) async fn total_meals_served(services: &Services, params: &Params) -> Result<String> {
    let quotation_sheet = params.required("quotationSheet")?;
    let endpoint = Endpoint::TotalMealsServed;
    let key = endpoint.key().part(quotation_sheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let quotation = services.open(quotation_sheet).await?;
            Ok(meals_served(services, &quotation).await)
        })
        .await
}

/// Boxes over every month sheet. The last row of each sheet holds its total and is left out.
async fn meals_served(services: &Services, quotation: &Document) -> MealsServed {
    let filter = RowFilter::new(&services.options().sentinels)
        .numeric(BOXES, NumericRule::NonEmpty)
        .skip_last();
    let mut total = 0.0;
    let mut latest: Option<SheetDate> = None;
    for worksheet in quotation.load_month_sheets().await {
        if !worksheet.has_header(BOXES) {
            debug!("Worksheet '{}' has no '{BOXES}' column", worksheet.title());
            continue;
        }
        let records = worksheet.records();
        total += column_total(&records, &filter, BOXES);
        let sheet_latest = filter
            .apply(&records)
            .into_iter()
            .filter_map(|r| SheetDate::parse(r.get(DATE)))
            .max();
        latest = latest.max(sheet_latest);
    }
    MealsServed {
        total_meals_served: Metric(total),
        formatted_latest_date: latest.map(|d| d.date().format("%B/%d/%Y").to_string()),
    }
}

pub(super) async fn meal_cost(services: &Services, params: &Params) -> Result<String> {
    let quotation_sheet = params.required("quotationSheet")?;
    let endpoint = Endpoint::MealCost;
    let key = endpoint.key().part(quotation_sheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let quotation = services.open(quotation_sheet).await?;
            Ok(cost_per_month(services, &quotation).await)
        })
        .await
}

/// The `Cost for 200 Meals` total of each month sheet that has the column.
async fn cost_per_month(services: &Services, quotation: &Document) -> BTreeMap<String, Metric> {
    let filter = RowFilter::new(&services.options().sentinels).skip_last();
    quotation
        .load_month_sheets()
        .await
        .into_iter()
        .filter(|w| w.has_header(COST_FOR_200_MEALS))
        .map(|w| {
            let total = column_total(&w.records(), &filter, COST_FOR_200_MEALS);
            (month_title(w.title()), Metric(total))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct QuotationLine {
    #[serde(rename = "mealPlan")]
    meal_plan: String,
    quotations: String,
    #[serde(rename = "costFor200Meals")]
    cost_for_200_meals: String,
}

pub(super) async fn quotation_per_meal(services: &Services, params: &Params) -> Result<String> {
    let quotation_sheet = params.required("quotationSheet")?;
    let quotation_worksheet = params.required("quotationWorkSheet")?;
    let endpoint = Endpoint::QuotationPerMeal;
    let key = endpoint.key().part(quotation_sheet).part(quotation_worksheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let quotation = services.open(quotation_sheet).await?;
            let worksheet = quotation.worksheet(quotation_worksheet).await?;
            Ok(quotation_grid(worksheet.rows()))
        })
        .await
}

/// Reads columns D to F downwards from the first grid row until the meal plan cell is empty.
fn quotation_grid(rows: &[Vec<String>]) -> Vec<QuotationLine> {
    rows.iter()
        .skip(GRID_FIRST_ROW)
        .map(|row| QuotationLine {
            meal_plan: cell(row, GRID_MEAL_PLAN),
            quotations: cell(row, GRID_QUOTATIONS),
            cost_for_200_meals: cell(row, GRID_COST),
        })
        .take_while(|line| !line.meal_plan.is_empty())
        .collect()
}

fn cell(row: &[String], ix: usize) -> String {
    row.get(ix).map(|c| c.trim()).unwrap_or("").to_string()
}
