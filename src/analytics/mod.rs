//! The analytics endpoints. Each endpoint reads its query parameters, builds a cache key from the
//! ones that distinguish one result from another and, on a cache miss, loads the worksheets it
//! needs and folds them through the model pipeline.

mod attendance;
mod expenses;
mod joined;
mod meals;
mod staff;

use crate::api::{Document, Spreadsheets};
use crate::cache::{self, Cache, CacheKey, Ttl};
use crate::config::{self, Staff, WindowPolicy};
use crate::error::{Error, Result};
use crate::model::{
    clean_title, number_or_zero, MonthKey, NumericRule, PositiveTotals, RowFilter, Sentinels,
    Worksheet,
};
use crate::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::form_urlencoded;

pub(crate) const BOXES: &str = "No. Of Boxes";
pub(crate) const MEAL_NAME: &str = "Meal Name";
pub(crate) const COST_FOR_200_MEALS: &str = "Cost for 200 Meals";
pub(crate) const AC_NO: &str = "AC-No";
pub(crate) const NAME: &str = "Name";

/// The rules the endpoints read the sheets with.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub sentinels: Sentinels,
    pub window: WindowPolicy,
    pub baseline_month: String,
    pub staff: Staff,
    pub other_expense_keywords: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            sentinels: Sentinels::default(),
            window: WindowPolicy::default(),
            baseline_month: config::default_baseline_month(),
            staff: Staff::default(),
            other_expense_keywords: config::default_other_expense_keywords(),
        }
    }
}

impl From<&Config> for Options {
    fn from(config: &Config) -> Self {
        Self {
            sentinels: config.sentinels().clone(),
            window: config.trailing_window(),
            baseline_month: config.baseline_month().to_string(),
            staff: config.staff().clone(),
            other_expense_keywords: config.other_expense_keywords().to_vec(),
        }
    }
}

/// Everything a request handler needs. Built once at startup and shared by every request.
#[derive(Clone)]
pub struct Services {
    sheets: Arc<dyn Spreadsheets>,
    cache: Arc<dyn Cache>,
    options: Arc<Options>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Services {
    pub fn new(sheets: Arc<dyn Spreadsheets>, cache: Arc<dyn Cache>, options: Options) -> Self {
        Self {
            sheets,
            cache,
            options: Arc::new(options),
        }
    }

    pub fn cache(&self) -> &dyn Cache {
        self.cache.as_ref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) async fn open(&self, document_id: &str) -> Result<Document> {
        Document::open(self.sheets.clone(), document_id).await
    }

    /// Serves `endpoint` from the cache, or computes and caches it with the endpoint's TTL.
    pub(crate) async fn cached<T, F, Fut>(
        &self,
        endpoint: Endpoint,
        key: &CacheKey,
        store: impl FnOnce(&T) -> bool,
        compute: F,
    ) -> Result<String>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        cache::cached(self.cache(), key, endpoint.ttl(), store, compute).await
    }
}

/// The query parameters of a request. Parameters that are present but blank count as missing.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Parses a URL query string such as `attendanceSheet=abc&date=06%2F03%2F2024`.
    pub fn parse(query: Option<&str>) -> Self {
        query
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    pub fn optional(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Returns the parameter or an `ErrorType::Request` error naming it.
    pub fn required(&self, name: &str) -> Result<&str> {
        self.optional(name)
            .ok_or_else(|| Error::request(format!("The '{name}' query parameter is required")))
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// The analytics endpoints, named as they appear in `/api/analytics/<name>`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Endpoint {
    StudentsVsBoxes,
    AverageStudentsVsBoxes,
    MealCostStudentAverage,
    MealsServedLast7days,
    TotalMealsServed,
    MealCost,
    AverageAttendanceUntilNow,
    AttendancePercentageIncrease,
    StudentAveragePerClass,
    AttendanceSummaryByDate,
    TeachersAverageTime,
    TeachersAttendanceSummary,
    Expenses,
    QuotationPerMeal,
}

serde_plain::derive_display_from_serialize!(Endpoint);
serde_plain::derive_fromstr_from_deserialize!(Endpoint);

impl Endpoint {
    pub const ALL: [Endpoint; 14] = [
        Endpoint::StudentsVsBoxes,
        Endpoint::AverageStudentsVsBoxes,
        Endpoint::MealCostStudentAverage,
        Endpoint::MealsServedLast7days,
        Endpoint::TotalMealsServed,
        Endpoint::MealCost,
        Endpoint::AverageAttendanceUntilNow,
        Endpoint::AttendancePercentageIncrease,
        Endpoint::StudentAveragePerClass,
        Endpoint::AttendanceSummaryByDate,
        Endpoint::TeachersAverageTime,
        Endpoint::TeachersAttendanceSummary,
        Endpoint::Expenses,
        Endpoint::QuotationPerMeal,
    ];

    /// Finds an endpoint by name, ignoring ASCII case.
    pub fn find(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.to_string().eq_ignore_ascii_case(name))
    }

    /// Endpoints over the current month expire within hours, those over closed months last days.
    pub fn ttl(&self) -> Duration {
        match self {
            Endpoint::StudentsVsBoxes | Endpoint::MealCost | Endpoint::Expenses => Ttl::HOURS_3,
            Endpoint::MealCostStudentAverage => Ttl::HOURS_12,
            Endpoint::MealsServedLast7days | Endpoint::TotalMealsServed => Ttl::HOURS_24,
            Endpoint::AttendancePercentageIncrease => Ttl::DAYS_3,
            Endpoint::AverageStudentsVsBoxes | Endpoint::StudentAveragePerClass => Ttl::DAYS_6,
            Endpoint::AverageAttendanceUntilNow
            | Endpoint::AttendanceSummaryByDate
            | Endpoint::TeachersAverageTime
            | Endpoint::TeachersAttendanceSummary => Ttl::DAYS_7,
            Endpoint::QuotationPerMeal => Ttl::DAYS_30,
        }
    }

    /// A cache key holding only the endpoint name. Callers append the discriminating parameters.
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.to_string())
    }
}

/// Runs `endpoint` and returns its JSON.
pub async fn run(services: &Services, endpoint: Endpoint, params: &Params) -> Result<String> {
    debug!("Running {endpoint}");
    match endpoint {
        Endpoint::StudentsVsBoxes => joined::students_vs_boxes(services, params).await,
        Endpoint::AverageStudentsVsBoxes => {
            joined::average_students_vs_boxes(services, params).await
        }
        Endpoint::MealCostStudentAverage => {
            joined::meal_cost_student_average(services, params).await
        }
        Endpoint::MealsServedLast7days => meals::meals_served_last_7_days(services, params).await,
        Endpoint::TotalMealsServed => meals::total_meals_served(services, params).await,
        Endpoint::MealCost => meals::meal_cost(services, params).await,
        Endpoint::QuotationPerMeal => meals::quotation_per_meal(services, params).await,
        Endpoint::AverageAttendanceUntilNow => {
            attendance::average_attendance_until_now(services, params).await
        }
        Endpoint::AttendancePercentageIncrease => {
            attendance::attendance_percentage_increase(services, params).await
        }
        Endpoint::StudentAveragePerClass => {
            attendance::student_average_per_class(services, params).await
        }
        Endpoint::AttendanceSummaryByDate => {
            attendance::attendance_summary_by_date(services, params).await
        }
        Endpoint::TeachersAverageTime => staff::teachers_average_time(services, params).await,
        Endpoint::TeachersAttendanceSummary => {
            staff::teachers_attendance_summary(services, params).await
        }
        Endpoint::Expenses => expenses::expenses(services, params).await,
    }
}

/// Rows with a usable date and a non-zero box count.
fn boxes_filter(sentinels: &Sentinels) -> RowFilter<'_> {
    RowFilter::new(sentinels).numeric(BOXES, NumericRule::NonZero)
}

/// The average box count over the rows that served meals.
fn average_boxes(worksheet: &Worksheet, sentinels: &Sentinels) -> f64 {
    let records = worksheet.records();
    boxes_filter(sentinels)
        .apply(&records)
        .into_iter()
        .map(|r| number_or_zero(r.get(BOXES)))
        .filter(|boxes| *boxes > 0.0)
        .fold(PositiveTotals::default(), |totals, boxes| {
            totals.merge(PositiveTotals { sum: boxes, days: 1 })
        })
        .average()
}

/// `March 2024` for any spelling of a month title, the cleaned title otherwise.
fn month_title(title: &str) -> String {
    MonthKey::parse(title)
        .map(|key| key.title())
        .unwrap_or_else(|_| clean_title(title))
}

fn require_column(worksheet: &Worksheet, column: &str) -> Result<()> {
    if worksheet.has_header(column) {
        Ok(())
    } else {
        Err(Error::not_found(format!(
            "Worksheet '{}' has no '{column}' column",
            worksheet.title()
        )))
    }
}

/// `1 day`, `2 days`.
fn days(n: usize) -> String {
    format!("{n} {}", if n == 1 { "day" } else { "days" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{TestSheets, DEMO_QUOTATION};
    use crate::cache::MemoryCache;
    use crate::error::ErrorType;
    use serde_json::{json, Value};

    pub(super) fn services() -> Services {
        Services::new(
            Arc::new(TestSheets::seeded().unwrap()),
            Arc::new(MemoryCache::new()),
            Options::default(),
        )
    }

    pub(super) async fn run_json(services: &Services, endpoint: Endpoint, query: &str) -> Value {
        let json = run(services, endpoint, &Params::parse(Some(query)))
            .await
            .unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn test_endpoint_names() {
        assert_eq!(Endpoint::MealsServedLast7days.to_string(), "mealsServedLast7days");
        assert_eq!(Endpoint::QuotationPerMeal.to_string(), "quotationPerMeal");
        assert_eq!(Endpoint::find("quotationperMeal"), Some(Endpoint::QuotationPerMeal));
        assert_eq!(Endpoint::find("TeachersAverageTime"), Some(Endpoint::TeachersAverageTime));
        assert_eq!(Endpoint::find("nope"), None);
        for endpoint in Endpoint::ALL {
            assert_eq!(Endpoint::find(&endpoint.to_string()), Some(endpoint));
        }
    }

    #[test]
    fn test_ttls() {
        assert_eq!(Endpoint::StudentsVsBoxes.ttl(), Duration::from_secs(3 * 60 * 60));
        assert_eq!(Endpoint::QuotationPerMeal.ttl(), Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn test_params() {
        let params = Params::parse(Some("attendanceSheet=abc&date=06%2F03%2F2024&blank=%20"));
        assert_eq!(params.required("attendanceSheet").unwrap(), "abc");
        assert_eq!(params.optional("date"), Some("06/03/2024"));
        assert_eq!(params.optional("blank"), None);
        let e = params.required("quotationSheet").unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Request);
        assert!(e.public_message().contains("quotationSheet"));
        assert_eq!(Params::parse(None), Params::default());
    }

    #[test]
    fn test_month_title() {
        assert_eq!(month_title(" june   2024"), "June 2024");
        assert_eq!(month_title("Summary "), "Summary");
    }

    #[test]
    fn test_days() {
        assert_eq!(days(0), "0 days");
        assert_eq!(days(1), "1 day");
        assert_eq!(days(2), "2 days");
    }

    #[tokio::test]
    async fn test_missing_parameter_is_checked_first() {
        let services = services();
        let e = run(&services, Endpoint::StudentsVsBoxes, &Params::default())
            .await
            .unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Request);
    }

    #[tokio::test]
    async fn test_results_are_cached() {
        let services = services();
        let query = format!("quotationSheet={DEMO_QUOTATION}");
        let first = run_json(&services, Endpoint::MealCost, &query).await;
        let key = Endpoint::MealCost.key().part(DEMO_QUOTATION);
        let stored = services.cache().get(key.as_str()).await.unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&stored).unwrap(), first);

        services
            .cache()
            .set_ex(key.as_str(), r#"{"from":"cache"}"#, Ttl::HOURS_3)
            .await
            .unwrap();
        let second = run_json(&services, Endpoint::MealCost, &query).await;
        assert_eq!(second, json!({"from": "cache"}));
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let services = services();
        let params: Params = [("attendanceSheet", "nope")].into_iter().collect();
        let e = run(&services, Endpoint::AverageAttendanceUntilNow, &params)
            .await
            .unwrap_err();
        assert_eq!(e.error_type(), ErrorType::NotFound);
        let key = Endpoint::AverageAttendanceUntilNow.key().part("nope");
        assert!(services.cache().get(key.as_str()).await.unwrap().is_none());
    }
}
