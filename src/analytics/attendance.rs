//! Endpoints over the attendance document.

use super::{month_title, Endpoint, Params, Services};
use crate::api::Document;
use crate::error::{Error, Result};
use crate::model::{
    attendance_by_department, average_positive, counter_for, fixed2, latest_titles,
    percentage_change, trailing_average, worksheet_attendance, DateAggregate, Metric, MonthKey,
    PositiveTotals, Record, RowFilter, SheetDate, DATE, DEPARTMENT, TIME,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// How many of a department's most recent days go into its average.
const CLASS_AVERAGE_DAYS: usize = 7;
const STATUS: &str = "status";
const ABSENT: &str = "Absent";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct AttendanceUntilNow {
    average_attendance_until_now: Metric,
    total_present_students: Metric,
    total_days_with_attendance: usize,
}

pub(super) async fn average_attendance_until_now(
    services: &Services,
    params: &Params,
) -> Result<String> {
    let attendance_sheet = params.required("attendanceSheet")?;
    let endpoint = Endpoint::AverageAttendanceUntilNow;
    let key = endpoint.key().part(attendance_sheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let attendance = services.open(attendance_sheet).await?;
            Ok(attendance_until_now(services, &attendance).await)
        })
        .await
}

/// Attendance over every worksheet of the document. Worksheets that fail to load are skipped.
async fn attendance_until_now(services: &Services, attendance: &Document) -> AttendanceUntilNow {
    let filter = RowFilter::new(&services.options().sentinels);
    let mut totals = PositiveTotals::default();
    for info in attendance.worksheets() {
        let worksheet = match attendance.load(info).await {
            Ok(worksheet) => worksheet,
            Err(e) => {
                warn!("Skipping worksheet '{}': {e}", info.title());
                continue;
            }
        };
        totals = totals.merge(worksheet_attendance(&worksheet, &filter).positive_totals());
    }
    AttendanceUntilNow {
        average_attendance_until_now: Metric(totals.average()),
        total_present_students: Metric(totals.sum),
        total_days_with_attendance: totals.days,
    }
}

pub(super) async fn attendance_percentage_increase(
    services: &Services,
    params: &Params,
) -> Result<String> {
    let attendance_sheet = params.required("attendanceSheet")?;
    let baseline = params
        .optional("baselineMonth")
        .unwrap_or(services.options().baseline_month.as_str());
    let endpoint = Endpoint::AttendancePercentageIncrease;
    let key = endpoint.key().part(attendance_sheet).part(month_title(baseline));
    services
        .cached(
            endpoint,
            &key,
            |change: &Option<Metric>| change.is_some(),
            move || async move {
                let attendance = services.open(attendance_sheet).await?;
                percentage_increase(services, &attendance, baseline).await
            },
        )
        .await
}

/// The change in average daily attendance from the baseline month to the latest month. `None`
/// when either month is missing or the baseline had no attendance.
async fn percentage_increase(
    services: &Services,
    attendance: &Document,
    baseline: &str,
) -> Result<Option<Metric>> {
    let filter = RowFilter::new(&services.options().sentinels);
    let titles: Vec<&str> = attendance.month_sheets().iter().map(|w| w.title()).collect();
    let Some(latest) = latest_titles(&titles, 1).into_iter().next() else {
        debug!("No month sheets in document '{}'", attendance.id());
        return Ok(None);
    };
    let Some(baseline_info) = attendance.by_title(baseline) else {
        debug!("Baseline month '{baseline}' not found");
        return Ok(None);
    };
    let (baseline_sheet, latest_sheet) =
        tokio::try_join!(attendance.load(baseline_info), attendance.worksheet(&latest))?;
    let baseline_average = average_positive(&worksheet_attendance(&baseline_sheet, &filter));
    let latest_average = average_positive(&worksheet_attendance(&latest_sheet, &filter));
    Ok(percentage_change(baseline_average, latest_average).map(Metric))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct ClassAverage {
    department: String,
    /// Two decimals, e.g. `12.50`.
    average: String,
}

pub(super) async fn student_average_per_class(
    services: &Services,
    params: &Params,
) -> Result<String> {
    let attendance_sheet = params.required("attendanceSheet")?;
    let attendance_worksheet = params.required("attendanceWorkSheet")?;
    let endpoint = Endpoint::StudentAveragePerClass;
    let key = endpoint.key().part(attendance_sheet).part(attendance_worksheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let attendance = services.open(attendance_sheet).await?;
            let worksheet = attendance.worksheet(attendance_worksheet).await?;
            let filter = RowFilter::new(&services.options().sentinels);
            let departments =
                attendance_by_department(&worksheet.records(), &filter, counter_for(&worksheet));
            Ok(class_averages(departments))
        })
        .await
}

/// Average attendance of each department's most recent days, ignoring days nobody came. Sorted by
/// department.
fn class_averages(departments: BTreeMap<String, DateAggregate>) -> Vec<ClassAverage> {
    departments
        .into_iter()
        .filter_map(|(department, mut by_date)| {
            by_date.retain_positive();
            if by_date.is_empty() {
                return None;
            }
            Some(ClassAverage {
                department,
                average: fixed2(trailing_average(&by_date, CLASS_AVERAGE_DAYS)),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct DaySummary {
    /// Absent people's rows, by department.
    #[serde(rename = "AbsentsData")]
    absents: BTreeMap<String, Vec<Record>>,
    #[serde(rename = "Present")]
    present: usize,
    #[serde(rename = "Absent")]
    absent: usize,
}

pub(super) async fn attendance_summary_by_date(
    services: &Services,
    params: &Params,
) -> Result<String> {
    let attendance_sheet = params.required("attendanceSheet")?;
    let date = params.required("date")?;
    let date = SheetDate::parse(date).ok_or_else(|| {
        Error::request(format!("Invalid date '{date}', expected MM/DD/YYYY"))
    })?;
    let endpoint = Endpoint::AttendanceSummaryByDate;
    let key = endpoint.key().part(attendance_sheet).part(date.as_str());
    let date = &date;
    services
        .cached(
            endpoint,
            &key,
            |summary: &DaySummary| !summary.absents.is_empty(),
            move || async move {
                let attendance = services.open(attendance_sheet).await?;
                let title = MonthKey::of(date.date()).title();
                let worksheet = attendance.worksheet(&title).await?;
                Ok(day_summary(&worksheet.records(), date))
            },
        )
        .await
}

/// People with a punch on `date` are present, the rest of that date's rows are absent.
fn day_summary(records: &[Record], date: &SheetDate) -> DaySummary {
    let on_date: Vec<&Record> = records
        .iter()
        .filter(|r| SheetDate::parse(r.get(DATE)).as_ref() == Some(date))
        .collect();
    let mut absents: BTreeMap<String, Vec<Record>> = BTreeMap::new();
    for record in &on_date {
        if record.get(TIME).is_empty() {
            let mut absent = (*record).clone();
            absent.insert(STATUS, ABSENT);
            absents
                .entry(record.get(DEPARTMENT).to_string())
                .or_default()
                .push(absent);
        }
    }
    let absent = absents.values().map(Vec::len).sum();
    DaySummary {
        absents,
        present: on_date.len() - absent,
        absent,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{run_json, services};
    use super::super::Options;
    use super::*;
    use crate::api::{TestSheets, DEMO_ATTENDANCE};
    use crate::cache::MemoryCache;
    use crate::error::ErrorType;
    use crate::test::FailingSheets;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_average_attendance_until_now() {
        let services = services();
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}");
        let json = run_json(&services, Endpoint::AverageAttendanceUntilNow, &query).await;
        assert_eq!(
            json,
            json!({
                "averageAttendanceUntilNow": 4.25,
                "totalPresentStudents": 17,
                "totalDaysWithAttendance": 4
            })
        );
    }

    #[tokio::test]
    async fn test_average_attendance_until_now_skips_broken_sheet() {
        let sheets = FailingSheets::new(TestSheets::seeded().unwrap(), &["July 2024"]);
        let services = Services::new(
            Arc::new(sheets),
            Arc::new(MemoryCache::new()),
            Options::default(),
        );
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}");
        let json = run_json(&services, Endpoint::AverageAttendanceUntilNow, &query).await;
        assert_eq!(
            json,
            json!({
                "averageAttendanceUntilNow": 4.5,
                "totalPresentStudents": 9,
                "totalDaysWithAttendance": 2
            })
        );
    }

    #[tokio::test]
    async fn test_attendance_percentage_increase() {
        let services = services();
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}");
        let json = run_json(&services, Endpoint::AttendancePercentageIncrease, &query).await;
        assert_eq!(json, json!(-11.11));

        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&baselineMonth=July%202024");
        let json = run_json(&services, Endpoint::AttendancePercentageIncrease, &query).await;
        assert_eq!(json, json!(0));
    }

    #[tokio::test]
    async fn test_attendance_percentage_increase_without_baseline() {
        let services = services();
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&baselineMonth=May%202024");
        let json = run_json(&services, Endpoint::AttendancePercentageIncrease, &query).await;
        assert_eq!(json, json!(null));
        let key = Endpoint::AttendancePercentageIncrease
            .key()
            .part(DEMO_ATTENDANCE)
            .part("May 2024");
        assert!(services.cache().get(key.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_student_average_per_class() {
        let services = services();
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&attendanceWorkSheet=July%202024");
        let json = run_json(&services, Endpoint::StudentAveragePerClass, &query).await;
        assert_eq!(
            json,
            json!([
                {"department": "Class 1", "average": "2.00"},
                {"department": "Class 2", "average": "1.50"},
                {"department": "Main Library", "average": "1.00"}
            ])
        );
    }

    #[tokio::test]
    async fn test_student_average_per_class_pre_aggregated() {
        let sheets = TestSheets::empty();
        let rows = [
            ["Date", "Department", "Total", "Present"],
            ["03/01/2024", "Class 1", "30", "20"],
            ["03/02/2024", "Class 1", "30", "0"],
            ["03/03/2024", "Class 1", "30", "25"],
            ["03/01/2024", "Class 2", "30", "0"],
        ];
        let values = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        sheets.insert("doc", "March 2024", values);
        let services = Services::new(
            Arc::new(sheets),
            Arc::new(MemoryCache::new()),
            Options::default(),
        );
        let query = "attendanceSheet=doc&attendanceWorkSheet=March%202024";
        let json = run_json(&services, Endpoint::StudentAveragePerClass, query).await;
        assert_eq!(json, json!([{"department": "Class 1", "average": "22.50"}]));
    }

    #[tokio::test]
    async fn test_attendance_summary_by_date() {
        let services = services();
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&date=06/03/2024");
        let json = run_json(&services, Endpoint::AttendanceSummaryByDate, &query).await;
        assert_eq!(
            json,
            json!({
                "AbsentsData": {
                    "Class 2": [{
                        "AC-No": "4",
                        "Date": "06/03/2024",
                        "Department": "Class 2",
                        "Name": "Danish Raza",
                        "Time": "",
                        "status": "Absent"
                    }]
                },
                "Present": 5,
                "Absent": 1
            })
        );
        let key = Endpoint::AttendanceSummaryByDate
            .key()
            .part(DEMO_ATTENDANCE)
            .part("06/03/2024");
        assert!(services.cache().get(key.as_str()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_attendance_summary_nobody_absent_is_not_cached() {
        let services = services();
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&date=07/01/2024");
        let json = run_json(&services, Endpoint::AttendanceSummaryByDate, &query).await;
        assert_eq!(json, json!({"AbsentsData": {}, "Present": 5, "Absent": 0}));
        let key = Endpoint::AttendanceSummaryByDate
            .key()
            .part(DEMO_ATTENDANCE)
            .part("07/01/2024");
        assert!(services.cache().get(key.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attendance_summary_errors() {
        let services = services();
        let params: Params = [("attendanceSheet", DEMO_ATTENDANCE), ("date", "2024-06-03")]
            .into_iter()
            .collect();
        let e = attendance_summary_by_date(&services, &params).await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::Request);

        let params: Params = [("attendanceSheet", DEMO_ATTENDANCE), ("date", "05/02/2024")]
            .into_iter()
            .collect();
        let e = attendance_summary_by_date(&services, &params).await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::NotFound);
    }
}
