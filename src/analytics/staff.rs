//! Endpoints about the staff rows of a per-punch attendance sheet: how long people stay and how
//! often they come.

use super::{days, Endpoint, Params, Services, AC_NO, NAME};
use crate::config::Staff;
use crate::error::Result;
use crate::model::{parse_sheet_date, AttendanceSchema, Record, Worksheet, DATE, DEPARTMENT, TIME};
use chrono::{Datelike, NaiveTime, Weekday};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

const PUNCH_FORMAT: &str = "%H:%M";

/// Pre-aggregated sheets have no punches, so they get an empty report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub(super) enum StaffReport<T> {
    Rows(Vec<T>),
    NoPunches { data: Vec<T> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct AverageTime {
    #[serde(rename = "acNo")]
    ac_no: String,
    /// Minutes.
    #[serde(rename = "timeValue")]
    time_value: i64,
    /// e.g. `06h:45m`
    #[serde(rename = "timeLabel")]
    time_label: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Absent")]
    absent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(super) struct AttendanceDays {
    #[serde(rename = "acNo")]
    ac_no: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Present")]
    present: String,
    #[serde(rename = "Absent")]
    absent: String,
}

pub(super) async fn teachers_average_time(services: &Services, params: &Params) -> Result<String> {
    let attendance_sheet = params.required("attendanceSheet")?;
    let attendance_worksheet = params.required("attendanceWorkSheet")?;
    let endpoint = Endpoint::TeachersAverageTime;
    let key = endpoint.key().part(attendance_sheet).part(attendance_worksheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let attendance = services.open(attendance_sheet).await?;
            let worksheet = attendance.worksheet(attendance_worksheet).await?;
            Ok(staff_report(&worksheet, &services.options().staff, average_times))
        })
        .await
}

pub(super) async fn teachers_attendance_summary(
    services: &Services,
    params: &Params,
) -> Result<String> {
    let attendance_sheet = params.required("attendanceSheet")?;
    let attendance_worksheet = params.required("attendanceWorkSheet")?;
    let endpoint = Endpoint::TeachersAttendanceSummary;
    let key = endpoint.key().part(attendance_sheet).part(attendance_worksheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let attendance = services.open(attendance_sheet).await?;
            let worksheet = attendance.worksheet(attendance_worksheet).await?;
            Ok(staff_report(&worksheet, &services.options().staff, attendance_days))
        })
        .await
}

fn staff_report<T>(
    worksheet: &Worksheet,
    staff: &Staff,
    report: impl FnOnce(&[&Record]) -> Vec<T>,
) -> StaffReport<T> {
    if AttendanceSchema::detect(worksheet) == AttendanceSchema::PreAggregated {
        debug!("Worksheet '{}' has no punches", worksheet.title());
        return StaffReport::NoPunches { data: Vec::new() };
    }
    let records = worksheet.records();
    let rows: Vec<&Record> = records.iter().filter(|r| is_staff(r, staff)).collect();
    StaffReport::Rows(report(&rows))
}

fn is_staff(record: &Record, staff: &Staff) -> bool {
    record.get(DEPARTMENT) == staff.department
        && !staff.excluded_ids.iter().any(|id| id == record.get(AC_NO))
}

/// A day without a punch is an absence unless it is a Sunday. Dates that cannot be read count.
fn is_absence(date: &str) -> bool {
    parse_sheet_date(date)
        .map(|d| d.weekday() != Weekday::Sun)
        .unwrap_or(true)
}

/// Minutes from the first to the last punch of a `Time` cell such as `07:58 12:10 14:30`. `None`
/// when there are fewer than two punches or a punch cannot be read.
fn day_length(time: &str) -> Option<i64> {
    let punches: Vec<&str> = time.split_whitespace().collect();
    if punches.len() < 2 {
        return None;
    }
    let first = NaiveTime::parse_from_str(punches.first()?, PUNCH_FORMAT).ok()?;
    let last = NaiveTime::parse_from_str(punches.last()?, PUNCH_FORMAT).ok()?;
    Some((last - first).num_minutes())
}

/// AC-No values that are numbers come first, in numeric order.
fn sort_by_ac_no<T>(rows: &mut [(String, T)]) {
    rows.sort_by(|(a, _), (b, _)| {
        let key = |s: &str| (s.parse::<u64>().ok().map_or(1, |_| 0), s.parse::<u64>().ok());
        key(a.as_str())
            .cmp(&key(b.as_str()))
            .then_with(|| a.cmp(b))
    });
}

#[derive(Debug, Default)]
struct TimeTally {
    name: String,
    total_minutes: i64,
    days: i64,
    absences: usize,
}

fn average_times(rows: &[&Record]) -> Vec<AverageTime> {
    let mut tallies: HashMap<String, TimeTally> = HashMap::new();
    for record in rows {
        let time = record.get(TIME);
        if time.is_empty() {
            if is_absence(record.get(DATE)) {
                tally(&mut tallies, record).absences += 1;
            }
            continue;
        }
        if let Some(minutes) = day_length(time) {
            let entry = tally(&mut tallies, record);
            entry.total_minutes += minutes;
            entry.days += 1;
        }
    }

    let mut tallies: Vec<(String, TimeTally)> = tallies.into_iter().collect();
    sort_by_ac_no(&mut tallies);
    tallies
        .into_iter()
        .map(|(ac_no, t)| {
            let minutes = if t.days == 0 {
                0
            } else {
                (t.total_minutes as f64 / t.days as f64).round() as i64
            };
            AverageTime {
                ac_no,
                time_value: minutes,
                time_label: format!("{:02}h:{:02}m", minutes / 60, minutes % 60),
                name: t.name,
                absent: days(t.absences),
            }
        })
        .collect()
}

fn tally<'a>(tallies: &'a mut HashMap<String, TimeTally>, record: &Record) -> &'a mut TimeTally {
    tallies
        .entry(record.get(AC_NO).to_string())
        .or_insert_with(|| TimeTally {
            name: record.get(NAME).to_string(),
            ..TimeTally::default()
        })
}

fn attendance_days(rows: &[&Record]) -> Vec<AttendanceDays> {
    let mut counts: HashMap<String, (String, usize, usize)> = HashMap::new();
    for record in rows {
        let (_, present, absent) = counts
            .entry(record.get(AC_NO).to_string())
            .or_insert_with(|| (record.get(NAME).to_string(), 0, 0));
        if !record.get(TIME).is_empty() {
            *present += 1;
        } else if is_absence(record.get(DATE)) {
            *absent += 1;
        }
    }

    let mut counts: Vec<(String, (String, usize, usize))> = counts.into_iter().collect();
    sort_by_ac_no(&mut counts);
    counts
        .into_iter()
        .map(|(ac_no, (name, present, absent))| AttendanceDays {
            ac_no,
            name,
            present: days(present),
            absent: days(absent),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::tests::{run_json, services};
    use super::*;
    use crate::api::DEMO_ATTENDANCE;
    use serde_json::json;

    fn worksheet(rows: &[[&str; 5]]) -> Worksheet {
        let mut values = vec![vec![
            AC_NO.to_string(),
            NAME.to_string(),
            DEPARTMENT.to_string(),
            DATE.to_string(),
            TIME.to_string(),
        ]];
        values.extend(rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()));
        Worksheet::from_values(1, "March 2024", values)
    }

    #[test]
    fn test_day_length() {
        assert_eq!(day_length("07:30 14:30"), Some(420));
        assert_eq!(day_length(" 07:58  12:10 14:30 "), Some(392));
        assert_eq!(day_length("07:30"), None);
        assert_eq!(day_length("late 14:30"), None);
    }

    #[test]
    fn test_is_absence() {
        // 03/03/2024 is a Sunday.
        assert!(!is_absence("03/03/2024"));
        assert!(is_absence("03/04/2024"));
        assert!(is_absence("not a date"));
    }

    #[test]
    fn test_sort_by_ac_no() {
        let mut rows = vec![
            ("20".to_string(), ()),
            ("x".to_string(), ()),
            ("3".to_string(), ()),
            ("101".to_string(), ()),
        ];
        sort_by_ac_no(&mut rows);
        let order: Vec<&str> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(order, vec!["3", "20", "101", "x"]);
    }

    #[tokio::test]
    async fn test_teachers_average_time() {
        let services = services();
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&attendanceWorkSheet=June%202024");
        let json = run_json(&services, Endpoint::TeachersAverageTime, &query).await;
        assert_eq!(
            json,
            json!([{
                "acNo": "101",
                "timeValue": 405,
                "timeLabel": "06h:45m",
                "Name": "Farah Naz",
                "Absent": "0 days"
            }])
        );

        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&attendanceWorkSheet=July%202024");
        let json = run_json(&services, Endpoint::TeachersAverageTime, &query).await;
        assert_eq!(json[0]["timeValue"], 450);
        assert_eq!(json[0]["timeLabel"], "07h:30m");
        assert_eq!(json[0]["Absent"], "1 day");
    }

    #[tokio::test]
    async fn test_teachers_attendance_summary() {
        let services = services();
        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&attendanceWorkSheet=July%202024");
        let json = run_json(&services, Endpoint::TeachersAttendanceSummary, &query).await;
        assert_eq!(
            json,
            json!([{"acNo": "101", "Name": "Farah Naz", "Present": "1 day", "Absent": "1 day"}])
        );

        let query = format!("attendanceSheet={DEMO_ATTENDANCE}&attendanceWorkSheet=June%202024");
        let json = run_json(&services, Endpoint::TeachersAttendanceSummary, &query).await;
        assert_eq!(json[0]["Present"], "2 days");
        assert_eq!(json[0]["Absent"], "0 days");
    }

    #[test]
    fn test_only_absent_on_a_sunday() {
        let ws = worksheet(&[
            ["7", "Hina", "Main Library", "03/03/2024", ""],
            ["8", "Iqbal", "Main Library", "03/04/2024", "08:00"],
        ]);
        let StaffReport::Rows(times) = staff_report(&ws, &Staff::default(), average_times) else {
            panic!("expected rows");
        };
        // Neither has an absence on a weekday or a full day of punches.
        assert!(times.is_empty());

        let StaffReport::Rows(summary) = staff_report(&ws, &Staff::default(), attendance_days)
        else {
            panic!("expected rows");
        };
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].present, "0 days");
        assert_eq!(summary[0].absent, "0 days");
        assert_eq!(summary[1].present, "1 day");
    }

    #[test]
    fn test_pre_aggregated_sheet() {
        let values = vec![
            vec!["Date".to_string(), "Total".to_string(), "Present".to_string()],
            vec!["03/01/2024".to_string(), "30".to_string(), "20".to_string()],
        ];
        let ws = Worksheet::from_values(1, "March 2024", values);
        let report = staff_report(&ws, &Staff::default(), average_times);
        assert_eq!(report, StaffReport::NoPunches { data: Vec::new() });
        assert_eq!(serde_json::to_value(&report).unwrap(), json!({"data": []}));
    }
}
