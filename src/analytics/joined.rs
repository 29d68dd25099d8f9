//! Endpoints that put attendance next to the quotation sheets.

use super::{
    average_boxes, boxes_filter, month_title, require_column, Endpoint, Params, Services, BOXES,
};
use crate::api::Document;
use crate::error::{Error, Result};
use crate::model::{
    average_positive, column_by_date, join, worksheet_attendance, JoinFilter, JoinedRecord,
    Metric, MonthKey, RowFilter, Worksheet,
};
use serde::Serialize;
use std::collections::BTreeMap;

/// How many of the most recent months `averageStudentsVsBoxes` looks at.
const RECENT_MONTHS: usize = 3;

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MonthAverages {
    pub(super) average_boxes: Metric,
    pub(super) average_students_present: Metric,
}

pub(super) async fn students_vs_boxes(services: &Services, params: &Params) -> Result<String> {
    let attendance_sheet = params.required("attendanceSheet")?;
    let quotation_sheet = params.required("quotationSheet")?;
    let attendance_worksheet = params.required("attendanceWorkSheet")?;
    let quotation_worksheet = params.required("quotationWorkSheet")?;
    let endpoint = Endpoint::StudentsVsBoxes;
    let key = endpoint
        .key()
        .part(attendance_sheet)
        .part(quotation_sheet)
        .part(attendance_worksheet)
        .part(quotation_worksheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let (attendance, quotation) = tokio::try_join!(
                services.open(attendance_sheet),
                services.open(quotation_sheet)
            )?;
            let (attendance, quotation) = tokio::try_join!(
                attendance.worksheet(attendance_worksheet),
                quotation.worksheet(quotation_worksheet)
            )?;
            joined_by_date(services, &attendance, &quotation)
        })
        .await
}

/// Boxes and present people per date, for the dates where both are positive.
fn joined_by_date(
    services: &Services,
    attendance: &Worksheet,
    quotation: &Worksheet,
) -> Result<Vec<JoinedRecord>> {
    require_column(quotation, BOXES)?;
    let sentinels = &services.options().sentinels;
    let present = worksheet_attendance(attendance, &RowFilter::new(sentinels));
    let boxes = column_by_date(&quotation.records(), &boxes_filter(sentinels), BOXES);
    Ok(join(&boxes, &present, JoinFilter::BothPositive))
}

pub(super) async fn average_students_vs_boxes(
    services: &Services,
    params: &Params,
) -> Result<String> {
    let quotation_sheet = params.required("quotationSheet")?;
    let attendance_sheet = params.required("attendanceSheet")?;
    let endpoint = Endpoint::AverageStudentsVsBoxes;
    let key = endpoint.key().part(quotation_sheet).part(attendance_sheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let (quotation, attendance) = tokio::try_join!(
                services.open(quotation_sheet),
                services.open(attendance_sheet)
            )?;
            Ok(recent_month_averages(services, &quotation, &attendance).await)
        })
        .await
}

/// Average boxes and attendance for the latest months of each document, keyed by month. A month
/// that only one document has gets zero for the other side.
async fn recent_month_averages(
    services: &Services,
    quotation: &Document,
    attendance: &Document,
) -> BTreeMap<String, MonthAverages> {
    let sentinels = &services.options().sentinels;
    let (quotation_sheets, attendance_sheets) = tokio::join!(
        quotation.latest(RECENT_MONTHS, Some(BOXES)),
        attendance.latest(RECENT_MONTHS, None)
    );

    let mut months: BTreeMap<String, MonthAverages> = BTreeMap::new();
    for worksheet in &quotation_sheets {
        months
            .entry(month_title(worksheet.title()))
            .or_default()
            .average_boxes = Metric(average_boxes(worksheet, sentinels));
    }
    for worksheet in &attendance_sheets {
        let present = worksheet_attendance(worksheet, &RowFilter::new(sentinels));
        months
            .entry(month_title(worksheet.title()))
            .or_default()
            .average_students_present = Metric(average_positive(&present));
    }
    months
}

pub(super) async fn meal_cost_student_average(
    services: &Services,
    params: &Params,
) -> Result<String> {
    let quotation_sheet = params.required("quotationSheet")?;
    let quotation_worksheet = params.required("quotationWorkSheet")?;
    let attendance_sheet = params.required("attendanceSheet")?;
    let attendance_worksheet = params.required("attendanceWorkSheet")?;
    let endpoint = Endpoint::MealCostStudentAverage;
    let key = endpoint
        .key()
        .part(quotation_sheet)
        .part(quotation_worksheet)
        .part(attendance_sheet)
        .part(attendance_worksheet);
    services
        .cached(endpoint, &key, |_| true, move || async move {
            let (quotation, attendance) = tokio::try_join!(
                services.open(quotation_sheet),
                services.open(attendance_sheet)
            )?;
            current_and_previous(
                services,
                &quotation,
                quotation_worksheet,
                &attendance,
                attendance_worksheet,
            )
            .await
        })
        .await
}

/// Average boxes and attendance for a month and the month before it.
///
/// The quotation worksheet decides the months. Its previous month must exist in the quotation
/// document, while a missing previous attendance sheet counts as zero attendance.
async fn current_and_previous(
    services: &Services,
    quotation: &Document,
    quotation_worksheet: &str,
    attendance: &Document,
    attendance_worksheet: &str,
) -> Result<BTreeMap<String, MonthAverages>> {
    let sentinels = &services.options().sentinels;
    let current_info = quotation.select(quotation_worksheet)?;
    let current_month = MonthKey::parse(current_info.title()).map_err(Error::request)?;
    let previous_month = current_month.previous();
    let previous_info = quotation.by_title(&previous_month.title()).ok_or_else(|| {
        Error::not_found(format!(
            "Previous month quotation worksheet '{previous_month}' not found"
        ))
    })?;
    let attendance_info = attendance.select(attendance_worksheet)?;

    let (current_quotation, previous_quotation, current_attendance) = tokio::try_join!(
        quotation.load(current_info),
        quotation.load(previous_info),
        attendance.load(attendance_info)
    )?;
    let previous_present = match attendance.by_title(&previous_month.title()) {
        Some(info) => {
            let worksheet = attendance.load(info).await?;
            average_positive(&worksheet_attendance(&worksheet, &RowFilter::new(sentinels)))
        }
        None => 0.0,
    };
    let current_present = average_positive(&worksheet_attendance(
        &current_attendance,
        &RowFilter::new(sentinels),
    ));

    let mut months = BTreeMap::new();
    months.insert(
        current_month.title(),
        MonthAverages {
            average_boxes: Metric(average_boxes(&current_quotation, sentinels)),
            average_students_present: Metric(current_present),
        },
    );
    months.insert(
        previous_month.title(),
        MonthAverages {
            average_boxes: Metric(average_boxes(&previous_quotation, sentinels)),
            average_students_present: Metric(previous_present),
        },
    );
    Ok(months)
}
