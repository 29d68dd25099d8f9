//! Implements the `Spreadsheets` trait using in-memory data.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without using Google Sheets.

use crate::api::{Spreadsheets, WorksheetInfo};
use crate::error::{Error, ErrorType, IntoResult, Result};
use crate::model::clean_title;
use anyhow::Context;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Mutex, MutexGuard};

/// The id of the seeded attendance document.
pub const DEMO_ATTENDANCE: &str = "demo-attendance";

/// The id of the seeded quotation document.
pub const DEMO_QUOTATION: &str = "demo-quotation";

// Worksheet ids are offset so that they can't be mistaken for tab indexes.
const FIRST_WORKSHEET_ID: i64 = 100;

#[derive(Debug, Clone)]
struct StoredSheet {
    info: WorksheetInfo,
    values: Vec<Vec<String>>,
}

/// An implementation of the `Spreadsheets` trait that does not use Google sheets. It holds
/// documents in memory and, by default, is seeded with a demo attendance document and a demo
/// quotation document.
#[derive(Debug, Default)]
pub struct TestSheets {
    documents: Mutex<HashMap<String, Vec<StoredSheet>>>,
}

impl TestSheets {
    /// A `TestSheets` without any documents.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A `TestSheets` holding the demo documents.
    pub fn seeded() -> Result<Self> {
        let sheets = Self::empty();
        let seeds = ATTENDANCE_SEED
            .iter()
            .map(|(title, csv)| (DEMO_ATTENDANCE, title, csv))
            .chain(QUOTATION_SEED.iter().map(|(t, c)| (DEMO_QUOTATION, t, c)));
        for (document_id, title, csv) in seeds {
            let values = load_csv(csv).pub_result(ErrorType::Internal)?;
            sheets.insert(document_id, title, values);
        }
        Ok(sheets)
    }

    /// Adds a worksheet to `document_id`, creating the document if needed. An existing worksheet
    /// with the same title has its values replaced. Returns the worksheet's metadata.
    pub fn insert(
        &self,
        document_id: &str,
        title: &str,
        values: Vec<Vec<String>>,
    ) -> WorksheetInfo {
        let mut documents = self.lock();
        let sheets = documents.entry(document_id.to_string()).or_default();
        if let Some(existing) = sheets.iter_mut().find(|s| s.info.title() == title) {
            existing.values = values;
            return existing.info.clone();
        }
        let index = sheets.len() as i64;
        let info = WorksheetInfo::new(FIRST_WORKSHEET_ID + index, index, title);
        sheets.push(StoredSheet {
            info: info.clone(),
            values,
        });
        info
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<StoredSheet>>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.documents.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl Spreadsheets for TestSheets {
    async fn worksheets(&self, document_id: &str) -> Result<Vec<WorksheetInfo>> {
        self.lock()
            .get(document_id)
            .map(|sheets| sheets.iter().map(|s| s.info.clone()).collect())
            .ok_or_else(|| Error::not_found(format!("Document '{document_id}' not found")))
    }

    async fn values(&self, document_id: &str, title: &str) -> Result<Vec<Vec<String>>> {
        let documents = self.lock();
        let sheets = documents
            .get(document_id)
            .ok_or_else(|| Error::not_found(format!("Document '{document_id}' not found")))?;
        let wanted = clean_title(title).to_lowercase();
        sheets
            .iter()
            .find(|s| clean_title(s.info.title()).to_lowercase() == wanted)
            .map(|s| s.values.clone())
            .ok_or_else(|| Error::not_found(format!("Worksheet '{title}' not found")))
    }
}

/// Loads data from a CSV-formatted string.
fn load_csv(csv_data: &str) -> anyhow::Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(Cursor::new(csv_data.as_bytes()));

    let mut rows: Vec<Vec<String>> = Vec::new();
    for result in rdr.records() {
        let record = result.context("Invalid seed CSV")?;
        rows.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(rows)
}

const ATTENDANCE_SEED: [(&str, &str); 3] = [
    ("June 2024", ATTENDANCE_JUNE),
    ("July 2024", ATTENDANCE_JULY),
    ("Notes", ATTENDANCE_NOTES),
];

const QUOTATION_SEED: [(&str, &str); 5] = [
    ("June 2024", QUOTATION_JUNE),
    ("July 2024", QUOTATION_JULY),
    ("Summary", QUOTATION_SUMMARY),
    ("Expenses", EXPENSES),
    ("Quotation", QUOTATION_GRID),
];

/// Per-punch attendance. Row order follows the attendance machine export.
const ATTENDANCE_JUNE: &str = r##"AC-No,Name,Department,Date,Time
1,Ayesha Khan,Class 1,06/03/2024,07:55
2,Bilal Ahmed,Class 1,06/03/2024,08:01
3,Chanda Malik,Class 2,06/03/2024,07:58
4,Danish Raza,Class 2,06/03/2024,
101,Farah Naz,Main Library,06/03/2024,07:30 14:30
142,Guard Office,Main Library,06/03/2024,06:00 18:00
1,Ayesha Khan,Class 1,06/04/2024,07:59
2,Bilal Ahmed,Class 1,06/04/2024,
3,Chanda Malik,Class 2,06/04/2024,08:03
4,Danish Raza,Class 2,06/04/2024,08:10
101,Farah Naz,Main Library,06/04/2024,07:45 14:15
"##;

const ATTENDANCE_JULY: &str = r##"AC-No,Name,Department,Date,Time
1,Ayesha Khan,Class 1,07/01/2024,07:50
2,Bilal Ahmed,Class 1,07/01/2024,07:52
3,Chanda Malik,Class 2,07/01/2024,07:57
4,Danish Raza,Class 2,07/01/2024,08:05
101,Farah Naz,Main Library,07/01/2024,07:30 15:00
1,Ayesha Khan,Class 1,07/02/2024,07:58
2,Bilal Ahmed,Class 1,07/02/2024,08:00
3,Chanda Malik,Class 2,07/02/2024,
4,Danish Raza,Class 2,07/02/2024,08:02
101,Farah Naz,Main Library,07/02/2024,
"##;

const ATTENDANCE_NOTES: &str = r##"Note
Attendance is exported from the machine every evening.
"##;

const QUOTATION_JUNE: &str = r##"Date,Meal Name,No. Of Boxes,Cost for 200 Meals
06/03/2024,Chicken Biryani,"1,050","12,500"
06/04/2024,Daal Chawal,980,"9,800"
*Sunday Excluded,,,
06/10/2024,Aloo Keema,0,0
TOTAL (PKR),,"2,030","22,300"
"##;

const QUOTATION_JULY: &str = r##"Date,Meal Name,No. Of Boxes,Cost for 200 Meals
07/01/2024,Chana Pulao,"1,100","11,000"
07/02/2024,Chicken Karahi,"1,020","13,200"
07/03/2024,Sabzi Roti,,
TOTAL (PKR),,"2,120","24,200"
"##;

const QUOTATION_SUMMARY: &str = r##"Month,Total Boxes
June 2024,"2,030"
July 2024,"2,120"
"##;

const EXPENSES: &str = r##"June 2024,,July 2024,
Teacher Salary,"45,000",Teacher Salary,"46,000"
Cleaning Staff,"8,000",Cleaning Staff,"8,000"
Wifi,"2,500",Wifi Bill,"2,500"
Ice,900,Ice,"1,100"
Cook,"20,000",Cook,n/a
Total,"76,400",Total,"57,600"
"##;

const QUOTATION_GRID: &str = r##"Meal Plan Quotations,,,,,
,,,,,
,,,,,
,,,,,
,,,Meal Plan,Quotations,Cost for 200 Meals
,,,Chicken Biryani,Vendor A,"12,500"
,,,Daal Chawal,Vendor B,"9,800"
,,,Chana Pulao,Vendor A,"11,000"
,,,,,
,,,Ignored,After,Blank
"##;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_documents() {
        let sheets = TestSheets::seeded().unwrap();
        let worksheets = sheets.worksheets(DEMO_QUOTATION).await.unwrap();
        assert_eq!(worksheets.len(), 5);
        assert_eq!(worksheets[0].title(), "June 2024");
        assert_eq!(worksheets[0].index(), 0);

        let june = sheets.values(DEMO_QUOTATION, "june  2024").await.unwrap();
        assert_eq!(june[0][2], "No. Of Boxes");
        assert_eq!(june[1][2], "1,050");
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let sheets = TestSheets::seeded().unwrap();
        let e = sheets.worksheets("nope").await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::NotFound);
        let e = sheets.values(DEMO_ATTENDANCE, "May 2024").await.unwrap_err();
        assert_eq!(e.error_type(), ErrorType::NotFound);
    }

    #[tokio::test]
    async fn test_insert_replaces() {
        let sheets = TestSheets::empty();
        let first = sheets.insert("d", "A", vec![vec!["1".to_string()]]);
        let second = sheets.insert("d", "A", vec![vec!["2".to_string()]]);
        assert_eq!(first, second);
        assert_eq!(sheets.values("d", "A").await.unwrap()[0][0], "2");
    }
}
