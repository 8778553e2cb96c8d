use crate::error::{ArgusError, Result};
use crate::models::{CellValue, Page, Tabular};
use std::str::FromStr;

/// Tables that can be downloaded from the domain pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTable {
    Incidents,
    Tickets,
    Datasets,
}

impl ExportTable {
    /// Page whose access rule also governs the download
    pub fn page(self) -> Page {
        match self {
            ExportTable::Incidents => Page::Cybersecurity,
            ExportTable::Tickets => Page::ItOperations,
            ExportTable::Datasets => Page::DataScience,
        }
    }

    pub fn file_stem(self) -> &'static str {
        match self {
            ExportTable::Incidents => "cyber_incidents",
            ExportTable::Tickets => "it_tickets",
            ExportTable::Datasets => "datasets_metadata",
        }
    }
}

impl FromStr for ExportTable {
    type Err = ArgusError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "incidents" => Ok(ExportTable::Incidents),
            "tickets" => Ok(ExportTable::Tickets),
            "datasets" => Ok(ExportTable::Datasets),
            other => Err(ArgusError::Export(format!("unknown table '{}'", other))),
        }
    }
}

/// Download formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ArgusError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(ArgusError::Export(format!("unknown format '{}'", other))),
        }
    }
}

/// Convert records to CSV
///
/// The header row carries the column names, so the output can be read back
/// as a seed file. Missing values are written as empty fields.
///
/// # Examples
/// ```
/// use argus::downloader::to_csv;
/// use argus::models::DatasetMetadata;
///
/// let datasets = vec![DatasetMetadata {
///     dataset_id: 1,
///     name: "sales".into(),
///     rows: 1200,
///     columns: 8,
///     uploaded_by: "data_scientist".into(),
///     upload_date: "2024-10-01".into(),
/// }];
/// let csv = to_csv(&datasets).unwrap();
/// assert!(csv.starts_with("dataset_id,name,rows,columns,uploaded_by,upload_date\n"));
/// ```
pub fn to_csv<T: Tabular>(records: &[T]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(T::HEADERS)?;

    for record in records {
        writer.write_record(record.cells().iter().map(CellValue::to_string))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ArgusError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ArgusError::Export(e.to_string()))
}

/// Convert records to an XLSX workbook with a single sheet
///
/// Numbers are written as numeric cells; the first row holds the headers.
#[cfg(feature = "web")]
pub fn to_xlsx<T: Tabular>(records: &[T], sheet_name: &str) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let export_err = |e: rust_xlsxwriter::XlsxError| ArgusError::Export(e.to_string());

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name(sheet_name).map_err(export_err)?;

    for (col, header) in T::HEADERS.iter().enumerate() {
        worksheet
            .write_string(0, col as u16, *header)
            .map_err(export_err)?;
    }

    for (r, record) in records.iter().enumerate() {
        let row = (r + 1) as u32;
        for (col, cell) in record.cells().into_iter().enumerate() {
            let col = col as u16;
            match cell {
                CellValue::Text(text) => {
                    worksheet.write_string(row, col, &text).map_err(export_err)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number(row, col, n).map_err(export_err)?;
                }
                CellValue::Empty => {}
            }
        }
    }

    workbook.push_worksheet(worksheet);
    workbook.save_to_buffer().map_err(export_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::from_csv;
    use crate::models::{CyberIncident, ItTicket};

    fn incidents() -> Vec<CyberIncident> {
        vec![
            CyberIncident {
                incident_id: 1,
                timestamp: "2024-11-01 09:00:00".into(),
                severity: "High".into(),
                category: "Phishing".into(),
                status: "Open".into(),
                description: Some("Invoice lure, \"urgent\" subject".into()),
            },
            CyberIncident {
                incident_id: 2,
                timestamp: "2024-11-02 10:00:00".into(),
                severity: "Low".into(),
                category: "Malware".into(),
                status: "Closed".into(),
                description: None,
            },
        ]
    }

    #[test]
    fn csv_export_reads_back_as_a_seed_file() {
        let csv = to_csv(&incidents()).unwrap();
        assert!(csv.starts_with("incident_id,timestamp,severity,category,status,description\n"));
        assert!(csv.contains("\"Invoice lure, \"\"urgent\"\" subject\""));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.csv");
        std::fs::write(&path, csv).unwrap();
        let back: Vec<CyberIncident> = from_csv(&path).unwrap();
        assert_eq!(back, incidents());
    }

    #[test]
    fn empty_table_exports_only_headers() {
        let csv = to_csv::<ItTicket>(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn table_and_format_names() {
        assert_eq!("tickets".parse::<ExportTable>().unwrap(), ExportTable::Tickets);
        assert_eq!(ExportTable::Datasets.page(), Page::DataScience);
        assert!("users".parse::<ExportTable>().is_err());

        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_export_is_a_zip_container() {
        let bytes = to_xlsx(&incidents(), "Incidents").unwrap();
        // xlsx files are zip archives
        assert_eq!(&bytes[..2], b"PK");
    }
}
