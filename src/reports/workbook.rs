use std::fmt::Display;
use std::io::{Cursor, Read, Seek};

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xls, Xlsx};
use tracing::debug;

use super::{ParserError, RawRow, ReportParser, SheetParser};

/// Legacy BIFF8 report (.xls), the portal's default export
pub struct XlsReportParser {
    reference_year: i32,
}

impl XlsReportParser {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }
}

impl ReportParser for XlsReportParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawRow>, ParserError> {
        debug!("Opening .xls report ({} bytes)", bytes.len());
        // Synchronous, callers on the runtime should use spawn_blocking
        let mut workbook = open_workbook_from_rs::<Xls<_>, _>(Cursor::new(bytes))
            .map_err(|e| ParserError::WorkbookOpen(e.to_string()))?;

        let range = first_sheet(&mut workbook)?;
        SheetParser::new(self.reference_year).parse(&range)
    }
}

/// Office Open XML report (.xlsx)
pub struct XlsxReportParser {
    reference_year: i32,
}

impl XlsxReportParser {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }
}

impl ReportParser for XlsxReportParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawRow>, ParserError> {
        debug!("Opening .xlsx report ({} bytes)", bytes.len());
        let mut workbook = open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(bytes))
            .map_err(|e| ParserError::WorkbookOpen(e.to_string()))?;

        let range = first_sheet(&mut workbook)?;
        SheetParser::new(self.reference_year).parse(&range)
    }
}

fn first_sheet<RS, W>(workbook: &mut W) -> Result<Range<Data>, ParserError>
where
    RS: Read + Seek,
    W: Reader<RS>,
    W::Error: Display,
{
    let name = workbook.sheet_names().first().cloned().unwrap_or_default();
    match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => {
            debug!("Reading sheet '{}' ({} rows)", name, range.height());
            Ok(range)
        }
        Some(Err(e)) => Err(ParserError::WorkbookOpen(format!("sheet '{name}': {e}"))),
        None => Err(ParserError::SheetNotFound("workbook has no sheets".to_string())),
    }
}
