use crate::domain::model::{Cell, SourceRecord, SourceTable};
use crate::domain::ports::SourceReader;
use crate::utils::error::{ImportError, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Picked from the file extension.
    #[default]
    Auto,
    Xlsx,
    Xls,
    Ods,
    Csv,
}

impl SourceFormat {
    fn resolve(self, path: &Path) -> Self {
        if self != SourceFormat::Auto {
            return self;
        }
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("csv") | Some("txt") => SourceFormat::Csv,
            Some("xls") => SourceFormat::Xls,
            Some("ods") => SourceFormat::Ods,
            _ => SourceFormat::Xlsx,
        }
    }
}

/// Extensions picked up when a source path is a directory.
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods", "csv"];

/// Reads one or more workbooks with the same layout and merges their rows.
#[derive(Debug, Clone)]
pub struct SpreadsheetReader {
    paths: Vec<PathBuf>,
    format: SourceFormat,
    sheet: Option<String>,
    header_row: usize,
    delimiter: u8,
}

impl SpreadsheetReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::from_paths([path])
    }

    /// Files are merged in the order given; a directory expands to its workbooks
    /// sorted by name.
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            format: SourceFormat::Auto,
            sheet: None,
            header_row: 0,
            delimiter: b',',
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    /// 0-based index of the header row; rows above it are ignored.
    pub fn with_header_row(mut self, header_row: usize) -> Self {
        self.header_row = header_row;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    fn source_files(&self) -> Result<Vec<PathBuf>> {
        if self.paths.is_empty() {
            return Err(read_error(Path::new(""), "no source path configured"));
        }

        let mut files = Vec::new();
        for path in &self.paths {
            if path.is_dir() {
                let found = workbooks_in(path)?;
                if found.is_empty() {
                    return Err(read_error(path, "directory contains no workbooks"));
                }
                files.extend(found);
            } else if path.exists() {
                files.push(path.clone());
            } else {
                return Err(read_error(path, "file not found"));
            }
        }
        Ok(files)
    }

    fn read_blocking(&self) -> Result<SourceTable> {
        let files = self.source_files()?;
        let label_rows = files.len() > 1;

        let mut files = files.iter();
        let Some(first) = files.next() else {
            return Ok(SourceTable::default());
        };
        let mut table = self.read_file(first, label_rows)?;

        for path in files {
            let next = self.read_file(path, label_rows)?;
            if significant(&next.headers) != significant(&table.headers) {
                return Err(ImportError::SchemaMismatchError {
                    message: format!(
                        "headers of {} [{}] differ from {} [{}]",
                        path.display(),
                        significant(&next.headers).join(", "),
                        first.display(),
                        significant(&table.headers).join(", ")
                    ),
                });
            }
            tracing::debug!("Merged {} record(s) from {}", next.records.len(), path.display());
            table.records.extend(next.records);
        }
        Ok(table)
    }

    fn read_file(&self, path: &Path, label_rows: bool) -> Result<SourceTable> {
        let rows = match self.format.resolve(path) {
            SourceFormat::Csv => self.csv_rows(path)?,
            _ => self.workbook_rows(path)?,
        };
        let mut table = into_table(rows, self.header_row);
        if label_rows {
            let name = file_label(path);
            for record in &mut table.records {
                record.file = Some(name.clone());
            }
        }
        Ok(table)
    }

    fn workbook_rows(&self, path: &Path) -> Result<Vec<Vec<Cell>>> {
        let mut workbook = open_workbook_auto(path).map_err(|e| read_error(path, e))?;

        let sheet = match &self.sheet {
            Some(name) => name.clone(),
            None => workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| read_error(path, "workbook has no sheets"))?,
        };
        tracing::debug!("Reading sheet '{}' of {}", sheet, path.display());

        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| read_error(path, format!("sheet '{}': {}", sheet, e)))?;

        Ok(rows_from_range(&range))
    }

    fn csv_rows(&self, path: &Path) -> Result<Vec<Vec<Cell>>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .map_err(|e| read_error(path, e))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| read_error(path, e))?;
            rows.push(record.iter().map(Cell::from).collect());
        }
        Ok(rows)
    }
}

fn read_error(path: &Path, message: impl std::fmt::Display) -> ImportError {
    ImportError::SourceReadError {
        path: path.display().to_string(),
        message: message.to_string(),
    }
}

/// Workbooks directly inside `dir`, sorted by file name. Office lock files
/// (`~$...`) and hidden files are ignored.
fn workbooks_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| read_error(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| read_error(dir, e))?.path();
        let name = file_label(&path);
        let is_workbook = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| WORKBOOK_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_workbook && !name.starts_with("~$") && !name.starts_with('.') {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Headers without the trailing empty cells some exports pad rows with.
fn significant(headers: &[String]) -> &[String] {
    let len = headers
        .iter()
        .rposition(|h| !h.is_empty())
        .map_or(0, |last| last + 1);
    &headers[..len]
}

/// calamine ranges start at the first used cell; pad them back to sheet
/// coordinates so header and row numbers match what the user sees.
fn rows_from_range(range: &Range<Data>) -> Vec<Vec<Cell>> {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut rows: Vec<Vec<Cell>> = (0..start_row).map(|_| Vec::new()).collect();
    rows.extend(range.rows().map(|row| {
        std::iter::repeat(Cell::Empty)
            .take(start_col as usize)
            .chain(row.iter().map(cell_from_data))
            .collect()
    }));
    rows
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::from(*f),
        Data::Int(i) => Cell::from(*i as f64),
        Data::Empty | Data::Error(_) => Cell::Empty,
        other => Cell::Text(other.to_string()),
    }
}

fn header_text(cell: &Cell) -> String {
    cell.render().map(|s| s.trim().to_string()).unwrap_or_default()
}

fn is_blank_row(cells: &[Cell]) -> bool {
    cells.iter().all(|cell| match cell {
        Cell::Text(s) => s.trim().is_empty(),
        other => other.is_empty(),
    })
}

/// Splits raw rows into header and data records. Blank data rows are dropped.
fn into_table(rows: Vec<Vec<Cell>>, header_row: usize) -> SourceTable {
    let mut rows = rows.into_iter().enumerate().skip(header_row);
    let headers = rows
        .next()
        .map(|(_, cells)| cells.iter().map(header_text).collect())
        .unwrap_or_default();

    let records = rows
        .filter(|(_, cells)| !is_blank_row(cells))
        .map(|(index, cells)| SourceRecord {
            file: None,
            row: index + 1,
            cells,
        })
        .collect();

    SourceTable { headers, records }
}

impl SourceReader for SpreadsheetReader {
    async fn read(&self) -> Result<SourceTable> {
        let reader = self.clone();
        let table = tokio::task::spawn_blocking(move || reader.read_blocking())
            .await
            .map_err(|e| ImportError::SourceReadError {
                path: self.describe(),
                message: e.to_string(),
            })??;

        tracing::info!(
            "📂 Read {} record(s) with {} column(s) from {}",
            table.records.len(),
            table.headers.len(),
            self.describe()
        );
        Ok(table)
    }

    fn describe(&self) -> String {
        self.paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
