//! Stage 2a: socioeconomic indicators (population, GDP per capita) per
//! municipality, read from the first sheet of a spreadsheet.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::{debug, info};

use crate::config::IndicatorColumns;
use crate::error::{CanopyError, Result};
use crate::io::ensure_parent;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub municipality: String,
    /// `None` when the cell is empty or not numeric.
    pub gdp_per_capita: Option<f64>,
    pub population: Option<f64>,
}

/// The selected indicator columns, in spreadsheet row order.
#[derive(Debug, Clone, Default)]
pub struct IndicatorTable {
    pub records: Vec<IndicatorRecord>,
}

impl IndicatorTable {
    /// First record whose municipality name matches exactly.
    pub fn lookup(&self, municipality: &str) -> Option<&IndicatorRecord> {
        self.records.iter().find(|r| r.municipality == municipality)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_owned(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn cell_number(cell: &Data) -> Option<f64> {
    match cell {
        Data::Int(i) => Some(*i as f64),
        Data::Float(f) => Some(*f),
        Data::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn column_index(header: &[Data], name: &str, path: &Path) -> Result<usize> {
    header
        .iter()
        .position(|c| cell_text(c) == name)
        .ok_or_else(|| CanopyError::MissingColumn { column: name.to_owned(), path: path.to_path_buf() })
}

/// Build the table from raw sheet rows; the first row is the header.
pub fn from_rows<'a>(
    mut rows: impl Iterator<Item = &'a [Data]>,
    columns: &IndicatorColumns,
    path: &Path,
) -> Result<IndicatorTable> {
    let header = rows.next().ok_or_else(|| CanopyError::Spreadsheet {
        path: path.to_path_buf(),
        message: "sheet is empty".to_owned(),
    })?;
    let name_col = column_index(header, &columns.municipality, path)?;
    let gdp_col = column_index(header, &columns.gdp_per_capita, path)?;
    let pop_col = column_index(header, &columns.population, path)?;

    let records = rows
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|row| IndicatorRecord {
            municipality: row.get(name_col).map(cell_text).unwrap_or_default(),
            gdp_per_capita: row.get(gdp_col).and_then(cell_number),
            population: row.get(pop_col).and_then(cell_number),
        })
        .collect();
    Ok(IndicatorTable { records })
}

/// Read the three indicator columns from the first worksheet.
pub fn load_indicators(path: &Path, columns: &IndicatorColumns) -> Result<IndicatorTable> {
    let spreadsheet_err = |message: String| CanopyError::Spreadsheet { path: path.to_path_buf(), message };

    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| spreadsheet_err("workbook has no sheets".to_owned()))?
        .map_err(|e| spreadsheet_err(e.to_string()))?;
    debug!(?path, rows = range.height(), cols = range.width(), "read indicator sheet");

    let table = from_rows(range.rows(), columns, path)?;
    info!(?path, municipalities = table.len(), "loaded socioeconomic indicators");
    Ok(table)
}

fn number_field(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

/// Write the selected columns to CSV: a leading unnamed row-index column,
/// then the three columns under their spreadsheet headers.
pub fn write_indicators_csv(path: &Path, table: &IndicatorTable, columns: &IndicatorColumns) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "",
        columns.municipality.as_str(),
        columns.gdp_per_capita.as_str(),
        columns.population.as_str(),
    ])?;
    for (i, r) in table.records.iter().enumerate() {
        writer.write_record([
            i.to_string(),
            r.municipality.clone(),
            number_field(r.gdp_per_capita),
            number_field(r.population),
        ])?;
    }
    writer.flush().map_err(|e| CanopyError::io(path, e))?;
    info!(?path, "wrote indicator csv");
    Ok(())
}
