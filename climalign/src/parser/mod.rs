//! CSV reading and writing with encoding and delimiter auto-detection.
//!
//! Turns CSV content into [`Table`]s with typed cells and writes tables back
//! out. No dataset-specific logic here.

use std::path::Path;

use crate::models::{Cell, Table};

/// CSV parsing error with context
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed table
    pub table: Table,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "iso-8859-15" | "latin-9" | "latin9" => "iso-8859-15".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding.
///
/// Unknown encodings and invalid UTF-8 fall back to lossy UTF-8. A leading
/// byte-order mark is removed.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        // Latin-1 labels decode as windows-1252, per the WHATWG label table
        "iso-8859-1" | "latin-1" | "latin1" | "windows-1252" | "cp1252" => {
            encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()
        }
        "iso-8859-15" | "latin-9" | "latin9" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

fn delimiter_byte(delimiter: char) -> Result<u8, CsvError> {
    u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| CsvError::new(0, "Delimiter must be a single ASCII character").with_value(delimiter.to_string()))
}

/// Parse CSV text into a table with an explicit delimiter.
///
/// The first record is the header row. Quoted fields may contain the
/// delimiter. Blank lines are skipped; short rows are padded with missing
/// cells.
///
/// # Example
/// ```
/// use climalign::parser::parse_table;
///
/// let table = parse_table("Entity,Year\n\"Bonaire, Sint Eustatius and Saba\",2000", ',', "emissions").unwrap();
/// assert_eq!(table.len(), 1);
/// assert_eq!(table.rows()[0][0].to_string(), "Bonaire, Sint Eustatius and Saba");
/// ```
pub fn parse_table(content: &str, delimiter: char, name: &str) -> Result<Table, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| CsvError::new(1, format!("Cannot read header: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::new(1, "Empty CSV file"));
    }

    let mut table = Table::new(name, headers);

    for result in reader.records() {
        let record = result.map_err(|e| {
            let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
            CsvError::new(line, format!("Cannot read record: {}", e))
        })?;

        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        table.push_row(record.iter().map(Cell::parse).collect());
    }

    Ok(table)
}

/// Parse CSV file with auto-detection of encoding and delimiter.
///
/// The table is named after the file stem.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> Result<ParseResult, CsvError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| CsvError::new(0, format!("Cannot read file '{}': {}", path.display(), e)))?;

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input");

    parse_bytes_auto(&bytes, name)
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8], name: &str) -> Result<ParseResult, CsvError> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let table = parse_table(&content, delimiter, name)?;

    Ok(ParseResult {
        table,
        encoding,
        delimiter,
    })
}

/// Write a table as CSV text.
///
/// Integral numbers are written without a fractional part; missing cells
/// are written as empty fields.
pub fn write_table(table: &Table, delimiter: char) -> Result<String, CsvError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .from_writer(Vec::new());

    let write_err = |e: csv::Error| CsvError::new(0, format!("Cannot write CSV: {}", e));

    writer.write_record(table.columns()).map_err(write_err)?;
    for row in table.rows() {
        writer
            .write_record(row.iter().map(|cell| cell.to_string()))
            .map_err(write_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CsvError::new(0, format!("Cannot flush CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| CsvError::new(0, format!("Encoding error: {}", e)))
}
