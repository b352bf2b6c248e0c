use std::borrow::Cow;
use std::io::Cursor;

use calamine::{Reader, open_workbook_auto_from_rs};
use chardetng::EncodingDetector;
use encoding_rs::{UTF_8, UTF_16LE, WINDOWS_1251, WINDOWS_1252};
use serde::Serialize;

use crate::error::VaultError;

/// One rung of the fixed fallback ladder. Every rung decodes strictly: a
/// byte sequence the encoding cannot represent fails the attempt instead of
/// being replaced, so control moves on to the next rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    Utf8,
    Windows1252,
    Windows1251,
    Utf16Le,
    Ascii,
}

/// Fallback order when detection is unavailable or the detected encoding
/// fails: a broad Unicode encoding, two regional 8-bit encodings, a 16-bit
/// Unicode variant, then plain ASCII. The first rung that decodes and parses
/// wins, even when a later rung would also have succeeded.
pub const ENCODING_LADDER: &[TextEncoding] = &[
    TextEncoding::Utf8,
    TextEncoding::Windows1252,
    TextEncoding::Windows1251,
    TextEncoding::Utf16Le,
    TextEncoding::Ascii,
];

impl TextEncoding {
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Windows1252 => "windows-1252",
            TextEncoding::Windows1251 => "windows-1251",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Ascii => "ascii",
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<Cow<'_, str>> {
        match self {
            TextEncoding::Utf8 => UTF_8.decode_without_bom_handling_and_without_replacement(bytes),
            // The web mapping of the windows code pages decodes every byte
            // (undefined positions become C1 controls), which would make the
            // rungs below unreachable. Bytes the code page leaves undefined
            // are treated as malformed instead, like the strict codecs the
            // rest of the world uses.
            TextEncoding::Windows1252 => {
                if bytes
                    .iter()
                    .any(|byte| matches!(byte, 0x81 | 0x8D | 0x8F | 0x90 | 0x9D))
                {
                    return None;
                }
                WINDOWS_1252.decode_without_bom_handling_and_without_replacement(bytes)
            }
            TextEncoding::Windows1251 => {
                if bytes.contains(&0x98) {
                    return None;
                }
                WINDOWS_1251.decode_without_bom_handling_and_without_replacement(bytes)
            }
            TextEncoding::Utf16Le => {
                UTF_16LE.decode_without_bom_handling_and_without_replacement(bytes)
            }
            TextEncoding::Ascii => {
                if bytes.is_ascii() {
                    std::str::from_utf8(bytes).ok().map(Cow::Borrowed)
                } else {
                    None
                }
            }
        }
    }
}

/// Which decode attempt produced the table, for user-facing reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "encoding")]
pub enum DecodeStrategy {
    /// Statistical detector's guess succeeded; payload is the encoding name.
    Detected(String),
    /// A fixed ladder rung succeeded.
    Fallback(TextEncoding),
    /// Legacy binary spreadsheet parse succeeded.
    Spreadsheet,
}

impl DecodeStrategy {
    pub fn describe(&self) -> String {
        match self {
            DecodeStrategy::Detected(name) => format!("detected encoding {name}"),
            DecodeStrategy::Fallback(encoding) => format!("encoding {}", encoding.label()),
            DecodeStrategy::Spreadsheet => "spreadsheet format".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
}

/// Decoded in-memory table: named columns, string cells, inferred column
/// types. Exists only in session memory and is recomputed from the blob on
/// every load.
#[derive(Debug, Clone, Serialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub types: Vec<ColumnType>,
    pub rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn head(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Indexes of columns whose inferred type is numeric.
    pub fn numeric_columns(&self) -> Vec<usize> {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, ty)| matches!(ty, ColumnType::Int | ColumnType::Float))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Values of one column parsed as f64, skipping cells that do not parse.
    pub fn numeric_values(&self, column: usize) -> Vec<f64> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column))
            .filter_map(|cell| cell.trim().parse::<f64>().ok())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: DataTable,
    pub strategy: DecodeStrategy,
}

/// Encoding-resilient loader for delimited-text blobs of unknown origin.
///
/// Strategy order: statistical detection (when enabled), then the fixed
/// `ENCODING_LADDER`, then a legacy-spreadsheet parse. The source buffer is
/// never modified. Failure aggregates every attempt's reason.
pub struct DatasetLoader {
    detect: bool,
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self { detect: true }
    }

    /// Loader that skips statistical detection and goes straight to the
    /// ladder, the analogue of the detector being unavailable.
    pub fn without_detection() -> Self {
        Self { detect: false }
    }

    pub fn load(&self, bytes: &[u8]) -> Result<LoadedTable, VaultError> {
        let mut attempts = Vec::new();

        if self.detect {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            let guess = detector.guess(None, true);
            match guess.decode_without_bom_handling_and_without_replacement(bytes) {
                Some(text) => match parse_delimited(&text) {
                    Ok(table) => {
                        return Ok(LoadedTable {
                            table,
                            strategy: DecodeStrategy::Detected(guess.name().to_string()),
                        });
                    }
                    Err(reason) => attempts.push(format!("detected {}: {reason}", guess.name())),
                },
                None => attempts.push(format!(
                    "detected {}: malformed byte sequence",
                    guess.name()
                )),
            }
        }

        for &encoding in ENCODING_LADDER {
            match encoding.decode(bytes) {
                Some(text) => match parse_delimited(&text) {
                    Ok(table) => {
                        return Ok(LoadedTable {
                            table,
                            strategy: DecodeStrategy::Fallback(encoding),
                        });
                    }
                    Err(reason) => attempts.push(format!("{}: {reason}", encoding.label())),
                },
                None => attempts.push(format!(
                    "{}: malformed byte sequence for this encoding",
                    encoding.label()
                )),
            }
        }

        match parse_spreadsheet(bytes) {
            Ok(table) => Ok(LoadedTable {
                table,
                strategy: DecodeStrategy::Spreadsheet,
            }),
            Err(reason) => {
                attempts.push(format!("spreadsheet: {reason}"));
                Err(VaultError::DecodeExhausted { attempts })
            }
        }
    }
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse decoded text as header-first delimited data. Rows with more fields
/// than the header are skipped as malformed; rows with fewer are padded with
/// empty cells. Empty input yields a zero-row table.
fn parse_delimited(text: &str) -> Result<DataTable, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|err| err.to_string())?
        .iter()
        .map(|field| field.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let Ok(record) = record else {
            // malformed line, skip it rather than failing the whole parse
            continue;
        };
        if record.len() > columns.len() {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(|field| field.to_string()).collect();
        row.resize(columns.len(), String::new());
        rows.push(row);
    }

    let types = infer_types(&columns, &rows);
    Ok(DataTable {
        columns,
        types,
        rows,
    })
}

/// Last-resort parse of a legacy binary spreadsheet; the first worksheet's
/// first row becomes the header.
fn parse_spreadsheet(bytes: &[u8]) -> Result<DataTable, String> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor).map_err(|err| err.to_string())?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| "no sheets in workbook".to_string())?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|err| err.to_string())?;

    let mut cells = range.rows();
    let columns: Vec<String> = match cells.next() {
        Some(header) => header.iter().map(|cell| cell.to_string()).collect(),
        None => Vec::new(),
    };

    let rows: Vec<Vec<String>> = cells
        .map(|row| {
            let mut cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
            cells.resize(columns.len(), String::new());
            cells
        })
        .collect();

    let types = infer_types(&columns, &rows);
    Ok(DataTable {
        columns,
        types,
        rows,
    })
}

fn infer_types(columns: &[String], rows: &[Vec<String>]) -> Vec<ColumnType> {
    (0..columns.len())
        .map(|idx| infer_column(rows.iter().filter_map(|row| row.get(idx))))
        .collect()
}

fn infer_column<'a>(values: impl Iterator<Item = &'a String>) -> ColumnType {
    let mut seen = false;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;

    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        seen = true;
        all_int &= value.parse::<i64>().is_ok();
        all_float &= value.parse::<f64>().is_ok();
        all_bool &= matches!(value.to_ascii_lowercase().as_str(), "true" | "false");
        if !all_int && !all_float && !all_bool {
            return ColumnType::Text;
        }
    }

    if !seen {
        ColumnType::Text
    } else if all_int {
        ColumnType::Int
    } else if all_float {
        ColumnType::Float
    } else if all_bool {
        ColumnType::Bool
    } else {
        ColumnType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_order_is_fixed() {
        assert_eq!(
            ENCODING_LADDER,
            &[
                TextEncoding::Utf8,
                TextEncoding::Windows1252,
                TextEncoding::Windows1251,
                TextEncoding::Utf16Le,
                TextEncoding::Ascii,
            ]
        );
    }

    #[test]
    fn windows_rungs_reject_undefined_code_page_bytes() {
        assert!(TextEncoding::Windows1252.decode(&[0x81]).is_none());
        assert!(TextEncoding::Windows1252.decode(&[0xE9]).is_some());
        assert!(TextEncoding::Windows1251.decode(&[0x98]).is_none());
        assert!(TextEncoding::Windows1251.decode(&[0xE9]).is_some());
    }

    #[test]
    fn ascii_rung_rejects_high_bytes() {
        assert!(TextEncoding::Ascii.decode(b"plain,text\n1,2\n").is_some());
        assert!(TextEncoding::Ascii.decode(b"caf\xe9").is_none());
    }

    #[test]
    fn short_rows_are_padded_long_rows_skipped() {
        let table = parse_delimited("a,b,c\n1,2,3\n4,5\n6,7,8,9\n").unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[1], vec!["4", "5", ""]);
    }

    #[test]
    fn column_type_inference() {
        let table = parse_delimited("id,price,flag,label\n1,1.5,true,x\n2,2,false,y\n").unwrap();
        assert_eq!(
            table.types,
            vec![
                ColumnType::Int,
                ColumnType::Float,
                ColumnType::Bool,
                ColumnType::Text
            ]
        );
        assert_eq!(table.numeric_columns(), vec![0, 1]);
    }

    #[test]
    fn numeric_values_skip_blanks() {
        let table = parse_delimited("v\n1\n\n2.5\nnope\n").unwrap();
        assert_eq!(table.numeric_values(0), vec![1.0, 2.5]);
    }
}
