use rust_decimal::Decimal;

use crate::error::{ParseError, RowError};
use crate::mapping::{ColumnMapping, TransactionField};
use crate::models::{BankTransactionRecord, MappedBatch};

use super::{parse_amount, parse_date};

/// A parsed CSV file: the header row plus every non-blank data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

/// One data row, padded to the header width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    /// 1-based line in the source file (the header is line 1).
    pub line: u64,
    pub values: Vec<String>,
}

impl CsvTable {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn value<'a>(&self, row: &'a CsvRow, column: &str) -> Option<&'a str> {
        let idx = self.column_index(column)?;
        row.values.get(idx).map(|s| s.as_str())
    }
}

/// Splits statement text into a header row and data rows. Quoted fields may
/// contain commas, doubled quotes and line breaks.
pub fn parse_csv(text: &str) -> Result<CsvTable, ParseError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rdr = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut records = rdr.records();
    let header = loop {
        match records.next() {
            None => return Err(ParseError::Empty),
            Some(result) => {
                let record = result?;
                if record.iter().any(|f| !f.is_empty()) {
                    break record;
                }
            }
        }
    };
    let headers = unique_headers(header.iter().map(strip_quotes));

    let mut rows = Vec::new();
    for result in records {
        let record = result?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() > headers.len() && record.iter().skip(headers.len()).any(|f| !f.is_empty()) {
            return Err(ParseError::RaggedRow {
                line,
                expected: headers.len(),
                found: record.len(),
            });
        }
        let mut values: Vec<String> = record
            .iter()
            .take(headers.len())
            .map(|f| strip_quotes(f).to_string())
            .collect();
        values.resize(headers.len(), String::new());
        rows.push(CsvRow { line, values });
    }

    if rows.is_empty() {
        return Err(ParseError::NoDataRows);
    }
    log::debug!("Parsed CSV: {} columns, {} rows", headers.len(), rows.len());
    Ok(CsvTable { headers, rows })
}

// The reader only honours a quote that opens the field, so `, "Deposit"`
// arrives as `"Deposit"` after trimming.
fn strip_quotes(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(field)
}

// Blank headers become "Column N"; repeats get " (2)", " (3)", ...
fn unique_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for (i, h) in raw.enumerate() {
        let base = if h.is_empty() {
            format!("Column {}", i + 1)
        } else {
            h.to_string()
        };
        let mut name = base.clone();
        let mut n = 2;
        while headers.contains(&name) {
            name = format!("{base} ({n})");
            n += 1;
        }
        headers.push(name);
    }
    headers
}

/// Options applied while turning rows into records.
#[derive(Debug, Clone)]
pub struct RecordOptions {
    pub currency: String,
    pub date_formats: Vec<String>,
}

/// Applies a confirmed mapping to every row. Rows without a usable date or
/// a non-zero amount become row errors; the rest of the batch continues.
pub fn map_csv_to_transactions(
    table: &CsvTable,
    mapping: &ColumnMapping,
    options: &RecordOptions,
) -> MappedBatch {
    let mut batch = MappedBatch::default();
    for row in &table.rows {
        match map_row(table, row, mapping, options) {
            Ok(record) => batch.records.push(record),
            Err(error) => {
                log::debug!("Skipping line {}: {error}", row.line);
                batch.errors.push(RowError::new(row.line, error));
            }
        }
    }
    batch
}

fn map_row(
    table: &CsvTable,
    row: &CsvRow,
    mapping: &ColumnMapping,
    options: &RecordOptions,
) -> Result<BankTransactionRecord, String> {
    let field = |f: TransactionField| {
        let column = mapping.get(f)?;
        table.value(row, column).filter(|v| !v.is_empty())
    };

    let raw_date = field(TransactionField::Date).ok_or("missing date")?;
    let date = parse_date(raw_date, &options.date_formats)
        .ok_or_else(|| format!("invalid date '{raw_date}'"))?;

    let amount = if mapping.amount_column.is_some() {
        let raw = field(TransactionField::Amount).ok_or("missing amount")?;
        parse_amount(raw).ok_or_else(|| format!("invalid amount '{raw}'"))?
    } else {
        let debit = split_amount(field(TransactionField::Debit), "debit")?;
        let credit = split_amount(field(TransactionField::Credit), "credit")?;
        if debit.is_none() && credit.is_none() {
            return Err("missing amount".to_string());
        }
        credit.unwrap_or_default().abs() - debit.unwrap_or_default().abs()
    };
    if amount.is_zero() {
        return Err("amount is zero".to_string());
    }

    Ok(BankTransactionRecord {
        date,
        description: field(TransactionField::Description).map(str::to_string),
        amount,
        reference: field(TransactionField::Reference).map(str::to_string),
        currency: options.currency.clone(),
    })
}

fn split_amount(raw: Option<&str>, label: &str) -> Result<Option<Decimal>, String> {
    match raw {
        None => Ok(None),
        Some(raw) => parse_amount(raw)
            .map(Some)
            .ok_or_else(|| format!("invalid {label} '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{auto_detect_mapping, validate_mapping};
    use crate::settings::default_date_formats;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn options() -> RecordOptions {
        RecordOptions {
            currency: "USD".into(),
            date_formats: default_date_formats(),
        }
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    const SAMPLE: &str = "date,amount,description\n2024-01-05,100.00,Deposit\n2024-01-06,-50.00,Withdrawal\n";

    #[test]
    fn test_sample_statement_maps_to_two_records() {
        let table = parse_csv(SAMPLE).unwrap();
        assert_eq!(table.headers, vec!["date", "amount", "description"]);
        let mapping = auto_detect_mapping(&table.headers);
        assert!(validate_mapping(&mapping).is_ok());

        let batch = map_csv_to_transactions(&table, &mapping, &options());
        assert!(batch.errors.is_empty());
        assert_eq!(batch.records.len(), 2);

        let first = &batch.records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(first.deposit(), Some(d("100.00")));
        assert_eq!(first.description.as_deref(), Some("Deposit"));
        assert_eq!(first.currency, "USD");

        let second = &batch.records[1];
        assert_eq!(second.date, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
        assert_eq!(second.withdrawal(), Some(d("50.00")));
    }

    #[test]
    fn test_header_only_is_parse_error() {
        assert_eq!(parse_csv("date,amount\n"), Err(ParseError::NoDataRows));
        assert_eq!(parse_csv("date,amount\n,\n\n"), Err(ParseError::NoDataRows));
    }

    #[test]
    fn test_empty_is_parse_error() {
        assert_eq!(parse_csv(""), Err(ParseError::Empty));
        assert_eq!(parse_csv("\n\n"), Err(ParseError::Empty));
    }

    #[test]
    fn test_rows_match_header_width_and_blank_rows_drop() {
        let text = "a,b,c\n1,2,3\n,,\n4,5\n\n  ,  ,  \n7,8,9,\n";
        let table = parse_csv(text).unwrap();
        assert_eq!(table.rows.len(), 3);
        for row in &table.rows {
            assert_eq!(row.values.len(), table.headers.len());
        }
        assert_eq!(table.rows[1].values, vec!["4", "5", ""]);
        assert_eq!(table.rows[0].line, 2);
        assert_eq!(table.rows[1].line, 4);
    }

    #[test]
    fn test_quoted_fields_keep_commas() {
        let text = "Date,Description,Amount\n01/31/2025,\"ACME, INC.\",\"2,000.00\"\n";
        let table = parse_csv(text).unwrap();
        let row = &table.rows[0];
        assert_eq!(table.value(row, "Description"), Some("ACME, INC."));
        assert_eq!(table.value(row, "Amount"), Some("2,000.00"));
    }

    #[test]
    fn test_quotes_after_separator_space_are_stripped() {
        let text = "\"date\", \"amount\", \"description\"\n\"2024-01-05\", \"100.00\", \"Deposit\"\n";
        let table = parse_csv(text).unwrap();
        assert_eq!(table.headers, vec!["date", "amount", "description"]);
        let row = &table.rows[0];
        assert_eq!(table.value(row, "description"), Some("Deposit"));

        let mapping = auto_detect_mapping(&table.headers);
        let batch = map_csv_to_transactions(&table, &mapping, &options());
        assert!(batch.errors.is_empty());
        assert_eq!(batch.records[0].amount, d("100.00"));
    }

    #[test]
    fn test_mixed_quoting_maps_cleanly() {
        let table = parse_csv("amount, \"date\"\n100.00, \"2024-01-05\"\n").unwrap();
        assert_eq!(table.headers, vec!["amount", "date"]);
        let mapping = auto_detect_mapping(&table.headers);
        let batch = map_csv_to_transactions(&table, &mapping, &options());
        assert!(batch.errors.is_empty());
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn test_ragged_row_is_reported() {
        let err = parse_csv("a,b\n1,2\n3,4,5\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::RaggedRow {
                line: 3,
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn test_headers_made_unique() {
        let table = parse_csv("Amount,,Amount\n1,2,3\n").unwrap();
        assert_eq!(table.headers, vec!["Amount", "Column 2", "Amount (2)"]);
    }

    #[test]
    fn test_parsing_is_idempotent() {
        assert_eq!(parse_csv(SAMPLE).unwrap(), parse_csv(SAMPLE).unwrap());
    }

    #[test]
    fn test_bom_is_ignored() {
        let table = parse_csv("\u{feff}date,amount\n2024-01-01,1\n").unwrap();
        assert_eq!(table.headers[0], "date");
    }

    #[test]
    fn test_invalid_rows_become_row_errors() {
        let text = "date,amount\n2024-01-05,abc\n,10\n2024-01-07,0.00\nnot-a-date,5\n2024-01-08,12.50\n";
        let table = parse_csv(text).unwrap();
        let mapping = auto_detect_mapping(&table.headers);
        let batch = map_csv_to_transactions(&table, &mapping, &options());
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].amount, d("12.50"));
        let rows: Vec<u64> = batch.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![2, 3, 4, 5]);
        assert_eq!(batch.errors[0].error, "invalid amount 'abc'");
        assert_eq!(batch.errors[1].error, "missing date");
        assert_eq!(batch.errors[2].error, "amount is zero");
        assert_eq!(batch.errors[3].error, "invalid date 'not-a-date'");
    }

    #[test]
    fn test_debit_credit_columns_fold_into_signed_amount() {
        let text = "Date,Details,Money Out,Money In,Ref\n\
                    03/01/2024,Coffee,4.50,,A1\n\
                    03/02/2024,Salary,,\"2,500.00\",A2\n\
                    03/03/2024,Nothing,,,A3\n";
        let table = parse_csv(text).unwrap();
        let mapping = auto_detect_mapping(&table.headers);
        assert!(validate_mapping(&mapping).is_ok());
        let batch = map_csv_to_transactions(&table, &mapping, &options());
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].amount, d("-4.50"));
        assert_eq!(batch.records[0].reference.as_deref(), Some("A1"));
        assert_eq!(batch.records[1].amount, d("2500.00"));
        assert_eq!(batch.errors, vec![RowError::new(4, "missing amount")]);
    }

    #[test]
    fn test_empty_optional_fields_are_none() {
        let table = parse_csv("date,amount,description\n2024-01-05,1,\n").unwrap();
        let mapping = auto_detect_mapping(&table.headers);
        let batch = map_csv_to_transactions(&table, &mapping, &options());
        assert_eq!(batch.records[0].description, None);
        assert_eq!(batch.records[0].reference, None);
    }
}
