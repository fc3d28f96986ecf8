use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};
use rust_decimal::Decimal;

use crate::error::Result;
use crate::fmt::{money, number};
use crate::importer::ofx::OfxStatement;
use crate::mapping::{ColumnMapping, TransactionField};
use crate::models::MappedBatch;
use crate::settings::load_settings;
use crate::workflow::{parse_statement, ParsedStatement, SelectedFile};

/// Rows printed before the table is cut off.
const MAX_ROWS: usize = 50;

pub fn run(file: &str, overrides: &[String]) -> Result<()> {
    let settings = load_settings();
    let selected = SelectedFile::from_path(Path::new(file))?;
    let mut parsed = parse_statement(&selected)?;
    if let ParsedStatement::Csv { table, mapping } = &mut parsed {
        for spec in overrides {
            mapping.apply_override(spec, &table.headers)?;
        }
    }

    println!("{} ({})", selected.name.bold(), selected.format.name());
    match &parsed {
        ParsedStatement::Csv { table, mapping } => {
            println!("{} columns, {} data rows", table.headers.len(), table.rows.len());
            print_mapping(mapping);
        }
        ParsedStatement::Ofx(stmt) => print_ofx_summary(stmt),
    }

    match parsed.validate() {
        Ok(()) => println!("{}", "Ready to import".green()),
        Err(e) => {
            for problem in &e.problems {
                println!("{} {problem}", "!".red().bold());
            }
        }
    }

    let batch = parsed.records(&settings.default_currency, &settings.date_formats);
    print_records(&batch);
    Ok(())
}

fn print_mapping(mapping: &ColumnMapping) {
    let mut table = Table::new();
    table.set_header(vec!["Field", "Column"]);
    for field in TransactionField::ALL {
        let column = match mapping.get(field) {
            Some(col) => col.to_string(),
            None => "-".dimmed().to_string(),
        };
        table.add_row(vec![Cell::new(field.label()), Cell::new(column)]);
    }
    println!("Column mapping\n{table}");
}

fn print_ofx_summary(stmt: &OfxStatement) {
    let dash = || "-".to_string();
    if let Some(version) = &stmt.version {
        println!("OFX version {version}");
    }
    println!(
        "Account {} ({}), currency {}",
        stmt.account_id.clone().unwrap_or_else(dash),
        stmt.account_type.clone().unwrap_or_else(dash),
        stmt.currency.clone().unwrap_or_else(dash)
    );
    if let (Some(start), Some(end)) = (stmt.start_date, stmt.end_date) {
        println!("Period {start} to {end}");
    }
    if let Some(bal) = stmt.ledger_balance {
        match stmt.ledger_balance_as_of {
            Some(as_of) => println!("Ledger balance {} as of {as_of}", number(bal)),
            None => println!("Ledger balance {}", number(bal)),
        }
    }
}

fn print_records(batch: &MappedBatch) {
    let mut table = Table::new();
    table.set_header(vec!["Date", "Description", "Deposit", "Withdrawal", "Reference"]);
    for r in batch.records.iter().take(MAX_ROWS) {
        table.add_row(vec![
            Cell::new(r.date.format("%Y-%m-%d")),
            Cell::new(r.description.clone().unwrap_or_default()),
            Cell::new(r.deposit().map(|d| number(d).green().to_string()).unwrap_or_default())
                .set_alignment(CellAlignment::Right),
            Cell::new(r.withdrawal().map(|w| number(w).red().to_string()).unwrap_or_default())
                .set_alignment(CellAlignment::Right),
            Cell::new(r.reference.clone().unwrap_or_default()),
        ]);
    }
    println!("{table}");
    if batch.records.len() > MAX_ROWS {
        println!("... {} more", batch.records.len() - MAX_ROWS);
    }
    let net: Decimal = batch.records.iter().map(|r| r.amount).sum();
    let currency = batch.records.first().map(|r| r.currency.as_str()).unwrap_or("");
    println!("{} transactions, net {}", batch.records.len(), money(net, currency).trim());

    if !batch.errors.is_empty() {
        println!("{}", format!("{} rows will be rejected:", batch.errors.len()).yellow());
        for e in &batch.errors {
            println!("  {e}");
        }
    }
}
