use std::path::Path;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::error::{Result, TallyError};
use crate::importer::csv::parse_csv;
use crate::importer::decode_text;
use crate::mapping::auto_detect_contact_mapping;

pub fn map(file: &str) -> Result<()> {
    let path = Path::new(file);
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        return Err(TallyError::UnsupportedFile(file.to_string()));
    }
    let table = parse_csv(&decode_text(&std::fs::read(path)?))?;
    let detected = auto_detect_contact_mapping(&table.headers);

    let mut out = Table::new();
    out.set_header(vec!["Column", "Field"]);
    for header in &table.headers {
        let field = detected
            .iter()
            .find(|(_, col)| *col == header)
            .map(|(f, _)| f.key().to_string())
            .unwrap_or_else(|| "-".dimmed().to_string());
        out.add_row(vec![Cell::new(header), Cell::new(field)]);
    }
    println!("Contact mapping for {}\n{out}", file.bold());
    println!("{} of {} columns mapped, {} rows", detected.len(), table.headers.len(), table.rows.len());
    Ok(())
}
