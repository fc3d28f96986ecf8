use comfy_table::{Cell, Table};

use crate::api::{Backend, HttpBackend};
use crate::error::Result;
use crate::settings::load_settings;

pub fn list() -> Result<()> {
    let backend = HttpBackend::from_settings(&load_settings())?;
    print_accounts(&backend)
}

fn print_accounts(backend: &dyn Backend) -> Result<()> {
    let accounts = backend.list_bank_accounts()?;
    if accounts.is_empty() {
        println!("No bank accounts found.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Currency", "Institution"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.currency.unwrap_or_default()),
            Cell::new(account.institution.unwrap_or_default()),
        ]);
    }
    println!("Bank accounts\n{table}");
    Ok(())
}
