use std::path::Path;

use colored::Colorize;

use crate::api::{Backend, HttpBackend};
use crate::error::{Result, TallyError};
use crate::mapping::parse_override;
use crate::models::{BankAccount, DuplicateKey};
use crate::settings::load_settings;
use crate::workflow::{ImportWorkflow, SelectedFile, Step, WorkflowOptions};

pub struct ImportArgs<'a> {
    pub file: &'a str,
    pub account: &'a str,
    pub overrides: &'a [String],
    pub no_skip_duplicates: bool,
    pub duplicate_key: Option<DuplicateKey>,
}

pub fn run(args: ImportArgs) -> Result<()> {
    let settings = load_settings();
    let backend = HttpBackend::from_settings(&settings)?;
    run_with(&backend, WorkflowOptions::from(&settings), args)
}

/// Drives the full workflow without a terminal UI.
pub fn run_with(backend: &dyn Backend, options: WorkflowOptions, args: ImportArgs) -> Result<()> {
    let account = find_account(&backend.list_bank_accounts()?, args.account)?;
    let mut workflow = ImportWorkflow::new(options);

    workflow.select_file(SelectedFile::from_path(Path::new(args.file))?)?;
    workflow.select_account(account)?;
    workflow.load_preview()?;
    for spec in args.overrides {
        let (field, column) = parse_override(spec)?;
        workflow.set_column(field, column)?;
    }
    if let Some(batch) = workflow.preview_records() {
        println!(
            "{} transactions found, {} rows will be rejected",
            batch.records.len(),
            batch.errors.len()
        );
    }

    workflow.proceed_to_confirm()?;
    if args.no_skip_duplicates {
        workflow.set_skip_duplicates(false)?;
    }
    if let Some(key) = args.duplicate_key {
        workflow.set_duplicate_key(key)?;
    }
    workflow.submit(backend)?;

    let Step::Result(done) = workflow.step() else {
        return Err(TallyError::Other("Import did not complete".to_string()));
    };
    let (imported, skipped, errors) = done.summary();
    println!(
        "{} imported, {} skipped (duplicates), {} rows with errors",
        imported.to_string().green(),
        skipped,
        if errors > 0 { errors.to_string().red() } else { errors.to_string().normal() }
    );
    for e in &done.result.errors {
        println!("  {e}");
    }
    Ok(())
}

/// Matches by id first, then by case-insensitive name.
fn find_account(accounts: &[BankAccount], wanted: &str) -> Result<BankAccount> {
    accounts
        .iter()
        .find(|a| a.id == wanted)
        .or_else(|| accounts.iter().find(|a| a.name.eq_ignore_ascii_case(wanted)))
        .cloned()
        .ok_or_else(|| TallyError::Other(format!("Unknown bank account: {wanted} (see `tally accounts`)")))
}
