//! The four-step statement import: choose a file and account, preview and
//! map, confirm, see the result.
//!
//! Each [`Step`] variant owns exactly the data that exists in that step, so
//! reading an import result before submitting, or a mapping before a file
//! was parsed, does not type-check.

use std::path::Path;

use crate::api::{Backend, ImportRequest};
use crate::error::{Result, TallyError};
use crate::importer::csv::{map_csv_to_transactions, parse_csv, CsvTable, RecordOptions};
use crate::importer::ofx::{map_ofx_to_transactions, parse_ofx, validate_ofx_result, OfxStatement};
use crate::importer::decode_text;
use crate::mapping::{auto_detect_mapping, validate_mapping, ColumnMapping, TransactionField};
use crate::models::{BankAccount, DuplicateKey, ImportResult, MappedBatch, StatementFormat};
use crate::settings::Settings;

/// A statement file held in memory for the whole workflow, so a failed
/// submission can be retried without reading it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub format: StatementFormat,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let format = StatementFormat::from_path(Path::new(&name))
            .ok_or_else(|| TallyError::UnsupportedFile(name.clone()))?;
        Ok(Self { name, bytes, format })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        StatementFormat::from_path(path).ok_or_else(|| TallyError::UnsupportedFile(name.clone()))?;
        let bytes = std::fs::read(path)?;
        Self::new(name, bytes)
    }
}

/// Workflow defaults taken from settings.
#[derive(Debug, Clone)]
pub struct WorkflowOptions {
    pub default_currency: String,
    pub date_formats: Vec<String>,
    pub skip_duplicates: bool,
    pub duplicate_key: DuplicateKey,
}

impl From<&Settings> for WorkflowOptions {
    fn from(s: &Settings) -> Self {
        Self {
            default_currency: s.default_currency.clone(),
            date_formats: s.date_formats.clone(),
            skip_duplicates: s.skip_duplicates,
            duplicate_key: s.duplicate_key,
        }
    }
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Parsed content of the chosen file.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedStatement {
    Csv { table: CsvTable, mapping: ColumnMapping },
    Ofx(OfxStatement),
}

impl ParsedStatement {
    pub fn validate(&self) -> std::result::Result<(), crate::error::ValidationError> {
        match self {
            Self::Csv { mapping, .. } => validate_mapping(mapping),
            Self::Ofx(stmt) => validate_ofx_result(stmt),
        }
    }

    /// Records as they would be imported, with rows that would be rejected.
    /// `currency` applies to CSV rows and to OFX files without `<CURDEF>`.
    pub fn records(&self, currency: &str, date_formats: &[String]) -> MappedBatch {
        match self {
            Self::Csv { table, mapping } => {
                let opts = RecordOptions {
                    currency: currency.to_string(),
                    date_formats: date_formats.to_vec(),
                };
                map_csv_to_transactions(table, mapping, &opts)
            }
            Self::Ofx(stmt) => map_ofx_to_transactions(stmt, currency),
        }
    }

    fn mapping(&self) -> Option<&ColumnMapping> {
        match self {
            Self::Csv { mapping, .. } => Some(mapping),
            Self::Ofx(_) => None,
        }
    }
}

pub fn parse_statement(file: &SelectedFile) -> Result<ParsedStatement> {
    let text = decode_text(&file.bytes);
    match file.format {
        StatementFormat::Csv => {
            let table = parse_csv(&text)?;
            let mapping = auto_detect_mapping(&table.headers);
            Ok(ParsedStatement::Csv { table, mapping })
        }
        StatementFormat::Ofx => Ok(ParsedStatement::Ofx(parse_ofx(&text)?)),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectFileState {
    pub file: Option<SelectedFile>,
    pub account: Option<BankAccount>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PreviewState {
    pub file: SelectedFile,
    pub account: BankAccount,
    pub parsed: ParsedStatement,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfirmState {
    pub file: SelectedFile,
    pub account: BankAccount,
    pub parsed: ParsedStatement,
    pub skip_duplicates: bool,
    pub duplicate_key: DuplicateKey,
    pub error: Option<String>,
}

impl ConfirmState {
    pub fn request(&self) -> ImportRequest {
        ImportRequest {
            file_name: self.file.name.clone(),
            file_bytes: self.file.bytes.clone(),
            account: self.account.id.clone(),
            format: self.file.format,
            skip_duplicates: self.skip_duplicates,
            duplicate_key: self.duplicate_key,
            column_mapping: self.parsed.mapping().cloned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultState {
    pub file_name: String,
    pub account: BankAccount,
    pub result: ImportResult,
}

impl ResultState {
    /// (imported, skipped, row errors)
    pub fn summary(&self) -> (u64, u64, usize) {
        (
            self.result.imported_count,
            self.result.skipped_count,
            self.result.errors.len(),
        )
    }

    pub fn can_view_transactions(&self) -> bool {
        self.result.imported_count > 0
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    SelectFile(SelectFileState),
    Preview(PreviewState),
    Confirm(ConfirmState),
    Result(ResultState),
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SelectFile(_) => "SelectFile",
            Self::Preview(_) => "Preview",
            Self::Confirm(_) => "Confirm",
            Self::Result(_) => "Result",
        }
    }

    /// 1-based position for "Step n of 4" displays.
    pub fn number(&self) -> usize {
        match self {
            Self::SelectFile(_) => 1,
            Self::Preview(_) => 2,
            Self::Confirm(_) => 3,
            Self::Result(_) => 4,
        }
    }
}

impl Default for Step {
    fn default() -> Self {
        Step::SelectFile(SelectFileState::default())
    }
}

pub struct ImportWorkflow {
    step: Step,
    options: WorkflowOptions,
}

impl ImportWorkflow {
    pub fn new(options: WorkflowOptions) -> Self {
        Self {
            step: Step::default(),
            options,
        }
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    fn wrong_step(&self, action: &'static str) -> TallyError {
        TallyError::WrongStep {
            action,
            step: self.step.name(),
        }
    }

    // -- SelectFile ---------------------------------------------------------

    pub fn select_file(&mut self, file: SelectedFile) -> Result<()> {
        match &mut self.step {
            Step::SelectFile(state) => {
                log::debug!("Selected {} ({})", file.name, file.format.name());
                state.file = Some(file);
                state.error = None;
                Ok(())
            }
            _ => Err(self.wrong_step("choose a file")),
        }
    }

    pub fn select_account(&mut self, account: BankAccount) -> Result<()> {
        match &mut self.step {
            Step::SelectFile(state) => {
                state.account = Some(account);
                state.error = None;
                Ok(())
            }
            _ => Err(self.wrong_step("choose an account")),
        }
    }

    /// SelectFile -> Preview. A parse failure discards the file and keeps the
    /// workflow on SelectFile with the error recorded.
    pub fn load_preview(&mut self) -> Result<()> {
        let Step::SelectFile(state) = &mut self.step else {
            return Err(self.wrong_step("load a preview"));
        };
        if state.file.is_none() {
            return Err(TallyError::MissingSelection("file"));
        }
        let Some(account) = state.account.clone() else {
            return Err(TallyError::MissingSelection("destination account"));
        };
        let Some(file) = state.file.take() else {
            return Err(TallyError::MissingSelection("file"));
        };

        match parse_statement(&file) {
            Ok(parsed) => {
                log::info!("Previewing {} for account {}", file.name, account.name);
                self.step = Step::Preview(PreviewState {
                    file,
                    account,
                    parsed,
                    error: None,
                });
                Ok(())
            }
            Err(e) => {
                log::warn!("Could not parse {}: {e}", file.name);
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    // -- Preview ------------------------------------------------------------

    /// Points a field at a header column, or clears it with `None`.
    pub fn set_column(&mut self, field: TransactionField, column: Option<String>) -> Result<()> {
        let Step::Preview(state) = &mut self.step else {
            return Err(self.wrong_step("edit the column mapping"));
        };
        let ParsedStatement::Csv { table, mapping } = &mut state.parsed else {
            return Err(TallyError::Other(
                "Column mapping only applies to CSV files".to_string(),
            ));
        };
        if let Some(col) = &column {
            if table.column_index(col).is_none() {
                return Err(TallyError::UnknownColumn(col.clone()));
            }
        }
        mapping.set(field, column);
        state.error = None;
        Ok(())
    }

    pub fn preview_records(&self) -> Option<MappedBatch> {
        let (parsed, account) = match &self.step {
            Step::Preview(state) => (&state.parsed, &state.account),
            Step::Confirm(state) => (&state.parsed, &state.account),
            _ => return None,
        };
        let currency = account
            .currency
            .as_deref()
            .unwrap_or(&self.options.default_currency);
        Some(parsed.records(currency, &self.options.date_formats))
    }

    /// Preview -> Confirm, once the mapping or statement validates.
    pub fn proceed_to_confirm(&mut self) -> Result<()> {
        let Step::Preview(state) = &mut self.step else {
            return Err(self.wrong_step("continue to confirmation"));
        };
        if let Err(e) = state.parsed.validate() {
            state.error = Some(e.to_string());
            return Err(e.into());
        }
        let Step::Preview(state) = std::mem::take(&mut self.step) else {
            return Err(self.wrong_step("continue to confirmation"));
        };
        self.step = Step::Confirm(ConfirmState {
            file: state.file,
            account: state.account,
            parsed: state.parsed,
            skip_duplicates: self.options.skip_duplicates,
            duplicate_key: self.options.duplicate_key,
            error: None,
        });
        Ok(())
    }

    // -- Confirm ------------------------------------------------------------

    pub fn set_skip_duplicates(&mut self, skip: bool) -> Result<()> {
        match &mut self.step {
            Step::Confirm(state) => {
                state.skip_duplicates = skip;
                Ok(())
            }
            _ => Err(self.wrong_step("change duplicate handling")),
        }
    }

    pub fn set_duplicate_key(&mut self, key: DuplicateKey) -> Result<()> {
        match &mut self.step {
            Step::Confirm(state) => {
                state.duplicate_key = key;
                Ok(())
            }
            _ => Err(self.wrong_step("change the duplicate key")),
        }
    }

    /// Confirm -> Result. On failure the workflow stays on Confirm with the
    /// error recorded and the file still in memory for a retry.
    pub fn submit(&mut self, backend: &dyn Backend) -> Result<&ImportResult> {
        let Step::Confirm(state) = &mut self.step else {
            return Err(self.wrong_step("submit the import"));
        };
        let request = state.request();
        match backend.import_statement(&request) {
            Ok(result) => {
                self.step = Step::Result(ResultState {
                    file_name: state.file.name.clone(),
                    account: state.account.clone(),
                    result,
                });
                match &self.step {
                    Step::Result(done) => Ok(&done.result),
                    _ => Err(self.wrong_step("read the import result")),
                }
            }
            Err(e) => {
                log::warn!("Import of {} failed: {e}", state.file.name);
                state.error = Some(e.to_string());
                Err(e.into())
            }
        }
    }

    // -- Result / cancel ----------------------------------------------------

    /// Result -> SelectFile with everything cleared.
    pub fn import_another(&mut self) -> Result<()> {
        match self.step {
            Step::Result(_) => {
                self.step = Step::default();
                Ok(())
            }
            _ => Err(self.wrong_step("start another import")),
        }
    }

    /// Abandons the current import from any step.
    pub fn start_over(&mut self) {
        log::debug!("Start over from {}", self.step.name());
        self.step = Step::default();
    }
}
