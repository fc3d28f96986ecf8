use std::path::PathBuf;

use crossterm::event::KeyCode;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::api::Backend;
use crate::fmt::number;
use crate::importer::ofx::OfxStatement;
use crate::mapping::{ColumnMapping, TransactionField};
use crate::models::{BankAccount, MappedBatch};
use crate::tui::{money_span, wrap_text, Screen, ScreenAction, ERROR_STYLE, FOOTER_STYLE, HEADER_STYLE, SELECTED_STYLE};
use crate::workflow::{
    ConfirmState, ImportWorkflow, ParsedStatement, PreviewState, ResultState, SelectFileState,
    SelectedFile, Step,
};

const FIELD_FILE: usize = 0;
const FIELD_ACCOUNT: usize = 1;

pub struct ImportScreen {
    workflow: ImportWorkflow,
    backend: Box<dyn Backend>,
    accounts: Vec<BankAccount>,
    accounts_error: Option<String>,
    select_error: Option<String>,
    account_idx: usize,
    file_path: String,
    focused: usize,
    mapping_idx: usize,
    scroll: usize,
    /// Set when the user leaves the result step to view the imported
    /// transactions.
    view_url: Option<String>,
}

impl ImportScreen {
    pub fn new(workflow: ImportWorkflow, backend: Box<dyn Backend>) -> Self {
        let (accounts, accounts_error) = match backend.list_bank_accounts() {
            Ok(accounts) => (accounts, None),
            Err(e) => {
                log::warn!("Could not load bank accounts: {e}");
                (Vec::new(), Some(e.to_string()))
            }
        };
        Self {
            workflow,
            backend,
            accounts,
            accounts_error,
            select_error: None,
            account_idx: 0,
            file_path: String::new(),
            focused: FIELD_FILE,
            mapping_idx: 0,
            scroll: 0,
            view_url: None,
        }
    }

    fn draw_select(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect, state: &SelectFileState) {
        let mut lines = vec![Line::from("")];

        if self.accounts.is_empty() {
            let msg = match &self.accounts_error {
                Some(e) => format!("   Could not load bank accounts: {e}"),
                None => "   No bank accounts found. Create one in Books first.".to_string(),
            };
            lines.push(Line::from(Span::styled(msg, ERROR_STYLE)));
        } else {
            let is_focused = self.focused == FIELD_FILE;
            let cursor = if is_focused { "_" } else { "" };
            lines.push(Line::from(vec![
                Span::styled("   Statement file   ", label_style(is_focused)),
                Span::styled(format!("{}{}", self.file_path, cursor), value_style(is_focused)),
            ]));

            let account = &self.accounts[self.account_idx];
            let is_focused = self.focused == FIELD_ACCOUNT;
            let arrows = if is_focused { ("< ", " >") } else { ("  ", "  ") };
            let mut label = account.name.clone();
            if let Some(inst) = &account.institution {
                label.push_str(&format!(" ({inst})"));
            }
            lines.push(Line::from(vec![
                Span::styled("   Account        ", label_style(is_focused)),
                Span::styled(format!("{}{}{}", arrows.0, label, arrows.1), value_style(is_focused)),
            ]));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "   Accepted: .csv, .ofx, .qfx",
                FOOTER_STYLE,
            )));
        }

        if let Some(err) = &state.error {
            push_error(&mut lines, err, content_area.width);
        }

        frame.render_widget(Paragraph::new(lines), content_area);
        frame.render_widget(
            Paragraph::new(" Tab=fields  Left/Right=account  Enter=preview  Esc=close").style(FOOTER_STYLE),
            hints_area,
        );
    }

    fn draw_preview(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect, state: &PreviewState) {
        let mut lines = vec![
            Line::from(""),
            Line::from(format!(
                "   {} ({}) into {}",
                state.file.name,
                state.file.format.name(),
                state.account.name
            )),
            Line::from(""),
        ];

        match &state.parsed {
            ParsedStatement::Csv { table, mapping } => {
                lines.push(Line::from(Span::styled(
                    format!("   Column mapping ({} columns)", table.headers.len()),
                    Style::default().add_modifier(Modifier::BOLD),
                )));
                lines.extend(self.mapping_lines(mapping));
            }
            ParsedStatement::Ofx(stmt) => lines.extend(ofx_summary_lines(stmt)),
        }

        if let Err(e) = state.parsed.validate() {
            lines.push(Line::from(""));
            for problem in &e.problems {
                lines.push(Line::from(Span::styled(format!("   ! {problem}"), ERROR_STYLE)));
            }
        }

        lines.push(Line::from(""));
        if let Some(batch) = self.workflow.preview_records() {
            let used = lines.len() + 3;
            let room = (content_area.height as usize).saturating_sub(used);
            lines.extend(record_lines(&batch, self.scroll, room));
        }

        if let Some(err) = &state.error {
            push_error(&mut lines, err, content_area.width);
        }

        frame.render_widget(Paragraph::new(lines), content_area);
        let hints = if matches!(state.parsed, ParsedStatement::Csv { .. }) {
            " Up/Down=field  Left/Right=column  PgUp/PgDn=scroll  Enter=continue  Esc=start over"
        } else {
            " PgUp/PgDn=scroll  Enter=continue  Esc=start over"
        };
        frame.render_widget(Paragraph::new(hints).style(FOOTER_STYLE), hints_area);
    }

    fn mapping_lines(&self, mapping: &ColumnMapping) -> Vec<Line<'static>> {
        TransactionField::ALL
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let column = mapping.get(*field).unwrap_or("(not mapped)").to_string();
                let selected = i == self.mapping_idx;
                let style = if selected { SELECTED_STYLE } else { Style::default() };
                let arrows = if selected { ("< ", " >") } else { ("  ", "  ") };
                Line::from(vec![
                    Span::styled(format!("   {:<14}", field.label()), style),
                    Span::styled(format!("{}{}{}", arrows.0, column, arrows.1), style),
                ])
            })
            .collect()
    }

    fn draw_confirm(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect, state: &ConfirmState) {
        let mut lines = vec![
            Line::from(""),
            Line::from(format!("   File             {}", state.file.name)),
            Line::from(format!("   Format           {}", state.file.format.name())),
            Line::from(format!("   Account          {}", state.account.name)),
        ];
        if let Some(batch) = self.workflow.preview_records() {
            let total: rust_decimal::Decimal = batch.records.iter().map(|r| r.amount).sum();
            lines.push(Line::from(format!("   Transactions     {}", batch.records.len())));
            lines.push(Line::from(vec![Span::raw("   Net amount       "), money_span(total)]));
            if !batch.errors.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("   Rows with errors {}", batch.errors.len()),
                    Style::default().fg(Color::Yellow),
                )));
            }
        }
        lines.push(Line::from(""));
        let skip = if state.skip_duplicates { "yes" } else { "no" };
        lines.push(Line::from(format!("   Skip duplicates  {skip}")));
        lines.push(Line::from(format!("   Duplicate key    {}", state.duplicate_key.label())));

        if let Some(err) = &state.error {
            push_error(&mut lines, err, content_area.width);
            lines.push(Line::from(Span::styled("   Press Enter to try again.", FOOTER_STYLE)));
        }

        frame.render_widget(Paragraph::new(lines), content_area);
        frame.render_widget(
            Paragraph::new(" s=toggle skip duplicates  k=duplicate key  Enter=import  Esc=start over")
                .style(FOOTER_STYLE),
            hints_area,
        );
    }

    fn draw_result(&self, frame: &mut Frame, content_area: Rect, hints_area: Rect, state: &ResultState) {
        let (imported, skipped, errors) = state.summary();
        let mut lines = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("   {} into {}", state.file_name, state.account.name),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("   {imported} imported"),
                Style::default().fg(Color::Green),
            )),
            Line::from(format!("   {skipped} skipped (duplicates)")),
        ];
        let error_style = if errors > 0 { ERROR_STYLE } else { Style::default() };
        lines.push(Line::from(Span::styled(format!("   {errors} rows with errors"), error_style)));
        for row in state.result.errors.iter().take(content_area.height.saturating_sub(8) as usize) {
            lines.push(Line::from(Span::styled(format!("     {row}"), ERROR_STYLE)));
        }

        frame.render_widget(Paragraph::new(lines), content_area);
        let hints = if self.transactions_url(state).is_some() {
            " v=view transactions  n=import another  Esc=close"
        } else {
            " n=import another  Esc=close"
        };
        frame.render_widget(Paragraph::new(hints).style(FOOTER_STYLE), hints_area);
    }

    // -- Keys ---------------------------------------------------------------

    fn handle_select_key(&mut self, code: KeyCode) -> ScreenAction {
        match code {
            KeyCode::Esc => return ScreenAction::Close,
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Down | KeyCode::Up => {
                if !self.accounts.is_empty() {
                    self.focused = 1 - self.focused;
                }
            }
            KeyCode::Left if self.focused == FIELD_ACCOUNT && !self.accounts.is_empty() => {
                self.account_idx = if self.account_idx == 0 {
                    self.accounts.len() - 1
                } else {
                    self.account_idx - 1
                };
            }
            KeyCode::Right if self.focused == FIELD_ACCOUNT && !self.accounts.is_empty() => {
                self.account_idx = (self.account_idx + 1) % self.accounts.len();
            }
            KeyCode::Char(c) if self.focused == FIELD_FILE => self.file_path.push(c),
            KeyCode::Backspace if self.focused == FIELD_FILE => {
                self.file_path.pop();
            }
            KeyCode::Enter => self.load_preview(),
            _ => {}
        }
        ScreenAction::Continue
    }

    fn load_preview(&mut self) {
        let Some(account) = self.accounts.get(self.account_idx).cloned() else {
            self.set_select_error("Choose a destination account first".to_string());
            return;
        };
        let path = self.file_path.trim();
        if path.is_empty() {
            self.set_select_error("Statement file is required".to_string());
            return;
        }
        let path = PathBuf::from(shellexpand(path));
        let file = match SelectedFile::from_path(&path) {
            Ok(file) => file,
            Err(e) => {
                self.set_select_error(e.to_string());
                return;
            }
        };
        let loaded = self
            .workflow
            .select_file(file)
            .and_then(|_| self.workflow.select_account(account))
            .and_then(|_| self.workflow.load_preview());
        // A parse failure is recorded on the SelectFile state by the workflow.
        if loaded.is_ok() {
            self.mapping_idx = 0;
            self.scroll = 0;
        }
    }

    fn set_select_error(&mut self, message: String) {
        self.select_error = Some(message);
    }

    fn handle_preview_key(&mut self, code: KeyCode) -> ScreenAction {
        match code {
            KeyCode::Esc => self.workflow.start_over(),
            KeyCode::Up => self.mapping_idx = self.mapping_idx.saturating_sub(1),
            KeyCode::Down => {
                self.mapping_idx = (self.mapping_idx + 1).min(TransactionField::ALL.len() - 1);
            }
            KeyCode::Left => self.cycle_column(false),
            KeyCode::Right => self.cycle_column(true),
            KeyCode::PageDown => self.scroll += 10,
            KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(10),
            KeyCode::Enter => {
                // Validation problems stay on screen; the step does not change.
                let _ = self.workflow.proceed_to_confirm();
            }
            _ => {}
        }
        ScreenAction::Continue
    }

    /// Steps the selected field through "(not mapped)" and every header.
    fn cycle_column(&mut self, forward: bool) {
        let Step::Preview(PreviewState {
            parsed: ParsedStatement::Csv { table, mapping },
            ..
        }) = self.workflow.step()
        else {
            return;
        };
        let field = TransactionField::ALL[self.mapping_idx];
        let mut options: Vec<Option<String>> = vec![None];
        options.extend(table.headers.iter().cloned().map(Some));
        let current = mapping.get(field).map(str::to_string);
        let pos = options.iter().position(|o| *o == current).unwrap_or(0);
        let next = if forward {
            (pos + 1) % options.len()
        } else {
            (pos + options.len() - 1) % options.len()
        };
        let column = options.swap_remove(next);
        if let Err(e) = self.workflow.set_column(field, column) {
            log::warn!("Could not change mapping: {e}");
        }
    }

    fn handle_confirm_key(&mut self, code: KeyCode) -> ScreenAction {
        let Step::Confirm(state) = self.workflow.step() else {
            return ScreenAction::Continue;
        };
        let (skip, key) = (state.skip_duplicates, state.duplicate_key);
        let outcome = match code {
            KeyCode::Esc => {
                self.workflow.start_over();
                Ok(())
            }
            KeyCode::Char('s') => self.workflow.set_skip_duplicates(!skip),
            KeyCode::Char('k') => self.workflow.set_duplicate_key(key.next()),
            KeyCode::Enter => self.workflow.submit(self.backend.as_ref()).map(|_| ()),
            _ => Ok(()),
        };
        if let Err(e) = outcome {
            log::debug!("Confirm step: {e}");
        }
        ScreenAction::Continue
    }

    /// Only offered once something was actually imported.
    fn transactions_url(&self, state: &ResultState) -> Option<String> {
        if !state.can_view_transactions() {
            return None;
        }
        self.backend.transactions_url(&state.account.id)
    }

    fn handle_result_key(&mut self, code: KeyCode) -> ScreenAction {
        match code {
            KeyCode::Esc | KeyCode::Char('q') => ScreenAction::Close,
            KeyCode::Char('v') => {
                let Step::Result(state) = self.workflow.step() else {
                    return ScreenAction::Continue;
                };
                match self.transactions_url(state) {
                    Some(url) => {
                        log::info!("Viewing transactions at {url}");
                        self.view_url = Some(url);
                        ScreenAction::Close
                    }
                    None => ScreenAction::Continue,
                }
            }
            KeyCode::Char('n') => {
                if self.workflow.import_another().is_ok() {
                    self.file_path.clear();
                    self.focused = FIELD_FILE;
                }
                ScreenAction::Continue
            }
            _ => ScreenAction::Continue,
        }
    }
}

impl Screen for ImportScreen {
    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let border_style = Style::default().fg(Color::DarkGray);

        let [header_area, sep, content_area, hints_area] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Fill(1),
            Constraint::Length(1),
        ])
        .areas(area);

        let step = self.workflow.step();
        let title = match step {
            Step::SelectFile(_) => "Choose a statement",
            Step::Preview(_) => "Preview and map columns",
            Step::Confirm(_) => "Confirm import",
            Step::Result(_) => "Import result",
        };
        frame.render_widget(
            Paragraph::new(format!(" Import bank statement  ·  Step {} of 4: {title}", step.number()))
                .style(HEADER_STYLE),
            header_area,
        );

        let sep_line = "\u{2501}".repeat(area.width as usize);
        frame.render_widget(Paragraph::new(sep_line.as_str()).style(border_style), sep);

        match step {
            Step::SelectFile(state) => {
                let mut state = state.clone();
                if state.error.is_none() {
                    state.error = self.select_error.clone();
                }
                self.draw_select(frame, content_area, hints_area, &state)
            }
            Step::Preview(state) => self.draw_preview(frame, content_area, hints_area, state),
            Step::Confirm(state) => self.draw_confirm(frame, content_area, hints_area, state),
            Step::Result(state) => self.draw_result(frame, content_area, hints_area, state),
        }
    }

    fn handle_key(&mut self, code: KeyCode) -> ScreenAction {
        if !matches!(code, KeyCode::Enter) {
            self.select_error = None;
        }
        match self.workflow.step() {
            Step::SelectFile(_) => self.handle_select_key(code),
            Step::Preview(_) => self.handle_preview_key(code),
            Step::Confirm(_) => self.handle_confirm_key(code),
            Step::Result(_) => self.handle_result_key(code),
        }
    }
}

fn label_style(focused: bool) -> Style {
    if focused {
        Style::default().add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    }
}

fn value_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

fn push_error(lines: &mut Vec<Line<'static>>, message: &str, width: u16) {
    lines.push(Line::from(""));
    let (wrapped, _) = wrap_text(message, (width as usize).saturating_sub(6));
    for line in wrapped.lines() {
        lines.push(Line::from(Span::styled(format!("   {line}"), ERROR_STYLE)));
    }
}

fn ofx_summary_lines(stmt: &OfxStatement) -> Vec<Line<'static>> {
    let dash = || "-".to_string();
    let mut lines = vec![
        Line::from(format!(
            "   Account          {}",
            stmt.account_id.clone().unwrap_or_else(dash)
        )),
        Line::from(format!(
            "   Currency         {}",
            stmt.currency.clone().unwrap_or_else(dash)
        )),
    ];
    if let (Some(start), Some(end)) = (stmt.start_date, stmt.end_date) {
        lines.push(Line::from(format!("   Period           {start} to {end}")));
    }
    if let Some(bal) = stmt.ledger_balance {
        lines.push(Line::from(format!("   Ledger balance   {}", number(bal))));
    }
    lines.push(Line::from(format!(
        "   Transactions     {}",
        stmt.transactions.len()
    )));
    lines
}

fn record_lines(batch: &MappedBatch, scroll: usize, room: usize) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        format!(
            "   {:<12}{:<40}{:>14}  {}",
            "Date", "Description", "Amount", "Reference"
        ),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    let start = scroll.min(batch.records.len().saturating_sub(1));
    for r in batch.records.iter().skip(start).take(room.saturating_sub(2)) {
        let mut desc = r.description.clone().unwrap_or_default();
        if desc.chars().count() > 38 {
            desc = desc.chars().take(37).collect::<String>() + "…";
        }
        let mut amount = money_span(r.amount);
        amount.content = format!("{:>14}", amount.content).into();
        lines.push(Line::from(vec![
            Span::raw(format!("   {:<12}{:<40}", r.date.format("%Y-%m-%d"), desc)),
            amount,
            Span::raw(format!("  {}", r.reference.clone().unwrap_or_default())),
        ]));
    }
    let mut footer = format!(
        "   {} transactions (showing {}+)",
        batch.records.len(),
        if batch.records.is_empty() { 0 } else { start + 1 }
    );
    if !batch.errors.is_empty() {
        footer.push_str(&format!(", {} rows will be rejected", batch.errors.len()));
    }
    lines.push(Line::from(Span::styled(footer, FOOTER_STYLE)));
    lines
}

/// Expand `~` to home directory.
fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

pub fn run(workflow: ImportWorkflow, backend: Box<dyn Backend>) -> crate::error::Result<()> {
    let mut screen = ImportScreen::new(workflow, backend);
    crate::tui::run_screen(&mut screen)?;
    if let Some(url) = &screen.view_url {
        println!("View the imported transactions at {url}");
    }
    Ok(())
}
