use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError, ValidationError};

/// Logical transaction fields a CSV column can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransactionField {
    Date,
    Description,
    Amount,
    Debit,
    Credit,
    Reference,
}

impl TransactionField {
    pub const ALL: [TransactionField; 6] = [
        Self::Date,
        Self::Description,
        Self::Amount,
        Self::Debit,
        Self::Credit,
        Self::Reference,
    ];

    /// Wire name used in the `column_mapping` sent to the backend.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Date => "date_column",
            Self::Description => "description_column",
            Self::Amount => "amount_column",
            Self::Debit => "debit_column",
            Self::Credit => "credit_column",
            Self::Reference => "reference_column",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Date => "Date",
            Self::Description => "Description",
            Self::Amount => "Amount",
            Self::Debit => "Debit",
            Self::Credit => "Credit",
            Self::Reference => "Reference",
        }
    }

    /// Accepts either the short name (`date`) or the wire key (`date_column`).
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        let short = name.strip_suffix("_column").unwrap_or(&name);
        Self::ALL
            .into_iter()
            .find(|f| f.label().eq_ignore_ascii_case(short))
    }
}

impl fmt::Display for TransactionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which source column feeds each transaction field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debit_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credit_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_column: Option<String>,
}

impl ColumnMapping {
    pub fn get(&self, field: TransactionField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set(&mut self, field: TransactionField, column: Option<String>) {
        *self.slot_mut(field) = column;
    }

    fn slot(&self, field: TransactionField) -> &Option<String> {
        match field {
            TransactionField::Date => &self.date_column,
            TransactionField::Description => &self.description_column,
            TransactionField::Amount => &self.amount_column,
            TransactionField::Debit => &self.debit_column,
            TransactionField::Credit => &self.credit_column,
            TransactionField::Reference => &self.reference_column,
        }
    }

    fn slot_mut(&mut self, field: TransactionField) -> &mut Option<String> {
        match field {
            TransactionField::Date => &mut self.date_column,
            TransactionField::Description => &mut self.description_column,
            TransactionField::Amount => &mut self.amount_column,
            TransactionField::Debit => &mut self.debit_column,
            TransactionField::Credit => &mut self.credit_column,
            TransactionField::Reference => &mut self.reference_column,
        }
    }

    /// Applies a `field=column` override as given on the command line.
    /// An empty column clears the field.
    pub fn apply_override(&mut self, spec: &str, headers: &[String]) -> Result<()> {
        let (field, column) = parse_override(spec)?;
        if let Some(col) = &column {
            if !headers.iter().any(|h| h == col) {
                return Err(TallyError::UnknownColumn(col.clone()));
            }
        }
        self.set(field, column);
        Ok(())
    }
}

/// Splits `field=column` into its parts; `date=` yields `(Date, None)`.
pub fn parse_override(spec: &str) -> Result<(TransactionField, Option<String>)> {
    let (field, column) = spec
        .split_once('=')
        .ok_or_else(|| TallyError::Other(format!("Expected field=column, got '{spec}'")))?;
    let field = TransactionField::from_name(field)
        .ok_or_else(|| TallyError::Other(format!("Unknown mapping field: {field}")))?;
    let column = column.trim();
    Ok((field, (!column.is_empty()).then(|| column.to_string())))
}

/// A mapping is usable when it names a date column and either a single
/// amount column or both debit and credit columns.
pub fn validate_mapping(mapping: &ColumnMapping) -> std::result::Result<(), ValidationError> {
    let mut problems = Vec::new();
    if mapping.date_column.is_none() {
        problems.push("Date column is required".to_string());
    }
    let has_amount = mapping.amount_column.is_some();
    let has_split = mapping.debit_column.is_some() && mapping.credit_column.is_some();
    if !has_amount && !has_split {
        problems.push("Amount column is required (or both debit and credit columns)".to_string());
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(problems))
    }
}

// ---------------------------------------------------------------------------
// Auto-detection
// ---------------------------------------------------------------------------

/// One row of a detection table: a predicate over the normalized header and
/// the field it claims.
pub struct MatchRule<F> {
    pub matches: fn(&str) -> bool,
    pub target: F,
}

/// Lower-cases and drops `_`, `-` and spaces: "Posting Date" -> "postingdate".
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Runs `rules` over every header. For each header only the first matching
/// rule counts, and a field claimed by an earlier header stays with it.
pub fn detect_columns<F: Copy + PartialEq>(headers: &[String], rules: &[MatchRule<F>]) -> Vec<(F, String)> {
    let mut claimed: Vec<(F, String)> = Vec::new();
    for header in headers {
        let norm = normalize_header(header);
        let Some(rule) = rules.iter().find(|r| (r.matches)(&norm)) else {
            continue;
        };
        if claimed.iter().any(|(f, _)| *f == rule.target) {
            log::debug!("Header '{header}' matches an already mapped field, leaving it unmapped");
            continue;
        }
        claimed.push((rule.target, header.clone()));
    }
    claimed
}

pub const TRANSACTION_RULES: &[MatchRule<TransactionField>] = &[
    MatchRule {
        matches: |h| h.contains("date") || h.contains("posted"),
        target: TransactionField::Date,
    },
    MatchRule {
        matches: |h| {
            h.contains("reference")
                || h.contains("ref")
                || h.contains("checknumber")
                || h.contains("chequenumber")
                || h.contains("transactionid")
        },
        target: TransactionField::Reference,
    },
    MatchRule {
        matches: |h| {
            h.contains("debit")
                || h.contains("withdrawal")
                || h.contains("moneyout")
                || h.contains("paidout")
        },
        target: TransactionField::Debit,
    },
    MatchRule {
        matches: |h| {
            h.contains("credit") || h.contains("deposit") || h.contains("moneyin") || h.contains("paidin")
        },
        target: TransactionField::Credit,
    },
    MatchRule {
        matches: |h| h.contains("amount") || h.contains("value"),
        target: TransactionField::Amount,
    },
    MatchRule {
        matches: |h| {
            h.contains("description")
                || h.contains("memo")
                || h.contains("details")
                || h.contains("narrative")
                || h.contains("payee")
                || h.contains("name")
        },
        target: TransactionField::Description,
    },
];

/// Best-effort guess; the user confirms or edits it in the preview.
pub fn auto_detect_mapping(headers: &[String]) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    for (field, column) in detect_columns(headers, TRANSACTION_RULES) {
        mapping.set(field, Some(column));
    }
    log::debug!("Auto-detected mapping: {mapping:?}");
    mapping
}

// ---------------------------------------------------------------------------
// Contacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContactField {
    Name,
    Email,
    Phone,
    Company,
    City,
    State,
    Country,
    Type,
    Category,
    Notes,
    Source,
    Tag,
}

impl ContactField {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Company => "company",
            Self::City => "city",
            Self::State => "state",
            Self::Country => "country",
            Self::Type => "type",
            Self::Category => "category",
            Self::Notes => "notes",
            Self::Source => "source",
            Self::Tag => "tag",
        }
    }
}

pub const CONTACT_RULES: &[MatchRule<ContactField>] = &[
    MatchRule {
        matches: |h| h.contains("name") && !h.contains("company"),
        target: ContactField::Name,
    },
    MatchRule {
        matches: |h| h.contains("email"),
        target: ContactField::Email,
    },
    MatchRule {
        matches: |h| h.contains("phone") || h.contains("mobile"),
        target: ContactField::Phone,
    },
    MatchRule {
        matches: |h| h.contains("company") || h.contains("organization"),
        target: ContactField::Company,
    },
    MatchRule {
        matches: |h| h.contains("city"),
        target: ContactField::City,
    },
    MatchRule {
        matches: |h| h.contains("state") || h.contains("region"),
        target: ContactField::State,
    },
    MatchRule {
        matches: |h| h.contains("country"),
        target: ContactField::Country,
    },
    MatchRule {
        matches: |h| h.contains("type"),
        target: ContactField::Type,
    },
    MatchRule {
        matches: |h| h.contains("category"),
        target: ContactField::Category,
    },
    MatchRule {
        matches: |h| h.contains("notes") || h.contains("comment"),
        target: ContactField::Notes,
    },
    MatchRule {
        matches: |h| h.contains("source"),
        target: ContactField::Source,
    },
    MatchRule {
        matches: |h| h.contains("tag"),
        target: ContactField::Tag,
    },
];

pub fn auto_detect_contact_mapping(headers: &[String]) -> BTreeMap<ContactField, String> {
    detect_columns(headers, CONTACT_RULES).into_iter().collect()
}
