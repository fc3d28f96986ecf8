use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::RowError;

/// Normalized transaction produced by the CSV and OFX parsers.
/// Positive amounts are deposits, negative amounts withdrawals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BankTransactionRecord {
    pub date: NaiveDate,
    pub description: Option<String>,
    pub amount: Decimal,
    pub reference: Option<String>,
    pub currency: String,
}

impl BankTransactionRecord {
    pub fn is_deposit(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    pub fn deposit(&self) -> Option<Decimal> {
        self.is_deposit().then_some(self.amount)
    }

    pub fn withdrawal(&self) -> Option<Decimal> {
        (self.amount.is_sign_negative() && !self.amount.is_zero()).then(|| self.amount.abs())
    }
}

/// Records plus the rows that could not be converted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedBatch {
    pub records: Vec<BankTransactionRecord>,
    pub errors: Vec<RowError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementFormat {
    Csv,
    Ofx,
}

impl StatementFormat {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Ofx => "ofx",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::Ofx => "OFX/QFX",
        }
    }

    /// Picks the parser from the file extension. QFX is OFX with an Intuit header.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "ofx" | "qfx" => Some(Self::Ofx),
            _ => None,
        }
    }
}

/// Key the backend uses to decide that an incoming row is already on file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKey {
    #[default]
    DateAmountDescription,
    DateAmount,
    Reference,
}

impl DuplicateKey {
    pub const ALL: [DuplicateKey; 3] = [
        Self::DateAmountDescription,
        Self::DateAmount,
        Self::Reference,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::DateAmountDescription => "date_amount_description",
            Self::DateAmount => "date_amount",
            Self::Reference => "reference",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::DateAmountDescription => "date + amount + description",
            Self::DateAmount => "date + amount",
            Self::Reference => "reference",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn next(&self) -> Self {
        let idx = Self::ALL.iter().position(|k| k == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

/// Backend answer to an import submission.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ImportResult {
    pub imported_count: u64,
    pub skipped_count: u64,
    #[serde(default)]
    pub errors: Vec<RowError>,
}

/// Destination bank account as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BankAccount {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
}

// Some deployments return numeric primary keys, others UUIDs.
fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn record(amount: &str) -> BankTransactionRecord {
        BankTransactionRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            description: None,
            amount: Decimal::from_str(amount).unwrap(),
            reference: None,
            currency: "USD".into(),
        }
    }

    #[test]
    fn test_deposit_and_withdrawal_views() {
        let dep = record("100.00");
        assert!(dep.is_deposit());
        assert_eq!(dep.deposit(), Some(Decimal::from_str("100.00").unwrap()));
        assert_eq!(dep.withdrawal(), None);

        let wd = record("-50.00");
        assert!(!wd.is_deposit());
        assert_eq!(wd.deposit(), None);
        assert_eq!(wd.withdrawal(), Some(Decimal::from_str("50.00").unwrap()));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(StatementFormat::from_path(Path::new("a.csv")), Some(StatementFormat::Csv));
        assert_eq!(StatementFormat::from_path(Path::new("a.CSV")), Some(StatementFormat::Csv));
        assert_eq!(StatementFormat::from_path(Path::new("a.ofx")), Some(StatementFormat::Ofx));
        assert_eq!(StatementFormat::from_path(Path::new("b.QFX")), Some(StatementFormat::Ofx));
        assert_eq!(StatementFormat::from_path(Path::new("b.xlsx")), None);
        assert_eq!(StatementFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_duplicate_key_cycle() {
        let k = DuplicateKey::default();
        assert_eq!(k, DuplicateKey::DateAmountDescription);
        assert_eq!(k.next(), DuplicateKey::DateAmount);
        assert_eq!(k.next().next().next(), k);
        assert_eq!(DuplicateKey::from_key("reference"), Some(DuplicateKey::Reference));
        assert_eq!(DuplicateKey::from_key("bogus"), None);
    }

    #[test]
    fn test_import_result_deserializes() {
        let json = r#"{"imported_count":3,"skipped_count":1,"errors":[{"row":4,"error":"bad date"}]}"#;
        let r: ImportResult = serde_json::from_str(json).unwrap();
        assert_eq!(r.imported_count, 3);
        assert_eq!(r.skipped_count, 1);
        assert_eq!(r.errors, vec![RowError::new(4, "bad date")]);
    }

    #[test]
    fn test_bank_account_numeric_id() {
        let a: BankAccount = serde_json::from_str(r#"{"id":12,"name":"Operating"}"#).unwrap();
        assert_eq!(a.id, "12");
        assert_eq!(a.currency, None);
    }
}
