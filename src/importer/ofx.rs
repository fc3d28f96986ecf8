//! OFX/QFX statement parsing.
//!
//! Accepts both OFX 1.x SGML (leaf elements without closing tags) and
//! OFX 2.x XML. Only the statement subset needed for an import is read:
//! account, currency, balances, the statement period and `STMTTRN` nodes.
//! Structural problems are collected in [`OfxStatement::issues`] instead of
//! being skipped over.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

use crate::error::{ParseError, RowError, ValidationError};
use crate::models::{BankTransactionRecord, MappedBatch};

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([A-Za-z0-9_.]+)\s*>([^<]*)").unwrap());

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bVERSION\s*[:=]\s*"?(\d+)"#).unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfxStatement {
    pub version: Option<String>,
    pub account_id: Option<String>,
    pub bank_id: Option<String>,
    pub account_type: Option<String>,
    pub currency: Option<String>,
    pub ledger_balance: Option<Decimal>,
    pub ledger_balance_as_of: Option<NaiveDate>,
    pub available_balance: Option<Decimal>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub transactions: Vec<OfxTransaction>,
    pub issues: Vec<String>,
}

/// One `<STMTTRN>` node with its raw element values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfxTransaction {
    pub trn_type: Option<String>,
    pub dt_posted: Option<String>,
    pub trn_amt: Option<String>,
    pub fit_id: Option<String>,
    pub name: Option<String>,
    pub memo: Option<String>,
    pub check_num: Option<String>,
    pub ref_num: Option<String>,
}

impl OfxTransaction {
    fn set(&mut self, tag: &str, value: String) {
        let slot = match tag {
            "TRNTYPE" => &mut self.trn_type,
            "DTPOSTED" => &mut self.dt_posted,
            "TRNAMT" => &mut self.trn_amt,
            "FITID" => &mut self.fit_id,
            "NAME" => &mut self.name,
            "MEMO" => &mut self.memo,
            "CHECKNUM" => &mut self.check_num,
            "REFNUM" => &mut self.ref_num,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn posted_date(&self) -> Option<NaiveDate> {
        self.dt_posted.as_deref().and_then(parse_ofx_date)
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.trn_amt.as_deref().and_then(parse_ofx_amount)
    }
}

#[derive(Clone, Copy)]
enum BalanceBlock {
    Ledger,
    Available,
}

pub fn parse_ofx(text: &str) -> Result<OfxStatement, ParseError> {
    let start = text
        .to_ascii_uppercase()
        .find("<OFX>")
        .ok_or(ParseError::NotOfx)?;
    let (header, body) = text.split_at(start);

    let mut stmt = OfxStatement {
        version: header_version(header),
        ..Default::default()
    };
    let mut current: Option<OfxTransaction> = None;
    let mut balance: Option<BalanceBlock> = None;
    let mut closed_at: Option<usize> = None;

    for cap in TAG_RE.captures_iter(body) {
        let (Some(tag), Some(text)) = (cap.get(2), cap.get(3)) else {
            continue;
        };
        let name = tag.as_str().to_ascii_uppercase();
        let closing = cap.get(1).is_some_and(|m| m.as_str() == "/");

        if closing {
            match name.as_str() {
                "STMTTRN" => match current.take() {
                    Some(trn) => stmt.transactions.push(trn),
                    None => stmt
                        .issues
                        .push("Found </STMTTRN> without a matching <STMTTRN>".to_string()),
                },
                "LEDGERBAL" | "AVAILBAL" => balance = None,
                "OFX" => {
                    closed_at = Some(text.start());
                    break;
                }
                _ => {}
            }
            continue;
        }

        let value = decode_entities(text.as_str().trim());
        match name.as_str() {
            "STMTTRN" => {
                if let Some(open) = current.replace(OfxTransaction::default()) {
                    stmt.issues.push(format!(
                        "Transaction {} is missing its closing </STMTTRN>",
                        stmt.transactions.len() + 1
                    ));
                    stmt.transactions.push(open);
                }
            }
            "LEDGERBAL" => balance = Some(BalanceBlock::Ledger),
            "AVAILBAL" => balance = Some(BalanceBlock::Available),
            _ if value.is_empty() => {}
            _ => match current.as_mut() {
                Some(trn) => trn.set(&name, value),
                None => stmt.set_header_field(&name, value, balance),
            },
        }
    }

    if let Some(open) = current.take() {
        stmt.issues
            .push("Statement ends inside an unterminated <STMTTRN> block".to_string());
        stmt.transactions.push(open);
    }
    match closed_at {
        None => stmt
            .issues
            .push("Missing closing </OFX> tag; the file may be truncated".to_string()),
        Some(end) => {
            let trailing = body[end..].trim();
            if !trailing.is_empty() {
                let preview: String = trailing.chars().take(40).collect();
                stmt.issues
                    .push(format!("Unexpected data after </OFX>: '{preview}'"));
            }
        }
    }

    log::debug!(
        "Parsed OFX: account {:?}, {} transactions, {} issues",
        stmt.account_id,
        stmt.transactions.len(),
        stmt.issues.len()
    );
    Ok(stmt)
}

impl OfxStatement {
    fn set_header_field(&mut self, tag: &str, value: String, balance: Option<BalanceBlock>) {
        match tag {
            "ACCTID" => {
                self.account_id.get_or_insert(value);
            }
            "BANKID" => {
                self.bank_id.get_or_insert(value);
            }
            "ACCTTYPE" => {
                self.account_type.get_or_insert(value);
            }
            "CURDEF" => {
                self.currency.get_or_insert(value.to_ascii_uppercase());
            }
            "DTSTART" => self.start_date = parse_ofx_date(&value),
            "DTEND" => self.end_date = parse_ofx_date(&value),
            "BALAMT" => match balance {
                Some(BalanceBlock::Ledger) => self.ledger_balance = parse_ofx_amount(&value),
                Some(BalanceBlock::Available) => self.available_balance = parse_ofx_amount(&value),
                None => {}
            },
            "DTASOF" => {
                if let Some(BalanceBlock::Ledger) = balance {
                    self.ledger_balance_as_of = parse_ofx_date(&value);
                }
            }
            _ => {}
        }
    }
}

/// Reports every missing mandatory element plus any structural issue.
pub fn validate_ofx_result(stmt: &OfxStatement) -> Result<(), ValidationError> {
    let mut problems = Vec::new();
    if stmt.account_id.is_none() {
        problems.push("Statement has no account identifier (<ACCTID>)".to_string());
    }
    if stmt.currency.is_none() {
        problems.push("Statement has no currency (<CURDEF>)".to_string());
    }
    if stmt.transactions.is_empty() {
        problems.push("Statement contains no transactions (no <STMTTRN> blocks)".to_string());
    }
    problems.extend(stmt.issues.iter().cloned());
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(problems))
    }
}

const DEBIT_TYPES: &[&str] = &[
    "DEBIT", "PAYMENT", "CHECK", "FEE", "SRVCHG", "ATM", "POS", "CASH", "DIRECTDEBIT",
];
const CREDIT_TYPES: &[&str] = &["CREDIT", "DEP", "INT", "DIV", "DIRECTDEP"];

/// The TRNAMT sign is authoritative unless it contradicts an unambiguous
/// TRNTYPE (some exporters write debits as positive amounts).
fn signed_amount(amount: Decimal, trn_type: Option<&str>) -> Decimal {
    let Some(kind) = trn_type.map(|t| t.trim().to_ascii_uppercase()) else {
        return amount;
    };
    if DEBIT_TYPES.contains(&kind.as_str()) && amount.is_sign_positive() {
        -amount
    } else if CREDIT_TYPES.contains(&kind.as_str()) && amount.is_sign_negative() {
        amount.abs()
    } else {
        amount
    }
}

/// Converts every transaction node; unusable ones become row errors keyed
/// by their 1-based position in the statement.
pub fn map_ofx_to_transactions(stmt: &OfxStatement, default_currency: &str) -> MappedBatch {
    let currency = stmt
        .currency
        .clone()
        .unwrap_or_else(|| default_currency.to_string());
    let mut batch = MappedBatch::default();
    for (i, trn) in stmt.transactions.iter().enumerate() {
        let row = i as u64 + 1;
        match map_transaction(trn, &currency) {
            Ok(record) => batch.records.push(record),
            Err(error) => batch.errors.push(RowError::new(row, error)),
        }
    }
    batch
}

fn map_transaction(trn: &OfxTransaction, currency: &str) -> Result<BankTransactionRecord, String> {
    let raw_date = trn.dt_posted.as_deref().ok_or("missing <DTPOSTED>")?;
    let date = trn
        .posted_date()
        .ok_or_else(|| format!("invalid posted date '{raw_date}'"))?;
    let raw_amount = trn.trn_amt.as_deref().ok_or("missing <TRNAMT>")?;
    let amount = trn
        .amount()
        .ok_or_else(|| format!("invalid amount '{raw_amount}'"))?;
    let amount = signed_amount(amount, trn.trn_type.as_deref());
    if amount.is_zero() {
        return Err("amount is zero".to_string());
    }

    Ok(BankTransactionRecord {
        date,
        description: trn.name.clone().or_else(|| trn.memo.clone()),
        amount,
        reference: trn
            .fit_id
            .clone()
            .or_else(|| trn.ref_num.clone())
            .or_else(|| trn.check_num.clone()),
        currency: currency.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// OFX datetimes look like `20240115120000.000[-5:EST]`; only the date is kept.
pub fn parse_ofx_date(raw: &str) -> Option<NaiveDate> {
    let digits = raw.trim().get(0..8)?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

/// Some European exporters use a decimal comma.
fn parse_ofx_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.contains(',') && !raw.contains('.') {
        Decimal::from_str(&raw.replace(',', ".")).ok()
    } else {
        Decimal::from_str(raw).ok()
    }
}

fn header_version(header: &str) -> Option<String> {
    VERSION_RE.captures(header).map(|c| c[1].to_string())
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    const SGML: &str = "OFXHEADER:100
DATA:OFXSGML
VERSION:102
SECURITY:NONE
ENCODING:USASCII
CHARSET:1252

<OFX>
<SIGNONMSGSRSV1><SONRS><STATUS><CODE>0<SEVERITY>INFO</STATUS><DTSERVER>20240201</SONRS></SIGNONMSGSRSV1>
<BANKMSGSRSV1>
<STMTTRNRS>
<TRNUID>1
<STMTRS>
<CURDEF>usd
<BANKACCTFROM>
<BANKID>121000358
<ACCTID>000123456789
<ACCTTYPE>CHECKING
</BANKACCTFROM>
<BANKTRANLIST>
<DTSTART>20240101
<DTEND>20240131
<STMTTRN>
<TRNTYPE>CREDIT
<DTPOSTED>20240105120000[-5:EST]
<TRNAMT>100.00
<FITID>20240105001
<NAME>PAYROLL ACME &amp; SONS
</STMTTRN>
<STMTTRN>
<TRNTYPE>DEBIT
<DTPOSTED>20240106
<TRNAMT>-50.00
<FITID>20240106001
<MEMO>CARD PURCHASE
</STMTTRN>
</BANKTRANLIST>
<LEDGERBAL>
<BALAMT>1050.25
<DTASOF>20240131
</LEDGERBAL>
<AVAILBAL>
<BALAMT>1000.00
<DTASOF>20240131
</AVAILBAL>
</STMTRS>
</STMTTRNRS>
</BANKMSGSRSV1>
</OFX>
";

    const XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<?OFX OFXHEADER="200" VERSION="220" SECURITY="NONE" OLDFILEUID="NONE" NEWFILEUID="NONE"?>
<OFX>
  <CREDITCARDMSGSRSV1>
    <CCSTMTTRNRS>
      <CCSTMTRS>
        <CURDEF>EUR</CURDEF>
        <CCACCTFROM><ACCTID>4111XXXX1111</ACCTID></CCACCTFROM>
        <BANKTRANLIST>
          <STMTTRN>
            <TRNTYPE>PAYMENT</TRNTYPE>
            <DTPOSTED>20240310</DTPOSTED>
            <TRNAMT>12,50</TRNAMT>
            <FITID>X1</FITID>
            <NAME>Bakery</NAME>
          </STMTTRN>
        </BANKTRANLIST>
      </CCSTMTRS>
    </CCSTMTTRNRS>
  </CREDITCARDMSGSRSV1>
</OFX>
"#;

    #[test]
    fn test_parse_sgml_statement() {
        let stmt = parse_ofx(SGML).unwrap();
        assert_eq!(stmt.version.as_deref(), Some("102"));
        assert_eq!(stmt.account_id.as_deref(), Some("000123456789"));
        assert_eq!(stmt.bank_id.as_deref(), Some("121000358"));
        assert_eq!(stmt.account_type.as_deref(), Some("CHECKING"));
        assert_eq!(stmt.currency.as_deref(), Some("USD"));
        assert_eq!(stmt.ledger_balance, Some(d("1050.25")));
        assert_eq!(stmt.available_balance, Some(d("1000.00")));
        assert_eq!(stmt.ledger_balance_as_of, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(stmt.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(stmt.end_date, NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(stmt.transactions.len(), 2);
        assert_eq!(stmt.transactions[0].name.as_deref(), Some("PAYROLL ACME & SONS"));
        assert!(stmt.issues.is_empty(), "{:?}", stmt.issues);
        assert!(validate_ofx_result(&stmt).is_ok());
    }

    #[test]
    fn test_map_sgml_statement() {
        let stmt = parse_ofx(SGML).unwrap();
        let batch = map_ofx_to_transactions(&stmt, "CAD");
        assert!(batch.errors.is_empty());
        assert_eq!(batch.records.len(), 2);
        let first = &batch.records[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(first.amount, d("100.00"));
        assert_eq!(first.reference.as_deref(), Some("20240105001"));
        assert_eq!(first.currency, "USD");
        let second = &batch.records[1];
        assert_eq!(second.amount, d("-50.00"));
        assert_eq!(second.description.as_deref(), Some("CARD PURCHASE"));
    }

    #[test]
    fn test_parse_xml_statement() {
        let stmt = parse_ofx(XML).unwrap();
        assert_eq!(stmt.version.as_deref(), Some("220"));
        assert_eq!(stmt.account_id.as_deref(), Some("4111XXXX1111"));
        assert_eq!(stmt.currency.as_deref(), Some("EUR"));
        assert!(stmt.issues.is_empty(), "{:?}", stmt.issues);

        let batch = map_ofx_to_transactions(&stmt, "USD");
        // PAYMENT written as a positive amount is still a withdrawal.
        assert_eq!(batch.records[0].amount, d("-12.50"));
        assert_eq!(batch.records[0].currency, "EUR");
    }

    #[test]
    fn test_missing_stmttrn_fails_validation() {
        let text = "<OFX><STMTRS><CURDEF>USD<BANKACCTFROM><ACCTID>1</BANKACCTFROM>\
                    <BANKTRANLIST></BANKTRANLIST></STMTRS></OFX>";
        let stmt = parse_ofx(text).unwrap();
        let err = validate_ofx_result(&stmt).unwrap_err();
        assert_eq!(
            err.problems,
            vec!["Statement contains no transactions (no <STMTTRN> blocks)".to_string()]
        );
    }

    #[test]
    fn test_missing_account_and_currency_reported() {
        let text = "<OFX><STMTTRN><DTPOSTED>20240101<TRNAMT>1</STMTTRN></OFX>";
        let stmt = parse_ofx(text).unwrap();
        let err = validate_ofx_result(&stmt).unwrap_err();
        assert_eq!(err.problems.len(), 2);
        assert!(err.problems[0].contains("ACCTID"));
        assert!(err.problems[1].contains("CURDEF"));
    }

    #[test]
    fn test_not_ofx() {
        assert_eq!(parse_ofx("date,amount\n1,2\n"), Err(ParseError::NotOfx));
    }

    #[test]
    fn test_truncated_statement_is_reported() {
        let text = "<OFX><CURDEF>USD<ACCTID>9\n<STMTTRN><DTPOSTED>20240101<TRNAMT>5</STMTTRN>\n\
                    <STMTTRN><DTPOSTED>20240102<TRNAMT>-3";
        let stmt = parse_ofx(text).unwrap();
        assert_eq!(stmt.transactions.len(), 2);
        assert_eq!(
            stmt.issues,
            vec![
                "Statement ends inside an unterminated <STMTTRN> block".to_string(),
                "Missing closing </OFX> tag; the file may be truncated".to_string(),
            ]
        );
        assert!(validate_ofx_result(&stmt).is_err());
    }

    #[test]
    fn test_trailing_garbage_is_reported() {
        let text = "<OFX><CURDEF>USD<ACCTID>9<STMTTRN><DTPOSTED>20240101<TRNAMT>5</STMTTRN></OFX>\nGARBAGE";
        let stmt = parse_ofx(text).unwrap();
        assert_eq!(stmt.issues, vec!["Unexpected data after </OFX>: 'GARBAGE'".to_string()]);
    }

    #[test]
    fn test_unclosed_transaction_before_next_one() {
        let text = "<OFX><STMTTRN><TRNAMT>1<DTPOSTED>20240101<STMTTRN><TRNAMT>2<DTPOSTED>20240102</STMTTRN></OFX>";
        let stmt = parse_ofx(text).unwrap();
        assert_eq!(stmt.transactions.len(), 2);
        assert_eq!(stmt.issues, vec!["Transaction 1 is missing its closing </STMTTRN>".to_string()]);
    }

    #[test]
    fn test_bad_transactions_become_row_errors() {
        let text = "<OFX><CURDEF>USD<ACCTID>9\
                    <STMTTRN><TRNAMT>5</STMTTRN>\
                    <STMTTRN><DTPOSTED>2024XX01<TRNAMT>5</STMTTRN>\
                    <STMTTRN><DTPOSTED>20240101<TRNAMT>abc</STMTTRN>\
                    <STMTTRN><DTPOSTED>20240101<TRNAMT>0.00</STMTTRN>\
                    <STMTTRN><DTPOSTED>20240101<TRNAMT>-9.99<CHECKNUM>1042</STMTTRN></OFX>";
        let stmt = parse_ofx(text).unwrap();
        let batch = map_ofx_to_transactions(&stmt, "USD");
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].reference.as_deref(), Some("1042"));
        let errors: Vec<(u64, &str)> = batch.errors.iter().map(|e| (e.row, e.error.as_str())).collect();
        assert_eq!(
            errors,
            vec![
                (1, "missing <DTPOSTED>"),
                (2, "invalid posted date '2024XX01'"),
                (3, "invalid amount 'abc'"),
                (4, "amount is zero"),
            ]
        );
    }

    #[test]
    fn test_alternating_dialects_parse_consistently() {
        for _ in 0..3 {
            assert_eq!(parse_ofx(SGML).unwrap().version.as_deref(), Some("102"));
            assert_eq!(parse_ofx(XML).unwrap().version.as_deref(), Some("220"));
        }
        assert_eq!(header_version("OFXHEADER:100\nDATA:OFXSGML\n"), None);
        assert_eq!(parse_ofx(SGML).unwrap(), parse_ofx(SGML).unwrap());
    }

    #[test]
    fn test_signed_amount_rules() {
        assert_eq!(signed_amount(d("10"), Some("DEBIT")), d("-10"));
        assert_eq!(signed_amount(d("-10"), Some("DEBIT")), d("-10"));
        assert_eq!(signed_amount(d("-10"), Some("dep")), d("10"));
        assert_eq!(signed_amount(d("-10"), Some("XFER")), d("-10"));
        assert_eq!(signed_amount(d("10"), None), d("10"));
    }

    #[test]
    fn test_parse_ofx_date() {
        assert_eq!(parse_ofx_date("20240115"), NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(parse_ofx_date("20240115120000[-5:EST]"), NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(parse_ofx_date("2024"), None);
        assert_eq!(parse_ofx_date("20241301"), None);
    }
}
