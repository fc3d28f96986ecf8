use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use serde::Deserialize;

use crate::error::ImportError;
use crate::mapping::ColumnMapping;
use crate::models::{BankAccount, DuplicateKey, ImportResult, StatementFormat};
use crate::settings::Settings;

const ACCOUNTS_PATH: &str = "books/bank-accounts/";
const IMPORT_PATH: &str = "books/bank-transactions/import/";
const TRANSACTIONS_PATH: &str = "books/bank-transactions/";

/// Everything the backend needs to import one statement file.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub file_name: String,
    pub file_bytes: Vec<u8>,
    pub account: String,
    pub format: StatementFormat,
    pub skip_duplicates: bool,
    pub duplicate_key: DuplicateKey,
    pub column_mapping: Option<ColumnMapping>,
}

impl ImportRequest {
    /// The non-file multipart fields, in submission order.
    pub fn form_fields(&self) -> Result<Vec<(&'static str, String)>, ImportError> {
        let mut fields = vec![
            ("account", self.account.clone()),
            ("format", self.format.key().to_string()),
            ("skip_duplicates", self.skip_duplicates.to_string()),
            ("duplicate_key", self.duplicate_key.key().to_string()),
        ];
        if let Some(mapping) = &self.column_mapping {
            let json = serde_json::to_string(mapping)
                .map_err(|e| ImportError::InvalidResponse(e.to_string()))?;
            fields.push(("column_mapping", json));
        }
        Ok(fields)
    }
}

/// The remote side of an import: where accounts come from and where
/// statements go.
pub trait Backend {
    fn list_bank_accounts(&self) -> Result<Vec<BankAccount>, ImportError>;
    fn import_statement(&self, request: &ImportRequest) -> Result<ImportResult, ImportError>;

    /// Where the imported transactions of `account` can be viewed, if the
    /// backend exposes such a page.
    fn transactions_url(&self, _account: &str) -> Option<String> {
        None
    }
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ImportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tally/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ImportError> {
        Self::new(
            &settings.api_url,
            settings.api_token.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl Backend for HttpBackend {
    fn list_bank_accounts(&self) -> Result<Vec<BankAccount>, ImportError> {
        let url = self.url(ACCOUNTS_PATH);
        log::info!("GET {url}");
        let resp = self.authorize(self.client.get(&url)).send()?;
        let body = success_body(resp)?;
        parse_accounts(&body)
    }

    fn import_statement(&self, request: &ImportRequest) -> Result<ImportResult, ImportError> {
        let url = self.url(IMPORT_PATH);
        log::info!(
            "POST {url} ({}, {} bytes, account {})",
            request.file_name,
            request.file_bytes.len(),
            request.account
        );

        let mut form = multipart::Form::new();
        for (name, value) in request.form_fields()? {
            form = form.text(name, value);
        }
        let file = multipart::Part::bytes(request.file_bytes.clone()).file_name(request.file_name.clone());
        form = form.part("file", file);

        let resp = self.authorize(self.client.post(&url)).multipart(form).send()?;
        let body = success_body(resp)?;
        let result: ImportResult = serde_json::from_str(&body)
            .map_err(|e| ImportError::InvalidResponse(e.to_string()))?;
        log::info!(
            "Import finished: {} imported, {} skipped, {} row errors",
            result.imported_count,
            result.skipped_count,
            result.errors.len()
        );
        Ok(result)
    }

    fn transactions_url(&self, account: &str) -> Option<String> {
        Some(format!("{}?account={account}", self.url(TRANSACTIONS_PATH)))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn success_body(resp: Response) -> Result<String, ImportError> {
    let status = resp.status();
    let body = resp.text()?;
    if status.is_success() {
        return Ok(body);
    }
    log::warn!("Backend answered {status}");
    Err(ImportError::Rejected {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pulls a readable message out of an error body: `detail`, `error` or
/// `message` fields of a JSON object, else the raw text.
fn error_message(body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error", "message"] {
            if let Some(msg) = map.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
        if let Some(first) = map
            .get("non_field_errors")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_str())
        {
            return first.to_string();
        }
    }
    let text = body.trim();
    if text.is_empty() {
        "no details given".to_string()
    } else {
        text.chars().take(200).collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AccountList {
    Plain(Vec<BankAccount>),
    Paginated { results: Vec<BankAccount> },
}

fn parse_accounts(body: &str) -> Result<Vec<BankAccount>, ImportError> {
    let list: AccountList =
        serde_json::from_str(body).map_err(|e| ImportError::InvalidResponse(e.to_string()))?;
    Ok(match list {
        AccountList::Plain(accounts) => accounts,
        AccountList::Paginated { results } => results,
    })
}
