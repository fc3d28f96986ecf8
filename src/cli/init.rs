use crate::error::{Result, TallyError};
use crate::settings::{load_settings, save_settings, settings_path};

pub fn run(api_url: Option<String>, token: Option<String>, currency: Option<String>) -> Result<()> {
    let mut settings = load_settings();

    if let Some(url) = api_url {
        let url = url.trim().trim_end_matches('/').to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(TallyError::Settings(format!(
                "API URL must start with http:// or https:// (got '{url}')"
            )));
        }
        settings.api_url = url;
    }
    if let Some(token) = token {
        let token = token.trim().to_string();
        settings.api_token = (!token.is_empty()).then_some(token);
    }
    if let Some(currency) = currency {
        let code = currency.trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(TallyError::Settings(format!(
                "Currency must be a three-letter code (got '{currency}')"
            )));
        }
        settings.default_currency = code;
    }

    save_settings(&settings)?;
    println!("Settings saved to {}", settings_path().display());
    println!("  API URL:  {}", settings.api_url);
    println!(
        "  Token:    {}",
        if settings.api_token.is_some() { "set" } else { "not set" }
    );
    println!("  Currency: {}", settings.default_currency);
    Ok(())
}
