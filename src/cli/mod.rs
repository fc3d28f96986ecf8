pub mod accounts;
pub mod contacts;
pub mod import;
pub mod import_manager;
pub mod init;
pub mod preview;

use clap::{Parser, Subcommand};

use crate::models::DuplicateKey;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Import bank statements (CSV, OFX, QFX) into Books."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write connection settings to ~/.config/tally/settings.json.
    Init {
        /// Base URL of the Books API (e.g. https://books.example.com/api)
        #[arg(long = "api-url")]
        api_url: Option<String>,
        /// API token sent as a bearer token
        #[arg(long)]
        token: Option<String>,
        /// Currency used when neither the account nor the file names one
        #[arg(long)]
        currency: Option<String>,
    },
    /// List destination bank accounts.
    Accounts,
    /// Parse a statement locally and show what would be imported.
    Preview {
        /// Path to a .csv, .ofx or .qfx file
        file: String,
        /// Override a detected column: field=column (e.g. date="Posting Date")
        #[arg(long = "map", value_name = "FIELD=COLUMN")]
        map: Vec<String>,
    },
    /// Import a statement into a bank account.
    Import {
        /// Path to a .csv, .ofx or .qfx file
        file: String,
        /// Destination bank account id (see `tally accounts`)
        #[arg(long)]
        account: String,
        /// Override a detected column: field=column
        #[arg(long = "map", value_name = "FIELD=COLUMN")]
        map: Vec<String>,
        /// Import rows even when they look like duplicates
        #[arg(long = "no-skip-duplicates")]
        no_skip_duplicates: bool,
        /// How duplicates are recognised: date_amount_description, date_amount, reference
        #[arg(long = "duplicate-key", value_parser = parse_duplicate_key)]
        duplicate_key: Option<DuplicateKey>,
    },
    /// Contact list helpers.
    Contacts {
        #[command(subcommand)]
        command: ContactsCommands,
    },
}

#[derive(Subcommand)]
pub enum ContactsCommands {
    /// Show how the columns of a contacts CSV would be mapped.
    Map {
        /// Path to a contacts CSV
        file: String,
    },
}

fn parse_duplicate_key(raw: &str) -> std::result::Result<DuplicateKey, String> {
    DuplicateKey::from_key(raw).ok_or_else(|| {
        let keys: Vec<&str> = DuplicateKey::ALL.iter().map(|k| k.key()).collect();
        format!("expected one of: {}", keys.join(", "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_import_args() {
        let cli = Cli::try_parse_from([
            "tally",
            "import",
            "jan.csv",
            "--account",
            "7",
            "--map",
            "date=Posted",
            "--no-skip-duplicates",
            "--duplicate-key",
            "reference",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Import {
                file,
                account,
                map,
                no_skip_duplicates,
                duplicate_key,
            }) => {
                assert_eq!(file, "jan.csv");
                assert_eq!(account, "7");
                assert_eq!(map, vec!["date=Posted"]);
                assert!(no_skip_duplicates);
                assert_eq!(duplicate_key, Some(DuplicateKey::Reference));
            }
            _ => panic!("expected import command"),
        }
    }

    #[test]
    fn test_bad_duplicate_key_rejected() {
        assert!(Cli::try_parse_from(["tally", "import", "a.csv", "--account", "1", "--duplicate-key", "fuzzy"]).is_err());
    }

    #[test]
    fn test_no_subcommand_is_allowed() {
        let cli = Cli::try_parse_from(["tally"]).unwrap();
        assert!(cli.command.is_none());
    }
}
