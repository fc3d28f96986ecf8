mod api;
mod cli;
mod error;
mod fmt;
mod importer;
mod mapping;
mod models;
mod settings;
mod tui;
mod workflow;

use clap::Parser;

use cli::{Cli, Commands, ContactsCommands};

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        None => run_wizard(),
        Some(Commands::Init {
            api_url,
            token,
            currency,
        }) => cli::init::run(api_url, token, currency),
        Some(Commands::Accounts) => cli::accounts::list(),
        Some(Commands::Preview { file, map }) => cli::preview::run(&file, &map),
        Some(Commands::Import {
            file,
            account,
            map,
            no_skip_duplicates,
            duplicate_key,
        }) => cli::import::run(cli::import::ImportArgs {
            file: &file,
            account: &account,
            overrides: &map,
            no_skip_duplicates,
            duplicate_key,
        }),
        Some(Commands::Contacts { command }) => match command {
            ContactsCommands::Map { file } => cli::contacts::map(&file),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run_wizard() -> error::Result<()> {
    let settings = settings::load_settings();
    let backend = api::HttpBackend::from_settings(&settings)?;
    let workflow = workflow::ImportWorkflow::new(workflow::WorkflowOptions::from(&settings));
    cli::import_manager::run(workflow, Box::new(backend))
}
