//! Tally CLI - Personal bookkeeping with AI-assisted entry
//!
//! Usage:
//!   tally init                     Initialize database
//!   tally records add -t expense -a 25 -c 餐饮   Add a record
//!   tally ai parse "午饭 25"        Turn text into draft records
//!   tally stats --group-by week    Show statistics
//!   tally prompts init parse_text  Copy a prompt out for editing
//!   tally serve --port 3000        Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tally_core::prompts::PromptLibrary;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Serve {
            port,
            host,
            no_auth,
            static_dir,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, static_dir.as_deref()).await,
        Commands::Records { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None => commands::cmd_records_list(&db, 20, None, None, None, None),
                Some(RecordsAction::List {
                    limit,
                    kind,
                    category,
                    from,
                    to,
                }) => commands::cmd_records_list(
                    &db,
                    limit,
                    kind.as_deref(),
                    category.as_deref(),
                    from.as_deref(),
                    to.as_deref(),
                ),
                Some(RecordsAction::Add {
                    kind,
                    amount,
                    category,
                    description,
                    date,
                    wallet,
                }) => commands::cmd_records_add(
                    &db,
                    &kind,
                    &amount,
                    &category,
                    &description,
                    date.as_deref(),
                    wallet,
                )
                .map(|_| ()),
                Some(RecordsAction::Delete { id }) => commands::cmd_records_delete(&db, id),
            }
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None => commands::cmd_categories_list(&db, None),
                Some(CategoriesAction::List { kind }) => {
                    commands::cmd_categories_list(&db, kind.as_deref())
                }
                Some(CategoriesAction::Add {
                    name,
                    kind,
                    icon,
                    color,
                }) => commands::cmd_categories_add(
                    &db,
                    &name,
                    &kind,
                    icon.as_deref(),
                    color.as_deref(),
                ),
            }
        }
        Commands::Wallets { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None | Some(WalletsAction::List) => commands::cmd_wallets_list(&db),
                Some(WalletsAction::Add {
                    name,
                    kind,
                    balance,
                    credit_limit,
                    default,
                }) => commands::cmd_wallets_add(
                    &db,
                    &name,
                    &kind,
                    balance.as_deref(),
                    credit_limit.as_deref(),
                    default,
                )
                .map(|_| ()),
                Some(WalletsAction::Delete { id }) => commands::cmd_wallets_delete(&db, id),
            }
        }
        Commands::Stats { from, to, group_by } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_stats(&db, from.as_deref(), to.as_deref(), &group_by)
        }
        Commands::Ai { action } => match action {
            AiAction::Normalize { file, single } => {
                let raw = commands::read_input(file.as_deref())?;
                commands::cmd_ai_normalize(&raw, single)
            }
            AiAction::Parse { text, save, wallet } => {
                let db = commands::open_db(&cli.db)?;
                let client = commands::ai_client()?;
                commands::cmd_ai_parse(&db, &client, &text, save, wallet)
                    .await
                    .map(|_| ())
            }
            AiAction::Ocr {
                image,
                save,
                wallet,
            } => {
                let db = commands::open_db(&cli.db)?;
                let client = commands::ai_client()?;
                commands::cmd_ai_ocr(&db, &client, &image, save, wallet)
                    .await
                    .map(|_| ())
            }
            AiAction::Analyze { from, to, kind } => {
                let db = commands::open_db(&cli.db)?;
                let client = commands::ai_client()?;
                commands::cmd_ai_analyze(
                    &db,
                    &client,
                    from.as_deref(),
                    to.as_deref(),
                    kind.as_deref(),
                )
                .await
            }
        },
        Commands::Prompts { action } => {
            let mut library = PromptLibrary::new();
            match action {
                None | Some(PromptsAction::List) => commands::cmd_prompts_list(&mut library),
                Some(PromptsAction::Show { id, section }) => {
                    commands::cmd_prompts_show(&mut library, &id, section.as_deref())
                }
                Some(PromptsAction::Path) => commands::cmd_prompts_path(&library),
                Some(PromptsAction::Init { id, dir, force }) => {
                    let dir = match dir {
                        Some(dir) => dir,
                        None => commands::prompts_dir()?,
                    };
                    commands::cmd_prompts_init(&dir, id.as_deref(), force).map(|_| ())
                }
            }
        }
    }
}
