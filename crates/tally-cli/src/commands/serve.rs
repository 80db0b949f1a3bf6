//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};

use super::open_db;

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    static_dir: Option<&Path>,
) -> Result<()> {
    println!("🚀 Starting Tally web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }

    let config = tally_server::ServerConfig {
        require_auth: !no_auth,
        ..tally_server::ServerConfig::from_env()
    };

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        println!(
            "   🔒 Authentication: session login as '{}' ({}h sessions)",
            config.auth_username, config.session_expiry_hours
        );
        if config.uses_default_password() {
            println!("      Set AUTH_USERNAME and AUTH_PASSWORD to replace the default login");
        }
        if !config.allowed_origins.is_empty() {
            println!(
                "   🌐 Allowed origins: {} (TALLY_ALLOWED_ORIGINS)",
                config.allowed_origins.join(", ")
            );
        }
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path)?;

    let static_dir_str = static_dir
        .map(|p| {
            p.to_str()
                .with_context(|| format!("Static dir is not valid UTF-8: {}", p.display()))
        })
        .transpose()?;
    tally_server::serve_with_config(db, host, port, static_dir_str, config).await?;

    Ok(())
}
