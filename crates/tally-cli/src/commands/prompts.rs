//! Prompt library commands
//!
//! Tally ships one prompt per AI task. Each can be replaced by dropping
//! `<id>.md` into the override directory; `prompts init` writes the
//! embedded defaults there as a starting point.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use tally_core::prompts::{default_prompts_dir, PromptId, PromptLibrary};
use tracing::info;

/// Where each prompt is used, as `(cli command, api route)`
fn used_by(id: PromptId) -> (&'static str, &'static str) {
    match id {
        PromptId::ParseText => ("tally ai parse", "POST /api/ai/parse"),
        PromptId::ParseReceipt => ("tally ai ocr", "POST /api/ai/ocr"),
        PromptId::AnalyzeFinances => ("tally ai analyze", "POST /api/ai/analyze"),
    }
}

/// `{{name}}` placeholders in `content`, sorted and deduplicated
pub fn placeholders(content: &str) -> Vec<&str> {
    let mut names = BTreeSet::new();
    let mut rest = content;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        let name = after[..close].trim();
        if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            names.insert(name);
        }
        rest = &after[close + 2..];
    }
    names.into_iter().collect()
}

fn parse_prompt_id(prompt_id: &str) -> Result<PromptId> {
    prompt_id.parse().map_err(|_| {
        let known: Vec<&str> = PromptId::all().iter().map(PromptId::as_str).collect();
        anyhow!(
            "Unknown prompt '{}'. Known prompts: {}",
            prompt_id,
            known.join(", ")
        )
    })
}

fn override_file(dir: &Path, id: PromptId) -> PathBuf {
    dir.join(format!("{}.md", id.as_str()))
}

/// List prompts, the commands that use them and their template variables
pub fn cmd_prompts_list(library: &mut PromptLibrary) -> Result<()> {
    println!(
        "{:<18} {:>3}  {:<18} {:<24} VARIABLES",
        "PROMPT", "VER", "USED BY", "SOURCE"
    );
    println!("{}", "-".repeat(86));

    for &id in PromptId::all() {
        let (command, _) = used_by(id);
        let prompt = library.get(id)?;
        let source = if prompt.is_override {
            "override"
        } else {
            "built-in"
        };
        let variables = placeholders(&prompt.content).join(", ");

        println!(
            "{:<18} {:>3}  {:<18} {:<24} {}",
            id.as_str(),
            prompt.metadata.version,
            command,
            source,
            variables
        );
    }

    match library.override_dir() {
        Some(dir) => println!("\nOverrides are read from {}", dir.display()),
        None => println!("\nOverrides are disabled (no data directory)"),
    }

    Ok(())
}

/// Print one prompt, or only its `system` or `user` section
pub fn cmd_prompts_show(
    library: &mut PromptLibrary,
    prompt_id: &str,
    section: Option<&str>,
) -> Result<()> {
    let id = parse_prompt_id(prompt_id)?;
    let prompt = library.get(id)?;

    let body = match section {
        None => prompt.content.as_str(),
        Some("system") => prompt
            .system_section()
            .context("Prompt has no system section")?,
        Some("user") => prompt.user_section().context("Prompt has no user section")?,
        Some(other) => bail!("Unknown section '{}': use system or user", other),
    };

    let (command, route) = used_by(id);
    println!(
        "# {} v{} ({})",
        id.as_str(),
        prompt.metadata.version,
        prompt.metadata.task_type
    );
    println!("# used by: {}, {}", command, route);
    match prompt.override_path {
        Some(ref path) => println!("# source: {}", path.display()),
        None => println!("# source: built-in"),
    }
    let variables = placeholders(body);
    if !variables.is_empty() {
        println!("# variables: {}", variables.join(", "));
    }
    println!();
    println!("{}", body);

    Ok(())
}

/// Print the override directory and the state of each override file
pub fn cmd_prompts_path(library: &PromptLibrary) -> Result<()> {
    let Some(dir) = library.override_dir() else {
        bail!("No data directory on this system, prompt overrides are unavailable");
    };

    println!("{}", dir.display());
    for &id in PromptId::all() {
        let path = override_file(dir, id);
        let marker = if path.exists() { "✓" } else { "·" };
        println!("  {} {}", marker, path.display());
    }

    Ok(())
}

/// Copy embedded defaults into `dir` so they can be edited
///
/// Writes every prompt, or just `prompt_id`. Existing files are kept unless
/// `force` is set. Returns the files written.
pub fn cmd_prompts_init(
    dir: &Path,
    prompt_id: Option<&str>,
    force: bool,
) -> Result<Vec<PathBuf>> {
    let ids = match prompt_id {
        Some(raw) => vec![parse_prompt_id(raw)?],
        None => PromptId::all().to_vec(),
    };

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut written = Vec::new();
    for id in ids {
        let path = override_file(dir, id);
        if path.exists() && !force {
            println!("  skipped {} (exists, use --force to overwrite)", path.display());
            continue;
        }
        fs::write(&path, id.default_content())
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(prompt = id.as_str(), path = %path.display(), "Wrote prompt override");
        println!("  wrote {}", path.display());
        written.push(path);
    }

    if !written.is_empty() {
        println!("Edit the files and restart the server to pick them up.");
    }

    Ok(written)
}

/// Default override directory, or an error when the system has none
pub fn prompts_dir() -> Result<PathBuf> {
    default_prompts_dir().context("No data directory on this system, pass --dir")
}
