mod app;
mod catalog;
mod clipboard;
mod clock;
mod config;
mod crypto;
mod entry;
mod icons;
mod label;
mod logging;
mod menu;
mod notify;
mod otp;
mod prompt;
mod scheduler;
mod shutdown;
mod tray;

use crate::app::{copy_entry_code, AppContext};
use crate::catalog::TwoFasCatalog;
use crate::clipboard::copy_to_clipboard;
use crate::clock::SystemClock;
use crate::config::{config_path, ConfigStore};
use crate::entry::OtpEntry;
use crate::notify::{Notices, StderrNotifier};
use crate::prompt::DialogPrompter;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "2fas-tray", version, about = "TOTP codes from a 2FAS backup in the system tray")]
struct Cli {
    /// Config file (default: ~/.config/2fas-tray.conf)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the tray icon (default)
    Tray,

    /// List entries with their menu labels
    Ls,

    /// Print the current code of an entry
    Show {
        /// Service name, case-insensitive
        name: String,
    },

    /// Copy the current code of an entry to the clipboard
    Clip {
        /// Service name, case-insensitive
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Tray);

    match command {
        Commands::Tray => logging::init_file_logging(),
        _ => logging::init_stderr_logging(),
    }

    let path = match cli.config {
        Some(path) => path,
        None => config_path()?,
    };
    let config = ConfigStore::load(&path)?;

    match command {
        Commands::Tray => tray::run(config)?,
        Commands::Ls => cmd_ls(config)?,
        Commands::Show { name } => cmd_show(config, &name)?,
        Commands::Clip { name } => cmd_clip(config, &name)?,
    }

    Ok(())
}

/// Loads the entries for a command line subcommand. Never rewrites the
/// config or opens a file picker; only a passphrase may be asked for.
fn load_for_cli(config: ConfigStore) -> anyhow::Result<AppContext<TwoFasCatalog, DialogPrompter>> {
    if config.prefs().backup_path.is_empty() {
        anyhow::bail!(
            "No 2FAS file configured in {}. Run the tray once or set twoFASPath.",
            config.path().display()
        );
    }
    let mut app = AppContext::new(config, TwoFasCatalog, DialogPrompter);
    app.load_configured()?;
    Ok(app)
}

fn find_entry<'a>(entries: &'a [OtpEntry], name: &str) -> anyhow::Result<&'a OtpEntry> {
    entries
        .iter()
        .find(|e| e.display_name().eq_ignore_ascii_case(name))
        .with_context(|| format!("No entry named {name}"))
}

fn cmd_ls(config: ConfigStore) -> anyhow::Result<()> {
    let app = load_for_cli(config)?;
    let format = &app.config.prefs().format;

    for entry in &app.entries {
        let text = label::render(format, entry);
        if label::is_live(format) {
            println!("{text}");
        } else {
            let code = entry
                .generate()
                .unwrap_or_else(|_| label::ERROR_MARKER.to_string());
            println!("{text}  {code}");
        }
    }
    Ok(())
}

fn cmd_show(config: ConfigStore, name: &str) -> anyhow::Result<()> {
    let app = load_for_cli(config)?;
    let entry = find_entry(&app.entries, name)?;
    let code = entry.generate()?;
    println!("{code}");
    Ok(())
}

fn cmd_clip(config: ConfigStore, name: &str) -> anyhow::Result<()> {
    let app = load_for_cli(config)?;
    let entry = find_entry(&app.entries, name)?;

    let mut notices = Notices::new(StderrNotifier);
    copy_entry_code(
        entry,
        &SystemClock,
        &mut |msg: &str| notices.notify(msg),
        &copy_to_clipboard,
    )?;
    Ok(())
}
