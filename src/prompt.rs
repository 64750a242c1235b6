use anyhow::{Result, anyhow};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

use crate::notify::APP_NAME;

/// Questions the application needs answered by the user.
/// `None` means the user cancelled.
pub trait Prompter {
    fn pick_backup_file(&self) -> Option<PathBuf>;
    fn ask_passphrase(&self, retry: bool) -> Option<String>;
    fn alert(&self, message: &str);
}

/// Native dialogs, with the terminal preferred for passphrases when one is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct DialogPrompter;

impl Prompter for DialogPrompter {
    fn pick_backup_file(&self) -> Option<PathBuf> {
        let start = dirs::download_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_default();
        rfd::FileDialog::new()
            .set_title("Select 2FAS backup file")
            .set_directory(start)
            .add_filter("2FAS backup", &["2fas", "json"])
            .add_filter("All files", &["*"])
            .pick_file()
    }

    fn ask_passphrase(&self, retry: bool) -> Option<String> {
        let prompt = if retry {
            "Wrong password, try again: "
        } else {
            "Backup password: "
        };

        let answer = if std::io::stdin().is_terminal() {
            prompt_password_hidden(prompt)
        } else {
            prompt_password_dialog(prompt)
        };

        match answer {
            Ok(pw) if !pw.is_empty() => Some(pw),
            Ok(_) => None,
            Err(e) => {
                warn!("cannot ask for password: {e:#}");
                self.alert(
                    "This backup is encrypted. Run 2fas-tray from a terminal \
                     or set defaultPassword in the config file.",
                );
                None
            }
        }
    }

    fn alert(&self, message: &str) {
        let _ = rfd::MessageDialog::new()
            .set_title(APP_NAME)
            .set_description(message)
            .set_level(rfd::MessageLevel::Warning)
            .show();
    }
}

fn prompt_password_hidden(prompt: &str) -> Result<String> {
    let pw = rpassword::prompt_password(prompt)?;
    Ok(pw)
}

/// Asks through whatever password dialog helper the desktop ships.
/// Cancelling yields an empty string.
fn prompt_password_dialog(prompt: &str) -> Result<String> {
    for (cmd, args) in password_helpers(prompt) {
        debug!("trying password helper {cmd}");
        match Command::new(cmd).args(&args).output() {
            Ok(out) if out.status.success() => {
                let mut s = String::from_utf8_lossy(&out.stdout).into_owned();
                if s.ends_with('\n') {
                    s.pop();
                    if s.ends_with('\r') {
                        s.pop();
                    }
                }
                return Ok(s);
            }
            // Helper ran but the user dismissed it.
            Ok(_) => return Ok(String::new()),
            Err(e) => debug!("{cmd} unavailable: {e}"),
        }
    }
    Err(anyhow!("no password dialog helper available"))
}

#[cfg(target_os = "macos")]
fn password_helpers(prompt: &str) -> Vec<(&'static str, Vec<String>)> {
    let script = format!(
        "text returned of (display dialog \"{}\" default answer \"\" with hidden answer with title \"{}\")",
        prompt.replace('"', "'"),
        APP_NAME
    );
    vec![("osascript", vec!["-e".to_string(), script])]
}

#[cfg(all(unix, not(target_os = "macos")))]
fn password_helpers(prompt: &str) -> Vec<(&'static str, Vec<String>)> {
    vec![
        (
            "zenity",
            vec![
                "--password".to_string(),
                format!("--title={APP_NAME}: {prompt}"),
            ],
        ),
        (
            "kdialog",
            vec![
                "--title".to_string(),
                APP_NAME.to_string(),
                "--password".to_string(),
                prompt.to_string(),
            ],
        ),
    ]
}

#[cfg(windows)]
fn password_helpers(_prompt: &str) -> Vec<(&'static str, Vec<String>)> {
    Vec::new()
}
