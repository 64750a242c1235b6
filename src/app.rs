//! Application state shared by the tray and the command line front ends.

use crate::catalog::{CatalogError, ServiceCatalog};
use crate::clock::Clock;
use crate::config::ConfigStore;
use crate::entry::OtpEntry;
use crate::icons::IconTheme;
use crate::menu::MenuAction;
use crate::otp::seconds_until_rotation;
use crate::prompt::Prompter;
use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Upper bound on catalog load attempts during start-up, across passphrase
/// retries and file reselection.
pub const MAX_INIT_ATTEMPTS: usize = 5;

/// Codes with less validity left than this are not copied.
pub const COPY_SAFETY_MARGIN: f64 = 5.0;

/// Slack added when waiting out a rotation so the wait ends past the boundary.
const ROTATION_SLACK: Duration = Duration::from_millis(100);

/// What the front end has to do after a settings action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    Rebuild,
    /// Rebuild and reload the tray icon.
    ReloadIcon,
    /// Start a fresh process and shut this one down.
    Relaunch,
    Nothing,
}

pub struct AppContext<C, P> {
    pub config: ConfigStore,
    pub entries: Vec<OtpEntry>,
    catalog: C,
    prompter: P,
}

impl<C: ServiceCatalog, P: Prompter> AppContext<C, P> {
    pub fn new(config: ConfigStore, catalog: C, prompter: P) -> Self {
        Self {
            config,
            entries: Vec::new(),
            catalog,
            prompter,
        }
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    /// Loads the entries, asking the user for a file or passphrase as needed.
    ///
    /// Cancelling any prompt, or running out of attempts, leaves the context
    /// with no entries rather than failing.
    pub fn initialize(&mut self) -> anyhow::Result<()> {
        self.entries = self.load_entries()?.unwrap_or_default();
        info!("{} entries available", self.entries.len());
        Ok(())
    }

    /// Loads the configured backup without touching the config or asking
    /// for a file. Only a passphrase may be prompted for; every other
    /// failure is returned.
    pub fn load_configured(&mut self) -> anyhow::Result<()> {
        let path = PathBuf::from(&self.config.prefs().backup_path);
        let mut passphrase = self.config.prefs().default_passphrase.clone();

        for attempt in 1..=MAX_INIT_ATTEMPTS {
            match self.catalog.load(&path, passphrase.as_deref()) {
                Ok(entries) => {
                    self.entries = entries;
                    return Ok(());
                }
                Err(e) if e.wants_passphrase() => {
                    warn!("attempt {attempt}: {e}");
                    let retry = attempt > 1 || matches!(e, CatalogError::InvalidPassphrase);
                    match self.prompter.ask_passphrase(retry) {
                        Some(pw) => passphrase = Some(pw),
                        None => anyhow::bail!("no passphrase given for {}", path.display()),
                    }
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("cannot load {}", path.display()));
                }
            }
        }
        anyhow::bail!("giving up on {} after {MAX_INIT_ATTEMPTS} attempts", path.display())
    }

    fn load_entries(&mut self) -> anyhow::Result<Option<Vec<OtpEntry>>> {
        let mut passphrase = self.config.prefs().default_passphrase.clone();
        let mut retry = false;

        for attempt in 1..=MAX_INIT_ATTEMPTS {
            let Some(path) = self.backup_path()? else {
                info!("no backup file selected");
                return Ok(None);
            };

            match self.catalog.load(&path, passphrase.as_deref()) {
                Ok(entries) => return Ok(Some(entries)),
                Err(e) if e.wants_passphrase() => {
                    warn!("attempt {attempt}: {e}");
                    let wrong = matches!(e, CatalogError::InvalidPassphrase);
                    match self.prompter.ask_passphrase(retry || wrong) {
                        Some(pw) => passphrase = Some(pw),
                        None => return Ok(None),
                    }
                    retry = true;
                }
                Err(e) => {
                    warn!("attempt {attempt}: {e}, asking for another file");
                    self.prompter
                        .alert(&format!("Cannot use {}: {e}", path.display()));
                    self.config.update(|p| p.backup_path.clear())?;
                    passphrase = self.config.prefs().default_passphrase.clone();
                    retry = false;
                }
            }
        }

        warn!("giving up after {MAX_INIT_ATTEMPTS} attempts");
        Ok(None)
    }

    /// The configured backup path, asking for one if none is set.
    fn backup_path(&mut self) -> anyhow::Result<Option<PathBuf>> {
        let current = &self.config.prefs().backup_path;
        if !current.is_empty() {
            return Ok(Some(PathBuf::from(current)));
        }

        let Some(picked) = self.prompter.pick_backup_file() else {
            return Ok(None);
        };
        let picked_str = picked.to_string_lossy().into_owned();
        self.config
            .update(|p| p.backup_path = picked_str)
            .context("cannot save selected backup file")?;
        Ok(Some(picked))
    }

    /// Applies a settings menu action and persists it.
    pub fn apply_settings(&mut self, action: MenuAction) -> anyhow::Result<Followup> {
        match action {
            MenuAction::SetIcon(theme) => {
                self.config.update(|p| p.icon = theme)?;
                Ok(Followup::ReloadIcon)
            }
            MenuAction::ChangeBackupFile => {
                self.config.update(|p| p.backup_path.clear())?;
                Ok(Followup::Relaunch)
            }
            MenuAction::SetDefaultPassphrase => match self.prompter.ask_passphrase(false) {
                Some(pw) => {
                    self.config.update(|p| p.default_passphrase = Some(pw))?;
                    Ok(Followup::Rebuild)
                }
                None => Ok(Followup::Nothing),
            },
            MenuAction::ClearDefaultPassphrase => {
                self.config.update(|p| p.default_passphrase = None)?;
                Ok(Followup::Rebuild)
            }
            MenuAction::Copy(_) | MenuAction::Exit => Ok(Followup::Nothing),
        }
    }

    /// Records the theme actually in use when its asset was missing.
    pub fn settle_icon(&mut self, used: IconTheme) -> anyhow::Result<()> {
        if self.config.prefs().icon != used {
            self.config.update(|p| p.icon = used)?;
        }
        Ok(())
    }
}

/// Generates the code for `entry` and hands it to `copy`.
///
/// When the code is about to rotate, tells the user to wait, sleeps past the
/// boundary and copies the fresh code instead. Returns the copied code.
pub fn copy_entry_code(
    entry: &OtpEntry,
    clock: &dyn Clock,
    notify: &mut dyn FnMut(&str),
    copy: &dyn Fn(&str) -> anyhow::Result<()>,
) -> anyhow::Result<String> {
    let name = entry.display_name();

    if !entry.is_counter_based() {
        let left = seconds_until_rotation(clock.now(), entry.period());
        if left < COPY_SAFETY_MARGIN {
            info!("code for {name} rotates in {left:.2}s, waiting");
            notify("Wait ... Hold up");
            clock.sleep(Duration::from_secs_f64(left) + ROTATION_SLACK);
        }
    }

    let code = entry
        .generate_at(clock.now())
        .with_context(|| format!("cannot generate code for {name}"))?;
    copy(&code)?;
    info!("copied code for {name}");
    notify(&format!("Copied {code} for {name}"));
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::FakeClock;
    use crate::prompt::testing::ScriptedPrompter;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::Path;

    /// Catalog that replays results and records the arguments it saw.
    #[derive(Default)]
    struct FakeCatalog {
        results: RefCell<VecDeque<Result<Vec<OtpEntry>, CatalogError>>>,
        calls: RefCell<Vec<(PathBuf, Option<String>)>>,
    }

    impl FakeCatalog {
        fn returning(results: impl IntoIterator<Item = Result<Vec<OtpEntry>, CatalogError>>) -> Self {
            Self {
                results: RefCell::new(results.into_iter().collect()),
                calls: RefCell::default(),
            }
        }
    }

    impl ServiceCatalog for &FakeCatalog {
        fn load(&self, path: &Path, passphrase: Option<&str>) -> Result<Vec<OtpEntry>, CatalogError> {
            self.calls
                .borrow_mut()
                .push((path.to_path_buf(), passphrase.map(str::to_string)));
            self.results
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Err(CatalogError::Malformed("exhausted".to_string())))
        }
    }

    fn entries() -> Vec<OtpEntry> {
        vec![OtpEntry::new("GitHub", "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ")]
    }

    fn store_with_path(dir: &Path, backup: &str) -> ConfigStore {
        let mut store = ConfigStore::load(dir.join("test.conf")).unwrap();
        store.update(|p| p.backup_path = backup.to_string()).unwrap();
        store
    }

    #[test]
    fn loads_configured_file_with_default_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_path(dir.path(), "/b.2fas");
        store
            .update(|p| p.default_passphrase = Some("pw".to_string()))
            .unwrap();
        let catalog = FakeCatalog::returning([Ok(entries())]);
        let mut app = AppContext::new(store, &catalog, ScriptedPrompter::default());

        app.initialize().unwrap();

        assert_eq!(app.entries.len(), 1);
        assert_eq!(
            *catalog.calls.borrow(),
            vec![(PathBuf::from("/b.2fas"), Some("pw".to_string()))]
        );
    }

    #[test]
    fn wrong_passphrase_reprompts_until_it_works() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::returning([
            Err(CatalogError::PassphraseRequired),
            Err(CatalogError::InvalidPassphrase),
            Ok(entries()),
        ]);
        let prompter = ScriptedPrompter::default().with_passphrases([Some("typo"), Some("right")]);
        let mut app = AppContext::new(store_with_path(dir.path(), "/b.2fas"), &catalog, prompter);

        app.initialize().unwrap();

        assert_eq!(app.entries.len(), 1);
        let passphrases: Vec<_> = catalog.calls.borrow().iter().map(|c| c.1.clone()).collect();
        assert_eq!(
            passphrases,
            vec![None, Some("typo".to_string()), Some("right".to_string())]
        );
        assert_eq!(*app.prompter().passphrase_retries.borrow(), vec![false, true]);
    }

    #[test]
    fn cancelled_passphrase_leaves_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::returning([Err(CatalogError::PassphraseRequired)]);
        let prompter = ScriptedPrompter::default().with_passphrases([None]);
        let mut app = AppContext::new(store_with_path(dir.path(), "/b.2fas"), &catalog, prompter);

        app.initialize().unwrap();

        assert!(app.entries.is_empty());
        assert_eq!(catalog.calls.borrow().len(), 1);
    }

    #[test]
    fn malformed_file_clears_path_and_asks_for_another() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::returning([
            Err(CatalogError::Malformed("not json".to_string())),
            Ok(entries()),
        ]);
        let prompter =
            ScriptedPrompter::default().with_files([Some(PathBuf::from("/good.2fas"))]);
        let mut app = AppContext::new(store_with_path(dir.path(), "/bad.2fas"), &catalog, prompter);

        app.initialize().unwrap();

        assert_eq!(app.entries.len(), 1);
        assert_eq!(app.config.prefs().backup_path, "/good.2fas");
        assert_eq!(app.prompter().alerts.borrow().len(), 1);
        let reloaded = ConfigStore::load(app.config.path()).unwrap();
        assert_eq!(reloaded.prefs().backup_path, "/good.2fas");
    }

    #[test]
    fn cancelled_file_picker_leaves_no_entries() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::default();
        let prompter = ScriptedPrompter::default().with_files([None]);
        let store = ConfigStore::load(dir.path().join("test.conf")).unwrap();
        let mut app = AppContext::new(store, &catalog, prompter);

        app.initialize().unwrap();

        assert!(app.entries.is_empty());
        assert!(catalog.calls.borrow().is_empty());
    }

    #[test]
    fn retries_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        // Every load fails structurally and the user keeps picking files.
        let catalog = FakeCatalog::default();
        let files = (0..20).map(|i| Some(PathBuf::from(format!("/f{i}"))));
        let prompter = ScriptedPrompter::default().with_files(files);
        let mut app = AppContext::new(store_with_path(dir.path(), "/bad"), &catalog, prompter);

        app.initialize().unwrap();

        assert!(app.entries.is_empty());
        assert_eq!(catalog.calls.borrow().len(), MAX_INIT_ATTEMPTS);
    }

    #[test]
    fn configured_load_leaves_config_alone_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let catalog =
            FakeCatalog::returning([Err(CatalogError::Malformed("not json".to_string()))]);
        let prompter =
            ScriptedPrompter::default().with_files([Some(PathBuf::from("/other.2fas"))]);
        let mut app = AppContext::new(store_with_path(dir.path(), "/b.2fas"), &catalog, prompter);
        let before = std::fs::read_to_string(app.config.path()).unwrap();

        assert!(app.load_configured().is_err());

        assert_eq!(app.config.prefs().backup_path, "/b.2fas");
        assert_eq!(std::fs::read_to_string(app.config.path()).unwrap(), before);
        assert_eq!(app.prompter().files.borrow().len(), 1);
        assert!(app.prompter().alerts.borrow().is_empty());
    }

    #[test]
    fn configured_load_reprompts_for_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::returning([
            Err(CatalogError::PassphraseRequired),
            Err(CatalogError::InvalidPassphrase),
            Ok(entries()),
        ]);
        let prompter = ScriptedPrompter::default().with_passphrases([Some("typo"), Some("right")]);
        let mut app = AppContext::new(store_with_path(dir.path(), "/b.2fas"), &catalog, prompter);

        app.load_configured().unwrap();

        assert_eq!(app.entries.len(), 1);
        assert_eq!(*app.prompter().passphrase_retries.borrow(), vec![false, true]);
    }

    #[test]
    fn configured_load_fails_when_passphrase_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::returning([Err(CatalogError::PassphraseRequired)]);
        let prompter = ScriptedPrompter::default().with_passphrases([None]);
        let mut app = AppContext::new(store_with_path(dir.path(), "/b.2fas"), &catalog, prompter);

        assert!(app.load_configured().is_err());
        assert!(app.entries.is_empty());
    }

    #[test]
    fn settings_actions_persist() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::default();
        let prompter = ScriptedPrompter::default().with_passphrases([Some("pw"), None]);
        let mut app = AppContext::new(store_with_path(dir.path(), "/b.2fas"), &catalog, prompter);

        assert_eq!(
            app.apply_settings(MenuAction::SetIcon(IconTheme::White)).unwrap(),
            Followup::ReloadIcon
        );
        assert_eq!(
            app.apply_settings(MenuAction::SetDefaultPassphrase).unwrap(),
            Followup::Rebuild
        );
        assert_eq!(
            app.apply_settings(MenuAction::SetDefaultPassphrase).unwrap(),
            Followup::Nothing
        );

        let saved = ConfigStore::load(app.config.path()).unwrap();
        assert_eq!(saved.prefs().icon, IconTheme::White);
        assert_eq!(saved.prefs().default_passphrase.as_deref(), Some("pw"));

        assert_eq!(
            app.apply_settings(MenuAction::ClearDefaultPassphrase).unwrap(),
            Followup::Rebuild
        );
        assert_eq!(
            app.apply_settings(MenuAction::ChangeBackupFile).unwrap(),
            Followup::Relaunch
        );
        let saved = ConfigStore::load(app.config.path()).unwrap();
        assert_eq!(saved.prefs().default_passphrase, None);
        assert_eq!(saved.prefs().backup_path, "");
    }

    #[test]
    fn settle_icon_persists_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FakeCatalog::default();
        let mut store = store_with_path(dir.path(), "/b.2fas");
        store.update(|p| p.icon = IconTheme::Black).unwrap();
        let mut app = AppContext::new(store, &catalog, ScriptedPrompter::default());

        app.settle_icon(IconTheme::Color).unwrap();

        let saved = ConfigStore::load(app.config.path()).unwrap();
        assert_eq!(saved.prefs().icon, IconTheme::Color);
    }

    fn copy_at(ms: i64) -> (String, FakeClock, Vec<String>) {
        let clock = FakeClock::at_millis(ms);
        let entry = entries().remove(0);
        let mut notices = Vec::new();
        let copied = RefCell::new(Vec::new());

        let code = copy_entry_code(
            &entry,
            &clock,
            &mut |msg: &str| notices.push(msg.to_string()),
            &|code: &str| {
                copied.borrow_mut().push(code.to_string());
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(*copied.borrow(), vec![code.clone()]);
        (code, clock, notices)
    }

    #[test]
    fn copies_immediately_with_time_to_spare() {
        let (code, clock, notices) = copy_at(1_000_010_000);

        assert_eq!(clock.slept.get(), Duration::ZERO);
        assert_eq!(notices, vec![format!("Copied {code} for GitHub")]);
    }

    #[test]
    fn waits_out_rotation_when_three_seconds_remain() {
        // 1_000_000_020 is a window start, so 27s in leaves 3s.
        let (code, clock, notices) = copy_at(1_000_000_047_000);

        let generated_at = clock.now().unix_timestamp() % 30;
        assert!(generated_at <= 25, "generated {generated_at}s into the window");
        assert!(clock.slept.get() >= Duration::from_secs(3));
        assert_eq!(notices[0], "Wait ... Hold up");

        let fresh = entries()[0]
            .generate_at(time::OffsetDateTime::from_unix_timestamp(1_000_000_050).unwrap())
            .unwrap();
        assert_eq!(code, fresh);
    }

    #[test]
    fn counter_based_codes_copy_without_waiting() {
        let clock = FakeClock::at_millis(1_000_000_047_000);
        let mut entry = entries().remove(0);
        entry.otp.token_type = "HOTP".to_string();
        entry.otp.counter = Some(1);
        let mut notices = Vec::new();

        let code = copy_entry_code(
            &entry,
            &clock,
            &mut |msg: &str| notices.push(msg.to_string()),
            &|_: &str| Ok(()),
        )
        .unwrap();

        assert_eq!(clock.slept.get(), Duration::ZERO);
        assert_eq!(notices, vec![format!("Copied {code} for GitHub")]);
    }

    #[test]
    fn copy_failure_propagates() {
        let clock = FakeClock::at_millis(0);
        let entry = entries().remove(0);
        let mut notices = Vec::new();

        let result = copy_entry_code(
            &entry,
            &clock,
            &mut |msg: &str| notices.push(msg.to_string()),
            &|_: &str| Err(anyhow::anyhow!("no clipboard")),
        );

        assert!(result.is_err());
        assert!(notices.is_empty());
    }
}
