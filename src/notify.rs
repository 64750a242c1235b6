use tracing::{debug, warn};

pub const APP_NAME: &str = "2FAS Tray";

/// Something that can put a transient message on screen.
pub trait Notifier {
    fn show(&mut self, title: &str, body: &str) -> anyhow::Result<()>;
    /// Removes the message currently on screen, if the platform allows it.
    fn dismiss(&mut self);
}

/// Keeps at most one notification visible: a new one replaces the last.
pub struct Notices<N> {
    backend: N,
    showing: bool,
    closed: bool,
}

impl<N: Notifier> Notices<N> {
    pub fn new(backend: N) -> Self {
        Self {
            backend,
            showing: false,
            closed: false,
        }
    }

    pub fn notify(&mut self, message: &str) {
        if self.closed {
            return;
        }
        self.dismiss();
        match self.backend.show(APP_NAME, message) {
            Ok(()) => self.showing = true,
            Err(e) => warn!("cannot show notification: {e:#}"),
        }
    }

    pub fn dismiss(&mut self) {
        if self.showing {
            self.backend.dismiss();
            self.showing = false;
        }
    }

    /// Dismisses what is showing and drops every later message.
    pub fn close(&mut self) {
        self.dismiss();
        self.closed = true;
    }
}

/// Desktop notifications through notify-rust.
#[derive(Default)]
pub struct DesktopNotifier {
    #[cfg(all(unix, not(target_os = "macos")))]
    current: Option<notify_rust::NotificationHandle>,
}

impl Notifier for DesktopNotifier {
    #[cfg(all(unix, not(target_os = "macos")))]
    fn show(&mut self, title: &str, body: &str) -> anyhow::Result<()> {
        let handle = notify_rust::Notification::new()
            .appname(APP_NAME)
            .summary(title)
            .body(body)
            .show()?;
        self.current = Some(handle);
        Ok(())
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    fn show(&mut self, title: &str, body: &str) -> anyhow::Result<()> {
        notify_rust::Notification::new()
            .appname(APP_NAME)
            .summary(title)
            .body(body)
            .show()
            .map(drop)?;
        Ok(())
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    fn dismiss(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.close();
        }
    }

    // Toasts on Windows and macOS expire on their own.
    #[cfg(not(all(unix, not(target_os = "macos"))))]
    fn dismiss(&mut self) {}
}

/// Writes notices to stderr, for the command line subcommands.
#[derive(Default)]
pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn show(&mut self, _title: &str, body: &str) -> anyhow::Result<()> {
        eprintln!("{body}");
        Ok(())
    }

    fn dismiss(&mut self) {
        debug!("stderr notice dismissed");
    }
}
