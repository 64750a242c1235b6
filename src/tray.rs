//! System tray front end.
//!
//! Everything that touches tray objects runs on the event loop thread. The
//! refresh scheduler and the copy worker only post [`UserEvent`]s.

use crate::app::{copy_entry_code, AppContext, Followup};
use crate::catalog::TwoFasCatalog;
use crate::clipboard::copy_to_clipboard;
use crate::clock::SystemClock;
use crate::config::ConfigStore;
use crate::icons::{self, IconImage};
use crate::menu::{build_menu, MenuAction, MenuNode};
use crate::notify::{DesktopNotifier, Notices, APP_NAME};
use crate::prompt::DialogPrompter;
use crate::scheduler::RefreshScheduler;
use crate::shutdown::{self, GRACE_PERIOD};
use anyhow::{anyhow, Context, Result};
use std::process::Command;
use tao::event::{Event, StartCause};
use tao::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy};
use tray_icon::menu::{
    CheckMenuItem, IsMenuItem, Menu, MenuEvent, MenuItem, PredefinedMenuItem, Submenu,
};
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

#[cfg(target_os = "macos")]
use tao::platform::macos::{ActivationPolicy, EventLoopExtMacOS};

#[cfg(target_os = "macos")]
const TRAY_ACTIVATION_POLICY: ActivationPolicy = ActivationPolicy::Accessory;

#[derive(Debug)]
pub enum UserEvent {
    Menu(MenuEvent),
    Refresh,
    /// Message from the copy worker.
    Notice(String),
}

pub struct TrayController {
    app: AppContext<TwoFasCatalog, DialogPrompter>,
    tray: Option<TrayIcon>,
    scheduler: RefreshScheduler,
    notices: Notices<DesktopNotifier>,
    proxy: EventLoopProxy<UserEvent>,
    shutting_down: bool,
}

/// Loads everything and runs the tray until the user exits.
pub fn run(config: ConfigStore) -> Result<()> {
    let mut app = AppContext::new(config, TwoFasCatalog, DialogPrompter);
    app.initialize()?;

    #[allow(unused_mut)]
    let mut event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();
    // Menu bar only: no Dock icon or app switcher entry.
    #[cfg(target_os = "macos")]
    event_loop.set_activation_policy(TRAY_ACTIVATION_POLICY);
    let proxy = event_loop.create_proxy();

    MenuEvent::set_event_handler(Some({
        let proxy = proxy.clone();
        move |event| {
            let _ = proxy.send_event(UserEvent::Menu(event));
        }
    }));

    let mut controller = TrayController {
        app,
        tray: None,
        scheduler: RefreshScheduler::new(),
        notices: Notices::new(DesktopNotifier::default()),
        proxy,
        shutting_down: false,
    };

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Wait;

        match event {
            Event::NewEvents(StartCause::Init) => {
                if let Err(e) = controller.start() {
                    error!("cannot start tray: {e:#}");
                    controller.shutdown(control_flow);
                }
            }
            Event::UserEvent(UserEvent::Refresh) => {
                if let Err(e) = controller.rebuild_menu() {
                    error!("menu refresh failed: {e:#}");
                }
            }
            Event::UserEvent(UserEvent::Notice(message)) => {
                if !controller.shutting_down {
                    controller.notices.notify(&message);
                }
            }
            Event::UserEvent(UserEvent::Menu(event)) => {
                match MenuAction::from_id(event.id.0.as_str()) {
                    Some(action) => controller.on_action(action, control_flow),
                    None => debug!("ignoring menu id {}", event.id.0),
                }
            }
            _ => {}
        }
    })
}

impl TrayController {
    fn start(&mut self) -> Result<()> {
        let loaded = icons::load_icon(self.app.config.prefs().icon, &icons::asset_dirs());
        self.app.settle_icon(loaded.theme)?;

        let tray = TrayIconBuilder::new()
            .with_menu(Box::new(self.native_menu()?))
            .with_tooltip(APP_NAME)
            .with_icon(tray_image(loaded.image)?)
            .build()
            .context("cannot create tray icon")?;
        self.tray = Some(tray);
        info!("tray icon created");

        let proxy = self.proxy.clone();
        self.scheduler.start(
            self.app.config.prefs().refresh_interval_secs,
            Box::new(move || {
                proxy
                    .send_event(UserEvent::Refresh)
                    .map_err(|_| anyhow!("event loop is gone"))
            }),
        )
    }

    fn native_menu(&self) -> Result<Menu> {
        let nodes = build_menu(
            self.app.config.prefs(),
            &self.app.entries,
            OffsetDateTime::now_utc(),
        );
        let menu = Menu::new();
        for node in &nodes {
            menu.append(&*native_item(node)?)?;
        }
        Ok(menu)
    }

    /// Builds a complete new menu and swaps it in.
    fn rebuild_menu(&mut self) -> Result<()> {
        if self.shutting_down {
            return Ok(());
        }
        let menu = self.native_menu()?;
        if let Some(tray) = &self.tray {
            tray.set_menu(Some(Box::new(menu)));
        }
        Ok(())
    }

    fn on_action(&mut self, action: MenuAction, control_flow: &mut ControlFlow) {
        if self.shutting_down {
            return;
        }
        match action {
            MenuAction::Copy(idx) => self.copy_in_background(idx),
            MenuAction::Exit => self.shutdown(control_flow),
            settings => match self.app.apply_settings(settings) {
                Ok(followup) => self.follow_up(followup, control_flow),
                Err(e) => {
                    error!("cannot apply {settings:?}: {e:#}");
                    self.notices.notify(&format!("Settings not saved: {e}"));
                }
            },
        }
    }

    fn follow_up(&mut self, followup: Followup, control_flow: &mut ControlFlow) {
        let result = match followup {
            Followup::Nothing => Ok(()),
            Followup::Rebuild => self.rebuild_menu(),
            Followup::ReloadIcon => self.reload_icon().and_then(|()| self.rebuild_menu()),
            Followup::Relaunch => match relaunch() {
                Ok(()) => {
                    self.shutdown(control_flow);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };
        if let Err(e) = result {
            error!("{followup:?} failed: {e:#}");
        }
    }

    fn reload_icon(&mut self) -> Result<()> {
        let loaded = icons::load_icon(self.app.config.prefs().icon, &icons::asset_dirs());
        self.app.settle_icon(loaded.theme)?;
        if let Some(tray) = &self.tray {
            tray.set_icon(Some(tray_image(loaded.image)?))?;
        }
        info!("tray icon set to {}", loaded.theme);
        Ok(())
    }

    /// Copies on a worker thread so a wait for the next code window does
    /// not freeze the menu.
    fn copy_in_background(&self, idx: usize) {
        let Some(entry) = self.app.entries.get(idx).cloned() else {
            warn!("no entry at index {idx}");
            return;
        };
        let proxy = self.proxy.clone();

        let spawned = std::thread::Builder::new()
            .name("copy-code".to_string())
            .spawn(move || {
                let mut notify = |msg: &str| {
                    let _ = proxy.send_event(UserEvent::Notice(msg.to_string()));
                };
                if let Err(e) = copy_entry_code(&entry, &SystemClock, &mut notify, &copy_to_clipboard) {
                    error!("{e:#}");
                    notify(&format!("Copy failed: {e}"));
                }
            });
        if let Err(e) = spawned {
            error!("cannot start copy worker: {e}");
        }
    }

    /// Stops the scheduler, removes the icon and leaves the event loop. A
    /// watchdog forces the process down if that stalls.
    fn shutdown(&mut self, control_flow: &mut ControlFlow) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!("shutting down");
        shutdown::arm_watchdog(GRACE_PERIOD);

        if !self.scheduler.stop(GRACE_PERIOD) {
            warn!("refresh thread left running");
        }
        if let Some(tray) = self.tray.take() {
            if let Err(e) = tray.set_visible(false) {
                warn!("cannot hide tray icon: {e}");
            }
        }
        self.notices.close();
        *control_flow = ControlFlow::Exit;
    }
}

fn native_item(node: &MenuNode) -> Result<Box<dyn IsMenuItem>> {
    let item: Box<dyn IsMenuItem> = match node {
        MenuNode::Label(text) => Box::new(MenuItem::new(text, false, None)),
        MenuNode::Separator => Box::new(PredefinedMenuItem::separator()),
        MenuNode::Item {
            text,
            action,
            checked: None,
        } => Box::new(MenuItem::with_id(action.id(), text, true, None)),
        MenuNode::Item {
            text,
            action,
            checked: Some(checked),
        } => Box::new(CheckMenuItem::with_id(action.id(), text, true, *checked, None)),
        MenuNode::Submenu { text, children } => {
            let submenu = Submenu::new(text, true);
            for child in children {
                submenu.append(&*native_item(child)?)?;
            }
            Box::new(submenu)
        }
    };
    Ok(item)
}

fn tray_image(image: IconImage) -> Result<Icon> {
    Icon::from_rgba(image.rgba, image.width, image.height).context("invalid tray icon image")
}

/// Starts a fresh copy of this program with the same arguments.
fn relaunch() -> Result<()> {
    let exe = std::env::current_exe().context("cannot locate own executable")?;
    Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .with_context(|| format!("cannot relaunch {}", exe.display()))?;
    info!("relaunched {}", exe.display());
    Ok(())
}
