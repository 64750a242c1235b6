//! Toolkit-independent description of the tray menu.

use crate::config::Preferences;
use crate::entry::OtpEntry;
use crate::icons::IconTheme;
use crate::label;
use crate::otp::{seconds_until_rotation, DEFAULT_PERIOD};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    /// Copy the code of the entry at this index.
    Copy(usize),
    SetIcon(IconTheme),
    ChangeBackupFile,
    SetDefaultPassphrase,
    ClearDefaultPassphrase,
    Exit,
}

impl MenuAction {
    pub fn id(&self) -> String {
        match self {
            MenuAction::Copy(idx) => format!("entry:{idx}"),
            MenuAction::SetIcon(theme) => format!("icon:{theme}"),
            MenuAction::ChangeBackupFile => "settings:backup".to_string(),
            MenuAction::SetDefaultPassphrase => "settings:password:set".to_string(),
            MenuAction::ClearDefaultPassphrase => "settings:password:clear".to_string(),
            MenuAction::Exit => "exit".to_string(),
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        if let Some(idx) = id.strip_prefix("entry:") {
            return idx.parse().ok().map(MenuAction::Copy);
        }
        if let Some(theme) = id.strip_prefix("icon:") {
            return theme.parse().ok().map(MenuAction::SetIcon);
        }
        match id {
            "settings:backup" => Some(MenuAction::ChangeBackupFile),
            "settings:password:set" => Some(MenuAction::SetDefaultPassphrase),
            "settings:password:clear" => Some(MenuAction::ClearDefaultPassphrase),
            "exit" => Some(MenuAction::Exit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuNode {
    /// Disabled, informational text.
    Label(String),
    Separator,
    Item {
        text: String,
        action: MenuAction,
        /// `Some` for check items.
        checked: Option<bool>,
    },
    Submenu {
        text: String,
        children: Vec<MenuNode>,
    },
}

impl MenuNode {
    fn item(text: impl Into<String>, action: MenuAction) -> Self {
        MenuNode::Item {
            text: text.into(),
            action,
            checked: None,
        }
    }
}

pub fn countdown_label(at: OffsetDateTime) -> String {
    format!("Time left: {:.2}", seconds_until_rotation(at, DEFAULT_PERIOD))
}

/// Full menu for `entries` as of `at`.
pub fn build_menu(prefs: &Preferences, entries: &[OtpEntry], at: OffsetDateTime) -> Vec<MenuNode> {
    let mut nodes = vec![MenuNode::Label(countdown_label(at)), MenuNode::Separator];

    nodes.extend(
        entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| MenuNode::item(label::render_at(&prefs.format, entry, at), MenuAction::Copy(idx))),
    );

    nodes.push(MenuNode::Separator);
    nodes.push(settings_menu(prefs));
    nodes.push(MenuNode::Separator);
    nodes.push(MenuNode::item("Exit", MenuAction::Exit));
    nodes
}

fn settings_menu(prefs: &Preferences) -> MenuNode {
    let themes = IconTheme::ALL
        .into_iter()
        .map(|theme| MenuNode::Item {
            text: theme.title().to_string(),
            action: MenuAction::SetIcon(theme),
            checked: Some(theme == prefs.icon),
        })
        .collect();

    let mut children = vec![
        MenuNode::Submenu {
            text: "IconTray".to_string(),
            children: themes,
        },
        MenuNode::item("Set 2FAS file …", MenuAction::ChangeBackupFile),
        MenuNode::item("Set default password …", MenuAction::SetDefaultPassphrase),
    ];
    if prefs.default_passphrase.is_some() {
        children.push(MenuNode::item(
            "Forget default password",
            MenuAction::ClearDefaultPassphrase,
        ));
    }

    MenuNode::Submenu {
        text: "Settings".to_string(),
        children,
    }
}
