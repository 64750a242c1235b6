#[cfg(target_os = "linux")]
use anyhow::Context;
use anyhow::{Result, anyhow};
#[cfg(target_os = "linux")]
use std::process::{Command, Stdio};
#[cfg(target_os = "linux")]
use tracing::debug;

#[cfg(not(target_os = "linux"))]
use copypasta::{ClipboardContext, ClipboardProvider};

/// Linux: wl-copy (Wayland) or xclip/xsel (X11).
///
/// The helpers keep serving the selection after we return, which an
/// in-process clipboard cannot do once the owning window goes away.
#[cfg(target_os = "linux")]
pub fn copy_to_clipboard(value: &str) -> Result<()> {
    let has_wayland = std::env::var("WAYLAND_DISPLAY").is_ok();
    let has_x11 = std::env::var("DISPLAY").is_ok();

    if !has_wayland && !has_x11 {
        return Err(anyhow!(
            "No GUI clipboard detected (no DISPLAY or WAYLAND_DISPLAY)."
        ));
    }

    let mut candidates: Vec<(&str, &[&str])> = Vec::new();
    if has_wayland {
        candidates.push(("wl-copy", &[]));
    }
    if has_x11 {
        candidates.push(("xclip", &["-selection", "clipboard"]));
        candidates.push(("xsel", &["--clipboard", "--input"]));
    }

    for (cmd, args) in candidates {
        match try_pipe_to(cmd, args, value) {
            Ok(()) => return Ok(()),
            Err(e) => debug!("{e:#}"),
        }
    }

    Err(anyhow!(
        "Failed to copy to clipboard: wl-copy/xclip/xsel not available or failed. \
         Install `wl-clipboard` or `xclip`."
    ))
}

/// Feeds `value` to a helper on stdin and waits for it to take ownership.
#[cfg(target_os = "linux")]
fn try_pipe_to(cmd: &str, args: &[&str], value: &str) -> Result<()> {
    use std::io::Write;

    let mut child = Command::new(cmd)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("{cmd} not available"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(value.as_bytes())
            .with_context(|| format!("cannot write to {cmd}"))?;
    }

    match child.wait()? {
        status if status.success() => Ok(()),
        status => Err(anyhow!("{cmd} exited with {status}")),
    }
}

#[cfg(not(target_os = "linux"))]
pub fn copy_to_clipboard(value: &str) -> Result<()> {
    let mut ctx = ClipboardContext::new().map_err(|e| anyhow!("clipboard unavailable: {e}"))?;
    ctx.set_contents(value.to_owned())
        .map_err(|e| anyhow!("cannot copy to clipboard: {e}"))
}
