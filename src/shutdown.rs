use std::time::Duration;
use tracing::{error, warn};

/// How long each stage waits before escalating.
pub const GRACE_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `std::process::exit`: runs no destructors but flushes stdio.
    Exit,
    /// `std::process::abort`: used if even `exit` hangs.
    Abort,
}

/// Arms a watchdog that forces the process down if the polite exit through
/// the event loop has not finished within `grace`.
pub fn arm_watchdog(grace: Duration) {
    arm_with(grace, |stage| match stage {
        Stage::Exit => std::process::exit(0),
        Stage::Abort => std::process::abort(),
    });
}

fn arm_with<F>(grace: Duration, act: F)
where
    F: Fn(Stage) + Send + Sync + Clone + 'static,
{
    let spawned = std::thread::Builder::new()
        .name("shutdown-watchdog".to_string())
        .spawn(move || {
            std::thread::sleep(grace);
            warn!("still running {grace:?} after shutdown, forcing exit");

            let last_resort = act.clone();
            let _ = std::thread::Builder::new()
                .name("shutdown-abort".to_string())
                .spawn(move || {
                    std::thread::sleep(grace);
                    error!("forced exit hung, aborting");
                    last_resort(Stage::Abort);
                });

            act(Stage::Exit);
        });

    if let Err(e) = spawned {
        error!("cannot start shutdown watchdog: {e}");
    }
}
