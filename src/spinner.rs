//! A small "still working" indicator shown while waiting on the model.

use colored::Colorize;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::console::Console;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const INTERVAL: Duration = Duration::from_millis(100);

/// A running spinner. Created by [`Spinner::start`], ended by [`Spinner::stop`].
///
/// The task owns the status line: it draws a frame per tick and erases the line as its last
/// write. Dropping a `Spinner` without calling `stop` also ends the task, but without
/// waiting for it.
pub struct Spinner {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Spinner {
    pub fn start(console: Console, message: &str) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let message = message.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(INTERVAL);
            for frame in FRAMES.iter().cycle() {
                tokio::select! {
                    biased;
                    // a send or a dropped sender both mean stop
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        console.status(format!("{} {}", frame, message).magenta().bold());
                    }
                }
            }
            console.clear_status();
        });

        Spinner { stop_tx, handle }
    }

    /// Signals the spinner and waits for its task to finish. Nothing is written by the
    /// spinner once this returns.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        if let Err(e) = self.handle.await {
            warn!("spinner task failed: {}", e);
        }
    }
}
