use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// "Thinking" indicator driven by its own task.
///
/// `stop` cancels the task and waits for it, so the line is cleared before anything else prints.
/// Nothing is drawn when stdout is not a terminal.
pub struct Spinner {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl Spinner {
    pub fn start(message: &str) -> Result<Self> {
        let bar = if std::io::stdout().is_terminal() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈")
                .template("{spinner:.cyan} {msg}")?,
        );
        bar.set_message(format!("{}...", message));

        let stop = CancellationToken::new();
        let token = stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => bar.tick(),
                }
            }
            bar.finish_and_clear();
        });

        Ok(Self { stop, handle })
    }

    pub async fn stop(self) {
        self.stop.cancel();
        let _ = self.handle.await;
    }
}
