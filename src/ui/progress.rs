use std::io::Write;
use std::time::Duration;

use tokio::task::JoinHandle;

const SPINNER_FRAMES: [&str; 4] = ["|", "/", "-", "\\"];
const SPINNER_INTERVAL: Duration = Duration::from_millis(120);

/// Spinner on stderr while a request is in flight. Stops when dropped.
pub struct LoadingIndicator {
    task_handle: Option<JoinHandle<()>>,
    animated: bool,
}

impl Drop for LoadingIndicator {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
        if self.animated {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "\r\x1b[2K");
            let _ = stderr.flush();
        }
    }
}

/// Without a terminal the message is printed once instead of animated.
pub fn start_loading_indicator(message: &'static str, animated: bool) -> LoadingIndicator {
    if !animated {
        eprintln!("{message}");
        return LoadingIndicator {
            task_handle: None,
            animated,
        };
    }

    let task_handle = tokio::spawn(async move {
        for frame in SPINNER_FRAMES.iter().cycle() {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "\r{frame} {message}");
            let _ = stderr.flush();
            tokio::time::sleep(SPINNER_INTERVAL).await;
        }
    });

    LoadingIndicator {
        task_handle: Some(task_handle),
        animated,
    }
}
