//! Live reload: a generation counter long-polled by injected page script.

use crate::watch::ReloadSignal;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::debug;

/// Route polled by the page script.
pub const RELOAD_PATH: &str = "/__assetflow/reload";

/// How long a poll waits for a change before answering anyway.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Script injected into HTML responses.
///
/// The page reloads when the generation moves past the one it first saw, or
/// when the epoch changes because the server restarted.
pub const RELOAD_SCRIPT: &str = r#"<script>
(function () {
  var epoch = null, since = null;
  function poll() {
    var url = '/__assetflow/reload' + (since === null ? '' : '?since=' + since);
    fetch(url, { cache: 'no-store' })
      .then(function (r) { return r.json(); })
      .then(function (s) {
        if (epoch !== null && (s.epoch !== epoch || s.generation !== since)) {
          location.reload();
          return;
        }
        epoch = s.epoch;
        since = s.generation;
        poll();
      })
      .catch(function () { setTimeout(poll, 1000); });
  }
  poll();
})();
</script>
"#;

/// Shared reload state. Cloning shares the counter.
#[derive(Debug, Clone)]
pub struct Reloader {
    epoch: u64,
    tx: Arc<watch::Sender<u64>>,
}

impl Default for Reloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Reloader {
    /// Start at generation 0 with an epoch taken from the clock.
    pub fn new() -> Self {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let (tx, _) = watch::channel(0);
        Self { epoch, tx: Arc::new(tx) }
    }

    /// Identifies this server process.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of reloads sent so far.
    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }

    fn state(&self) -> PollResponse {
        PollResponse { epoch: self.epoch, generation: self.generation() }
    }

    /// Wait until the generation differs from `since`, or until `timeout`.
    pub async fn wait_for_change(&self, since: u64, timeout: Duration) -> PollResponse {
        let mut rx = self.tx.subscribe();
        if *rx.borrow_and_update() != since {
            return self.state();
        }
        let _ = tokio::time::timeout(timeout, rx.changed()).await;
        self.state()
    }
}

impl ReloadSignal for Reloader {
    fn reload(&self) {
        self.tx.send_modify(|generation| *generation += 1);
        debug!(generation = self.generation(), "reload requested");
    }
}

/// Query of a reload poll.
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Generation the page last saw; absent on the first poll
    pub since: Option<u64>,
}

/// Body of a reload poll answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollResponse {
    pub epoch: u64,
    pub generation: u64,
}

/// `GET /__assetflow/reload[?since=N]`
pub async fn poll(State(reloader): State<Reloader>, Query(query): Query<PollQuery>) -> Json<PollResponse> {
    match query.since {
        Some(since) => Json(reloader.wait_for_change(since, POLL_TIMEOUT).await),
        None => Json(reloader.state()),
    }
}

/// Insert the reload script before the last `</body>`, or append it.
pub fn inject_script(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    match lower.rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], RELOAD_SCRIPT, &html[at..]),
        None => format!("{}{}", html, RELOAD_SCRIPT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_before_closing_body() {
        let html = "<html><body><p>hi</p></BODY></html>";
        let injected = inject_script(html);
        assert!(injected.starts_with("<html><body><p>hi</p><script>"));
        assert!(injected.ends_with("</script>\n</BODY></html>"));
    }

    #[test]
    fn test_inject_without_body_appends() {
        let injected = inject_script("<p>fragment</p>");
        assert!(injected.starts_with("<p>fragment</p><script>"));
    }

    #[test]
    fn test_reload_bumps_generation_for_clones() {
        let reloader = Reloader::new();
        let clone = reloader.clone();
        assert_eq!(reloader.generation(), 0);

        clone.reload();
        clone.reload();
        assert_eq!(reloader.generation(), 2);
        assert_eq!(reloader.epoch(), clone.epoch());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_behind() {
        let reloader = Reloader::new();
        reloader.reload();

        let state = reloader.wait_for_change(0, Duration::from_secs(5)).await;
        assert_eq!(state.generation, 1);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_change() {
        let reloader = Reloader::new();
        let state = reloader.wait_for_change(0, Duration::from_millis(20)).await;
        assert_eq!(state, PollResponse { epoch: reloader.epoch(), generation: 0 });
    }

    #[tokio::test]
    async fn test_wait_wakes_on_reload() {
        let reloader = Reloader::new();
        let waiter = reloader.clone();
        let handle =
            tokio::spawn(async move { waiter.wait_for_change(0, Duration::from_secs(5)).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        reloader.reload();
        let state = handle.await.unwrap();
        assert_eq!(state.generation, 1);
    }
}
