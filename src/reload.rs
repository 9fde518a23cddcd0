//! Live-reload event hub
//!
//! A broadcast channel between the build side (tasks, watch loop) and the
//! dev server's connected browser clients. Styles push [`ReloadEvent::CssUpdate`]
//! so stylesheets swap in place without a page load; everything else gets a
//! full [`ReloadEvent::Reload`].

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events pushed to connected browser clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadEvent {
    /// Reload the whole page
    Reload,
    /// Re-fetch stylesheets in place
    CssUpdate,
}

impl ReloadEvent {
    /// SSE event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            ReloadEvent::Reload => "reload",
            ReloadEvent::CssUpdate => "css_update",
        }
    }
}

/// Handle for pushing reload events; cheap to clone, one per task context
/// and one inside the server.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    tx: broadcast::Sender<ReloadEvent>,
}

impl ReloadHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    /// Push an event; with no connected clients this is a no-op.
    pub fn send(&self, event: ReloadEvent) {
        let _ = self.tx.send(event);
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Client-side listener injected into served HTML pages.
pub const CLIENT_SNIPPET: &str = r#"<script>
(function () {
  var source = new EventSource("/__livereload");
  source.addEventListener("reload", function () { location.reload(); });
  source.addEventListener("css_update", function () {
    var links = document.querySelectorAll("link[rel=stylesheet]");
    for (var i = 0; i < links.length; i++) {
      var href = links[i].getAttribute("href").split("?")[0];
      links[i].setAttribute("href", href + "?t=" + Date.now());
    }
  });
})();
</script>"#;

/// Insert the live-reload client before `</body>`, or append when the page
/// has no body close tag.
pub fn inject_client(html: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + CLIENT_SNIPPET.len() + 1);
            out.push_str(&html[..pos]);
            out.push_str(CLIENT_SNIPPET);
            out.push('\n');
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{html}\n{CLIENT_SNIPPET}\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.send(ReloadEvent::CssUpdate);
        assert_eq!(rx.recv().await.unwrap(), ReloadEvent::CssUpdate);
    }

    #[test]
    fn test_send_without_clients_is_noop() {
        let hub = ReloadHub::new();
        assert_eq!(hub.client_count(), 0);
        hub.send(ReloadEvent::Reload);
    }

    #[test]
    fn test_inject_before_body_close() {
        let html = "<html><body><p>hi</p></body></html>";
        let injected = inject_client(html);

        assert!(injected.contains("EventSource"));
        let script_at = injected.find("<script>").unwrap();
        let body_close = injected.find("</body>").unwrap();
        assert!(script_at < body_close);
    }

    #[test]
    fn test_inject_without_body_appends() {
        let injected = inject_client("<p>fragment</p>");
        assert!(injected.starts_with("<p>fragment</p>"));
        assert!(injected.contains("EventSource"));
    }

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_string(&ReloadEvent::CssUpdate).unwrap();
        assert_eq!(json, r#"{"type":"css_update"}"#);
    }
}
