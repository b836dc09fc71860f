//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// Full page reload
    Reload,

    /// Swap a stylesheet in place without reloading the page
    InjectCss {
        /// URL path of the stylesheet (e.g. "/css/style.css")
        path: String,
    },
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    /// Create a new reload hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers just means no browser is open.
        let _ = self.sender.send(msg);
    }

    /// Tell every client to reload.
    pub fn reload(&self) {
        tracing::info!("Reloading browsers");
        self.send(ReloadMessage::Reload);
    }

    /// Tell every client to refresh one stylesheet.
    pub fn inject_css(&self, path: impl Into<String>) {
        let path = path.into();
        tracing::info!("Injecting {}", path);
        self.send(ReloadMessage::InjectCss { path });
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate the client-side reload script.
///
/// The script connects back to `ws_path` on whatever host served the page.
pub fn reload_client_script(ws_path: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const url = (location.protocol === 'https:' ? 'wss://' : 'ws://') + location.host + '{}';
  let reconnectAttempts = 0;
  const maxReconnectAttempts = 10;

  function refreshStylesheet(path) {{
    let matched = false;
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
      const href = new URL(link.href, location.href);
      if (href.pathname === path) {{
        href.searchParams.set('kiln', Date.now());
        link.href = href.toString();
        matched = true;
      }}
    }});
    return matched;
  }}

  function connect() {{
    const ws = new WebSocket(url);

    ws.onopen = function() {{
      console.log('[kiln] Connected');
      reconnectAttempts = 0;
    }};

    ws.onmessage = function(event) {{
      const msg = JSON.parse(event.data);

      switch (msg.type) {{
        case 'reload':
          location.reload();
          break;

        case 'inject_css':
          refreshStylesheet(msg.path);
          break;

        case 'connected':
          console.log('[kiln] Live reload active');
          break;
      }}
    }};

    ws.onclose = function() {{
      if (reconnectAttempts < maxReconnectAttempts) {{
        reconnectAttempts++;
        setTimeout(connect, 1000 * reconnectAttempts);
      }}
    }};

    ws.onerror = function(e) {{
      console.error('[kiln] WebSocket error:', e);
    }};
  }}

  connect();
}})();
"#,
        ws_path
    )
}
