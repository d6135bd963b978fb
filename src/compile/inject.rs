//! Development payload injected into every compiled document.
//!
//! The payload is a floating status readout plus a client script that connects
//! to `/ws`, reloads on `reload`, shows the message on `error`, answers `ping`
//! with `pong`, and forces a full reload after reconnecting.

const MARKER: &str = "<!-- live-preview:dev -->";

const PAYLOAD: &str = r#"<!-- live-preview:dev -->
<div id="__live_preview_status" style="position:fixed;right:12px;bottom:12px;z-index:2147483647;padding:6px 10px;border-radius:6px;font:12px/1.4 ui-monospace,monospace;color:#fff;background:rgba(20,20,20,.8);pointer-events:none;max-width:40vw;white-space:pre-wrap">connecting…</div>
<script>
(() => {
  const status = document.getElementById('__live_preview_status');
  const show = (text, color) => { status.textContent = text; status.style.background = color; };
  let hadConnection = false;
  const connect = () => {
    const proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
    const socket = new WebSocket(`${proto}//${location.host}/ws`);
    socket.onopen = () => {
      if (hadConnection) { location.reload(); return; }
      hadConnection = true;
      show('live', 'rgba(20,110,50,.85)');
    };
    socket.onmessage = (event) => {
      let msg;
      try { msg = JSON.parse(event.data); } catch (_) { return; }
      switch (msg.type) {
        case 'reload':
          show(`rebuilt in ${msg.payload.duration}ms`, 'rgba(20,110,50,.85)');
          location.reload();
          break;
        case 'error':
          show(`build failed: ${msg.payload.message}`, 'rgba(160,30,30,.9)');
          break;
        case 'ping':
          socket.send(JSON.stringify({ type: 'pong', payload: { timestamp: Date.now() } }));
          break;
      }
    };
    socket.onclose = () => {
      show('disconnected, retrying…', 'rgba(120,90,10,.9)');
      setTimeout(connect, 1000);
    };
  };
  connect();
})();
</script>
"#;

/// Insert the development payload before `</body>`, falling back to
/// `</html>` and then to the end of the document. Already injected documents
/// are returned unchanged.
pub fn inject_dev_payload(html: &str) -> String {
    if html.contains(MARKER) {
        return html.to_owned();
    }

    let at = find_closing(html, "</body>")
        .or_else(|| find_closing(html, "</html>"))
        .unwrap_or(html.len());

    let mut out = String::with_capacity(html.len() + PAYLOAD.len());
    out.push_str(&html[..at]);
    out.push_str(PAYLOAD);
    out.push_str(&html[at..]);
    out
}

/// Byte offset of the last case-insensitive occurrence of `tag`.
fn find_closing(html: &str, tag: &str) -> Option<usize> {
    // ASCII lowercasing keeps byte offsets identical to the original.
    html.to_ascii_lowercase().rfind(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_before_closing_body() {
        let html = "<html><body><p>hi</p></body></html>";
        let out = inject_dev_payload(html);
        let payload_at = out.find(MARKER).unwrap();
        assert!(payload_at < out.find("</body>").unwrap());
        assert!(out.starts_with("<html><body><p>hi</p>"));
        assert!(out.contains("/ws"));
    }

    #[test]
    fn uses_last_body_tag_case_insensitively() {
        let html = "<BODY><pre>&lt;/body&gt; </body> literal</pre></BODY>";
        let out = inject_dev_payload(html);
        assert!(out.find(MARKER).unwrap() > html.find("literal").unwrap());
        assert!(out.ends_with("</BODY>"));
    }

    #[test]
    fn falls_back_to_html_then_end() {
        let out = inject_dev_payload("<html><p>x</p></html>");
        assert!(out.find(MARKER).unwrap() < out.find("</html>").unwrap());

        let out = inject_dev_payload("<p>fragment</p>");
        assert!(out.starts_with("<p>fragment</p>"));
        assert!(out.contains(MARKER));
    }

    #[test]
    fn injection_is_idempotent() {
        let once = inject_dev_payload("<body></body>");
        let twice = inject_dev_payload(&once);
        assert_eq!(once, twice);
        assert_eq!(twice.matches(MARKER).count(), 1);
    }
}
