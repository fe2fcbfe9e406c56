//! Picking page markup and script

use crate::i18n::Translator;
use serde_json::json;

const STYLE: &str = r#"
* { box-sizing: border-box; }
body { margin: 0; font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", sans-serif; background: #f5f6fa; color: #222; }
header { padding: 20px 32px; background: #fff; border-bottom: 1px solid #e4e6ef; display: flex; align-items: center; justify-content: space-between; }
header h1 { margin: 0; font-size: 22px; }
header p { margin: 4px 0 0; color: #666; font-size: 14px; }
main { padding: 24px 32px; }
.grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(110px, 1fr)); gap: 14px; }
.icon { background: #fff; border: 2px solid transparent; border-radius: 10px; padding: 14px 8px; text-align: center; cursor: pointer; }
.icon:hover { border-color: #c7cbe0; }
.icon.selected { border-color: #4f6ef7; background: #eef1ff; }
.icon .svg svg { width: 40px; height: 40px; }
.icon .name { margin-top: 8px; font-size: 12px; color: #555; overflow: hidden; text-overflow: ellipsis; white-space: nowrap; }
.pager { margin-top: 24px; display: flex; gap: 12px; justify-content: center; align-items: center; }
button { border: none; border-radius: 6px; padding: 8px 16px; background: #4f6ef7; color: #fff; cursor: pointer; }
button:disabled { opacity: .5; cursor: not-allowed; }
.status { color: #666; font-size: 14px; }
"#;

/// Renders the picking page in one locale
#[derive(Debug, Clone, Copy)]
pub struct PageRenderer {
    translator: Translator,
}

impl PageRenderer {
    pub fn new(translator: Translator) -> Self {
        Self { translator }
    }

    /// HTML for `GET /`
    pub fn html(&self, search_id: &str) -> String {
        let t = &self.translator;
        let body = if search_id.is_empty() {
            format!(r#"<p class="status">{}</p>"#, escape_html(&t.t("web.notConfigured")))
        } else {
            format!(
                r#"<div id="grid" class="grid"><p class="status">{loading}</p></div>
    <div class="pager">
      <button id="prev" disabled>{previous}</button>
      <span id="pageInfo" class="status"></span>
      <button id="next" disabled>{next}</button>
    </div>"#,
                loading = escape_html(&t.t("web.loading")),
                previous = escape_html(&t.t("web.previous")),
                next = escape_html(&t.t("web.next")),
            )
        };

        format!(
            r#"<!DOCTYPE html>
<html lang="{lang}">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{title}</title>
  <style>{style}</style>
</head>
<body data-search-id="{search_id}">
  <header>
    <div>
      <h1>{title}</h1>
      <p>{subtitle}</p>
    </div>
    <div>
      <span id="selectedInfo" class="status">{none_selected}</span>
      <button id="send" disabled>{send}</button>
    </div>
  </header>
  <main>
    {body}
  </main>
  <script src="/site.js"></script>
</body>
</html>
"#,
            lang = t.locale().as_str(),
            title = escape_html(&t.t("web.title")),
            subtitle = escape_html(&t.t("web.subtitle")),
            style = STYLE,
            search_id = escape_html(search_id),
            none_selected = escape_html(&t.t("web.noIconsSelected")),
            send = escape_html(&t.t("web.sendSelected")),
            body = body,
        )
    }

    /// Script for `GET /site.js`
    pub fn script(&self) -> String {
        let t = &self.translator;
        let strings = json!({
            "selected": t.t("web.selectedIcons"),
            "noneSelected": t.t("web.noIconsSelected"),
            "loading": t.t("web.loading"),
            "sent": t.t("web.sent"),
        });

        format!("const I18N = {};\n{}", strings, SCRIPT)
    }
}

const SCRIPT: &str = r#"
const SEARCH_ID = document.body.dataset.searchId;
const PAGE_SIZE = 15;
const selected = new Map();
let page = 1;
let socket = null;
let sent = false;

function connect() {
  const scheme = location.protocol === 'https:' ? 'wss://' : 'ws://';
  socket = new WebSocket(scheme + location.host + '/ws?searchId=' + encodeURIComponent(SEARCH_ID));
  socket.onopen = () => {
    setInterval(() => {
      if (socket.readyState === WebSocket.OPEN) socket.send(JSON.stringify({ type: 'ping' }));
    }, 15000);
  };
  socket.onmessage = (event) => {
    const msg = JSON.parse(event.data);
    if (msg.type === 'selectionUpdate' && msg.status === 'completed') markSent();
  };
  socket.onclose = () => { if (!sent) setTimeout(connect, 3000); };
}

async function loadPage(n) {
  const grid = document.getElementById('grid');
  grid.innerHTML = '<p class="status">' + I18N.loading + '</p>';
  const resp = await fetch('/api/cache?searchId=' + encodeURIComponent(SEARCH_ID) + '&page=' + n + '&pageSize=' + PAGE_SIZE);
  const data = await resp.json();
  if (!resp.ok) {
    grid.innerHTML = '<p class="status"></p>';
    grid.firstChild.textContent = data.error;
    return;
  }
  page = data.page;
  grid.innerHTML = '';
  for (const icon of data.icons) {
    const key = String(icon.id) + ':' + icon.name;
    const cell = document.createElement('div');
    cell.className = 'icon' + (selected.has(key) ? ' selected' : '');
    const svg = document.createElement('div');
    svg.className = 'svg';
    svg.innerHTML = icon.show_svg || '';
    const name = document.createElement('div');
    name.className = 'name';
    name.textContent = icon.name;
    cell.append(svg, name);
    cell.onclick = () => {
      if (selected.has(key)) selected.delete(key); else selected.set(key, icon);
      cell.classList.toggle('selected');
      refreshSelection();
    };
    grid.appendChild(cell);
  }
  document.getElementById('pageInfo').textContent = data.page + ' / ' + data.totalPages;
  document.getElementById('prev').disabled = data.page <= 1;
  document.getElementById('next').disabled = data.page >= data.totalPages;
}

function refreshSelection() {
  document.getElementById('selectedInfo').textContent =
    selected.size ? I18N.selected + ': ' + selected.size : I18N.noneSelected;
  document.getElementById('send').disabled = sent || selected.size === 0;
}

function markSent() {
  sent = true;
  document.getElementById('selectedInfo').textContent = I18N.sent;
  document.getElementById('send').disabled = true;
}

async function sendSelection() {
  const icons = Array.from(selected.values());
  if (!icons.length) return;
  const resp = await fetch('/api/save', {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify({ searchId: SEARCH_ID, icons }),
  });
  if (resp.ok) markSent();
}

if (SEARCH_ID) {
  document.getElementById('prev').onclick = () => loadPage(page - 1);
  document.getElementById('next').onclick = () => loadPage(page + 1);
  document.getElementById('send').onclick = sendSelection;
  connect();
  loadPage(1);
}
"#;

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
