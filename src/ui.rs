use crate::models::{BoxView, SmokeView};
use crate::stats::format_days;
use chrono::{FixedOffset, TimeZone};

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            // keeps user text from matching template placeholders
            '{' => escaped.push_str("&#123;"),
            '}' => escaped.push_str("&#125;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Percent-encodes one URL path segment, keeping only unreserved characters.
pub fn encode_path_segment(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn layout(title: &str, body: &str, script: &str) -> String {
    LAYOUT_HTML
        .replace("{{TITLE}}", title)
        .replace("{{BODY}}", body)
        .replace("{{SCRIPT}}", script)
}

fn degraded_notice(degraded: bool) -> &'static str {
    if degraded {
        r#"<p class="status" data-type="error">Saving is unavailable right now; changes are kept until the server stops.</p>"#
    } else {
        ""
    }
}

pub fn render_home(view: &SmokeView) -> String {
    let note = match view.last_timestamp {
        Some(_) if view.assumed_smoking => "Smoking… (assumes 7 min per smoke)",
        Some(_) => "Assumes 7 min per smoke.",
        None => "No smokes logged yet.",
    };
    let last = view
        .last_timestamp
        .map(|ts| ts.to_string())
        .unwrap_or_default();

    let body = HOME_BODY
        .replace("{{TODAY}}", &view.today_count.to_string())
        .replace("{{ELAPSED}}", &view.since_last_finished)
        .replace("{{LAST}}", &last)
        .replace("{{NOTE}}", note)
        .replace("{{DEGRADED}}", degraded_notice(view.persistence_degraded));

    layout("Smoke Break Tracker", &body, HOME_SCRIPT)
}

pub fn render_log(view: &SmokeView, offset: &FixedOffset) -> String {
    let items = if view.events.is_empty() {
        r#"<div class="muted">No logs yet.</div>"#.to_string()
    } else {
        let rows: String = view
            .events
            .iter()
            .map(|event| {
                let when = format_local(event.timestamp, offset);
                format!(
                    r#"<li class="log-item"><span class="log-time">{when}</span><form method="post" action="/smokes/{id}/delete"><button class="btn-link" type="submit" aria-label="Delete log {when}">Delete</button></form></li>"#,
                    when = escape_html(&when),
                    id = encode_path_segment(&event.id),
                )
            })
            .collect();
        format!(r#"<ul class="log-list">{rows}</ul>"#)
    };

    let body = LOG_BODY
        .replace("{{TODAY}}", &view.today_count.to_string())
        .replace("{{DISABLED}}", if view.events.is_empty() { "disabled" } else { "" })
        .replace("{{ITEMS}}", &items)
        .replace("{{DEGRADED}}", degraded_notice(view.persistence_degraded));

    layout("Smoke Log", &body, CONFIRM_SCRIPT)
}

pub fn render_boxes(view: &BoxView) -> String {
    let selected = view.selected_brand.as_deref().unwrap_or("");

    let suggestions: String = view
        .brands
        .iter()
        .map(|brand| format!(r#"<option value="{}"></option>"#, escape_html(brand)))
        .collect();

    let chips: String = view
        .recent_brands
        .iter()
        .map(|brand| {
            let brand = escape_html(brand);
            format!(r#"<button class="chip" type="button" data-brand="{brand}">{brand}</button>"#)
        })
        .collect();

    let mut filter = format!(
        r#"<option value=""{}>All brands</option>"#,
        if selected.is_empty() { " selected" } else { "" }
    );
    for brand in &view.brands {
        let is_selected = if brand == selected { " selected" } else { "" };
        let brand = escape_html(brand);
        filter.push_str(&format!(r#"<option value="{brand}"{is_selected}>{brand}</option>"#));
    }

    let entries = if view.entries.is_empty() {
        r#"<div class="muted">No entries yet. Log when you open a new box.</div>"#.to_string()
    } else {
        let rows: String = view
            .entries
            .iter()
            .map(|row| {
                let lasted = match &row.previous_lasted {
                    Some(lasted) => format!(" · prev lasted {lasted}"),
                    None => " · first log".to_string(),
                };
                format!(
                    r#"<li class="log-item"><div><div class="log-brand">{brand} <span class="badge">x{boxes}</span></div><div class="muted">{when}{lasted}</div></div><form method="post" action="/boxes/{id}/delete"><button class="btn-link" type="submit" aria-label="Delete {brand} entry {when}">Delete</button></form></li>"#,
                    brand = escape_html(&row.entry.brand),
                    boxes = row.entry.boxes,
                    when = escape_html(&row.logged_at),
                    lasted = escape_html(&lasted),
                    id = encode_path_segment(&row.entry.id),
                )
            })
            .collect();
        format!(r#"<ul class="log-list">{rows}</ul>"#)
    };

    let body = BOXES_BODY
        .replace("{{WINDOW}}", &view.boxes_last_30_days.to_string())
        .replace("{{DISABLED}}", if view.total_entries == 0 { "disabled" } else { "" })
        .replace("{{SUGGESTIONS}}", &suggestions)
        .replace("{{CHIPS}}", &chips)
        .replace("{{FILTER}}", &filter)
        .replace("{{SINCE}}", view.since_last_open.as_deref().unwrap_or("--"))
        .replace("{{AVG}}", &format_days(view.avg_days_per_box))
        .replace("{{ENTRIES}}", &entries)
        .replace("{{DEGRADED}}", degraded_notice(view.persistence_degraded));

    layout("Boxes", &body, BOXES_SCRIPT)
}

fn format_local(timestamp: i64, offset: &FixedOffset) -> String {
    match offset.timestamp_millis_opt(timestamp).single() {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

const HOME_BODY: &str = r#"
    <header class="topbar">
      <div>
        <h1>Smoke Break Tracker</h1>
        <p class="subtitle">Time since last finished</p>
      </div>
      <div class="pill">Today <strong>{{TODAY}}</strong></div>
    </header>
    {{DEGRADED}}
    <section class="stat hero">
      <span class="label">Elapsed</span>
      <span id="elapsed" class="value big" data-last="{{LAST}}">{{ELAPSED}}</span>
      <span class="muted" id="note">{{NOTE}}</span>
    </section>
    <section class="actions">
      <form method="post" action="/smokes">
        <button class="btn-primary" type="submit">Log Cigarette</button>
      </form>
      <a class="btn-secondary" href="/log">View Log</a>
      <a class="btn-secondary" href="/boxes">Boxes</a>
    </section>
"#;

const LOG_BODY: &str = r#"
    <header class="topbar">
      <a class="btn-secondary compact" href="/">Back</a>
      <div class="pill">Today <strong>{{TODAY}}</strong></div>
      <form method="post" action="/smokes/delete-all" data-confirm="This will permanently delete all smoke logs. This cannot be undone.">
        <button class="btn-danger compact" type="submit" {{DISABLED}}>Delete All</button>
      </form>
    </header>
    {{DEGRADED}}
    <section aria-label="Smoke log">{{ITEMS}}</section>
"#;

const BOXES_BODY: &str = r#"
    <header class="topbar">
      <a class="btn-secondary compact" href="/">Back</a>
      <div class="pill" aria-label="Boxes in last 30 days">30d <strong>{{WINDOW}}</strong></div>
      <form method="post" action="/boxes/delete-all" data-confirm="This will permanently delete all box-open entries. This cannot be undone.">
        <button class="btn-danger compact" type="submit" {{DISABLED}}>Delete All</button>
      </form>
    </header>
    {{DEGRADED}}
    <form class="box-form" method="post" action="/boxes">
      <label><span class="label">Brand</span><input id="brand-input" name="brand" list="brand-suggestions" placeholder="Dunhill" autocomplete="off" required /></label>
      <label><span class="label">Box</span><input name="boxes" type="number" min="1" value="1" inputmode="numeric" /></label>
      <datalist id="brand-suggestions">{{SUGGESTIONS}}</datalist>
      <div class="chips">{{CHIPS}}</div>
      <button class="btn-primary" type="submit">Log New Box</button>
    </form>
    <section class="stat">
      <form class="filter" method="get" action="/boxes">
        <span class="label">Frequency</span>
        <select name="brand" aria-label="Filter by brand" onchange="this.form.submit()">{{FILTER}}</select>
      </form>
      <div class="panel">
        <div><span class="label">Since last</span><span class="value">{{SINCE}}</span></div>
        <div><span class="label">Avg / box</span><span class="value">{{AVG}}</span></div>
      </div>
    </section>
    <section aria-label="Box open log">{{ENTRIES}}</section>
"#;

const HOME_SCRIPT: &str = r#"
    const elapsedEl = document.getElementById('elapsed');
    const noteEl = document.getElementById('note');
    const last = Number(elapsedEl.dataset.last);
    const assumedMs = 7 * 60 * 1000;
    const pad = (value) => String(value).padStart(2, '0');
    const tick = () => {
      const raw = Date.now() - (last + assumedMs);
      const diff = Math.max(0, raw);
      const hours = Math.floor(diff / 3600000);
      const minutes = Math.floor((diff % 3600000) / 60000);
      const seconds = Math.floor((diff % 60000) / 1000);
      elapsedEl.textContent = `${pad(hours)}:${pad(minutes)}:${pad(seconds)}`;
      noteEl.textContent = raw < 0 ? 'Smoking… (assumes 7 min per smoke)' : 'Assumes 7 min per smoke.';
    };
    if (last > 0) {
      tick();
      setInterval(tick, 1000);
    }
"#;

const CONFIRM_SCRIPT: &str = r#"
    document.querySelectorAll('form[data-confirm]').forEach((form) => {
      form.addEventListener('submit', (event) => {
        if (!window.confirm(form.dataset.confirm)) {
          event.preventDefault();
        }
      });
    });
"#;

const BOXES_SCRIPT: &str = r#"
    document.querySelectorAll('form[data-confirm]').forEach((form) => {
      form.addEventListener('submit', (event) => {
        if (!window.confirm(form.dataset.confirm)) {
          event.preventDefault();
        }
      });
    });
    const brandInput = document.getElementById('brand-input');
    document.querySelectorAll('.chip').forEach((chip) => {
      chip.addEventListener('click', () => {
        brandInput.value = chip.dataset.brand;
        brandInput.focus();
      });
    });
"#;

const LAYOUT_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>{{TITLE}}</title>
  <style>
    :root {
      --bg-1: #f8f3e6;
      --bg-2: #f5d3a7;
      --ink: #2b2a28;
      --accent: #ff6b4a;
      --accent-2: #2f4858;
      --card: rgba(255, 255, 255, 0.86);
      --shadow: 0 24px 60px rgba(47, 72, 88, 0.18);
    }

    * {
      box-sizing: border-box;
    }

    body {
      margin: 0;
      min-height: 100vh;
      background: radial-gradient(circle at top, var(--bg-2), transparent 60%),
        linear-gradient(135deg, var(--bg-1), #ffe9d4 60%, #f9f2e9 100%);
      color: var(--ink);
      font-family: "Trebuchet MS", sans-serif;
      display: grid;
      place-items: center;
      padding: 24px 14px 40px;
    }

    .app {
      width: min(520px, 100%);
      background: var(--card);
      border-radius: 24px;
      box-shadow: var(--shadow);
      padding: 24px;
      display: grid;
      gap: 18px;
    }

    h1 {
      font-family: "Georgia", serif;
      font-size: 1.4rem;
      margin: 0;
    }

    .subtitle, .muted {
      margin: 0;
      color: #6f6a65;
      font-size: 0.85rem;
    }

    .topbar {
      display: flex;
      align-items: center;
      justify-content: space-between;
      gap: 10px;
    }

    .pill, .badge {
      border-radius: 999px;
      background: rgba(47, 72, 88, 0.08);
      padding: 4px 12px;
      font-size: 0.8rem;
      font-weight: 600;
    }

    .stat {
      background: white;
      border-radius: 18px;
      padding: 16px;
      border: 1px solid rgba(47, 72, 88, 0.08);
      display: grid;
      gap: 8px;
    }

    .hero {
      text-align: center;
    }

    .label {
      display: block;
      font-size: 0.75rem;
      text-transform: uppercase;
      letter-spacing: 0.12em;
      color: #8b857d;
    }

    .value {
      display: block;
      font-size: 1.3rem;
      font-weight: 600;
      color: var(--accent-2);
    }

    .value.big {
      font-family: monospace;
      font-size: 3rem;
    }

    .panel {
      display: grid;
      grid-template-columns: 1fr 1fr;
      gap: 10px;
    }

    .actions, .box-form {
      display: grid;
      gap: 10px;
    }

    input, select {
      width: 100%;
      border-radius: 12px;
      border: 1px solid rgba(47, 72, 88, 0.2);
      padding: 10px 12px;
      font-size: 0.95rem;
    }

    button, .btn-secondary {
      appearance: none;
      border: none;
      border-radius: 999px;
      padding: 14px 18px;
      font-size: 0.95rem;
      font-weight: 600;
      cursor: pointer;
      text-align: center;
      text-decoration: none;
      display: inline-block;
      width: 100%;
    }

    button:disabled {
      opacity: 0.55;
      cursor: not-allowed;
    }

    .compact {
      width: auto;
      padding: 8px 14px;
    }

    .btn-primary {
      background: var(--accent);
      color: white;
    }

    .btn-secondary {
      background: rgba(47, 72, 88, 0.1);
      color: var(--accent-2);
    }

    .btn-danger {
      background: #c63b2b;
      color: white;
    }

    .btn-link {
      background: transparent;
      color: var(--accent-2);
      padding: 4px 8px;
      width: auto;
      font-size: 0.8rem;
    }

    .chip {
      width: auto;
      padding: 4px 12px;
      font-size: 0.8rem;
      background: rgba(47, 72, 88, 0.08);
      margin: 0 6px 6px 0;
    }

    .log-list {
      list-style: none;
      margin: 0;
      padding: 0;
      display: grid;
      gap: 6px;
    }

    .log-item {
      display: flex;
      justify-content: space-between;
      align-items: center;
      background: white;
      border-radius: 12px;
      padding: 8px 12px;
    }

    .log-brand {
      font-weight: 600;
    }

    .status[data-type="error"] {
      color: #c63b2b;
      margin: 0;
    }
  </style>
</head>
<body>
  <main class="app">
{{BODY}}
  </main>
  <script>
{{SCRIPT}}
  </script>
</body>
</html>
"#;
