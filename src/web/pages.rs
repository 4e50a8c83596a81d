// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Server-rendered HTML pages

use super::ChatEntry;
use crate::config::{is_hex_color, AppConfig, AppearanceConfig};
use crate::history::CommandRecord;
use crate::speech::stt::EngineStatus;
use crate::system::{ProcessInfo, SystemInfo, SystemMetrics, SystemSnapshot};

/// Escape text for HTML element and attribute content
pub(super) fn escape(text: &str) -> String {
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

fn on_off(value: bool) -> &'static str {
    if value {
        "On"
    } else {
        "Off"
    }
}

struct Palette {
    bg: &'static str,
    surface: &'static str,
    card: &'static str,
    text: &'static str,
    muted: &'static str,
    border: &'static str,
}

const LIGHT: Palette = Palette {
    bg: "#f4f6f8",
    surface: "#ffffff",
    card: "#ffffff",
    text: "#2c3e50",
    muted: "#7f8c8d",
    border: "#dfe4ea",
};

const DARK: Palette = Palette {
    bg: "#1a1a2e",
    surface: "#16213e",
    card: "#0f3460",
    text: "#e8e8e8",
    muted: "#a0a0a0",
    border: "#2a2a4a",
};

impl Palette {
    fn vars(&self) -> String {
        format!(
            "--bg:{};--surface:{};--card:{};--text:{};--muted:{};--border:{};",
            self.bg, self.surface, self.card, self.text, self.muted, self.border
        )
    }
}

/// CSS custom properties for the configured theme
fn theme_css(appearance: &AppearanceConfig) -> String {
    let accent = if is_hex_color(&appearance.accent_color) {
        appearance.accent_color.as_str()
    } else {
        "#3498db"
    };
    let common = format!("--accent:{};--font-size:{}px;", accent, appearance.font_size);

    let mut css = match appearance.theme.as_str() {
        "dark" => format!(":root{{{}{}}}", DARK.vars(), common),
        "auto" => format!(
            ":root{{{}{}}}@media (prefers-color-scheme: dark){{:root{{{}}}}}",
            LIGHT.vars(),
            common,
            DARK.vars()
        ),
        _ => format!(":root{{{}{}}}", LIGHT.vars(), common),
    };
    if !appearance.animation_enabled {
        css.push_str("*{transition:none!important;animation:none!important}");
    }
    css
}

const PAGE_CSS: &str = "\
*{box-sizing:border-box;margin:0;padding:0}
body{font:var(--font-size)/1.6 system-ui,sans-serif;background:var(--bg);color:var(--text)}
nav{display:flex;gap:24px;align-items:center;padding:14px 20px;background:var(--surface);border-bottom:1px solid var(--border)}
nav a{color:var(--muted);text-decoration:none;transition:color .2s}
nav a:hover,nav a.logo{color:var(--accent)}
nav a.logo{font-size:1.4em;font-weight:bold}
main{max-width:1200px;margin:0 auto;padding:20px}
h1{margin-bottom:16px}
.card,.stat-card{background:var(--card);border:1px solid var(--border);border-radius:10px;padding:18px;margin-bottom:18px}
.card h2{margin-bottom:12px;color:var(--accent)}
.stats-grid{display:grid;grid-template-columns:repeat(auto-fit,minmax(180px,1fr));gap:18px;margin-bottom:18px}
.stat-card{text-align:center}
.stat-card .number{font-size:2.2em;font-weight:bold;color:var(--accent)}
.stat-card .label,th,.who{color:var(--muted)}
.columns{display:grid;grid-template-columns:2fr 1fr;gap:18px}
table{width:100%;border-collapse:collapse}
th,td{padding:8px;text-align:left;border-bottom:1px solid var(--border)}
.tag{display:inline-block;margin:2px;padding:1px 8px;border-radius:10px;background:var(--accent);color:#fff;font-size:.8em}
.tag.off{background:#e94560}
form{display:flex;gap:10px}
input,textarea{flex:1;padding:8px;font:inherit;color:var(--text);background:var(--surface);border:1px solid var(--border);border-radius:6px}
textarea{width:100%;min-height:320px;font-family:monospace}
button{padding:8px 16px;border:none;border-radius:6px;background:var(--accent);color:#fff;cursor:pointer;transition:filter .2s}
button:hover{filter:brightness(1.15)}
.message{padding:8px 0;border-bottom:1px solid var(--border)}
.who{font-size:.85em}
#output{margin-top:12px;white-space:pre-wrap}
";

const PAGE_JS: &str = "\
async function api(method, url, body) {
    const options = { method, headers: { 'Content-Type': 'application/json' } };
    if (body !== undefined) options.body = JSON.stringify(body);
    return (await fetch(url, options)).json();
}
function show(text) { document.getElementById('output').textContent = text; }
";

fn base_template(title: &str, content: &str, appearance: &AppearanceConfig) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{} - Raven</title>
<style>{}
{}</style>
</head>
<body>
<nav>
    <a href="/" class="logo">Raven</a>
    <a href="/">Dashboard</a>
    <a href="/chat">Chat</a>
    <a href="/voice">Voice</a>
    <a href="/system">System</a>
    <a href="/settings">Settings</a>
</nav>
<main>{}</main>
<script>{}</script>
</body>
</html>"#,
        escape(title),
        theme_css(appearance),
        PAGE_CSS,
        content,
        PAGE_JS
    )
}

fn stat_card(value: &str, label: &str) -> String {
    format!(
        r#"<div class="stat-card"><div class="number">{}</div><div class="label">{}</div></div>"#,
        value, label
    )
}

pub(super) fn render_dashboard(
    appearance: &AppearanceConfig,
    snapshot: Option<&SystemSnapshot>,
    recent: &[CommandRecord],
    voice_active: bool,
    listening: bool,
) -> String {
    let stats_html = match snapshot {
        Some(s) => format!(
            r#"<div class="stats-grid">{}{}{}{}</div>"#,
            stat_card(&format!("{:.0}%", s.cpu_percent), "CPU"),
            stat_card(&format!("{:.0}%", s.ram_percent), "RAM"),
            stat_card(&format!("{:.0}%", s.disk_percent), "Disk"),
            stat_card(&s.processes.to_string(), "Processes"),
        ),
        None => r#"<div class="card">System metrics are unavailable</div>"#.to_string(),
    };

    let rows: String = recent
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                r.time.format("%Y-%m-%d %H:%M"),
                escape(&r.command),
                escape(&r.response)
            )
        })
        .collect();

    let content = format!(r#"
        <h1>Dashboard</h1>
        {}
        <div class="card">
            <h2>Ask Raven</h2>
            <form onsubmit="event.preventDefault(); api('POST', '/api/command', {{ command: this.command.value }}).then(r => show(r.response || r.error)); this.command.value = '';">
                <input name="command" placeholder="What time is it?" autocomplete="off">
                <button type="submit">Send</button>
            </form>
            <div id="output"></div>
        </div>
        <div class="columns">
            <div class="card">
                <h2>Recent Commands</h2>
                <table>
                    <tr><th>Time</th><th>Command</th><th>Response</th></tr>
                    {}
                </table>
            </div>
            <div class="card">
                <h2>Voice</h2>
                <table>
                    <tr><td>Spoken replies</td><td>{}</td></tr>
                    <tr><td>Listening</td><td>{}</td></tr>
                </table>
            </div>
        </div>
    "#,
        stats_html,
        if rows.is_empty() { "<tr><td colspan=\"3\">No commands yet</td></tr>".to_string() } else { rows },
        on_off(voice_active),
        on_off(listening),
    );

    base_template("Dashboard", &content, appearance)
}

pub(super) fn render_chat(appearance: &AppearanceConfig, entries: &[ChatEntry]) -> String {
    let messages: String = entries
        .iter()
        .map(|e| {
            format!(
                r#"<div class="message"><div class="who">You, {}</div>{}</div>
                   <div class="message"><div class="who">Raven ({})</div>{}</div>"#,
                e.timestamp.format("%H:%M:%S"),
                escape(&e.user),
                escape(&e.intent),
                escape(&e.ai)
            )
        })
        .collect();

    let content = format!(r#"
        <h1>Chat</h1>
        <div class="card">
            <div id="messages">{}</div>
        </div>
        <div class="card">
            <form onsubmit="event.preventDefault(); api('POST', '/api/ai/chat', {{ message: this.message.value }}).then(() => location.reload());">
                <input name="message" placeholder="Say something to Raven" autocomplete="off">
                <button type="submit">Send</button>
                <button type="button" onclick="api('DELETE', '/api/ai/history').then(() => location.reload())">Clear</button>
            </form>
        </div>
    "#, if messages.is_empty() { "No messages yet".to_string() } else { messages });

    base_template("Chat", &content, appearance)
}

pub(super) fn render_voice(
    appearance: &AppearanceConfig,
    engines: &[EngineStatus],
    tts_engine: Option<&str>,
    voice_active: bool,
    listening: bool,
) -> String {
    let engine_tags: String = engines
        .iter()
        .map(|e| {
            format!(
                r#"<span class="tag{}">{}</span>"#,
                if e.available { "" } else { " off" },
                escape(&e.name)
            )
        })
        .collect();

    let content = format!(r#"
        <h1>Voice</h1>
        <div class="card">
            <h2>Status</h2>
            <table>
                <tr><td>Recognition engines</td><td>{}</td></tr>
                <tr><td>Speech engine</td><td>{}</td></tr>
                <tr><td>Spoken replies</td><td>{}</td></tr>
                <tr><td>Listening</td><td>{}</td></tr>
            </table>
        </div>
        <div class="card">
            <h2>Listen</h2>
            <form onsubmit="event.preventDefault();">
                <button type="button" onclick="show('Listening...'); api('POST', '/api/voice/listen').then(r => show(r.error || (r.recognized ? r.text + '\n' + (r.response || '') : r.message)))">Listen once</button>
                <button type="button" onclick="api('POST', '/api/voice/start').then(() => location.reload())">Start listening</button>
                <button type="button" onclick="api('POST', '/api/voice/stop').then(() => location.reload())">Stop</button>
            </form>
        </div>
        <div class="card">
            <h2>Speak</h2>
            <form onsubmit="event.preventDefault(); api('POST', '/api/voice/speak', {{ text: this.text.value }}).then(r => show(r.error || 'Queued'));">
                <input name="text" placeholder="Text to speak" autocomplete="off">
                <button type="submit">Speak</button>
            </form>
            <div id="output"></div>
        </div>
    "#,
        if engine_tags.is_empty() { "None configured".to_string() } else { engine_tags },
        escape(tts_engine.unwrap_or("unavailable")),
        on_off(voice_active),
        on_off(listening),
    );

    base_template("Voice", &content, appearance)
}

pub(super) fn render_system(
    appearance: &AppearanceConfig,
    metrics: Option<&SystemMetrics>,
    processes: &[ProcessInfo],
    info: Option<&SystemInfo>,
) -> String {
    let stats_html = match metrics {
        Some(m) => format!(
            r#"<div class="stats-grid">{}{}{}{}</div>"#,
            stat_card(&format!("{:.1}%", m.cpu.percent), &format!("CPU ({} cores)", m.cpu.cores)),
            stat_card(
                &format!("{:.1}%", m.ram.percent),
                &format!("RAM ({:.1} / {:.1} GB)", m.ram.used_gb, m.ram.total_gb)
            ),
            stat_card(
                &format!("{:.1}%", m.disk.percent),
                &format!("Disk ({:.1} GB free)", m.disk.free_gb)
            ),
            stat_card(&m.processes.to_string(), "Processes"),
        ),
        None => r#"<div class="card">System metrics are unavailable</div>"#.to_string(),
    };

    let info_rows = match info {
        Some(i) => format!(
            r#"<tr><td>Host</td><td>{}</td></tr>
               <tr><td>User</td><td>{}</td></tr>
               <tr><td>OS</td><td>{} {}</td></tr>
               <tr><td>Kernel</td><td>{}</td></tr>
               <tr><td>Architecture</td><td>{}</td></tr>
               <tr><td>Booted</td><td>{}</td></tr>"#,
            escape(&i.hostname),
            escape(&i.username),
            escape(&i.os),
            escape(&i.os_version),
            escape(&i.kernel),
            escape(&i.architecture),
            escape(&i.boot_time),
        ),
        None => String::new(),
    };

    let process_rows: String = processes
        .iter()
        .map(|p| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{:.1}</td><td>{:.1}</td><td>{}</td></tr>",
                p.pid,
                escape(&p.name),
                p.cpu,
                p.memory,
                escape(&p.status)
            )
        })
        .collect();

    let content = format!(r#"
        <h1>System</h1>
        {}
        <div class="columns">
            <div class="card">
                <h2>Top Processes</h2>
                <table>
                    <tr><th>PID</th><th>Name</th><th>CPU %</th><th>RAM %</th><th>Status</th></tr>
                    {}
                </table>
            </div>
            <div class="card">
                <h2>Machine</h2>
                <table>{}</table>
            </div>
        </div>
    "#, stats_html, process_rows, info_rows);

    base_template("System", &content, appearance)
}

pub(super) fn render_settings(config: &AppConfig) -> String {
    let apps: String = config
        .apps
        .iter()
        .map(|a| format!(r#"<span class="tag">{}</span>"#, escape(&a.name)))
        .collect();
    let document = serde_json::to_string_pretty(config).unwrap_or_default();

    let content = format!(r#"
        <h1>Settings</h1>
        <div class="card">
            <h2>Voice</h2>
            <table>
                <tr><td>Enabled</td><td>{}</td></tr>
                <tr><td>Wake words</td><td>{}</td></tr>
                <tr><td>Language</td><td>{}</td></tr>
                <tr><td>Speech engine</td><td>{:?}</td></tr>
                <tr><td>Rate</td><td>{} wpm</td></tr>
                <tr><td>Volume</td><td>{:.0}%</td></tr>
            </table>
        </div>
        <div class="card">
            <h2>Assistant</h2>
            <table>
                <tr><td>Model</td><td>{}</td></tr>
                <tr><td>Context</td><td>{} ({} turns)</td></tr>
                <tr><td>Command history</td><td>{} entries</td></tr>
                <tr><td>Applications</td><td>{}</td></tr>
            </table>
        </div>
        <div class="card">
            <h2>Edit</h2>
            <textarea id="settings">{}</textarea>
            <form onsubmit="event.preventDefault();" style="margin-top: 10px;">
                <button type="button" onclick="api('PUT', '/api/settings', JSON.parse(document.getElementById('settings').value)).then(r => show(r.error || 'Saved'))">Save</button>
                <button type="button" onclick="api('POST', '/api/settings/reset').then(() => location.reload())">Reset to defaults</button>
            </form>
            <div id="output"></div>
        </div>
    "#,
        on_off(config.voice.enabled),
        escape(&config.voice.wake_words.join(", ")),
        escape(&config.voice.language),
        config.tts.engine,
        config.tts.rate,
        config.tts.volume * 100.0,
        escape(&config.ai.model),
        on_off(config.ai.enable_context),
        config.ai.max_context,
        config.ai.command_history_limit,
        apps,
        escape(&document),
    );

    base_template("Settings", &content, &config.appearance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<b>"Tom" & 'Jerry'</b>"#), "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_dashboard_escapes_history() {
        let record = crate::history::create_record("<script>", "ok", None);
        let html = render_dashboard(&AppearanceConfig::default(), None, &[record], false, false);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<td><script>"));
        assert!(!html.contains("No commands yet"));
    }

    #[test]
    fn test_theme_follows_appearance() {
        let mut appearance = AppearanceConfig::default();
        let light = render_chat(&appearance, &[]);
        assert!(light.contains("--bg:#f4f6f8"));
        assert!(light.contains("--accent:#3498db;--font-size:13px;"));
        assert!(!light.contains("transition:none"));

        appearance.theme = "dark".to_string();
        appearance.accent_color = "#e67e22".to_string();
        appearance.font_size = 16;
        appearance.animation_enabled = false;
        let dark = render_chat(&appearance, &[]);
        assert!(dark.contains("--bg:#1a1a2e"));
        assert!(dark.contains("--accent:#e67e22;--font-size:16px;"));
        assert!(dark.contains("transition:none!important"));

        appearance.theme = "auto".to_string();
        assert!(render_chat(&appearance, &[]).contains("prefers-color-scheme: dark"));
    }

    #[test]
    fn test_bad_accent_never_reaches_css() {
        let appearance = AppearanceConfig {
            accent_color: "red}body{display:none".to_string(),
            ..AppearanceConfig::default()
        };
        let html = render_chat(&appearance, &[]);
        assert!(!html.contains("display:none"));
        assert!(html.contains("--accent:#3498db;"));
    }
}
