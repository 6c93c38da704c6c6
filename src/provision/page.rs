//! HTML configuration page

use super::submission::split_upload_url;
use crate::config::{ConfigRecord, Resolution};
use crate::token::SessionToken;
use std::fmt::Write;

const STYLE: &str = "\
body{margin:0;padding:16px;font-family:sans-serif;background:#eef1f4}\
main{max-width:480px;margin:32px auto;background:#fff;border-radius:8px;padding:20px 24px}\
h1{font-size:22px;text-align:center;margin-top:0}\
h2{font-size:17px;border-bottom:1px solid #ddd;margin-top:20px}\
label{display:block;margin-top:12px;font-weight:bold;font-size:14px}\
input,select{width:100%;box-sizing:border-box;padding:7px 9px;margin-top:4px;font-size:14px}\
.row{display:flex;gap:8px}.row>div{flex:1}\
.note{font-size:12px;color:#666}\
.saved{background:#e6f4ea;border:1px solid #b7dfc2;border-radius:6px;padding:8px 10px}\
button{margin-top:20px;width:100%;padding:10px;font-size:16px;border:0;border-radius:6px;\
background:#2a6fdb;color:#fff}";

/// Escape text for use in element content and quoted attributes
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn text_input(page: &mut String, id: &str, kind: &str, label: &str, value: &str) {
    let _ = write!(
        page,
        "<label for=\"{id}\">{label}</label>\
         <input id=\"{id}\" name=\"{id}\" type=\"{kind}\" value=\"{}\">",
        escape_html(value)
    );
}

/// Render the configuration form pre-filled from `record`
///
/// With `saved` set, a confirmation banner is shown above the form.
pub fn render(record: &ConfigRecord, token: &SessionToken, saved: bool) -> String {
    let (base, endpoint) = split_upload_url(&record.upload_url);
    let mut page = String::with_capacity(4096);

    page.push_str("<!DOCTYPE html><html><head><meta charset=\"utf-8\">");
    page.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">");
    page.push_str("<title>Camera configuration</title><style>");
    page.push_str(STYLE);
    page.push_str("</style></head><body><main><h1>Camera configuration</h1>");

    if saved {
        page.push_str(
            "<p class=\"saved\"><b>Configuration saved.</b> You can close this page.</p>",
        );
    }

    page.push_str("<form action=\"/save\" method=\"POST\" autocomplete=\"off\">");
    let _ = write!(
        page,
        "<input type=\"hidden\" name=\"session\" value=\"{}\">",
        escape_html(token.as_str())
    );

    page.push_str("<h2>Network</h2>");
    text_input(&mut page, "ssid", "text", "SSID", &record.ssid);
    text_input(&mut page, "password", "password", "Password", &record.password);

    page.push_str("<label for=\"upload_base\">Upload URL</label><div class=\"row\"><div>");
    let _ = write!(
        page,
        "<input id=\"upload_base\" name=\"upload_base\" type=\"text\" \
         placeholder=\"http://detector.local:5000\" value=\"{}\">\
         <div class=\"note\">Base URL</div></div><div>\
         <input id=\"upload_endpoint\" name=\"upload_endpoint\" type=\"text\" \
         placeholder=\"upload\" value=\"{}\">\
         <div class=\"note\">Endpoint</div></div></div>",
        escape_html(base),
        escape_html(endpoint)
    );

    page.push_str("<h2>Camera</h2>");
    text_input(
        &mut page,
        "interval",
        "number",
        "Capture interval (ms)",
        &record.capture_interval_ms.to_string(),
    );

    page.push_str("<label for=\"res\">Resolution</label><select id=\"res\" name=\"res\">");
    for res in Resolution::ALL {
        let _ = write!(
            page,
            "<option value=\"{}\"{}>{}</option>",
            res.tag(),
            if res == record.resolution { " selected" } else { "" },
            res
        );
    }
    page.push_str("</select>");

    text_input(
        &mut page,
        "vflip",
        "number",
        "Vertical flip (0/1)",
        &record.vertical_flip.to_string(),
    );
    text_input(&mut page, "bright", "number", "Brightness", &record.brightness.to_string());
    text_input(&mut page, "sat", "number", "Saturation", &record.saturation.to_string());

    page.push_str("<button type=\"submit\">Save configuration</button>");
    page.push_str("</form></main></body></html>");
    page
}
