//! Web fetch: GET a URL and return its text, with HTML reduced to readable text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::registry::{str_arg, FieldKind, InputSchema, Tool, ToolError, ToolHandler};
use super::truncate_output;
use crate::message::ToolArgs;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Most bytes read from a response body; the rest is never downloaded.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

struct WebFetch {
    client: reqwest::Client,
    max_body_bytes: usize,
    max_output_bytes: usize,
}

#[async_trait]
impl ToolHandler for WebFetch {
    async fn call(&self, args: ToolArgs) -> Result<String, ToolError> {
        let url = str_arg(&args, "url")?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ToolError::InvalidArguments(format!("unsupported url: {}", url)));
        }
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ToolError::Failed(format!("request failed: {}", e)))?;
        let status = res.status();
        if !status.is_success() {
            return Err(ToolError::Failed(format!("HTTP error: {}", status)));
        }
        let is_html = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);
        let body = read_capped(res, self.max_body_bytes)
            .await
            .map_err(|e| ToolError::Failed(format!("reading body failed: {}", e)))?;
        let body = String::from_utf8_lossy(&body);
        let text = if is_html {
            html_to_text(&body)
        } else {
            body.into_owned()
        };
        Ok(truncate_output(&text, self.max_output_bytes))
    }
}

async fn read_capped(mut res: reqwest::Response, cap: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = res.chunk().await? {
        let room = cap - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            log::debug!("web_fetch: body cut at {} bytes", cap);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Remove `<script>` and `<style>` elements, matching tag names in any case. An element
/// that is never closed runs to the end of the document.
fn strip_blocks(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;
    loop {
        let next = [("<script", "</script>"), ("<style", "</style>")]
            .into_iter()
            .filter_map(|(open, close)| lower[pos..].find(open).map(|i| (pos + i, close)))
            .min_by_key(|(start, _)| *start);
        let Some((start, close)) = next else {
            out.push_str(&html[pos..]);
            return out;
        };
        out.push_str(&html[pos..start]);
        match lower[start..].find(close) {
            Some(end) => pos = start + end + close.len(),
            None => return out,
        }
    }
}

/// Strip script/style blocks and tags, collapse whitespace, decode common entities.
fn html_to_text(html: &str) -> String {
    let text = strip_blocks(html);
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

pub fn web_fetch_tool(max_output_bytes: usize) -> Result<Tool, ToolError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("agentloop/", env!("CARGO_PKG_VERSION")))
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| ToolError::Failed(format!("building http client: {}", e)))?;
    Ok(Tool::new(
        "web_fetch",
        "Fetch a URL over HTTP(S) and return its text content. HTML is reduced to plain text.",
        InputSchema::new().required("url", FieldKind::String, "http:// or https:// URL"),
        Arc::new(WebFetch {
            client,
            max_body_bytes: MAX_BODY_BYTES,
            max_output_bytes,
        }),
    ))
}
