use crate::config::InfluxSettings;
use crate::errors::{Error, Result};
use crate::model::{FieldValue, Point};
use std::fmt::Write as _;
use std::time::Duration;
use tracing::{debug, info, warn};

const HTTP_TIMEOUT_SECS: u64 = 30;

/// InfluxDB v2 write endpoint for one org/bucket.
#[derive(Debug, Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    write_url: String,
    token: String,
}

impl InfluxClient {
    pub fn new(settings: &InfluxSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        let mut url = reqwest::Url::parse(&format!(
            "{}/api/v2/write",
            settings.url.trim_end_matches('/')
        ))
        .map_err(|e| Error::InfluxUrl {
            url: settings.url.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("org", &settings.org)
            .append_pair("bucket", &settings.bucket)
            .append_pair("precision", "s");

        info!(
            "InfluxDB: {} (org {}, bucket {})",
            settings.url, settings.org, settings.bucket
        );

        Ok(Self {
            http,
            write_url: url.to_string(),
            token: settings.token.clone(),
        })
    }

    /// Writes a batch and returns how many lines InfluxDB accepted.
    pub async fn write(&self, points: &[Point]) -> Result<usize> {
        let (body, lines) = encode_batch(points);
        if lines == 0 {
            return Ok(0);
        }
        debug!("Writing {} points ({} bytes)", lines, body.len());

        let response = self
            .http
            .post(&self.write_url)
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", self.token))
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Write { status, body });
        }

        Ok(lines)
    }
}

/// Line protocol for a batch, one point per line, and the number of lines.
/// Points that cannot be represented are dropped with a warning.
pub fn encode_batch(points: &[Point]) -> (String, usize) {
    let mut body = String::with_capacity(points.len() * 64);
    let mut lines = 0;
    for point in points {
        match encode_point(point) {
            Some(line) => {
                body.push_str(&line);
                body.push('\n');
                lines += 1;
            }
            None => warn!(
                "Dropping {} for {:?}: value {:?} is not finite",
                point.measurement, point.tags, point.value
            ),
        }
    }
    (body, lines)
}

/// `measurement,tag=v,... value=<field> <unix seconds>`
pub fn encode_point(point: &Point) -> Option<String> {
    let field = match &point.value {
        FieldValue::Float(v) if v.is_finite() => format!("{}", v),
        FieldValue::Float(_) => return None,
        FieldValue::Text(s) => format!("\"{}\"", escape_string_field(s)),
    };

    let mut line = escape(&point.measurement, &[',', ' ']);
    for (key, value) in &point.tags {
        // Empty tag values are not allowed.
        if value.is_empty() {
            continue;
        }
        let _ = write!(
            line,
            ",{}={}",
            escape(key, &[',', '=', ' ']),
            escape(value, &[',', '=', ' '])
        );
    }
    let _ = write!(line, " value={} {}", field, point.timestamp.timestamp());
    Some(line)
}

/// Escapes a measurement name or tag. Line breaks become spaces, and a
/// run of backslashes is dropped when it would end the token or escape a
/// delimiter.
fn escape(input: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            let mut run = 1;
            while chars.next_if_eq(&'\\').is_some() {
                run += 1;
            }
            if chars.peek().is_some_and(|next| !special.contains(next)) {
                out.extend(std::iter::repeat('\\').take(run));
            }
            continue;
        }
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_string_field(input: &str) -> String {
    input.replace('\\', "\\\\").replace('"', "\\\"")
}
