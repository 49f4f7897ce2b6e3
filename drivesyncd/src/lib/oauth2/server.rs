//! Just enough HTTP to receive the OAuth2 redirect on the loopback interface.

use std::str;

use anyhow::Context;
use chrono::Utc;
use http::{Method, StatusCode, Uri};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt};

/// Reads the request line and the headers of a request.
/// Returns the request target. The body, if any, is not read.
pub async fn read_request<R>(reader: R) -> anyhow::Result<Uri>
where
    R: io::AsyncBufRead,
{
    tokio::pin!(reader);

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    if line.is_empty() {
        anyhow::bail!("Empty HTTP request");
    }
    let (method, uri) = parse_request_line(&line)?;
    if method != Method::GET {
        anyhow::bail!("Unexpected method {method} for the OAuth2 redirect");
    }

    loop {
        line.clear();
        let sz = reader.read_line(&mut line).await?;
        if sz == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }
    Ok(uri)
}

fn parse_request_line(line: &str) -> anyhow::Result<(Method, Uri)> {
    let mut parts = line.trim_end().split(' ');
    let method = parts
        .next()
        .filter(|m| !m.is_empty())
        .with_context(|| format!("no method in request line {line:?}"))?;
    let method = Method::from_bytes(method.as_bytes())
        .with_context(|| format!("Unrecognized method: {method}"))?;
    let uri = parts
        .next()
        .with_context(|| format!("no target in request line {line:?}"))?
        .parse()?;
    match parts.next() {
        Some(proto) if proto.starts_with("HTTP/1.") => Ok((method, uri)),
        _ => anyhow::bail!("unsupported protocol in request line {line:?}"),
    }
}

/// Returns the value of `key` in the query string of `uri`.
/// Values are percent-decoded.
pub fn query_value(uri: &Uri, key: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Writes a plain text response and closes the connection.
pub async fn write_response<W>(writer: W, status: StatusCode, body: &str) -> anyhow::Result<()>
where
    W: io::AsyncWrite,
{
    tokio::pin!(writer);

    let head = format!(
        "HTTP/1.1 {status}\r\nDate: {}\r\nServer: drivesyncd\r\nConnection: close\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n",
        Utc::now().to_rfc2822(),
        body.len(),
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
