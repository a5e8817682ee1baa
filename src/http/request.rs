use std::fmt;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::ParseError;

use super::headers::{self, Headers};

pub const METHOD_GET: &str = "GET";
pub const METHOD_HEAD: &str = "HEAD";

/// Which listener a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed inbound request. Header keys preserve the case they arrived
/// with; repeated keys accumulate values in arrival order.
#[derive(Debug, Clone)]
pub struct Request {
    pub scheme: Scheme,
    pub method: String,
    pub path: String,
    pub host: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl Request {
    /// Read exactly one request off `reader`, never consuming past its end,
    /// so the same reader can yield the next kept-alive request.
    ///
    /// GET and HEAD stop at the header terminator. Other methods read a body
    /// of exactly `Content-Length` bytes; with no `Content-Length` the body
    /// is empty. Lines may end in CRLF or bare LF.
    pub async fn parse<R>(reader: &mut R, scheme: Scheme) -> Result<Self, ParseError>
    where
        R: AsyncBufRead + Unpin,
    {
        let control = match read_logical_line(reader).await? {
            Some(line) => line,
            None => return Err(ParseError::NoData),
        };

        // The HTTP version token is read but never interpreted.
        let mut tokens = control.split_whitespace();
        let (method, path) = match (tokens.next(), tokens.next()) {
            (Some(method), Some(path)) => (method.to_string(), path.to_string()),
            _ => return Err(ParseError::Malformed(format!("request line {control:?}"))),
        };

        let mut request = Request {
            scheme,
            method,
            path,
            host: String::new(),
            headers: Headers::new(),
            body: Vec::new(),
        };

        while let Some(line) = read_logical_line(reader).await? {
            if line.is_empty() {
                break;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            if request.host.is_empty() && name.eq_ignore_ascii_case(headers::HOST) {
                request.host = value.to_string();
            }
            request.headers.add(name, value);
        }

        if request.method == METHOD_GET || request.method == METHOD_HEAD {
            return Ok(request);
        }

        let Some(length) = request.headers.first_ignore_case(headers::CONTENT_LENGTH) else {
            return Ok(request);
        };
        let length: usize = length
            .parse()
            .map_err(|_| ParseError::Malformed(format!("content length {length:?}")))?;

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        request.body = body;

        Ok(request)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Read one `\n`-terminated line, tolerating a missing terminator at EOF and
/// stripping at most one trailing CR. `None` means the stream ended before
/// any bytes arrived.
async fn read_logical_line<R>(reader: &mut R) -> Result<Option<String>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut raw = Vec::new();
    let n = reader.read_until(b'\n', &mut raw).await?;
    if n == 0 {
        return Ok(None);
    }

    if raw.last() == Some(&b'\n') {
        raw.pop();
    }
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }

    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}
