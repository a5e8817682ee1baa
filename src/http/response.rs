use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;

use super::headers::{self, Headers};

const HTTP_VERSION: &str = "HTTP/1.1";

/// An outbound response under construction. `content` is the uncompressed
/// payload; compression happens at serialization time.
#[derive(Debug, Clone)]
pub struct Response {
    pub http_version: &'static str,
    pub status_code: u16,
    pub headers: Headers,
    pub content: Vec<u8>,
}

impl Response {
    pub fn status(status_code: u16, content: Vec<u8>) -> Self {
        Self {
            http_version: HTTP_VERSION,
            status_code,
            headers: Headers::new(),
            content,
        }
    }

    pub fn ok(content: Vec<u8>) -> Self {
        Self::status(200, content)
    }

    pub fn no_content() -> Self {
        Self::status(204, Vec::new())
    }

    pub fn bad_request() -> Self {
        Self::error_page(400)
    }

    pub fn not_found() -> Self {
        Self::error_page(404)
    }

    pub fn unsupported_media_type() -> Self {
        Self::error_page(415)
    }

    pub fn bad_gateway() -> Self {
        Self::error_page(502)
    }

    pub fn moved_permanently(location: impl Into<String>) -> Self {
        let mut response = Self::error_page(301);
        response.headers.set(headers::LOCATION, location);
        response
    }

    fn error_page(status_code: u16) -> Self {
        let message = format!("{} {}", status_code, reason_phrase(status_code));
        Self::status(status_code, html_body(&message))
    }

    /// True when the payload already carries a gzip content encoding,
    /// e.g. passed through from an upstream.
    pub fn is_gzip_encoded(&self) -> bool {
        self.headers
            .first_ignore_case(headers::CONTENT_ENCODING)
            .map(|value| value.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false)
    }

    /// Serialize for the wire: status line, one line per header value, blank
    /// line, payload.
    ///
    /// `compress_gzip` compresses a non-empty, not-yet-encoded payload at
    /// best compression and rewrites `Content-Length` and
    /// `Content-Encoding` to match. `headers_only` (HEAD) drops the payload
    /// while `Content-Length` still reflects what the body would have been.
    pub fn to_bytes(&self, compress_gzip: bool, headers_only: bool) -> io::Result<Vec<u8>> {
        let compress_gzip = compress_gzip && !self.content.is_empty() && !self.is_gzip_encoded();

        let payload = if compress_gzip {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(&self.content)?;
            encoder.finish()?
        } else {
            self.content.clone()
        };

        let mut headers = self.headers.clone();
        if compress_gzip {
            headers.set(headers::CONTENT_ENCODING, "gzip");
        }
        if !payload.is_empty() {
            headers.set(headers::CONTENT_LENGTH, payload.len().to_string());
        }

        let mut out = Vec::with_capacity(payload.len() + 256);
        out.extend_from_slice(
            format!(
                "{} {} {}\n",
                self.http_version,
                self.status_code,
                reason_phrase(self.status_code)
            )
            .as_bytes(),
        );
        for (name, values) in headers.iter() {
            for value in values {
                out.extend_from_slice(format!("{name}: {value}\n").as_bytes());
            }
        }
        out.push(b'\n');

        if !headers_only {
            out.extend_from_slice(&payload);
        }

        Ok(out)
    }
}

fn html_body(message: &str) -> Vec<u8> {
    format!(
        "<HTML><HEAD><meta http-equiv=\"content-type\" content=\"text/html;charset=utf-8\">\n\
         <TITLE>{message}</TITLE></HEAD><BODY>\n\
         <H1>{message}</H1>\n\
         </BODY></HTML>\n"
    )
    .into_bytes()
}

/// Reason phrases for the statuses the server emits itself or commonly
/// proxies. Unknown codes get an empty phrase.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}
