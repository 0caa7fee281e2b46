use std::io::{self, IoSlice, Write};
use std::time::SystemTime;

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes the status line, Date, headers and cookies of `resp`,
/// terminated by the blank line.
///
/// Content-Length always reflects the body that is actually sent.
pub fn serialize_head(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    push_header(&mut buf, "Date", &httpdate::fmt_http_date(SystemTime::now()));

    for (k, v) in &resp.headers {
        if k.eq_ignore_ascii_case("Content-Length") || k.eq_ignore_ascii_case("Date") {
            continue;
        }
        push_header(&mut buf, k, v);
    }
    push_header(&mut buf, "Content-Length", &resp.body.len().to_string());

    for cookie in &resp.cookies {
        let mut line = format!("{}={}", cookie.name, cookie.value);
        if let Some(max_age) = cookie.max_age {
            line.push_str(&format!("; max-age={max_age}"));
        }
        push_header(&mut buf, "Set-Cookie", &line);
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");
    buf
}

fn push_header(buf: &mut Vec<u8>, key: &str, value: &str) {
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// A response split into a header block and a body block, written with
/// vectored writes.
pub struct ResponseWriter {
    head: Vec<u8>,
    body: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: Response) -> Self {
        Self {
            head: serialize_head(&response),
            body: response.body,
            written: 0,
        }
    }

    /// Drops the body block while keeping its Content-Length, for HEAD.
    pub fn without_body(mut self) -> Self {
        self.body.clear();
        self
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn total(&self) -> usize {
        self.head.len() + self.body.len()
    }

    /// Writes both blocks, continuing after partial writes.
    pub fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        while self.written < self.total() {
            let result = if self.written < self.head.len() {
                out.write_vectored(&[
                    IoSlice::new(&self.head[self.written..]),
                    IoSlice::new(&self.body),
                ])
            } else {
                let offset = self.written - self.head.len();
                out.write_vectored(&[IoSlice::new(&self.body[offset..])])
            };

            match result {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        out.flush()
    }
}
