use url::form_urlencoded;

use crate::error::ParseError;
use crate::http::request::{Method, Request, RequestBuilder};

/// Upper bound on a buffered request head (and on a pending form line).
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Parses one request from the front of `buf`. Lines may end in CRLF or a
/// bare LF.
///
/// Returns the request and the number of bytes it occupied, or
/// [`ParseError::Incomplete`] when more input is needed. Only the request
/// head is framed; a form POST contributes exactly one further line, whose
/// end is a line terminator or, for clients that send none, the declared
/// Content-Length.
pub fn parse_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    // Stray line breaks between pipelined requests are skipped.
    let start = buf
        .iter()
        .position(|b| *b != b'\r' && *b != b'\n')
        .unwrap_or(buf.len());
    let buf_rest = &buf[start..];

    let (headers_end, body_start) = match find_headers_end(buf_rest) {
        Some(bounds) => bounds,
        None if buf_rest.len() > MAX_HEAD_BYTES => {
            return Err(ParseError::TooLarge {
                limit: MAX_HEAD_BYTES,
            });
        }
        None => return Err(ParseError::Incomplete),
    };

    let head = std::str::from_utf8(&buf_rest[..headers_end])
        .map_err(|_| ParseError::Protocol("request head is not valid UTF-8".into()))?;
    let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));

    let request_line = lines
        .next()
        .ok_or_else(|| ParseError::Protocol("missing request line".into()))?;
    let mut builder = parse_request_line(request_line)?;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::Protocol(format!("malformed header line: {line}")))?;
        builder = builder.header(key.trim(), value.trim());
    }

    let mut request = builder
        .build()
        .map_err(|e| ParseError::Protocol(e.to_string()))?;

    if let Some(header) = request.header("Cookie").map(str::to_owned) {
        for (name, value) in parse_cookies(&header) {
            request.insert_cookie(name, value);
        }
    }

    let mut consumed = start + body_start;

    if request.is_form_post() {
        let body = &buf_rest[body_start..];
        let (line, used) = read_form_line(body, request.header("Content-Length"))?;
        for (key, value) in parse_pairs(line)? {
            request.append_param(key, value);
        }
        consumed += used;
    }

    Ok((request, consumed))
}

fn parse_request_line(line: &str) -> Result<RequestBuilder, ParseError> {
    let mut parts = line.split_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::Protocol(format!("malformed request line: {line}")));
    };

    if !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(ParseError::Protocol(format!("invalid method token: {method}")));
    }
    if !version.starts_with("HTTP/") {
        return Err(ParseError::Protocol(format!("invalid protocol version: {version}")));
    }

    let method = Method::from_str(method).unwrap_or_else(|| Method::Other(method.to_string()));

    let (raw_path, raw_query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };
    let path = urlencoding::decode(raw_path)
        .map_err(|_| ParseError::Protocol(format!("undecodable path: {raw_path}")))?;

    let mut builder = RequestBuilder::new()
        .method(method)
        .target(path.into_owned(), raw_query.map(str::to_string))
        .version(version);
    if let Some(query) = raw_query {
        for (key, value) in parse_pairs(query)? {
            builder = builder.param(key, value);
        }
    }
    Ok(builder)
}

/// Splits `a=1&b=2` into decoded pairs in arrival order.
///
/// Empty segments are skipped; a segment without `=` is malformed.
pub fn parse_pairs(input: &str) -> Result<Vec<(String, String)>, ParseError> {
    let mut pairs = Vec::new();
    for segment in input.split('&').filter(|s| !s.is_empty()) {
        if !segment.contains('=') {
            return Err(ParseError::Protocol(format!("parameter without '=': {segment}")));
        }
        if let Some((key, value)) = form_urlencoded::parse(segment.as_bytes()).next() {
            pairs.push((key.into_owned(), value.into_owned()));
        }
    }
    Ok(pairs)
}

/// Parses a Cookie header on `;` then `=`; later names overwrite earlier ones.
pub fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|fragment| fragment.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

/// Returns the form line and how many body bytes it used.
///
/// The line ends at the first line terminator unless a declared
/// Content-Length ends it sooner.
fn read_form_line<'a>(
    body: &'a [u8],
    content_length: Option<&str>,
) -> Result<(&'a str, usize), ParseError> {
    let declared = content_length
        .map(|v| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| ParseError::Protocol(format!("invalid Content-Length: {v}")))
        })
        .transpose()?;
    let newline = body.iter().position(|b| *b == b'\n');

    let (line, used) = match (newline, declared) {
        (Some(pos), Some(len)) if pos >= len && body.len() >= len => (&body[..len], len),
        (Some(pos), _) => {
            let line = &body[..pos];
            (line.strip_suffix(b"\r").unwrap_or(line), pos + 1)
        }
        (None, Some(len)) if body.len() >= len => (&body[..len], len),
        _ if body.len() > MAX_HEAD_BYTES => {
            return Err(ParseError::TooLarge {
                limit: MAX_HEAD_BYTES,
            });
        }
        _ => return Err(ParseError::Incomplete),
    };

    let line = std::str::from_utf8(line)
        .map_err(|_| ParseError::Protocol("form body is not valid UTF-8".into()))?;
    Ok((line, used))
}

/// Locates the blank line ending the head. Lines may end in CRLF or a bare
/// LF. Returns the head length (without its final line break) and the offset
/// of the first body byte.
fn find_headers_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = buf[from..].iter().position(|b| *b == b'\n') {
        let nl = from + offset;
        match buf.get(nl + 1..) {
            Some([b'\n', ..]) => return Some((nl, nl + 2)),
            Some([b'\r', b'\n', ..]) => return Some((nl, nl + 3)),
            _ => from = nl + 1,
        }
    }
    None
}
