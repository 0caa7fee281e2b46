use connector::error::ParseError;
use connector::http::parser::{parse_cookies, parse_pairs, parse_request};
use connector::http::request::Method;

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_request(req).unwrap();

    assert_eq!(*parsed.method(), Method::GET);
    assert_eq!(parsed.path(), "/");
    assert_eq!(parsed.version(), "HTTP/1.1");
    assert_eq!(parsed.header("Host"), Some("example.com"));
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_multi_valued_query() {
    let req = b"GET /s?a=1&a=2&b=x HTTP/1.1\r\n\r\n";
    let (parsed, _) = parse_request(req).unwrap();

    assert_eq!(parsed.path(), "/s");
    assert_eq!(parsed.query(), Some("a=1&a=2&b=x"));
    assert_eq!(parsed.parameter_values("a").unwrap(), ["1", "2"]);
    assert_eq!(parsed.parameter_values("b").unwrap(), ["x"]);
    assert_eq!(parsed.parameter("a"), Some("1"));
}

#[test]
fn test_parse_percent_decoding() {
    let req = b"GET /docs/my%20file.txt?q=a%26b&name=J+Doe HTTP/1.1\r\n\r\n";
    let (parsed, _) = parse_request(req).unwrap();

    assert_eq!(parsed.path(), "/docs/my file.txt");
    assert_eq!(parsed.parameter("q"), Some("a&b"));
    assert_eq!(parsed.parameter("name"), Some("J Doe"));
}

#[test]
fn test_parse_pair_without_equals_is_protocol_error() {
    let req = b"GET /s?flag HTTP/1.1\r\n\r\n";

    assert!(matches!(parse_request(req), Err(ParseError::Protocol(_))));
}

#[test]
fn test_parse_multiple_headers() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let (parsed, _) = parse_request(req).unwrap();

    assert_eq!(parsed.header("Host"), Some("example.com"));
    assert_eq!(parsed.header("User-Agent"), Some("test-client"));
    assert_eq!(parsed.header("Accept"), Some("*/*"));
}

#[test]
fn test_parse_duplicate_header_overwrites() {
    let req = b"GET / HTTP/1.1\r\nX-Trace: first\r\nX-Trace: second\r\n\r\n";
    let (parsed, _) = parse_request(req).unwrap();

    assert_eq!(parsed.header("X-Trace"), Some("second"));
}

#[test]
fn test_parse_cookies() {
    let req = b"GET / HTTP/1.1\r\nCookie: SESSIONID=abc; theme=dark; broken\r\n\r\n";
    let (parsed, _) = parse_request(req).unwrap();

    assert_eq!(parsed.cookie("SESSIONID"), Some("abc"));
    assert_eq!(parsed.cookie("theme"), Some("dark"));
    assert_eq!(parsed.cookies().len(), 2);
}

#[test]
fn test_parse_form_post_line() {
    let req = b"POST /login HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\nuser=ann&tag=a&tag=b\r\n";
    let (parsed, consumed) = parse_request(req).unwrap();

    assert_eq!(*parsed.method(), Method::POST);
    assert_eq!(parsed.parameter("user"), Some("ann"));
    assert_eq!(parsed.parameter_values("tag").unwrap(), ["a", "b"]);
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_form_post_merges_with_query() {
    let req = b"POST /f?tag=q HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 5\r\n\r\ntag=b";
    let (parsed, consumed) = parse_request(req).unwrap();

    assert_eq!(parsed.parameter_values("tag").unwrap(), ["q", "b"]);
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_form_post_waits_for_line() {
    let req = b"POST /login HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\nuser=an";

    assert!(matches!(parse_request(req), Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_pipelined_requests() {
    let req = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
    let (first, consumed) = parse_request(req).unwrap();
    let (second, rest) = parse_request(&req[consumed..]).unwrap();

    assert_eq!(first.path(), "/a");
    assert_eq!(second.path(), "/b");
    assert_eq!(consumed + rest, req.len());
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    let result = parse_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_unknown_method_is_kept() {
    let req = b"BREW /pot HTTP/1.1\r\n\r\n";
    let (parsed, _) = parse_request(req).unwrap();

    assert_eq!(*parsed.method(), Method::Other("BREW".to_string()));
}

#[test]
fn test_parse_malformed_request_line() {
    assert!(matches!(
        parse_request(b"GET /\r\n\r\n"),
        Err(ParseError::Protocol(_))
    ));
    assert!(matches!(
        parse_request(b"get / HTTP/1.1\r\n\r\n"),
        Err(ParseError::Protocol(_))
    ));
    assert!(matches!(
        parse_request(b"GET / FTP/1.0\r\n\r\n"),
        Err(ParseError::Protocol(_))
    ));
}

#[test]
fn test_parse_malformed_header() {
    let req = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";
    let result = parse_request(req);

    assert!(matches!(result, Err(ParseError::Protocol(_))));
}

#[test]
fn test_parse_various_http_methods() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ];

    for (method_str, expected_method) in methods {
        let req = format!("{} / HTTP/1.1\r\n\r\n", method_str);
        let (parsed, _) = parse_request(req.as_bytes()).unwrap();
        assert_eq!(*parsed.method(), expected_method);
    }
}

#[test]
fn test_parse_pairs_skips_empty_segments() {
    let pairs = parse_pairs("a=1&&b=").unwrap();

    assert_eq!(
        pairs,
        vec![("a".to_string(), "1".to_string()), ("b".to_string(), String::new())]
    );
}

#[test]
fn test_parse_cookies_trims_whitespace() {
    let cookies = parse_cookies(" a = 1 ;b=2");

    assert_eq!(
        cookies,
        vec![("a".to_string(), "1".to_string()), ("b".to_string(), "2".to_string())]
    );
}

#[test]
fn test_parse_encoded_question_mark_stays_in_path() {
    let req = b"GET /a%3Fb.html HTTP/1.1\r\n\r\n";
    let (parsed, _) = parse_request(req).unwrap();

    assert_eq!(parsed.path(), "/a?b.html");
    assert_eq!(parsed.query(), None);
    assert!(parsed.parameter_values("b.html").is_none());
}

#[test]
fn test_parse_encoded_question_mark_with_real_query() {
    let req = b"GET /a%3Fb?x=1 HTTP/1.1\r\n\r\n";
    let (parsed, _) = parse_request(req).unwrap();

    assert_eq!(parsed.path(), "/a?b");
    assert_eq!(parsed.query(), Some("x=1"));
    assert_eq!(parsed.parameter("x"), Some("1"));
}

#[test]
fn test_parse_bare_lf_line_endings() {
    let req = b"GET / HTTP/1.1\nHost: x\n\n";
    let (parsed, consumed) = parse_request(req).unwrap();

    assert_eq!(parsed.path(), "/");
    assert_eq!(parsed.header("Host"), Some("x"));
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_bare_lf_pipelined_and_form() {
    let req = b"POST /login HTTP/1.1\nContent-Type: application/x-www-form-urlencoded\n\nuser=ann\nGET /b HTTP/1.1\n\n";
    let (first, consumed) = parse_request(req).unwrap();
    let (second, rest) = parse_request(&req[consumed..]).unwrap();

    assert_eq!(first.parameter("user"), Some("ann"));
    assert_eq!(second.path(), "/b");
    assert_eq!(consumed + rest, req.len());
}
