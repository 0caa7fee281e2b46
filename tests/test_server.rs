use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use connector::config::Config;
use connector::handler::Router;
use connector::http::request::Request;
use connector::http::response::Response;
use connector::server::Server;

struct Reply {
    status: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(server: &Server) -> Self {
        let stream = TcpStream::connect(server.local_addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        Self {
            writer: stream.try_clone().unwrap(),
            reader: BufReader::new(stream),
        }
    }

    fn send(&mut self, raw: &str) {
        self.writer.write_all(raw.as_bytes()).unwrap();
    }

    fn read_reply(&mut self, with_body: bool) -> Reply {
        let mut status_line = String::new();
        self.reader.read_line(&mut status_line).unwrap();
        let status = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();

        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            self.reader.read_line(&mut line).unwrap();
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').unwrap();
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let length: usize = headers["content-length"].parse().unwrap();
        let mut body = vec![0; if with_body { length } else { 0 }];
        self.reader.read_exact(&mut body).unwrap();
        Reply {
            status,
            headers,
            body,
        }
    }

    fn request(&mut self, raw: &str) -> Reply {
        self.send(raw);
        self.read_reply(true)
    }

    /// True if nothing arrives within `wait`.
    fn is_quiet(&mut self, wait: Duration) -> bool {
        self.reader.get_ref().set_read_timeout(Some(wait)).unwrap();
        let mut buf = [0u8; 1];
        let quiet = matches!(
            self.reader.read(&mut buf),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        );
        self.reader.get_ref().set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        quiet
    }

    /// True once the server has closed the connection.
    fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(self.reader.read(&mut buf), Ok(0) | Err(_))
    }
}

fn config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        poller_threads: 2,
        worker_threads: 4,
        ..Config::default()
    }
}

fn routes() -> Router {
    Router::new()
        .get("/hello", |_req: &mut Request| Ok(Response::text("hello")))
        .get("/echo", |req: &mut Request| {
            Ok(Response::text(req.parameter("msg").unwrap_or("").to_string()))
        })
        .post("/login", |req: &mut Request| {
            let user = req.parameter("user").unwrap_or("nobody").to_string();
            if let Some(session) = req.session() {
                session.set_attribute("user", user);
            }
            Ok(Response::redirect("/whoami"))
        })
        .get("/whoami", |req: &mut Request| {
            let user = req
                .session()
                .and_then(|s| s.attribute("user"))
                .unwrap_or_else(|| "anonymous".to_string());
            Ok(Response::text(user))
        })
        .get("/slow", |_req: &mut Request| {
            thread::sleep(Duration::from_millis(200));
            Ok(Response::text("slow"))
        })
        .get("/panic", |_req: &mut Request| -> anyhow::Result<Response> {
            panic!("handler exploded")
        })
}

fn start(config: Config) -> Server {
    Server::start(&config, Arc::new(routes())).unwrap()
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

#[test]
fn test_keep_alive_serves_several_requests() {
    let server = start(config());
    let mut client = Client::connect(&server);

    for msg in ["one", "two", "three"] {
        let reply = client.request(&format!("GET /echo?msg={msg} HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, msg.as_bytes());
    }
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_connection_close_header_closes_socket() {
    let server = start(config());
    let mut client = Client::connect(&server);

    let reply = client.request("GET /hello HTTP/1.1\r\nConnection: close\r\n\r\n");

    assert_eq!(reply.status, 200);
    assert!(client.is_closed());
    assert!(wait_until(Duration::from_secs(2), || server.connection_count() == 0));
}

#[test]
fn test_pipelined_requests_are_all_answered() {
    let server = start(config());
    let mut client = Client::connect(&server);

    client.send("GET /echo?msg=a HTTP/1.1\r\n\r\nGET /echo?msg=b HTTP/1.1\r\n\r\n");

    assert_eq!(client.read_reply(true).body, b"a");
    assert_eq!(client.read_reply(true).body, b"b");
}

#[test]
fn test_requests_sent_during_slow_handler_get_one_reply_each() {
    let server = start(config());
    let mut client = Client::connect(&server);

    client.send("GET /slow HTTP/1.1\r\n\r\n");
    thread::sleep(Duration::from_millis(50));
    client.send("GET /echo?msg=a HTTP/1.1\r\n\r\n");
    thread::sleep(Duration::from_millis(50));
    client.send("GET /echo?msg=b HTTP/1.1\r\n\r\n");

    assert_eq!(client.read_reply(true).body, b"slow");
    assert_eq!(client.read_reply(true).body, b"a");
    assert_eq!(client.read_reply(true).body, b"b");
    assert!(client.is_quiet(Duration::from_millis(300)));

    assert_eq!(client.request("GET /hello HTTP/1.1\r\n\r\n").body, b"hello");
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_unrouted_path_falls_back_to_static_files() {
    let root = tempfile::tempdir().unwrap();
    fs::write(root.path().join("page.html"), "<p>static</p>").unwrap();
    let server = start(Config {
        static_root: root.path().to_path_buf(),
        ..config()
    });
    let mut client = Client::connect(&server);

    let found = client.request("GET /page.html HTTP/1.1\r\n\r\n");
    assert_eq!(found.status, 200);
    assert_eq!(found.body, b"<p>static</p>");
    assert!(found.headers["content-type"].starts_with("text/html"));

    let missing = client.request("GET /missing.html HTTP/1.1\r\n\r\n");
    assert_eq!(missing.status, 404);
}

#[test]
fn test_wrong_method_is_405() {
    let server = start(config());
    let mut client = Client::connect(&server);

    let reply = client.request("POST /hello HTTP/1.1\r\n\r\n");

    assert_eq!(reply.status, 405);
    assert!(String::from_utf8_lossy(&reply.body).contains("405 Method Not Allowed"));
}

#[test]
fn test_handler_panic_is_500_and_server_survives() {
    let server = start(config());
    let mut client = Client::connect(&server);

    let reply = client.request("GET /panic HTTP/1.1\r\n\r\n");
    assert_eq!(reply.status, 500);
    assert!(String::from_utf8_lossy(&reply.body).contains("handler exploded"));

    let reply = client.request("GET /hello HTTP/1.1\r\n\r\n");
    assert_eq!(reply.status, 200);
}

#[test]
fn test_malformed_request_is_400_then_closed() {
    let server = start(config());
    let mut client = Client::connect(&server);

    let reply = client.request("GET /s?novalue HTTP/1.1\r\n\r\n");

    assert_eq!(reply.status, 400);
    assert!(client.is_closed());
}

#[test]
fn test_head_request_has_no_body() {
    let server = start(config());
    let mut client = Client::connect(&server);

    client.send("HEAD /hello HTTP/1.1\r\n\r\n");
    let reply = client.read_reply(false);
    assert_eq!(reply.status, 200);
    assert_eq!(reply.headers["content-length"], "5");

    let next = client.request("GET /hello HTTP/1.1\r\n\r\n");
    assert_eq!(next.body, b"hello");
}

#[test]
fn test_session_cookie_round_trip() {
    let server = start(config());
    let mut client = Client::connect(&server);

    let login = client.request(
        "POST /login HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n\r\nuser=ann\r\n",
    );
    assert_eq!(login.status, 302);
    let cookie = login.headers["set-cookie"].clone();
    let session_id = cookie.strip_prefix("SESSIONID=").unwrap();

    let whoami = client.request(&format!(
        "GET /whoami HTTP/1.1\r\nCookie: SESSIONID={session_id}\r\n\r\n"
    ));
    assert_eq!(whoami.body, b"ann");
    assert!(!whoami.headers.contains_key("set-cookie"));

    let stranger = client.request("GET /whoami HTTP/1.1\r\n\r\n");
    assert_eq!(stranger.body, b"anonymous");
    assert!(stranger.headers.contains_key("set-cookie"));
}

#[test]
fn test_idle_connection_is_evicted() {
    let server = start(Config {
        connection_idle_ms: 100,
        connection_eviction_ms: 25,
        ..config()
    });
    let mut client = Client::connect(&server);
    assert_eq!(client.request("GET /hello HTTP/1.1\r\n\r\n").status, 200);

    assert!(client.is_closed());
    assert!(wait_until(Duration::from_secs(2), || server.connection_count() == 0));
}

#[test]
fn test_active_connection_is_not_evicted() {
    let server = start(Config {
        connection_idle_ms: 600,
        connection_eviction_ms: 25,
        ..config()
    });
    let mut client = Client::connect(&server);

    for _ in 0..8 {
        assert_eq!(client.request("GET /hello HTTP/1.1\r\n\r\n").status, 200);
        thread::sleep(Duration::from_millis(100));
    }
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_connections_spread_across_pollers() {
    let server = start(Config {
        poller_threads: 3,
        ..config()
    });

    let mut clients: Vec<Client> = (0..6).map(|_| Client::connect(&server)).collect();
    for client in &mut clients {
        assert_eq!(client.request("GET /hello HTTP/1.1\r\n\r\n").status, 200);
    }

    let counts: Vec<usize> = server.pollers().iter().map(|p| p.connection_count()).collect();
    assert_eq!(counts, vec![2, 2, 2]);
}

#[test]
fn test_stop_closes_connections_and_is_idempotent() {
    let server = start(config());
    let mut client = Client::connect(&server);
    assert_eq!(client.request("GET /hello HTTP/1.1\r\n\r\n").status, 200);

    server.stop();
    server.stop();

    assert!(!server.is_running());
    assert!(client.is_closed());
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn test_bind_conflict_fails_start() {
    let first = start(config());
    let taken = Config {
        port: first.local_addr().port(),
        ..config()
    };

    let result = Server::start(&taken, Arc::new(routes()));

    assert!(matches!(
        result,
        Err(connector::error::ServerError::Bind { .. })
    ));
}
