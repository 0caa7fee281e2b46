use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::handler::session::Session;

/// Form content type whose single body line is merged into the parameters.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP request methods.
///
/// The connector routes on GET, POST and HEAD. Other well-known verbs are
/// recognized so routes can reject them with 405, and anything else is kept
/// verbatim in [`Method::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data
    POST,
    /// HEAD - Like GET but without the response body
    HEAD,
    PUT,
    DELETE,
    OPTIONS,
    PATCH,
    /// Any other token found on the request line
    Other(String),
}

impl Method {
    /// Parses a well-known HTTP method.
    ///
    /// # Example
    ///
    /// ```
    /// # use connector::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "HEAD" => Some(Method::HEAD),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::HEAD => "HEAD",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-valued request parameters, values kept in arrival order per key.
pub type Params = HashMap<String, Vec<String>>;

/// A fully received HTTP request.
///
/// Everything except the attribute bag is fixed once the parser (and the
/// worker, for the session) has built it.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: String,
    path: String,
    query: Option<String>,
    version: String,
    headers: HashMap<String, String>,
    params: Params,
    cookies: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    session: Option<Arc<Session>>,
    attributes: HashMap<String, String>,
}

/// Builder for constructing Request objects.
#[derive(Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    uri: Option<String>,
    target: Option<(String, Option<String>)>,
    version: Option<String>,
    headers: HashMap<String, String>,
    params: Params,
    cookies: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the (already decoded) request target, query string included.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self.target = None;
        self
    }

    /// Sets an already decoded path and the raw query separately, so a
    /// decoded `?` inside the path stays part of the path.
    pub fn target(mut self, path: impl Into<String>, query: Option<String>) -> Self {
        let path = path.into();
        self.uri = Some(match &query {
            Some(query) => format!("{path}?{query}"),
            None => path.clone(),
        });
        self.target = Some((path, query));
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Inserts a header; a repeated name replaces the earlier value.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Appends one value to a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let uri = self.uri.ok_or("uri missing")?;
        let (path, query) = match self.target {
            Some(target) => target,
            None => match uri.split_once('?') {
                Some((path, query)) => (path.to_string(), Some(query.to_string())),
                None => (uri.clone(), None),
            },
        };

        Ok(Request {
            method: self.method.ok_or("method missing")?,
            uri,
            path,
            query,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            params: self.params,
            cookies: self.cookies,
            remote_addr: self.remote_addr,
            session: None,
            attributes: HashMap::new(),
        })
    }
}

impl Request {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The decoded request target as it appeared on the request line.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The target without its query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Retrieves a header value by name.
    ///
    /// An exact match wins; otherwise names are compared ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(key)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(key))
                    .map(|(_, value)| value)
            })
            .map(|v| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// First value of a parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(|values| values.first())
            .map(|v| v.as_str())
    }

    /// All values of a parameter in arrival order.
    pub fn parameter_values(&self, key: &str) -> Option<&[String]> {
        self.params.get(key).map(|values| values.as_slice())
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(|v| v.as_str())
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|v| v.as_str())
    }

    /// Stores a request-scoped value for downstream rendering, returning the
    /// previous value.
    pub fn set_attribute(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.attributes.insert(key.into(), value.into())
    }

    /// Whether the body line of this request carries form parameters.
    pub fn is_form_post(&self) -> bool {
        self.method == Method::POST
            && self
                .content_type()
                .is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE))
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// HTTP/1.1 persistence applies unless the Connection header asks to close.
    pub fn keep_alive(&self) -> bool {
        !self
            .header("Connection")
            .is_some_and(|v| v.to_ascii_lowercase().contains("close"))
    }

    pub(crate) fn append_param(&mut self, key: String, value: String) {
        self.params.entry(key).or_default().push(value);
    }

    pub(crate) fn insert_cookie(&mut self, name: String, value: String) {
        self.cookies.insert(name, value);
    }

    pub(crate) fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    pub(crate) fn attach_session(&mut self, session: Arc<Session>) {
        self.session = Some(session);
    }
}
