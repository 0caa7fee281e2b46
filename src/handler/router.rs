use std::collections::HashMap;

use tracing::warn;

use crate::error::HandlerError;
use crate::handler::Handler;
use crate::http::request::{Method, Request};
use crate::http::response::Response;

type RouteFn = Box<dyn Fn(&mut Request) -> anyhow::Result<Response> + Send + Sync>;

/// Method a route is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    Any,
    Only(Method),
}

impl RouteMethod {
    /// A `GET` route also answers `HEAD`; the body is dropped on write.
    fn allows(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Only(Method::GET) => matches!(method, Method::GET | Method::HEAD),
            Self::Only(bound) => bound == method,
        }
    }
}

struct Route {
    method: RouteMethod,
    handler: RouteFn,
}

/// Exact-path dispatch table.
///
/// Paths without a route fall through to the static-resource fallback; a
/// path bound to another method answers 405.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(mut self, path: impl Into<String>, method: RouteMethod, handler: F) -> Self
    where
        F: Fn(&mut Request) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        let path = path.into();
        let previous = self.routes.insert(
            path.clone(),
            Route {
                method,
                handler: Box::new(handler),
            },
        );
        if previous.is_some() {
            warn!(path = %path, "route replaced");
        }
        self
    }

    pub fn get<F>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Request) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        self.route(path, RouteMethod::Only(Method::GET), handler)
    }

    pub fn post<F>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Request) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        self.route(path, RouteMethod::Only(Method::POST), handler)
    }

    pub fn any<F>(self, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Request) -> anyhow::Result<Response> + Send + Sync + 'static,
    {
        self.route(path, RouteMethod::Any, handler)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl Handler for Router {
    fn handle(&self, request: &mut Request) -> Result<Option<Response>, HandlerError> {
        let Some(route) = self.routes.get(request.path()) else {
            return Ok(None);
        };

        if !route.method.allows(request.method()) {
            return Err(HandlerError::MethodNotSupported(
                request.method().to_string(),
            ));
        }

        (route.handler)(request)
            .map(Some)
            .map_err(|e| HandlerError::Failure(format!("{e:#}")))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut paths: Vec<_> = self.routes.keys().collect();
        paths.sort();
        f.debug_struct("Router").field("routes", &paths).finish()
    }
}
