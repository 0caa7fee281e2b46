use std::sync::Arc;

use anyhow::Context;
use connector::http::request::Request;
use connector::http::response::Response;
use connector::{Config, Router, Server, logging};

const USER_KEY: &str = "user";

fn routes() -> Router {
    Router::new()
        .get("/", |_req: &mut Request| {
            Ok(Response::text("connector is running\n"))
        })
        .get("/echo", |req: &mut Request| {
            let mut names: Vec<_> = req.params().keys().cloned().collect();
            names.sort();
            let body: String = names
                .iter()
                .map(|name| format!("{name}={}\n", req.params()[name].join(",")))
                .collect();
            Ok(Response::text(body))
        })
        .post("/login", |req: &mut Request| {
            let user = req
                .parameter("user")
                .context("missing form field `user`")?
                .to_string();
            let session = req.session().context("no session attached")?;
            session.set_attribute(USER_KEY, user);
            Ok(Response::redirect("/whoami"))
        })
        .get("/whoami", |req: &mut Request| {
            let user = req
                .session()
                .and_then(|s| s.attribute(USER_KEY))
                .unwrap_or_else(|| "anonymous".to_string());
            Ok(Response::text(format!("{user}\n")))
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _log_guard = logging::init()?;

    let cfg = Config::load()?;
    let server = Server::start(&cfg, Arc::new(routes()))?;
    tracing::info!(addr = %server.local_addr(), "accepting connections");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    tokio::task::spawn_blocking(move || server.stop()).await?;
    Ok(())
}
