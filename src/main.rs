use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use rester::{
    config, is_production, JwtValidator, Options, Permissions, Request, Resource, Response, Rester, Route, Routes,
    ValueType,
};

#[derive(Parser)]
#[command(name = "rester")]
#[command(about = "Rester demo server")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Port to listen on")]
    port: Option<u16>,

    #[arg(long, help = "Mount every resource under this version segment, e.g. v1")]
    api_version: Option<String>,

    #[arg(long, help = "RSA public key (PEM) used to verify bearer tokens")]
    public_key: Option<String>,
}

#[derive(Serialize)]
struct Message {
    message: String,
}

impl Message {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

struct Greeting;

async fn index(_req: Request) -> Response {
    Response::payload(Message::new("Hello World !"))
}

async fn admin(_req: Request) -> Response {
    Response::payload(Message::new("Hello Admin !"))
}

async fn pages(mut req: Request) -> Response {
    let page = match req.query("page") {
        Ok(page) => page.as_int(),
        Err(_) => return Response::bad_request("invalid page param"),
    };
    Response::payload(Message::new(format!("get request with query param page={}", page)))
}

impl Resource for Greeting {
    fn routes(&self) -> Routes {
        vec![
            Route::get("/", index),
            Route::get("/admin", admin).allow(Permissions::ADMIN),
            Route::get("/pages", pages).query("page", ValueType::Int, true),
        ]
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present so RESTER_* and SECURITY_* settings apply under cargo run
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = config::config().clone();
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(version) = cli.api_version {
        config.server.api_version = Some(version);
    }
    if let Some(path) = cli.public_key {
        config.security.jwt_public_key = Some(path);
    }

    tracing::info!("Starting rester in {:?} mode", config.environment);

    let mut options = Options::from_config(&config);
    if let Some(path) = &config.security.jwt_public_key {
        let pem = std::fs::read(path).with_context(|| format!("failed to read public key {}", path))?;
        let validator = JwtValidator::from_rsa_pem(&pem)
            .with_context(|| format!("invalid public key {}", path))?
            .with_leeway(config.security.jwt_leeway_secs);
        options = options.with_token_validator(validator);
    } else if let Some(secret) = &config.security.jwt_secret {
        let validator = JwtValidator::from_secret(secret.as_bytes()).with_leeway(config.security.jwt_leeway_secs);
        options = options.with_token_validator(validator);
    } else if is_production!() {
        tracing::warn!("No token key configured, every route is served without authentication");
    }

    let mut rester = Rester::new(options);
    rester.resource("/", &Greeting);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);
    rester.serve(listener).await.context("server")?;
    Ok(())
}
