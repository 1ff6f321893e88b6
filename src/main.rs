use anyhow::Result;
use tracing::info;

use mailglance::config::Config;
use mailglance::mail::imap::ImapConnector;
use mailglance::server;

fn tracer() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "mailglance=info,tower_http=info")
    }
    tracer();

    let (config, created, path) = Config::load_or_create()?;
    if created {
        info!(path = %path.display(), "wrote default configuration");
    }

    let connector = ImapConnector::new(config.retrieval.trust_localhost_certs);
    server::run(config, connector).await
}
