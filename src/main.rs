/// Quartermaster server binary
///
/// Loads configuration, opens the inventory database, starts the background
/// jobs and serves the HTTP API.
use quartermaster::{config::ServerConfig, context::AppContext, error::QmResult, jobs, server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> QmResult<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quartermaster=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    let config = ServerConfig::from_env()?;
    let ctx = Arc::new(AppContext::new(config).await?);

    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ____    __  ___
  / __ \  /  |/  /
 / / / / / /|_/ /     Quartermaster v{}
/ /_/ / / /  / /      Account inventory server
\___\_\/_/  /_/
"#,
        env!("CARGO_PKG_VERSION")
    );
}
