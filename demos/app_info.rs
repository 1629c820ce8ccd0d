//! Fetches the reseller account summary using credentials from the environment.
//!
//! ```sh
//! IPPROXY_API_URL=https://sandbox.ipipv.com IPPROXY_APP_KEY=... IPPROXY_APP_SECRET=... \
//!     IPPROXY_APP_USERNAME=... RUST_LOG=ipipv_client=debug cargo run --example app_info
//! ```

#![expect(clippy::print_stdout, reason = "the demo reports to the terminal")]

use ipipv_client::upstream::{ClientConfig, Outcome, UpstreamClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = UpstreamClient::new(ClientConfig::from_env()?)?;

    match client.app_info().await? {
        Outcome::Success(payload) => {
            println!("{:?}: {:#}", payload.source(), payload.value());
        }
        Outcome::Rejected(rejection) => {
            println!(
                "rejected (code {:?}): {}",
                rejection.code,
                rejection.message.as_deref().unwrap_or("<no message>")
            );
        }
    }

    Ok(())
}
