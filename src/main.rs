#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    listing_gate::server::run().await
}
