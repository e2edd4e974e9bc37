#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ecotrack_client::run().await
}
