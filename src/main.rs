#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lapkiosk::run().await
}
