#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    vmemo::app::run().await
}
