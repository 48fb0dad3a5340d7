#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cardloft::run().await?;
    Ok(())
}
