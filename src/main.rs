#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    scanflow::run().await?;
    Ok(())
}
