#[tokio::main]
async fn main() -> anyhow::Result<()> {
    docgate::cli::run().await
}
