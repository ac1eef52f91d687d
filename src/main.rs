#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tabpilot_cli::cli::run().await
}
