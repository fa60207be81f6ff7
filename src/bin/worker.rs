#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = assessment_engine::run_worker().await {
        eprintln!("assessment-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
