use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    tradebot::run().await
}
