use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    bugyield::run().await
}
