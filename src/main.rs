#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    if let Err(err) = users_server::server::run().await {
        tracing::error!("Error: {:#}", err);
        std::process::exit(1);
    }
}
