#[tokio::main]
async fn main() {
    let _guard = valorant_rpc_lib::init_logging();

    if let Err(e) = valorant_rpc_lib::run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}
