#[tokio::main]
async fn main() {
    campwatch_rust::run().await;
}
