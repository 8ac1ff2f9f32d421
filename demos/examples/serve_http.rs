//! Starts the Cowork HTTP server and blocks until it's killed.
//!
//! Run: `cargo run -p cowork-demos --example serve_http -- 127.0.0.1:8080`

use std::env;

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    let addr = env::args().nth(1);

    if let Err(e) = cowork_serve::run_serve(addr.as_deref(), Vec::new()).await {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}
