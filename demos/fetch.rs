//! Fetch every URL given on the command line concurrently.
//!
//! `cargo run --example fetch --features logging -- http://example.com/`
//!
//! Set `FETCH_CONFIG` to a JSON file to override client settings.
use std::time::Duration;

use bytes::Bytes;
use eventloop_http::{Config, CurlTransport, HttpClientEngine, Method, PollingLoop, ResponseHandler};

struct Print {
    url: String,
}

impl ResponseHandler for Print {
    fn on_success(&mut self, body: Bytes) {
        println!("{}: {} bytes", self.url, body.len());
        println!("{}", String::from_utf8_lossy(&body));
    }

    fn on_error(&mut self, message: String) {
        println!("{}: error: {}", self.url, message);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = match std::env::var_os("FETCH_CONFIG") {
        Some(path) => Config::from_json_slice(&std::fs::read(path)?)?,
        None => Config::default(),
    };

    let transport = CurlTransport::new(&config)?;
    let mut engine = HttpClientEngine::with_config(transport, PollingLoop::new()?, &config);
    for url in std::env::args().skip(1) {
        let id = engine.start_request(&url, Method::Get, None, Print { url: url.clone() });
        println!("started {id} {url}");
    }

    engine.run_until_idle(Some(Duration::from_secs(60)))?;
    Ok(())
}
