use futures_util::StreamExt;
use resilient_http::{Chunk, HttpEngine, Payload, RequestOptions, RequestSpec};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://api.example.com/data".to_owned());
    let stream = std::env::args().any(|arg| arg == "--stream");

    let engine = HttpEngine::new().with_options(RequestOptions {
        stream,
        ..RequestOptions::from_env()?
    });

    let spec = RequestSpec::get(&url)?.header("Accept", "application/json")?;
    let response = engine.execute(spec).await?;
    println!("status: {}", response.status);

    match response.payload {
        Payload::Json(value) => println!("{value:#}"),
        Payload::Text(text) => println!("{text}"),
        Payload::Bytes(bytes) => println!("<{} bytes>", bytes.len()),
        Payload::Stream(mut chunks) => {
            while let Some(chunk) = chunks.next().await {
                match chunk? {
                    Chunk::Json(value) => println!("{value}"),
                    Chunk::Bytes(bytes) => println!("<{} bytes>", bytes.len()),
                }
            }
        }
    }

    Ok(())
}
