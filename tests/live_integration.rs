use resilient_http::{HttpEngine, HttpError, Payload, RequestOptions};

fn load_live_url() -> Result<String, String> {
    let url = std::env::var("RESILIENT_HTTP_LIVE_URL")
        .map_err(|_| "RESILIENT_HTTP_LIVE_URL env is required".to_owned())?;
    if url.trim().is_empty() {
        return Err("RESILIENT_HTTP_LIVE_URL is set but empty".to_owned());
    }
    Ok(url.trim().to_owned())
}

#[tokio::test]
async fn live_buffered_and_streamed_fetch() {
    let url = match load_live_url() {
        Ok(url) => url,
        Err(_) => {
            eprintln!("skipping live test: RESILIENT_HTTP_LIVE_URL not set");
            return;
        }
    };

    let engine = HttpEngine::from_env().expect("RESILIENT_HTTP_* env must be valid");

    let buffered = engine.get(&url).await;
    match buffered {
        Ok(response) => {
            assert!(response.is_success());
            assert!(!matches!(response.payload, Payload::Stream(_)));
        }
        Err(HttpError::Status { status, .. }) => {
            panic!("live endpoint answered with error status {status}")
        }
        Err(err) => panic!("live fetch failed: {err}"),
    }

    let streamed_opts = RequestOptions {
        stream: true,
        ..engine.options().clone()
    };
    let spec = resilient_http::RequestSpec::get(&url).expect("live url must parse");
    let body = engine
        .execute_with(spec, &streamed_opts)
        .await
        .expect("streamed fetch must succeed")
        .into_stream()
        .expect("must be a stream");

    // NDJSON endpoints yield JSON chunks, which cannot be collected as bytes.
    match body.collect_bytes().await {
        Ok(bytes) => assert!(!bytes.is_empty()),
        Err(HttpError::Decode(_)) => {}
        Err(err) => panic!("stream failed: {err}"),
    }
}
