use mockito::{Mock, Server};
use std::{num::NonZeroUsize, time::Duration};
use tracing_logtail::{LogtailClient, logtail::CancellationToken, reporter::Reporter};
use tracing_subscriber::{Layer as _, filter::filter_fn, layer::SubscriberExt};

async fn wait_matched(mock: &Mock) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !mock.matched_async().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("mock was not hit in time");
}

#[tokio::test]
async fn events_are_shipped_as_json_array() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer secret-token")
        .match_header("content-type", "application/json")
        .match_body(concat!(
            r#"[{"level":"INFO","message":"first","target":"layer","user":"ferris"},"#,
            r#"{"level":"WARN","message":"second","target":"layer"}]"#
        ))
        .with_status(202)
        .expect(1)
        .create_async()
        .await;

    let client = LogtailClient::builder()
        .source_token("secret-token")
        .endpoint(&server.url())
        .https_only(false)
        .build()
        .unwrap();
    let reporter = Reporter::with_capacity(client, NonZeroUsize::new(16).unwrap());
    let cancel = CancellationToken::new();
    let reporting = reporter
        .reporting()
        .unwrap()
        .with_batch_size(NonZeroUsize::new(2).unwrap())
        .with_idle_timeout(Duration::from_secs(30))
        .with_cancellation_token(cancel.clone());
    let handle = tokio::spawn(reporting.start());

    let layer = tracing_logtail::layer(reporter.clone())
        .without_time()
        .with_filter(filter_fn(|metadata| metadata.target() == "layer"));
    let subscriber = tracing_subscriber::registry().with(layer);
    {
        let _guard = tracing::subscriber::set_default(subscriber);
        tracing::info!(user = "ferris", "first");
        tracing::warn!("second");
    }

    wait_matched(&mock).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    mock.assert_async().await;
    assert_eq!(reporter.dropped(), 0);
}
