// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use gelf_sink::{
    decode, Caller, Config, Envelope, Field, GelfSink, Level, LogRecord, Sink, SinkError,
    Transport,
};
use tokio::{
    io::AsyncReadExt,
    net::TcpListener,
    sync::mpsc,
    time::{timeout, Duration},
};

/// Accepts connections forever, forwarding each connection's bytes once it closes.
async fn start_log_server() -> (u16, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let port = listener.local_addr().expect("no local addr").port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                if socket.read_to_end(&mut received).await.is_ok() && !received.is_empty() {
                    let _ = tx.send(received);
                }
            });
        }
    });

    (port, rx)
}

fn split_frames(bytes: &[u8]) -> Vec<Envelope> {
    bytes
        .split_inclusive(|b| *b == 0)
        .map(|frame| {
            assert!(frame.ends_with(b"\n\0"), "frame not terminated: {frame:?}");
            decode(frame).expect("frame is not a GELF envelope")
        })
        .collect()
}

async fn collect_envelopes(
    rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    expected: usize,
) -> Vec<Envelope> {
    let mut envelopes = Vec::new();
    timeout(Duration::from_secs(5), async {
        while envelopes.len() < expected {
            let packet = rx.recv().await.expect("log server stopped");
            envelopes.extend(split_frames(&packet));
        }
    })
    .await
    .expect("timed out waiting for messages");
    envelopes
}

fn local_config(port: u16) -> Config {
    Config {
        app_name: "inventory".to_string(),
        app_version: "3.1.0".to_string(),
        hostname: "127.0.0.1".to_string(),
        port,
        flush_interval_ms: 50,
        source_host: Some("worker-9".to_string()),
        ..Config::default()
    }
}

#[tokio::test]
async fn sink_ships_framed_envelopes_over_tcp() {
    let (port, mut rx) = start_log_server().await;
    let sink = GelfSink::start(local_config(port)).await;
    assert!(sink.is_enabled());

    let scoped = sink.with_fields(vec![Field::new("tenant", "acme")]);
    scoped
        .write(
            &LogRecord::new(Level::Info, "stock reserved")
                .with_logger_name("reservations")
                .with_caller(Caller::new("/app/src/stock/reserve.rs", 88)),
            &[Field::new("sku", "A-100"), Field::new("quantity", 3)],
        )
        .expect("write failed");
    sink.write(
        &LogRecord::new(Level::Error, "payment declined").with_stack("declined by issuer"),
        &[],
    )
    .expect("write failed");

    let envelopes = collect_envelopes(&mut rx, 2).await;
    sink.shutdown().await;

    assert_eq!(envelopes.len(), 2);
    let find = |message: &str| {
        envelopes
            .iter()
            .find(|e| e.short_message == message)
            .expect("message not received")
    };
    let reserved = find("stock reserved");
    assert_eq!(reserved.version, "1.1");
    assert_eq!(reserved.host, "worker-9");
    assert_eq!(reserved.short_message, "stock reserved");
    assert_eq!(reserved.level, 6);
    assert_eq!(reserved.field("tenant"), Some("acme"));
    assert_eq!(reserved.field("sku"), Some("A-100"));
    assert_eq!(reserved.field("quantity"), Some("3"));
    assert_eq!(reserved.field("logger_name"), Some("reservations"));
    assert_eq!(reserved.field("app_name"), Some("inventory"));
    assert_eq!(reserved.field("app_version"), Some("3.1.0"));
    assert_eq!(reserved.field("line"), Some("88"));
    assert_eq!(reserved.field("package"), Some("stock/reserve.rs:88"));

    let declined = find("payment declined");
    assert_eq!(declined.level, 3);
    assert_eq!(declined.full_message.as_deref(), Some("declined by issuer"));
    assert_eq!(declined.field("tenant"), None);

    let stats = sink.stats();
    assert_eq!(stats.messages_sent, 2);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn shutdown_delivers_buffered_messages() {
    let (port, mut rx) = start_log_server().await;
    let sink = GelfSink::start(Config {
        flush_interval_ms: 10_000,
        ..local_config(port)
    })
    .await;

    for n in 0..50 {
        sink.write(&LogRecord::new(Level::Warn, format!("queued {n}")), &[])
            .expect("write failed");
    }
    sink.shutdown().await;

    let envelopes = collect_envelopes(&mut rx, 50).await;
    let messages: Vec<String> = envelopes.into_iter().map(|e| e.short_message).collect();
    let expected: Vec<String> = (0..50).map(|n| format!("queued {n}")).collect();
    assert_eq!(messages, expected);
}

#[tokio::test]
async fn unreachable_server_loses_messages_without_blocking() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind listener");
    let port = listener.local_addr().expect("no local addr").port();
    drop(listener);

    let sink = GelfSink::start(Config {
        acquire_timeout_ms: 200,
        ..local_config(port)
    })
    .await;
    assert!(sink.is_enabled());

    sink.write(&LogRecord::new(Level::Info, "into the void"), &[])
        .expect("write failed");
    timeout(Duration::from_secs(5), sink.shutdown())
        .await
        .expect("shutdown hung");

    let stats = sink.stats();
    assert_eq!(stats.messages_sent, 0);
    assert_eq!(stats.messages_lost, 1);
    assert_eq!(stats.packets_failed, 1);
}

#[tokio::test]
async fn udp_transport_disables_sink() {
    let sink = GelfSink::start(Config {
        transport: Transport::Udp,
        ..Config::default()
    })
    .await;

    assert!(!sink.is_enabled());
    assert!(!sink.enabled(Level::Fatal));
    assert!(matches!(
        sink.write(&LogRecord::new(Level::Info, "dropped"), &[]),
        Err(SinkError::Disabled)
    ));
}

#[tokio::test]
#[should_panic(expected = "Connection attempt to log server failed")]
async fn fail_on_init_error_panics() {
    let _sink = GelfSink::start(Config {
        transport: Transport::Udp,
        fail_on_init_error: true,
        ..Config::default()
    })
    .await;
}

#[test]
fn config_deserializes_from_json() {
    let config: Config = serde_json::from_str(
        r#"{"hostname":"graylog.internal","port":12202,"transport":"tcp","pool_max":8}"#,
    )
    .expect("config should parse");
    let config = config.normalize();

    assert_eq!(config.hostname, "graylog.internal");
    assert_eq!(config.port, 12202);
    assert_eq!(config.pool_max, 8);
    assert_eq!(config.app_name, "Sample-App");
}
