use std::sync::Arc;

use metrics_receiver_statsd::{ChannelSink, Event, ListenerBuilder, Telemetry};
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt::init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create runtime");

    let telemetry = Telemetry::new();
    let (sink, events) = ChannelSink::unbounded(telemetry.clone());
    let sink = Arc::new(sink);

    // Drain events on a plain thread, the way a downstream aggregator would.
    std::thread::spawn(move || {
        for batch in events {
            for event in batch {
                match &event {
                    Event::Gauge(gauge) => info!(
                        name = gauge.name(),
                        value = gauge.value(),
                        relative = gauge.relative(),
                        labels = ?gauge.labels(),
                        "gauge"
                    ),
                    other => info!(
                        kind = ?other.kind(),
                        name = other.name(),
                        value = other.value(),
                        labels = ?other.labels(),
                        "event"
                    ),
                }
            }
        }
    });

    let result = runtime.block_on(async move {
        let mut builder = ListenerBuilder::new().with_telemetry(telemetry);

        let udp = std::net::UdpSocket::bind("127.0.0.1:9125").expect("failed to bind UDP socket");
        let tcp = std::net::TcpListener::bind("127.0.0.1:9125").expect("failed to bind TCP listener");

        let mut listeners = vec![
            builder.build_udp(udp, sink.clone()).expect("failed to build UDP listener"),
            builder.build_tcp(tcp, sink.clone()).expect("failed to build TCP listener"),
        ];

        #[cfg(unix)]
        if let Some(path) = std::env::args().nth(1) {
            let _ = std::fs::remove_file(&path);
            let socket = std::os::unix::net::UnixDatagram::bind(&path).expect("failed to bind Unix datagram socket");
            listeners.push(builder.build_unixgram(socket, sink.clone()).expect("failed to build Unix listener"));
        }

        let mut tasks = tokio::task::JoinSet::new();
        for listener in listeners {
            info!(transport = %listener.transport(), "Starting listener.");
            tasks.spawn(listener.listen());
        }

        // Any listener stopping is fatal for the whole receiver.
        match tasks.join_next().await {
            Some(Ok(result)) => result.map_err(|e| e.to_string()),
            Some(Err(e)) => Err(e.to_string()),
            None => Ok(()),
        }
    });

    if let Err(e) = result {
        error!(error = %e, "Listener stopped.");
        std::process::exit(1);
    }
}
