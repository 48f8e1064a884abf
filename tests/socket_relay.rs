//! Live relay over a real listener: dashboard sockets, socket producers and
//! the simulator's socket sink.

mod common;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use gabaylakad::{
    api,
    domain::{LocationUpdate, NewDevice, SensorPacket},
    relay::{ClientMessage, ServerMessage},
    simulator::{SocketSink, TelemetrySink},
    state::AppState,
};
use std::{net::SocketAddr, time::Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });
    addr
}

fn packet(serial: &str) -> SensorPacket {
    SensorPacket {
        serial_number: serial.to_string(),
        latitude: 13.6218,
        longitude: 123.1948,
        address: Some("Plaza Rizal, Naga".to_string()),
        poi: Some("Plaza Rizal".to_string()),
        battery_level: 72,
        is_charging: false,
        reflector_on: false,
        alert: None,
        activity: None,
        recorded_at: None,
    }
}

async fn next_server_message<S>(ws: &mut S) -> ServerMessage
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame before timeout")
            .expect("socket open")
            .expect("frame ok");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).expect("server frame parses");
        }
    }
}

/// Subscriptions are registered after the upgrade completes.
async fn wait_for_subscribers(state: &AppState, n: usize) {
    for _ in 0..100 {
        if state.relay.subscriber_count() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} socket subscribers");
}

#[tokio::test]
async fn sensor_reading_is_acked_and_broadcast() {
    let state = common::test_state();
    let device = state
        .store
        .create_device(&NewDevice::with_serial("GL-0001"))
        .await
        .unwrap();
    let addr = serve(state.clone()).await;
    let url = format!("ws://{addr}/ws");

    let (mut dashboard, _) = connect_async(url.as_str()).await.unwrap();
    let (mut cane, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_subscribers(&state, 2).await;

    let frame = serde_json::to_string(&ClientMessage::SensorReading(packet("GL-0001"))).unwrap();
    cane.send(Message::Text(frame)).await.unwrap();

    match next_server_message(&mut dashboard).await {
        ServerMessage::LocationUpdate(update) => {
            assert_eq!(update.device_id, device.device_id);
            assert_eq!(update.poi.as_deref(), Some("Plaza Rizal"));
        }
        other => panic!("expected location_update, got {other:?}"),
    }

    // the producer sees its own broadcast as well as the ack
    let mut acked = false;
    for _ in 0..2 {
        if let ServerMessage::Ack { serial_number, .. } = next_server_message(&mut cane).await {
            assert_eq!(serial_number, "GL-0001");
            acked = true;
        }
    }
    assert!(acked);
}

#[tokio::test]
async fn location_update_frames_are_relayed_to_other_clients() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;
    let url = format!("ws://{addr}/ws");

    let (mut dashboard, _) = connect_async(url.as_str()).await.unwrap();
    let (mut phone, _) = connect_async(url.as_str()).await.unwrap();
    wait_for_subscribers(&state, 2).await;

    let update = LocationUpdate {
        device_id: 7,
        serial_number: Some("GL-0007".to_string()),
        latitude: 13.6240,
        longitude: 123.1862,
        address: Some("Magsaysay Avenue, Naga".to_string()),
        poi: None,
        recorded_at: Utc::now(),
    };
    let frame = serde_json::to_string(&ClientMessage::LocationUpdate(update.clone())).unwrap();
    phone.send(Message::Text(frame)).await.unwrap();

    match next_server_message(&mut dashboard).await {
        ServerMessage::LocationUpdate(relayed) => assert_eq!(relayed, update),
        other => panic!("expected location_update, got {other:?}"),
    }
    // relayed frames are not persisted
    assert!(state.store.latest_location(7).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_serial_gets_an_error_frame() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;
    let (mut cane, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    let frame = serde_json::to_string(&ClientMessage::SensorReading(packet("GL-404"))).unwrap();
    cane.send(Message::Text(frame)).await.unwrap();

    match next_server_message(&mut cane).await {
        ServerMessage::Error { message } => assert!(message.contains("GL-404")),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_frames_get_an_error_and_keep_the_socket_open() {
    let state = common::test_state();
    let addr = serve(state.clone()).await;
    let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();

    client.send(Message::Text("{not json".to_string())).await.unwrap();
    assert!(matches!(
        next_server_message(&mut client).await,
        ServerMessage::Error { .. }
    ));

    client
        .send(Message::Text(r#"{"event":"bogus","data":{}}"#.to_string()))
        .await
        .unwrap();
    assert!(matches!(
        next_server_message(&mut client).await,
        ServerMessage::Error { .. }
    ));
}

#[tokio::test]
async fn simulator_socket_sink_delivers() {
    let state = common::test_state();
    let device = state
        .store
        .create_device(&NewDevice::with_serial("GL-0001"))
        .await
        .unwrap();
    let addr = serve(state.clone()).await;

    let sink = SocketSink::new(format!("ws://{addr}/ws"), Duration::from_secs(5));
    sink.send(&packet("GL-0001")).await.unwrap();
    sink.send(&packet("GL-0001")).await.unwrap();

    let latest = state.store.latest_location(device.device_id).await.unwrap();
    assert!(latest.is_some());
    assert!(sink.send(&packet("GL-404")).await.is_err());
}
