//! Live pose feed over loopback UDP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use arcapture::{
    CaptureConfig, CaptureController, Plane, PointCloudPoint, Pose, Quat, SpatialSource,
    StreamConfig, StreamingSink, StreamingState, Vec3,
};
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout, Instant};

fn loopback() -> StreamConfig {
    StreamConfig {
        bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        send_port: 0,
        listen_port: 0,
    }
}

async fn peer() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn wait_for_state(sink: &StreamingSink, expected: StreamingState) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while sink.state() != expected {
        assert!(Instant::now() < deadline, "sink never reached {expected}");
        sleep(Duration::from_millis(5)).await;
    }
}

async fn recv_line(socket: &UdpSocket) -> Option<(String, SocketAddr)> {
    let mut buf = [0u8; 256];
    match timeout(Duration::from_millis(300), socket.recv_from(&mut buf)).await {
        Ok(Ok((len, from))) => Some((String::from_utf8_lossy(&buf[..len]).into_owned(), from)),
        _ => None,
    }
}

#[tokio::test]
async fn test_discovery_binds_first_sender() {
    let sink = StreamingSink::bind(&loopback()).await.unwrap();
    let first = peer().await;
    let second = peer().await;

    sink.start();
    assert!(!sink.push_pose(&Pose::identity()).unwrap());
    assert!(recv_line(&first).await.is_none());

    first.send_to(b"hi", sink.listen_addr()).await.unwrap();
    wait_for_state(&sink, StreamingState::Streaming).await;
    assert_eq!(sink.peer(), Some(first.local_addr().unwrap()));

    let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::IDENTITY);
    assert!(sink.push_pose(&pose).unwrap());
    let (line, from) = recv_line(&first).await.unwrap();
    assert_eq!(line, "c 1 2 3 0 0 0 1");
    assert_eq!(from, sink.send_addr());

    // A later sender does not steal the feed
    second.send_to(b"me too", sink.listen_addr()).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.peer(), Some(first.local_addr().unwrap()));
    assert!(sink.push_pose(&pose).unwrap());
    assert!(recv_line(&first).await.is_some());
    assert!(recv_line(&second).await.is_none());
}

#[tokio::test]
async fn test_stop_forgets_peer() {
    let sink = StreamingSink::bind(&loopback()).await.unwrap();
    let client = peer().await;

    sink.start();
    client.send_to(b"hi", sink.listen_addr()).await.unwrap();
    wait_for_state(&sink, StreamingState::Streaming).await;

    sink.stop();
    assert_eq!(sink.state(), StreamingState::Idle);
    assert!(sink.peer().is_none());
    assert!(!sink.push_pose(&Pose::identity()).unwrap());

    assert_eq!(sink.start(), StreamingState::AwaitingPeer);
    assert!(!sink.push_pose(&Pose::identity()).unwrap());

    // The listener kept running across stop/start
    client.send_to(b"again", sink.listen_addr()).await.unwrap();
    wait_for_state(&sink, StreamingState::Streaming).await;
}

#[tokio::test]
async fn test_datagrams_while_idle_are_ignored() {
    let sink = StreamingSink::bind(&loopback()).await.unwrap();
    let client = peer().await;

    client.send_to(b"early", sink.listen_addr()).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.state(), StreamingState::Idle);

    sink.start();
    assert_eq!(sink.state(), StreamingState::AwaitingPeer);
}

struct Empty;

impl SpatialSource for Empty {
    fn point_cloud(&self) -> Vec<PointCloudPoint> {
        Vec::new()
    }

    fn planes(&self) -> Vec<Plane> {
        Vec::new()
    }
}

#[tokio::test]
async fn test_controller_streams_pose_each_tick() {
    let sink = StreamingSink::bind(&loopback()).await.unwrap();
    let listen_addr = sink.listen_addr();
    let mut controller = CaptureController::new(CaptureConfig::default()).with_streaming(sink);
    let client = peer().await;

    controller.start_streaming();
    controller.tick(0.0, Pose::identity(), &Empty).unwrap();
    assert!(recv_line(&client).await.is_none());

    client.send_to(b"hi", listen_addr).await.unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while controller.streaming_state() != StreamingState::Streaming {
        assert!(Instant::now() < deadline);
        sleep(Duration::from_millis(5)).await;
    }

    for time in [0.1, 0.2] {
        controller.tick(time, Pose::identity(), &Empty).unwrap();
        let (line, _) = recv_line(&client).await.unwrap();
        assert_eq!(line, "c 0 0 0 0 0 0 1");
    }

    assert_eq!(controller.toggle_streaming(), StreamingState::Idle);
    controller.tick(0.3, Pose::identity(), &Empty).unwrap();
    assert!(recv_line(&client).await.is_none());
}
