//! End-to-end tests against a local WebSocket server.
//!
//! The server accepts one connection at a time and forwards whatever the
//! test queues: text or binary frames, or an abrupt drop of the socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::SinkExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use mlc_realtime::{
    forward_events, BackoffConfig, ChannelConfig, ChannelError, ChannelSupervisor, EventChannel,
    InfoKind, NotificationMailbox, PageLocation,
};

const WAIT: Duration = Duration::from_secs(5);

enum ServerCmd {
    Text(String),
    Binary(Vec<u8>),
    Drop,
}

struct TestServer {
    addr: SocketAddr,
    commands: mpsc::UnboundedSender<ServerCmd>,
    accepted: watch::Receiver<usize>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands, mut rx) = mpsc::unbounded_channel();
        let (accepted_tx, accepted) = watch::channel(0usize);
        let paths = Arc::new(Mutex::new(Vec::new()));
        let seen = paths.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let seen = seen.clone();
                let callback =
                    move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
                        seen.lock().unwrap().push(req.uri().path().to_string());
                        Ok(response)
                    };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                accepted_tx.send_modify(|n| *n += 1);

                loop {
                    match rx.recv().await {
                        Some(ServerCmd::Text(text)) => {
                            if ws.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(ServerCmd::Binary(data)) => {
                            if ws.send(Message::Binary(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(ServerCmd::Drop) => break,
                        None => return,
                    }
                }
            }
        });

        Self {
            addr,
            commands,
            accepted,
            paths,
        }
    }

    fn page(&self) -> PageLocation {
        PageLocation::new(false, self.addr.to_string(), "/console/")
    }

    fn send(&self, frame: &str) {
        self.commands.send(ServerCmd::Text(frame.to_string())).unwrap();
    }

    fn send_binary(&self, data: &[u8]) {
        self.commands.send(ServerCmd::Binary(data.to_vec())).unwrap();
    }

    fn drop_connection(&self) {
        self.commands.send(ServerCmd::Drop).unwrap();
    }

    async fn wait_for_connections(&self, count: usize) {
        let mut accepted = self.accepted.clone();
        tokio::time::timeout(WAIT, accepted.wait_for(|n| *n >= count))
            .await
            .expect("connection not accepted in time")
            .unwrap();
    }
}

/// Records every value an observer sees, in order
fn recorder() -> (
    impl Fn(&InfoKind) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<InfoKind>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer = move |kind: &InfoKind| {
        let _ = tx.send(*kind);
    };
    (observer, rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<InfoKind>) -> InfoKind {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("no event in time")
        .expect("recorder dropped")
}

fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        initial_delay_ms: 10,
        max_delay_ms: 50,
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts: None,
    }
}

#[tokio::test]
async fn test_cell_follows_frames_in_order() {
    let server = TestServer::start().await;
    let channel = assert_ok!(
        EventChannel::open(&server.page(), "/data/info", &ChannelConfig::default()).await
    );
    assert_eq!(channel.endpoint().as_str(), format!("ws://{}/console/data/info", server.addr));

    let (observer, mut events) = recorder();
    let _sub = channel.subscribe(observer);
    assert_eq!(next_event(&mut events).await, InfoKind::None);

    server.send("\"ProjectSaved\"");
    server.send("{\"UniversePatchChanged\":3}");
    server.send("\"ProjectSaved\"");
    server.send("{\"UniversePatchChanged\":{\"universe_index\":7}}");

    assert_eq!(next_event(&mut events).await, InfoKind::ProjectSaved);
    assert_eq!(
        next_event(&mut events).await,
        InfoKind::UniversePatchChanged { universe_index: 3 }
    );
    assert_eq!(next_event(&mut events).await, InfoKind::ProjectSaved);
    assert_eq!(
        next_event(&mut events).await,
        InfoKind::UniversePatchChanged { universe_index: 7 }
    );
    assert_eq!(channel.current(), InfoKind::UniversePatchChanged { universe_index: 7 });

    assert_eq!(
        server.paths.lock().unwrap().as_slice(),
        ["/console/data/info".to_string()]
    );
    channel.close();
}

#[tokio::test]
async fn test_undecodable_frames_are_dropped() {
    let server = TestServer::start().await;
    let channel = assert_ok!(
        EventChannel::open(&server.page(), "/data/info", &ChannelConfig::default()).await
    );
    let (observer, mut events) = recorder();
    let _sub = channel.subscribe(observer);
    assert_eq!(next_event(&mut events).await, InfoKind::None);

    server.send("not json");
    server.send("\"SomethingNew\"");
    server.send("{\"UniversePatchChanged\":70000}");
    server.send_binary(&[0x01, 0x02]);
    server.send("\"ProjectLoaded\"");

    // Only the valid frame comes through, and the cell never saw the others
    assert_eq!(next_event(&mut events).await, InfoKind::ProjectLoaded);
    assert!(events.try_recv().is_err());
    assert!(channel.is_open());
}

#[tokio::test]
async fn test_no_changes_after_close() {
    let server = TestServer::start().await;
    let channel = assert_ok!(
        EventChannel::open(&server.page(), "/data/info", &ChannelConfig::default()).await
    );
    let (observer, mut events) = recorder();
    let _sub = channel.subscribe(observer);
    assert_eq!(next_event(&mut events).await, InfoKind::None);

    server.send("\"ProjectSaved\"");
    assert_eq!(next_event(&mut events).await, InfoKind::ProjectSaved);

    channel.close();
    channel.close();
    assert!(!channel.is_open());

    server.send("\"SystemShutdown\"");
    tokio::time::timeout(WAIT, channel.closed())
        .await
        .expect("reader did not stop");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(channel.current(), InfoKind::ProjectSaved);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_close_from_inside_observer() {
    let server = TestServer::start().await;
    let channel = Arc::new(assert_ok!(
        EventChannel::open(&server.page(), "/data/info", &ChannelConfig::default()).await
    ));

    let weak = Arc::downgrade(&channel);
    let _closer = channel.subscribe(move |kind| {
        if *kind == InfoKind::SystemShutdown {
            if let Some(channel) = weak.upgrade() {
                channel.close();
            }
        }
    });

    server.send("\"SystemShutdown\"");
    server.send("\"ProjectLoaded\"");

    tokio::time::timeout(WAIT, channel.closed())
        .await
        .expect("close from observer deadlocked");
    assert_eq!(channel.current(), InfoKind::SystemShutdown);
}

#[tokio::test]
async fn test_frames_queued_before_close_are_discarded() {
    let server = TestServer::start().await;
    let channel = Arc::new(assert_ok!(
        EventChannel::open(&server.page(), "/data/info", &ChannelConfig::default()).await
    ));

    let (observer, mut events) = recorder();
    let _recorder = channel.subscribe(observer);
    assert_eq!(next_event(&mut events).await, InfoKind::None);

    let weak = Arc::downgrade(&channel);
    let _closer = channel.subscribe(move |kind| {
        if *kind == InfoKind::ProjectSaved {
            if let Some(channel) = weak.upgrade() {
                channel.close();
            }
        }
    });

    // One burst: everything after the first frame is already on the wire
    // when the observer closes the channel
    server.send("\"ProjectSaved\"");
    server.send("\"ProjectLoaded\"");
    server.send("{\"UniversePatchChanged\":1}");
    server.send("\"SystemShutdown\"");

    assert_eq!(next_event(&mut events).await, InfoKind::ProjectSaved);
    tokio::time::timeout(WAIT, channel.closed())
        .await
        .expect("reader did not stop");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(channel.current(), InfoKind::ProjectSaved);
    assert!(events.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_during_slow_subscribe_while_frame_arrives() {
    let server = TestServer::start().await;
    let channel = Arc::new(assert_ok!(
        EventChannel::open(&server.page(), "/data/info", &ChannelConfig::default()).await
    ));

    // Subscribe from a plain thread; the replayed first call holds the
    // subscribe turn for a while and then closes the channel
    let subscriber = {
        let channel = channel.clone();
        tokio::task::spawn_blocking(move || {
            let weak = Arc::downgrade(&channel);
            let first = AtomicBool::new(true);
            let _sub = channel.subscribe(move |_| {
                if first.swap(false, Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(400));
                    if let Some(channel) = weak.upgrade() {
                        channel.close();
                    }
                }
            });
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    server.send("\"ProjectSaved\"");

    tokio::time::timeout(Duration::from_secs(3), subscriber)
        .await
        .expect("subscribe and close deadlocked against the reader")
        .unwrap();
    tokio::time::timeout(WAIT, channel.closed())
        .await
        .expect("reader did not stop");

    // The frame waited for the subscribe turn and found the channel closed
    assert_eq!(channel.current(), InfoKind::None);
}

#[tokio::test]
async fn test_server_drop_ends_channel() {
    let server = TestServer::start().await;
    let channel = assert_ok!(
        EventChannel::open(&server.page(), "/data/info", &ChannelConfig::default()).await
    );
    server.send("\"EffectListChanged\"");
    server.drop_connection();

    tokio::time::timeout(WAIT, channel.closed())
        .await
        .expect("reader did not notice the drop");
    assert!(!channel.is_open());
    // Last value survives the connection
    assert_eq!(channel.current(), InfoKind::EffectListChanged);
}

#[tokio::test]
async fn test_open_fails_without_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let page = PageLocation::new(false, addr.to_string(), "/");
    let result = EventChannel::open(&page, "/data/info", &ChannelConfig::default()).await;
    let err = assert_err!(result);
    assert!(matches!(err, ChannelError::Connect { .. }));
}

#[tokio::test]
async fn test_supervisor_reconnects_after_drop() {
    let server = TestServer::start().await;
    let supervisor =
        ChannelSupervisor::new(server.page(), ChannelConfig::default(), fast_backoff());

    // Registered first so the mailbox is filled before the recorder sees an event
    let mailbox = Arc::new(NotificationMailbox::new());
    let _forward = forward_events(&supervisor.events(), mailbox.clone());

    let (observer, mut events) = recorder();
    let _sub = supervisor.subscribe(observer);
    assert_eq!(next_event(&mut events).await, InfoKind::None);

    let shutdown = supervisor.shutdown_signal();
    let handle = tokio::spawn(supervisor.run());

    server.wait_for_connections(1).await;
    server.send("\"ProjectSaved\"");
    assert_eq!(next_event(&mut events).await, InfoKind::ProjectSaved);

    server.drop_connection();
    server.wait_for_connections(2).await;

    server.send("\"SystemShutdown\"");
    assert_eq!(next_event(&mut events).await, InfoKind::SystemShutdown);

    let titles: Vec<String> = mailbox
        .pending()
        .iter()
        .map(|n| n.title().to_string())
        .collect();
    assert_eq!(titles, vec!["Project saved", "Engine shutting down"]);

    shutdown.send(()).unwrap();
    let result = tokio::time::timeout(WAIT, handle)
        .await
        .expect("supervisor did not stop")
        .unwrap();
    assert_ok!(result);
}
