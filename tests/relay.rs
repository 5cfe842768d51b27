//! End-to-end tests over real TCP connections

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use chat_relay::{AppError, ChatRelay, ReadinessMode, ServerConfig};

const WAIT: Duration = Duration::from_secs(2);

struct Server {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), AppError>>,
}

impl Server {
    async fn start(config: ServerConfig) -> Self {
        let config = ServerConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            ..config
        };
        let relay = ChatRelay::bind(config).await.unwrap();
        let addr = relay.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(relay.run_until(async move {
            let _ = stopped.await;
        }));
        Self { addr, stop, task }
    }

    async fn stop(self) {
        let _ = self.stop.send(());
        timeout(WAIT, self.task).await.unwrap().unwrap().unwrap();
    }
}

struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    /// Connect and consume the welcome line
    async fn connect(addr: SocketAddr) -> (Self, String) {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        let mut peer = Self {
            lines: BufReader::new(read).lines(),
            writer,
        };
        let welcome = peer.next().await;
        (peer, welcome)
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn next(&mut self) -> String {
        self.try_next().await.expect("connection closed")
    }

    async fn try_next(&mut self) -> Option<String> {
        timeout(WAIT, self.lines.next_line()).await.unwrap().unwrap()
    }

    async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.next().await
    }
}

#[tokio::test]
async fn test_rooms_isolate_chat() {
    let server = Server::start(ServerConfig::default()).await;

    let (mut a, welcome) = Peer::connect(server.addr).await;
    assert!(welcome.contains("guest1"));
    let (mut b, _) = Peer::connect(server.addr).await;
    assert_eq!(a.next().await, "* guest2 connected");
    let (mut c, _) = Peer::connect(server.addr).await;
    assert_eq!(a.next().await, "* guest3 connected");
    assert_eq!(b.next().await, "* guest3 connected");

    assert_eq!(a.request("CMD:join:dev:").await, "* you are now in room 'dev'");
    assert_eq!(b.next().await, "* guest1 left room 'general'");
    assert_eq!(c.next().await, "* guest1 left room 'general'");

    a.send("CHAT:guest1:dev:hello dev").await;
    // The next thing B sees is its own reply, not A's chat
    assert_eq!(
        b.request("CMD:users::").await,
        "* users in 'general' (2): guest2, guest3"
    );

    assert_eq!(c.request("CMD:join:dev:").await, "* you are now in room 'dev'");
    assert_eq!(a.next().await, "* guest3 joined room 'dev'");
    assert_eq!(b.next().await, "* guest3 left room 'general'");

    a.send("CHAT:guest1:dev:welcome").await;
    assert_eq!(c.next().await, "[dev] guest1: welcome");

    server.stop().await;
}

#[tokio::test]
async fn test_errors_go_to_requester_only() {
    let server = Server::start(ServerConfig::default()).await;
    let (mut a, _) = Peer::connect(server.addr).await;
    let (mut b, _) = Peer::connect(server.addr).await;
    a.next().await;

    assert!(a
        .request("CMD:rm:general:")
        .await
        .starts_with("error: ProtectedRoom:"));
    assert!(a
        .request("WHISPER:guest1:Z:hi")
        .await
        .starts_with("error: UserNotFound:"));
    assert!(a.request("nonsense").await.starts_with("error: InvalidFormat:"));

    assert_eq!(b.request("CMD:list::").await, "* rooms (1): general (2)");
    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_reclaims_room() {
    let server = Server::start(ServerConfig::default()).await;
    let (mut a, _) = Peer::connect(server.addr).await;
    let (mut b, _) = Peer::connect(server.addr).await;
    a.next().await;

    b.request("CMD:join:dev:").await;
    assert_eq!(a.next().await, "* guest2 left room 'general'");
    assert_eq!(a.request("CMD:list::").await, "* rooms (2): dev (1), general (1)");

    drop(b);
    let mut rooms = String::new();
    for _ in 0..50 {
        rooms = a.request("CMD:list::").await;
        if rooms == "* rooms (1): general (1)" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(rooms, "* rooms (1): general (1)");
    server.stop().await;
}

#[tokio::test]
async fn test_sweep_mode_chat_and_whisper() {
    let config = ServerConfig {
        readiness: ReadinessMode::Sweep,
        ..ServerConfig::default()
    };
    let server = Server::start(config).await;
    let (mut a, _) = Peer::connect(server.addr).await;
    let (mut b, _) = Peer::connect(server.addr).await;
    a.next().await;

    assert_eq!(b.request("CMD:nickname:bob:").await, "* your nickname is now 'bob'");
    assert_eq!(a.next().await, "* guest2 is now known as bob");

    a.send("CHAT:guest1:general:hi: bob").await;
    assert_eq!(b.next().await, "[general] guest1: hi: bob");

    assert_eq!(a.request("WHISPER:guest1:bob:psst").await, "[whisper to bob] psst");
    assert_eq!(b.next().await, "[whisper from guest1] psst");

    server.stop().await;
}

#[tokio::test]
async fn test_server_full() {
    let config = ServerConfig {
        max_clients: 1,
        ..ServerConfig::default()
    };
    let server = Server::start(config).await;
    let (_a, _) = Peer::connect(server.addr).await;

    let stream = TcpStream::connect(server.addr).await.unwrap();
    let mut lines = BufReader::new(stream).lines();
    let notice = timeout(WAIT, lines.next_line()).await.unwrap().unwrap();
    assert!(notice.unwrap().starts_with("error: ServerFull:"));
    assert!(timeout(WAIT, lines.next_line()).await.unwrap().unwrap().is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_quit_closes_connection() {
    let server = Server::start(ServerConfig::default()).await;
    let (mut a, _) = Peer::connect(server.addr).await;

    assert_eq!(a.request("CMD:quit::").await, "* goodbye");
    assert!(a.try_next().await.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_notifies_and_closes_clients() {
    let server = Server::start(ServerConfig::default()).await;
    let (mut a, _) = Peer::connect(server.addr).await;
    let (mut b, _) = Peer::connect(server.addr).await;
    a.next().await;

    server.stop().await;

    for peer in [&mut a, &mut b] {
        assert_eq!(peer.next().await, "* server is shutting down");
        assert!(peer.try_next().await.is_none());
    }
}
