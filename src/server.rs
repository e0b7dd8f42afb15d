//! TCP listener setup and the accept loop.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, trace};

/// Pending-connection backlog for the listening socket.
pub const LISTEN_BACKLOG: u32 = 5;

/// Binds a listening socket with address reuse enabled, so a restarted
/// server can take the port back while old connections sit in TIME_WAIT.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(LISTEN_BACKLOG)
}

/// Accepts connections forever, serving each on its own task.
///
/// Accept failures are logged and the loop keeps going.
pub async fn accept_loop(
    listener: TcpListener,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                trace!(client = %addr, "Accepted connection");
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::snapshot::{load_snapshot, LoadOutcome};
    use crate::storage::StorageEngine;
    use std::sync::atomic::Ordering;
    use std::time::{SystemTime, UNIX_EPOCH};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start_server(
        storage: Arc<StorageEngine>,
        config: ServerConfig,
    ) -> (SocketAddr, Arc<ConnectionStats>) {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(ConnectionStats::new());
        let handler = CommandHandler::new(storage, Arc::new(config));

        tokio::spawn(accept_loop(listener, handler, Arc::clone(&stats)));

        (addr, stats)
    }

    async fn start_empty_server() -> (SocketAddr, Arc<ConnectionStats>) {
        start_server(Arc::new(StorageEngine::new()), ServerConfig::default()).await
    }

    fn bulk_command(args: &[&str]) -> Vec<u8> {
        let mut out = format!("*{}\r\n", args.len()).into_bytes();
        for arg in args {
            out.extend_from_slice(format!("${}\r\n{}\r\n", arg.len(), arg).as_bytes());
        }
        out
    }

    /// Sends `args` as one command and checks the exact reply bytes.
    async fn send(client: &mut TcpStream, args: &[&str], expected: &[u8]) {
        client.write_all(&bulk_command(args)).await.unwrap();
        let mut reply = vec![0u8; expected.len()];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(
            reply,
            expected,
            "reply {:?}",
            String::from_utf8_lossy(&reply)
        );
    }

    #[tokio::test]
    async fn test_ping_over_tcp() {
        let (addr, stats) = start_empty_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        send(&mut client, &["PING"], b"+PONG\r\n").await;
        send(&mut client, &["ECHO", "hey"], b"$3\r\nhey\r\n").await;

        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_concurrent_clients_share_store() {
        let (addr, _) = start_empty_server().await;

        let mut tasks = Vec::new();
        for i in 0..10 {
            tasks.push(tokio::spawn(async move {
                let mut client = TcpStream::connect(addr).await.unwrap();
                let key = format!("key{}", i);
                let value = format!("value{}", i);

                send(&mut client, &["SET", &key, &value], b"+OK\r\n").await;
                let expected = format!("${}\r\n{}\r\n", value.len(), value);
                send(&mut client, &["GET", &key], expected.as_bytes()).await;
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut client = TcpStream::connect(addr).await.unwrap();
        send(&mut client, &["GET", "key7"], b"$6\r\nvalue7\r\n").await;
    }

    #[tokio::test]
    async fn test_serves_loaded_snapshot() {
        let dir = std::env::temp_dir().join(format!("redkv-server-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        let mut data = b"REDIS0011".to_vec();
        data.extend_from_slice(&[0xFE, 0x00, 0xFB, 0x02, 0x01]);
        data.extend_from_slice(b"\x00\x03foo\x03bar");
        data.push(0xFC);
        data.extend_from_slice(&(now_ms - 60_000).to_le_bytes());
        data.extend_from_slice(b"\x00\x04gone\x01x");
        data.push(0xFF);
        data.extend_from_slice(&[0u8; 8]);
        std::fs::write(dir.join("dump.rdb"), &data).unwrap();

        let storage = Arc::new(StorageEngine::new());
        let outcome = load_snapshot(&dir, "dump.rdb", &storage);
        assert!(matches!(outcome, LoadOutcome::Loaded(_)));

        let config = ServerConfig {
            dir: dir.display().to_string(),
            ..ServerConfig::default()
        };
        let expected_dir = config.dir.clone();
        let (addr, _) = start_server(storage, config).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        send(&mut client, &["GET", "foo"], b"$3\r\nbar\r\n").await;
        send(&mut client, &["GET", "gone"], b"$-1\r\n").await;
        send(&mut client, &["KEYS", "*"], b"*1\r\n$3\r\nfoo\r\n").await;

        let expected = format!(
            "*2\r\n$3\r\ndir\r\n${}\r\n{}\r\n",
            expected_dir.len(),
            expected_dir
        );
        send(&mut client, &["CONFIG", "GET", "dir"], expected.as_bytes()).await;

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_bind_listener_reuses_address() {
        let first = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = first.local_addr().unwrap();
        drop(first);

        let second = bind_listener(addr).unwrap();
        assert_eq!(second.local_addr().unwrap(), addr);
    }
}
