//! Shared helpers for integration tests: a server running on its own
//! thread and a blocking line-oriented client.
#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use kiln_server::{Config, Server};
use tokio::sync::watch;

pub struct TestServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: Option<thread::JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    pub fn start(config: Config) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (addr_tx, addr_rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("build runtime");

            runtime.block_on(async move {
                let server = Arc::new(Server::new(config));
                let task = {
                    let server = server.clone();
                    tokio::spawn(async move { server.serve(shutdown_rx).await })
                };

                let mut ready = server.ready();
                ready.wait_for(|ready| *ready).await.expect("server ready");
                let addr = server.addr().expect("bound address");
                addr_tx.send(addr).expect("report address");

                task.await.expect("serve task")
            })
        });

        let addr = addr_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("server failed to start");

        Self {
            addr,
            shutdown: shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn start_default() -> Self {
        Self::start(test_config(1 << 20))
    }

    pub fn start_small(max_bytes: i64) -> Self {
        Self::start(test_config(max_bytes))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for the serve loop to return.
    pub fn join(mut self) -> std::io::Result<()> {
        self.signal_shutdown();
        match self.handle.take() {
            Some(handle) => handle.join().expect("server thread panicked"),
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn test_config(max_bytes: i64) -> Config {
    Config {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        max_bytes,
        entry_overhead: 0,
        ..Config::default()
    }
}

/// Blocking client for one connection.
pub struct Session {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Session {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream.set_nodelay(true).expect("nodelay");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        Self { stream, reader }
    }

    pub fn write(&mut self, data: &[u8]) {
        self.stream.write_all(data).expect("write");
    }

    /// Write a command and read response lines until `suffix` is seen.
    pub fn send(&mut self, cmd: &[u8], suffix: &str) -> String {
        self.write(cmd);
        self.read_until(suffix)
    }

    pub fn read_until(&mut self, suffix: &str) -> String {
        let mut response = String::new();
        while !response.ends_with(suffix) {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).expect("read line");
            assert!(n > 0, "unexpected EOF, got {response:?}");
            response.push_str(&line);
        }
        response
    }

    /// True when the server closed the connection cleanly.
    pub fn read_eof(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(self.reader.read(&mut buf), Ok(0))
    }

    /// True when the connection is gone, cleanly or not.
    pub fn read_closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        !matches!(self.reader.read(&mut buf), Ok(n) if n > 0)
    }
}
