//! End-to-end exchanges between a server and clients on loopback.

use socket_comms::apps::{Echo, Prompt};
use socket_comms::{
    Buffer, ClientSocket, Encoding, EventHandler, Handler, Received, ServerSocket, SocketConfig,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Client handler that keeps everything it receives.
#[derive(Default)]
struct Collect {
    received: Vec<u8>,
}

impl Handler for Collect {
    fn on_receive(
        &mut self,
        received: &Received<'_>,
        _outbound: &mut Buffer,
    ) -> socket_comms::Result<()> {
        self.received.extend_from_slice(received.bytes);
        Ok(())
    }
}

fn config(port: u16, buffer_size: usize) -> SocketConfig {
    let mut config = SocketConfig::new("127.0.0.1", port);
    config.buffer_size = buffer_size;
    config.timeout = Some(Duration::from_millis(10));
    config
}

fn echo_server(buffer_size: usize) -> ServerSocket<Echo> {
    ServerSocket::with_handler(config(0, buffer_size), Echo::new()).unwrap()
}

fn client(server: &ServerSocket<Echo>, buffer_size: usize) -> ClientSocket<Collect> {
    let port = server.local_addr().port();
    ClientSocket::with_handler(config(port, buffer_size), Collect::default()).unwrap()
}

#[test]
fn echo_roundtrip_in_small_chunks() {
    let mut server = echo_server(4);
    let mut client = client(&server, 4);

    client.send("hello").unwrap();
    for _ in 0..200 {
        client.turn().unwrap();
        server.turn().unwrap();
        if client.handler().received.len() >= 5 {
            break;
        }
    }

    assert_eq!(client.handler().received, b"hello");
    assert_eq!(server.handler().echoed(), 5);
    assert_eq!(server.connection_count(), 1);
    // 4 + 1 bytes in each direction
    assert_eq!(client.endpoint().stats().writes, 2);
    assert_eq!(server.endpoint().stats().bytes_written, 5);
}

#[test]
fn echo_roundtrip_with_latin1_text() {
    let mut server = echo_server(3);
    let port = server.local_addr().port();
    let mut config = config(port, 3);
    config.encoding = Encoding::Latin1;
    let mut client = ClientSocket::with_handler(config, Collect::default()).unwrap();

    client.send("café").unwrap();
    assert_eq!(client.endpoint().buffer().len(), 4);
    for _ in 0..200 {
        client.turn().unwrap();
        server.turn().unwrap();
        if client.handler().received.len() >= 4 {
            break;
        }
    }

    assert_eq!(client.handler().received, b"caf\xe9");
    assert_eq!(client.endpoint().decode(&client.handler().received), "café");
}

#[test]
fn server_serves_several_clients() {
    let mut server = echo_server(8);
    let mut first = client(&server, 8);
    let mut second = client(&server, 8);

    for _ in 0..50 {
        server.turn().unwrap();
        if server.connection_count() == 2 {
            break;
        }
    }
    assert_eq!(server.connection_count(), 2);
    assert_eq!(server.endpoint().stats().accepted, 2);

    first.send("one").unwrap();
    second.send("two").unwrap();
    for _ in 0..200 {
        first.turn().unwrap();
        second.turn().unwrap();
        server.turn().unwrap();
        let total = first.handler().received.len() + second.handler().received.len();
        if total >= 6 {
            break;
        }
    }

    // One outbound buffer serves every connection, so each echoed byte
    // arrives exactly once but not necessarily at its sender.
    assert_eq!(server.handler().echoed(), 6);
    let total = first.handler().received.len() + second.handler().received.len();
    assert_eq!(total, 6);
}

#[test]
fn client_hangup_leaves_server_listening() {
    let mut server = echo_server(8);
    let first = client(&server, 8);
    let mut second = client(&server, 8);

    for _ in 0..50 {
        server.turn().unwrap();
        if server.connection_count() == 2 {
            break;
        }
    }

    drop(first);
    for _ in 0..50 {
        server.turn().unwrap();
        if server.connection_count() == 1 {
            break;
        }
    }
    assert_eq!(server.connection_count(), 1);
    assert!(server
        .endpoint()
        .selector()
        .contains(server.listener_token()));

    second.send("still here").unwrap();
    for _ in 0..200 {
        second.turn().unwrap();
        server.turn().unwrap();
        if second.handler().received.len() >= 10 {
            break;
        }
    }
    assert_eq!(second.handler().received, b"still here");
}

#[test]
fn server_close_ends_client_loop() {
    let mut server = echo_server(8);
    let mut client = client(&server, 8);

    for _ in 0..50 {
        server.turn().unwrap();
        if server.connection_count() == 1 {
            break;
        }
    }
    assert_eq!(server.endpoint_mut().shutdown(), 2);

    client.start().unwrap();
    assert!(!client.is_connected());
    assert!(client.endpoint().selector().is_empty());
}

#[test]
fn piped_prompt_prints_echo_before_exiting() {
    let mut server = echo_server(4);
    let port = server.local_addr().port();
    let stop = Arc::new(AtomicBool::new(false));

    let serving = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                server.turn().unwrap();
            }
            server.handler().echoed()
        })
    };

    let prompt = Prompt::new(&b"hello\n"[..], Vec::new());
    let mut client = ClientSocket::with_handler(config(port, 4), prompt).unwrap();
    client.start().unwrap();

    stop.store(true, Ordering::SeqCst);
    let echoed = serving.join().unwrap();

    assert_eq!(client.handler().output().as_slice(), b"hello\n");
    assert_eq!(client.handler().outstanding(), 0);
    assert_eq!(echoed, 6);
}
