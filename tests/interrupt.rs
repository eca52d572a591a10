//! SIGINT ends a running loop and releases every socket.
//!
//! Kept in its own test binary because the signal goes to the whole process.

use socket_comms::runtime::signal;
use socket_comms::{ClientSocket, EventHandler, SocketConfig};
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn sigint_stops_start_and_closes_sockets() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = SocketConfig::new("127.0.0.1", port);
    config.timeout = Some(Duration::from_millis(50));
    let mut client = ClientSocket::new(config).unwrap();
    let (mut server_side, _) = listener.accept().unwrap();

    // Install before any kill so the default action never terminates the
    // test process.
    signal::install().unwrap();

    let running = thread::spawn(move || {
        let outcome = client.start();
        (outcome.is_ok(), client.endpoint().selector().is_empty())
    });

    // start() clears stale requests on entry, so keep signalling until the
    // loop has observed one.
    let deadline = Instant::now() + Duration::from_secs(10);
    while !running.is_finished() {
        assert!(Instant::now() < deadline, "loop ignored SIGINT");
        // SAFETY: sending a signal to our own process has no memory effects.
        unsafe {
            libc::kill(libc::getpid(), libc::SIGINT);
        }
        thread::sleep(Duration::from_millis(20));
    }

    let (ok, released) = running.join().unwrap();
    assert!(ok);
    assert!(released);

    // the peer sees an orderly close
    let mut rest = Vec::new();
    assert_eq!(server_side.read_to_end(&mut rest).unwrap(), 0);
}
