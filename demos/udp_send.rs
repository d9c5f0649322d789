//! Sends a file (or stdin) to a peer running `udp_recv` over a real UDP
//! socket, reliably. Not part of the test suite: a worked example of wiring
//! `ControlBlock` to an actual transport, the same way an embedder would.

use std::env;
use std::io::{self, Read};
use std::net::UdpSocket;
use std::process;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rkcp::{Config, ControlBlock};

fn now_ms(epoch: Instant) -> u32 {
    epoch.elapsed().as_millis() as u32
}

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let (local, remote, conv) = match (args.next(), args.next(), args.next()) {
        (Some(l), Some(r), conv) => (l, r, conv.and_then(|c| c.parse().ok()).unwrap_or(1)),
        _ => {
            eprintln!("usage: udp_send <local-addr:port> <remote-addr:port> [conv]");
            process::exit(2);
        }
    };

    let socket = UdpSocket::bind(&local).expect("bind local socket");
    socket.connect(&remote).expect("connect to peer");
    socket
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();

    let cb = Arc::new(Mutex::new(ControlBlock::with_config(
        conv,
        0,
        Config::default(),
    )));

    {
        let socket = socket.try_clone().unwrap();
        let mut cb = cb.lock().unwrap();
        cb.set_output(move |data| {
            if let Err(e) = socket.send(data) {
                log::warn!("send failed: {e}");
            }
        });
    }

    let epoch = Instant::now();

    let reader_cb = cb.clone();
    let reader_socket = socket.try_clone().unwrap();
    let reader = thread::spawn(move || {
        let mut buf = [0u8; 65536];
        loop {
            match reader_socket.recv(&mut buf) {
                Ok(n) => {
                    let mut cb = reader_cb.lock().unwrap();
                    if let Err(e) = cb.input(&buf[..n]) {
                        log::debug!("dropping bad datagram: {e}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    log::warn!("recv failed: {e}");
                    break;
                }
            }
        }
    });

    let ticker_cb = cb.clone();
    let ticker = thread::spawn(move || loop {
        {
            let mut cb = ticker_cb.lock().unwrap();
            cb.update(now_ms(epoch));
        }
        thread::sleep(Duration::from_millis(10));
    });

    let mut payload = Vec::new();
    io::stdin()
        .read_to_end(&mut payload)
        .expect("read stdin");

    for chunk in payload.chunks(4096) {
        let mut cb = cb.lock().unwrap();
        cb.send(chunk).expect("queue chunk");
    }

    loop {
        let waitsnd = {
            let cb = cb.lock().unwrap();
            cb.waitsnd()
        };
        if waitsnd == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }

    drop(ticker);
    drop(reader);
    eprintln!("done");
}
