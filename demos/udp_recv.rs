//! Counterpart to `udp_send`: listens on a UDP socket, reassembles whatever
//! arrives through a `ControlBlock`, and writes completed messages to
//! stdout.

use std::env;
use std::io::{self, Write};
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
    let (local, conv) = match (args.next(), args.next()) {
        (Some(l), conv) => (l, conv.and_then(|c| c.parse().ok()).unwrap_or(1)),
        _ => {
            eprintln!("usage: udp_recv <local-addr:port> [conv]");
            process::exit(2);
        }
    };

    let socket = UdpSocket::bind(&local).expect("bind local socket");
    socket
        .set_read_timeout(Some(Duration::from_millis(20)))
        .unwrap();

    let cb = Arc::new(Mutex::new(ControlBlock::with_config(
        conv,
        0,
        Config::default(),
    )));

    let peer: Mutex<Option<std::net::SocketAddr>> = Mutex::new(None);
    let peer = Arc::new(peer);

    {
        let socket = socket.try_clone().unwrap();
        let peer = peer.clone();
        let mut cb = cb.lock().unwrap();
        cb.set_output(move |data| {
            if let Some(addr) = *peer.lock().unwrap() {
                if let Err(e) = socket.send_to(data, addr) {
                    log::warn!("send failed: {e}");
                }
            }
        });
    }

    let epoch = Instant::now();

    let ticker_cb = cb.clone();
    let ticker = thread::spawn(move || loop {
        {
            let mut cb = ticker_cb.lock().unwrap();
            cb.update(now_ms(epoch));
        }
        thread::sleep(Duration::from_millis(10));
    });

    let mut buf = [0u8; 65536];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) => {
                *peer.lock().unwrap() = Some(from);
                let mut cb = cb.lock().unwrap();
                if let Err(e) = cb.input(&buf[..n]) {
                    log::debug!("dropping bad datagram: {e}");
                    continue;
                }
                let mut out = [0u8; 65536];
                while cb.peeksize().is_ok() {
                    let n = cb.recv(&mut out).unwrap();
                    io::stdout().write_all(&out[..n]).unwrap();
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                log::warn!("recv failed: {e}");
                break;
            }
        }
    }

    drop(ticker);
}
