//! Wirekit Echo Server
//!
//! Runs a `ConnectionServer` with every factory wired explicitly, serving two
//! string methods:
//!
//! - `1` (ECHO): payload back unchanged
//! - `2` (UPPER): payload upper-cased
//!
//! Usage:
//!     cargo build --release -p wirekit-echo
//!     ./target/release/wirekit-echo [port] [requests]
//!
//! With `requests > 0` the binary fires that many calls at itself through
//! `TcpChannel`, prints a summary and exits. Otherwise it serves until
//! SIGINT/SIGTERM.
//!
//! Server settings come from `WIREKIT_*` environment variables; log level
//! from `RUST_LOG` (e.g. `RUST_LOG=wirekit_server=debug`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wirekit_core::config::{ClientConfig, ServerConfig};
use wirekit_core::error::Result;
use wirekit_module::byte_packet::BytePacketFactory;
use wirekit_module::epoll_reactor::EpollReactorFactory;
use wirekit_module::hash_router::HashRouter;
use wirekit_module::simple_adapter::SimpleAdapterFactory;
use wirekit_module::string_dispatcher::{MethodTable, StringDispatcherFactory, ECHO};
use wirekit_module::tcp_channel::TcpChannel;
use wirekit_module::thread_pool::ThreadPoolFactory;
use wirekit_server::{ConnectionServer, ServerDeps};

const UPPER: u32 = 2;

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_sigint(_sig: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

fn methods() -> MethodTable {
    let mut table = MethodTable::with_echo();
    table.register(UPPER, |body: &str| Ok(body.to_uppercase()));
    table
}

fn deps(config: &ServerConfig) -> ServerDeps {
    ServerDeps {
        reactor_factory: Arc::new(EpollReactorFactory::from_config(config)),
        packet_factory: Arc::new(BytePacketFactory::default()),
        adapter_factory: Arc::new(SimpleAdapterFactory::from_config(config)),
        pool_factory: Arc::new(ThreadPoolFactory::from_config(config)),
        dispatcher_factory: Arc::new(StringDispatcherFactory::new(methods())),
        log: None,
    }
}

/// One connection per call; the server closes after each response.
fn burst(port: u16, requests: usize) -> (usize, usize) {
    let client = ClientConfig::new().host("127.0.0.1", port);
    let mut ok = 0;
    let mut failed = 0;
    for i in 0..requests {
        let router = HashRouter::new(client.hosts.clone(), i);
        let mut channel = TcpChannel::new(client.clone());
        let method = if i % 2 == 0 { ECHO } else { UPPER };
        let body = format!("ping {}", i);

        let outcome: Result<bool> = channel.open(&router).and_then(|_| {
            let reply = channel.call(method, body.clone())?;
            let expected = if method == ECHO { body.clone() } else { body.to_uppercase() };
            Ok(reply.payload == expected.as_bytes())
        });
        match outcome {
            Ok(true) => ok += 1,
            Ok(false) => {
                warn!(request = i, "reply mismatch");
                failed += 1;
            }
            Err(e) => {
                warn!(request = i, error = %e, "call failed");
                failed += 1;
            }
        }
    }
    (ok, failed)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::from_env();
    if let Some(port) = args.get(1).and_then(|s| s.parse().ok()) {
        config = config.port(port);
    }
    let requests: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0);

    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_sigint as libc::sighandler_t);
    }

    let mut server = ConnectionServer::new(config.clone(), deps(&config));
    if let Err(e) = server.init().and_then(|_| server.run()) {
        error!(error = %e, "wirekit-echo: startup failed");
        std::process::exit(1);
    }
    let port = server.local_addr().map_or(config.port, |a| a.port());
    info!(port, "wirekit-echo: listening");

    if requests > 0 {
        let start = Instant::now();
        let (ok, failed) = burst(port, requests);
        let elapsed = start.elapsed();
        info!(
            ok,
            failed,
            elapsed_ms = elapsed.as_millis() as u64,
            allocated = server.allocated_events(),
            "wirekit-echo: burst complete"
        );
        server.stop();
        if failed > 0 {
            std::process::exit(2);
        }
        return;
    }

    let mut last = Instant::now();
    while RUNNING.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));
        if last.elapsed() >= Duration::from_secs(5) {
            info!(
                live = server.live_connections(),
                free = server.free_events(),
                allocated = server.allocated_events(),
                "wirekit-echo: stats"
            );
            last = Instant::now();
        }
    }
    info!("wirekit-echo: shutting down");
    server.stop();
}
