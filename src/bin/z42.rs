use std::env;
use std::path::Path;
use std::process::exit;
use std::sync::Arc;

use getopts::Options;

use z42::dns::config::Config;
use z42::dns::context::ServerContext;
use z42::dns::record_store::{FileZoneStore, MemoryZoneStore, ZoneStore};
use z42::dns::server::{DnsServer, DnsTcpServer, DnsUdpServer};

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} [options]", program);
    print!("{}", opts.usage(&brief));
}

fn load_store(config: &Config) -> std::io::Result<Arc<dyn ZoneStore>> {
    match &config.store.zones_dir {
        Some(dir) => Ok(Arc::new(FileZoneStore::load(dir)?)),
        None => Ok(Arc::new(MemoryZoneStore::new())),
    }
}

/// Main entry point for the z42 authoritative DNS resolver
fn main() {
    simple_logger::init().expect("Failed to initialize logger");

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optflag("h", "help", "print this help menu");
    opts.optopt("c", "config", "path to the TOML config file", "PATH");
    opts.optflag("t", "test", "verify the config file and exit");
    opts.optopt("g", "generate", "write a default config template to PATH and exit", "PATH");

    let opt_matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            exit(2);
        }
    };

    if opt_matches.opt_present("h") {
        print_usage(&program, opts);
        return;
    }

    if let Some(path) = opt_matches.opt_str("g") {
        match Config::write_template(Path::new(&path)) {
            Ok(_) => {
                log::info!("Wrote default config template to {}", path);
                exit(0);
            }
            Err(e) => {
                eprintln!("Failed to write config template: {}", e);
                exit(1);
            }
        }
    }

    let config_path = opt_matches.opt_str("c").unwrap_or_else(|| "z42.toml".to_string());
    let config = match Config::load(Path::new(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", config_path, e);
            exit(1);
        }
    };

    if opt_matches.opt_present("t") {
        match load_store(&config) {
            Ok(_) => {
                println!("{}: configuration OK", config_path);
                exit(0);
            }
            Err(e) => {
                eprintln!("{}: zone store failed to load: {}", config_path, e);
                exit(1);
            }
        }
    }

    let store = match load_store(&config) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to load zone store: {}", e);
            exit(1);
        }
    };

    let context = match ServerContext::new(&config, store) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            log::error!("Failed to initialize server context: {}", e);
            exit(1);
        }
    };

    if let Err(e) = context.initialize() {
        log::error!("Failed to initialize server: {}", e);
        exit(1);
    }

    let udp_server = DnsUdpServer::new(context.clone(), 20);
    if let Err(e) = udp_server.run_server() {
        log::error!("Failed to bind UDP listener on {}: {:?}", context.dns_udp_addr, e);
        exit(1);
    }

    let tcp_server = DnsTcpServer::new(context.clone(), 20);
    if let Err(e) = tcp_server.run_server() {
        log::error!("Failed to bind TCP listener on {}: {:?}", context.dns_tcp_addr, e);
        exit(1);
    }

    log::info!(
        "z42 listening on udp:{} tcp:{}",
        context.dns_udp_addr, context.dns_tcp_addr
    );

    wait_for_signals(context);
}

/// Blocks the main thread, reloading on SIGHUP and exiting cleanly on
/// SIGINT/SIGTERM (spec §6). The listener threads spawned above keep serving
/// queries independently of this loop.
fn wait_for_signals(context: Arc<ServerContext>) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to start signal-handling runtime");

    runtime.block_on(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigint = signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
            let mut sighup = signal(SignalKind::hangup()).expect("Failed to register SIGHUP handler");

            loop {
                tokio::select! {
                    _ = sigint.recv() => {
                        log::info!("Received SIGINT, shutting down");
                        break;
                    }
                    _ = sigterm.recv() => {
                        log::info!("Received SIGTERM, shutting down");
                        break;
                    }
                    _ = sighup.recv() => {
                        log::info!("Received SIGHUP, reloading zone/record caches");
                        context.reload();
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Received ctrl-c, shutting down");
        }
    });
}
