//! pollserv binary entry point
//!
//! Loads the configuration, resolves proxy targets, binds the
//! listeners, wires SIGINT to the stop token and runs the event loop.
//! Any failure before the loop starts is startup-fatal.

use std::sync::OnceLock;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pollserv::config::Config;
use pollserv::net::{resolver, ListenerSet};
use pollserv::server::{EventLoop, StopToken};

static STOP: OnceLock<StopToken> = OnceLock::new();

extern "C" fn handle_sigint(_signum: libc::c_int) {
    if let Some(stop) = STOP.get() {
        stop.stop();
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pollserv=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "pollserv.toml".to_string());

    if let Err(e) = run(&config_path) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(config_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_file(config_path)?;
    let proxies = resolver::resolve_proxy_targets(&config)?;
    let listeners = ListenerSet::bind(&config)?;

    let stop = STOP.get_or_init(StopToken::new).clone();
    let handler = handle_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }

    info!("press Ctrl+C to stop");
    EventLoop::new(config, proxies, listeners).run(&stop)?;
    Ok(())
}
