use log::info;
use std::io;
use tokio::signal::unix::{signal, Signal, SignalKind};

/// SIGINT, SIGHUP and SIGTERM, installed up front
///
/// Handlers are registered before the BMC is touched so that a failure to
/// install them stops startup instead of leaving the fans in manual mode.
pub struct ShutdownSignals {
    int: Signal,
    hup: Signal,
    term: Signal,
}

impl ShutdownSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            int: signal(SignalKind::interrupt())?,
            hup: signal(SignalKind::hangup())?,
            term: signal(SignalKind::terminate())?,
        })
    }

    /// Resolve on the first termination signal, returning its name
    pub async fn recv(mut self) -> &'static str {
        let sig = tokio::select! {
            _ = self.int.recv() => "SIGINT",
            _ = self.hup.recv() => "SIGHUP",
            _ = self.term.recv() => "SIGTERM",
        };

        info!("caught signal: {}", sig);
        sig
    }
}
