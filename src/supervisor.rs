//! Process supervisor notifications (systemd `sd_notify` protocol)

use crate::errors::Result;
use log::{debug, info};
use std::os::unix::net::{SocketAddr, UnixDatagram};
use std::time::Duration;

/// Liveness side channel to whatever supervises the daemon
///
/// Delivery is best-effort; callers log failures and carry on.
pub trait Supervisor {
    fn notify_ready(&self) -> Result<()>;

    fn notify_watchdog(&self) -> Result<()>;

    fn notify_status(&self, status: &str) -> Result<()>;

    fn notify_stopping(&self) -> Result<()> {
        Ok(())
    }

    /// Interval after which the supervisor considers us hung, if it watches
    fn watchdog_timeout(&self) -> Option<Duration> {
        None
    }
}

impl<S: Supervisor + ?Sized> Supervisor for &S {
    fn notify_ready(&self) -> Result<()> {
        (**self).notify_ready()
    }

    fn notify_watchdog(&self) -> Result<()> {
        (**self).notify_watchdog()
    }

    fn notify_status(&self, status: &str) -> Result<()> {
        (**self).notify_status(status)
    }

    fn notify_stopping(&self) -> Result<()> {
        (**self).notify_stopping()
    }

    fn watchdog_timeout(&self) -> Option<Duration> {
        (**self).watchdog_timeout()
    }
}

impl<S: Supervisor + ?Sized> Supervisor for Box<S> {
    fn notify_ready(&self) -> Result<()> {
        (**self).notify_ready()
    }

    fn notify_watchdog(&self) -> Result<()> {
        (**self).notify_watchdog()
    }

    fn notify_status(&self, status: &str) -> Result<()> {
        (**self).notify_status(status)
    }

    fn notify_stopping(&self) -> Result<()> {
        (**self).notify_stopping()
    }

    fn watchdog_timeout(&self) -> Option<Duration> {
        (**self).watchdog_timeout()
    }
}

/// Used when not started by systemd
pub struct NoSupervisor;

impl Supervisor for NoSupervisor {
    fn notify_ready(&self) -> Result<()> {
        Ok(())
    }

    fn notify_watchdog(&self) -> Result<()> {
        Ok(())
    }

    fn notify_status(&self, _status: &str) -> Result<()> {
        Ok(())
    }
}

/// Sends `KEY=VALUE` datagrams to `$NOTIFY_SOCKET`
pub struct SystemdNotifier {
    socket: UnixDatagram,
    address: SocketAddr,
    watchdog: Option<Duration>,
}

impl SystemdNotifier {
    /// Connect to the socket systemd passed us, if any
    pub fn from_env() -> Result<Option<Self>> {
        let Some(path) = std::env::var_os("NOTIFY_SOCKET") else {
            return Ok(None);
        };
        let watchdog = std::env::var("WATCHDOG_USEC")
            .ok()
            .and_then(|usec| parse_watchdog_usec(&usec));

        let notifier = Self::connect(&path.to_string_lossy(), watchdog)?;
        info!("Reporting to systemd via {}", path.to_string_lossy());
        Ok(Some(notifier))
    }

    /// `@name` addresses the Linux abstract namespace
    pub fn connect(path: &str, watchdog: Option<Duration>) -> Result<Self> {
        let address = socket_address(path)?;
        let socket = UnixDatagram::unbound()?;
        Ok(Self {
            socket,
            address,
            watchdog,
        })
    }

    fn send(&self, message: &str) -> Result<()> {
        debug!("sd_notify: {}", message);
        self.socket.send_to_addr(message.as_bytes(), &self.address)?;
        Ok(())
    }
}

impl Supervisor for SystemdNotifier {
    fn notify_ready(&self) -> Result<()> {
        self.send("READY=1")
    }

    fn notify_watchdog(&self) -> Result<()> {
        self.send("WATCHDOG=1")
    }

    fn notify_status(&self, status: &str) -> Result<()> {
        // The protocol is newline separated
        self.send(&format!("STATUS={}", status.replace('\n', " ")))
    }

    fn notify_stopping(&self) -> Result<()> {
        self.send("STOPPING=1")
    }

    fn watchdog_timeout(&self) -> Option<Duration> {
        self.watchdog
    }
}

fn parse_watchdog_usec(value: &str) -> Option<Duration> {
    match value.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(usec) => Some(Duration::from_micros(usec)),
    }
}

#[cfg(target_os = "linux")]
fn socket_address(path: &str) -> std::io::Result<SocketAddr> {
    use std::os::linux::net::SocketAddrExt;

    match path.strip_prefix('@') {
        Some(name) => SocketAddr::from_abstract_name(name.as_bytes()),
        None => SocketAddr::from_pathname(path),
    }
}

#[cfg(not(target_os = "linux"))]
fn socket_address(path: &str) -> std::io::Result<SocketAddr> {
    SocketAddr::from_pathname(path)
}
