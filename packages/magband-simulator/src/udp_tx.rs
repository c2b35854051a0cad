//! udp_tx.rs — UDP transmitter for binary telemetry frames
//!
//! Sends simulated 28-byte frames to the hub via:
//!   - Unicast: 127.0.0.1:5560 (local hub, always enabled)
//!   - Multicast: 239.255.0.2:5560 (when --multicast, mirrors a band fleet
//!     on one access point)
//!
//! Send errors are logged but never crash the simulator.

use std::net::UdpSocket;
use tracing::{debug, warn};

use magband_types::wire::TelemetryFrame;
use magband_types::RawImuSample;

pub struct FrameTransmitter {
    socket: UdpSocket,
    unicast_addr: String,
    multicast_addr: Option<String>,
}

impl FrameTransmitter {
    pub fn new(unicast_addr: &str, multicast_addr: Option<&str>) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(false)?;
        Ok(Self {
            socket,
            unicast_addr: unicast_addr.to_string(),
            multicast_addr: multicast_addr.map(|s| s.to_string()),
        })
    }

    /// Encode and send one sample as a binary telemetry frame.
    pub fn send_sample(&self, raw: &RawImuSample) {
        let bytes = TelemetryFrame::from_raw_sample(raw).encode();

        if let Err(e) = self.socket.send_to(&bytes, &self.unicast_addr) {
            warn!("UDP: unicast send failed: {e}");
        } else {
            debug!("UDP → {} t_ms={}", self.unicast_addr, raw.t_ms);
        }

        if let Some(mc) = &self.multicast_addr {
            if let Err(e) = self.socket.send_to(&bytes, mc) {
                warn!("UDP: multicast send failed: {e}");
            }
        }
    }
}
