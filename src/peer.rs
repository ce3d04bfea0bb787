/// Peer registry: the single remote device that receives run notifications.
///
/// The peer is known at build time. It is registered with the radio exactly
/// once, after the radio is up and before the first send.
use core::fmt;

use crate::protocol::MacString;
use crate::radio::RadioTransport;

/// 6-byte link-layer address.
pub type MacAddress = [u8; 6];

/// Highest 2.4 GHz channel number ESP-NOW accepts.
pub const MAX_CHANNEL: u8 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    pub addr: MacAddress,
    /// Radio channel. 0 means "the channel the interface is currently on".
    pub channel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    /// `register` was already called successfully.
    AlreadyRegistered,
    InvalidChannel(u8),
    /// The radio's peer table has no free slot.
    TableFull,
    Driver(i32),
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::AlreadyRegistered => write!(f, "peer already registered"),
            RegistrationError::InvalidChannel(ch) => write!(f, "invalid peer channel {}", ch),
            RegistrationError::TableFull => write!(f, "radio peer table full"),
            RegistrationError::Driver(code) => write!(f, "radio rejected peer (error {})", code),
        }
    }
}

/// Holds the peer and whether the radio has accepted it.
pub struct PeerRegistry {
    peer: Peer,
    registered: bool,
}

impl PeerRegistry {
    pub const fn new(peer: Peer) -> Self {
        Self {
            peer,
            registered: false,
        }
    }

    /// Add the peer to the radio's peer table.
    pub fn register<R: RadioTransport>(&mut self, radio: &mut R) -> Result<(), RegistrationError> {
        if self.registered {
            return Err(RegistrationError::AlreadyRegistered);
        }
        if self.peer.channel > MAX_CHANNEL {
            return Err(RegistrationError::InvalidChannel(self.peer.channel));
        }

        radio.add_peer(&self.peer)?;
        self.registered = true;

        let mut mac = MacString::new();
        format_mac(&self.peer.addr, &mut mac);
        log::info!("Peer {} registered on channel {}", mac, self.peer.channel);
        Ok(())
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }
}

/// Format a 6-byte MAC address into "AA:BB:CC:DD:EE:FF" string
pub fn format_mac(mac: &MacAddress, buf: &mut MacString) {
    use core::fmt::Write;
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubRadio;

    const PEER: Peer = Peer {
        addr: [0x30, 0xAE, 0xA4, 0x1B, 0x93, 0xF4],
        channel: 0,
    };

    #[test]
    fn register_adds_peer_to_radio() {
        let mut radio = StubRadio::new();
        let mut registry = PeerRegistry::new(PEER);
        assert!(!registry.is_registered());

        registry.register(&mut radio).unwrap();

        assert!(registry.is_registered());
        assert_eq!(radio.peers.as_slice(), &[PEER]);
    }

    #[test]
    fn register_twice_is_rejected() {
        let mut radio = StubRadio::new();
        let mut registry = PeerRegistry::new(PEER);
        registry.register(&mut radio).unwrap();

        assert_eq!(
            registry.register(&mut radio),
            Err(RegistrationError::AlreadyRegistered)
        );
        assert_eq!(radio.peers.len(), 1);
    }

    #[test]
    fn invalid_channel_never_reaches_radio() {
        let mut radio = StubRadio::new();
        let mut registry = PeerRegistry::new(Peer {
            addr: PEER.addr,
            channel: 15,
        });

        assert_eq!(
            registry.register(&mut radio),
            Err(RegistrationError::InvalidChannel(15))
        );
        assert!(radio.peers.is_empty());
        assert!(!registry.is_registered());
    }

    #[test]
    fn radio_rejection_leaves_peer_unregistered() {
        let mut radio = StubRadio::new();
        radio.add_peer_result = Err(RegistrationError::TableFull);
        let mut registry = PeerRegistry::new(PEER);

        assert_eq!(registry.register(&mut radio), Err(RegistrationError::TableFull));
        assert!(!registry.is_registered());
    }

    #[test]
    fn format_mac_uppercase_colon_separated() {
        let mut s = MacString::new();
        format_mac(&PEER.addr, &mut s);
        assert_eq!(s.as_str(), "30:AE:A4:1B:93:F4");
    }
}
