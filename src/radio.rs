/// Radio transport: point-to-point link to the peer (ESP-NOW on the device).
///
/// The transport itself is platform code behind [`RadioTransport`]. This module
/// owns the callback side: [`RadioContext`] is shared by reference between the
/// radio driver's receive/send-complete callbacks and the detection loop.
/// Callbacks only flip the trigger flag and push onto a bounded queue; the
/// detection loop drains the queue on every poll.
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::peer::{format_mac, MacAddress, Peer, RegistrationError};
use crate::protocol::MacString;

/// ESP-NOW maximum payload.
pub const MAX_PAYLOAD_LEN: usize = 250;

/// Depth of the callback → detection loop event queue.
pub const EVENT_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// Wi-Fi station bring-up failed.
    Wifi(i32),
    /// ESP-NOW init or callback registration failed.
    Link(i32),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::Wifi(code) => write!(f, "wifi init failed (error {})", code),
            InitError::Link(code) => write!(f, "link init failed (error {})", code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// Destination was never registered.
    NotRegistered,
    PayloadTooLarge { len: usize, max: usize },
    Driver(i32),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::NotRegistered => write!(f, "peer not registered"),
            SendError::PayloadTooLarge { len, max } => {
                write!(f, "payload of {} bytes exceeds {}", len, max)
            }
            SendError::Driver(code) => write!(f, "send rejected (error {})", code),
        }
    }
}

/// Point-to-point link primitives.
pub trait RadioTransport {
    /// Bring up the link and install the receive / send-complete callbacks.
    /// Called once.
    fn init(&mut self) -> Result<(), InitError>;

    /// Add an entry to the link's peer table.
    fn add_peer(&mut self, peer: &Peer) -> Result<(), RegistrationError>;

    /// Queue a transmission. Returns once the driver accepted the frame;
    /// delivery is reported later through [`RadioContext::on_send_complete`].
    fn send(&mut self, dst: &MacAddress, payload: &[u8]) -> Result<(), SendError>;
}

/// Delivery result reported by the link layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioEvent {
    /// A frame from the registered peer arrived.
    Received { src: MacAddress, len: u8 },
    /// The link finished a transmission.
    SendComplete { dst: MacAddress, status: SendStatus },
}

/// Trigger shared between the receive callback (writer) and the detection
/// loop (reader). Asserting an already-set flag is a no-op, so several
/// triggers before the next poll count once.
pub struct TriggerFlag(AtomicBool);

impl TriggerFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn assert(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for TriggerFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Link counters, maintained on the detection loop side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub received: u32,
    pub sends_ok: u32,
    pub sends_failed: u32,
}

/// State shared between the radio callbacks and the detection loop.
pub struct RadioContext {
    peer: MacAddress,
    trigger: TriggerFlag,
    events: Channel<CriticalSectionRawMutex, RadioEvent, EVENT_QUEUE_DEPTH>,
}

impl RadioContext {
    pub const fn new(peer: MacAddress) -> Self {
        Self {
            peer,
            trigger: TriggerFlag::new(),
            events: Channel::new(),
        }
    }

    pub fn trigger(&self) -> &TriggerFlag {
        &self.trigger
    }

    /// Receive callback. Runs in the radio driver's context: no blocking,
    /// no allocation. Frames from anyone but the peer are dropped.
    pub fn on_receive(&self, src: &MacAddress, data: &[u8]) {
        if *src != self.peer {
            return;
        }
        self.trigger.assert();
        let len = data.len().min(u8::MAX as usize) as u8;
        let _ = self.events.try_send(RadioEvent::Received { src: *src, len });
    }

    /// Send-complete callback. Same context rules as [`Self::on_receive`].
    pub fn on_send_complete(&self, dst: &MacAddress, status: SendStatus) {
        let _ = self
            .events
            .try_send(RadioEvent::SendComplete { dst: *dst, status });
    }

    /// Next queued callback event, if any.
    pub fn next_event(&self) -> Option<RadioEvent> {
        self.events.try_receive().ok()
    }

    /// Drain queued events into `stats`, logging delivery results.
    /// Failed deliveries are not retried.
    pub fn drain(&self, stats: &mut LinkStats) {
        while let Some(event) = self.next_event() {
            match event {
                RadioEvent::Received { src, len } => {
                    stats.received = stats.received.wrapping_add(1);
                    let mut mac = MacString::new();
                    format_mac(&src, &mut mac);
                    log::info!("Trigger from {} ({} bytes)", mac, len);
                }
                RadioEvent::SendComplete { status: SendStatus::Success, .. } => {
                    stats.sends_ok = stats.sends_ok.wrapping_add(1);
                    log::info!("Notification delivered");
                }
                RadioEvent::SendComplete { dst, status: SendStatus::Fail } => {
                    stats.sends_failed = stats.sends_failed.wrapping_add(1);
                    let mut mac = MacString::new();
                    format_mac(&dst, &mut mac);
                    log::warn!("Notification to {} not delivered", mac);
                }
            }
        }
    }
}
