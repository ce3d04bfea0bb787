//! Status LED driver.
//!
//! Receives [`Signal`]s via mpsc channel and plays a short blink pattern for
//! each. A startup fault latches the LED on.

use std::sync::mpsc;
use std::time::Duration;

use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};

use gesturecam::board;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Trigger taken, settling before the run.
    Armed,
    /// One frame classified.
    Captured,
    /// Run finished; `sent` is whether the radio took the notification.
    Notified { sent: bool },
    /// Startup failed. The device is parked.
    Fault,
}

struct Led<'d> {
    pin: PinDriver<'d, AnyOutputPin, Output>,
}

impl Led<'_> {
    fn set(&mut self, on: bool) {
        let high = on != board::LED_ACTIVE_LOW;
        let _ = self.pin.set_level(high.into());
    }

    fn blink(&mut self, times: u32, on_ms: u64, off_ms: u64) {
        for _ in 0..times {
            self.set(true);
            std::thread::sleep(Duration::from_millis(on_ms));
            self.set(false);
            std::thread::sleep(Duration::from_millis(off_ms));
        }
    }
}

pub fn indicator_thread(signal_rx: mpsc::Receiver<Signal>, pin: AnyOutputPin) {
    let pin = match PinDriver::output(pin) {
        Ok(p) => p,
        Err(e) => {
            log::error!("LED init failed: {:?}", e);
            return;
        }
    };
    let mut led = Led { pin };
    led.set(false);
    log::info!("Status LED ready on GPIO{}", board::LED_PIN);

    // Boot blink
    led.blink(1, 200, 0);

    while let Ok(signal) = signal_rx.recv() {
        match signal {
            Signal::Armed => led.blink(2, 60, 60),
            Signal::Captured => led.blink(1, 30, 0),
            Signal::Notified { sent: true } => led.blink(1, 400, 0),
            Signal::Notified { sent: false } => led.blink(5, 40, 40),
            Signal::Fault => {
                led.set(true);
                // Stay latched; nothing else will be signalled.
                while signal_rx.recv().is_ok() {}
                return;
            }
        }
    }
}
