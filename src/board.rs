//! Hardware abstraction for supported boards.
//!
//! Each board module defines pin assignments and capabilities
//! selected at compile time via feature flags.

/// Camera sensor wiring. `-1` marks a signal the board does not route.
#[derive(Debug, Clone, Copy)]
pub struct CameraPins {
    pub pwdn: i32,
    pub reset: i32,
    pub xclk: i32,
    pub sccb_sda: i32,
    pub sccb_scl: i32,
    /// D0..D7 (Y2..Y9 in the OV2640 datasheet)
    pub data: [i32; 8],
    pub vsync: i32,
    pub href: i32,
    pub pclk: i32,
}

/// Tensor arena for the gesture model, before any chip-specific scratch space.
const BASE_ARENA_SIZE: usize = 560 * 1024;

#[cfg(feature = "board-xiao")]
mod hw {
    use super::CameraPins;

    pub const LED_PIN: u8 = 21; // User LED, active low
    pub const LED_ACTIVE_LOW: bool = true;
    /// ESP32-S3 optimized kernels need extra scratch space.
    pub const TENSOR_ARENA_SIZE: usize = super::BASE_ARENA_SIZE + 40 * 1024;
    pub const CAMERA_PINS: CameraPins = CameraPins {
        pwdn: -1,
        reset: -1,
        xclk: 10,
        sccb_sda: 40,
        sccb_scl: 39,
        data: [15, 17, 18, 16, 14, 12, 11, 48],
        vsync: 38,
        href: 47,
        pclk: 13,
    };
    pub const BOARD_NAME: &str = "xiao_esp32s3_sense";
}

#[cfg(feature = "board-esp32cam")]
mod hw {
    use super::CameraPins;

    pub const LED_PIN: u8 = 33; // Red LED on the back, active low
    pub const LED_ACTIVE_LOW: bool = true;
    pub const TENSOR_ARENA_SIZE: usize = super::BASE_ARENA_SIZE;
    pub const CAMERA_PINS: CameraPins = CameraPins {
        pwdn: 32,
        reset: -1,
        xclk: 0,
        sccb_sda: 26,
        sccb_scl: 27,
        data: [5, 18, 19, 21, 36, 39, 34, 35],
        vsync: 25,
        href: 23,
        pclk: 22,
    };
    pub const BOARD_NAME: &str = "ai_thinker_esp32cam";
}

#[cfg(not(any(feature = "board-xiao", feature = "board-esp32cam")))]
mod hw {
    pub const TENSOR_ARENA_SIZE: usize = super::BASE_ARENA_SIZE;
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
