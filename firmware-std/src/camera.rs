//! esp32-camera frame source.
//!
//! The sensor is configured for 96x96 grayscale so frames come out at model
//! input size with no resize step.

use esp_idf_svc::sys::camera;
use esp_idf_svc::sys::{ledc_channel_t_LEDC_CHANNEL_0, ledc_timer_t_LEDC_TIMER_0, ESP_OK};

use gesturecam::board::CameraPins;
use gesturecam::frame::{AcquireError, FrameFormat, FrameSource};

const XCLK_FREQ_HZ: i32 = 20_000_000;

pub struct CameraFrames {
    pins: CameraPins,
}

impl CameraFrames {
    pub fn new(pins: CameraPins) -> Self {
        Self { pins }
    }
}

impl FrameSource for CameraFrames {
    fn init(&mut self) -> Result<(), AcquireError> {
        let p = &self.pins;
        let config = camera::camera_config_t {
            pin_pwdn: p.pwdn,
            pin_reset: p.reset,
            pin_xclk: p.xclk,
            __bindgen_anon_1: camera::camera_config_t__bindgen_ty_1 {
                pin_sccb_sda: p.sccb_sda,
            },
            __bindgen_anon_2: camera::camera_config_t__bindgen_ty_2 {
                pin_sccb_scl: p.sccb_scl,
            },
            pin_d0: p.data[0],
            pin_d1: p.data[1],
            pin_d2: p.data[2],
            pin_d3: p.data[3],
            pin_d4: p.data[4],
            pin_d5: p.data[5],
            pin_d6: p.data[6],
            pin_d7: p.data[7],
            pin_vsync: p.vsync,
            pin_href: p.href,
            pin_pclk: p.pclk,
            xclk_freq_hz: XCLK_FREQ_HZ,
            ledc_timer: ledc_timer_t_LEDC_TIMER_0,
            ledc_channel: ledc_channel_t_LEDC_CHANNEL_0,
            pixel_format: camera::pixformat_t_PIXFORMAT_GRAYSCALE,
            frame_size: camera::framesize_t_FRAMESIZE_96X96,
            jpeg_quality: 12,
            fb_count: 1,
            fb_location: camera::camera_fb_location_t_CAMERA_FB_IN_PSRAM,
            grab_mode: camera::camera_grab_mode_t_CAMERA_GRAB_LATEST,
            ..Default::default()
        };

        let err = unsafe { camera::esp_camera_init(&config) };
        if err != ESP_OK as i32 {
            return Err(AcquireError::Driver(err));
        }
        Ok(())
    }

    fn acquire(&mut self, format: &FrameFormat, out: &mut [u8]) -> Result<(), AcquireError> {
        let fb = unsafe { camera::esp_camera_fb_get() };
        if fb.is_null() {
            return Err(AcquireError::Timeout);
        }

        // Safety: non-null frame buffers stay valid until returned below.
        let result = {
            let frame = unsafe { &*fb };
            if frame.width as usize != format.width as usize
                || frame.height as usize != format.height as usize
                || frame.len != out.len()
            {
                Err(AcquireError::SizeMismatch {
                    expected: out.len(),
                    found: frame.len,
                })
            } else {
                let pixels = unsafe { core::slice::from_raw_parts(frame.buf, frame.len) };
                out.copy_from_slice(pixels);
                Ok(())
            }
        };

        unsafe { camera::esp_camera_fb_return(fb) };
        result
    }
}
