//! Audio subsystem for the live noise meter
//!
//! Handles input device selection, microphone capture and loudness estimation.

pub mod capture;
pub mod device;
pub mod metering;

pub use capture::{
    AudioCapture, AudioSource, CaptureError, CpalAudioSource, FrameWindow, DEFAULT_FRAME_SIZE,
};
pub use device::{get_device_display_name, get_recording_device, list_input_devices, InputDevice};
pub use metering::LoudnessCalibration;
