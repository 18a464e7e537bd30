use opencv::{
    prelude::*,
    core::{Mat, Vector},
    imgcodecs,
    videoio::{self, VideoCapture},
};
use log::{info, debug, warn};
use std::path::Path;

use crate::camera::VideoSource;
use crate::config::CameraSettings;
use crate::error::CameraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Infrared,
    Color,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_id: i32,
    pub device_path: String,
    pub name: String,
    pub kind: SensorKind,
}

/// V4L2 camera read through OpenCV. Infrared sensors are tried last since the
/// remote comparison works on colour photos.
pub struct OpencvSource {
    settings: CameraSettings,
    capture: Option<VideoCapture>,
    device: Option<DeviceInfo>,
}

impl OpencvSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            capture: None,
            device: None,
        }
    }

    fn candidates(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        let mut devices = detect_devices();

        if let Some(index) = self.settings.device_index {
            devices.retain(|d| d.device_id == index);
            if devices.is_empty() {
                devices.push(DeviceInfo {
                    device_id: index,
                    device_path: format!("/dev/video{}", index),
                    name: format!("Camera {}", index),
                    kind: SensorKind::Unknown,
                });
            }
        }

        if devices.is_empty() {
            return Err(CameraError::NoDevice);
        }

        devices.sort_by_key(|d| match d.kind {
            SensorKind::Color => 0,
            SensorKind::Unknown => 1,
            SensorKind::Infrared => 2,
        });
        Ok(devices)
    }
}

impl VideoSource for OpencvSource {
    fn open(&mut self) -> Result<(), CameraError> {
        let mut last_error = String::new();

        for device in self.candidates()? {
            info!("Trying camera: {} ({:?})", device.name, device.kind);

            let mut capture = match VideoCapture::new(device.device_id, videoio::CAP_V4L2) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Error opening camera video{}: {}", device.device_id, e);
                    last_error = format!("Camera {} error: {}", device.device_id, e);
                    continue;
                }
            };

            if capture.is_opened().unwrap_or(false) {
                let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, self.settings.frame_width as f64);
                let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, self.settings.frame_height as f64);

                let mut test_frame = Mat::default();
                if capture.read(&mut test_frame).is_ok() && !test_frame.empty() {
                    info!("Successfully opened camera video{}", device.device_id);
                    self.capture = Some(capture);
                    self.device = Some(device);
                    return Ok(());
                }

                warn!("Camera video{} opened but couldn't read frames", device.device_id);
                last_error = format!("Camera {} cannot read frames", device.device_id);
            } else {
                warn!("Failed to open camera video{}", device.device_id);
                last_error = format!("Camera {} failed to open", device.device_id);
            }
            let _ = capture.release();
        }

        Err(CameraError::Unavailable(last_error))
    }

    fn grab_jpeg(&mut self) -> Result<Vec<u8>, CameraError> {
        let capture = self.capture.as_mut().ok_or(CameraError::NotStreaming)?;

        let mut frame = Mat::default();
        capture
            .read(&mut frame)
            .map_err(|e| CameraError::Capture(e.to_string()))?;
        if frame.empty() {
            return Err(CameraError::Capture("Empty frame captured".to_string()));
        }

        let params = Vector::<i32>::from_slice(&[
            imgcodecs::IMWRITE_JPEG_QUALITY,
            i32::from(self.settings.jpeg_quality),
        ]);
        let mut encoded = Vector::<u8>::new();
        imgcodecs::imencode(".jpg", &frame, &mut encoded, &params)
            .map_err(|e| CameraError::Capture(e.to_string()))?;

        Ok(encoded.to_vec())
    }

    fn close(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            let _ = capture.release();
        }
        self.device = None;
    }

    fn preflight(&self) -> Result<(), CameraError> {
        for device in detect_devices() {
            if let Err(e) = std::fs::File::open(&device.device_path) {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    return Err(CameraError::PermissionDenied(device.device_path));
                }
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        match &self.device {
            Some(d) => format!("{} ({})", d.name, d.device_path),
            None => "v4l2 camera".to_string(),
        }
    }
}

impl Drop for OpencvSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn detect_devices() -> Vec<DeviceInfo> {
    let mut devices = Vec::new();

    let video_dir = Path::new("/sys/class/video4linux");
    let entries = match std::fs::read_dir(video_dir) {
        Ok(entries) => entries,
        Err(_) => return devices,
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();

        let device_id: i32 = match name.strip_prefix("video").and_then(|s| s.parse().ok()) {
            Some(id) => id,
            None => continue,
        };

        // Index 0 is the capture node; higher indices are metadata nodes.
        let index_path = entry.path().join("index");
        if let Ok(index) = std::fs::read_to_string(&index_path) {
            if index.trim() != "0" {
                debug!("Skipping video{} (metadata node)", device_id);
                continue;
            }
        }

        let camera_name = std::fs::read_to_string(entry.path().join("name"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("Camera {}", device_id));

        devices.push(DeviceInfo {
            device_id,
            device_path: format!("/dev/video{}", device_id),
            kind: sensor_kind(&camera_name),
            name: camera_name,
        });
    }

    devices.sort_by_key(|d| d.device_id);
    debug!("Detected {} camera(s)", devices.len());
    devices
}

fn sensor_kind(name: &str) -> SensorKind {
    let name_lower = name.to_lowercase();

    if name_lower.ends_with(" i") || name_lower.ends_with(": i") {
        return SensorKind::Infrared;
    }
    if ["infrared", " ir ", "ir camera", "depth", "tof"]
        .iter()
        .any(|k| name_lower.contains(k))
    {
        return SensorKind::Infrared;
    }

    if name_lower.ends_with(" c") || name_lower.ends_with(": c") {
        return SensorKind::Color;
    }
    if ["rgb", "color", "webcam", "hd camera", "usb camera", "front"]
        .iter()
        .any(|k| name_lower.contains(k))
    {
        return SensorKind::Color;
    }

    SensorKind::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_sensor_names() {
        assert_eq!(sensor_kind("Integrated Camera: Integrated I"), SensorKind::Infrared);
        assert_eq!(sensor_kind("Integrated Camera: Integrated C"), SensorKind::Color);
        assert_eq!(sensor_kind("Logitech HD Camera"), SensorKind::Color);
        assert_eq!(sensor_kind("Depth Sensor"), SensorKind::Infrared);
        assert_eq!(sensor_kind("Integrated Camera"), SensorKind::Unknown);
    }
}
