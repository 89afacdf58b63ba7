//! Raw frame capture and replay
//!
//! Capture files are a flat sequence of fixed-size records: one length byte
//! followed by the frame bytes, zero padded to [`CAPTURE_RECORD_LEN`].

use super::constants::CAPTURE_RECORD_LEN;
use super::usb::UsbTransport;
use super::ControllerError;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Largest frame a record can carry
pub const MAX_FRAME_LEN: usize = CAPTURE_RECORD_LEN - 1;

/// Encode one frame as a fixed-size record (frames longer than a record are truncated)
pub fn encode_record(frame: &[u8]) -> [u8; CAPTURE_RECORD_LEN] {
    let len = frame.len().min(MAX_FRAME_LEN);
    let mut record = [0u8; CAPTURE_RECORD_LEN];
    record[0] = len as u8;
    record[1..=len].copy_from_slice(&frame[..len]);
    record
}

/// Split a capture file into frames; a trailing partial record is dropped
pub fn decode_records(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    for record in bytes.chunks_exact(CAPTURE_RECORD_LEN) {
        let len = (record[0] as usize).min(MAX_FRAME_LEN);
        frames.push(record[1..=len].to_vec());
    }
    let trailing = bytes.len() % CAPTURE_RECORD_LEN;
    if trailing != 0 {
        warn!("Ignoring {} trailing bytes in capture file", trailing);
    }
    frames
}

/// Capture file name for a device, derived from its path
pub fn capture_path(dir: &Path, device_path: &str) -> PathBuf {
    let stem: String = device_path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    dir.join(format!("{}.cap", stem.trim_matches('_')))
}

/// Transport wrapper that appends every frame read to a capture file
pub struct CaptureTransport<T: UsbTransport> {
    inner: T,
    writer: BufWriter<File>,
    frames: u64,
}

impl<T: UsbTransport> CaptureTransport<T> {
    pub fn create<P: AsRef<Path>>(inner: T, path: P) -> Result<Self, ControllerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        info!("Capturing raw frames to: {}", path.display());
        Ok(Self {
            inner,
            writer: BufWriter::new(file),
            frames: 0,
        })
    }
}

impl<T: UsbTransport> UsbTransport for CaptureTransport<T> {
    fn read_timeout(&mut self, buf: &mut [u8], timeout_ms: i32) -> Result<usize, ControllerError> {
        let len = self.inner.read_timeout(buf, timeout_ms)?;
        if len > 0 {
            self.writer.write_all(&encode_record(&buf[..len]))?;
            self.frames += 1;
        }
        Ok(len)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ControllerError> {
        self.inner.write(data)
    }
}

impl<T: UsbTransport> Drop for CaptureTransport<T> {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            warn!("Failed to flush capture file: {}", e);
        }
        debug!("Capture closed after {} frames", self.frames);
    }
}

/// Transport that serves frames from a capture file, one per read
///
/// Once the file is exhausted reads fail with `UnexpectedEof`, which the slot
/// treats like an unplugged device.
pub struct ReplayTransport {
    frames: VecDeque<Vec<u8>>,
}

impl ReplayTransport {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ControllerError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ControllerError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        let frames = decode_records(&bytes);
        info!("Loaded {} frames from {}", frames.len(), path.display());
        Ok(Self::from_frames(frames))
    }

    pub fn from_frames(frames: Vec<Vec<u8>>) -> Self {
        Self {
            frames: frames.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl UsbTransport for ReplayTransport {
    fn read_timeout(&mut self, buf: &mut [u8], _timeout_ms: i32) -> Result<usize, ControllerError> {
        match self.frames.pop_front() {
            Some(frame) => {
                let len = frame.len().min(buf.len());
                buf[..len].copy_from_slice(&frame[..len]);
                Ok(len)
            }
            None => Err(ControllerError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "end of capture",
            ))),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ControllerError> {
        debug!("[REPLAY] dropping {} byte output report", data.len());
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::usb::tests::{report, wired_identity, ScriptedTransport};
    use crate::controller::usb::Xbox360Controller;
    use crate::controller::{Button, ControllerSource, GenericInputMessage};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("padrelay-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_records_are_fixed_size() {
        let record = encode_record(&[1, 2, 3]);
        assert_eq!(record.len(), CAPTURE_RECORD_LEN);
        assert_eq!(&record[..4], &[3, 1, 2, 3]);
        assert!(record[4..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_drops_partial_record() {
        let mut bytes = encode_record(&[9, 9]).to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert_eq!(decode_records(&bytes), vec![vec![9, 9]]);
    }

    #[test]
    fn test_capture_path_is_sanitized() {
        let path = capture_path(Path::new("/tmp/cap"), "/dev/hidraw3");
        assert_eq!(path, PathBuf::from("/tmp/cap/dev_hidraw3.cap"));
    }

    #[test]
    fn test_capture_then_replay_drives_decoder() {
        let dir = temp_dir("capture");
        let file = dir.join("pad.cap");

        {
            let scripted = ScriptedTransport::new(vec![report(0, 0x10, 0, 0, 0, 0), report(0, 0, 0, 0, 0, 0)]);
            let mut capture = CaptureTransport::create(scripted, &file).unwrap();
            let mut buf = [0u8; 32];
            assert_eq!(capture.read_timeout(&mut buf, 10).unwrap(), 20);
            assert_eq!(capture.read_timeout(&mut buf, 10).unwrap(), 20);
            // timeouts are not recorded
            assert_eq!(capture.read_timeout(&mut buf, 10).unwrap(), 0);
        }

        assert_eq!(fs::metadata(&file).unwrap().len(), 2 * CAPTURE_RECORD_LEN as u64);

        let replay = ReplayTransport::open(&file).unwrap();
        assert_eq!(replay.remaining(), 2);
        let mut pad = Xbox360Controller::new(replay, wired_identity());
        let mut msg = GenericInputMessage::new();
        assert!(pad.read(&mut msg, 10).unwrap());
        assert!(msg.get_button(Button::A));
        assert!(pad.read(&mut msg, 10).unwrap());
        assert!(!msg.get_button(Button::A));
        assert!(pad.read(&mut msg, 10).is_err());

        let _ = fs::remove_dir_all(&dir);
    }
}
