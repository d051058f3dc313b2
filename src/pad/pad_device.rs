use std::{sync::mpsc::Sender, thread, time::Duration};

use hidapi::{DeviceInfo, HidApi, HidDevice, HidError};
use thiserror::Error;

use crate::config::DeviceFilter;

const REPORT_BUF_LEN: usize = 64;
const READ_TIMEOUT_MS: i32 = 50;
const THREAD_NAME: &str = "pad-midi-bridge-hid";

/// Notifications produced by the device thread, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Opened { name: String },
    Report(Vec<u8>),
    Error(String),
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("HID error: {0}")]
    Hid(#[from] HidError),
    #[error("device thread error: {0}")]
    Thread(String),
}

/// An open pad interface.
pub struct PadDevice {
    device: HidDevice,
    name: String,
    input_buf: [u8; REPORT_BUF_LEN],
}

impl PadDevice {
    /// Open the first interface matching `filter`, if any is present.
    pub fn open_first(api: &HidApi, filter: &DeviceFilter) -> Result<Option<Self>, DeviceError> {
        let Some(info) = matching_devices(api, filter).next() else {
            return Ok(None);
        };

        let device = info.open_device(api)?;
        let name = info.product_string().unwrap_or("Unknown controller").to_string();
        log::debug!(
            "Opened HID interface vid=0x{:04x} pid=0x{:04x} usage_page={} usage={} path={}",
            info.vendor_id(),
            info.product_id(),
            info.usage_page(),
            info.usage(),
            info.path().to_string_lossy()
        );

        Ok(Some(Self {
            device,
            name,
            input_buf: [0; REPORT_BUF_LEN],
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait up to the read timeout for one report. `Ok(None)` on timeout.
    pub fn read_report(&mut self) -> Result<Option<&[u8]>, DeviceError> {
        let len = self.device.read_timeout(&mut self.input_buf, READ_TIMEOUT_MS)?;
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(&self.input_buf[..len]))
    }
}

/// Interfaces matching the vendor id and the HID usage page/usage pair.
pub fn matching_devices<'a>(
    api: &'a HidApi,
    filter: &'a DeviceFilter,
) -> impl Iterator<Item = &'a DeviceInfo> + 'a {
    api.device_list().filter(move |info| {
        is_pad_interface(filter, info.vendor_id(), info.usage_page(), info.usage())
    })
}

/// Whether an interface with these ids passes `filter`. All three must match.
pub fn is_pad_interface(
    filter: &DeviceFilter,
    vendor_id: u16,
    usage_page: u16,
    usage: u16,
) -> bool {
    vendor_id == filter.vendor_id && usage_page == filter.usage_page && usage == filter.usage
}

/// Spawn the single producer of raw reports.
///
/// While no device is open the thread rescans every `scan_interval`. Once a
/// pad is found it sends [`DeviceEvent::Opened`], then one
/// [`DeviceEvent::Report`] per input report, and [`DeviceEvent::Error`]
/// when a read fails, after which it goes back to scanning. The thread
/// exits once the receiving side hangs up.
pub fn spawn_reader(
    filter: DeviceFilter,
    scan_interval: Duration,
    tx: Sender<DeviceEvent>,
) -> Result<thread::JoinHandle<()>, DeviceError> {
    thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || match HidApi::new() {
            Ok(mut api) => run_reader(&mut api, &filter, scan_interval, &tx),
            Err(err) => {
                let _ = tx.send(DeviceEvent::Error(format!("failed to initialise HID: {err}")));
            }
        })
        .map_err(|err| DeviceError::Thread(err.to_string()))
}

fn run_reader(
    api: &mut HidApi,
    filter: &DeviceFilter,
    scan_interval: Duration,
    tx: &Sender<DeviceEvent>,
) {
    loop {
        if let Err(err) = api.refresh_devices() {
            log::warn!("HID rescan failed: {err}");
        }

        let mut device = match PadDevice::open_first(api, filter) {
            Ok(Some(device)) => device,
            Ok(None) => {
                thread::sleep(scan_interval);
                continue;
            }
            Err(err) => {
                if tx.send(DeviceEvent::Error(err.to_string())).is_err() {
                    return;
                }
                thread::sleep(scan_interval);
                continue;
            }
        };

        let opened = DeviceEvent::Opened {
            name: device.name().to_string(),
        };
        if tx.send(opened).is_err() {
            return;
        }

        loop {
            let event = match device.read_report() {
                Ok(Some(report)) => DeviceEvent::Report(report.to_vec()),
                Ok(None) => continue,
                Err(err) => DeviceEvent::Error(err.to_string()),
            };
            let failed = matches!(event, DeviceEvent::Error(_));
            if tx.send(event).is_err() {
                return;
            }
            if failed {
                break;
            }
        }

        // Release the handle before scanning again.
        drop(device);
        thread::sleep(scan_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_VENDOR_ID, GAMEPAD_USAGE, GENERIC_DESKTOP_PAGE};

    #[test]
    fn filter_needs_vendor_and_usage() {
        let filter = DeviceFilter::default();
        assert!(is_pad_interface(
            &filter,
            DEFAULT_VENDOR_ID,
            GENERIC_DESKTOP_PAGE,
            GAMEPAD_USAGE
        ));
        // Another vendor's pad.
        assert!(!is_pad_interface(&filter, 0x054C, GENERIC_DESKTOP_PAGE, GAMEPAD_USAGE));
        // Same vendor, keyboard usage.
        assert!(!is_pad_interface(&filter, DEFAULT_VENDOR_ID, GENERIC_DESKTOP_PAGE, 0x06));
        // Same vendor, vendor-defined page.
        assert!(!is_pad_interface(&filter, DEFAULT_VENDOR_ID, 0xFF00, GAMEPAD_USAGE));
    }

    #[test]
    fn filter_follows_configured_ids() {
        let filter = DeviceFilter {
            vendor_id: 0x054C,
            usage_page: GENERIC_DESKTOP_PAGE,
            usage: 0x04,
        };
        assert!(is_pad_interface(&filter, 0x054C, GENERIC_DESKTOP_PAGE, 0x04));
        assert!(!is_pad_interface(
            &filter,
            DEFAULT_VENDOR_ID,
            GENERIC_DESKTOP_PAGE,
            GAMEPAD_USAGE
        ));
    }
}
