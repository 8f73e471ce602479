use std::{fs::OpenOptions, io::Write, path::Path};

/// A USB HID gadget character device (`/dev/hidg0`-style), opened for
/// writing pre-built reports.
///
/// Report descriptor setup and ConfigFS gadget bring-up happen outside
/// this crate; by the time a `HidDevice` is constructed the character
/// device already exists and accepts fixed-size report writes.
pub struct HidDevice {
    file: std::fs::File,
}

impl HidDevice {
    /// Opens the character device at `path` for writing.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().write(true).open(path)?;
        Ok(Self { file })
    }

    /// Writes one report. The caller is responsible for building a
    /// report of the size the gadget's descriptor expects.
    pub fn write_report(&mut self, report: &[u8]) -> std::io::Result<()> {
        self.file.write_all(report)
    }
}

impl Drop for HidDevice {
    fn drop(&mut self) {
        if let Err(err) = self.file.flush() {
            log::warn!("failed to flush HID device on close: {err}");
        }
    }
}
