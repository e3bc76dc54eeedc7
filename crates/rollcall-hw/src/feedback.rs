//! Operator feedback panel: 16x2 character LCD and a piezo buzzer.
//!
//! The LCD is an HD44780 behind a PCF8574 I2C backpack, driven through
//! `/dev/i2c-N`; the buzzer is an active-high pin on the sysfs GPIO
//! interface. The panel is an explicit handle: construct with [`FeedbackPanel::init`],
//! release with [`FeedbackPanel::cleanup`] (also run on drop, idempotent,
//! safe after partial init). Hardware that is simply absent degrades to
//! console logging; hardware that is present but misbehaving fails init.

use serde::Deserialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// `ioctl` request selecting the target chip address on an I2C bus.
const I2C_SLAVE: libc::c_ulong = 0x0703;

// PCF8574 backpack pin mapping: P0=RS, P2=EN, P3=backlight, P4-P7=data.
const LCD_RS: u8 = 0x01;
const LCD_EN: u8 = 0x04;
const LCD_BACKLIGHT: u8 = 0x08;

// HD44780 commands.
const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_SET_4BIT: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;
const SECOND_ROW_OFFSET: u8 = 0x40;

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("i2c: {0}")]
    I2c(std::io::Error),
    #[error("gpio: {0}")]
    Gpio(std::io::Error),
    #[error("failed to read feedback config {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },
    #[error("bad feedback config {path}: {source}")]
    ConfigParse {
        path: String,
        source: toml::de::Error,
    },
}

/// Panel wiring, loadable from a TOML file. Missing keys take defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// I2C bus number (`/dev/i2c-<bus>`).
    pub i2c_bus: u8,
    /// PCF8574 backpack address, usually 0x27.
    pub lcd_address: u16,
    /// Characters per LCD row.
    pub lcd_width: usize,
    /// Sysfs GPIO number of the buzzer pin.
    pub buzzer_gpio: u32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            lcd_address: 0x27,
            lcd_width: 16,
            buzzer_gpio: 23,
        }
    }
}

impl FeedbackConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, FeedbackError> {
        let text = std::fs::read_to_string(path).map_err(|source| FeedbackError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| FeedbackError::ConfigParse {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Truncate a display line to the panel width, on character boundaries.
pub fn fit_line(line: &str, width: usize) -> String {
    line.chars().take(width).collect()
}

/// HD44780 over a PCF8574 backpack, 4-bit mode.
struct Lcd {
    bus: File,
    width: usize,
}

impl Lcd {
    fn open(bus: u8, address: u16, width: usize) -> Result<Self, FeedbackError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/i2c-{bus}"))
            .map_err(FeedbackError::I2c)?;

        // SAFETY: fd is valid for the lifetime of `file`; I2C_SLAVE takes
        // the 7-bit chip address as its argument.
        let ret = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE, libc::c_ulong::from(address)) };
        if ret < 0 {
            return Err(FeedbackError::I2c(std::io::Error::last_os_error()));
        }

        let mut lcd = Self { bus: file, width };
        lcd.init_4bit()?;
        Ok(lcd)
    }

    /// Datasheet power-on sequence: 8-bit mode thrice, then 4-bit mode.
    fn init_4bit(&mut self) -> Result<(), FeedbackError> {
        std::thread::sleep(Duration::from_millis(50));
        for delay_us in [4500, 4500, 150] {
            self.write_nibble(0x30, false)?;
            std::thread::sleep(Duration::from_micros(delay_us));
        }
        self.write_nibble(0x20, false)?;

        self.command(CMD_FUNCTION_SET_4BIT)?;
        self.command(CMD_DISPLAY_ON)?;
        self.command(CMD_CLEAR)?;
        self.command(CMD_ENTRY_MODE)?;
        Ok(())
    }

    fn write_raw(&mut self, byte: u8) -> Result<(), FeedbackError> {
        self.bus
            .write_all(&[byte | LCD_BACKLIGHT])
            .map_err(FeedbackError::I2c)
    }

    /// Latch the high nibble of `value` with an enable pulse.
    fn write_nibble(&mut self, value: u8, rs: bool) -> Result<(), FeedbackError> {
        let base = (value & 0xF0) | if rs { LCD_RS } else { 0 };
        self.write_raw(base | LCD_EN)?;
        std::thread::sleep(Duration::from_micros(1));
        self.write_raw(base)?;
        std::thread::sleep(Duration::from_micros(50));
        Ok(())
    }

    fn send(&mut self, value: u8, rs: bool) -> Result<(), FeedbackError> {
        self.write_nibble(value, rs)?;
        self.write_nibble(value << 4, rs)
    }

    fn command(&mut self, cmd: u8) -> Result<(), FeedbackError> {
        self.send(cmd, false)?;
        if cmd == CMD_CLEAR {
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), FeedbackError> {
        self.command(CMD_CLEAR)
    }

    fn show(&mut self, line1: &str, line2: &str) -> Result<(), FeedbackError> {
        self.clear()?;
        self.write_row(0, line1)?;
        self.write_row(1, line2)
    }

    fn write_row(&mut self, row: u8, text: &str) -> Result<(), FeedbackError> {
        let addr = if row == 0 { 0 } else { SECOND_ROW_OFFSET };
        self.command(CMD_SET_DDRAM | addr)?;
        for c in text.chars().take(self.width) {
            let byte = if c.is_ascii() { c as u8 } else { b'?' };
            self.send(byte, true)?;
        }
        Ok(())
    }
}

/// Active-high buzzer on a sysfs GPIO pin.
#[derive(Debug)]
struct Buzzer {
    value_path: PathBuf,
    unexport_path: PathBuf,
    pin: u32,
    exported_here: bool,
}

impl Buzzer {
    fn open(pin: u32) -> Result<Self, FeedbackError> {
        Self::open_at(Path::new("/sys/class/gpio"), pin)
    }

    fn open_at(gpio_root: &Path, pin: u32) -> Result<Self, FeedbackError> {
        let pin_dir = gpio_root.join(format!("gpio{pin}"));

        let mut exported_here = false;
        if !pin_dir.exists() {
            std::fs::write(gpio_root.join("export"), pin.to_string())
                .map_err(FeedbackError::Gpio)?;
            // Give udev a moment to set up the pin attributes.
            std::thread::sleep(Duration::from_millis(50));
            exported_here = true;
        }

        std::fs::write(pin_dir.join("direction"), "out").map_err(FeedbackError::Gpio)?;

        let buzzer = Self {
            value_path: pin_dir.join("value"),
            unexport_path: gpio_root.join("unexport"),
            pin,
            exported_here,
        };
        buzzer.set(false)?;
        Ok(buzzer)
    }

    fn set(&self, on: bool) -> Result<(), FeedbackError> {
        std::fs::write(&self.value_path, if on { "1" } else { "0" }).map_err(FeedbackError::Gpio)
    }

    fn beep(&self, duration: Duration) {
        if let Err(e) = self.set(true) {
            tracing::warn!(error = %e, "buzzer on failed");
            return;
        }
        std::thread::sleep(duration);
        if let Err(e) = self.set(false) {
            tracing::warn!(error = %e, "buzzer off failed");
        }
    }

    fn close(&self) {
        let _ = self.set(false);
        if self.exported_here {
            if let Err(e) = std::fs::write(&self.unexport_path, self.pin.to_string()) {
                tracing::warn!(pin = self.pin, error = %e, "gpio unexport failed");
            }
        }
    }
}

/// The feedback handle passed into the attendance loop.
pub struct FeedbackPanel {
    lcd: Option<Lcd>,
    buzzer: Option<Buzzer>,
    width: usize,
    torn_down: bool,
}

impl FeedbackPanel {
    /// Bring up the LCD and buzzer.
    ///
    /// Devices that do not exist on this machine (no I2C bus, no GPIO
    /// export) are logged and skipped, and their output falls back to the
    /// console; any other hardware error fails init.
    pub fn init(config: &FeedbackConfig) -> Result<Self, FeedbackError> {
        let lcd = match Lcd::open(config.i2c_bus, config.lcd_address, config.lcd_width) {
            Ok(lcd) => Some(lcd),
            Err(FeedbackError::I2c(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(bus = config.i2c_bus, "no LCD found, display falls back to console");
                None
            }
            Err(e) => return Err(e),
        };

        let buzzer = match Buzzer::open(config.buzzer_gpio) {
            Ok(b) => Some(b),
            Err(FeedbackError::Gpio(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(pin = config.buzzer_gpio, "no buzzer GPIO found, beeps disabled");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            lcd,
            buzzer,
            width: config.lcd_width,
            torn_down: false,
        })
    }

    /// A panel with no hardware at all; everything goes to the console.
    pub fn headless(width: usize) -> Self {
        Self {
            lcd: None,
            buzzer: None,
            width,
            torn_down: false,
        }
    }

    /// Show two lines, each truncated to the panel width.
    pub fn display_message(&mut self, line1: &str, line2: &str) {
        let line1 = fit_line(line1, self.width);
        let line2 = fit_line(line2, self.width);

        match &mut self.lcd {
            Some(lcd) => {
                if let Err(e) = lcd.show(&line1, &line2) {
                    tracing::warn!(error = %e, "LCD write failed");
                }
            }
            None => tracing::info!(%line1, %line2, "display"),
        }
    }

    /// One long beep: attendance recorded.
    pub fn buzz_success(&self) {
        match &self.buzzer {
            Some(b) => b.beep(Duration::from_millis(200)),
            None => tracing::debug!("buzz_success (no buzzer)"),
        }
    }

    /// Two short beeps: failure.
    pub fn buzz_error(&self) {
        match &self.buzzer {
            Some(b) => {
                b.beep(Duration::from_millis(100));
                std::thread::sleep(Duration::from_millis(100));
                b.beep(Duration::from_millis(100));
            }
            None => tracing::debug!("buzz_error (no buzzer)"),
        }
    }

    /// Release the hardware. Idempotent; runs on drop as well, so every
    /// exit path of the capture loop tears the panel down.
    pub fn cleanup(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(mut lcd) = self.lcd.take() {
            if let Err(e) = lcd.clear() {
                tracing::warn!(error = %e, "LCD clear on teardown failed");
            }
        }
        if let Some(buzzer) = self.buzzer.take() {
            buzzer.close();
        }
    }
}

impl Drop for FeedbackPanel {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fit_line_truncates_to_width() {
        assert_eq!(fit_line("Welcome Alexandria", 16), "Welcome Alexandr");
        assert_eq!(fit_line("Hi", 16), "Hi");
        assert_eq!(fit_line("", 16), "");
    }

    #[test]
    fn fit_line_counts_characters_not_bytes() {
        assert_eq!(fit_line("ááááá", 3), "ááá");
    }

    #[test]
    fn config_defaults() {
        let config = FeedbackConfig::default();
        assert_eq!(config.i2c_bus, 1);
        assert_eq!(config.lcd_address, 0x27);
        assert_eq!(config.lcd_width, 16);
        assert_eq!(config.buzzer_gpio, 23);
    }

    #[test]
    fn config_parses_partial_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panel.toml");
        std::fs::write(&path, "buzzer_gpio = 18\nlcd_width = 20\n").unwrap();

        let config = FeedbackConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.buzzer_gpio, 18);
        assert_eq!(config.lcd_width, 20);
        assert_eq!(config.i2c_bus, 1);
    }

    #[test]
    fn config_rejects_bad_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("panel.toml");
        std::fs::write(&path, "buzzer_gpio = \"not a number\"").unwrap();

        assert!(matches!(
            FeedbackConfig::from_toml_file(&path),
            Err(FeedbackError::ConfigParse { .. })
        ));
    }

    #[test]
    fn buzzer_drives_value_file() {
        // Simulated sysfs: pre-exported pin directory.
        let dir = tempdir().unwrap();
        let pin_dir = dir.path().join("gpio23");
        std::fs::create_dir(&pin_dir).unwrap();
        std::fs::write(pin_dir.join("direction"), "in").unwrap();
        std::fs::write(pin_dir.join("value"), "0").unwrap();

        let buzzer = Buzzer::open_at(dir.path(), 23).unwrap();
        assert_eq!(std::fs::read_to_string(pin_dir.join("direction")).unwrap(), "out");

        buzzer.beep(Duration::from_millis(1));
        // Active level ends low.
        assert_eq!(std::fs::read_to_string(pin_dir.join("value")).unwrap(), "0");

        buzzer.close();
        // Pin was pre-exported, so close must not unexport it.
        assert!(pin_dir.exists());
    }

    #[test]
    fn buzzer_without_gpio_tree_is_not_found() {
        let dir = tempdir().unwrap();
        let err = Buzzer::open_at(&dir.path().join("missing"), 23).unwrap_err();
        match err {
            FeedbackError::Gpio(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn headless_panel_cleanup_is_idempotent() {
        let mut panel = FeedbackPanel::headless(16);
        panel.display_message("System Ready", "Lec: Math_101");
        panel.cleanup();
        panel.cleanup();
        panel.buzz_success();
        panel.buzz_error();
    }
}
