//! Sensor hardware library interface.
//!
//! The hardware inventory is a three-level hierarchy: chips, the features of
//! each chip (one per measured channel, e.g. `temp1`) and the subfeatures of
//! each feature (one per attribute, e.g. `temp1_input`, `temp1_max`). Values
//! are queried by chip plus subfeature number.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for hardware library operations.
pub type SensorResult<T> = Result<T, SensorError>;

/// Numeric error codes, returned negated by [`SensorError::code`].
pub mod codes {
    pub const NO_ENTRY: i32 = 2;
    pub const ACCESS_R: i32 = 3;
    pub const KERNEL: i32 = 4;
    pub const IO: i32 = 10;
}

/// Error type for hardware library operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    /// Subsystem could not be initialized
    #[error("Sensor subsystem initialization failed: {0}")]
    Init(String),

    /// Unknown chip or subfeature
    #[error("No such entry: {0}")]
    NoEntry(String),

    /// Subfeature is not readable or its value could not be read
    #[error("Can't read: {0}")]
    AccessRead(String),

    /// Kernel interface missing
    #[error("Kernel interface error: {0}")]
    Kernel(String),

    /// I/O error talking to the chip
    #[error("I/O error: {0}")]
    Io(String),

    /// Raw error code reported by a backend
    #[error("Sensor library error {0}")]
    Code(i32),
}

impl SensorError {
    /// Negative error code, as reported by the hardware library.
    pub fn code(&self) -> i32 {
        match self {
            SensorError::Init(_) | SensorError::Kernel(_) => -codes::KERNEL,
            SensorError::NoEntry(_) => -codes::NO_ENTRY,
            SensorError::AccessRead(_) => -codes::ACCESS_R,
            SensorError::Io(_) => -codes::IO,
            SensorError::Code(code) => code.checked_abs().map_or(i32::MIN, |code| -code),
        }
    }
}

// ============================================================================
// Chips
// ============================================================================

/// Bus a chip sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusType {
    Isa,
    Pci,
    I2c,
    Spi,
    Virtual,
    Acpi,
    Hid,
    Mdio,
    Scsi,
}

/// Chip identity: driver prefix, bus and address.
///
/// Formats as `<prefix>-<bus>-<addr>`, e.g. `coretemp-isa-0000`,
/// `nvme-pci-0100` or `lm75-i2c-1-48`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChipName {
    pub prefix: String,
    pub bus: BusType,
    pub bus_nr: i32,
    pub addr: u32,
    /// Directory the chip was discovered in.
    pub path: PathBuf,
}

impl ChipName {
    /// Virtual chip with no physical bus.
    pub fn virtual_chip(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            bus: BusType::Virtual,
            bus_nr: 0,
            addr: 0,
            path: PathBuf::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }
}

impl fmt::Display for ChipName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = &self.prefix;
        match self.bus {
            BusType::Isa => write!(f, "{}-isa-{:04x}", prefix, self.addr),
            BusType::Pci => write!(f, "{}-pci-{:04x}", prefix, self.addr),
            BusType::I2c => write!(f, "{}-i2c-{}-{:02x}", prefix, self.bus_nr, self.addr),
            BusType::Spi => write!(f, "{}-spi-{}-{:x}", prefix, self.bus_nr, self.addr),
            BusType::Virtual => write!(f, "{}-virtual-{:x}", prefix, self.addr),
            BusType::Acpi => write!(f, "{}-acpi-{:x}", prefix, self.addr),
            BusType::Hid => write!(f, "{}-hid-{}-{:x}", prefix, self.bus_nr, self.addr),
            BusType::Mdio => write!(f, "{}-mdio-{:x}", prefix, self.addr),
            BusType::Scsi => write!(f, "{}-scsi-{}-{:x}", prefix, self.bus_nr, self.addr),
        }
    }
}

/// Detected chip. `index` is the chip's position in enumeration order and
/// serves as its handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chip {
    pub index: usize,
    pub name: ChipName,
}

// ============================================================================
// Features
// ============================================================================

/// Measured quantity of a feature, in enumeration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeatureKind {
    In,
    Fan,
    Temp,
    Power,
    Energy,
    Curr,
    Humidity,
    Intrusion,
}

impl FeatureKind {
    /// Attribute-name prefix of the kind (`temp` for `temp1_input`).
    pub fn prefix(self) -> &'static str {
        match self {
            FeatureKind::In => "in",
            FeatureKind::Fan => "fan",
            FeatureKind::Temp => "temp",
            FeatureKind::Power => "power",
            FeatureKind::Energy => "energy",
            FeatureKind::Curr => "curr",
            FeatureKind::Humidity => "humidity",
            FeatureKind::Intrusion => "intrusion",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Some(match prefix {
            "in" => FeatureKind::In,
            "fan" => FeatureKind::Fan,
            "temp" => FeatureKind::Temp,
            "power" => FeatureKind::Power,
            "energy" => FeatureKind::Energy,
            "curr" => FeatureKind::Curr,
            "humidity" => FeatureKind::Humidity,
            "intrusion" => FeatureKind::Intrusion,
            _ => return None,
        })
    }
}

/// One measured channel of a chip, e.g. `temp1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    /// Position within the chip's features.
    pub number: usize,
    pub kind: FeatureKind,
    pub label: Option<String>,
}

/// One attribute of a feature, e.g. `temp1_input`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfeature {
    pub name: String,
    /// Chip-wide unique number used to query the value.
    pub number: usize,
    /// Number of the owning feature.
    pub feature: usize,
    pub readable: bool,
    pub writable: bool,
}

// ============================================================================
// Library
// ============================================================================

/// Sensor hardware library.
///
/// Implementations snapshot the inventory when they are initialized; the
/// enumeration methods never change their answers afterwards. Values are
/// read on every call to [`SensorLibrary::value`].
pub trait SensorLibrary: Send + Sync {
    /// Detected chips, in enumeration order.
    fn chips(&self) -> &[Chip];

    /// Features of `chip`.
    fn features(&self, chip: &Chip) -> &[Feature];

    /// Subfeatures of `feature` on `chip`.
    fn subfeatures(&self, chip: &Chip, feature: &Feature) -> &[Subfeature];

    /// Current reading of subfeature `subfeature` on `chip`.
    fn value(&self, chip: &Chip, subfeature: usize) -> SensorResult<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chip(prefix: &str, bus: BusType, bus_nr: i32, addr: u32) -> ChipName {
        ChipName {
            prefix: prefix.to_string(),
            bus,
            bus_nr,
            addr,
            path: PathBuf::new(),
        }
    }

    #[test]
    fn test_chip_name_format() {
        assert_eq!(chip("coretemp", BusType::Isa, 0, 0).to_string(), "coretemp-isa-0000");
        assert_eq!(chip("it87", BusType::Isa, 0, 0x290).to_string(), "it87-isa-0290");
        assert_eq!(chip("nvme", BusType::Pci, 0, 0x100).to_string(), "nvme-pci-0100");
        assert_eq!(chip("lm75", BusType::I2c, 1, 0x48).to_string(), "lm75-i2c-1-48");
        assert_eq!(chip("acpitz", BusType::Acpi, 0, 0).to_string(), "acpitz-acpi-0");
        assert_eq!(ChipName::virtual_chip("iwlwifi_1").to_string(), "iwlwifi_1-virtual-0");
    }

    #[test]
    fn test_error_codes_are_negative() {
        assert_eq!(SensorError::NoEntry("x".into()).code(), -2);
        assert_eq!(SensorError::AccessRead("x".into()).code(), -3);
        assert_eq!(SensorError::Kernel("x".into()).code(), -4);
        assert_eq!(SensorError::Io("x".into()).code(), -10);
        assert_eq!(SensorError::Code(-1).code(), -1);
        assert_eq!(SensorError::Code(7).code(), -7);
        assert_eq!(SensorError::Code(i32::MAX).code(), -i32::MAX);
        // Verify the most negative code passes through without overflow
        assert_eq!(SensorError::Code(i32::MIN).code(), i32::MIN);
    }

    #[test]
    fn test_feature_kind_prefix_round_trip() {
        // Verify every kind resolves back from its attribute prefix
        for kind in [
            FeatureKind::In,
            FeatureKind::Fan,
            FeatureKind::Temp,
            FeatureKind::Power,
            FeatureKind::Energy,
            FeatureKind::Curr,
            FeatureKind::Humidity,
            FeatureKind::Intrusion,
        ] {
            assert_eq!(FeatureKind::from_prefix(kind.prefix()), Some(kind));
        }
        assert_eq!(FeatureKind::from_prefix("cpu"), None);
    }
}
