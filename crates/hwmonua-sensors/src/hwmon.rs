//! Linux hwmon sysfs backend.
//!
//! Each `hwmonN` directory below the class root is one chip. The chip name
//! comes from its `name` attribute and the bus of the device it is attached
//! to. Attribute files named `<kind><channel>_<attribute>` become the chip's
//! features and subfeatures; values are read from those files and scaled to
//! volts, degrees Celsius, amperes, watts, joules, RPM and percent.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::library::{
    BusType, Chip, ChipName, Feature, FeatureKind, SensorError, SensorLibrary, SensorResult,
    Subfeature,
};

/// Default hwmon class directory.
pub const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";

const EIO: i32 = 5;

/// Attributes of each feature kind, in subfeature order.
fn attributes(kind: FeatureKind) -> &'static [&'static str] {
    match kind {
        FeatureKind::In | FeatureKind::Curr => &[
            "input", "min", "max", "lcrit", "crit", "average", "lowest", "highest", "alarm",
            "min_alarm", "max_alarm", "beep", "lcrit_alarm", "crit_alarm",
        ],
        FeatureKind::Fan => &[
            "input", "min", "max", "alarm", "fault", "div", "beep", "pulses", "min_alarm",
            "max_alarm",
        ],
        FeatureKind::Temp => &[
            "input", "max", "max_hyst", "min", "crit", "crit_hyst", "lcrit", "emergency",
            "emergency_hyst", "lowest", "highest", "min_hyst", "lcrit_hyst", "max_alarm",
            "min_alarm", "crit_alarm", "emergency_alarm", "lcrit_alarm", "fault", "type",
            "offset", "beep",
        ],
        FeatureKind::Power => &[
            "average", "average_highest", "average_lowest", "input", "input_highest",
            "input_lowest", "cap", "cap_hyst", "cap_max", "cap_min", "max", "crit", "min",
            "lcrit", "average_interval", "alarm", "cap_alarm", "max_alarm", "min_alarm",
            "crit_alarm", "lcrit_alarm",
        ],
        FeatureKind::Energy | FeatureKind::Humidity => &["input"],
        FeatureKind::Intrusion => &["alarm", "beep"],
    }
}

/// Divisor turning the raw sysfs integer into the reported value.
fn scaling(kind: FeatureKind, attribute: &str) -> f64 {
    if attribute == "offset" || attribute.ends_with("_interval") {
        return 1000.0;
    }
    let flag = attribute == "alarm"
        || attribute.ends_with("_alarm")
        || matches!(attribute, "beep" | "fault" | "type" | "div" | "pulses");
    if flag {
        return 1.0;
    }

    match kind {
        FeatureKind::In | FeatureKind::Temp | FeatureKind::Curr | FeatureKind::Humidity => 1000.0,
        FeatureKind::Power | FeatureKind::Energy => 1_000_000.0,
        FeatureKind::Fan | FeatureKind::Intrusion => 1.0,
    }
}

/// Split `temp1_crit_alarm` into (`Temp`, 1, `crit_alarm`).
fn parse_attribute_name(name: &str) -> Option<(FeatureKind, u32, &'static str)> {
    let letters = name.find(|c: char| !c.is_ascii_lowercase())?;
    let kind = FeatureKind::from_prefix(&name[..letters])?;

    let rest = &name[letters..];
    let (channel, attribute) = rest.split_once('_')?;
    if channel.is_empty() || !channel.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let channel = channel.parse().ok()?;

    attributes(kind)
        .iter()
        .find(|known| **known == attribute)
        .map(|known| (kind, channel, *known))
}

fn read_trimmed(path: &Path) -> Option<String> {
    let value = fs::read_to_string(path).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(unix)]
fn access_mode(metadata: &fs::Metadata) -> (bool, bool) {
    use std::os::unix::fs::PermissionsExt;
    let mode = metadata.permissions().mode();
    (mode & 0o400 != 0, mode & 0o200 != 0)
}

#[cfg(not(unix))]
fn access_mode(metadata: &fs::Metadata) -> (bool, bool) {
    (true, !metadata.permissions().readonly())
}

// ============================================================================
// Bus detection
// ============================================================================

/// Leading `[a-z0-9_]+` followed by `.<decimal>`: platform device instance.
fn platform_address(device: &str) -> u32 {
    device
        .split_once('.')
        .filter(|(driver, _)| {
            !driver.is_empty()
                && driver
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        })
        .and_then(|(_, instance)| instance.parse().ok())
        .unwrap_or(0)
}

/// `<bus>-<hex addr>` as used by i2c devices.
fn i2c_address(device: &str) -> Option<(i32, u32)> {
    let (bus, addr) = device.split_once('-')?;
    Some((bus.parse().ok()?, u32::from_str_radix(addr, 16).ok()?))
}

/// `spi<bus>.<chip select>`.
fn spi_address(device: &str) -> Option<(i32, u32)> {
    let (bus, cs) = device.strip_prefix("spi")?.split_once('.')?;
    Some((bus.parse().ok()?, cs.parse().ok()?))
}

/// `<domain>:<bus>:<slot>.<function>`, all hex.
fn pci_address(device: &str) -> Option<u32> {
    let mut parts = device.split(':');
    let domain = u32::from_str_radix(parts.next()?, 16).ok()?;
    let bus = u32::from_str_radix(parts.next()?, 16).ok()?;
    let (slot, function) = parts.next()?.split_once('.')?;
    if parts.next().is_some() {
        return None;
    }
    let slot = u32::from_str_radix(slot, 16).ok()?;
    let function = u32::from_str_radix(function, 16).ok()?;
    Some((domain << 16) + (bus << 8) + (slot << 3) + function)
}

/// `<bus>:<vendor>:<product>.<id>`, all hex.
fn hid_address(device: &str) -> Option<(i32, u32)> {
    let mut parts = device.split(':');
    let bus = i32::from_str_radix(parts.next()?, 16).ok()?;
    let _vendor = parts.next()?;
    let (_product, id) = parts.next()?.split_once('.')?;
    Some((bus, u32::from_str_radix(id, 16).ok()?))
}

/// `<host>:<channel>:<target>:<lun>`.
fn scsi_address(device: &str) -> Option<(i32, u32)> {
    let parts: Vec<&str> = device.split(':').collect();
    if parts.len() != 4 {
        return None;
    }
    Some((parts[0].parse().ok()?, parts[2].parse().ok()?))
}

/// Bus, bus number and address of the device a chip is attached to.
///
/// `None` for devices on a bus the naming scheme does not cover.
fn bus_of(device_path: &Path) -> Option<(BusType, i32, u32)> {
    let device = device_path.file_name()?.to_str()?;
    let subsystem = fs::read_link(device_path.join("subsystem"))
        .ok()
        .and_then(|link| link.file_name().and_then(|s| s.to_str()).map(str::to_string));
    let subsystem = subsystem.as_deref();
    let any_or = |expected: &str| subsystem.map_or(true, |s| s == expected);

    if any_or("i2c") {
        if let Some((bus_nr, addr)) = i2c_address(device) {
            // Legacy ISA devices were registered on i2c bus 9191
            if bus_nr == 9191 {
                return Some((BusType::Isa, 0, addr));
            }
            return Some((BusType::I2c, bus_nr, addr));
        }
    }
    if any_or("spi") {
        if let Some((bus_nr, addr)) = spi_address(device) {
            return Some((BusType::Spi, bus_nr, addr));
        }
    }
    if any_or("pci") {
        if let Some(addr) = pci_address(device) {
            return Some((BusType::Pci, 0, addr));
        }
    }
    if subsystem.map_or(true, |s| s == "platform" || s == "of_platform") {
        return Some((BusType::Isa, 0, platform_address(device)));
    }

    match subsystem? {
        "acpi" => Some((BusType::Acpi, 0, 0)),
        "hid" => hid_address(device).map(|(bus_nr, addr)| (BusType::Hid, bus_nr, addr)),
        "mdio_bus" => {
            let addr = device
                .split_once(':')
                .and_then(|(_, addr)| addr.parse().ok())
                .unwrap_or(0);
            Some((BusType::Mdio, 0, addr))
        }
        "scsi" => scsi_address(device).map(|(bus_nr, addr)| (BusType::Scsi, bus_nr, addr)),
        _ => None,
    }
}

// ============================================================================
// Backend
// ============================================================================

#[derive(Debug)]
struct Attribute {
    path: PathBuf,
    scale: f64,
    readable: bool,
}

#[derive(Debug)]
struct HwmonChip {
    chip: Chip,
    features: Vec<Feature>,
    /// Subfeatures per feature, indexed by feature number.
    subfeatures: Vec<Vec<Subfeature>>,
    /// Attribute files, indexed by subfeature number.
    attributes: Vec<Attribute>,
}

/// hwmon sysfs hardware library.
#[derive(Debug)]
pub struct Hwmon {
    root: PathBuf,
    chips: Vec<Chip>,
    details: Vec<HwmonChip>,
}

impl Hwmon {
    /// Scan `root` (normally [`DEFAULT_HWMON_ROOT`]) and snapshot every chip.
    ///
    /// Fails only if `root` itself cannot be listed; chips that cannot be
    /// identified are skipped.
    pub fn init(root: impl AsRef<Path>) -> SensorResult<Self> {
        let root = root.as_ref();
        let entries = fs::read_dir(root)
            .map_err(|e| SensorError::Init(format!("{}: {}", root.display(), e)))?;

        let mut dirs: Vec<(u32, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let index = name.to_str()?.strip_prefix("hwmon")?.parse().ok()?;
                Some((index, entry.path()))
            })
            .collect();
        dirs.sort();

        let mut details = Vec::new();
        for (_, dir) in dirs {
            match scan_chip(details.len(), &dir) {
                Some(chip) => {
                    tracing::debug!(
                        "Found chip {} at {} ({} features)",
                        chip.chip.name,
                        dir.display(),
                        chip.features.len()
                    );
                    details.push(chip);
                }
                None => tracing::debug!("Skipping {}", dir.display()),
            }
        }

        tracing::info!("hwmon: {} chips under {}", details.len(), root.display());

        Ok(Self {
            root: root.to_path_buf(),
            chips: details.iter().map(|d| d.chip.clone()).collect(),
            details,
        })
    }

    /// Class directory this snapshot was taken from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn detail(&self, chip: &Chip) -> Option<&HwmonChip> {
        self.details.get(chip.index).filter(|d| d.chip == *chip)
    }
}

fn scan_chip(index: usize, dir: &Path) -> Option<HwmonChip> {
    let device = dir.join("device");

    // Older drivers keep their attributes on the device, not the class dir
    let attr_dir = if dir.join("name").is_file() {
        dir.to_path_buf()
    } else {
        device.clone()
    };
    let prefix = read_trimmed(&attr_dir.join("name"))?;

    let name = match fs::canonicalize(&device) {
        Ok(device_path) => {
            let (bus, bus_nr, addr) = bus_of(&device_path)?;
            ChipName {
                prefix,
                bus,
                bus_nr,
                addr,
                path: attr_dir.clone(),
            }
        }
        Err(_) => ChipName::virtual_chip(prefix).with_path(attr_dir.clone()),
    };

    // (kind, channel) -> [(attribute order, attribute name, path)]
    let mut channels: BTreeMap<(FeatureKind, u32), Vec<(usize, &'static str, PathBuf)>> =
        BTreeMap::new();
    for entry in fs::read_dir(&attr_dir).ok()?.filter_map(|e| e.ok()) {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some((kind, channel, attribute)) = parse_attribute_name(file_name) else {
            continue;
        };
        let order = attributes(kind)
            .iter()
            .position(|known| *known == attribute)
            .unwrap_or(usize::MAX);
        channels
            .entry((kind, channel))
            .or_default()
            .push((order, attribute, entry.path()));
    }

    let chip = Chip { index, name };
    let mut features = Vec::new();
    let mut subfeatures = Vec::new();
    let mut attribute_files = Vec::new();

    for ((kind, channel), mut files) in channels {
        files.sort_by_key(|(order, _, _)| *order);
        let feature_name = format!("{}{}", kind.prefix(), channel);
        let feature_number = features.len();

        let mut subs = Vec::with_capacity(files.len());
        for (_, attribute, path) in files {
            let (readable, writable) = fs::metadata(&path)
                .map(|m| access_mode(&m))
                .unwrap_or((false, false));
            subs.push(Subfeature {
                name: format!("{}_{}", feature_name, attribute),
                number: attribute_files.len(),
                feature: feature_number,
                readable,
                writable,
            });
            attribute_files.push(Attribute {
                path,
                scale: scaling(kind, attribute),
                readable,
            });
        }

        features.push(Feature {
            label: read_trimmed(&attr_dir.join(format!("{}_label", feature_name))),
            name: feature_name,
            number: feature_number,
            kind,
        });
        subfeatures.push(subs);
    }

    Some(HwmonChip {
        chip,
        features,
        subfeatures,
        attributes: attribute_files,
    })
}

fn read_attribute(attribute: &Attribute) -> SensorResult<f64> {
    let display = attribute.path.display();
    let mut file = fs::File::open(&attribute.path)
        .map_err(|e| SensorError::Kernel(format!("{}: {}", display, e)))?;

    let mut raw = String::new();
    file.read_to_string(&mut raw).map_err(|e| {
        if e.raw_os_error() == Some(EIO) {
            SensorError::Io(format!("{}: {}", display, e))
        } else {
            SensorError::AccessRead(format!("{}: {}", display, e))
        }
    })?;

    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| SensorError::AccessRead(format!("{}: unparsable value {:?}", display, raw.trim())))?;
    Ok(value / attribute.scale)
}

impl SensorLibrary for Hwmon {
    fn chips(&self) -> &[Chip] {
        &self.chips
    }

    fn features(&self, chip: &Chip) -> &[Feature] {
        self.detail(chip).map(|d| d.features.as_slice()).unwrap_or_default()
    }

    fn subfeatures(&self, chip: &Chip, feature: &Feature) -> &[Subfeature] {
        self.detail(chip)
            .and_then(|d| d.subfeatures.get(feature.number))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn value(&self, chip: &Chip, subfeature: usize) -> SensorResult<f64> {
        let attribute = self
            .detail(chip)
            .and_then(|d| d.attributes.get(subfeature))
            .ok_or_else(|| SensorError::NoEntry(format!("{} subfeature {}", chip.name, subfeature)))?;

        if !attribute.readable {
            return Err(SensorError::AccessRead(attribute.path.display().to_string()));
        }
        read_attribute(attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_attribute_name() {
        assert_eq!(
            parse_attribute_name("temp1_input"),
            Some((FeatureKind::Temp, 1, "input"))
        );
        assert_eq!(
            parse_attribute_name("temp12_crit_alarm"),
            Some((FeatureKind::Temp, 12, "crit_alarm"))
        );
        // "intrusion" must not be read as "in" plus garbage
        assert_eq!(
            parse_attribute_name("intrusion0_alarm"),
            Some((FeatureKind::Intrusion, 0, "alarm"))
        );
        assert_eq!(parse_attribute_name("in0_input"), Some((FeatureKind::In, 0, "input")));

        for name in ["temp1_label", "name", "uevent", "update_interval", "cpu0_vid", "temp_input", "temp1_bogus"] {
            assert_eq!(parse_attribute_name(name), None, "accepted {}", name);
        }
    }

    #[test]
    fn test_attribute_name_outlives_file_name() {
        // Verify the attribute borrows the static table, not the directory entry
        let attribute: Option<&'static str> = {
            let file_name = String::from("fan2_min");
            parse_attribute_name(&file_name).map(|(_, _, attribute)| attribute)
        };
        assert_eq!(attribute, Some("min"));
    }

    #[test]
    fn test_scaling() {
        assert_eq!(scaling(FeatureKind::Temp, "input"), 1000.0);
        assert_eq!(scaling(FeatureKind::Temp, "crit_alarm"), 1.0);
        assert_eq!(scaling(FeatureKind::Temp, "type"), 1.0);
        assert_eq!(scaling(FeatureKind::Temp, "offset"), 1000.0);
        assert_eq!(scaling(FeatureKind::In, "max"), 1000.0);
        assert_eq!(scaling(FeatureKind::Fan, "input"), 1.0);
        assert_eq!(scaling(FeatureKind::Fan, "div"), 1.0);
        assert_eq!(scaling(FeatureKind::Power, "average"), 1_000_000.0);
        assert_eq!(scaling(FeatureKind::Power, "average_interval"), 1000.0);
        assert_eq!(scaling(FeatureKind::Energy, "input"), 1_000_000.0);
        assert_eq!(scaling(FeatureKind::Humidity, "input"), 1000.0);
    }

    #[test]
    fn test_device_addresses() {
        assert_eq!(platform_address("coretemp.0"), 0);
        assert_eq!(platform_address("it87.656"), 656);
        assert_eq!(platform_address("nct6775"), 0);
        assert_eq!(i2c_address("1-0048"), Some((1, 0x48)));
        assert_eq!(spi_address("spi0.1"), Some((0, 1)));
        assert_eq!(pci_address("0000:01:00.0"), Some(0x100));
        assert_eq!(pci_address("0000:00:18.3"), Some(0xc3));
        assert_eq!(hid_address("0003:1B1C:0C10.0005"), Some((3, 5)));
        assert_eq!(scsi_address("2:0:0:0"), Some((2, 0)));
        assert_eq!(pci_address("coretemp.0"), None);
    }

    #[test]
    fn test_missing_root_fails_init() {
        let dir = tempfile::tempdir().unwrap();
        let result = Hwmon::init(dir.path().join("missing"));
        assert!(matches!(result, Err(SensorError::Init(_))));
    }
}
