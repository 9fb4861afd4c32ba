//! Hardware sensor discovery and bridging for HwmonUA.
//!
//! - [`library`] - the sensor hardware library interface
//! - [`hwmon`] - the Linux hwmon sysfs implementation of it
//! - [`enumerate`] - discovery of every measurement point at startup
//! - [`registrar`] - one address-space node per measurement point
//! - [`bridge`] - the read callback bound to each node
//!
//! ```rust,no_run
//! use hwmonua_core::AddressSpace;
//! use hwmonua_sensors::{discover, register_sensors, Hwmon, SensorInitPolicy};
//!
//! let inventory = discover(|| Hwmon::init("/sys/class/hwmon"), SensorInitPolicy::Degrade)?;
//! let mut space = AddressSpace::new();
//! register_sensors(&mut space, &inventory)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bridge;
pub mod enumerate;
pub mod hwmon;
pub mod library;
pub mod registrar;

pub use bridge::SensorDataSource;
pub use enumerate::{discover, Inventory, MeasurementPoint, SensorEnumerator, SensorInitPolicy};
pub use hwmon::{Hwmon, DEFAULT_HWMON_ROOT};
pub use library::{
    BusType, Chip, ChipName, Feature, FeatureKind, SensorError, SensorLibrary, SensorResult,
    Subfeature,
};
pub use registrar::{
    register_sensor, register_sensors, sensor_node_id, RegistrationError, SENSOR_NAMESPACE,
};
