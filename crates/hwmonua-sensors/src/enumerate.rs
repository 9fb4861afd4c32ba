//! Sensor enumeration.
//!
//! Walks chips, then the features of each chip, then the subfeatures of each
//! feature, yielding every measurement point once. Discovery happens once at
//! startup; the resulting [`Inventory`] is never refreshed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::library::{Chip, Feature, SensorError, SensorLibrary, Subfeature};

/// One readable location: a chip plus one of its subfeatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementPoint {
    pub chip: Chip,
    pub feature: Feature,
    pub subfeature: Subfeature,
}

impl MeasurementPoint {
    /// `<chip>_<subfeature>`, e.g. `coretemp-isa-0000_temp1_input`.
    pub fn name(&self) -> String {
        format!("{}_{}", self.chip.name, self.subfeature.name)
    }
}

impl fmt::Display for MeasurementPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (nr {})", self.name(), self.subfeature.number)
    }
}

/// Iterator over every measurement point of a library, in enumeration order.
pub struct SensorEnumerator<'a> {
    library: &'a dyn SensorLibrary,
    chip: usize,
    feature: usize,
    subfeature: usize,
}

impl<'a> SensorEnumerator<'a> {
    pub fn new(library: &'a dyn SensorLibrary) -> Self {
        Self {
            library,
            chip: 0,
            feature: 0,
            subfeature: 0,
        }
    }
}

impl Iterator for SensorEnumerator<'_> {
    type Item = MeasurementPoint;

    fn next(&mut self) -> Option<Self::Item> {
        let library = self.library;
        loop {
            let chip = library.chips().get(self.chip)?;
            let Some(feature) = library.features(chip).get(self.feature) else {
                self.chip += 1;
                self.feature = 0;
                self.subfeature = 0;
                continue;
            };
            let Some(subfeature) = library.subfeatures(chip, feature).get(self.subfeature) else {
                self.feature += 1;
                self.subfeature = 0;
                continue;
            };

            self.subfeature += 1;
            return Some(MeasurementPoint {
                chip: chip.clone(),
                feature: feature.clone(),
                subfeature: subfeature.clone(),
            });
        }
    }
}

/// What to do when the sensor subsystem cannot be initialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorInitPolicy {
    /// Log the failure and continue with no sensors
    #[default]
    Degrade,
    /// Treat the failure as fatal
    Abort,
}

/// Snapshot of the discovered measurement points and the library that
/// answers their reads.
#[derive(Clone, Default)]
pub struct Inventory {
    library: Option<Arc<dyn SensorLibrary>>,
    points: Vec<MeasurementPoint>,
}

impl Inventory {
    /// Inventory without any sensors.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Enumerate every measurement point of `library`.
    pub fn from_library(library: Arc<dyn SensorLibrary>) -> Self {
        let points: Vec<_> = SensorEnumerator::new(library.as_ref()).collect();
        Self {
            library: Some(library),
            points,
        }
    }

    pub fn library(&self) -> Option<&Arc<dyn SensorLibrary>> {
        self.library.as_ref()
    }

    pub fn points(&self) -> &[MeasurementPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl fmt::Debug for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inventory")
            .field("initialized", &self.library.is_some())
            .field("points", &self.points.len())
            .finish()
    }
}

/// Initialize the sensor subsystem with `init` and enumerate it.
///
/// An initialization failure yields an empty inventory under
/// [`SensorInitPolicy::Degrade`] and is returned under
/// [`SensorInitPolicy::Abort`].
pub fn discover<L, F>(init: F, policy: SensorInitPolicy) -> Result<Inventory, SensorError>
where
    L: SensorLibrary + 'static,
    F: FnOnce() -> Result<L, SensorError>,
{
    match init() {
        Ok(library) => {
            let inventory = Inventory::from_library(Arc::new(library));
            tracing::info!("Discovered {} measurement points", inventory.len());
            Ok(inventory)
        }
        Err(e) => match policy {
            SensorInitPolicy::Degrade => {
                tracing::warn!(
                    "Sensor initialization failed (rc {}), continuing without sensors: {}",
                    e.code(),
                    e
                );
                Ok(Inventory::empty())
            }
            SensorInitPolicy::Abort => {
                tracing::error!("Sensor initialization failed (rc {}): {}", e.code(), e);
                Err(e)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{ChipName, FeatureKind, SensorResult};

    struct Fixed {
        chips: Vec<Chip>,
        features: Vec<Vec<Feature>>,
        subfeatures: Vec<Vec<Vec<Subfeature>>>,
    }

    impl SensorLibrary for Fixed {
        fn chips(&self) -> &[Chip] {
            &self.chips
        }

        fn features(&self, chip: &Chip) -> &[Feature] {
            &self.features[chip.index]
        }

        fn subfeatures(&self, chip: &Chip, feature: &Feature) -> &[Subfeature] {
            &self.subfeatures[chip.index][feature.number]
        }

        fn value(&self, _chip: &Chip, _subfeature: usize) -> SensorResult<f64> {
            Ok(0.0)
        }
    }

    fn feature(name: &str, number: usize) -> Feature {
        Feature {
            name: name.to_string(),
            number,
            kind: FeatureKind::Temp,
            label: None,
        }
    }

    fn sub(name: &str, number: usize, feature: usize) -> Subfeature {
        Subfeature {
            name: name.to_string(),
            number,
            feature,
            readable: true,
            writable: false,
        }
    }

    /// Three chips: the first has an empty feature in the middle, the second
    /// has no features at all.
    fn fixed() -> Fixed {
        let chip = |index, prefix: &str| Chip {
            index,
            name: ChipName::virtual_chip(prefix),
        };
        Fixed {
            chips: vec![chip(0, "a"), chip(1, "b"), chip(2, "c")],
            features: vec![
                vec![feature("temp1", 0), feature("temp2", 1), feature("temp3", 2)],
                vec![],
                vec![feature("temp1", 0)],
            ],
            subfeatures: vec![
                vec![
                    vec![sub("temp1_input", 0, 0), sub("temp1_max", 1, 0)],
                    vec![],
                    vec![sub("temp3_input", 2, 2)],
                ],
                vec![],
                vec![vec![sub("temp1_input", 0, 0)]],
            ],
        }
    }

    #[test]
    fn test_enumeration_order() {
        let library = fixed();
        let names: Vec<String> = SensorEnumerator::new(&library).map(|p| p.name()).collect();

        assert_eq!(
            names,
            vec![
                "a-virtual-0_temp1_input",
                "a-virtual-0_temp1_max",
                "a-virtual-0_temp3_input",
                "c-virtual-0_temp1_input",
            ]
        );
    }

    #[test]
    fn test_enumerator_is_exhausted() {
        let library = fixed();
        let mut enumerator = SensorEnumerator::new(&library);
        assert_eq!(enumerator.by_ref().count(), 4);
        // Verify it stays exhausted
        assert!(enumerator.next().is_none());
    }

    #[test]
    fn test_discover_degrades_on_init_failure() {
        let inventory = discover(
            || -> SensorResult<Fixed> { Err(SensorError::Init("no sysfs".into())) },
            SensorInitPolicy::Degrade,
        )
        .unwrap();

        assert!(inventory.is_empty());
        assert!(inventory.library().is_none());
    }

    #[test]
    fn test_discover_aborts_on_init_failure() {
        let result = discover(
            || -> SensorResult<Fixed> { Err(SensorError::Init("no sysfs".into())) },
            SensorInitPolicy::Abort,
        );
        assert!(matches!(result, Err(SensorError::Init(_))));
    }

    #[test]
    fn test_discover_collects_points() {
        let inventory = discover(|| Ok(fixed()), SensorInitPolicy::Abort).unwrap();
        assert_eq!(inventory.len(), 4);
        assert_eq!(inventory.points()[2].subfeature.number, 2);
    }
}
