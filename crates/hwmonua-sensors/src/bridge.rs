//! Value bridge between sensor nodes and the hardware library.
//!
//! A read always succeeds at the operation level. Hardware state only shows
//! up in the returned value: a range request yields `BadIndexRangeInvalid`
//! as the value status, a failed hardware query yields a value without
//! payload.

use std::sync::Arc;

use chrono::Utc;
use hwmonua_core::{DataSource, DataValue, ReadContext, StatusCode, Variant};

use crate::enumerate::MeasurementPoint;
use crate::library::SensorLibrary;

/// Data source bound to one measurement point.
pub struct SensorDataSource {
    library: Arc<dyn SensorLibrary>,
    point: MeasurementPoint,
}

impl SensorDataSource {
    pub fn new(library: Arc<dyn SensorLibrary>, point: MeasurementPoint) -> Self {
        Self { library, point }
    }

    pub fn point(&self) -> &MeasurementPoint {
        &self.point
    }
}

impl DataSource for SensorDataSource {
    fn read(&self, ctx: &ReadContext<'_>) -> Result<DataValue, StatusCode> {
        // Sensors are scalars
        if ctx.range.is_some() {
            return Ok(DataValue::with_status(StatusCode::BAD_INDEX_RANGE_INVALID));
        }

        let chip = &self.point.chip;
        let number = self.point.subfeature.number;
        match self.library.value(chip, number) {
            Ok(reading) => {
                let mut value = DataValue::from(Variant::Double(reading));
                if ctx.source_timestamp {
                    value.source_timestamp = Some(Utc::now());
                }
                tracing::debug!(
                    "Read {} ({}) nr {} value {}",
                    chip.name,
                    chip.name.path.display(),
                    number,
                    reading
                );
                Ok(value)
            }
            Err(e) => {
                tracing::warn!(
                    "Cannot read value {} ({}) nr {}: {} (rc {})",
                    chip.name,
                    chip.name.path.display(),
                    number,
                    e,
                    e.code()
                );
                Ok(DataValue::empty())
            }
        }
    }
}

impl std::fmt::Debug for SensorDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorDataSource")
            .field("point", &self.point)
            .finish_non_exhaustive()
    }
}
