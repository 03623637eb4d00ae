//! Data units delivered by a sensor feed.
//!
//! A feed delivers readings in batches: every reading carries the raw
//! millivolt value plus the contact-quality code the hardware reported for
//! it. The first reading's code is the batch's leading contact indicator.

use serde::{Deserialize, Serialize};

/// Contact-quality code the hardware reports when the measuring electrode
/// has no valid physiological connection (feed-defined sentinel).
pub const NO_CONTACT_CODE: i32 = 5;

/// One accepted scalar reading (millivolt-equivalent value).
pub type Sample = f32;

/// A single raw reading from the sensor feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Contact-quality code reported alongside this reading
    pub contact_quality: i32,
    /// Raw ECG value in millivolts
    pub millivolts: f32,
}

impl SensorReading {
    pub fn new(contact_quality: i32, millivolts: f32) -> Self {
        Self {
            contact_quality,
            millivolts,
        }
    }

    /// Whether this reading's code marks the electrode as off-contact.
    pub fn is_off_contact(&self) -> bool {
        self.contact_quality == NO_CONTACT_CODE
    }
}

/// One delivery from the sensor feed: zero or more readings sharing a
/// leading contact indicator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub readings: Vec<SensorReading>,
}

impl SampleBatch {
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self { readings }
    }

    /// Build a batch whose readings all carry the same contact code.
    pub fn uniform(contact_quality: i32, values: &[f32]) -> Self {
        Self {
            readings: values
                .iter()
                .map(|&mv| SensorReading::new(contact_quality, mv))
                .collect(),
        }
    }

    /// The contact code of the first reading, the feed's per-batch leading
    /// indicator. `None` for an empty batch, which consumers ignore.
    pub fn leading_contact_code(&self) -> Option<i32> {
        self.readings.first().map(|r| r.contact_quality)
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_contact_code() {
        let batch = SampleBatch::uniform(0, &[0.1, 0.2]);
        assert_eq!(batch.leading_contact_code(), Some(0));

        let empty = SampleBatch::default();
        assert_eq!(empty.leading_contact_code(), None);
    }

    #[test]
    fn test_off_contact_classification() {
        assert!(SensorReading::new(NO_CONTACT_CODE, 0.0).is_off_contact());
        assert!(!SensorReading::new(0, 0.0).is_off_contact());
        assert!(!SensorReading::new(1, 0.0).is_off_contact());
    }

    #[test]
    fn test_uniform_batch_preserves_order() {
        let batch = SampleBatch::uniform(0, &[1.0, 2.0, 3.0]);
        let values: Vec<f32> = batch.readings.iter().map(|r| r.millivolts).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }
}
