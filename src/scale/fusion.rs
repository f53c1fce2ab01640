use crate::scale::ocr::DigitReading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    Manual,
    Ocr,
}

/// A ground-truth mass reading recorded for one tick. Manual readings
/// carry no confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleReading {
    pub t: f64,
    pub mass_g: f64,
    pub source: ReadingSource,
    pub confidence: Option<f64>,
}

/// Merge the per-tick truth inputs into at most one reading. A parsable
/// manual entry wins outright; OCR confidence never overrides it.
pub fn fuse(t: f64, manual: Option<&str>, ocr: Option<DigitReading>) -> Option<ScaleReading> {
    if let Some(raw) = manual {
        if let Ok(mass) = raw.trim().parse::<f64>() {
            if mass.is_finite() {
                return Some(ScaleReading {
                    t,
                    mass_g: mass,
                    source: ReadingSource::Manual,
                    confidence: None,
                });
            }
        }
    }
    let reading = ocr?;
    if !reading.value.is_finite() {
        return None;
    }
    Some(ScaleReading {
        t,
        mass_g: reading.value,
        source: ReadingSource::Ocr,
        confidence: Some(reading.confidence.clamp(0.0, 1.0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_beats_high_confidence_ocr() {
        let ocr = DigitReading {
            value: 123.0,
            confidence: 0.99,
        };
        let reading = fuse(1.0, Some("42.5"), Some(ocr)).expect("manual entry should record");
        assert_eq!(reading.source, ReadingSource::Manual);
        assert_eq!(reading.mass_g, 42.5);
        assert_eq!(reading.confidence, None);
    }

    #[test]
    fn ocr_is_used_when_manual_is_absent() {
        let ocr = DigitReading {
            value: 77.0,
            confidence: 0.6,
        };
        let reading = fuse(2.0, None, Some(ocr)).expect("ocr reading should record");
        assert_eq!(reading.source, ReadingSource::Ocr);
        assert_eq!(reading.mass_g, 77.0);
        assert_eq!(reading.confidence, Some(0.6));
    }

    #[test]
    fn unparsable_manual_falls_through_to_ocr() {
        let ocr = DigitReading {
            value: 10.0,
            confidence: 0.5,
        };
        let reading = fuse(0.0, Some("not a number"), Some(ocr)).unwrap();
        assert_eq!(reading.source, ReadingSource::Ocr);
    }

    #[test]
    fn nan_ocr_value_records_nothing() {
        let ocr = DigitReading {
            value: f64::NAN,
            confidence: 0.9,
        };
        assert!(fuse(0.0, None, Some(ocr)).is_none());
        assert!(fuse(0.0, Some(""), Some(ocr)).is_none());
    }

    #[test]
    fn empty_tick_records_nothing() {
        assert!(fuse(0.0, None, None).is_none());
    }

    #[test]
    fn ocr_confidence_is_clamped() {
        let ocr = DigitReading {
            value: 5.0,
            confidence: 1.7,
        };
        let reading = fuse(0.0, None, Some(ocr)).unwrap();
        assert_eq!(reading.confidence, Some(1.0));
    }

    #[test]
    fn manual_whitespace_is_tolerated() {
        let reading = fuse(0.0, Some("  19.25 "), None).unwrap();
        assert_eq!(reading.mass_g, 19.25);
    }

    #[test]
    fn non_finite_manual_is_absent() {
        assert!(fuse(0.0, Some("inf"), None).is_none());
        assert!(fuse(0.0, Some("NaN"), None).is_none());
    }
}
