use crate::recognition::domain::face_classifier::Prediction;
use crate::recognition::domain::label_map::LabelMap;
use crate::shared::constants::UNKNOWN_LABEL;
use crate::shared::person_name::PersonName;
use crate::shared::region::Region;

#[derive(Clone, Debug, PartialEq)]
pub enum Identity {
    /// `accuracy` is `max(0, 100 - distance)`.
    Known { name: PersonName, accuracy: f64 },
    Unknown,
}

impl Identity {
    /// Applies the threshold rule to a raw prediction.
    ///
    /// A face is known only when its distance is below `threshold` and its
    /// label resolves in `labels`.
    pub fn decide(prediction: &Prediction, labels: &LabelMap, threshold: f64) -> Self {
        if prediction.distance >= threshold {
            return Identity::Unknown;
        }
        match prediction.label.and_then(|l| labels.name(l)) {
            Some(name) => Identity::Known {
                name: name.clone(),
                accuracy: (100.0 - prediction.distance).max(0.0),
            },
            None => Identity::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known { .. })
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Known { name, accuracy } => write!(f, "{name} ({accuracy:.1}%)"),
            Identity::Unknown => f.write_str(UNKNOWN_LABEL),
        }
    }
}

/// Outcome for one detected face in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Recognition {
    pub region: Region,
    pub identity: Identity,
    pub distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn labels() -> LabelMap {
        LabelMap::new(vec![
            PersonName::parse("alice").unwrap(),
            PersonName::parse("bob").unwrap(),
        ])
    }

    fn prediction(label: Option<u32>, distance: f64) -> Prediction {
        Prediction { label, distance }
    }

    #[test]
    fn test_close_match_is_known() {
        let id = Identity::decide(&prediction(Some(1), 20.0), &labels(), 50.0);
        match id {
            Identity::Known { name, accuracy } => {
                assert_eq!(name.as_str(), "bob");
                assert_relative_eq!(accuracy, 80.0);
            }
            Identity::Unknown => panic!("expected known"),
        }
    }

    #[rstest]
    #[case(prediction(Some(0), 50.0))]
    #[case(prediction(Some(0), 75.0))]
    #[case(prediction(None, 10.0))]
    #[case(prediction(Some(7), 10.0))]
    fn test_unknown_cases(#[case] p: Prediction) {
        assert_eq!(Identity::decide(&p, &labels(), 50.0), Identity::Unknown);
    }

    #[test]
    fn test_accuracy_never_negative() {
        let id = Identity::decide(&prediction(Some(0), 130.0), &labels(), 200.0);
        assert_eq!(
            id,
            Identity::Known {
                name: PersonName::parse("alice").unwrap(),
                accuracy: 0.0
            }
        );
    }

    #[test]
    fn test_display() {
        let known = Identity::Known {
            name: PersonName::parse("alice").unwrap(),
            accuracy: 87.26,
        };
        assert_eq!(known.to_string(), "alice (87.3%)");
        assert_eq!(Identity::Unknown.to_string(), "Unknown");
    }
}
