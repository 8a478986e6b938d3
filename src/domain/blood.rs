//! Blood groups and red-cell compatibility

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ParseEnumError;

/// ABO/Rh blood group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::APositive,
        BloodGroup::ANegative,
        BloodGroup::BPositive,
        BloodGroup::BNegative,
        BloodGroup::AbPositive,
        BloodGroup::AbNegative,
        BloodGroup::OPositive,
        BloodGroup::ONegative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodGroup::APositive => "A+",
            BloodGroup::ANegative => "A-",
            BloodGroup::BPositive => "B+",
            BloodGroup::BNegative => "B-",
            BloodGroup::AbPositive => "AB+",
            BloodGroup::AbNegative => "AB-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ONegative => "O-",
        }
    }

    fn has_a(&self) -> bool {
        matches!(
            self,
            BloodGroup::APositive
                | BloodGroup::ANegative
                | BloodGroup::AbPositive
                | BloodGroup::AbNegative
        )
    }

    fn has_b(&self) -> bool {
        matches!(
            self,
            BloodGroup::BPositive
                | BloodGroup::BNegative
                | BloodGroup::AbPositive
                | BloodGroup::AbNegative
        )
    }

    fn rh_positive(&self) -> bool {
        matches!(
            self,
            BloodGroup::APositive
                | BloodGroup::BPositive
                | BloodGroup::AbPositive
                | BloodGroup::OPositive
        )
    }

    /// Whether red cells from `self` can be given to `recipient`
    ///
    /// A donor's antigens must all be present on the recipient's cells.
    pub fn can_donate_to(&self, recipient: BloodGroup) -> bool {
        (!self.has_a() || recipient.has_a())
            && (!self.has_b() || recipient.has_b())
            && (!self.rh_positive() || recipient.rh_positive())
    }

    /// Every group whose red cells `self` can receive
    pub fn compatible_donors(&self) -> Vec<BloodGroup> {
        Self::ALL
            .iter()
            .copied()
            .filter(|donor| donor.can_donate_to(*self))
            .collect()
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodGroup {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseEnumError::new("blood group", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Rows are recipients, columns are donors in the order O- O+ B- B+ A- A+ AB- AB+
    const DONOR_ORDER: [&str; 8] = ["O-", "O+", "B-", "B+", "A-", "A+", "AB-", "AB+"];
    const TABLE: [(&str, [u8; 8]); 8] = [
        ("AB+", [1, 1, 1, 1, 1, 1, 1, 1]),
        ("AB-", [1, 0, 1, 0, 1, 0, 1, 0]),
        ("A+", [1, 1, 0, 0, 1, 1, 0, 0]),
        ("A-", [1, 0, 0, 0, 1, 0, 0, 0]),
        ("B+", [1, 1, 1, 1, 0, 0, 0, 0]),
        ("B-", [1, 0, 1, 0, 0, 0, 0, 0]),
        ("O+", [1, 1, 0, 0, 0, 0, 0, 0]),
        ("O-", [1, 0, 0, 0, 0, 0, 0, 0]),
    ];

    #[test]
    fn test_compatibility_matches_reference_table() {
        for (recipient, row) in TABLE {
            let recipient: BloodGroup = recipient.parse().unwrap();
            for (donor, expected) in DONOR_ORDER.iter().zip(row) {
                let donor: BloodGroup = donor.parse().unwrap();
                assert_eq!(
                    donor.can_donate_to(recipient),
                    expected == 1,
                    "{} -> {}",
                    donor,
                    recipient
                );
            }
        }
    }

    #[test]
    fn test_universal_groups() {
        assert_eq!(BloodGroup::AbPositive.compatible_donors().len(), 8);
        assert_eq!(
            BloodGroup::ONegative.compatible_donors(),
            vec![BloodGroup::ONegative]
        );
    }

    #[test]
    fn test_parse_and_serde() {
        assert_eq!("ab-".parse::<BloodGroup>().unwrap(), BloodGroup::AbNegative);
        assert!("C+".parse::<BloodGroup>().is_err());

        let json = serde_json::to_string(&BloodGroup::OPositive).unwrap();
        assert_eq!(json, "\"O+\"");
        let back: BloodGroup = serde_json::from_str("\"B-\"").unwrap();
        assert_eq!(back, BloodGroup::BNegative);
    }
}
