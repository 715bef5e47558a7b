use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, PackageId};

/// One pricing option attached to a package.
///
/// Only `period` matters to progress tracking; price is carried through for
/// the directory's other consumers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PricingEntry {
    pub period: Option<String>,
    pub price: Option<f64>,
}

/// A bundle of courses sold together, as reported by the package directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub id: PackageId,
    pub course_ids: Vec<CourseId>,
    pub pricing: Vec<PricingEntry>,
}

impl PackageInfo {
    /// Period string of the first pricing entry, if present and non-blank.
    #[must_use]
    pub fn period_spec(&self) -> Option<&str> {
        self.pricing
            .first()
            .and_then(|entry| entry.period.as_deref())
            .map(str::trim)
            .filter(|period| !period.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(pricing: Vec<PricingEntry>) -> PackageInfo {
        PackageInfo {
            id: PackageId::new("pkg"),
            course_ids: vec![CourseId::new("a")],
            pricing,
        }
    }

    #[test]
    fn period_comes_from_first_pricing_entry_only() {
        let pkg = package(vec![
            PricingEntry {
                period: None,
                price: Some(10.0),
            },
            PricingEntry {
                period: Some("1 year".into()),
                price: Some(99.0),
            },
        ]);
        assert_eq!(pkg.period_spec(), None);

        let pkg = package(vec![PricingEntry {
            period: Some(" 6 months ".into()),
            price: None,
        }]);
        assert_eq!(pkg.period_spec(), Some("6 months"));
    }

    #[test]
    fn no_pricing_means_no_period() {
        assert_eq!(package(Vec::new()).period_spec(), None);
    }
}
