// 📊 Filter/Aggregator
// Group disbursements by (year, substance, entity, state) and narrow by selection

use crate::loader::DistributionRecord;
use crate::money::Money;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One row per unique (year, substance, entity_name, state_code)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedRecord {
    pub year: i32,
    pub substance: String,
    pub entity_name: String,
    pub state_code: String,
    pub total_value: Money,
}

impl AggregatedRecord {
    pub fn new(year: i32, substance: &str, entity_name: &str, state_code: &str, total_value: Money) -> Self {
        AggregatedRecord {
            year,
            substance: substance.to_string(),
            entity_name: entity_name.to_string(),
            state_code: state_code.to_string(),
            total_value,
        }
    }

    pub fn matches(&self, year: i32, substance: &str) -> bool {
        self.year == year && self.substance == substance
    }
}

/// Sum values per grouping key. Output is ordered by key, so repeated calls
/// over the same input return the same sequence.
pub fn aggregate(records: &[DistributionRecord]) -> Vec<AggregatedRecord> {
    let mut groups: BTreeMap<(i32, &str, &str, &str), Money> = BTreeMap::new();

    for record in records {
        let key = (
            record.year,
            record.substance.as_str(),
            record.entity_name.as_str(),
            record.state_code.as_str(),
        );
        *groups.entry(key).or_insert(Money::ZERO) += record.value;
    }

    groups
        .into_iter()
        .map(|((year, substance, entity_name, state_code), total_value)| {
            AggregatedRecord::new(year, substance, entity_name, state_code, total_value)
        })
        .collect()
}

/// Rows whose year and substance both equal the selection.
/// Either side unselected yields an empty result.
pub fn filter(aggregated: &[AggregatedRecord], year: Option<i32>, substance: Option<&str>) -> Vec<AggregatedRecord> {
    let (year, substance) = match (year, substance) {
        (Some(y), Some(s)) => (y, s),
        _ => return Vec::new(),
    };

    aggregated
        .iter()
        .filter(|row| row.matches(year, substance))
        .cloned()
        .collect()
}

// ============================================================================
// SELECTOR OPTIONS
// ============================================================================

pub fn substance_options(records: &[DistributionRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.substance.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn year_options(records: &[DistributionRecord]) -> Vec<i32> {
    records
        .iter()
        .map(|r| r.year)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Entity names present in an already filtered set
pub fn municipality_options(filtered: &[AggregatedRecord]) -> Vec<String> {
    filtered
        .iter()
        .map(|r| r.entity_name.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rec(year: i32, substance: &str, cents: i64, entity: &str, state: &str) -> DistributionRecord {
        DistributionRecord::new(year, substance, Money::from_cents(cents), entity, state)
    }

    fn sample() -> Vec<DistributionRecord> {
        vec![
            rec(2020, "OURO", 10000, "X", "MG"),
            rec(2020, "OURO", 5000, "X", "MG"),
            rec(2020, "OURO", 1, "Y", "PA"),
            rec(2020, "FERRO", 333, "X", "MG"),
            rec(2021, "OURO", 700, "X", "MG"),
            rec(2021, "OURO", 700, "X", "SP"),
            rec(2021, "OURO", -200, "Z", "BA"),
        ]
    }

    #[test]
    fn test_aggregate_sums_duplicate_keys() {
        let records = vec![
            rec(2020, "Ouro", 10000, "X", "MG"),
            rec(2020, "Ouro", 5000, "X", "MG"),
        ];

        let aggregated = aggregate(&records);
        assert_eq!(
            aggregated,
            vec![AggregatedRecord::new(2020, "Ouro", "X", "MG", Money::from_cents(15000))]
        );
    }

    #[test]
    fn test_aggregate_totals_match_inputs_exactly() {
        let records = sample();
        let aggregated = aggregate(&records);

        let mut expected: HashMap<(i32, String, String, String), i64> = HashMap::new();
        for r in &records {
            *expected
                .entry((r.year, r.substance.clone(), r.entity_name.clone(), r.state_code.clone()))
                .or_insert(0) += r.value.cents();
        }

        assert_eq!(aggregated.len(), expected.len());
        for row in &aggregated {
            let key = (row.year, row.substance.clone(), row.entity_name.clone(), row.state_code.clone());
            assert_eq!(row.total_value.cents(), expected[&key]);
        }

        let grand: Money = records.iter().map(|r| r.value).sum();
        let aggregated_grand: Money = aggregated.iter().map(|r| r.total_value).sum();
        assert_eq!(grand, aggregated_grand);
    }

    #[test]
    fn test_aggregate_is_stable() {
        let mut shuffled = sample();
        shuffled.reverse();
        assert_eq!(aggregate(&sample()), aggregate(&shuffled));
    }

    #[test]
    fn test_filter_exact_match() {
        let aggregated = aggregate(&sample());
        let filtered = filter(&aggregated, Some(2021), Some("OURO"));

        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|r| r.year == 2021 && r.substance == "OURO"));
    }

    #[test]
    fn test_filter_no_match_is_empty() {
        let aggregated = aggregate(&[
            rec(2020, "Ouro", 10000, "X", "MG"),
            rec(2020, "Ouro", 5000, "X", "MG"),
        ]);

        assert!(filter(&aggregated, Some(2021), Some("Ouro")).is_empty());
        assert!(filter(&aggregated, Some(2020), Some("OURO")).is_empty());
    }

    #[test]
    fn test_filter_sentinel_is_empty() {
        let aggregated = aggregate(&sample());
        assert!(filter(&aggregated, None, Some("OURO")).is_empty());
        assert!(filter(&aggregated, Some(2020), None).is_empty());
        assert!(filter(&aggregated, None, None).is_empty());
    }

    #[test]
    fn test_filter_partitions_aggregate() {
        let records = sample();
        let aggregated = aggregate(&records);

        let mut rebuilt = Vec::new();
        for year in year_options(&records) {
            for substance in substance_options(&records) {
                rebuilt.extend(filter(&aggregated, Some(year), Some(substance.as_str())));
            }
        }

        rebuilt.sort_by(|a, b| {
            (a.year, &a.substance, &a.entity_name, &a.state_code)
                .cmp(&(b.year, &b.substance, &b.entity_name, &b.state_code))
        });
        assert_eq!(rebuilt, aggregated);
    }

    #[test]
    fn test_options_sorted_unique() {
        let records = sample();
        assert_eq!(substance_options(&records), vec!["FERRO", "OURO"]);
        assert_eq!(year_options(&records), vec![2020, 2021]);

        let aggregated = aggregate(&records);
        let filtered = filter(&aggregated, Some(2021), Some("OURO"));
        assert_eq!(municipality_options(&filtered), vec!["X", "Z"]);
        assert!(municipality_options(&[]).is_empty());
    }
}
