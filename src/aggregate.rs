use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Datelike, Duration, Utc};

use crate::models::{
    ComparisonRow, ComparisonTable, CompositionSlice, LeaderboardRow, RawReport, ReportRecord,
    ReportStatus, Snapshot, TrendPoint, UNKNOWN,
};

/// Fixed English month labels so bucketing never depends on the process
/// locale. Months with the same name in different years share a bucket;
/// callers that need year separation must key by year+month upstream.
const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Turn a raw row into the canonical shape. Total and pure: missing unit or
/// indicator becomes the `UNKNOWN` sentinel, an unrecognized status string
/// degrades to `Queued` (counts toward totals only), and a missing score
/// stays missing instead of becoming zero.
pub fn normalize(raw: RawReport) -> ReportRecord {
    let unit_name = match raw.unit_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => UNKNOWN.to_string(),
    };
    let indicator_type = match raw.indicator_type {
        Some(name) if !name.trim().is_empty() => name,
        _ => UNKNOWN.to_string(),
    };
    let status = ReportStatus::parse(&raw.status).unwrap_or(ReportStatus::Queued);

    ReportRecord {
        id: raw.id,
        unit_name,
        indicator_type,
        status,
        score: raw.score,
        created_at: raw.created_at,
        approved_at: raw.approved_at,
    }
}

pub fn cutoff_date(since_days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(since_days.max(1))
}

/// Running mean that accumulates (sum, count) and divides only at read time.
/// `total` also counts records that carried no score.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAcc {
    sum: f64,
    scored: usize,
    total: usize,
}

impl MeanAcc {
    pub fn observe(&mut self, score: Option<f64>) {
        self.total += 1;
        if let Some(value) = score {
            self.sum += value;
            self.scored += 1;
        }
    }

    pub fn scored(&self) -> usize {
        self.scored
    }

    pub fn mean(&self) -> f64 {
        if self.scored == 0 {
            0.0
        } else {
            self.sum / self.scored as f64
        }
    }
}

/// The one grouping primitive behind every view: fold `records` into
/// accumulators keyed by `key_fn`, keeping first-seen key order. A `None`
/// key excludes the record from this aggregate.
pub fn group_in_order<T, K, A, KF, RF>(records: &[T], key_fn: KF, mut reduce_fn: RF) -> Vec<(K, A)>
where
    K: Eq + Hash + Clone,
    A: Default,
    KF: Fn(&T) -> Option<K>,
    RF: FnMut(&mut A, &T),
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, A)> = Vec::new();

    for record in records {
        let Some(key) = key_fn(record) else {
            continue;
        };
        let slot = match index.get(&key) {
            Some(slot) => *slot,
            None => {
                groups.push((key.clone(), A::default()));
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };
        reduce_fn(&mut groups[slot].1, record);
    }

    groups
}

fn known(name: &str) -> Option<String> {
    if name == UNKNOWN {
        None
    } else {
        Some(name.to_string())
    }
}

/// Mean score per unit, for the prior-window delta lookup. Units without a
/// scored record are absent rather than zero.
fn unit_means(records: &[ReportRecord]) -> HashMap<String, f64> {
    group_in_order(
        records,
        |r: &ReportRecord| known(&r.unit_name),
        |acc: &mut MeanAcc, r| acc.observe(r.score),
    )
    .into_iter()
    .filter(|(_, acc)| acc.scored() > 0)
    .map(|(unit, acc)| (unit, acc.mean()))
    .collect()
}

/// Rank units by mean score over the current window. Units with no scored
/// record are dropped; ties keep first-seen order; `delta` compares against
/// the prior window and is absent when the unit has no scored prior data.
pub fn build_leaderboard(current: &[ReportRecord], prior: &[ReportRecord]) -> Vec<LeaderboardRow> {
    let prior_means = unit_means(prior);

    let mut rows: Vec<LeaderboardRow> = group_in_order(
        current,
        |r: &ReportRecord| known(&r.unit_name),
        |acc: &mut MeanAcc, r| acc.observe(r.score),
    )
    .into_iter()
    .filter(|(_, acc)| acc.scored() > 0)
    .map(|(unit, acc)| {
        let mean_score = acc.mean();
        let delta = prior_means.get(&unit).map(|prev| mean_score - prev);
        LeaderboardRow {
            rank: 0,
            unit,
            mean_score,
            report_count: acc.scored(),
            delta,
        }
    })
    .collect();

    rows.sort_by(|a, b| {
        b.mean_score
            .partial_cmp(&a.mean_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (position, row) in rows.iter_mut().enumerate() {
        row.rank = position + 1;
    }
    rows
}

/// Pivot (indicator, unit) mean scores into one row per indicator. The unit
/// column set is the union observed across the whole input so rows stay
/// comparable; an absent cell means no scored record for that pair. The
/// overall mean is taken over every scored record of the indicator,
/// whichever unit submitted it, so it is record-weighted rather than a mean
/// of the per-unit means.
pub fn build_comparison(records: &[ReportRecord]) -> ComparisonTable {
    let pairs = group_in_order(
        records,
        |r: &ReportRecord| Some((known(&r.indicator_type)?, known(&r.unit_name)?)),
        |acc: &mut MeanAcc, r| acc.observe(r.score),
    );
    let overall = group_in_order(
        records,
        |r: &ReportRecord| known(&r.indicator_type),
        |acc: &mut MeanAcc, r| acc.observe(r.score),
    );
    let overall_means: HashMap<String, f64> = overall
        .into_iter()
        .map(|(indicator, acc)| (indicator, acc.mean()))
        .collect();

    let mut units: Vec<String> = Vec::new();
    let mut indicators: Vec<String> = Vec::new();
    for ((indicator, unit), _) in &pairs {
        if !units.contains(unit) {
            units.push(unit.clone());
        }
        if !indicators.contains(indicator) {
            indicators.push(indicator.clone());
        }
    }

    let rows = indicators
        .into_iter()
        .filter_map(|indicator| {
            let per_unit: std::collections::BTreeMap<String, f64> = pairs
                .iter()
                .filter(|((ind, _), acc)| *ind == indicator && acc.scored() > 0)
                .map(|((_, unit), acc)| (unit.clone(), acc.mean()))
                .collect();
            if per_unit.is_empty() {
                return None;
            }
            let overall_mean = overall_means.get(&indicator).copied().unwrap_or(0.0);
            Some(ComparisonRow {
                indicator,
                per_unit,
                overall_mean,
            })
        })
        .collect();

    ComparisonTable { units, rows }
}

#[derive(Debug, Clone, Copy, Default)]
struct TrendAcc {
    total: usize,
    approved: usize,
    rejected: usize,
}

/// Monthly activity counts in first-seen month order. Statuses outside the
/// approved/rejected families count toward the total only.
pub fn build_trend(records: &[ReportRecord]) -> Vec<TrendPoint> {
    group_in_order(
        records,
        |r: &ReportRecord| Some(MONTH_LABELS[r.created_at.month0() as usize]),
        |acc: &mut TrendAcc, r| {
            acc.total += 1;
            if r.status.is_approved() {
                acc.approved += 1;
            }
            if r.status.is_rejected() {
                acc.rejected += 1;
            }
        },
    )
    .into_iter()
    .map(|(label, acc)| TrendPoint {
        month_label: label.to_string(),
        total: acc.total,
        approved: acc.approved,
        rejected: acc.rejected,
    })
    .collect()
}

/// Record count per indicator, unknown sentinel included, so the slice
/// counts always sum to the input length.
pub fn build_composition(records: &[ReportRecord]) -> Vec<CompositionSlice> {
    group_in_order(
        records,
        |r: &ReportRecord| Some(r.indicator_type.clone()),
        |count: &mut usize, _| *count += 1,
    )
    .into_iter()
    .map(|(indicator, count)| CompositionSlice { indicator, count })
    .collect()
}

/// Compute all four views from scratch. There is no incremental state: a new
/// snapshot fully replaces the previous one.
pub fn build_snapshot(current: &[ReportRecord], prior: &[ReportRecord]) -> Snapshot {
    Snapshot {
        leaderboard: build_leaderboard(current, prior),
        comparison: build_comparison(current),
        trend: build_trend(current),
        composition: build_composition(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn raw(
        unit: Option<&str>,
        indicator: Option<&str>,
        status: &str,
        score: Option<f64>,
    ) -> RawReport {
        RawReport {
            id: Uuid::new_v4(),
            unit_name: unit.map(str::to_string),
            indicator_type: indicator.map(str::to_string),
            status: status.to_string(),
            score,
            created_at: Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(),
            approved_at: None,
        }
    }

    fn record(
        unit: Option<&str>,
        indicator: Option<&str>,
        status: &str,
        score: Option<f64>,
    ) -> ReportRecord {
        normalize(raw(unit, indicator, status, score))
    }

    fn record_in(year: i32, month: u32, status: &str) -> ReportRecord {
        let mut rec = record(Some("north"), Some("press"), status, Some(50.0));
        rec.created_at = Utc.with_ymd_and_hms(year, month, 5, 12, 0, 0).unwrap();
        rec
    }

    #[test]
    fn normalize_fills_sentinels_and_keeps_score_absent() {
        let rec = record(None, Some("  "), "nonsense", None);
        assert_eq!(rec.unit_name, UNKNOWN);
        assert_eq!(rec.indicator_type, UNKNOWN);
        assert_eq!(rec.status, ReportStatus::Queued);
        assert_eq!(rec.score, None);
    }

    #[test]
    fn mean_acc_reads_zero_with_no_scores() {
        let mut acc = MeanAcc::default();
        acc.observe(None);
        acc.observe(None);
        assert_eq!(acc.mean(), 0.0);
        assert_eq!(acc.scored(), 0);
    }

    #[test]
    fn grouping_preserves_first_seen_order() {
        let values = vec!["b", "a", "b", "c", "a"];
        let groups = group_in_order(
            &values,
            |v: &&str| Some(v.to_string()),
            |count: &mut usize, _| *count += 1,
        );
        let keys: Vec<&str> = groups.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(groups[0].1, 2);
    }

    #[test]
    fn leaderboard_ranks_units_and_skips_unscored() {
        let records = vec![
            record(Some("unitA"), Some("X"), "approved", Some(80.0)),
            record(Some("unitA"), Some("X"), "approved", Some(90.0)),
            record(Some("unitB"), Some("Y"), "pending_approval", None),
        ];
        let rows = build_leaderboard(&records, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rank, 1);
        assert_eq!(rows[0].unit, "unitA");
        assert!((rows[0].mean_score - 85.0).abs() < 1e-9);
        assert_eq!(rows[0].report_count, 2);
        assert_eq!(rows[0].delta, None);
    }

    #[test]
    fn leaderboard_ranks_are_contiguous_and_ties_stay_stable() {
        let records = vec![
            record(Some("east"), Some("X"), "approved", Some(70.0)),
            record(Some("west"), Some("X"), "approved", Some(70.0)),
            record(Some("south"), Some("X"), "approved", Some(90.0)),
        ];
        let rows = build_leaderboard(&records, &[]);
        let ranks: Vec<usize> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(rows[0].unit, "south");
        // east was seen before west; the tie keeps that order
        assert_eq!(rows[1].unit, "east");
        assert_eq!(rows[2].unit, "west");
    }

    #[test]
    fn leaderboard_excludes_unknown_units() {
        let records = vec![
            record(None, Some("X"), "approved", Some(40.0)),
            record(Some("north"), Some("X"), "approved", Some(60.0)),
        ];
        let rows = build_leaderboard(&records, &[]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].unit, "north");
    }

    #[test]
    fn leaderboard_delta_compares_against_prior_window() {
        let current = vec![record(Some("north"), Some("X"), "approved", Some(80.0))];
        let prior = vec![
            record(Some("north"), Some("X"), "approved", Some(60.0)),
            record(Some("south"), Some("X"), "approved", Some(50.0)),
        ];
        let rows = build_leaderboard(&current, &prior);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delta, Some(20.0));

        let no_prior = build_leaderboard(&current, &[]);
        assert_eq!(no_prior[0].delta, None);
    }

    #[test]
    fn overall_mean_is_record_weighted() {
        let records = vec![
            record(Some("unitA"), Some("X"), "approved", Some(100.0)),
            record(Some("unitB"), Some("X"), "approved", Some(0.0)),
            record(Some("unitB"), Some("X"), "approved", Some(0.0)),
            record(Some("unitB"), Some("X"), "approved", Some(0.0)),
        ];
        let table = build_comparison(&records);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        // 1 record at 100 and 3 at 0 average to 25, not the 50 an
        // average-of-averages would give
        assert!((row.overall_mean - 25.0).abs() < 1e-9);
        assert_eq!(row.per_unit["unitA"], 100.0);
        assert_eq!(row.per_unit["unitB"], 0.0);
    }

    #[test]
    fn comparison_columns_are_the_union_of_units() {
        let records = vec![
            record(Some("north"), Some("X"), "approved", Some(10.0)),
            record(Some("south"), Some("Y"), "approved", Some(20.0)),
        ];
        let table = build_comparison(&records);
        assert_eq!(table.units, vec!["north", "south"]);
        // south never scored on X: absent cell, not a zero
        let row_x = &table.rows[0];
        assert_eq!(row_x.indicator, "X");
        assert!(!row_x.per_unit.contains_key("south"));
    }

    #[test]
    fn comparison_drops_indicators_without_scored_pairs() {
        let records = vec![
            record(Some("north"), Some("X"), "pending_approval", None),
            record(Some("north"), Some("Y"), "approved", Some(30.0)),
            record(None, Some("Z"), "approved", Some(90.0)),
        ];
        let table = build_comparison(&records);
        let indicators: Vec<&str> = table.rows.iter().map(|r| r.indicator.as_str()).collect();
        assert_eq!(indicators, vec!["Y"]);
    }

    #[test]
    fn trend_counts_statuses_into_families() {
        let records = vec![
            record_in(2026, 1, "approved"),
            record_in(2026, 1, "completed"),
            record_in(2026, 1, "rejected"),
            record_in(2026, 1, "system_rejected"),
            record_in(2026, 1, "processing"),
            record_in(2026, 2, "queued"),
        ];
        let points = build_trend(&records);
        assert_eq!(points.len(), 2);
        assert_eq!(
            points[0],
            TrendPoint {
                month_label: "Jan".to_string(),
                total: 5,
                approved: 2,
                rejected: 2,
            }
        );
        assert_eq!(points[1].total, 1);
        assert_eq!(points[1].approved + points[1].rejected, 0);

        let total: usize = points.iter().map(|p| p.total).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn trend_buckets_follow_first_seen_order() {
        let records = vec![
            record_in(2026, 3, "queued"),
            record_in(2026, 1, "queued"),
            record_in(2026, 3, "queued"),
            record_in(2026, 2, "queued"),
        ];
        let labels: Vec<String> = build_trend(&records)
            .into_iter()
            .map(|p| p.month_label)
            .collect();
        assert_eq!(labels, vec!["Mar", "Jan", "Feb"]);
    }

    #[test]
    fn trend_merges_same_month_across_years() {
        // Documented behavior: the bucket key is the month name alone, so
        // Jan 2025 and Jan 2026 share one bucket.
        let records = vec![record_in(2025, 1, "queued"), record_in(2026, 1, "queued")];
        let points = build_trend(&records);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].total, 2);
    }

    #[test]
    fn composition_counts_every_record_including_unknown() {
        let records = vec![
            record(Some("unitA"), Some("X"), "approved", Some(80.0)),
            record(Some("unitA"), Some("X"), "approved", Some(90.0)),
            record(Some("unitB"), Some("Y"), "pending_approval", None),
            record(Some("unitB"), None, "queued", None),
        ];
        let slices = build_composition(&records);
        assert_eq!(slices.len(), 3);
        assert_eq!(
            slices[0],
            CompositionSlice {
                indicator: "X".to_string(),
                count: 2,
            }
        );
        assert_eq!(slices[1].indicator, "Y");
        assert_eq!(slices[2].indicator, UNKNOWN);

        let total: usize = slices.iter().map(|s| s.count).sum();
        assert_eq!(total, records.len());
    }

    #[test]
    fn empty_input_yields_empty_views() {
        let snapshot = build_snapshot(&[], &[]);
        assert!(snapshot.leaderboard.is_empty());
        assert!(snapshot.comparison.units.is_empty());
        assert!(snapshot.comparison.rows.is_empty());
        assert!(snapshot.trend.is_empty());
        assert!(snapshot.composition.is_empty());
    }

    #[test]
    fn builders_are_idempotent() {
        let records = vec![
            record(Some("north"), Some("X"), "approved", Some(42.0)),
            record(Some("south"), Some("Y"), "rejected", Some(17.0)),
            record(None, None, "queued", None),
        ];
        let first = build_snapshot(&records, &records);
        let second = build_snapshot(&records, &records);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn cutoff_date_respects_since_days() {
        let cutoff = cutoff_date(14);
        let expected = Utc::now() - Duration::days(14);
        assert!((expected - cutoff).num_seconds().abs() < 5);
    }
}
