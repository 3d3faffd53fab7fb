//! Attributing pooled reference images to before or after the scan
//!
//! Some acquisitions store every flat (or every dark) in one pooled group,
//! alongside a provenance table listing, for every image written by the
//! detector, its file name and timestamp. Which reference images were taken
//! before the scan and which after can only be recovered from that table.

use std::path::Path;

use time::{macros::format_description, PrimitiveDateTime};

use crate::error::{AccessError, Result};
use crate::types::Index1;

/// Kind of reference image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reference { Dark, Flat }

/// Position of a group of reference images relative to the scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side { Leading, Trailing }

/// One row of the detector's provenance table
#[derive(Clone, Debug, PartialEq)]
pub struct ProvenanceEntry {
    pub filename: String,
    /// Seconds since the epoch
    pub timestamp: i64,
}

/// The provenance table of an acquisition, with the tags its writer used
#[derive(Clone, Debug, PartialEq)]
pub struct ProvenanceTable {
    pub entries: Vec<ProvenanceEntry>,
    pub tomo_prefix: String,
    pub flat_prefix: String,
    pub dark_prefix: String,
    /// Acquisition index carried by the first image of each group
    pub first_index: i64,
}

/// Where an entry falls relative to the scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bucket { Before, After, Excluded }

impl From<Side> for Bucket {
    fn from(side: Side) -> Self {
        match side {
            Side::Leading  => Bucket::Before,
            Side::Trailing => Bucket::After,
        }
    }
}

/// How a facility marks what each provenance entry is
pub trait Tagging {
    fn is_scan(&self, entry: &ProvenanceEntry) -> bool;
    fn is_reference(&self, entry: &ProvenanceEntry, kind: Reference) -> bool;
    /// Position of the entry's image inside its pooled reference group
    fn image_index(&self, entry: &ProvenanceEntry) -> Result<Index1>;
}

/// How entries are bucketed before/after the scan
pub trait Classify {
    fn classify(&self, entry: &ProvenanceEntry) -> Bucket;
}

/// File-name prefix tags, with the acquisition index in the last four
/// characters of the file stem (`flat_0012.tif`)
#[derive(Clone, Debug, PartialEq)]
pub struct PrefixTagging {
    pub tomo: String,
    pub flat: String,
    pub dark: String,
    pub first_index: i64,
}

impl PrefixTagging {
    pub fn from_table(table: &ProvenanceTable) -> Self {
        Self {
            tomo: table.tomo_prefix.clone(),
            flat: table.flat_prefix.clone(),
            dark: table.dark_prefix.clone(),
            first_index: table.first_index,
        }
    }

    /// The fixed `tomo`/`flat`/`dark` tags
    pub fn standard(first_index: i64) -> Self {
        Self { tomo: "tomo".into(), flat: "flat".into(), dark: "dark".into(), first_index }
    }
}

impl Tagging for PrefixTagging {
    fn is_scan(&self, entry: &ProvenanceEntry) -> bool { entry.filename.starts_with(&self.tomo) }

    fn is_reference(&self, entry: &ProvenanceEntry, kind: Reference) -> bool {
        let prefix = match kind {
            Reference::Dark => &self.dark,
            Reference::Flat => &self.flat,
        };
        entry.filename.starts_with(prefix.as_str())
    }

    fn image_index(&self, entry: &ProvenanceEntry) -> Result<Index1> {
        let bad = |why: &str| AccessError::BadProvenance(format!("`{}`: {why}", entry.filename));
        let stem = Path::new(&entry.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| bad("no file stem"))?;
        let digits = stem.char_indices().rev().nth(3)
            .map(|(i, _)| &stem[i..])
            .ok_or_else(|| bad("stem shorter than four characters"))?;
        let n: i64 = digits.parse().map_err(|_| bad("stem does not end in four digits"))?;
        usize::try_from(n - self.first_index).map_err(|_| bad("index precedes first_index"))
    }
}

/// Time span of the scan: `[t_min, t_max]` over the scan's own entries.
///
/// References at or before `t_min` were acquired before the scan, those
/// strictly after `t_max` after it. Anything in between cannot be attributed
/// and is excluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimestampWindow {
    pub t_min: i64,
    pub t_max: i64,
}

impl TimestampWindow {
    /// With no scan entries at all, every reference counts as before the scan.
    pub fn of_scan(entries: &[ProvenanceEntry], tagging: &dyn Tagging) -> Self {
        entries.iter()
            .filter(|e| tagging.is_scan(e))
            .fold(Self { t_min: i64::MAX, t_max: i64::MIN }, |w, e| Self {
                t_min: w.t_min.min(e.timestamp),
                t_max: w.t_max.max(e.timestamp),
            })
    }
}

impl Classify for TimestampWindow {
    fn classify(&self, entry: &ProvenanceEntry) -> Bucket {
        let t = entry.timestamp;
        if      t <= self.t_min { Bucket::Before }
        else if t >  self.t_max { Bucket::After }
        else                    { Bucket::Excluded }
    }
}

/// Indices, in acquisition order, of the `kind` images landing in `bucket`
pub fn select(
    entries: &[ProvenanceEntry],
    tagging: &dyn Tagging,
    classifier: &dyn Classify,
    kind: Reference,
    bucket: Bucket,
) -> Result<Vec<Index1>> {
    entries.iter()
        .filter(|e| tagging.is_reference(e, kind))
        .filter(|e| classifier.classify(e) == bucket)
        .map(|e| tagging.image_index(e))
        .collect()
}

/// Parse a `"%Y-%m-%d %H:%M:%S.%f"` provenance timestamp into whole seconds
pub fn parse_timestamp(text: &str) -> Result<i64> {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]");
    PrimitiveDateTime::parse(text.trim(), &format)
        .map(|t| t.assume_utc().unix_timestamp())
        .map_err(|e| AccessError::BadProvenance(format!("timestamp `{text}`: {e}")))
}

#[cfg(test)]
mod test_provenance {
    use super::*;
    use rstest::rstest;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn entry(filename: &str, timestamp: i64) -> ProvenanceEntry {
        ProvenanceEntry { filename: filename.into(), timestamp }
    }

    fn scan_100_to_500() -> Vec<ProvenanceEntry> {
        vec![
            entry("flat_0000.tif",  50),
            entry("dark_0000.tif",  60),
            entry("tomo_0000.tif", 100),
            entry("tomo_0001.tif", 300),
            entry("flat_0001.tif", 300),
            entry("tomo_0002.tif", 500),
            entry("flat_0002.tif", 600),
            entry("dark_0001.tif", 700),
        ]
    }

    #[test]
    fn window_spans_scan_entries_only() {
        let tagging = PrefixTagging::standard(0);
        let window = TimestampWindow::of_scan(&scan_100_to_500(), &tagging);
        assert_eq!(window, TimestampWindow { t_min: 100, t_max: 500 });
    }

    #[rstest(/**/ t  , expected,
             case( 50, Bucket::Before),
             case(100, Bucket::Before),   // at t_min still counts as before
             case(101, Bucket::Excluded),
             case(300, Bucket::Excluded),
             case(500, Bucket::Excluded), // at t_max is not after
             case(501, Bucket::After),
             case(600, Bucket::After),
    )]
    fn bucketing(t: i64, expected: Bucket) {
        let window = TimestampWindow { t_min: 100, t_max: 500 };
        assert_eq!(window.classify(&entry("flat_0000.tif", t)), expected);
    }

    #[test]
    fn empty_scan_puts_everything_before() {
        let window = TimestampWindow::of_scan(&[entry("flat_0000.tif", 5)], &PrefixTagging::standard(0));
        assert_eq!(window.classify(&entry("flat_0000.tif", 5)), Bucket::Before);
        assert_eq!(window.classify(&entry("flat_0001.tif", i64::MAX)), Bucket::Before);
    }

    #[test]
    fn selection_by_kind_and_bucket() -> Result<()> {
        let entries = scan_100_to_500();
        let tagging = PrefixTagging::standard(0);
        let window = TimestampWindow::of_scan(&entries, &tagging);
        let pick = |kind, bucket| select(&entries, &tagging, &window, kind, bucket);
        assert_eq!(pick(Reference::Flat, Bucket::Before  )?, vec![0]);
        assert_eq!(pick(Reference::Flat, Bucket::After   )?, vec![2]);
        assert_eq!(pick(Reference::Flat, Bucket::Excluded)?, vec![1]);
        assert_eq!(pick(Reference::Dark, Bucket::Before  )?, vec![0]);
        assert_eq!(pick(Reference::Dark, Bucket::After   )?, vec![1]);
        Ok(())
    }

    #[rstest(/**/ filename          , first, expected,
             case("flat_0000.tif"   ,     0, Some(0)),
             case("flat_0012.tif"   ,     0, Some(12)),
             case("flat_0012.tif"   ,    10, Some(2)),
             case("dir/dark_1234"   ,  1000, Some(234)),
             case("flat_0003.tif"   ,     5, None),
             case("flat_abcd.tif"   ,     0, None),
             case("f1.tif"          ,     0, None),
    )]
    fn image_index_from_stem(filename: &str, first: i64, expected: Option<usize>) {
        let tagging = PrefixTagging::standard(first);
        assert_eq!(tagging.image_index(&entry(filename, 0)).ok(), expected);
    }

    #[test]
    fn timestamps_truncate_to_seconds() -> Result<()> {
        let a = parse_timestamp("2016-11-02 10:15:30.000001")?;
        let b = parse_timestamp("2016-11-02 10:15:30.999999")?;
        let c = parse_timestamp("2016-11-02 10:15:31.0")?;
        assert_eq!(a, b);
        assert_eq!(c - a, 1);
        assert!(parse_timestamp("yesterday").is_err());
        Ok(())
    }
}
