//! What to do when reference images are present, empty or missing
//!
//! Every lookup of one kind of reference (dark or flat) on one side of the
//! scan ends in exactly one row of `decide`, which says how the plan's flags
//! change and what to tell the operator.

use super::provenance::{Reference, Side};

/// Result of looking for one kind of reference on one side of the scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Found {
    /// At least one image was found and averaged
    Images,
    /// The group exists but none of its images belong to this side
    Empty,
    /// No group that could hold these images exists
    NoGroup,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Use,
    /// Darks were never acquired: subtract nothing
    ToleratedAbsent,
    /// No flat fielding at all
    SkipFlat,
    /// Leading pair unusable: fall through to the trailing pair
    OnlyAfter,
    /// Trailing pair unusable: correct with the leading pair only
    SkipAfter,
    /// Trailing dark unusable: substitute one
    MissingAfter,
}

/// Flags already settled when a lookup is decided
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub flat_end: bool,
    pub only_after: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub message: &'static str,
}

pub fn decide(kind: Reference, side: Side, found: Found, ctx: Context) -> Decision {
    use {Reference::*, Side::*, Found::*, Outcome::*};
    let (outcome, message) = match (kind, side, found, ctx.flat_end, ctx.only_after) {
        (Dark, Leading , Images , _    , _    ) => (Use,
            "Dark field images (acquired before the projections) found."),
        (Dark, Leading , NoGroup, _    , _    ) => (ToleratedAbsent,
            "No dark field group. Dark subtraction disabled."),
        (Dark, Leading , Empty  , false, _    ) => (SkipFlat,
            "No dark field images (acquired before the projections) found. 'Use after' flag not specified. Flat fielding skipped."),
        (Dark, Leading , Empty  , true , _    ) => (OnlyAfter,
            "No dark field images (acquired before the projections) found."),

        (Flat, Leading , Images , _    , _    ) => (Use,
            "Flat field images (acquired before the projections) found."),
        (Flat, Leading , _      , false, _    ) => (SkipFlat,
            "No flat field images (acquired before the projections) found. 'Use after' flag not specified. Flat fielding skipped."),
        (Flat, Leading , _      , true , _    ) => (OnlyAfter,
            "No flat field images (acquired before the projections) found."),

        (Dark, Trailing, Images , _    , _    ) => (Use,
            "Dark field images (acquired after the projections) found."),
        (Dark, Trailing, _      , _    , _    ) => (MissingAfter,
            "No dark field images (acquired after the projections) found."),

        (Flat, Trailing, Images , _    , _    ) => (Use,
            "Flat field images (acquired after the projections) found."),
        (Flat, Trailing, _      , _    , true ) => (SkipFlat,
            "No flat field images (acquired after the projections) found. Flat fielding skipped."),
        (Flat, Trailing, _      , _    , false) => (SkipAfter,
            "No flat field images (acquired after the projections) found."),
    };
    Decision { outcome, message }
}

/// Which dark goes with the trailing flat
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrailingDark { Own, Leading, Zeros }

pub fn trailing_dark(own_found: bool, leading_available: bool) -> (TrailingDark, Option<&'static str>) {
    match (own_found, leading_available) {
        (true , _    ) => (TrailingDark::Own    , None),
        (false, true ) => (TrailingDark::Leading, Some(
            "Dark field images acquired before the projections used in their place.")),
        (false, false) => (TrailingDark::Zeros  , Some(
            "No dark field images at all. Images acquired after the projections corrected without dark subtraction.")),
    }
}

#[cfg(test)]
mod test_policy {
    use super::*;
    use rstest::rstest;
    use Outcome::*;
    use Reference::*;
    use Side::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[rstest(/**/ kind, side    , found         , flat_end, only_after, expected,
             case(Dark, Leading , Found::Images , false   , false     , Use),
             case(Dark, Leading , Found::Empty  , false   , false     , SkipFlat),
             case(Dark, Leading , Found::Empty  , true    , false     , OnlyAfter),
             case(Dark, Leading , Found::NoGroup, false   , false     , ToleratedAbsent),
             case(Flat, Leading , Found::NoGroup, false   , false     , SkipFlat),
             case(Flat, Leading , Found::Empty  , true    , false     , OnlyAfter),
             case(Dark, Trailing, Found::NoGroup, true    , false     , MissingAfter),
             case(Flat, Trailing, Found::Empty  , true    , false     , SkipAfter),
             case(Flat, Trailing, Found::NoGroup, true    , true      , SkipFlat),
             case(Flat, Trailing, Found::Images , true    , true      , Use),
    )]
    fn table_rows(kind: Reference, side: Side, found: Found, flat_end: bool, only_after: bool, expected: Outcome) {
        let decision = decide(kind, side, found, Context { flat_end, only_after });
        assert_eq!(decision.outcome, expected);
    }

    #[test]
    fn skipping_is_always_announced() {
        for kind in [Dark, Flat] {
            for side in [Leading, Trailing] {
                for found in [Found::Images, Found::Empty, Found::NoGroup] {
                    for flat_end in [false, true] {
                        for only_after in [false, true] {
                            let d = decide(kind, side, found, Context { flat_end, only_after });
                            assert!(!d.message.is_empty());
                            if d.outcome == SkipFlat {
                                assert!(d.message.ends_with("Flat fielding skipped."), "{}", d.message);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn trailing_dark_substitution() {
        assert_eq!(trailing_dark(true , true ).0, TrailingDark::Own);
        assert_eq!(trailing_dark(false, true ).0, TrailingDark::Leading);
        assert_eq!(trailing_dark(false, false).0, TrailingDark::Zeros);
        assert!(trailing_dark(true, false).1.is_none());
    }
}
