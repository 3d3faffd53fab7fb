//! Per-dataset setup shared by every slice: the correction plan, possibly
//! from a cache, and the corrector built on top of it.

use std::path::Path;

use ndarray::ArrayView2;
use rand::{rngs::StdRng, SeedableRng};

use crate::config::preprocess::Dynamic;
use crate::dff::{dynamic_flat_fielding, AirWindows};
use crate::eff::{prepare, EigenFlatFields};
use crate::error::Result;
use crate::extract::{extract_flat_dark, leading_flats, Acquisition};
use crate::flat_fielding::flat_fielding;
use crate::optimize::NelderMead;
use crate::plan::{CorrectionPlan, PlanCache};
use crate::status::StatusLog;
use crate::types::{Image, Index1};
use crate::volume::AxisOrder;

/// Cache key of the plan extracted from `input` with the given settings.
/// Plans extracted with different settings never share an entry.
pub fn plan_key(input: &Path, flat_end: bool, order: AxisOrder) -> String {
    let flats = if flat_end { "flat-end" } else { "flat-start" };
    let order = match order {
        AxisOrder::ProjectionMajor => "projection-major",
        AxisOrder::SinogramMajor   => "sinogram-major",
    };
    format!("{}@{flats}@{order}", input.display())
}

/// The plan stored under `key`, or a freshly extracted one. Fresh plans are
/// stored only when they have flats.
pub fn resolve_plan<A: Acquisition>(
    source  : &A,
    key     : &str,
    cache   : Option<&mut dyn PlanCache>,
    flat_end: bool,
    status  : &mut dyn StatusLog,
) -> Result<CorrectionPlan> {
    let Some(cache) = cache else { return extract_flat_dark(source, flat_end, status) };
    if let Some(plan) = cache.load(key)? {
        log::info!("Correction plan `{key}` read from cache");
        return Ok(plan)
    }
    let plan = extract_flat_dark(source, flat_end, status)?;
    if plan.flat_before.is_some() || plan.flat_after.is_some() {
        cache.store(key, &plan)?;
    }
    Ok(plan)
}

pub enum Corrector {
    Conventional,
    Dynamic { eff: EigenFlatFields, dark: Image, downsample: usize },
}

impl Corrector {
    pub fn correct(&self, sino: ArrayView2<f32>, idx: Index1, plan: &CorrectionPlan, air: AirWindows) -> Result<Image> {
        match self {
            Corrector::Conventional => flat_fielding(sino, idx, plan, air),
            Corrector::Dynamic { eff, dark, downsample } =>
                dynamic_flat_fielding(sino, idx, eff, dark.view(), *downsample, air, &NelderMead::default()),
        }
    }
}

/// Dynamic corrector when `dynamic` is configured and the plan accepts the
/// leading reference pair; conventional otherwise.
///
/// The eigen flat fields come from the individual leading flats, dark
/// corrected by the plan's leading dark (zeros when it has none).
pub fn build_corrector<A: Acquisition>(source: &A, plan: &CorrectionPlan, dynamic: Option<Dynamic>) -> Result<Corrector> {
    let Some(dynamic) = dynamic else { return Ok(Corrector::Conventional) };
    let Some((_, dark)) = plan.leading_pair() else {
        log::warn!("No usable flats acquired before the projections: dynamic flat fielding disabled");
        return Ok(Corrector::Conventional)
    };
    let Some(flats) = leading_flats(source)? else {
        log::warn!("No flats acquired before the projections: dynamic flat fielding disabled");
        return Ok(Corrector::Conventional)
    };
    let dark = dark.cloned()
        .unwrap_or_else(|| Image::zeros((flats.n_sinograms(), flats.detector_width())));
    let mut rng = StdRng::seed_from_u64(dynamic.seed);
    let eff = prepare(&flats, dark.view(), dynamic.repetitions, &mut rng)?;
    log::info!("{} eigen flat fields retained from {} flats", eff.n_components(), flats.n_projections());
    Ok(Corrector::Dynamic { eff, dark, downsample: dynamic.downsample })
}

#[cfg(test)]
mod test_pipeline {
    use super::*;
    use crate::extract::MemoryAcquisition;
    use crate::plan::MemoryPlanCache;
    use crate::status::LogOnly;
    use float_eq::assert_float_eq;
    use ndarray::Array2;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    fn filled(value: f32) -> Image { Array2::from_elem((3, 4), value) }

    fn scan() -> Vec<Image> { vec![filled(55.0); 6] }

    fn all_close(image: &Image, value: f32) {
        for &v in image { assert_float_eq!(v, value, rmax <= 1e-5); }
    }

    // ----- Corrector -----------------------------------------------------------------------
    #[test]
    fn leading_pair_gives_dynamic_corrector() -> Result<()> {
        let source = MemoryAcquisition::new(AxisOrder::SinogramMajor)
            .with_images("tomo", &scan())?
            .with_images("flat", &vec![filled(100.0); 5])?
            .with_images("dark", &[filled(10.0)])?;
        let plan = extract_flat_dark(&source, false, &mut LogOnly)?;
        let corrector = build_corrector(&source, &plan, Some(Dynamic::default()))?;
        let Corrector::Dynamic { dark, .. } = &corrector else { panic!("expected a dynamic corrector") };
        assert_eq!(dark, &filled(10.0));
        let sino = source.volume("tomo")?.read_sinogram(1)?;
        all_close(&corrector.correct(sino.view(), 1, &plan, AirWindows::none())?, 0.5);
        Ok(())
    }

    #[test]
    fn only_trailing_pair_stays_conventional() -> Result<()> {
        // Empty leading dark with flat_end: only the trailing pair is usable
        let source = MemoryAcquisition::new(AxisOrder::SinogramMajor)
            .with_images("tomo", &scan())?
            .with_images("dark", &[])?
            .with_images("flat", &vec![filled(300.0); 3])?
            .with_images("flat_after", &[filled(100.0)])?
            .with_images("dark_after", &[filled(10.0)])?;
        let plan = extract_flat_dark(&source, true, &mut LogOnly)?;
        assert!(plan.leading_pair().is_none());
        let corrector = build_corrector(&source, &plan, Some(Dynamic::default()))?;
        assert!(matches!(corrector, Corrector::Conventional));
        // The trailing dark is subtracted
        let sino = source.volume("tomo")?.read_sinogram(0)?;
        all_close(&corrector.correct(sino.view(), 0, &plan, AirWindows::none())?, 0.5);
        Ok(())
    }

    #[test]
    fn no_dynamic_configuration() -> Result<()> {
        let source = MemoryAcquisition::new(AxisOrder::SinogramMajor)
            .with_images("tomo", &scan())?
            .with_images("flat", &[filled(100.0)])?;
        let plan = extract_flat_dark(&source, false, &mut LogOnly)?;
        assert!(matches!(build_corrector(&source, &plan, None)?, Corrector::Conventional));
        assert!(matches!(build_corrector(&source, &CorrectionPlan::skipped(), Some(Dynamic::default()))?,
                         Corrector::Conventional));
        Ok(())
    }

    // ----- Plan resolution -----------------------------------------------------------------
    fn both_pairs() -> Result<MemoryAcquisition> {
        MemoryAcquisition::new(AxisOrder::SinogramMajor)
            .with_images("tomo", &scan())?
            .with_images("flat", &[filled(100.0)])?
            .with_images("dark", &[filled(10.0)])?
            .with_images("flat_after", &[filled(90.0)])?
            .with_images("dark_after", &[filled(12.0)])
    }

    #[test]
    fn keys_separate_settings_and_inputs() {
        let a = Path::new("/beamtime/a/scan.h5");
        let b = Path::new("/beamtime/b/scan.h5");
        let order = AxisOrder::SinogramMajor;
        assert_ne!(plan_key(a, false, order), plan_key(a, true, order));
        assert_ne!(plan_key(a, true, order), plan_key(a, true, AxisOrder::ProjectionMajor));
        assert_ne!(plan_key(a, true, order), plan_key(b, true, order));
    }

    #[test]
    fn leading_only_plan_not_reused_for_flat_end() -> Result<()> {
        let source = both_pairs()?;
        let input = Path::new("/beamtime/scan.h5");
        let mut cache = MemoryPlanCache::default();

        let start = plan_key(input, false, AxisOrder::SinogramMajor);
        let plan = resolve_plan(&source, &start, Some(&mut cache), false, &mut LogOnly)?;
        assert!(plan.trailing_pair().is_none());
        assert_eq!(cache.load(&start)?, Some(plan));

        let end = plan_key(input, true, AxisOrder::SinogramMajor);
        let plan = resolve_plan(&source, &end, Some(&mut cache), true, &mut LogOnly)?;
        assert_eq!(plan.trailing_pair(), Some((&filled(90.0), Some(&filled(12.0)))));
        Ok(())
    }

    #[test]
    fn cached_plan_wins() -> Result<()> {
        let source = both_pairs()?;
        let mut cache = MemoryPlanCache::default();
        let stored = CorrectionPlan { flat_before: Some(filled(7.0)), ..CorrectionPlan::default() };
        cache.store("scan", &stored)?;
        assert_eq!(resolve_plan(&source, "scan", Some(&mut cache), false, &mut LogOnly)?, stored);
        Ok(())
    }

    #[test]
    fn plans_without_flats_are_not_stored() -> Result<()> {
        let source = MemoryAcquisition::new(AxisOrder::SinogramMajor)
            .with_images("tomo", &scan())?
            .with_images("dark", &[filled(10.0)])?;
        let mut cache = MemoryPlanCache::default();
        let plan = resolve_plan(&source, "scan", Some(&mut cache), false, &mut LogOnly)?;
        assert!(plan.skip_flat);
        assert_eq!(cache.load("scan")?, None);
        Ok(())
    }
}
