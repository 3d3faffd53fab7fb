//! Derive a `CorrectionPlan` from the reference images of an acquisition
//!
//! Three storage layouts are recognized, by the groups present:
//!
//! + `tomo`, with explicit `flat`, `dark`, `flat_post`|`flat_after`,
//!   `dark_post`|`dark_after` groups;
//!
//! + `exchange/data`, with the same explicit groups;
//!
//! + `exchange/data`, with all flats pooled in `exchange/data_white` and all
//!   darks in `exchange/data_dark`, attributed to before/after the scan via
//!   the provenance table.
//!
//! Explicit groups take precedence over pooled ones.

use crate::error::{AccessError, Result};
use crate::plan::CorrectionPlan;
use crate::status::StatusLog;
use crate::types::{Image, Index1};
use crate::volume::{AxisOrder, Storage, Volume};

use ndarray::Array3;

pub mod provenance;
pub mod policy;
pub mod hdf5;

pub use self::hdf5::Hdf5Acquisition;

use provenance::{select, PrefixTagging, ProvenanceTable, Reference, Side, TimestampWindow};
use policy::{decide, trailing_dark, Context, Decision, Found, Outcome, TrailingDark};

pub const PROVENANCE: &str = "provenance/detector_output";

/// The groups of one acquisition, however they are stored
pub trait Acquisition {
    type Storage: Storage;

    fn contains(&self, path: &str) -> bool;
    fn volume(&self, path: &str) -> Result<Volume<Self::Storage>>;
    /// `None` when the acquisition has no provenance table
    fn provenance(&self) -> Result<Option<ProvenanceTable>>;
}

// ----- Averaging ----------------------------------------------------------------------------------

/// Mean of all projections of `volume`; `None` when it has none.
pub fn average<S: Storage>(volume: &Volume<S>) -> Result<Option<Image>> {
    average_of(volume, 0..volume.n_projections())
}

/// Mean of the chosen projections, accumulated in the order given. A single
/// projection is returned unchanged.
pub fn average_of<S: Storage>(volume: &Volume<S>, indices: impl IntoIterator<Item = Index1>) -> Result<Option<Image>> {
    let mut indices = indices.into_iter();
    let Some(first) = indices.next() else { return Ok(None) };
    let mut sum = volume.read_projection(first)?;
    let mut count = 1_usize;
    for index in indices {
        sum += &volume.read_projection(index)?;
        count += 1;
    }
    if count > 1 { sum /= count as f32; }
    Ok(Some(sum))
}

// ----- Group lookup -------------------------------------------------------------------------------

fn explicit_groups(kind: Reference, side: Side) -> &'static [&'static str] {
    match (kind, side) {
        (Reference::Dark, Side::Leading ) => &["dark"],
        (Reference::Flat, Side::Leading ) => &["flat"],
        (Reference::Dark, Side::Trailing) => &["dark_post", "dark_after"],
        (Reference::Flat, Side::Trailing) => &["flat_post", "flat_after"],
    }
}

fn pooled_group(kind: Reference) -> &'static str {
    match kind {
        Reference::Dark => "exchange/data_dark",
        Reference::Flat => "exchange/data_white",
    }
}

/// Provenance needed to split the pooled groups
struct Pooled {
    table: ProvenanceTable,
    tagging: PrefixTagging,
    window: TimestampWindow,
}

struct Lookup<'a, A> {
    source: &'a A,
    pooled: Option<Pooled>,
}

impl<'a, A: Acquisition> Lookup<'a, A> {

    fn new(source: &'a A) -> Result<Self> {
        let standard_tags = scan_group(source)? == "tomo";
        let any_pooled = [Reference::Dark, Reference::Flat].iter().any(|&k| source.contains(pooled_group(k)));
        let pooled = if any_pooled {
            source.provenance()?.map(|table| {
                let tagging = if standard_tags { PrefixTagging::standard(table.first_index) }
                              else             { PrefixTagging::from_table(&table) };
                let window = TimestampWindow::of_scan(&table.entries, &tagging);
                Pooled { table, tagging, window }
            })
        } else { None };
        Ok(Self { source, pooled })
    }

    /// The group holding references of `kind` on `side`, and which of its
    /// projections they are
    fn locate(&self, kind: Reference, side: Side) -> Result<Option<(Volume<A::Storage>, Vec<Index1>)>> {
        if let Some(path) = explicit_groups(kind, side).iter().find(|p| self.source.contains(p)) {
            log::debug!("{kind:?} ({side:?}) from `{path}`");
            let volume = self.source.volume(path)?;
            let all = (0..volume.n_projections()).collect();
            return Ok(Some((volume, all)))
        }
        let path = pooled_group(kind);
        if !self.source.contains(path) { return Ok(None) }
        let Pooled { table, tagging, window } = self.pooled.as_ref()
            .ok_or_else(|| AccessError::MissingGroup(PROVENANCE.into()))?;
        let indices = select(&table.entries, tagging, window, kind, side.into())?;
        log::debug!("{kind:?} ({side:?}) from `{path}`, images {indices:?}");
        Ok(Some((self.source.volume(path)?, indices)))
    }

    fn find(&self, kind: Reference, side: Side) -> Result<(Found, Option<Image>)> {
        let Some((volume, indices)) = self.locate(kind, side)? else { return Ok((Found::NoGroup, None)) };
        let image = average_of(&volume, indices)?;
        let found = if image.is_some() { Found::Images } else { Found::Empty };
        Ok((found, image))
    }
}

/// Path of the projections of `source`: `tomo` or `exchange/data`
pub fn scan_group<A: Acquisition>(source: &A) -> Result<&'static str> {
    ["tomo", "exchange/data"].into_iter()
        .find(|path| source.contains(path))
        .ok_or_else(|| AccessError::MissingGroup("exchange/data".into()))
}

/// Every flat acquired before the projections, unaveraged, as an in-memory
/// projection-major volume. `None` when there are none.
pub fn leading_flats<A: Acquisition>(source: &A) -> Result<Option<Volume<Array3<f32>>>> {
    let lookup = Lookup::new(source)?;
    let Some((volume, indices)) = lookup.locate(Reference::Flat, Side::Leading)? else { return Ok(None) };
    if indices.is_empty() { return Ok(None) }
    let flats = indices.into_iter()
        .map(|i| volume.read_projection(i))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(Volume::from_projections(AxisOrder::ProjectionMajor, &flats)?))
}

// ----- Plan extraction ----------------------------------------------------------------------------

/// Build the correction plan of `source`.
///
/// `flat_end` asks for the trailing reference pair as well as the leading
/// one. Degraded outcomes (no usable flats, no trailing pair, ...) are
/// reported through `log` and the plan's flags; only structural failures are
/// errors.
pub fn extract_flat_dark<A: Acquisition>(source: &A, flat_end: bool, log: &mut dyn StatusLog) -> Result<CorrectionPlan> {
    use {Reference::*, Side::*};
    let lookup = Lookup::new(source)?;
    let mut plan = CorrectionPlan { skip_flat_after: !flat_end, ..CorrectionPlan::default() };
    let mut ctx = Context { flat_end, only_after: false };

    let (found, dark_before) = lookup.find(Dark, Leading)?;
    apply(decide(Dark, Leading, found, ctx), &mut plan, &mut ctx, log);
    plan.dark_before = dark_before;

    let (found, flat_before) = lookup.find(Flat, Leading)?;
    apply(decide(Flat, Leading, found, ctx), &mut plan, &mut ctx, log);
    plan.flat_before = flat_before;

    if flat_end && !plan.skip_flat {
        let (found, dark_after) = lookup.find(Dark, Trailing)?;
        apply(decide(Dark, Trailing, found, ctx), &mut plan, &mut ctx, log);

        let (found, flat_after) = lookup.find(Flat, Trailing)?;
        apply(decide(Flat, Trailing, found, ctx), &mut plan, &mut ctx, log);

        if let Some(flat) = &flat_after {
            let (choice, message) = trailing_dark(dark_after.is_some(), plan.dark_before.is_some());
            if let Some(message) = message { log.note(message) }
            plan.dark_after = match choice {
                TrailingDark::Own     => dark_after,
                TrailingDark::Leading => plan.dark_before.clone(),
                TrailingDark::Zeros   => Some(Image::zeros(flat.dim())),
            };
        }
        plan.flat_after = flat_after;
    }
    // Leading pair unusable on its own
    if ctx.only_after { plan.flat_before = None }
    Ok(plan)
}

fn apply(decision: Decision, plan: &mut CorrectionPlan, ctx: &mut Context, log: &mut dyn StatusLog) {
    log.note(decision.message);
    match decision.outcome {
        Outcome::SkipFlat  => { plan.skip_flat = true; plan.skip_flat_after = true; }
        Outcome::OnlyAfter => ctx.only_after = true,
        Outcome::SkipAfter => plan.skip_flat_after = true,
        Outcome::Use | Outcome::ToleratedAbsent | Outcome::MissingAfter => {}
    }
}

// ----- In-memory acquisitions ---------------------------------------------------------------------

/// An acquisition assembled in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryAcquisition {
    order: AxisOrder,
    groups: std::collections::HashMap<String, Array3<f32>>,
    provenance: Option<ProvenanceTable>,
}

impl MemoryAcquisition {
    pub fn new(order: AxisOrder) -> Self { Self { order, ..Self::default() } }

    /// Add a group holding `images`, stacked as projections
    pub fn with_images(mut self, path: &str, images: &[Image]) -> Result<Self> {
        let volume = Volume::from_projections(self.order, images)?;
        self.groups.insert(path.into(), volume.into_storage());
        Ok(self)
    }

    pub fn with_provenance(mut self, table: ProvenanceTable) -> Self {
        self.provenance = Some(table);
        self
    }
}

impl Acquisition for MemoryAcquisition {
    type Storage = Array3<f32>;

    fn contains(&self, path: &str) -> bool {
        self.groups.contains_key(path) || (path == PROVENANCE && self.provenance.is_some())
    }

    fn volume(&self, path: &str) -> Result<Volume<Self::Storage>> {
        self.groups.get(path)
            .map(|data| Volume::new(data.clone(), self.order))
            .ok_or_else(|| AccessError::MissingGroup(path.into()))
    }

    fn provenance(&self) -> Result<Option<ProvenanceTable>> { Ok(self.provenance.clone()) }
}
