//! The correction plan: reference images and capability flags for a dataset

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::error::{AccessError, Result};
use crate::io::raw;
use crate::types::Image;

/// Normalization contract for a whole dataset. Built once, then read by every
/// per-slice correction.
///
/// `skip_flat` forbids any flat fielding; `skip_flat_after` restricts it to
/// the leading pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrectionPlan {
    pub flat_before: Option<Image>,
    pub flat_after : Option<Image>,
    pub dark_before: Option<Image>,
    pub dark_after : Option<Image>,
    pub skip_flat: bool,
    pub skip_flat_after: bool,
}

/// A flat image with the dark to subtract from it (`None`: nothing to subtract)
pub type Pair<'p> = (&'p Image, Option<&'p Image>);

impl CorrectionPlan {

    /// Plan which forbids any flat fielding
    pub fn skipped() -> Self {
        Self { skip_flat: true, skip_flat_after: true, ..Self::default() }
    }

    pub fn leading_pair(&self) -> Option<Pair> {
        if self.skip_flat { return None }
        self.flat_before.as_ref().map(|flat| (flat, self.dark_before.as_ref()))
    }

    pub fn trailing_pair(&self) -> Option<Pair> {
        if self.skip_flat || self.skip_flat_after { return None }
        self.flat_after.as_ref().map(|flat| (flat, self.dark_after.as_ref()))
    }

    fn images(&self) -> [(&'static str, Option<&Image>); 4] {
        [("flat_before", self.flat_before.as_ref()),
         ("flat_after" , self.flat_after .as_ref()),
         ("dark_before", self.dark_before.as_ref()),
         ("dark_after" , self.dark_after .as_ref())]
    }
}

// ----- Plan caches ----------------------------------------------------------------------------------

/// Somewhere to keep plans between runs on the same dataset
pub trait PlanCache {
    /// `None` when no plan has been stored for `dataset`
    fn load(&self, dataset: &str) -> Result<Option<CorrectionPlan>>;
    fn store(&mut self, dataset: &str, plan: &CorrectionPlan) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryPlanCache(HashMap<String, CorrectionPlan>);

impl PlanCache for MemoryPlanCache {
    fn load(&self, dataset: &str) -> Result<Option<CorrectionPlan>> {
        Ok(self.0.get(dataset).cloned())
    }

    fn store(&mut self, dataset: &str, plan: &CorrectionPlan) -> Result<()> {
        self.0.insert(dataset.to_string(), plan.clone());
        Ok(())
    }
}

/// One directory per dataset: `plan.toml` with the flags and image shapes,
/// plus one raw `f32` file per present image.
///
/// Directory names are the dataset keys with every byte outside
/// `[A-Za-z0-9._@-]` written as `%XX`, so distinct keys never share a
/// directory and none leaves `root`.
pub struct DirPlanCache {
    root: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
struct Manifest {
    skip_flat: bool,
    skip_flat_after: bool,
    /// Shape of each image present in the plan, keyed by field name
    images: BTreeMap<String, [usize; 2]>,
}

const MANIFEST: &str = "plan.toml";

fn escape(dataset: &str) -> String {
    dataset.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'@' | b'-' => char::from(b).to_string(),
            _ => format!("%{b:02X}"),
        })
        .collect()
}

impl DirPlanCache {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    fn dir(&self, dataset: &str) -> Result<PathBuf> {
        if dataset.is_empty() || dataset.chars().all(|c| c == '.') {
            return Err(AccessError::Cache(format!("`{dataset}` cannot name a cached plan")))
        }
        Ok(self.root.join(escape(dataset)))
    }

    fn image_path(dir: &Path, name: &str) -> PathBuf { dir.join(format!("{name}.raw")) }
}

impl PlanCache for DirPlanCache {

    fn load(&self, dataset: &str) -> Result<Option<CorrectionPlan>> {
        let dir = self.dir(dataset)?;
        let manifest_path = dir.join(MANIFEST);
        if !manifest_path.exists() { return Ok(None) }
        let text = std::fs::read_to_string(&manifest_path)?;
        let manifest: Manifest = toml::from_str(&text)
            .map_err(|e| AccessError::Cache(format!("{}: {e}", manifest_path.display())))?;
        let read = |name: &str| -> Result<Option<Image>> {
            manifest.images.get(name)
                .map(|&[rows, cols]| raw::read_image(&Self::image_path(&dir, name), (rows, cols)))
                .transpose()
                .map_err(AccessError::from)
        };
        Ok(Some(CorrectionPlan {
            flat_before: read("flat_before")?,
            flat_after : read("flat_after" )?,
            dark_before: read("dark_before")?,
            dark_after : read("dark_after" )?,
            skip_flat: manifest.skip_flat,
            skip_flat_after: manifest.skip_flat_after,
        }))
    }

    fn store(&mut self, dataset: &str, plan: &CorrectionPlan) -> Result<()> {
        let dir = self.dir(dataset)?;
        std::fs::create_dir_all(&dir)?;
        let mut images = BTreeMap::new();
        for (name, image) in plan.images() {
            let path = Self::image_path(&dir, name);
            match image {
                Some(image) => {
                    raw::write_image(image, &path)?;
                    let (rows, cols) = image.dim();
                    images.insert(name.to_string(), [rows, cols]);
                }
                None => if path.exists() { std::fs::remove_file(&path)? },
            }
        }
        let manifest = Manifest { skip_flat: plan.skip_flat, skip_flat_after: plan.skip_flat_after, images };
        let text = toml::to_string(&manifest).map_err(|e| AccessError::Cache(e.to_string()))?;
        std::fs::write(dir.join(MANIFEST), text)?;
        Ok(())
    }
}
