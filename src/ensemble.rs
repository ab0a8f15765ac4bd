//! # Ensemble
//!
//! $$
//! S\in\mathbb R^{\,\text{steps}\times(n\cdot\text{iters})}
//! $$
//!
//! Monte Carlo ensemble runner and its persisted layout. The simulation
//! tensor is stored two-dimensionally with iteration-major column blocks:
//! columns `[iter*n, (iter+1)*n)` hold all securities of one iteration.
//! A run directory carries the historical block, the simulation block and
//! a line-oriented metadata file, and is published with a single rename so
//! readers never observe a partial write.

use std::fs;
use std::fs::File;
use std::path::Path;
use std::path::PathBuf;

use impl_new_derive::ImplNew;
use ndarray::s;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray_npy::ReadNpyExt;
use ndarray_npy::WriteNpyExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::error::RiskyError;
use crate::model::StochasticModel;

const HISTORICAL_FILE: &str = "historical.npy";
const SIMULATION_FILE: &str = "simulation.npy";
const META_FILE: &str = "meta.txt";

/// An in-memory simulation ensemble plus the historical block it grew out
/// of. Column order of both blocks follows `securities`.
#[derive(Clone, Debug)]
pub struct Ensemble {
  securities: Vec<String>,
  historical: Array2<f64>,
  simulation: Array2<f64>,
  num_steps: usize,
  num_iterations: usize,
}

impl Ensemble {
  pub fn securities(&self) -> &[String] {
    &self.securities
  }

  pub fn num_securities(&self) -> usize {
    self.securities.len()
  }

  pub fn num_steps(&self) -> usize {
    self.num_steps
  }

  pub fn num_iterations(&self) -> usize {
    self.num_iterations
  }

  /// Historical price block, shape `(len, n)`.
  pub fn historical(&self) -> &Array2<f64> {
    &self.historical
  }

  /// Simulation block, shape `(num_steps, n * num_iterations)`.
  pub fn simulation(&self) -> &Array2<f64> {
    &self.simulation
  }

  /// One iteration's `(num_steps, n)` price path.
  pub fn iteration_block(&self, iteration: usize) -> Result<ArrayView2<'_, f64>> {
    if iteration >= self.num_iterations {
      return Err(RiskyError::InvalidInput(format!(
        "iteration {iteration} out of range, ensemble has {} iterations",
        self.num_iterations
      )));
    }
    let n = self.num_securities();
    Ok(self.simulation.slice(s![.., iteration * n..(iteration + 1) * n]))
  }

  /// Read a published run directory back into memory.
  pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
    let dir = dir.as_ref();
    let meta = fs::read_to_string(dir.join(META_FILE))
      .map_err(|e| RiskyError::Persistence(format!("failed to read metadata: {e}")))?;
    let meta = parse_metadata(&meta)?;

    let securities: Vec<String> = meta_field(&meta, "securities")?
      .split(',')
      .map(str::to_string)
      .collect();
    let num_steps: usize = parse_meta_number(&meta, "num_steps")?;
    let num_iterations: usize = parse_meta_number(&meta, "num_iterations")?;
    let historical_len: usize = parse_meta_number(&meta, "historical_len")?;

    let historical = read_npy(&dir.join(HISTORICAL_FILE))?;
    let simulation = read_npy(&dir.join(SIMULATION_FILE))?;

    let n = securities.len();
    if historical.dim() != (historical_len, n) {
      return Err(RiskyError::Persistence(format!(
        "historical block has shape {:?}, metadata says ({historical_len}, {n})",
        historical.dim()
      )));
    }
    if simulation.dim() != (num_steps, n * num_iterations) {
      return Err(RiskyError::Persistence(format!(
        "simulation block has shape {:?}, metadata says ({num_steps}, {})",
        simulation.dim(),
        n * num_iterations
      )));
    }

    Ok(Self {
      securities,
      historical,
      simulation,
      num_steps,
      num_iterations,
    })
  }

  fn save(&self, dir: &Path, model_name: &str) -> Result<()> {
    write_npy(&self.historical, &dir.join(HISTORICAL_FILE))?;
    write_npy(&self.simulation, &dir.join(SIMULATION_FILE))?;

    let mut meta = String::new();
    meta.push_str("version=1\n");
    meta.push_str(&format!("model={model_name}\n"));
    meta.push_str(&format!("securities={}\n", self.securities.join(",")));
    meta.push_str(&format!("num_steps={}\n", self.num_steps));
    meta.push_str(&format!("num_iterations={}\n", self.num_iterations));
    meta.push_str(&format!("historical_len={}\n", self.historical.nrows()));
    fs::write(dir.join(META_FILE), meta)
      .map_err(|e| RiskyError::Persistence(format!("failed to write metadata: {e}")))
  }
}

/// A persisted run: the ensemble plus the directory it was published to.
#[derive(Debug)]
pub struct EnsembleHandle {
  ensemble: Ensemble,
  path: PathBuf,
}

impl EnsembleHandle {
  pub fn ensemble(&self) -> &Ensemble {
    &self.ensemble
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn into_ensemble(self) -> Ensemble {
    self.ensemble
  }
}

/// Drives repeated path simulation and owns the run-naming and publication
/// rules of the output directory.
#[derive(ImplNew)]
pub struct EnsembleRunner {
  pub output_dir: PathBuf,
  pub base_seed: u64,
}

impl EnsembleRunner {
  /// Simulate an ensemble without touching the filesystem.
  ///
  /// Iterations run on rayon workers. Every iteration derives its own
  /// `StdRng` from the runner's base seed, and each worker writes to a
  /// disjoint column block of the preallocated table.
  pub fn simulate<M: StochasticModel>(
    &self,
    model: &M,
    num_steps: usize,
    num_iterations: usize,
  ) -> Result<Ensemble> {
    if num_steps == 0 || num_iterations == 0 {
      return Err(RiskyError::InvalidInput(format!(
        "num_steps and num_iterations must be at least 1, got {num_steps} and {num_iterations}"
      )));
    }

    let historical = model.historical()?;
    let securities = historical.securities().to_vec();
    let n = securities.len();

    let paths = (0..num_iterations)
      .into_par_iter()
      .map(|iteration| {
        let mut rng = StdRng::seed_from_u64(mix_seed(self.base_seed, iteration as u64));
        model.simulate_path(num_steps, &mut rng)
      })
      .collect::<Result<Vec<Array2<f64>>>>()?;

    let mut simulation = Array2::<f64>::zeros((num_steps, n * num_iterations));
    for (iteration, path) in paths.iter().enumerate() {
      simulation
        .slice_mut(s![.., iteration * n..(iteration + 1) * n])
        .assign(path);
    }

    Ok(Ensemble {
      securities,
      historical: historical.prices().clone(),
      simulation,
      num_steps,
      num_iterations,
    })
  }

  /// Simulate and persist an ensemble.
  ///
  /// The run is written into a temporary directory next to its final
  /// location and published with one rename, so a crash mid-write leaves
  /// nothing under the `simulation-<model>-<NNN>` naming convention.
  pub fn run<M: StochasticModel>(
    &self,
    model: &M,
    num_steps: usize,
    num_iterations: usize,
  ) -> Result<EnsembleHandle> {
    let ensemble = self.simulate(model, num_steps, num_iterations)?;

    fs::create_dir_all(&self.output_dir).map_err(|e| {
      RiskyError::Persistence(format!(
        "failed to create output directory {:?}: {e}",
        self.output_dir
      ))
    })?;

    let run_name = self.next_run_name(model.name())?;
    let target = self.output_dir.join(&run_name);

    let staging = tempfile::Builder::new()
      .prefix(".staging-")
      .tempdir_in(&self.output_dir)
      .map_err(|e| RiskyError::Persistence(format!("failed to create staging directory: {e}")))?;
    ensemble.save(staging.path(), model.name())?;

    let staging = staging.into_path();
    if let Err(e) = fs::rename(&staging, &target) {
      let _ = fs::remove_dir_all(&staging);
      return Err(RiskyError::Persistence(format!(
        "failed to publish run {run_name}: {e}"
      )));
    }

    info!(
      run = %target.display(),
      num_steps,
      num_iterations,
      "persisted simulation ensemble"
    );

    Ok(EnsembleHandle {
      ensemble,
      path: target,
    })
  }

  /// Next free `simulation-<model>-<NNN>` name, zero-padded and strictly
  /// above every suffix already present.
  fn next_run_name(&self, model_name: &str) -> Result<String> {
    let prefix = format!("simulation-{model_name}-");
    let mut next = 0usize;

    let entries = fs::read_dir(&self.output_dir)
      .map_err(|e| RiskyError::Persistence(format!("failed to scan output directory: {e}")))?;
    for entry in entries {
      let entry =
        entry.map_err(|e| RiskyError::Persistence(format!("failed to scan output directory: {e}")))?;
      let name = entry.file_name();
      let Some(name) = name.to_str() else { continue };
      if let Some(suffix) = name.strip_prefix(&prefix) {
        if let Ok(index) = suffix.parse::<usize>() {
          next = next.max(index + 1);
        }
      }
    }

    Ok(format!("{prefix}{next:03}"))
  }
}

/// Splitmix-style mixer decorrelating per-iteration seed streams.
fn mix_seed(base: u64, iteration: u64) -> u64 {
  let mut x = base ^ iteration.wrapping_mul(0x9E37_79B9_7F4A_7C15);
  x ^= x >> 30;
  x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
  x ^= x >> 27;
  x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
  x ^ (x >> 31)
}

fn write_npy(array: &Array2<f64>, path: &Path) -> Result<()> {
  let file = File::create(path)
    .map_err(|e| RiskyError::Persistence(format!("failed to create {path:?}: {e}")))?;
  array
    .write_npy(file)
    .map_err(|e| RiskyError::Persistence(format!("failed to write {path:?}: {e}")))
}

fn read_npy(path: &Path) -> Result<Array2<f64>> {
  let file = File::open(path)
    .map_err(|e| RiskyError::Persistence(format!("failed to open {path:?}: {e}")))?;
  Array2::<f64>::read_npy(file)
    .map_err(|e| RiskyError::Persistence(format!("failed to read {path:?}: {e}")))
}

fn parse_metadata(s: &str) -> Result<Vec<(String, String)>> {
  let mut out = Vec::new();
  for line in s.lines() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }
    let (k, v) = line.split_once('=').ok_or_else(|| {
      RiskyError::Persistence(format!("invalid metadata line: {line}"))
    })?;
    out.push((k.trim().to_string(), v.trim().to_string()));
  }
  Ok(out)
}

fn meta_field<'a>(meta: &'a [(String, String)], key: &str) -> Result<&'a str> {
  meta
    .iter()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.as_str())
    .ok_or_else(|| RiskyError::Persistence(format!("missing '{key}' in metadata")))
}

fn parse_meta_number(meta: &[(String, String)], key: &str) -> Result<usize> {
  meta_field(meta, key)?
    .parse::<usize>()
    .map_err(|e| RiskyError::Persistence(format!("failed to parse metadata field '{key}': {e}")))
}
