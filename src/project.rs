use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use serde::Deserialize;
use thiserror::Error;

use crate::runtime::{Config, Runtime};
use crate::target::Target;

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("could not open {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("invalid project.json: {0}")]
  Json(#[from] serde_json::Error),
  #[error("project has no targets")]
  NoTargets,
}

/// The targets of an extracted project.json. Only block graphs are read.
#[derive(Debug, Deserialize)]
pub struct Project {
  pub targets: Vec<Target>,
}

impl Project {
  pub fn load(path: impl AsRef<Path>) -> Result<Project, ProjectError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ProjectError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let project: Project = serde_json::from_reader(BufReader::new(file))?;
    project.validate()
  }

  fn validate(self) -> Result<Project, ProjectError> {
    if self.targets.is_empty() {
      return Err(ProjectError::NoTargets);
    }
    Ok(self)
  }

  pub fn into_runtime(self, config: Config) -> Runtime {
    let mut runtime = Runtime::new(config);
    for target in self.targets {
      info!("loaded target {} with {} blocks", target.name, target.blocks.len());
      runtime.add_target(target);
    }
    runtime
  }
}

impl FromStr for Project {
  type Err = ProjectError;

  fn from_str(json: &str) -> Result<Self, Self::Err> {
    let project: Project = serde_json::from_str(json)?;
    project.validate()
  }
}
