use std::{env, io, path::PathBuf};

use anyhow::{anyhow, Result};

const APPLICATION_DIR: &str = "devtempo";

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path = PathBuf::from(
                env::var("APPDATA").map_err(|_| anyhow!("APPDATA should be present on Windows"))?,
            );
            path.push(APPLICATION_DIR);
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .map_err(|_| anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))?;
            path.push(APPLICATION_DIR);
            path
        }
    };

    match std::fs::create_dir_all(&path) {
        Ok(_) => Ok(path),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(path),
        Err(v) => Err(v.into()),
    }
}

/// Well known files inside the application directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn records(&self) -> PathBuf {
        self.root.join("records")
    }

    pub fn schedule(&self) -> PathBuf {
        self.root.join("schedule.json")
    }

    pub fn lunch(&self) -> PathBuf {
        self.root.join("lunch.json")
    }

    pub fn metrics(&self) -> PathBuf {
        self.root.join("metrics.json")
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }
}
