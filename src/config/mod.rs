mod loader;
mod schema;

pub use loader::{load_config, load_or_init, resolve_path, save_config, Loaded, CONFIG_ENV};
pub use schema::*;

use anyhow::Result;
use std::path::Path;

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        loader::load_config(path)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        loader::save_config(self, path)
    }
}
