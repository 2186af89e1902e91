//! Layered configuration loading
//!
//! Every labwire process reads its settings through figment so that files,
//! per-site overrides and environment variables compose the same way.

use crate::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Load configuration from multiple sources
///
/// Priority (highest to lowest):
/// 1. Environment variables (`<SERVICE>_` prefix, `__` as nesting separator)
/// 2. Local overrides (`config/local.*`)
/// 3. Site-specific file (`config/<LABWIRE_SITE>.*`)
/// 4. Service file (`config/<service>.*`)
/// 5. `T::default()`
pub fn load_config<T>(service_name: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
{
    load_config_in(Path::new("config"), service_name)
}

/// Same as [`load_config`], rooted at an explicit directory.
pub fn load_config_in<T>(dir: &Path, service_name: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
{
    let site = std::env::var("LABWIRE_SITE").unwrap_or_else(|_| "default".to_string());

    let figment = Figment::from(Serialized::defaults(T::default()))
        .merge(Toml::file(dir.join(format!("{}.toml", service_name))))
        .merge(Yaml::file(dir.join(format!("{}.yaml", service_name))))
        .merge(Json::file(dir.join(format!("{}.json", service_name))))
        .merge(Toml::file(dir.join(format!("{}.toml", site))))
        .merge(Yaml::file(dir.join(format!("{}.yaml", site))))
        .merge(Toml::file(dir.join("local.toml")))
        .merge(Yaml::file(dir.join("local.yaml")))
        .merge(Env::prefixed(&format!("{}_", service_name.to_uppercase())).split("__"));

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

/// Load configuration from a specific file, on top of `T::default()`
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::UnsupportedFormat(path.display().to_string()))?;

    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }

    let base = Figment::from(Serialized::defaults(T::default()));
    let figment = match extension {
        "toml" => base.merge(Toml::file(path)),
        "yaml" | "yml" => base.merge(Yaml::file(path)),
        "json" => base.merge(Json::file(path)),
        _ => return Err(Error::UnsupportedFormat(extension.to_string())),
    };

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration from file: {}", e)))
}
