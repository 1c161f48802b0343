use std::path::PathBuf;

use figment::value::{Dict, Map, Tag, Value};
use figment::{Error, Metadata, Profile, Provider};

/// Insert a dotted key into a nested dictionary, creating intermediate
/// dictionaries as needed.
pub(crate) fn insert_dotted(dict: &mut Dict, key: &str, value: Value) -> Result<(), Error> {
    let split = key.split('.').collect::<Vec<_>>();
    let [prefixes @ .., last] = split.as_slice() else {
        return Err(Error::from(format!("invalid key: {key}")));
    };
    let mut current = dict;
    for prefix in prefixes {
        let Value::Dict(_, v) = current
            .entry(prefix.to_string())
            .or_insert_with(|| Value::Dict(Tag::default(), Dict::new()))
        else {
            return Err(Error::from(format!("conflicting value type for key: {key}")));
        };
        current = v;
    }
    current.insert(last.to_string(), value);
    Ok(())
}

/// A configuration provider for `key=value` files.
///
/// Lines are trimmed, empty lines and `#` comments are skipped, and dotted
/// keys nest (`master.port=5050`). A missing file contributes nothing so
/// that a `--conf` directory without a config file is not an error.
pub struct ConfFile {
    path: PathBuf,
    profile: Profile,
}

impl ConfFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            profile: Profile::Default,
        }
    }
}

impl Provider for ConfFile {
    fn metadata(&self) -> Metadata {
        Metadata::named(format!("conf file {}", self.path.display()))
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();
        if self.path.exists() {
            let raw = std::fs::read_to_string(&self.path)
                .map_err(|e| Error::from(format!("{}: {e}", self.path.display())))?;
            for line in raw.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let Some((key, value)) = line.split_once('=') else {
                    return Err(Error::from(format!("invalid configuration line: {line}")));
                };
                let value: Value = value
                    .trim()
                    .parse()
                    .map_err(|_| Error::from(format!("invalid value for key: {key}")))?;
                insert_dotted(&mut dict, key.trim(), value)?;
            }
        }
        let mut map = Map::new();
        map.insert(self.profile.clone(), dict);
        Ok(map)
    }

    fn profile(&self) -> Option<Profile> {
        Some(self.profile.clone())
    }
}
