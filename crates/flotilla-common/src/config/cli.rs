use figment::value::{Dict, Map, Value};
use figment::{Error, Metadata, Profile, Provider};

use crate::config::conf_file::insert_dotted;
use crate::config::ConfigKeyValue;

/// A configuration provider over command-line overrides.
///
/// A key without a value is a boolean toggle and contributes `true`;
/// negated toggles arrive with an explicit `false` value.
pub struct CliOverrides {
    overrides: Vec<ConfigKeyValue>,
    profile: Profile,
}

impl CliOverrides {
    pub fn new(overrides: Vec<ConfigKeyValue>) -> Self {
        Self {
            overrides,
            profile: Profile::Default,
        }
    }
}

impl Provider for CliOverrides {
    fn metadata(&self) -> Metadata {
        Metadata::named("command line")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();
        for ConfigKeyValue { key, value } in &self.overrides {
            let value: Value = match value {
                Some(value) => value
                    .parse()
                    .map_err(|_| Error::from(format!("invalid value for key: {key}")))?,
                None => Value::from(true),
            };
            insert_dotted(&mut dict, key, value)?;
        }
        let mut map = Map::new();
        map.insert(self.profile.clone(), dict);
        Ok(map)
    }

    fn profile(&self) -> Option<Profile> {
        Some(self.profile.clone())
    }
}
