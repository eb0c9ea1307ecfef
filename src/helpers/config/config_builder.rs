use super::*;

pub type ConfigEntrySetterFn<'a, T> = Box<dyn FnMut(T, String) -> Result<(), Box<dyn Error>> + 'a>;

pub enum ConfigEntrySetter<'a> {
    Bool(ConfigEntrySetterFn<'a, bool>),
    String(ConfigEntrySetterFn<'a, String>),
    Int(ConfigEntrySetterFn<'a, i64>),
}

impl<'a> std::fmt::Display for ConfigEntrySetter<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Bool(_) => "bool",
                Self::String(_) => "string",
                Self::Int(_) => "int",
            }
        )
    }
}

/// One named, typed configuration value that knows how to apply itself to a [`MasterConfig`]
pub trait ConfigEntry {
    fn name(&self) -> &str;
    fn help(&self) -> &str;
    /// Default value as shown by --help
    fn describe_default(&self) -> &str;
    fn setter(&mut self) -> ConfigEntrySetter;
    fn apply_to(&self, target: &mut MasterConfig) -> Result<(), Box<dyn Error>>;
}

type ApplyFn<T> = Box<dyn Fn(&mut MasterConfig, T, Option<&str>) -> Result<(), Box<dyn Error>>>;

/// A type a config entry can hold, and the setter the loaders use to fill it
pub trait EntryValue: Clone + Debug + Sized + 'static {
    fn setter(target: &mut SetterTarget<Self>) -> ConfigEntrySetter;
}

macro_rules! entry_value {
    ($type:ty, $variant:ident) => {
        impl EntryValue for $type {
            fn setter(target: &mut SetterTarget<Self>) -> ConfigEntrySetter {
                ConfigEntrySetter::$variant(Box::new(move |value, source| {
                    target.value = value;
                    target.source = Some(source);
                    Ok(())
                }))
            }
        }
    };
}

entry_value!(bool, Bool);
entry_value!(String, String);
entry_value!(i64, Int);

impl dyn ConfigEntry {
    fn new_typed<T, F>(name: &str, help: &str, default_value: T, apply: F) -> Box<Self>
    where
        T: EntryValue,
        F: Fn(&mut MasterConfig, T, Option<&str>) -> Result<(), Box<dyn Error>> + 'static,
    {
        Box::new(ConfigEntryImpl {
            name: name.to_string(),
            help: help.to_string(),
            default_text: format!("{:?}", default_value),
            target: SetterTarget {
                value: default_value,
                source: None,
            },
            apply_fn: Box::new(apply),
        })
    }

    pub fn new_bool<F>(name: &str, help: &str, default_value: bool, apply: F) -> Box<Self>
    where
        F: Fn(&mut MasterConfig, bool, Option<&str>) -> Result<(), Box<dyn Error>> + 'static,
    {
        Self::new_typed(name, help, default_value, apply)
    }

    pub fn new_string<F>(name: &str, help: &str, default_value: &str, apply: F) -> Box<Self>
    where
        F: Fn(&mut MasterConfig, String, Option<&str>) -> Result<(), Box<dyn Error>> + 'static,
    {
        Self::new_typed(name, help, default_value.to_string(), apply)
    }

    pub fn new_int<F>(name: &str, help: &str, default_value: i64, apply: F) -> Box<Self>
    where
        F: Fn(&mut MasterConfig, i64, Option<&str>) -> Result<(), Box<dyn Error>> + 'static,
    {
        Self::new_typed(name, help, default_value, apply)
    }

    /// An int that must not be negative, handed to `apply` as a u64
    pub fn new_unsigned<F>(name: &str, help: &str, default_value: u64, apply: F) -> Box<Self>
    where
        F: Fn(&mut MasterConfig, u64) -> Result<(), Box<dyn Error>> + 'static,
    {
        let entry_name = name.to_string();
        Self::new_int(name, help, default_value as i64, move |conf, value, source| {
            if value < 0 {
                return Err(format!(
                    "{} should not be negative",
                    source.unwrap_or(entry_name.as_str())
                )
                .into());
            }
            apply(conf, value as u64)
        })
    }
}

pub struct SetterTarget<T> {
    value: T,
    /// Some if the value is not default, describes how it was set
    source: Option<String>,
}

struct ConfigEntryImpl<T> {
    name: String,
    help: String,
    default_text: String,
    target: SetterTarget<T>,
    apply_fn: ApplyFn<T>,
}

impl<T: EntryValue> ConfigEntry for ConfigEntryImpl<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn help(&self) -> &str {
        &self.help
    }

    fn describe_default(&self) -> &str {
        &self.default_text
    }

    fn setter(&mut self) -> ConfigEntrySetter {
        T::setter(&mut self.target)
    }

    fn apply_to(&self, target: &mut MasterConfig) -> Result<(), Box<dyn Error>> {
        (self.apply_fn)(
            target,
            self.target.value.clone(),
            self.target.source.as_deref(),
        )
    }
}

pub struct ConfigBuilder {
    entries: Vec<Box<dyn ConfigEntry>>,
}

impl ConfigBuilder {
    pub fn new(entries: Vec<Box<dyn ConfigEntry>>) -> Self {
        let mut names = HashSet::new();
        for entry in &entries {
            if !names.insert(entry.name()) {
                panic!("duplicate configuration entry {}", entry.name());
            }
        }
        Self { entries }
    }

    pub fn entry(&mut self, name: &str) -> Option<ConfigEntrySetter> {
        // Not the most efficient but good enough for the usecase
        for entry in &mut self.entries {
            if entry.name() == name {
                return Some(entry.setter());
            }
        }
        None
    }

    pub fn apply_to(&self, target: &mut MasterConfig) -> Result<(), Box<dyn Error>> {
        for entry in &self.entries {
            entry
                .apply_to(target)
                .map_err(|e| format!("{} configuration option: {}", entry.name(), e))?;
        }
        Ok(())
    }

    /// Every entry with its default and description
    pub fn help_text(&mut self) -> String {
        let mut text = format!(
            "Options can be set in {} or passed as --name=value\n",
            DEFAULT_TOML_PATH
        );
        for entry in &mut self.entries {
            let kind = entry.setter().to_string();
            text.push_str(&format!(
                "\n--{} ({}, default {})\n  {}\n",
                entry.name(),
                kind,
                entry.describe_default(),
                entry.help()
            ));
        }
        text
    }
}
