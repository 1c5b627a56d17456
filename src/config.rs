//! Instrumentation options (SPEC_FULL.md §6), serializable so they can be
//! loaded from a project config file in addition to CLI flags — the ambient
//! convention this crate follows for its `serde`-derived configuration
//! structs.

use crate::abi::Mode;
use crate::entry::EntrySelector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentOptions {
    pub mode: ConfigMode,
    pub entry: ConfigEntrySelector,
    #[serde(default = "default_true")]
    pub prune_module: bool,
    #[serde(default = "default_true")]
    pub version_check: bool,
    #[serde(default = "default_filename_template")]
    pub output_filename_template: String,
}

fn default_true() -> bool {
    true
}

fn default_filename_template() -> String {
    "%{fn}.%{uuid}".to_string()
}

impl Default for InstrumentOptions {
    fn default() -> Self {
        InstrumentOptions {
            mode: ConfigMode::Generate,
            entry: ConfigEntrySelector::Index(0),
            prune_module: true,
            version_check: true,
            output_filename_template: default_filename_template(),
        }
    }
}

/// Serializable mirror of [`Mode`] (`Mode` itself derives no serde traits, to
/// keep `abi` free of the serde dependency — only configuration needs it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMode {
    Record,
    Generate,
    Run,
}

impl From<ConfigMode> for Mode {
    fn from(value: ConfigMode) -> Self {
        match value {
            ConfigMode::Record => Mode::Record,
            ConfigMode::Generate => Mode::Generate,
            ConfigMode::Run => Mode::Run,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigEntrySelector {
    Name(String),
    Index(usize),
}

impl From<ConfigEntrySelector> for EntrySelector {
    fn from(value: ConfigEntrySelector) -> Self {
        match value {
            ConfigEntrySelector::Name(n) => EntrySelector::Name(n),
            ConfigEntrySelector::Index(i) => EntrySelector::Index(i),
        }
    }
}

/// Renders `%{fn}`/`%{uuid}` placeholders in an output filename template.
/// `uuid` here is whatever caller-supplied disambiguator is handy (this
/// crate has no uuid dependency of its own; the driver passes the seed).
#[must_use]
pub fn render_filename_template(template: &str, function_name: &str, uuid: &str) -> String {
    template.replace("%{fn}", function_name).replace("%{uuid}", uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_the_documented_defaults() {
        let opts = InstrumentOptions::default();
        assert!(opts.prune_module);
        assert!(opts.version_check);
    }

    #[test]
    fn renders_both_placeholders() {
        let name = render_filename_template("%{fn}-%{uuid}.input", "sum16", "42");
        assert_eq!(name, "sum16-42.input");
    }

    #[test]
    fn converts_into_the_runtime_selector_and_mode_types() {
        let opts = InstrumentOptions {
            entry: ConfigEntrySelector::Name("sum16".to_string()),
            ..InstrumentOptions::default()
        };
        assert_eq!(Mode::from(opts.mode), Mode::Generate);
        assert_eq!(EntrySelector::from(opts.entry), EntrySelector::Name("sum16".to_string()));
    }
}
