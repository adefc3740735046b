use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::calibration::{default_standards, LinearModel, Standard, StandardsTable};
use crate::editor::EditorSettings;
use crate::flux::{Chamber, GasKind, Species, TemperatureScale};
use crate::quantify::AnalysisMode;
use crate::series::Channel;
use crate::Result;

/// What to do when one segment's derived value cannot be computed
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegeneratePolicy {
    /// Stop the batch and return the error
    #[default]
    Abort,
    /// Report the segment without a value and carry on
    Skip,
}

/// A channel holding chamber air temperature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureChannel {
    pub channel: Channel,
    #[serde(default)]
    pub scale: TemperatureScale,
}

/// Settings for one analysis run
///
/// Every field has a default, so a TOML file only needs the values which differ:
///
/// ```toml
/// mode = "slope"
/// gas = "co2_ch4"
/// auxiliary_channels = ["H2O"]
/// seed = 40
///
/// [chamber]
/// surface_area = 0.1
/// height = 0.2
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mode: AnalysisMode,
    pub gas: GasKind,
    /// Replaces the species of `gas`, for analysers reporting other units
    pub species: Option<Vec<Species>>,
    /// Longest sample window in seconds
    pub window_ceiling: f64,
    pub standards: Vec<Standard>,
    /// Model used for a channel without any standards
    pub fallback_model: LinearModel,
    /// Channels spliced without a continuity offset
    pub auxiliary_channels: Vec<Channel>,
    pub temperature_channel: Option<TemperatureChannel>,
    /// Chamber used by flux segments which do not name their own
    pub chamber: Option<Chamber>,
    /// Seconds within which a press picks up a marker
    pub grab_tolerance: f64,
    /// Seed for the background draws, runs are not reproducible without one
    pub seed: Option<u64>,
    pub on_degenerate: DegeneratePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::default(),
            gas: GasKind::default(),
            species: None,
            window_ceiling: 180.0,
            standards: default_standards(),
            fallback_model: LinearModel::identity(),
            auxiliary_channels: vec![],
            temperature_channel: None,
            chamber: None,
            grab_tolerance: 3.0,
            seed: None,
            on_degenerate: DegeneratePolicy::default(),
        }
    }
}

impl Config {
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// # Errors
    /// Returns an error if `contents` is not a valid configuration.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config = toml::from_str(contents)?;
        Ok(config)
    }

    /// The measured species, in report column order
    pub fn species(&self) -> Vec<Species> {
        self.species.clone().unwrap_or_else(|| self.gas.species())
    }

    /// # Errors
    /// Returns a validation error if a standard tag is malformed.
    pub fn standards_table(&self) -> Result<StandardsTable> {
        StandardsTable::new(&self.standards)
    }

    pub fn editor_settings(&self) -> EditorSettings {
        EditorSettings {
            mode: self.mode,
            analyte: self.species().into_iter().next().map(|species| species.channel),
            grab_tolerance: self.grab_tolerance,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Config, DegeneratePolicy};
    use crate::error::Error;
    use crate::flux::{Chamber, GasKind, TemperatureScale, Unit};
    use crate::quantify::AnalysisMode;
    use crate::series::Channel;

    #[test]
    fn empty_file_gives_the_sample_injection_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config, Config::default());
        approx::assert_relative_eq!(config.window_ceiling, 180.0);
        approx::assert_relative_eq!(config.grab_tolerance, 3.0);
        let values = config
            .standards
            .iter()
            .map(|standard| (standard.tag.as_str(), standard.value))
            .collect::<Vec<_>>();
        assert_eq!(values, vec![("1ppm", 1.0), ("5ppm", 5.0), ("50ppm", 50.6)]);
        assert_eq!(config.mode, AnalysisMode::Peak);
    }

    #[test]
    fn flux_configuration_is_read() {
        let config = Config::from_toml_str(
            r#"
            mode = "slope"
            gas = "co2_ch4"
            auxiliary_channels = ["H2O"]
            on_degenerate = "skip"
            seed = 40

            [temperature_channel]
            channel = "Tcell"
            scale = "kelvin"

            [chamber]
            surface_area = 0.1
            height = 0.2
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, AnalysisMode::Slope);
        assert_eq!(config.gas, GasKind::Co2Ch4);
        assert_eq!(config.auxiliary_channels, vec![Channel::new("H2O")]);
        assert_eq!(config.on_degenerate, DegeneratePolicy::Skip);
        assert_eq!(config.seed, Some(40));
        assert_eq!(
            config.temperature_channel.as_ref().unwrap().scale,
            TemperatureScale::Kelvin
        );
        assert_eq!(
            config.chamber,
            Some(Chamber {
                surface_area: 0.1,
                height: 0.2
            })
        );
        assert_eq!(
            config.editor_settings().analyte,
            Some(Channel::new("CO2"))
        );
    }

    #[test]
    fn standards_and_species_can_be_replaced() {
        let config = Config::from_toml_str(
            r#"
            [[standards]]
            tag = "400ppm"
            value = 401.2
            channel = "CO2"

            [[species]]
            channel = "CH4_dry"
            unit = "ppb"
            molar_mass = 0.016
            element_fraction = 0.75

            [fallback_model]
            slope = 0.98
            intercept = 0.01
            "#,
        )
        .unwrap();

        assert_eq!(config.standards.len(), 1);
        assert_eq!(config.standards[0].channel, Some(Channel::new("CO2")));
        assert_eq!(config.standards_table().unwrap().len(), 1);
        let species = config.species();
        assert_eq!(species[0].channel, Channel::new("CH4_dry"));
        assert_eq!(species[0].unit, Unit::Ppb);
        approx::assert_relative_eq!(config.fallback_model.apply(1.0), 0.99);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = Config::from_toml_str("window_cieling = 120.0");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
