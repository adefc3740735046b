//! Conversion of a chamber concentration rate of change into a mass flux
//!
//! The ideal gas law gives the moles of air in the chamber headspace, which scales a mixing
//! ratio rate into a mass of carbon (or nitrogen) per square metre per day:
//!
//! $$
//!     F = \frac{dC}{dt} \cdot \frac{V}{R T} \cdot \frac{M \cdot 1440}{A} \cdot f / d
//! $$
//!
//! with `V` in litres, `R = 0.0821 L atm K⁻¹ mol⁻¹`, `M` the molar mass of the gas in kg/mol,
//! `f` the mass fraction of the element of interest and `d` the unit divisor.

use serde::{Deserialize, Serialize};

use crate::series::Channel;

/// Gas constant in L atm K⁻¹ mol⁻¹
pub const GAS_CONSTANT: f64 = 0.0821;

const MINUTES_PER_DAY: f64 = 1440.0;

const ZERO_CELSIUS: f64 = 273.15;

/// Unit of a mixing ratio channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Ppm,
    Ppb,
}

impl Unit {
    pub const fn divisor(self) -> f64 {
        match self {
            Self::Ppm => 1e3,
            Self::Ppb => 1e6,
        }
    }
}

/// Conversion constants for one measured gas
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub channel: Channel,
    pub unit: Unit,
    /// kg/mol
    pub molar_mass: f64,
    /// Mass fraction of carbon or nitrogen in the molecule
    pub element_fraction: f64,
}

impl Species {
    pub fn ch4(unit: Unit) -> Self {
        Self {
            channel: Channel::new("CH4"),
            unit,
            molar_mass: 0.016,
            element_fraction: 12.0 / 16.0,
        }
    }

    pub fn co2(unit: Unit) -> Self {
        Self {
            channel: Channel::new("CO2"),
            unit,
            molar_mass: 0.044,
            element_fraction: 12.0 / 44.0,
        }
    }

    pub fn n2o(unit: Unit) -> Self {
        Self {
            channel: Channel::new("N2O"),
            unit,
            molar_mass: 0.044,
            element_fraction: 28.0 / 44.0,
        }
    }
}

/// Which gases an analysis run measures
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasKind {
    #[default]
    Ch4,
    Co2,
    N2o,
    /// Paired CO2 and CH4, with CH4 reported in ppb
    Co2Ch4,
}

impl GasKind {
    /// The species measured for this gas kind, in channel order
    pub fn species(self) -> Vec<Species> {
        match self {
            Self::Ch4 => vec![Species::ch4(Unit::Ppm)],
            Self::Co2 => vec![Species::co2(Unit::Ppm)],
            Self::N2o => vec![Species::n2o(Unit::Ppm)],
            Self::Co2Ch4 => vec![Species::co2(Unit::Ppm), Species::ch4(Unit::Ppb)],
        }
    }
}

/// Static chamber geometry
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chamber {
    /// Collar footprint in m²
    pub surface_area: f64,
    /// Headspace height in m
    pub height: f64,
}

impl Chamber {
    pub fn volume_litres(&self) -> f64 {
        self.surface_area * self.height * 1000.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temperature {
    Celsius(f64),
    Kelvin(f64),
}

impl Temperature {
    pub fn kelvin(self) -> f64 {
        match self {
            Self::Celsius(t) => t + ZERO_CELSIUS,
            Self::Kelvin(t) => t,
        }
    }
}

/// Scale of a temperature channel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureScale {
    #[default]
    Celsius,
    Kelvin,
}

impl TemperatureScale {
    pub const fn reading(self, value: f64) -> Temperature {
        match self {
            Self::Celsius => Temperature::Celsius(value),
            Self::Kelvin => Temperature::Kelvin(value),
        }
    }
}

/// Mass flux in g m⁻² d⁻¹ of the element of interest, from a rate in `species.unit` per minute
pub fn chamber_flux(
    rate_per_minute: f64,
    species: &Species,
    chamber: &Chamber,
    temperature: Temperature,
) -> f64 {
    let moles_of_air = chamber.volume_litres() / (GAS_CONSTANT * temperature.kelvin());
    rate_per_minute * moles_of_air * (species.molar_mass * MINUTES_PER_DAY) / chamber.surface_area
        * species.element_fraction
        / species.unit.divisor()
}
