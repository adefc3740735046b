use ndarray_rand::rand::seq::SliceRandom;
use ndarray_rand::rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Operation, ValidationError};
use crate::math::ols;
use crate::series::Channel;
use crate::Result;

/// A reference standard of known concentration, recognised by a tag in the segment name
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standard {
    /// A number followed by a unit, for example `5ppm`
    pub tag: String,
    /// The certified concentration of the standard
    pub value: f64,
    /// Restrict the standard to one analyte channel, every channel when absent
    #[serde(default)]
    pub channel: Option<Channel>,
}

impl Standard {
    pub fn new(tag: impl Into<String>, value: f64) -> Self {
        Self {
            tag: tag.into(),
            value,
            channel: None,
        }
    }
}

/// The standards used by the sample-injection analysers
pub fn default_standards() -> Vec<Standard> {
    vec![
        Standard::new("1ppm", 1.0),
        Standard::new("5ppm", 5.0),
        Standard::new("50ppm", 50.6),
    ]
}

/// Build the matcher for a standard tag
///
/// The number must not be preceded by another digit, so `5ppm` matches `std 5ppm` and
/// `5 PPM b` but neither `15ppm` nor `50ppm`.
fn tag_matcher(tag: &str) -> Result<Regex> {
    let grammar = Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*([A-Za-z%]+)\s*$")?;
    let captures = grammar
        .captures(tag)
        .ok_or_else(|| ValidationError::MalformedTag(tag.to_owned()))?;
    let number = regex::escape(&captures[1]);
    let unit = regex::escape(&captures[2]);
    Ok(Regex::new(&format!(
        r"(?i)(?:^|[^0-9.]){number}\s?{unit}(?:$|[^a-z])"
    ))?)
}

/// Compiled reference-standard table
#[derive(Clone, Debug)]
pub struct StandardsTable {
    standards: Vec<(Standard, Regex)>,
}

impl StandardsTable {
    /// # Errors
    /// Returns a validation error if a tag is not a number followed by a unit.
    pub fn new(standards: &[Standard]) -> Result<Self> {
        let standards = standards
            .iter()
            .map(|standard| Ok((standard.clone(), tag_matcher(&standard.tag)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { standards })
    }

    pub fn len(&self) -> usize {
        self.standards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.standards.is_empty()
    }

    /// The first standard whose tag appears in `name` and which applies to `channel`
    pub fn identify(&self, name: &str, channel: &Channel) -> Option<&Standard> {
        self.standards
            .iter()
            .filter(|(standard, _)| standard.channel.as_ref().map_or(true, |c| c == channel))
            .find(|(_, matcher)| matcher.is_match(name))
            .map(|(standard, _)| standard)
    }
}

/// One point on a calibration curve
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CalibrationPoint {
    /// Peak area or rate of change
    pub measured: f64,
    /// Known concentration
    pub reference: f64,
    /// Zero-signal anchor drawn from background readings
    pub synthetic: bool,
}

/// Calibration data for one analyte channel
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CalibrationSet {
    points: Vec<CalibrationPoint>,
}

impl CalibrationSet {
    /// Collect the standards among `measured`, `(segment name, area or rate)` pairs
    ///
    /// Every standard is paired with a synthetic point at zero signal whose reference value is
    /// drawn uniformly from `background`. With an empty background pool the anchor is the origin.
    pub fn build<R: Rng>(
        measured: &[(&str, f64)],
        channel: &Channel,
        table: &StandardsTable,
        background: &[f64],
        rng: &mut R,
    ) -> Self {
        let mut points = vec![];
        for (name, value) in measured {
            let Some(standard) = table.identify(name, channel) else {
                continue;
            };
            log::debug!("{name}: standard {} for {channel}", standard.tag);
            points.push(CalibrationPoint {
                measured: *value,
                reference: standard.value,
                synthetic: false,
            });
        }

        let standards = points.len();
        if standards > 0 && background.is_empty() {
            log::warn!("{channel}: no background readings, anchoring calibration at the origin");
        }
        for _ in 0..standards {
            points.push(CalibrationPoint {
                measured: 0.0,
                reference: background.choose(rng).copied().unwrap_or(0.0),
                synthetic: true,
            });
        }

        Self { points }
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Number of standards, excluding the synthetic anchors
    pub fn standards(&self) -> usize {
        self.points.iter().filter(|point| !point.synthetic).count()
    }

    /// Fit the calibration curve, falling back to `fallback` when there are no standards
    ///
    /// # Errors
    /// Returns a degenerate input error, labelled with the channel, when the standards all share
    /// one measured value or one reference value.
    pub fn fit(&self, channel: &Channel, fallback: &LinearModel) -> Result<LinearModel> {
        let standards = self.standards();
        if standards == 0 {
            log::warn!("{channel}: no standards found, using a fixed calibration");
            return Ok(fallback.clone());
        }

        let (x, y): (Vec<_>, Vec<_>) = self
            .points
            .iter()
            .map(|point| (point.measured, point.reference))
            .unzip();
        let fit = ols(&x, &y)
            .map_err(|kind| Error::degenerate(channel.as_str(), Operation::Calibration, kind))?;

        log::info!(
            "{channel}: calibrated on {standards} standards, m = {}, b = {}, R² = {}",
            fit.slope,
            fit.intercept,
            fit.r_squared
        );
        Ok(LinearModel {
            slope: fit.slope,
            intercept: fit.intercept,
            r_squared: Some(fit.r_squared),
            f_statistic: fit.f_statistic,
            slope_std_error: fit.slope_std_error,
            standards,
        })
    }
}

/// A linear map from peak area or rate of change to concentration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
    #[serde(default)]
    pub r_squared: Option<f64>,
    #[serde(default)]
    pub f_statistic: Option<f64>,
    #[serde(default)]
    pub slope_std_error: Option<f64>,
    /// Standards the model was fitted on, zero for a fixed model
    #[serde(default)]
    pub standards: usize,
}

impl LinearModel {
    pub const fn fixed(slope: f64, intercept: f64) -> Self {
        Self {
            slope,
            intercept,
            r_squared: None,
            f_statistic: None,
            slope_std_error: None,
            standards: 0,
        }
    }

    /// The model which reports measurements unchanged
    pub const fn identity() -> Self {
        Self::fixed(1.0, 0.0)
    }

    pub fn apply(&self, measured: f64) -> f64 {
        self.slope.mul_add(measured, self.intercept)
    }
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::identity()
    }
}
