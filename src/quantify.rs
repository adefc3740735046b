use itertools::Itertools;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{DegenerateInput, Error, Operation, UpstreamError};
use crate::math::{ols, LinearFit};
use crate::segment::Segment;
use crate::series::Channel;
use crate::Result;

/// How a segment is reduced to a single number
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Discrete injections, integrated against a baseline
    #[default]
    Peak,
    /// Continuous chamber measurements, reduced to a rate of change
    Slope,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PeakArea {
    pub area: f64,
    pub baseline: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Slope {
    /// Rate of change in concentration units per minute
    pub rate_per_minute: f64,
    pub fit: LinearFit<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Quantity {
    PeakArea(PeakArea),
    Slope(Slope),
}

impl Quantity {
    /// The peak area or per-minute rate, the abscissa of a calibration curve
    pub const fn value(&self) -> f64 {
        match self {
            Self::PeakArea(peak) => peak.area,
            Self::Slope(slope) => slope.rate_per_minute,
        }
    }

    pub const fn r_squared(&self) -> Option<f64> {
        match self {
            Self::PeakArea(_) => None,
            Self::Slope(slope) => Some(slope.fit.r_squared),
        }
    }
}

/// Baseline for peak integration
///
/// A midpoint below the first value means the peak is negative going, so the baseline is the
/// maximum. Otherwise it is the minimum.
pub fn baseline(values: ArrayView1<f64>) -> Option<f64> {
    let first = *values.first()?;
    let midpoint = values[values.len() / 2];
    let fold = if midpoint < first { f64::max } else { f64::min };
    values.iter().copied().reduce(fold)
}

/// Baseline-relative integral of a peak
///
/// Sums `(v[i] - baseline) * (t[i + 1] - t[i])` over every point except the last. Flat or
/// multi-modal series produce an area, but it has no physical meaning.
///
/// # Errors
/// Returns an error for empty or mismatched series.
pub fn peak_area(
    times: ArrayView1<f64>,
    values: ArrayView1<f64>,
) -> std::result::Result<PeakArea, DegenerateInput> {
    if times.len() != values.len() {
        return Err(DegenerateInput::LengthMismatch {
            x: times.len(),
            y: values.len(),
        });
    }
    let baseline = baseline(values).ok_or(DegenerateInput::EmptyWindow)?;

    let area = times
        .iter()
        .tuple_windows()
        .zip(values.iter())
        .map(|((t0, t1), v)| (v - baseline) * (t1 - t0))
        .sum();

    Ok(PeakArea { area, baseline })
}

/// Rate of change of a series from a least-squares line, times in seconds
///
/// # Errors
/// Returns an error when the fit is degenerate.
pub fn slope(
    times: ArrayView1<f64>,
    values: ArrayView1<f64>,
) -> std::result::Result<Slope, DegenerateInput> {
    let times = times.to_vec();
    let values = values.to_vec();
    let fit = ols(&times, &values)?;
    Ok(Slope {
        rate_per_minute: fit.slope * 60.0,
        fit,
    })
}

/// Reduce the retained data of one channel of a segment
///
/// # Errors
/// Returns an upstream error if the segment has no such channel and a degenerate input error,
/// tagged with the segment name, if the data cannot be integrated or fitted.
pub fn quantify(segment: &Segment, channel: &Channel, mode: AnalysisMode) -> Result<Quantity> {
    let values = segment.pruned_channel(channel).ok_or_else(|| {
        Error::upstream(segment.name(), UpstreamError::UnknownChannel(channel.0.clone()))
    })?;
    let times = segment.pruned().times();

    match mode {
        AnalysisMode::Peak => peak_area(times, values)
            .map(Quantity::PeakArea)
            .map_err(|kind| Error::degenerate(segment.name(), Operation::PeakArea, kind)),
        AnalysisMode::Slope => slope(times, values)
            .map(Quantity::Slope)
            .map_err(|kind| Error::degenerate(segment.name(), Operation::SlopeFit, kind)),
    }
}
