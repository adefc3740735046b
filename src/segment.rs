use itertools::Itertools;
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{DegenerateInput, Error, Operation, UpstreamError, ValidationError};
use crate::series::{check_monotonic, Channel, RawRecords};
use crate::Result;

/// The nominal time window of a segment, `start <= t < end`, in seconds
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

/// Derive sample windows from their start times
///
/// A window ends where the next one starts, unless the gap exceeds `ceiling` in which case it is
/// capped at `start + ceiling`. The final window ends at the earlier of `start + ceiling` and
/// `last_timestamp`.
pub fn derive_windows(starts: &[f64], ceiling: f64, last_timestamp: f64) -> Vec<Window> {
    starts
        .iter()
        .enumerate()
        .map(|(ii, &start)| {
            let end = match starts.get(ii + 1) {
                Some(&next) if next - start > ceiling => start + ceiling,
                Some(&next) => next,
                None => (start + ceiling).min(last_timestamp),
            };
            Window { start, end }
        })
        .collect()
}

/// How a channel is carried across a cut
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// Values after a cut are shifted so the series stays continuous across the gap
    #[default]
    Analyte,
    /// Values are spliced as recorded
    Auxiliary,
}

/// An excision applied to the pruned series
///
/// Indices are inclusive and refer to the pruned arrays as they were before the cut was applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Cut {
    pub left: usize,
    pub right: usize,
}

/// Time axis and channel values of a segment, in lockstep
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    times: Array1<f64>,
    values: Vec<Array1<f64>>,
    /// Index into the original frame of every retained point
    origin: Vec<usize>,
}

impl Frame {
    fn new(times: Array1<f64>, values: Vec<Array1<f64>>) -> Self {
        let origin = (0..times.len()).collect();
        Self {
            times,
            values,
            origin,
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> ArrayView1<f64> {
        self.times.view()
    }

    pub fn values(&self, index: usize) -> Option<ArrayView1<f64>> {
        self.values.get(index).map(Array1::view)
    }

    /// Original index of every retained point
    pub fn origin(&self) -> &[usize] {
        &self.origin
    }

    /// Drop `left..=right` and shift everything after it by the given deltas
    fn splice(&self, cut: Cut, time_delta: f64, value_deltas: &[f64]) -> Self {
        let join = |series: &Array1<f64>, delta: f64| -> Array1<f64> {
            series
                .slice(s![..cut.left])
                .iter()
                .copied()
                .chain(series.slice(s![cut.right + 1..]).iter().map(|v| v + delta))
                .collect()
        };

        Self {
            times: join(&self.times, -time_delta),
            values: self
                .values
                .iter()
                .zip(value_deltas)
                .map(|(series, delta)| join(series, *delta))
                .collect(),
            origin: self.origin[..cut.left]
                .iter()
                .chain(&self.origin[cut.right + 1..])
                .copied()
                .collect(),
        }
    }
}

/// One channel of a segment with the pruned series re-expanded onto the original indices
///
/// Points removed by cuts are `None` in `pruned` and `offsets`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlignedSeries {
    pub original: Vec<f64>,
    pub pruned: Vec<Option<f64>>,
    /// `original - pruned` at each retained index
    pub offsets: Vec<Option<f64>>,
}

impl AlignedSeries {
    fn new(original: ArrayView1<f64>, pruned: ArrayView1<f64>, slots: &[Option<usize>]) -> Self {
        let pruned = slots
            .iter()
            .map(|slot| slot.map(|jj| pruned[jj]))
            .collect::<Vec<_>>();
        let offsets = original
            .iter()
            .zip(&pruned)
            .map(|(o, p)| p.map(|p| o - p))
            .collect();
        Self {
            original: original.to_vec(),
            pruned,
            offsets,
        }
    }
}

/// Original and pruned data of a segment on a common index, for report rendering
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Alignment {
    pub time: AlignedSeries,
    pub channels: Vec<(Channel, AlignedSeries)>,
}

/// One analysable window of time series data, a discrete sample injection or a flux measurement
#[derive(Clone, Debug)]
pub struct Segment {
    name: String,
    window: Window,
    channels: Vec<Channel>,
    roles: Vec<ChannelRole>,
    original: Frame,
    pruned: Frame,
    cuts: Vec<Cut>,
}

impl Segment {
    /// Build a segment from data which has already been sliced to its window
    ///
    /// # Errors
    /// Returns an upstream error for mismatched channel lengths or a non-monotonic time axis, and
    /// a degenerate input error when there is no data at all.
    pub fn from_series(
        name: impl Into<String>,
        window: Window,
        times: Vec<f64>,
        channels: Vec<(Channel, ChannelRole, Vec<f64>)>,
    ) -> Result<Self> {
        let name = name.into();
        let times = Array1::from(times);
        let (names, roles, values): (Vec<_>, Vec<_>, Vec<_>) = channels
            .into_iter()
            .map(|(channel, role, values)| (channel, role, Array1::from(values)))
            .multiunzip();
        Self::assemble(name, window, names, roles, times, values)
    }

    fn assemble(
        name: String,
        window: Window,
        channels: Vec<Channel>,
        roles: Vec<ChannelRole>,
        times: Array1<f64>,
        values: Vec<Array1<f64>>,
    ) -> Result<Self> {
        if times.is_empty() {
            return Err(Error::degenerate(
                &name,
                Operation::Slicing,
                DegenerateInput::EmptyWindow,
            ));
        }
        check_monotonic(times.view()).map_err(|kind| Error::upstream(&name, kind))?;
        for (channel, series) in channels.iter().zip(&values) {
            if series.len() != times.len() {
                return Err(Error::upstream(
                    &name,
                    UpstreamError::ChannelLength {
                        channel: channel.0.clone(),
                        len: series.len(),
                        expected: times.len(),
                    },
                ));
            }
        }

        let original = Frame::new(times, values);
        Ok(Self {
            name,
            window,
            channels,
            roles,
            pruned: original.clone(),
            original,
            cuts: vec![],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn window(&self) -> Window {
        self.window
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub const fn original(&self) -> &Frame {
        &self.original
    }

    pub const fn pruned(&self) -> &Frame {
        &self.pruned
    }

    /// Every cut applied since construction or the last reset, in application order
    pub fn cuts(&self) -> &[Cut] {
        &self.cuts
    }

    pub fn len(&self) -> usize {
        self.pruned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pruned.is_empty()
    }

    pub fn channel_index(&self, channel: &Channel) -> Option<usize> {
        self.channels.iter().position(|c| c == channel)
    }

    pub fn pruned_channel(&self, channel: &Channel) -> Option<ArrayView1<f64>> {
        self.channel_index(channel)
            .and_then(|index| self.pruned.values(index))
    }

    pub fn original_channel(&self, channel: &Channel) -> Option<ArrayView1<f64>> {
        self.channel_index(channel)
            .and_then(|index| self.original.values(index))
    }

    /// Retained index whose time is closest to `time`, the earlier index on a tie
    pub fn nearest_index(&self, time: f64) -> usize {
        self.pruned
            .times
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |(best, distance), (ii, t)| {
                let d = (t - time).abs();
                if d < distance {
                    (ii, d)
                } else {
                    (best, distance)
                }
            })
            .0
    }

    /// Excise `left..=right` from the pruned series
    ///
    /// Everything after the cut is shifted so the series stays continuous: times move back by
    /// `t[right] - t[left]` and analyte values by `v[left] - v[right]`. Cuts touching either end of
    /// the series shift nothing.
    ///
    /// TODO: the continuity shift assumes the signal is roughly linear across the removed
    /// region; smoothing over the gap would behave better on curved data.
    ///
    /// # Errors
    /// Returns a validation error, leaving the segment untouched, when the bounds are outside the
    /// retained points or the cut would remove every retained point.
    pub fn cut(&mut self, left: usize, right: usize) -> Result<()> {
        let len = self.len();
        if left > right || right >= len {
            return Err(ValidationError::OutOfBounds { left, right, len }.into());
        }
        if right - left + 1 >= len {
            return Err(ValidationError::WholeSeries { left, right, len }.into());
        }

        let cut = Cut { left, right };
        let interior = left > 0 && right < len - 1;
        let time_delta = if interior {
            self.pruned.times[right] - self.pruned.times[left]
        } else {
            0.0
        };
        let value_deltas = self
            .pruned
            .values
            .iter()
            .zip(&self.roles)
            .map(|(series, role)| match role {
                ChannelRole::Analyte if interior => series[left] - series[right],
                _ => 0.0,
            })
            .collect::<Vec<_>>();

        self.pruned = self.pruned.splice(cut, time_delta, &value_deltas);
        self.cuts.push(cut);
        log::debug!(
            "{}: cut [{left}, {right}], {} points remain",
            self.name,
            self.len()
        );
        Ok(())
    }

    /// Keep only `left..=right` of the pruned series
    ///
    /// Recorded in the cut log as a cut of the tail followed by a cut of the head.
    ///
    /// # Errors
    /// Returns a validation error, leaving the segment untouched, when the bounds are outside the
    /// retained points.
    pub fn trim(&mut self, left: usize, right: usize) -> Result<()> {
        let len = self.len();
        if left > right || right >= len {
            return Err(ValidationError::OutOfBounds { left, right, len }.into());
        }
        if right + 1 < len {
            self.cut(right + 1, len - 1)?;
        }
        if left > 0 {
            self.cut(0, left - 1)?;
        }
        Ok(())
    }

    /// Restore the pruned series to the original data and clear the cut log
    pub fn reset(&mut self) {
        self.pruned = self.original.clone();
        self.cuts.clear();
        log::debug!("{}: reset to {} points", self.name, self.len());
    }

    /// Percentage of the original points removed by cuts
    #[allow(clippy::cast_precision_loss)]
    pub fn data_loss(&self) -> f64 {
        100.0 * (1.0 - self.pruned.len() as f64 / self.original.len() as f64)
    }

    /// Original time of the first and last retained points
    pub fn retained_span(&self) -> (f64, f64) {
        let first = self.pruned.origin.first().copied().unwrap_or(0);
        let last = self.pruned.origin.last().copied().unwrap_or(0);
        (self.original.times[first], self.original.times[last])
    }

    /// Re-expand the pruned data onto the original indices, with removed points left empty
    pub fn alignment(&self) -> Alignment {
        let mut slots = vec![None; self.original.len()];
        for (jj, &ii) in self.pruned.origin.iter().enumerate() {
            slots[ii] = Some(jj);
        }

        Alignment {
            time: AlignedSeries::new(self.original.times(), self.pruned.times(), &slots),
            channels: self
                .channels
                .iter()
                .zip(self.original.values.iter().zip(&self.pruned.values))
                .map(|(channel, (original, pruned))| {
                    (
                        channel.clone(),
                        AlignedSeries::new(original.view(), pruned.view(), &slots),
                    )
                })
                .collect(),
        }
    }
}

/// Marker for a builder whose window has not been chosen yet
pub struct Unset;

/// Slices a segment out of raw records once its window is known
pub struct SegmentBuilder<W> {
    name: String,
    window: W,
    auxiliary: Vec<Channel>,
}

impl SegmentBuilder<Unset> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            window: Unset,
            auxiliary: vec![],
        }
    }

    pub fn with_window(self, window: Window) -> SegmentBuilder<Window> {
        SegmentBuilder {
            name: self.name,
            window,
            auxiliary: self.auxiliary,
        }
    }
}

impl<W> SegmentBuilder<W> {
    /// Mark channels which are spliced without a continuity offset
    pub fn with_auxiliary(mut self, channels: &[Channel]) -> Self {
        self.auxiliary.extend_from_slice(channels);
        self
    }
}

impl SegmentBuilder<Window> {
    /// Slice the records falling inside the window
    ///
    /// # Errors
    /// Returns an upstream error if either end of the window lies outside the recorded range or
    /// the window ends before it starts, and a degenerate input error if it holds no records.
    pub fn build(self, records: &RawRecords) -> Result<Segment> {
        let window = self.window;
        let (Some(first), Some(last)) = (records.first_time(), records.last_time()) else {
            return Err(Error::upstream(&self.name, UpstreamError::NoRecords));
        };
        let out_of_range = if !(window.start >= first && window.start <= last) {
            Some(window.start)
        } else if !(window.end > window.start && window.end <= last) {
            Some(window.end)
        } else {
            None
        };
        if let Some(time) = out_of_range {
            return Err(Error::upstream(
                &self.name,
                UpstreamError::OutOfRange { time, first, last },
            ));
        }

        let (times, channels) = records.slice(records.window_indices(window.start, window.end));
        let (names, values): (Vec<_>, Vec<_>) = channels.into_iter().unzip();
        let roles = names
            .iter()
            .map(|channel| {
                if self.auxiliary.contains(channel) {
                    ChannelRole::Auxiliary
                } else {
                    ChannelRole::Analyte
                }
            })
            .collect();

        Segment::assemble(self.name, window, names, roles, times, values)
    }
}
