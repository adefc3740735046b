use std::fmt;
use std::fs;
use std::io::Read;
use std::ops::Range;
use std::path::Path;

use itertools::Itertools;
use ndarray::{s, Array1, ArrayView1};
use serde::{Deserialize, Serialize};

use crate::error::{Error, UpstreamError};
use crate::Result;

/// Label used in errors raised before any segment exists
pub(crate) const RAW_RECORDS: &str = "raw records";

/// A named measurement channel, for example `CH4` or `H2O`
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct Channel(pub String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check that a time axis is strictly increasing
pub(crate) fn check_monotonic(times: ArrayView1<f64>) -> std::result::Result<(), UpstreamError> {
    match times.iter().tuple_windows().position(|(a, b)| b <= a) {
        Some(ii) => Err(UpstreamError::NonMonotonic { index: ii + 1 }),
        None => Ok(()),
    }
}

/// Raw analyser output in a common in-memory form
///
/// Every channel is sampled on the shared time axis, in seconds. The instrument specific parsers
/// hand data over in this shape, either directly or through the normalised CSV layout read by
/// [`RawRecords::from_csv`].
#[derive(Clone, Debug)]
pub struct RawRecords {
    times: Array1<f64>,
    channels: Vec<(Channel, Array1<f64>)>,
}

impl RawRecords {
    /// # Errors
    /// Returns an upstream error if a channel length differs from the time axis or the time axis
    /// is not strictly increasing.
    pub fn new(times: Vec<f64>, channels: Vec<(Channel, Vec<f64>)>) -> Result<Self> {
        let times = Array1::from(times);
        check_monotonic(times.view()).map_err(|kind| Error::upstream(RAW_RECORDS, kind))?;

        let channels = channels
            .into_iter()
            .map(|(channel, values)| {
                if values.len() == times.len() {
                    Ok((channel, Array1::from(values)))
                } else {
                    Err(Error::upstream(
                        RAW_RECORDS,
                        UpstreamError::ChannelLength {
                            channel: channel.0,
                            len: values.len(),
                            expected: times.len(),
                        },
                    ))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { times, channels })
    }

    /// Read records from a CSV file whose first column is time in seconds and whose remaining
    /// columns are named channels
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, a field is not numeric or the records break
    /// the invariants checked by [`RawRecords::new`].
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = fs::read(path)?;
        Self::from_reader(&file[..])
    }

    /// # Errors
    /// See [`RawRecords::from_csv`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let names = rdr
            .headers()?
            .iter()
            .skip(1)
            .map(Channel::new)
            .collect::<Vec<_>>();

        let mut times = vec![];
        let mut columns = vec![vec![]; names.len()];
        for result in rdr.deserialize() {
            let row: Vec<f64> = result?;
            let mut fields = row.into_iter();
            if let Some(time) = fields.next() {
                times.push(time);
            }
            for (column, value) in columns.iter_mut().zip(fields) {
                column.push(value);
            }
        }

        Self::new(times, names.into_iter().zip(columns).collect())
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub const fn times(&self) -> &Array1<f64> {
        &self.times
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter().map(|(channel, _)| channel)
    }

    pub fn channel(&self, channel: &Channel) -> Option<ArrayView1<f64>> {
        self.channels
            .iter()
            .find(|(name, _)| name == channel)
            .map(|(_, values)| values.view())
    }

    pub fn first_time(&self) -> Option<f64> {
        self.times.first().copied()
    }

    pub fn last_time(&self) -> Option<f64> {
        self.times.last().copied()
    }

    /// Index range of the records with `start <= time < end`
    pub fn window_indices(&self, start: f64, end: f64) -> Range<usize> {
        let times = self.times.as_slice().unwrap_or(&[]);
        let first = times.partition_point(|t| *t < start);
        let last = times.partition_point(|t| *t < end).max(first);
        first..last
    }

    /// Copy out the time axis and every channel over an index range
    pub(crate) fn slice(&self, range: Range<usize>) -> (Array1<f64>, Vec<(Channel, Array1<f64>)>) {
        let times = self.times.slice(s![range.clone()]).to_owned();
        let channels = self
            .channels
            .iter()
            .map(|(channel, values)| (channel.clone(), values.slice(s![range.clone()]).to_owned()))
            .collect();
        (times, channels)
    }

    /// Readings of `channel` recorded outside every span in `excluded`
    ///
    /// Spans are inclusive `(first, last)` times. The result is the pool of background readings
    /// used to anchor calibration curves.
    ///
    /// # Errors
    /// Returns an upstream error if the channel does not exist.
    pub fn background(&self, channel: &Channel, excluded: &[(f64, f64)]) -> Result<Vec<f64>> {
        let values = self.channel(channel).ok_or_else(|| {
            Error::upstream(RAW_RECORDS, UpstreamError::UnknownChannel(channel.0.clone()))
        })?;

        Ok(self
            .times
            .iter()
            .zip(values.iter())
            .filter(|(t, _)| {
                !excluded
                    .iter()
                    .any(|(first, last)| *t >= first && *t <= last)
            })
            .map(|(_, value)| *value)
            .collect())
    }
}
