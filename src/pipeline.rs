use ndarray::ArrayView1;
use ndarray_rand::rand::SeedableRng;
use rand_isaac::Isaac64Rng;
use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationSet, StandardsTable};
use crate::config::{Config, DegeneratePolicy};
use crate::editor::{edit, Surface};
use crate::error::{DegenerateInput, Error, Operation, UpstreamError, ValidationError};
use crate::flux::{chamber_flux, Chamber, Temperature};
use crate::quantify::{quantify, AnalysisMode, Quantity};
use crate::report::{AnalyteResult, BatchReport, ChannelModel, SegmentReport};
use crate::segment::{derive_windows, Segment, SegmentBuilder, Window};
use crate::series::{check_monotonic, Channel, RawRecords, RAW_RECORDS};
use crate::Result;

/// Whether a flux chamber was transparent or covered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightOrDark {
    Light,
    Dark,
}

impl LightOrDark {
    /// Read a field sheet tag, one of `L`, `Light`, `D` or `Dark` in either case
    ///
    /// # Errors
    /// Returns a validation error for any other tag.
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag.trim() {
            "L" | "l" | "Light" | "light" => Ok(Self::Light),
            "D" | "d" | "Dark" | "dark" => Ok(Self::Dark),
            other => Err(ValidationError::MalformedTag(other.to_owned()).into()),
        }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

/// Metadata describing one segment, supplied by the instrument parser
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub name: String,
    /// Seconds on the raw record time axis
    pub start_time: f64,
    /// Sample windows leave this empty and are closed by the next start or the window ceiling
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub light_or_dark: Option<LightOrDark>,
    #[serde(default)]
    pub chamber: Option<Chamber>,
    #[serde(default)]
    pub air_temperature: Option<Temperature>,
}

impl SegmentSpec {
    /// A discrete injection, windowed by its neighbours
    pub fn sample(name: impl Into<String>, start_time: f64) -> Self {
        Self {
            name: name.into(),
            start_time,
            end_time: None,
            light_or_dark: None,
            chamber: None,
            air_temperature: None,
        }
    }

    /// A chamber measurement with its own end time
    pub fn flux(name: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            end_time: Some(end_time),
            ..Self::sample(name, start_time)
        }
    }

    #[must_use]
    pub fn with_light_or_dark(mut self, light_or_dark: LightOrDark) -> Self {
        self.light_or_dark = Some(light_or_dark);
        self
    }

    #[must_use]
    pub fn with_chamber(mut self, chamber: Chamber) -> Self {
        self.chamber = Some(chamber);
        self
    }

    #[must_use]
    pub fn with_air_temperature(mut self, temperature: Temperature) -> Self {
        self.air_temperature = Some(temperature);
        self
    }

    /// The segment name, with the light or dark condition appended
    pub fn label(&self) -> String {
        match self.light_or_dark {
            Some(condition) => format!("{} {}", self.name, condition.suffix()),
            None => self.name.clone(),
        }
    }
}

/// One analysis run over a batch of raw records
pub struct Analysis {
    config: Config,
    standards: StandardsTable,
}

impl Analysis {
    /// # Errors
    /// Returns a validation error if a configured standard tag is malformed.
    pub fn new(config: Config) -> Result<Self> {
        let standards = config.standards_table()?;
        Ok(Self { config, standards })
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Nominal windows for `specs`, in order
    ///
    /// # Errors
    /// Returns an upstream error when there are no records or the start times are not strictly
    /// increasing.
    pub fn windows(&self, records: &RawRecords, specs: &[SegmentSpec]) -> Result<Vec<Window>> {
        let last = records
            .last_time()
            .ok_or_else(|| Error::upstream(RAW_RECORDS, UpstreamError::NoRecords))?;
        let starts = specs.iter().map(|spec| spec.start_time).collect::<Vec<_>>();
        check_monotonic(ArrayView1::from(&starts)).map_err(|kind| {
            let name = match kind {
                UpstreamError::NonMonotonic { index } => specs[index].label(),
                _ => RAW_RECORDS.to_owned(),
            };
            Error::upstream(&name, kind)
        })?;

        Ok(derive_windows(&starts, self.config.window_ceiling, last)
            .into_iter()
            .zip(specs)
            .map(|(derived, spec)| Window {
                start: derived.start,
                end: spec.end_time.unwrap_or(derived.end),
            })
            .collect())
    }

    /// Slice one segment per description out of the raw records
    ///
    /// # Errors
    /// Returns an upstream error for start times out of order or a window reaching outside the
    /// records, and a degenerate input error for a window holding no records.
    pub fn build_segments(
        &self,
        records: &RawRecords,
        specs: &[SegmentSpec],
    ) -> Result<Vec<Segment>> {
        let mut auxiliary = self.config.auxiliary_channels.clone();
        if let Some(temperature) = &self.config.temperature_channel {
            auxiliary.push(temperature.channel.clone());
        }

        let segments = self
            .windows(records, specs)?
            .into_iter()
            .zip(specs)
            .map(|(window, spec)| {
                SegmentBuilder::new(spec.label())
                    .with_auxiliary(&auxiliary)
                    .with_window(window)
                    .build(records)
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!("built {} segments from {} records", segments.len(), records.len());
        Ok(segments)
    }

    /// Build, edit and evaluate a batch
    ///
    /// Blocks on `surface` until the operator has visited every segment.
    ///
    /// # Errors
    /// Returns [`Error::Aborted`] if the operator closes the surface, in which case nothing is
    /// quantified, and any upstream or degenerate input error raised along the way.
    pub fn run<S: Surface>(
        &self,
        records: &RawRecords,
        specs: &[SegmentSpec],
        surface: &mut S,
    ) -> Result<BatchReport> {
        let segments = self.build_segments(records, specs)?;
        let segments = edit(segments, self.config.editor_settings(), surface)?;
        self.evaluate(records, specs, &segments)
    }

    /// Quantify, calibrate and derive the edited segments
    ///
    /// `specs` and `segments` are parallel, as produced by [`Analysis::build_segments`].
    ///
    /// # Errors
    /// Returns an upstream error for mismatched inputs or missing channels, chamber geometry or
    /// temperature, and a degenerate input error unless the configuration skips those.
    pub fn evaluate(
        &self,
        records: &RawRecords,
        specs: &[SegmentSpec],
        segments: &[Segment],
    ) -> Result<BatchReport> {
        if specs.len() != segments.len() {
            return Err(Error::upstream(
                RAW_RECORDS,
                UpstreamError::SegmentCount {
                    specs: specs.len(),
                    segments: segments.len(),
                },
            ));
        }

        let mut rng = match self.config.seed {
            Some(seed) => Isaac64Rng::seed_from_u64(seed),
            None => Isaac64Rng::from_entropy(),
        };
        let species = self.config.species();
        let retained = segments
            .iter()
            .map(Segment::retained_span)
            .collect::<Vec<_>>();

        let mut models = vec![];
        let mut quantities = vec![];
        for analyte in &species {
            let channel = &analyte.channel;
            let column = segments
                .iter()
                .map(|segment| self.measure(segment, channel))
                .collect::<Result<Vec<_>>>()?;

            let measured = segments
                .iter()
                .zip(&column)
                .filter_map(|(segment, quantity)| {
                    quantity.map(|quantity| (segment.name(), quantity.value()))
                })
                .collect::<Vec<_>>();
            let background = records.background(channel, &retained)?;
            let calibration =
                CalibrationSet::build(&measured, channel, &self.standards, &background, &mut rng);
            let model = match calibration.fit(channel, &self.config.fallback_model) {
                Err(error @ Error::Degenerate { .. }) if self.skips_degenerate() => {
                    log::warn!("{error}, using the fallback model");
                    self.config.fallback_model.clone()
                }
                fitted => fitted?,
            };

            models.push(ChannelModel {
                channel: channel.clone(),
                model,
                calibration,
            });
            quantities.push(column);
        }

        let reports = segments
            .iter()
            .zip(specs)
            .enumerate()
            .map(|(ii, (segment, spec))| -> Result<SegmentReport> {
                let conditions = match self.config.mode {
                    AnalysisMode::Slope => Some(self.conditions(segment, spec)?),
                    AnalysisMode::Peak => None,
                };

                let analytes = species
                    .iter()
                    .zip(&models)
                    .zip(&quantities)
                    .map(|((analyte, model), column)| {
                        let quantity = column[ii];
                        let flux = match (quantity, conditions) {
                            (Some(Quantity::Slope(slope)), Some((chamber, temperature))) => Some(
                                chamber_flux(slope.rate_per_minute, analyte, &chamber, temperature),
                            ),
                            _ => None,
                        };
                        AnalyteResult {
                            channel: analyte.channel.clone(),
                            quantity,
                            concentration: quantity.map(|quantity| model.model.apply(quantity.value())),
                            flux,
                        }
                    })
                    .collect();

                Ok(SegmentReport {
                    name: segment.name().to_owned(),
                    window: segment.window(),
                    alignment: segment.alignment(),
                    cuts: segment.cuts().to_vec(),
                    data_loss: segment.data_loss(),
                    retained_span: segment.retained_span(),
                    temperature: conditions.map(|(_, temperature)| temperature.kelvin()),
                    analytes,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        log::info!("evaluated {} segments", reports.len());
        Ok(BatchReport {
            mode: self.config.mode,
            models,
            segments: reports,
        })
    }

    fn skips_degenerate(&self) -> bool {
        self.config.on_degenerate == DegeneratePolicy::Skip
    }

    fn measure(&self, segment: &Segment, channel: &Channel) -> Result<Option<Quantity>> {
        match quantify(segment, channel, self.config.mode) {
            Ok(quantity) => Ok(Some(quantity)),
            Err(error @ Error::Degenerate { .. }) if self.skips_degenerate() => {
                log::warn!("{error}, segment reported without a value");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Chamber geometry and air temperature of a flux segment
    fn conditions(&self, segment: &Segment, spec: &SegmentSpec) -> Result<(Chamber, Temperature)> {
        let chamber = spec
            .chamber
            .or(self.config.chamber)
            .ok_or_else(|| Error::upstream(segment.name(), UpstreamError::MissingChamber))?;

        if let Some(temperature) = spec.air_temperature {
            return Ok((chamber, temperature));
        }
        let source = self
            .config
            .temperature_channel
            .as_ref()
            .ok_or_else(|| Error::upstream(segment.name(), UpstreamError::MissingTemperature))?;
        let mean = segment
            .pruned_channel(&source.channel)
            .ok_or_else(|| {
                Error::upstream(
                    segment.name(),
                    UpstreamError::UnknownChannel(source.channel.0.clone()),
                )
            })?
            .mean()
            .ok_or_else(|| {
                Error::degenerate(
                    segment.name(),
                    Operation::Derivation,
                    DegenerateInput::EmptyWindow,
                )
            })?;

        Ok((chamber, source.scale.reading(mean)))
    }
}
