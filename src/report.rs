//! Results handed to report rendering, and flat CSV tables of them

use std::io::Write;

use serde::Serialize;

use crate::calibration::{CalibrationSet, LinearModel};
use crate::identity::SampleTable;
use crate::quantify::{AnalysisMode, Quantity};
use crate::segment::{Alignment, Cut, Window};
use crate::series::Channel;
use crate::Result;

/// Results for one analyte channel of one segment
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyteResult {
    pub channel: Channel,
    /// `None` when the segment could not be quantified and degenerate segments are skipped
    pub quantity: Option<Quantity>,
    /// Quantity mapped through the channel's calibration curve
    pub concentration: Option<f64>,
    /// Mass flux in g m⁻² d⁻¹, slope mode only
    pub flux: Option<f64>,
}

impl AnalyteResult {
    pub fn r_squared(&self) -> Option<f64> {
        self.quantity.as_ref().and_then(Quantity::r_squared)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SegmentReport {
    pub name: String,
    pub window: Window,
    /// Original and pruned series with per-index offsets
    pub alignment: Alignment,
    pub cuts: Vec<Cut>,
    /// Percentage of the original points removed
    pub data_loss: f64,
    /// Original times of the first and last retained points
    pub retained_span: (f64, f64),
    /// Chamber air temperature in kelvin, slope mode only
    pub temperature: Option<f64>,
    pub analytes: Vec<AnalyteResult>,
}

/// The calibration of one analyte channel
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChannelModel {
    pub channel: Channel,
    pub model: LinearModel,
    pub calibration: CalibrationSet,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BatchReport {
    pub mode: AnalysisMode,
    pub models: Vec<ChannelModel>,
    pub segments: Vec<SegmentReport>,
}

impl BatchReport {
    pub fn model(&self, channel: &Channel) -> Option<&LinearModel> {
        self.models
            .iter()
            .find(|model| &model.channel == channel)
            .map(|model| &model.model)
    }

    pub fn segment(&self, name: &str) -> Option<&SegmentReport> {
        self.segments.iter().find(|segment| segment.name == name)
    }
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    segment: &'a str,
    channel: &'a str,
    start: f64,
    end: f64,
    points: usize,
    data_loss: f64,
    cuts: usize,
    area: Option<f64>,
    rate_per_minute: Option<f64>,
    r_squared: Option<f64>,
    concentration: Option<f64>,
    flux: Option<f64>,
    temperature: Option<f64>,
}

/// One row per segment and analyte
///
/// # Errors
/// Returns an error if the writer fails.
pub fn write_summary<W: Write>(report: &BatchReport, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for segment in &report.segments {
        let points = segment.alignment.time.pruned.iter().flatten().count();
        for analyte in &segment.analytes {
            let (area, rate_per_minute) = match analyte.quantity {
                Some(Quantity::PeakArea(peak)) => (Some(peak.area), None),
                Some(Quantity::Slope(slope)) => (None, Some(slope.rate_per_minute)),
                None => (None, None),
            };
            wtr.serialize(SummaryRow {
                segment: &segment.name,
                channel: analyte.channel.as_str(),
                start: segment.window.start,
                end: segment.window.end,
                points,
                data_loss: segment.data_loss,
                cuts: segment.cuts.len(),
                area,
                rate_per_minute,
                r_squared: analyte.r_squared(),
                concentration: analyte.concentration,
                flux: analyte.flux,
                temperature: segment.temperature,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| v.to_string())
}

/// One row per original index of a segment, with empty cells where points were cut
///
/// # Errors
/// Returns an error if the writer fails.
pub fn write_segment_detail<W: Write>(segment: &SegmentReport, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let alignment = &segment.alignment;

    let mut header = vec![
        "index".to_owned(),
        "time".to_owned(),
        "time_pruned".to_owned(),
        "time_offset".to_owned(),
    ];
    for (channel, _) in &alignment.channels {
        header.push(channel.to_string());
        header.push(format!("{channel}_pruned"));
        header.push(format!("{channel}_offset"));
    }
    wtr.write_record(&header)?;

    for (ii, time) in alignment.time.original.iter().enumerate() {
        let mut row = vec![
            ii.to_string(),
            time.to_string(),
            cell(alignment.time.pruned[ii]),
            cell(alignment.time.offsets[ii]),
        ];
        for (_, series) in &alignment.channels {
            row.push(series.original[ii].to_string());
            row.push(cell(series.pruned[ii]));
            row.push(cell(series.offsets[ii]));
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// The sample rows of a table under `field_names`, then one column per channel and the source
///
/// Missing field names are filled with `field_<n>`.
///
/// # Errors
/// Returns an error if the writer fails.
pub fn write_sample_table<W: Write>(
    table: &SampleTable,
    field_names: &[&str],
    writer: W,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let header = (0..table.depth())
        .map(|ii| {
            field_names
                .get(ii)
                .map_or_else(|| format!("field_{}", ii + 1), |name| (*name).to_owned())
        })
        .chain(table.columns().iter().map(Channel::to_string))
        .chain(std::iter::once("source".to_owned()))
        .collect::<Vec<_>>();
    wtr.write_record(&header)?;

    for row in table.rows() {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{write_sample_table, write_segment_detail, write_summary, AnalyteResult};
    use super::{BatchReport, SegmentReport};
    use crate::identity::{NamingPattern, SampleTable};
    use crate::quantify::{AnalysisMode, PeakArea, Quantity};
    use crate::segment::{ChannelRole, Segment, Window};
    use crate::series::Channel;

    fn segment_report() -> SegmentReport {
        let mut segment = Segment::from_series(
            "5ppm",
            Window { start: 0., end: 4. },
            vec![0., 1., 2., 3.],
            vec![(Channel::new("CH4"), ChannelRole::Analyte, vec![1., 2., 4., 8.])],
        )
        .unwrap();
        segment.cut(1, 1).unwrap();

        SegmentReport {
            name: segment.name().to_owned(),
            window: segment.window(),
            alignment: segment.alignment(),
            cuts: segment.cuts().to_vec(),
            data_loss: segment.data_loss(),
            retained_span: segment.retained_span(),
            temperature: None,
            analytes: vec![AnalyteResult {
                channel: Channel::new("CH4"),
                quantity: Some(Quantity::PeakArea(PeakArea {
                    area: 6.0,
                    baseline: 1.0,
                })),
                concentration: Some(0.6),
                flux: None,
            }],
        }
    }

    #[test]
    fn summary_has_one_row_per_analyte() {
        let report = BatchReport {
            mode: AnalysisMode::Peak,
            models: vec![],
            segments: vec![segment_report()],
        };
        let mut buffer = vec![];
        write_summary(&report, &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(
            lines[0],
            "segment,channel,start,end,points,data_loss,cuts,area,rate_per_minute,r_squared,concentration,flux,temperature"
        );
        assert_eq!(lines.len(), 2);
        let fields = lines[1].split(',').collect::<Vec<_>>();
        assert_eq!(fields.len(), 13);
        assert_eq!(&fields[..2], &["5ppm", "CH4"]);
        assert_eq!(fields[4], "3");
        approx::assert_relative_eq!(fields[5].parse::<f64>().unwrap(), 25.0);
        approx::assert_relative_eq!(fields[7].parse::<f64>().unwrap(), 6.0);
        assert_eq!(fields[8], "");
        approx::assert_relative_eq!(fields[10].parse::<f64>().unwrap(), 0.6);
        assert_eq!(fields[12], "");
    }

    #[test]
    fn detail_leaves_cut_points_empty() {
        let mut buffer = vec![];
        write_segment_detail(&segment_report(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(
            lines[0],
            "index,time,time_pruned,time_offset,CH4,CH4_pruned,CH4_offset"
        );
        assert_eq!(lines[1], "0,0,0,0,1,1,0");
        assert_eq!(lines[2], "1,1,,,2,,");
        // A single point cut has no width, so nothing after it shifts
        assert_eq!(lines[3], "2,2,2,0,4,4,0");
    }

    #[test]
    fn sample_table_header_names_fields() {
        let pattern = NamingPattern::parse("(s)-(d)").unwrap();
        let mut table = SampleTable::new(vec![Channel::new("CH4")], &pattern);
        table
            .insert(pattern.identify("C1-10").unwrap(), &Channel::new("CH4"), 2.5, "a.pdf")
            .unwrap();

        let mut buffer = vec![];
        write_sample_table(&table, &["collar"], &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        assert_eq!(text, "collar,field_2,CH4,source\nC,10,2.5,a.pdf\n");
    }
}
