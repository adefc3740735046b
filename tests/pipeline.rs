use std::collections::VecDeque;
use std::fs::File;

use tempdir::TempDir;

use peat_trim::config::Config;
use peat_trim::editor::{EditorEvent, Surface, View};
use peat_trim::flux::{Chamber, GasKind, Temperature};
use peat_trim::pipeline::{Analysis, SegmentSpec};
use peat_trim::quantify::AnalysisMode;
use peat_trim::report::{write_segment_detail, write_summary};
use peat_trim::segment::Cut;
use peat_trim::series::{Channel, RawRecords};
use peat_trim::{Error, Result, ValidationError};

/// Replays operator input and remembers what was shown
struct ScriptedSurface {
    events: VecDeque<EditorEvent>,
    shown: Vec<Shown>,
    rejected: Vec<ValidationError>,
}

#[derive(Debug)]
struct Shown {
    index: usize,
    is_last: bool,
    r_squared: Option<f64>,
}

impl ScriptedSurface {
    fn new(events: impl IntoIterator<Item = EditorEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            shown: vec![],
            rejected: vec![],
        }
    }
}

impl Surface for ScriptedSurface {
    fn render(&mut self, view: &View<'_>) {
        self.shown.push(Shown {
            index: view.index,
            is_last: view.is_last,
            r_squared: view.fit.map(|fit| fit.r_squared),
        });
    }

    fn next_event(&mut self) -> Option<EditorEvent> {
        self.events.pop_front()
    }

    fn reject(&mut self, reason: &ValidationError) {
        self.rejected.push(reason.clone());
    }
}

/// Collar 1 rises at 6 ppm/min with a ten second disturbance from 40 s, collar 2 at 3 ppm/min
fn flux_records() -> Result<RawRecords> {
    let times = (0..=200).map(f64::from).collect::<Vec<_>>();
    let co2 = times
        .iter()
        .map(|&t| {
            if (40.0..50.0).contains(&t) {
                450.0
            } else if t < 100.0 {
                0.1f64.mul_add(t, 400.0)
            } else {
                0.05f64.mul_add(t - 100.0, 400.0)
            }
        })
        .collect();
    let h2o = vec![12.0; 201];
    RawRecords::new(
        times,
        vec![(Channel::new("CO2"), co2), (Channel::new("H2O"), h2o)],
    )
}

fn analysis() -> Result<Analysis> {
    Analysis::new(Config {
        mode: AnalysisMode::Slope,
        gas: GasKind::Co2,
        auxiliary_channels: vec![Channel::new("H2O")],
        chamber: Some(Chamber {
            surface_area: 0.1,
            height: 0.2,
        }),
        seed: Some(40),
        ..Config::default()
    })
}

fn specs() -> Vec<SegmentSpec> {
    vec![
        SegmentSpec::flux("collar 1", 0.0, 100.0).with_air_temperature(Temperature::Celsius(20.0)),
        SegmentSpec::flux("collar 2", 100.0, 200.0).with_air_temperature(Temperature::Celsius(20.0)),
    ]
}

/// Drag the markers onto the disturbance, cut it out and move through both segments
fn cut_disturbance() -> Vec<EditorEvent> {
    vec![
        EditorEvent::Press { x: 1.0 },
        EditorEvent::Motion { x: 40.0 },
        EditorEvent::Release,
        EditorEvent::Press { x: 98.0 },
        EditorEvent::Motion { x: 49.0 },
        EditorEvent::Release,
        EditorEvent::Cut,
        EditorEvent::Next,
        EditorEvent::Next,
    ]
}

#[test]
fn operator_cut_restores_the_flux() -> Result<()> {
    let analysis = analysis()?;
    let records = flux_records()?;
    let mut surface = ScriptedSurface::new(cut_disturbance());

    let report = analysis.run(&records, &specs(), &mut surface)?;

    let collar = report.segment("collar 1").unwrap();
    assert_eq!(collar.cuts, vec![Cut { left: 39, right: 50 }]);
    approx::assert_relative_eq!(collar.data_loss, 12.0, max_relative = 1e-12);
    let co2 = &collar.analytes[0];
    approx::assert_relative_eq!(co2.r_squared().unwrap(), 1.0, max_relative = 1e-9);
    approx::assert_relative_eq!(co2.flux.unwrap(), 0.861_572_698, max_relative = 1e-6);
    approx::assert_relative_eq!(collar.temperature.unwrap(), 293.15, max_relative = 1e-12);

    let other = report.segment("collar 2").unwrap();
    assert!(other.cuts.is_empty());
    approx::assert_relative_eq!(
        other.analytes[0].flux.unwrap(),
        0.861_572_698 / 2.0,
        max_relative = 1e-6
    );

    // The disturbance spoils the live fit until it is cut
    assert!(surface.shown[0].r_squared.unwrap() < 0.9);
    let last = surface.shown.last().unwrap();
    assert_eq!(last.index, 1);
    assert!(last.is_last);
    assert!(surface.rejected.is_empty());
    Ok(())
}

#[test]
fn auxiliary_channels_are_spliced_without_offset() -> Result<()> {
    let analysis = analysis()?;
    let records = flux_records()?;
    let mut surface = ScriptedSurface::new(cut_disturbance());

    let report = analysis.run(&records, &specs(), &mut surface)?;

    let alignment = &report.segment("collar 1").unwrap().alignment;
    let (_, h2o) = alignment
        .channels
        .iter()
        .find(|(channel, _)| channel.as_str() == "H2O")
        .unwrap();
    assert!(h2o.offsets.iter().flatten().all(|offset| *offset == 0.0));
    assert_eq!(h2o.pruned.iter().filter(|value| value.is_none()).count(), 12);

    let (_, co2) = &alignment.channels[0];
    // Everything after the cut sits v[50] - v[39] = 1.1 ppm below its recorded value
    approx::assert_relative_eq!(co2.offsets[51].unwrap(), 1.1, max_relative = 1e-9);
    Ok(())
}

#[test]
fn closing_the_surface_produces_no_report() -> Result<()> {
    let analysis = analysis()?;
    let records = flux_records()?;
    let mut surface = ScriptedSurface::new([
        EditorEvent::Press { x: 1.0 },
        EditorEvent::Motion { x: 40.0 },
        EditorEvent::Release,
        EditorEvent::Cut,
        EditorEvent::Close,
    ]);

    let result = analysis.run(&records, &specs(), &mut surface);

    assert!(matches!(result, Err(Error::Aborted)));
    Ok(())
}

#[test]
fn rejected_cut_leaves_the_segment_for_another_try() -> Result<()> {
    let analysis = analysis()?;
    let records = flux_records()?;
    let mut events = vec![EditorEvent::Cut];
    events.extend(cut_disturbance());
    let mut surface = ScriptedSurface::new(events);

    let report = analysis.run(&records, &specs(), &mut surface)?;

    assert_eq!(surface.rejected.len(), 1);
    assert!(matches!(
        surface.rejected[0],
        ValidationError::WholeSeries { len: 100, .. }
    ));
    assert_eq!(report.segment("collar 1").unwrap().cuts.len(), 1);
    Ok(())
}

#[test]
fn reports_are_written_as_csv() -> Result<()> {
    let analysis = analysis()?;
    let records = flux_records()?;
    let mut surface = ScriptedSurface::new(cut_disturbance());
    let report = analysis.run(&records, &specs(), &mut surface)?;

    let working_dir = TempDir::new("reports_are_written_as_csv").unwrap();
    let summary_path = working_dir.path().join("summary.csv");
    write_summary(&report, File::create(&summary_path)?)?;
    let detail_path = working_dir.path().join("collar_1.csv");
    write_segment_detail(report.segment("collar 1").unwrap(), File::create(&detail_path)?)?;

    let mut rdr = csv::Reader::from_path(&summary_path)?;
    let headers = rdr.headers()?.clone();
    let rows = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;
    assert_eq!(rows.len(), 2);
    let flux_column = headers.iter().position(|h| h == "flux").unwrap();
    let flux = rows[0][flux_column].parse::<f64>().unwrap();
    approx::assert_relative_eq!(flux, 0.861_572_698, max_relative = 1e-6);

    let mut rdr = csv::Reader::from_path(&detail_path)?;
    let rows = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;
    assert_eq!(rows.len(), 100);
    // Cut points have no pruned time
    assert_eq!(&rows[45][2], "");
    Ok(())
}
