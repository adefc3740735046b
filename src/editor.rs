//! The interactive boundary and cut editor
//!
//! One segment is shown at a time with two markers at the extremes of its retained data. The
//! operator drags the markers with the pointer, then confirms a cut (excise the range between
//! the markers) or a trim (keep only that range). Reset restores the original data. Navigating
//! past the last segment ends editing for the whole batch; closing the surface aborts it.
//!
//! The editor is a plain state machine: every event is applied to the segment at the current
//! index, and the markers are re-armed explicitly whenever the index or the data changes.

use crate::error::{Error, ValidationError};
use crate::math::{ols, LinearFit};
use crate::quantify::AnalysisMode;
use crate::segment::Segment;
use crate::series::Channel;
use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    Left,
    Right,
}

/// Marker positions in seconds, `left <= right`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Markers {
    pub left: f64,
    pub right: f64,
}

/// Operator input delivered by the plotting surface
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditorEvent {
    /// Pointer pressed at `x` seconds
    Press { x: f64 },
    /// Pointer moved to `x` seconds
    Motion { x: f64 },
    Release,
    /// Excise the range between the markers
    Cut,
    /// Keep only the range between the markers
    Trim,
    Reset,
    Next,
    Previous,
    /// The plotting surface was closed
    Close,
}

/// What an event did
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// The segment or index changed and the view should be redrawn
    Redraw,
    /// A marker moved
    Moved,
    /// The request was refused and nothing changed
    Rejected(ValidationError),
    Ignored,
    Finished,
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum State {
    Viewing,
    Dragging {
        marker: Marker,
        grabbed_at: f64,
        pressed_at: f64,
    },
    Finished,
    Aborted,
}

#[derive(Clone, Debug)]
pub struct EditorSettings {
    pub mode: AnalysisMode,
    /// Channel whose live fit is shown in slope mode
    pub analyte: Option<Channel>,
    /// How close, in seconds, a press must be to pick up a marker
    pub grab_tolerance: f64,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Peak,
            analyte: None,
            grab_tolerance: 3.0,
        }
    }
}

/// Everything a plotting surface needs to draw the current segment
pub struct View<'a> {
    pub index: usize,
    pub count: usize,
    pub segment: &'a Segment,
    pub markers: Markers,
    /// Advancing from here finishes editing
    pub is_last: bool,
    pub analyte: Option<&'a Channel>,
    /// Live fit of the analyte in slope mode, when one exists
    pub fit: Option<LinearFit<f64>>,
}

/// A plotting surface which shows segments and reports operator input
///
/// `next_event` blocks until the operator acts. Returning `None` means the surface was closed.
pub trait Surface {
    fn render(&mut self, view: &View<'_>);

    fn next_event(&mut self) -> Option<EditorEvent>;

    /// Tell the operator why a request was refused
    fn reject(&mut self, _reason: &ValidationError) {}
}

pub struct Editor {
    segments: Vec<Segment>,
    index: usize,
    markers: Markers,
    state: State,
    settings: EditorSettings,
}

impl Editor {
    pub fn new(segments: Vec<Segment>, settings: EditorSettings) -> Self {
        let state = if segments.is_empty() {
            State::Finished
        } else {
            State::Viewing
        };
        let mut editor = Self {
            segments,
            index: 0,
            markers: Markers {
                left: 0.0,
                right: 0.0,
            },
            state,
            settings,
        };
        editor.arm();
        editor
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn markers(&self) -> Markers {
        self.markers
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub const fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Extremes of the retained data of the current segment
    fn extent(&self) -> Option<(f64, f64)> {
        let times = self.segments.get(self.index)?.pruned().times();
        Some((*times.first()?, *times.last()?))
    }

    /// Put the markers back at the extremes of the current segment
    fn arm(&mut self) {
        if let Some((first, last)) = self.extent() {
            self.markers = Markers {
                left: first,
                right: last,
            };
        }
    }

    pub fn view(&self) -> Option<View<'_>> {
        if !matches!(self.state, State::Viewing | State::Dragging { .. }) {
            return None;
        }
        let segment = self.segments.get(self.index)?;
        let analyte = self.settings.analyte.as_ref();
        let fit = match (self.settings.mode, analyte) {
            (AnalysisMode::Slope, Some(channel)) => segment.pruned_channel(channel).and_then(|values| {
                ols(&segment.pruned().times().to_vec(), &values.to_vec()).ok()
            }),
            _ => None,
        };

        Some(View {
            index: self.index,
            count: self.segments.len(),
            segment,
            markers: self.markers,
            is_last: self.index + 1 == self.segments.len(),
            analyte,
            fit,
        })
    }

    /// Apply one operator event
    ///
    /// # Errors
    /// Validation failures are reported as [`Transition::Rejected`]. Only failures the operator
    /// cannot correct are returned as errors.
    pub fn handle(&mut self, event: EditorEvent) -> Result<Transition> {
        if matches!(self.state, State::Finished | State::Aborted) {
            return Ok(Transition::Ignored);
        }

        let transition = match event {
            EditorEvent::Press { x } => self.press(x),
            EditorEvent::Motion { x } => self.motion(x),
            EditorEvent::Release => {
                let was_dragging = matches!(self.state, State::Dragging { .. });
                self.state = State::Viewing;
                if was_dragging {
                    Transition::Moved
                } else {
                    Transition::Ignored
                }
            }
            EditorEvent::Cut => self.confirm(Segment::cut)?,
            EditorEvent::Trim => self.confirm(Segment::trim)?,
            EditorEvent::Reset => {
                self.state = State::Viewing;
                self.segments[self.index].reset();
                self.arm();
                Transition::Redraw
            }
            EditorEvent::Next => {
                self.state = State::Viewing;
                if self.index + 1 == self.segments.len() {
                    self.state = State::Finished;
                    log::debug!("editing finished after {} segments", self.segments.len());
                    Transition::Finished
                } else {
                    self.index += 1;
                    self.arm();
                    Transition::Redraw
                }
            }
            EditorEvent::Previous => {
                self.state = State::Viewing;
                if self.index == 0 {
                    Transition::Ignored
                } else {
                    self.index -= 1;
                    self.arm();
                    Transition::Redraw
                }
            }
            EditorEvent::Close => {
                self.state = State::Aborted;
                log::debug!("editing aborted on segment {}", self.index);
                Transition::Aborted
            }
        };
        Ok(transition)
    }

    fn press(&mut self, x: f64) -> Transition {
        let Markers { left, right } = self.markers;
        let (marker, position) = if (x - left).abs() <= (x - right).abs() {
            (Marker::Left, left)
        } else {
            (Marker::Right, right)
        };
        if (x - position).abs() < self.settings.grab_tolerance {
            self.state = State::Dragging {
                marker,
                grabbed_at: position,
                pressed_at: x,
            };
        }
        Transition::Ignored
    }

    fn motion(&mut self, x: f64) -> Transition {
        let State::Dragging {
            marker,
            grabbed_at,
            pressed_at,
        } = self.state
        else {
            return Transition::Ignored;
        };
        let Some((first, last)) = self.extent() else {
            return Transition::Ignored;
        };

        let target = grabbed_at + (x - pressed_at);
        match marker {
            Marker::Left => self.markers.left = target.clamp(first, self.markers.right),
            Marker::Right => self.markers.right = target.clamp(self.markers.left, last),
        }
        Transition::Moved
    }

    fn confirm(&mut self, edit: fn(&mut Segment, usize, usize) -> Result<()>) -> Result<Transition> {
        self.state = State::Viewing;
        let segment = &mut self.segments[self.index];
        let left = segment.nearest_index(self.markers.left);
        let right = segment.nearest_index(self.markers.right);

        match edit(segment, left, right) {
            Ok(()) => {
                self.arm();
                Ok(Transition::Redraw)
            }
            Err(Error::Validation(reason)) => {
                log::debug!("{}: edit rejected: {reason}", segment.name());
                Ok(Transition::Rejected(reason))
            }
            Err(error) => Err(error),
        }
    }

    /// Hand back the edited segments
    ///
    /// # Errors
    /// Returns [`Error::Aborted`] unless the operator advanced past the last segment.
    pub fn finish(self) -> Result<Vec<Segment>> {
        match self.state {
            State::Finished => Ok(self.segments),
            _ => Err(Error::Aborted),
        }
    }
}

/// Run the blocking editing loop until every segment has been visited
///
/// # Errors
/// Returns [`Error::Aborted`] if the surface is closed first.
pub fn edit<S: Surface>(
    segments: Vec<Segment>,
    settings: EditorSettings,
    surface: &mut S,
) -> Result<Vec<Segment>> {
    let mut editor = Editor::new(segments, settings);

    while let Some(view) = editor.view() {
        surface.render(&view);
        let event = surface.next_event().unwrap_or(EditorEvent::Close);
        match editor.handle(event)? {
            Transition::Rejected(reason) => surface.reject(&reason),
            Transition::Finished | Transition::Aborted => break,
            Transition::Redraw | Transition::Moved | Transition::Ignored => {}
        }
    }

    editor.finish()
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;

    use super::{edit, Editor, EditorEvent, EditorSettings, Surface, Transition, View};
    use crate::error::{Error, ValidationError};
    use crate::quantify::AnalysisMode;
    use crate::segment::{ChannelRole, Segment, Window};
    use crate::series::Channel;

    fn segment(name: &str, n: usize) -> Segment {
        let times = (0..n).map(|i| i as f64).collect::<Vec<_>>();
        let values = times.iter().map(|t| 3.0 * t + 1.0).collect();
        Segment::from_series(
            name,
            Window {
                start: 0.0,
                end: n as f64,
            },
            times,
            vec![(Channel::new("CO2"), ChannelRole::Analyte, values)],
        )
        .unwrap()
    }

    struct Scripted {
        events: VecDeque<EditorEvent>,
        rendered: Vec<(usize, bool)>,
        rejected: Vec<ValidationError>,
    }

    impl Scripted {
        fn new(events: impl IntoIterator<Item = EditorEvent>) -> Self {
            Self {
                events: events.into_iter().collect(),
                rendered: vec![],
                rejected: vec![],
            }
        }
    }

    impl Surface for Scripted {
        fn render(&mut self, view: &View<'_>) {
            self.rendered.push((view.index, view.is_last));
        }

        fn next_event(&mut self) -> Option<EditorEvent> {
            self.events.pop_front()
        }

        fn reject(&mut self, reason: &ValidationError) {
            self.rejected.push(reason.clone());
        }
    }

    #[test]
    fn markers_start_at_the_extremes() {
        let editor = Editor::new(vec![segment("a", 10)], EditorSettings::default());
        assert_eq!(editor.markers().left, 0.0);
        assert_eq!(editor.markers().right, 9.0);
    }

    #[test]
    fn dragged_markers_are_clamped() {
        let mut editor = Editor::new(vec![segment("a", 10)], EditorSettings::default());

        editor.handle(EditorEvent::Press { x: 1.0 }).unwrap();
        assert_eq!(
            editor.handle(EditorEvent::Motion { x: -20.0 }).unwrap(),
            Transition::Moved
        );
        assert_eq!(editor.markers().left, 0.0);

        editor.handle(EditorEvent::Motion { x: 50.0 }).unwrap();
        assert_eq!(editor.markers().left, 9.0);
        editor.handle(EditorEvent::Release).unwrap();

        // Both markers sit at the end, a tie picks up the left one
        editor.handle(EditorEvent::Press { x: 8.5 }).unwrap();
        editor.handle(EditorEvent::Motion { x: 2.5 }).unwrap();
        editor.handle(EditorEvent::Release).unwrap();
        assert_eq!(editor.markers().left, 3.0);

        editor.handle(EditorEvent::Press { x: 8.9 }).unwrap();
        editor.handle(EditorEvent::Motion { x: 0.0 }).unwrap();
        assert_eq!(editor.markers().right, 3.0);
    }

    #[test]
    fn press_far_from_a_marker_does_not_drag() {
        let mut editor = Editor::new(vec![segment("a", 20)], EditorSettings::default());
        editor.handle(EditorEvent::Press { x: 10.0 }).unwrap();
        assert_eq!(
            editor.handle(EditorEvent::Motion { x: 12.0 }).unwrap(),
            Transition::Ignored
        );
        assert_eq!(editor.markers().left, 0.0);
        assert_eq!(editor.markers().right, 19.0);
    }

    #[test]
    fn cut_between_dragged_markers() {
        let mut editor = Editor::new(vec![segment("a", 10)], EditorSettings::default());
        editor.handle(EditorEvent::Press { x: 0.0 }).unwrap();
        editor.handle(EditorEvent::Motion { x: 3.2 }).unwrap();
        editor.handle(EditorEvent::Release).unwrap();
        editor.handle(EditorEvent::Press { x: 9.0 }).unwrap();
        editor.handle(EditorEvent::Motion { x: 5.9 }).unwrap();
        editor.handle(EditorEvent::Release).unwrap();

        assert_eq!(
            editor.handle(EditorEvent::Cut).unwrap(),
            Transition::Redraw
        );

        let segment = &editor.segments()[0];
        assert_eq!(segment.len(), 6);
        assert_eq!(segment.cuts()[0].left, 3);
        assert_eq!(segment.cuts()[0].right, 6);
        // Markers are re-armed on the spliced data
        assert_eq!(editor.markers().right, 6.0);
    }

    #[test]
    fn cutting_everything_is_rejected_and_state_is_kept() {
        let mut editor = Editor::new(vec![segment("a", 5)], EditorSettings::default());
        let transition = editor.handle(EditorEvent::Cut).unwrap();

        assert_eq!(
            transition,
            Transition::Rejected(ValidationError::WholeSeries {
                left: 0,
                right: 4,
                len: 5
            })
        );
        assert_eq!(editor.segments()[0].len(), 5);
        assert!(!editor.is_finished());
    }

    #[test]
    fn navigation_re_arms_markers() {
        let mut editor = Editor::new(
            vec![segment("a", 10), segment("b", 4)],
            EditorSettings::default(),
        );
        assert_eq!(editor.handle(EditorEvent::Previous).unwrap(), Transition::Ignored);
        editor.handle(EditorEvent::Next).unwrap();
        assert_eq!(editor.index(), 1);
        assert_eq!(editor.markers().right, 3.0);
        editor.handle(EditorEvent::Previous).unwrap();
        assert_eq!(editor.markers().right, 9.0);
    }

    #[test]
    fn scripted_session_trims_resets_and_finishes() {
        let mut surface = Scripted::new([
            EditorEvent::Cut,
            EditorEvent::Press { x: 0.0 },
            EditorEvent::Motion { x: 2.0 },
            EditorEvent::Release,
            EditorEvent::Trim,
            EditorEvent::Next,
            EditorEvent::Press { x: 8.0 },
            EditorEvent::Motion { x: 6.0 },
            EditorEvent::Release,
            EditorEvent::Cut,
            EditorEvent::Reset,
            EditorEvent::Next,
        ]);

        let segments = edit(
            vec![segment("a", 6), segment("b", 10)],
            EditorSettings::default(),
            &mut surface,
        )
        .unwrap();

        assert_eq!(surface.rejected.len(), 1);
        assert_eq!(segments[0].pruned().times().to_vec(), vec![2., 3., 4., 5.]);
        assert!(segments[1].cuts().is_empty());
        assert_eq!(segments[1].len(), 10);
        assert!(surface.rendered.contains(&(1, true)));
    }

    #[test]
    fn closing_the_surface_aborts() {
        let mut surface = Scripted::new([EditorEvent::Cut, EditorEvent::Next]);
        let result = edit(
            vec![segment("a", 6), segment("b", 6)],
            EditorSettings::default(),
            &mut surface,
        );
        assert!(matches!(result, Err(Error::Aborted)));
    }

    #[test]
    fn slope_mode_views_carry_a_live_fit() {
        let editor = Editor::new(
            vec![segment("a", 10)],
            EditorSettings {
                mode: AnalysisMode::Slope,
                analyte: Some(Channel::new("CO2")),
                ..EditorSettings::default()
            },
        );
        let fit = editor.view().unwrap().fit.unwrap();
        approx::assert_relative_eq!(fit.slope, 3.0);
        approx::assert_relative_eq!(fit.r_squared, 1.0);
    }

    #[test]
    fn events_after_finishing_are_ignored() {
        let mut editor = Editor::new(vec![segment("a", 3)], EditorSettings::default());
        assert_eq!(editor.handle(EditorEvent::Next).unwrap(), Transition::Finished);
        assert_eq!(editor.handle(EditorEvent::Cut).unwrap(), Transition::Ignored);
        assert!(editor.view().is_none());
        assert_eq!(editor.finish().unwrap().len(), 1);
    }
}
