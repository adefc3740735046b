use std::fmt;

/// Errors raised while trimming, quantifying and calibrating segments
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operator asked for something that cannot be done, nothing was changed
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A derived value could not be computed for one segment
    #[error("segment `{segment}`: {operation} failed: {kind}")]
    Degenerate {
        segment: String,
        operation: Operation,
        kind: DegenerateInput,
    },

    /// The parser handed over data which breaks the input contract
    #[error("segment `{segment}`: {kind}")]
    Upstream {
        segment: String,
        kind: UpstreamError,
    },

    /// The plotting surface was closed before every segment was visited
    #[error("editing aborted by the operator, no report was produced")]
    Aborted,

    #[error("failed to read or write file: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid regular expression: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    pub(crate) fn degenerate(segment: &str, operation: Operation, kind: DegenerateInput) -> Self {
        Self::Degenerate {
            segment: segment.to_owned(),
            operation,
            kind,
        }
    }

    pub(crate) fn upstream(segment: &str, kind: UpstreamError) -> Self {
        Self::Upstream {
            segment: segment.to_owned(),
            kind,
        }
    }

    /// Whether the error can be corrected by the operator without restarting the batch
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error(
        "cut [{left}, {right}] would remove all {len} remaining points, narrow the selection with the two markers"
    )]
    WholeSeries { left: usize, right: usize, len: usize },

    #[error("bounds [{left}, {right}] are not inside the {len} retained points")]
    OutOfBounds { left: usize, right: usize, len: usize },

    #[error("malformed calibration tag `{0}`, expected a number followed by a unit such as `5ppm`")]
    MalformedTag(String),

    #[error("malformed naming pattern `{pattern}` at character {position}")]
    MalformedPattern { pattern: String, position: usize },

    #[error("sample identity has {found} fields but the naming pattern captures {expected}")]
    IdentityDepth { expected: usize, found: usize },
}

/// Inputs for which a least-squares fit or an integral is undefined
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DegenerateInput {
    #[error("at least two points are required, got {0}")]
    TooFewPoints(usize),

    #[error("x has {x} values but y has {y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("all x values are identical")]
    ConstantX,

    #[error("all y values are identical so R² is undefined")]
    ConstantY,

    #[error("the segment window contains no data")]
    EmptyWindow,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum UpstreamError {
    #[error("channel `{channel}` has {len} values but the time axis has {expected}")]
    ChannelLength {
        channel: String,
        len: usize,
        expected: usize,
    },

    #[error("time axis is not strictly increasing at index {index}")]
    NonMonotonic { index: usize },

    #[error("reference time {time} s lies outside the recorded range [{first}, {last}] s")]
    OutOfRange { time: f64, first: f64, last: f64 },

    #[error("no raw records were supplied")]
    NoRecords,

    #[error("unknown channel `{0}`")]
    UnknownChannel(String),

    #[error("{specs} segment descriptions were given for {segments} segments")]
    SegmentCount { specs: usize, segments: usize },

    #[error("no chamber geometry was supplied")]
    MissingChamber,

    #[error("no air temperature was supplied and no temperature channel is configured")]
    MissingTemperature,
}

/// The step of the pipeline an error was raised in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Slicing,
    PeakArea,
    SlopeFit,
    Calibration,
    Derivation,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Slicing => "slicing",
            Self::PeakArea => "peak integration",
            Self::SlopeFit => "slope fit",
            Self::Calibration => "calibration",
            Self::Derivation => "flux derivation",
        };
        f.write_str(name)
    }
}
