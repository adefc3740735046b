//! Batch tables for discrete samples named by a field pattern
//!
//! Gas chromatograph runs report one concentration per sample and gas. Sample names encode
//! their grouping, for example `C3-L-15` for collar 3, light chamber, 15 minutes. An operator
//! describes the layout with a short pattern such as `(s d)-(s)-(d)` and every captured field
//! becomes one level of the sample identity.
//!
//! Pattern characters:
//! - `s` a run of non-digits
//! - `d` a number, optionally with a decimal part
//! - `x` anything
//! - `-` a run of spaces, underscores or hyphens
//! - `(` and `)` delimit a captured field
//! - whitespace matches itself

use std::collections::BTreeMap;

use itertools::Itertools;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, UpstreamError, ValidationError};
use crate::math::ols;
use crate::series::Channel;
use crate::Result;

/// A compiled sample naming pattern
#[derive(Clone, Debug)]
pub struct NamingPattern {
    pattern: String,
    regex: Regex,
    fields: usize,
}

impl NamingPattern {
    /// # Errors
    /// Returns a validation error for unknown characters, unbalanced or nested parentheses, or a
    /// pattern without any captured field.
    pub fn parse(pattern: &str) -> Result<Self> {
        let malformed = |position| ValidationError::MalformedPattern {
            pattern: pattern.to_owned(),
            position,
        };

        let mut translated = String::new();
        let mut open = false;
        let mut fields = 0;
        for (position, token) in pattern.to_lowercase().chars().enumerate() {
            match token {
                's' => translated.push_str(r"\D+"),
                'd' => translated.push_str(r"\d+(?:\.\d+)?"),
                'x' => translated.push_str(".+"),
                '-' => translated.push_str(r"[\s_-]+"),
                '(' if !open => {
                    open = true;
                    fields += 1;
                    translated.push('(');
                }
                ')' if open => {
                    open = false;
                    translated.push(')');
                }
                c if c.is_whitespace() => translated.push_str(r"\s"),
                _ => return Err(malformed(position).into()),
            }
        }
        if open || fields == 0 {
            return Err(malformed(pattern.chars().count()).into());
        }

        Ok(Self {
            pattern: pattern.to_owned(),
            regex: Regex::new(&translated)?,
            fields,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Number of captured fields, the depth of every identity this pattern produces
    pub const fn fields(&self) -> usize {
        self.fields
    }

    /// Split a sample name into its identity, `None` if the name does not follow the pattern
    pub fn identify(&self, name: &str) -> Option<SampleIdentity> {
        let captures = self.regex.captures(name)?;
        let fields = captures
            .iter()
            .skip(1)
            .map(|field| field.map(|m| m.as_str().trim().to_owned()))
            .collect::<Option<Vec<_>>>()?;
        Some(SampleIdentity(fields))
    }
}

/// Ordered grouping fields of one sample, outermost first
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SampleIdentity(pub Vec<String>);

impl SampleIdentity {
    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// Every field but the last, the identity of the group the sample belongs to
    pub fn group(&self) -> &[String] {
        match self.0.split_last() {
            Some((_, group)) => group,
            None => &[],
        }
    }

    /// The last field
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

/// One value per column and the file the values came from
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SampleRecord {
    pub values: Vec<Option<f64>>,
    pub source: String,
}

impl SampleRecord {
    fn empty(columns: usize, source: &str) -> Self {
        Self {
            values: vec![None; columns],
            source: source.to_owned(),
        }
    }
}

/// Rate of change of one column over the samples of a group
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GroupRate {
    /// Concentration units per minute
    pub rate_per_minute: f64,
    pub r_squared: f64,
}

/// Rates for one group, `None` where the column could not be fitted
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupFlux {
    pub group: Vec<String>,
    pub rates: Vec<Option<GroupRate>>,
}

/// Flat table of sample and standard results, filled by explicit insertion
#[derive(Clone, Debug)]
pub struct SampleTable {
    columns: Vec<Channel>,
    depth: usize,
    samples: BTreeMap<SampleIdentity, SampleRecord>,
    standards: BTreeMap<String, Vec<SampleRecord>>,
}

impl SampleTable {
    pub fn new(columns: Vec<Channel>, pattern: &NamingPattern) -> Self {
        Self {
            columns,
            depth: pattern.fields(),
            samples: BTreeMap::new(),
            standards: BTreeMap::new(),
        }
    }

    pub fn columns(&self) -> &[Channel] {
        &self.columns
    }

    pub const fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, identity: &SampleIdentity) -> Option<&SampleRecord> {
        self.samples.get(identity)
    }

    fn column(&self, channel: &Channel) -> Result<usize> {
        self.columns.iter().position(|c| c == channel).ok_or_else(|| {
            Error::upstream(
                "sample table",
                UpstreamError::UnknownChannel(channel.0.clone()),
            )
        })
    }

    /// Store one value of a sample, creating its record on first sight
    ///
    /// # Errors
    /// Returns a validation error for an identity whose depth differs from the naming pattern and
    /// an upstream error for a column the table does not have.
    pub fn insert(
        &mut self,
        identity: SampleIdentity,
        channel: &Channel,
        value: f64,
        source: &str,
    ) -> Result<()> {
        if identity.0.len() != self.depth {
            return Err(ValidationError::IdentityDepth {
                expected: self.depth,
                found: identity.0.len(),
            }
            .into());
        }
        let column = self.column(channel)?;
        let width = self.columns.len();
        let record = self
            .samples
            .entry(identity)
            .or_insert_with(|| SampleRecord::empty(width, source));
        record.values[column] = Some(value);
        record.source = source.to_owned();
        Ok(())
    }

    /// Store one value of a standard injection under its tag with spaces removed
    ///
    /// A standard may be injected many times per run. The value joins the latest injection of the
    /// tag from the same source unless that injection already has a value for the column.
    ///
    /// # Errors
    /// Returns an upstream error for a column the table does not have.
    pub fn insert_standard(
        &mut self,
        tag: &str,
        channel: &Channel,
        value: f64,
        source: &str,
    ) -> Result<()> {
        let column = self.column(channel)?;
        let width = self.columns.len();
        let key = tag.split_whitespace().collect::<String>();
        let injections = self.standards.entry(key).or_default();

        match injections.last_mut() {
            Some(last) if last.source == source && last.values[column].is_none() => {
                last.values[column] = Some(value);
            }
            _ => {
                let mut record = SampleRecord::empty(width, source);
                record.values[column] = Some(value);
                injections.push(record);
            }
        }
        Ok(())
    }

    pub const fn standards(&self) -> &BTreeMap<String, Vec<SampleRecord>> {
        &self.standards
    }

    /// Fit every column of every group against the last identity field, read as minutes
    ///
    /// Samples whose last field is not a number are left out. A column which cannot be fitted
    /// in a group, because it has too few values or no spread, gets no rate.
    pub fn group_flux(&self) -> Vec<GroupFlux> {
        self.samples
            .iter()
            .filter_map(|(identity, record)| {
                let Some(minutes) = identity.leaf().and_then(|leaf| leaf.parse::<f64>().ok()) else {
                    log::warn!("sample {:?} has no time field, skipped in flux", identity.0);
                    return None;
                };
                Some((identity.group().to_vec(), (minutes, record)))
            })
            .into_group_map()
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|(group, samples)| {
                let rates = (0..self.columns.len())
                    .map(|column| {
                        let (x, y): (Vec<_>, Vec<_>) = samples
                            .iter()
                            .filter_map(|(minutes, record)| {
                                record.values[column].map(|value| (*minutes, value))
                            })
                            .unzip();
                        ols(&x, &y).ok().map(|fit| GroupRate {
                            rate_per_minute: fit.slope,
                            r_squared: fit.r_squared,
                        })
                    })
                    .collect();
                GroupFlux { group, rates }
            })
            .collect()
    }

    /// One row per sample: identity fields, then one cell per column, then the source
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.samples
            .iter()
            .map(|(identity, record)| {
                identity
                    .0
                    .iter()
                    .cloned()
                    .chain(
                        record
                            .values
                            .iter()
                            .map(|value| value.map_or_else(String::new, |v| v.to_string())),
                    )
                    .chain(std::iter::once(record.source.clone()))
                    .collect()
            })
            .collect()
    }
}
