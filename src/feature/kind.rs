use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CameraError, Result};

/// The control types a GenICam node map exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    Integer,
    Float,
    String,
    Bool,
    Enum,
    Command,
    Buffer,
}

impl FeatureKind {
    /// Kinds that carry a value (everything except commands).
    pub const VALUED: [FeatureKind; 6] = [
        FeatureKind::Integer,
        FeatureKind::Float,
        FeatureKind::String,
        FeatureKind::Bool,
        FeatureKind::Enum,
        FeatureKind::Buffer,
    ];
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeatureKind::Integer => "integer",
            FeatureKind::Float => "float",
            FeatureKind::String => "string",
            FeatureKind::Bool => "bool",
            FeatureKind::Enum => "enum",
            FeatureKind::Command => "command",
            FeatureKind::Buffer => "buffer",
        };
        f.write_str(name)
    }
}

/// A named, typed device control. Declared once, never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FeatureDescriptor {
    name: Cow<'static, str>,
    kind: FeatureKind,
}

impl FeatureDescriptor {
    pub const fn new(name: &'static str, kind: FeatureKind) -> Self {
        Self {
            name: Cow::Borrowed(name),
            kind,
        }
    }

    pub fn owned(name: impl Into<String>, kind: FeatureKind) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }
}

impl fmt::Display for FeatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// One entry of an enumeration control.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumEntry {
    pub value: i64,
    pub symbolic: String,
}

impl EnumEntry {
    pub fn new(value: i64, symbolic: impl Into<String>) -> Self {
        Self {
            value,
            symbolic: symbolic.into(),
        }
    }
}

/// How an enumeration control is selected on write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnumSelection {
    Symbolic(String),
    Value(i64),
}

/// A value read from, or written to, a device control.
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureValue {
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Enum(EnumEntry),
    Buffer(Vec<u8>),
}

impl FeatureValue {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureValue::Integer(_) => FeatureKind::Integer,
            FeatureValue::Float(_) => FeatureKind::Float,
            FeatureValue::String(_) => FeatureKind::String,
            FeatureValue::Bool(_) => FeatureKind::Bool,
            FeatureValue::Enum(_) => FeatureKind::Enum,
            FeatureValue::Buffer(_) => FeatureKind::Buffer,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FeatureValue::Integer(v) => Some(*v),
            FeatureValue::Enum(entry) => Some(entry.value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Float(v) => Some(*v),
            FeatureValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FeatureValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String value, or the symbolic of an enum entry.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::String(v) => Some(v),
            FeatureValue::Enum(entry) => Some(&entry.symbolic),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Integer(v) => write!(f, "{v}"),
            FeatureValue::Float(v) => write!(f, "{v}"),
            FeatureValue::String(v) => f.write_str(v),
            FeatureValue::Bool(v) => write!(f, "{v}"),
            FeatureValue::Enum(entry) => write!(f, "{} ({})", entry.symbolic, entry.value),
            FeatureValue::Buffer(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

/// Loosely typed input to `set`, coerced to the control's declared kind.
#[derive(Clone, Debug, PartialEq)]
pub enum SetValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl From<i64> for SetValue {
    fn from(v: i64) -> Self {
        SetValue::Integer(v)
    }
}

impl From<i32> for SetValue {
    fn from(v: i32) -> Self {
        SetValue::Integer(v as i64)
    }
}

impl From<u32> for SetValue {
    fn from(v: u32) -> Self {
        SetValue::Integer(v as i64)
    }
}

impl From<f64> for SetValue {
    fn from(v: f64) -> Self {
        SetValue::Float(v)
    }
}

impl From<bool> for SetValue {
    fn from(v: bool) -> Self {
        SetValue::Bool(v)
    }
}

impl From<&str> for SetValue {
    fn from(v: &str) -> Self {
        SetValue::Text(v.to_string())
    }
}

impl From<String> for SetValue {
    fn from(v: String) -> Self {
        SetValue::Text(v)
    }
}

impl From<Vec<u8>> for SetValue {
    fn from(v: Vec<u8>) -> Self {
        SetValue::Bytes(v)
    }
}

/// A coerced value ready to be written to the device.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteValue {
    Integer(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Enum(EnumSelection),
    Buffer(Vec<u8>),
}

/// Coerce caller input to the declared kind of `name`.
///
/// Integers truncate floats, floats widen integers, strings accept anything
/// printable, bools accept the usual textual spellings and non-zero numbers.
/// Enums pass the selection through untouched.
pub fn coerce(name: &str, kind: FeatureKind, value: SetValue) -> Result<WriteValue> {
    let coerced = match (kind, value) {
        (FeatureKind::Integer, SetValue::Integer(v)) => WriteValue::Integer(v),
        (FeatureKind::Integer, SetValue::Float(v)) => {
            if !v.is_finite() {
                return Err(CameraError::invalid_value(name, "not a finite number"));
            }
            WriteValue::Integer(v.trunc() as i64)
        }
        (FeatureKind::Integer, SetValue::Bool(v)) => WriteValue::Integer(v as i64),
        (FeatureKind::Integer, SetValue::Text(s)) => WriteValue::Integer(
            s.trim()
                .parse()
                .map_err(|_| CameraError::invalid_value(name, format!("'{s}' is not an integer")))?,
        ),

        (FeatureKind::Float, SetValue::Float(v)) => WriteValue::Float(v),
        (FeatureKind::Float, SetValue::Integer(v)) => WriteValue::Float(v as f64),
        (FeatureKind::Float, SetValue::Bool(v)) => WriteValue::Float(if v { 1.0 } else { 0.0 }),
        (FeatureKind::Float, SetValue::Text(s)) => WriteValue::Float(
            s.trim()
                .parse()
                .map_err(|_| CameraError::invalid_value(name, format!("'{s}' is not a number")))?,
        ),

        (FeatureKind::String, SetValue::Text(s)) => WriteValue::String(s),
        (FeatureKind::String, SetValue::Integer(v)) => WriteValue::String(v.to_string()),
        (FeatureKind::String, SetValue::Float(v)) => WriteValue::String(v.to_string()),
        (FeatureKind::String, SetValue::Bool(v)) => WriteValue::String(v.to_string()),

        (FeatureKind::Bool, SetValue::Bool(v)) => WriteValue::Bool(v),
        (FeatureKind::Bool, SetValue::Integer(v)) => WriteValue::Bool(v != 0),
        (FeatureKind::Bool, SetValue::Float(v)) => WriteValue::Bool(v != 0.0),
        (FeatureKind::Bool, SetValue::Text(s)) => WriteValue::Bool(parse_bool(name, &s)?),

        (FeatureKind::Enum, SetValue::Text(s)) => WriteValue::Enum(EnumSelection::Symbolic(s)),
        (FeatureKind::Enum, SetValue::Integer(v)) => WriteValue::Enum(EnumSelection::Value(v)),

        (FeatureKind::Buffer, SetValue::Bytes(data)) => WriteValue::Buffer(data),

        (FeatureKind::Command, _) => {
            return Err(CameraError::invalid_value(
                name,
                "command features carry no value; use send_command",
            ))
        }
        (kind, value) => {
            return Err(CameraError::invalid_value(
                name,
                format!("cannot write {value:?} to a {kind} feature"),
            ))
        }
    };
    Ok(coerced)
}

fn parse_bool(name: &str, s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(CameraError::invalid_value(
            name,
            format!("'{other}' is not a boolean"),
        )),
    }
}

/// Range of legal values for a control.
#[derive(Clone, Debug, PartialEq)]
pub enum FeatureRange {
    Integer { min: i64, max: i64, inc: i64 },
    Float {
        min: f64,
        max: f64,
        inc: Option<f64>,
        unit: String,
    },
    Enum(Vec<EnumEntry>),
}

impl FeatureRange {
    /// `(min, max, step)` for numeric ranges.
    pub fn bounds(&self) -> Option<(f64, f64, Option<f64>)> {
        match self {
            FeatureRange::Integer { min, max, inc } => {
                Some((*min as f64, *max as f64, Some(*inc as f64)))
            }
            FeatureRange::Float { min, max, inc, .. } => Some((*min, *max, *inc)),
            FeatureRange::Enum(_) => None,
        }
    }

    /// Enum entries, for enumeration ranges.
    pub fn entries(&self) -> &[EnumEntry] {
        match self {
            FeatureRange::Enum(entries) => entries,
            _ => &[],
        }
    }

    pub fn contains_symbolic(&self, symbolic: &str) -> bool {
        self.entries().iter().any(|e| e.symbolic == symbolic)
    }
}

impl fmt::Display for FeatureRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureRange::Integer { min, max, inc } => write!(f, "[{min}..{max} step {inc}]"),
            FeatureRange::Float { min, max, inc, unit } => {
                write!(f, "[{min}..{max}")?;
                if let Some(inc) = inc {
                    write!(f, " step {inc}")?;
                }
                if unit.is_empty() {
                    f.write_str("]")
                } else {
                    write!(f, "] {unit}")
                }
            }
            FeatureRange::Enum(entries) => {
                let names: Vec<&str> = entries.iter().map(|e| e.symbolic.as_str()).collect();
                write!(f, "{{{}}}", names.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_truncate_floats_and_parse_text() {
        assert_eq!(
            coerce("BinningHorizontal", FeatureKind::Integer, 4.9.into()).unwrap(),
            WriteValue::Integer(4)
        );
        assert_eq!(
            coerce("BinningHorizontal", FeatureKind::Integer, " 2 ".into()).unwrap(),
            WriteValue::Integer(2)
        );
        assert!(matches!(
            coerce("BinningHorizontal", FeatureKind::Integer, "two".into()),
            Err(CameraError::InvalidValue { .. })
        ));
        assert!(coerce("BinningHorizontal", FeatureKind::Integer, f64::NAN.into()).is_err());
    }

    #[test]
    fn floats_widen_integers() {
        assert_eq!(
            coerce("ExposureTime", FeatureKind::Float, 10_000i64.into()).unwrap(),
            WriteValue::Float(10_000.0)
        );
    }

    #[test]
    fn enums_pass_selection_through() {
        assert_eq!(
            coerce("TriggerMode", FeatureKind::Enum, "On".into()).unwrap(),
            WriteValue::Enum(EnumSelection::Symbolic("On".into()))
        );
        assert_eq!(
            coerce("FFCBlockSize", FeatureKind::Enum, 32i64.into()).unwrap(),
            WriteValue::Enum(EnumSelection::Value(32))
        );
        assert!(coerce("TriggerMode", FeatureKind::Enum, true.into()).is_err());
    }

    #[test]
    fn bools_accept_textual_spellings() {
        assert_eq!(
            coerce("PtpEnable", FeatureKind::Bool, "On".into()).unwrap(),
            WriteValue::Bool(true)
        );
        assert_eq!(
            coerce("PtpEnable", FeatureKind::Bool, 0i64.into()).unwrap(),
            WriteValue::Bool(false)
        );
        assert!(coerce("PtpEnable", FeatureKind::Bool, "maybe".into()).is_err());
    }

    #[test]
    fn commands_take_no_value() {
        assert!(coerce("UserSetLoad", FeatureKind::Command, 1i64.into()).is_err());
        assert!(coerce("FFCValueAll", FeatureKind::Buffer, "abc".into()).is_err());
    }

    #[test]
    fn integer_ranges_report_bounds() {
        let range = FeatureRange::Integer {
            min: 1,
            max: 4,
            inc: 1,
        };
        assert_eq!(range.bounds(), Some((1.0, 4.0, Some(1.0))));
        assert!(range.entries().is_empty());
    }
}
