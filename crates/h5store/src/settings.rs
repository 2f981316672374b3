//! Engine configuration.
//!
//! A [`Settings`] value is passed by reference to every engine call. Nothing
//! is global, so tests can run side by side with differing policies.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{Error, Result};

/// How date/time values are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateTimeEncoding {
    /// 100 ns intervals since 0001-01-01T00:00:00 UTC.
    #[default]
    Ticks,
    UnixSeconds,
    UnixMilliseconds,
}

/// Character set for string slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Charset {
    #[default]
    Ascii,
    Utf8,
}

/// Padding of fixed-length string cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    #[default]
    NullTerminate,
    NullPad,
    SpacePad,
}

/// Engine options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Lower-case every slot name before it touches the container.
    pub lower_case_naming: bool,
    /// Propagate failures as errors. When `false`, [`Settings::settle`]
    /// logs them and reports an unsuccessful [`Outcome`].
    pub throw_on_error: bool,
    /// Treat every missing read target as mandatory.
    pub throw_on_missing_name: bool,
    pub date_time: DateTimeEncoding,
    pub charset: Charset,
    pub padding: Padding,
    /// Replace a slot that already exists instead of failing.
    pub override_existing: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            lower_case_naming: false,
            throw_on_error: true,
            throw_on_missing_name: false,
            date_time: DateTimeEncoding::Ticks,
            charset: Charset::Ascii,
            padding: Padding::NullTerminate,
            override_existing: true,
        }
    }
}

impl Settings {
    /// Default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings from JSON; absent fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn lower_case_naming(mut self, on: bool) -> Self {
        self.lower_case_naming = on;
        self
    }

    pub fn throw_on_error(mut self, on: bool) -> Self {
        self.throw_on_error = on;
        self
    }

    pub fn throw_on_missing_name(mut self, on: bool) -> Self {
        self.throw_on_missing_name = on;
        self
    }

    pub fn date_time(mut self, encoding: DateTimeEncoding) -> Self {
        self.date_time = encoding;
        self
    }

    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    pub fn padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn override_existing(mut self, on: bool) -> Self {
        self.override_existing = on;
        self
    }

    /// Apply the error policy to the result of an operation.
    ///
    /// With `throw_on_error` the error is returned unchanged. Otherwise it is
    /// logged and replaced by an unsuccessful outcome holding `T::default()`.
    pub fn settle<T: Default>(&self, context: &str, result: Result<T>) -> Result<Outcome<T>> {
        match result {
            Ok(value) => Ok(Outcome::ok(value)),
            Err(e) if self.throw_on_error => Err(e),
            Err(e) => {
                error!(%context, error = %e, "operation failed");
                Ok(Outcome::failed())
            }
        }
    }
}

/// Result of an operation that may degrade instead of failing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outcome<T> {
    pub success: bool,
    pub value: T,
}

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Outcome {
            success: true,
            value,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            success: self.success,
            value: f(self.value),
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T: Default> Outcome<T> {
    pub fn failed() -> Self {
        Outcome {
            success: false,
            value: T::default(),
        }
    }
}
