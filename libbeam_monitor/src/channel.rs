use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A named scalar signal (ipm2, ebeam, peak_8, a photodiode, ...).
///
/// The name is interned behind an `Arc<str>` so a Channel can be cloned into every
/// frame column, cursor map and buffer schema without reallocating.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Channel(Arc<str>);

impl Channel {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Channel {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&str> for Channel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        value.0.to_string()
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single reading of a channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the epoch
    pub timestamp: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// A sample can only be aligned if both its timestamp and value are real numbers
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite() && self.value.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_identity() {
        let a = Channel::new("ipm2");
        let b = Channel::from(String::from("ipm2"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "ipm2");
        assert!(Channel::new("ebeam") < Channel::new("ipm2"));
    }

    #[test]
    fn test_channel_serializes_as_name() {
        let yaml = serde_yaml::to_string(&Channel::new("peak_8")).unwrap();
        assert_eq!(yaml.trim(), "peak_8");
        let back: Channel = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.name(), "peak_8");
    }

    #[test]
    fn test_sample_finiteness() {
        assert!(Sample::new(1.0, 2.0).is_finite());
        assert!(!Sample::new(1.0, f64::NAN).is_finite());
        assert!(!Sample::new(f64::INFINITY, 2.0).is_finite());
    }
}
