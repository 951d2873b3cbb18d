//! Player configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::util::Result;

/// How the player buffers and serves frames. Missing JSON fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    /// Frames kept ahead of the read cursor. Clamped to `[1, frame_count]`.
    pub look_ahead: u32,
    /// Load every frame and never evict.
    pub buffer_everything: bool,
    /// Wrap around at the end of the sequence.
    pub looping: bool,
    /// Memory-map the container instead of reading through a file handle.
    pub use_mmap: bool,
    /// Upper bound for `Wait::Blocking`, in milliseconds. `None` waits forever.
    pub wait_timeout_ms: Option<u64>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            look_ahead: 20,
            buffer_everything: false,
            looping: true,
            use_mmap: true,
            wait_timeout_ms: Some(5000),
        }
    }
}

impl PlayerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn look_ahead(mut self, frames: u32) -> Self {
        self.look_ahead = frames;
        self
    }

    pub fn buffer_everything(mut self, enabled: bool) -> Self {
        self.buffer_everything = enabled;
        self
    }

    pub fn looping(mut self, enabled: bool) -> Self {
        self.looping = enabled;
        self
    }

    pub fn use_mmap(mut self, enabled: bool) -> Self {
        self.use_mmap = enabled;
        self
    }

    pub fn wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Timeout applied to blocking frame requests.
    pub fn blocking_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Window depth for a sequence of `frame_count` frames.
    pub fn effective_depth(&self, frame_count: u32) -> u32 {
        if self.buffer_everything {
            frame_count
        } else {
            self.look_ahead.clamp(1, frame_count.max(1)).min(frame_count)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let o = PlayerOptions::default();
        assert_eq!(o.look_ahead, 20);
        assert!(o.looping);
        assert!(!o.buffer_everything);
        assert_eq!(o.blocking_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_partial_json() {
        let o = PlayerOptions::from_json_str(r#"{ "look_ahead": 4, "looping": false }"#).unwrap();
        assert_eq!(o.look_ahead, 4);
        assert!(!o.looping);
        assert!(o.use_mmap);

        let o = PlayerOptions::from_json_str(r#"{ "wait_timeout_ms": null }"#).unwrap();
        assert_eq!(o.blocking_timeout(), None);

        let err = PlayerOptions::from_json_str("{ look_ahead: }").unwrap_err();
        assert!(matches!(err, Error::Options(_)));
    }

    #[test]
    fn test_load_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, r#"{{ "buffer_everything": true }}"#).unwrap();
        let o = PlayerOptions::load(tmp.path()).unwrap();
        assert!(o.buffer_everything);

        let roundtrip = PlayerOptions::from_json_str(&o.to_json().unwrap()).unwrap();
        assert_eq!(roundtrip, o);
    }

    #[test]
    fn test_effective_depth() {
        let o = PlayerOptions::new().look_ahead(50);
        assert_eq!(o.effective_depth(10), 10);
        assert_eq!(o.clone().look_ahead(0).effective_depth(10), 1);
        assert_eq!(o.clone().look_ahead(3).effective_depth(10), 3);
        assert_eq!(o.clone().buffer_everything(true).effective_depth(7), 7);
        assert_eq!(o.effective_depth(0), 0);
    }
}
