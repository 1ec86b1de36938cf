use std::path::PathBuf;

use crate::processor::{output::DEFAULT_FLUSH_THRESHOLD, pipeline::PipelineOptions};

/// Settings for one run of the aggregator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pipeline spec text, e.g. `"key(_1) => count"`.
    pub spec: String,
    /// Input file; `None` reads standard input.
    pub input: Option<PathBuf>,
    /// Output bytes buffered before each write to the sink.
    pub flush_threshold: usize,
    /// Print the canonical pipeline to stderr before running.
    pub explain: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            spec: String::new(),
            input: None,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            explain: false,
        }
    }
}

impl Config {
    /// Joins spec tokens given as separate command-line arguments.
    pub fn with_spec_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let spec = tokens
            .iter()
            .map(|t| t.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        Config {
            spec,
            ..Config::default()
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            flush_threshold: self.flush_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_tokens_are_joined() {
        let config = Config::with_spec_tokens(&["key(_1)", "=>", "count"]);
        assert_eq!(config.spec, "key(_1) => count");
        assert_eq!(config.flush_threshold, 1 << 15);
        assert!(config.input.is_none());
    }

    #[test]
    fn test_no_tokens() {
        let config = Config::with_spec_tokens::<&str>(&[]);
        assert_eq!(config.spec, "");
        assert_eq!(config.pipeline_options().flush_threshold, DEFAULT_FLUSH_THRESHOLD);
    }
}
