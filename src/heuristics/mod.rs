pub mod labels;
pub mod speaker_prefix;

pub use labels::*;
pub use speaker_prefix::*;

/// Configuration for talker label normalization
#[derive(Debug, Clone)]
pub struct LabelConfig {
    /// Honorifics, titles and post-nominals dropped before lookup (lowercase)
    pub honorifics: Vec<String>,
}

impl LabelConfig {
    pub fn is_honorific(&self, word: &str) -> bool {
        self.honorifics.iter().any(|h| h == word)
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            honorifics: [
                "mr", "mrs", "ms", "miss", "dr", "prof", "hon", "the", "rt", "senator", "sen",
                "sir", "dame", "mp", "am", "ao", "ac", "qc", "kc", "sc", "csc", "obe", "mbe",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}
