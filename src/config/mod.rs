/// Tagger configuration management
/// Handles loading and validating threshold overrides for the tagging pipeline

pub mod tagging;
