mod yaml;

pub use yaml::{parse_configuration, YamlConfigFrontend};
