use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("toml parse error in \"{path}\": {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("node id {0} exceeds the maximum of 1023")]
    NodeIdTooLarge(u64),

    #[error("no controller endpoints configured")]
    NoControllers,
}
